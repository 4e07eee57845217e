//! Receipts, payment claims and the mobile payment sweep.

mod common;

use common::*;
use anyhow::anyhow;
use async_trait::async_trait;
use occupancy_service::models::{
    CreateReceipt, PaymentStatus, PaymentType, Receipt, ReceiptFilter, TransactionFilter,
    TransactionType, UnitStatus,
};
use occupancy_service::services::store::{PaymentStore, ReceiptStore};
use occupancy_service::services::{InMemoryStore, ReceiptService};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;

#[tokio::test]
async fn receipt_claims_payment_and_posts_credit() {
    let app = spawn_services();
    app.seed_unit("unit-1", UnitStatus::Vacant);
    let occupation = app.book("unit-1", date(2024, 3, 1)).await;
    let payment = app.pay(5_000).await;

    let receipt = app
        .services
        .receipts
        .create(CreateReceipt {
            occupation_id: occupation.id.clone(),
            payment_id: payment.id.clone(),
        })
        .await
        .unwrap();
    assert!(receipt.number.starts_with("RCT"));

    let claimed = app.services.payments.find_by_id(&payment.id).await.unwrap();
    assert_eq!(claimed.status, PaymentStatus::Claimed);
    assert_eq!(claimed.receipt_id.as_deref(), Some(receipt.id.as_str()));

    let credits = app
        .services
        .ledger
        .find(TransactionFilter {
            transaction_type: Some(TransactionType::Credit),
            receipt_id: Some(receipt.id.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(credits.len(), 1);
    assert_eq!(credits[0].total_amount_paid, amount(5_000));
    assert_eq!(credits[0].total_amount_carried_forward, amount(-5_000));
}

#[tokio::test]
async fn a_payment_is_used_once() {
    let app = spawn_services();
    app.seed_unit("unit-2", UnitStatus::Vacant);
    let occupation = app.book("unit-2", date(2024, 3, 1)).await;
    let payment = app.pay(1_000).await;
    let request = CreateReceipt {
        occupation_id: occupation.id.clone(),
        payment_id: payment.id.clone(),
    };

    app.services.receipts.create(request.clone()).await.unwrap();
    let err = app.services.receipts.create(request).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert!(err.to_string().contains("already used"));
}

#[tokio::test]
async fn missing_occupation_or_payment_is_not_found() {
    let app = spawn_services();
    app.seed_unit("unit-3", UnitStatus::Vacant);
    let occupation = app.book("unit-3", date(2024, 3, 1)).await;
    let payment = app.pay(1_000).await;

    let err = app
        .services
        .receipts
        .create(CreateReceipt {
            occupation_id: "missing".into(),
            payment_id: payment.id.clone(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = app
        .services
        .receipts
        .create(CreateReceipt {
            occupation_id: occupation.id,
            payment_id: "missing".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let untouched = app.services.payments.find_by_id(&payment.id).await.unwrap();
    assert_eq!(untouched.status, PaymentStatus::Unclaimed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_receipts_for_one_payment_have_one_winner() {
    let app = spawn_services();
    app.seed_unit("unit-c", UnitStatus::Vacant);
    let occupation = app.book("unit-c", date(2024, 3, 1)).await;
    let payment = app.pay(2_500).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let receipts = app.services.receipts.clone();
            let request = CreateReceipt {
                occupation_id: occupation.id.clone(),
                payment_id: payment.id.clone(),
            };
            tokio::spawn(async move { receipts.create(request).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e @ (AppError::BadRequest(_) | AppError::RaceLost(_))) => {
                assert!(e.to_string().contains("already used"), "{e}");
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(winners, 1);

    let receipts = app
        .services
        .receipts
        .find(ReceiptFilter {
            payment_id: Some(payment.id.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(receipts.len(), 1);

    let balance = app.services.occupations.balance(&occupation.id).await.unwrap();
    assert_eq!(balance.total_amount_carried_forward, amount(-2_500));
}

#[tokio::test]
async fn sweep_receipts_mobile_payments_by_occupation_number() {
    let app = spawn_services();
    app.seed_unit("unit-s", UnitStatus::Vacant);
    let occupation = app.book("unit-s", date(2024, 3, 1)).await;

    let quoted = occupation.number.to_lowercase();
    let matched = app
        .pay_with(3_000, PaymentType::Mobile, Some(&quoted))
        .await;
    let unknown = app
        .pay_with(3_000, PaymentType::Mobile, Some("OZZZZZ"))
        .await;
    let anonymous = app.pay_with(3_000, PaymentType::Mobile, None).await;
    let card = app
        .pay_with(3_000, PaymentType::Card, Some(&occupation.number))
        .await;

    let report = app
        .services
        .receipts
        .claim_unclaimed_mobile_payments()
        .await
        .unwrap();
    assert_eq!(report.examined, 3);
    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped, 2);

    let status = |id: String| {
        let store = app.store.clone();
        async move { store.find_payment(&id).await.unwrap().unwrap().status }
    };
    assert_eq!(status(matched.id).await, PaymentStatus::Claimed);
    assert_eq!(status(unknown.id).await, PaymentStatus::Unclaimed);
    assert_eq!(status(anonymous.id).await, PaymentStatus::Unclaimed);
    assert_eq!(status(card.id).await, PaymentStatus::Unclaimed);

    // Nothing left to match on a second pass.
    let again = app
        .services
        .receipts
        .claim_unclaimed_mobile_payments()
        .await
        .unwrap();
    assert_eq!(again.processed, 0);
}

async fn credits_for(app: &TestApp, occupation_id: &str) -> usize {
    app.services
        .ledger
        .find(TransactionFilter {
            transaction_type: Some(TransactionType::Credit),
            occupation_id: Some(occupation_id.to_string()),
            ..Default::default()
        })
        .await
        .unwrap()
        .len()
}

#[tokio::test]
async fn payment_that_would_overflow_the_balance_stays_unclaimed() {
    let app = spawn_services();
    app.seed_unit("unit-o", UnitStatus::Vacant);
    let occupation = app.book("unit-o", date(2024, 3, 1)).await;

    let largest = app.pay_exact(Decimal::MAX).await;
    app.services
        .receipts
        .create(CreateReceipt {
            occupation_id: occupation.id.clone(),
            payment_id: largest.id.clone(),
        })
        .await
        .unwrap();
    let latest = app
        .services
        .ledger
        .latest(&occupation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.total_amount_carried_forward, Decimal::MIN);

    let one_more = app.pay(1).await;
    let err = app
        .services
        .receipts
        .create(CreateReceipt {
            occupation_id: occupation.id.clone(),
            payment_id: one_more.id.clone(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let untouched = app.services.payments.find_by_id(&one_more.id).await.unwrap();
    assert_eq!(untouched.status, PaymentStatus::Unclaimed);
    assert!(untouched.receipt_id.is_none());
    let receipts = app
        .services
        .receipts
        .find(ReceiptFilter {
            occupation_id: Some(occupation.id.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(receipts.len(), 2);
    assert_eq!(credits_for(&app, &occupation.id).await, 2);
}

/// Receipt store whose writes always fail.
struct FailingReceipts(Arc<InMemoryStore>);

#[async_trait]
impl ReceiptStore for FailingReceipts {
    async fn insert_receipt(&self, _receipt: &Receipt) -> Result<(), AppError> {
        Err(AppError::DatabaseError(anyhow!("receipts collection unavailable")))
    }

    async fn find_receipt(&self, id: &str) -> Result<Option<Receipt>, AppError> {
        self.0.find_receipt(id).await
    }

    async fn find_receipt_by_payment(
        &self,
        payment_id: &str,
    ) -> Result<Option<Receipt>, AppError> {
        self.0.find_receipt_by_payment(payment_id).await
    }

    async fn find_receipts(&self, filter: &ReceiptFilter) -> Result<Vec<Receipt>, AppError> {
        self.0.find_receipts(filter).await
    }
}

#[tokio::test]
async fn failed_receipt_write_hands_the_payment_back() {
    let app = spawn_services();
    app.seed_unit("unit-f", UnitStatus::Vacant);
    let occupation = app.book("unit-f", date(2024, 3, 1)).await;
    let payment = app.pay(2_000).await;
    let request = CreateReceipt {
        occupation_id: occupation.id.clone(),
        payment_id: payment.id.clone(),
    };

    let failing = ReceiptService::new(
        app.store.clone(),
        app.store.clone(),
        Arc::new(FailingReceipts(app.store.clone())),
        app.services.ledger.clone(),
    );
    let err = failing.create(request.clone()).await.unwrap_err();
    assert!(matches!(err, AppError::DatabaseError(_)));

    let released = app.services.payments.find_by_id(&payment.id).await.unwrap();
    assert_eq!(released.status, PaymentStatus::Unclaimed);
    assert!(released.receipt_id.is_none());
    assert_eq!(credits_for(&app, &occupation.id).await, 1);

    let receipt = app.services.receipts.create(request).await.unwrap();
    let claimed = app.services.payments.find_by_id(&payment.id).await.unwrap();
    assert_eq!(claimed.status, PaymentStatus::Claimed);
    assert_eq!(claimed.receipt_id.as_deref(), Some(receipt.id.as_str()));
    assert_eq!(credits_for(&app, &occupation.id).await, 2);
}

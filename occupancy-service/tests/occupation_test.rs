//! Booking, activation, notice and closing of occupations.

mod common;

use chrono::{Duration, Utc};
use common::*;
use occupancy_service::models::{
    CreateOccupation, InvoiceFilter, NoticeStatus, OccupationFilter, OccupationStatus,
    PaymentStatus, ReceiptFilter, TenantDetails, TenantRef, TransactionFilter, TransactionType,
    UnitStatus, VacateOutcome,
};
use occupancy_service::services::store::{NoticeReader, TenantDirectory, UnitReader};
use service_core::error::AppError;

fn request(unit_id: &str, tenant_id: &str, payment_id: &str) -> CreateOccupation {
    CreateOccupation {
        tenant: TenantRef::Existing(tenant_id.to_string()),
        unit_id: unit_id.to_string(),
        payment_id: payment_id.to_string(),
        start_date: date(2024, 3, 1),
    }
}

#[tokio::test]
async fn exact_payment_books_the_unit() {
    let app = spawn_services();
    app.seed_unit("unit-a", UnitStatus::Vacant);
    let tenant = app.seed_tenant();
    let payment = app.pay(REQUIRED_UPFRONT).await;

    let occupation = app
        .services
        .occupations
        .create(request("unit-a", &tenant.id, &payment.id))
        .await
        .unwrap();

    assert_eq!(occupation.status, OccupationStatus::PendingOccupation);
    assert_eq!(occupation.number.len(), 6);
    assert!(occupation.number.starts_with('O'));

    let invoices = app
        .services
        .invoices
        .find(InvoiceFilter {
            occupation_id: Some(occupation.id.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(invoices.len(), 2);

    let receipts = app
        .services
        .receipts
        .find(ReceiptFilter {
            occupation_id: Some(occupation.id.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].payment_id, payment.id);

    let entries = |transaction_type| TransactionFilter {
        transaction_type: Some(transaction_type),
        occupation_id: Some(occupation.id.clone()),
        ..Default::default()
    };
    let ledger = &app.services.ledger;
    assert_eq!(ledger.find(entries(TransactionType::Debit)).await.unwrap().len(), 2);
    assert_eq!(ledger.find(entries(TransactionType::Credit)).await.unwrap().len(), 1);

    let payment = app.services.payments.find_by_id(&payment.id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Claimed);
}

#[tokio::test]
async fn short_payment_writes_nothing() {
    let app = spawn_services();
    app.seed_unit("unit-b", UnitStatus::Vacant);
    let tenant = app.seed_tenant();
    let payment = app.pay(REQUIRED_UPFRONT - 1).await;

    let err = app
        .services
        .occupations
        .create(request("unit-b", &tenant.id, &payment.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    let message = err.to_string();
    assert!(message.contains("67649") && message.contains("67650"), "{message}");

    let services = &app.services;
    assert!(services.occupations.find(OccupationFilter::default()).await.unwrap().is_empty());
    assert!(services.invoices.find(InvoiceFilter::default()).await.unwrap().is_empty());
    assert!(services.receipts.find(ReceiptFilter::default()).await.unwrap().is_empty());
    assert!(services.ledger.find(TransactionFilter::default()).await.unwrap().is_empty());
    let payment = services.payments.find_by_id(&payment.id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Unclaimed);
}

#[tokio::test]
async fn precondition_failures_name_the_problem() {
    let app = spawn_services();
    app.seed_unit("unit-p", UnitStatus::Vacant);
    let tenant = app.seed_tenant();
    let payment = app.pay(REQUIRED_UPFRONT).await;
    let occupations = &app.services.occupations;

    let err = occupations
        .create(request("nope", &tenant.id, &payment.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(err.to_string().contains("Unit with id nope does not exist!"));

    let err = occupations
        .create(request("unit-p", "ghost", &payment.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = occupations
        .create(request("unit-p", &tenant.id, "missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert!(err.to_string().contains("Payment with id missing does not exist!"));

    occupations
        .create(request("unit-p", &tenant.id, &payment.id))
        .await
        .unwrap();

    app.seed_unit("unit-q", UnitStatus::Vacant);
    let err = occupations
        .create(request("unit-q", &tenant.id, &payment.id))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("has already been processed!"));
}

#[tokio::test]
async fn a_vacant_unit_is_booked_once() {
    let app = spawn_services();
    app.seed_unit("unit-1", UnitStatus::Vacant);
    app.book("unit-1", date(2024, 3, 1)).await;

    let tenant = app.seed_tenant();
    let payment = app.pay(REQUIRED_UPFRONT).await;
    let err = app
        .services
        .occupations
        .create(request("unit-1", &tenant.id, &payment.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert!(err.to_string().contains("Unit has already been booked!"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bookings_of_one_unit_have_one_winner() {
    let app = spawn_services();
    app.seed_unit("unit-r", UnitStatus::Vacant);

    let mut handles = Vec::new();
    for _ in 0..6 {
        let tenant = app.seed_tenant();
        let payment = app.pay(REQUIRED_UPFRONT).await;
        let occupations = app.services.occupations.clone();
        let request = request("unit-r", &tenant.id, &payment.id);
        handles.push(tokio::spawn(async move { occupations.create(request).await }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e @ (AppError::BadRequest(_) | AppError::RaceLost(_))) => {
                assert!(e.to_string().contains("already been booked"), "{e}");
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(winners, 1);

    let open = app
        .services
        .occupations
        .find(OccupationFilter {
            unit_id: Some("unit-r".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn inline_tenant_is_created_only_for_a_valid_booking() {
    let app = spawn_services();
    app.seed_unit("unit-t", UnitStatus::Vacant);
    let details = TenantDetails {
        first_name: "Baraka".into(),
        surname: "Mwangi".into(),
        mobile_number: "0722000111".into(),
        email: "baraka@example.com".into(),
    };

    let short = app.pay(100).await;
    let err = app
        .services
        .occupations
        .create(CreateOccupation {
            tenant: TenantRef::New(details.clone()),
            unit_id: "unit-t".into(),
            payment_id: short.id,
            start_date: date(2024, 3, 1),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let bad_email = TenantDetails {
        email: "not-an-email".into(),
        ..details.clone()
    };
    let payment = app.pay(REQUIRED_UPFRONT).await;
    let err = app
        .services
        .occupations
        .create(CreateOccupation {
            tenant: TenantRef::New(bad_email),
            unit_id: "unit-t".into(),
            payment_id: payment.id.clone(),
            start_date: date(2024, 3, 1),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let occupation = app
        .services
        .occupations
        .create(CreateOccupation {
            tenant: TenantRef::New(details),
            unit_id: "unit-t".into(),
            payment_id: payment.id,
            start_date: date(2024, 3, 1),
        })
        .await
        .unwrap();
    let tenant = app.store.find_tenant(&occupation.tenant_id).await.unwrap().unwrap();
    assert_eq!(tenant.first_name, "Baraka");
}

#[tokio::test]
async fn activation_occupies_the_unit() {
    let app = spawn_services();
    app.seed_unit("unit-x", UnitStatus::Vacant);
    let booked = app.book("unit-x", date(2024, 3, 1)).await;

    let current = app.services.occupations.activate(&booked.id).await.unwrap();
    assert_eq!(current.status, OccupationStatus::Current);
    let unit = app.store.find_unit("unit-x").await.unwrap().unwrap();
    assert_eq!(unit.status, UnitStatus::Occupied);

    let err = app.services.occupations.activate(&booked.id).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn occupied_unit_needs_a_notice_before_rebooking() {
    let app = spawn_services();
    let outgoing = app.current_tenancy("unit-h", date(2024, 1, 1)).await;

    let tenant = app.seed_tenant();
    let payment = app.pay(REQUIRED_UPFRONT).await;
    let mut incoming = request("unit-h", &tenant.id, &payment.id);
    incoming.start_date = date(2024, 7, 1);

    let err = app
        .services
        .occupations
        .create(incoming.clone())
        .await
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("Occupant of unit unit-h has not given a vacating notice!"));

    let (pending, notice) = app
        .services
        .notices
        .give_notice(&outgoing.id, date(2024, 5, 1), date(2024, 6, 30))
        .await
        .unwrap();
    assert_eq!(pending.status, OccupationStatus::PendingVacating);
    assert_eq!(notice.status, NoticeStatus::AwaitingExit);

    let mut too_early = incoming.clone();
    too_early.start_date = date(2024, 6, 30);
    let err = app.services.occupations.create(too_early).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let next = app.services.occupations.create(incoming).await.unwrap();
    assert_eq!(next.status, OccupationStatus::PendingOccupation);

    // The incoming tenant cannot move in over the outgoing one.
    let err = app.services.occupations.activate(&next.id).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert!(err.to_string().contains("still occupied"));

    let closed = app
        .services
        .occupations
        .close(&outgoing.id, date(2024, 6, 30), VacateOutcome::Vacated)
        .await
        .unwrap();
    assert_eq!(closed.status, OccupationStatus::Vacated);
    assert_eq!(closed.end_date, Some(date(2024, 6, 30)));
    assert!(app.store.find_active_notice(&outgoing.id).await.unwrap().is_none());

    let moved_in = app.services.occupations.activate(&next.id).await.unwrap();
    assert_eq!(moved_in.status, OccupationStatus::Current);
    let unit = app.store.find_unit("unit-h").await.unwrap().unwrap();
    assert_eq!(unit.status, UnitStatus::Occupied);
}

#[tokio::test]
async fn notice_requires_a_current_tenancy() {
    let app = spawn_services();
    app.seed_unit("unit-n", UnitStatus::Vacant);
    let booked = app.book("unit-n", date(2024, 3, 1)).await;

    let err = app
        .services
        .notices
        .give_notice(&booked.id, date(2024, 3, 1), date(2024, 4, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let current = app.services.occupations.activate(&booked.id).await.unwrap();
    let err = app
        .services
        .notices
        .give_notice(&current.id, date(2024, 4, 1), date(2024, 3, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn close_rules() {
    let app = spawn_services();
    let current = app.current_tenancy("unit-z", date(2024, 1, 1)).await;
    let occupations = &app.services.occupations;

    let tomorrow = Utc::now().date_naive() + Duration::days(1);
    let err = occupations
        .close(&current.id, tomorrow, VacateOutcome::Vacated)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("End date should be today or before!"));

    let err = occupations
        .close(&current.id, date(2023, 12, 31), VacateOutcome::Vacated)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let moved = occupations
        .close(&current.id, date(2024, 2, 1), VacateOutcome::Moved)
        .await
        .unwrap();
    assert_eq!(moved.status, OccupationStatus::Moved);
    let unit = app.store.find_unit("unit-z").await.unwrap().unwrap();
    assert_eq!(unit.status, UnitStatus::Vacant);

    let err = occupations
        .close(&current.id, date(2024, 2, 1), VacateOutcome::Vacated)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // The released unit can be booked again.
    app.book("unit-z", date(2024, 3, 1)).await;
}

#[tokio::test]
async fn due_bookings_are_activated_by_the_sweep() {
    let app = spawn_services();
    app.seed_unit("unit-d1", UnitStatus::Vacant);
    app.seed_unit("unit-d2", UnitStatus::Vacant);
    let due = app.book("unit-d1", date(2024, 3, 1)).await;
    let later = app.book("unit-d2", date(2024, 9, 1)).await;

    let report = app
        .services
        .occupations
        .activate_due(date(2024, 3, 1))
        .await
        .unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.processed, 1);

    let due = app.services.occupations.find_by_id(&due.id).await.unwrap();
    assert_eq!(due.status, OccupationStatus::Current);
    let later = app.services.occupations.find_by_id(&later.id).await.unwrap();
    assert_eq!(later.status, OccupationStatus::PendingOccupation);

    let by_number = app.services.occupations.find_by_number(&due.number.to_lowercase()).await.unwrap();
    assert_eq!(by_number.id, due.id);
}

#[tokio::test]
async fn notices_that_run_out_are_vacated_by_the_sweep() {
    let app = spawn_services();
    let leaving = app.current_tenancy("unit-v1", date(2024, 1, 1)).await;
    let staying = app.current_tenancy("unit-v2", date(2024, 1, 1)).await;
    let (_, due_notice) = app
        .services
        .notices
        .give_notice(&leaving.id, date(2024, 3, 1), date(2024, 3, 31))
        .await
        .unwrap();
    let (_, later_notice) = app
        .services
        .notices
        .give_notice(&staying.id, date(2024, 3, 1), date(2024, 5, 31))
        .await
        .unwrap();

    let report = app
        .services
        .occupations
        .vacate_due(date(2024, 4, 1))
        .await
        .unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.processed, 1);

    let vacated = app.services.occupations.find_by_id(&leaving.id).await.unwrap();
    assert_eq!(vacated.status, OccupationStatus::Vacated);
    assert_eq!(vacated.end_date, Some(date(2024, 3, 31)));
    assert!(vacated.tenancy_slot.is_none());
    let unit = app.store.find_unit("unit-v1").await.unwrap().unwrap();
    assert_eq!(unit.status, UnitStatus::Vacant);
    let fulfilled = app.store.notice(&due_notice.id).unwrap().unwrap();
    assert_eq!(fulfilled.status, NoticeStatus::Fulfilled);

    let untouched = app.services.occupations.find_by_id(&staying.id).await.unwrap();
    assert_eq!(untouched.status, OccupationStatus::PendingVacating);
    let unit = app.store.find_unit("unit-v2").await.unwrap().unwrap();
    assert_eq!(unit.status, UnitStatus::Occupied);
    let pending = app.store.notice(&later_notice.id).unwrap().unwrap();
    assert_eq!(pending.status, NoticeStatus::AwaitingExit);

    let again = app
        .services
        .occupations
        .vacate_due(date(2024, 4, 1))
        .await
        .unwrap();
    assert_eq!(again.examined, 0);
    assert_eq!(again.processed, 0);
}

#[tokio::test]
async fn closing_by_hand_closes_the_notice() {
    let app = spawn_services();
    let leaving = app.current_tenancy("unit-v3", date(2024, 1, 1)).await;
    let (_, notice) = app
        .services
        .notices
        .give_notice(&leaving.id, date(2024, 3, 1), date(2024, 3, 31))
        .await
        .unwrap();

    app.services
        .occupations
        .close(&leaving.id, date(2024, 3, 15), VacateOutcome::Moved)
        .await
        .unwrap();

    let closed = app.store.notice(&notice.id).unwrap().unwrap();
    assert_eq!(closed.status, NoticeStatus::Closed);
    let report = app
        .services
        .occupations
        .vacate_due(date(2024, 4, 1))
        .await
        .unwrap();
    assert_eq!(report.examined, 0);
}

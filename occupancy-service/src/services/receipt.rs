//! Reconciliation of payments against occupations.
//!
//! A receipt consumes exactly one payment. The payment is claimed first with
//! a conditional update, so of two concurrent receipts for the same payment
//! only one proceeds to write. The claimed payment records the receipt id it
//! was claimed for. A claim whose receipt fails to write is released again
//! so the payment can be receipted later.

use crate::models::{
    new_id, CreateReceipt, Occupation, PaymentFilter, PaymentStatus, PaymentType, Receipt,
    ReceiptFilter, SortOrder, SweepReport,
};
use crate::services::ledger::LedgerService;
use crate::services::metrics::PAYMENT_CLAIMS_TOTAL;
use crate::services::numbering::receipt_number;
use crate::services::store::{
    indexes, is_duplicate_on, OccupationStore, PaymentStore, ReceiptStore,
};
use anyhow::anyhow;
use chrono::Utc;
use service_core::error::AppError;
use service_core::retry::{retry_with_backoff, RetryConfig};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use validator::Validate;

#[derive(Clone)]
pub struct ReceiptService {
    occupations: Arc<dyn OccupationStore>,
    payments: Arc<dyn PaymentStore>,
    receipts: Arc<dyn ReceiptStore>,
    ledger: LedgerService,
}

impl ReceiptService {
    pub fn new(
        occupations: Arc<dyn OccupationStore>,
        payments: Arc<dyn PaymentStore>,
        receipts: Arc<dyn ReceiptStore>,
        ledger: LedgerService,
    ) -> Self {
        Self {
            occupations,
            payments,
            receipts,
            ledger,
        }
    }

    #[instrument(skip(self, request), fields(occupation_id = %request.occupation_id, payment_id = %request.payment_id))]
    pub async fn create(&self, request: CreateReceipt) -> Result<Receipt, AppError> {
        request.validate()?;

        let occupation = self
            .occupations
            .find_occupation(&request.occupation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow!(
                    "Occupation with id {} does not exist!",
                    request.occupation_id
                ))
            })?;

        let payment = self
            .payments
            .find_payment(&request.payment_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow!(
                    "Payment with id {} does not exist!",
                    request.payment_id
                ))
            })?;

        if payment.is_claimed()
            || self
                .receipts
                .find_receipt_by_payment(&payment.id)
                .await?
                .is_some()
        {
            PAYMENT_CLAIMS_TOTAL.with_label_values(&["already_used"]).inc();
            return Err(already_used(&payment.id));
        }

        self.ledger
            .check_credit(&occupation.id, payment.amount)
            .await?;

        let receipt_id = new_id();
        let claimed = self
            .payments
            .claim_payment(&payment.id, &receipt_id)
            .await?
            .ok_or_else(|| {
                PAYMENT_CLAIMS_TOTAL.with_label_values(&["race_lost"]).inc();
                AppError::RaceLost(anyhow!("Payment with id {} already used!", payment.id))
            })?;
        PAYMENT_CLAIMS_TOTAL.with_label_values(&["claimed"]).inc();

        let receipt = match self
            .insert_receipt(&receipt_id, &occupation, &claimed.id)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) if is_duplicate_on(&e, indexes::RECEIPT_PAYMENT) => {
                warn!(payment_id = %claimed.id, "Payment already has a receipt");
                return Err(AppError::RaceLost(anyhow!(
                    "Payment with id {} already used!",
                    claimed.id
                )));
            }
            Err(e) => {
                self.release_claim(&claimed.id, &receipt_id).await;
                return Err(e);
            }
        };

        self.ledger
            .append_credit(&occupation.id, &receipt.id, claimed.amount)
            .await?;

        info!(
            receipt_id = %receipt.id,
            number = %receipt.number,
            amount = %claimed.amount,
            "Receipt created"
        );
        Ok(receipt)
    }

    /// Hand a claimed payment back after its receipt failed to write.
    async fn release_claim(&self, payment_id: &str, receipt_id: &str) {
        match self.payments.release_claim(payment_id, receipt_id).await {
            Ok(true) => {
                PAYMENT_CLAIMS_TOTAL.with_label_values(&["released"]).inc();
                warn!(
                    payment_id = %payment_id,
                    receipt_id = %receipt_id,
                    "Receipt not written, payment claim released"
                );
            }
            Ok(false) => {
                warn!(
                    payment_id = %payment_id,
                    receipt_id = %receipt_id,
                    "Receipt not written, claim already moved on"
                );
            }
            Err(e) => {
                error!(
                    payment_id = %payment_id,
                    receipt_id = %receipt_id,
                    error = %e,
                    "Payment claimed but receipt was not written"
                );
            }
        }
    }

    async fn insert_receipt(
        &self,
        receipt_id: &str,
        occupation: &Occupation,
        payment_id: &str,
    ) -> Result<Receipt, AppError> {
        let receipts = &self.receipts;
        retry_with_backoff(
            &RetryConfig::quick(),
            "insert_receipt",
            |e: &AppError| is_duplicate_on(e, indexes::RECEIPT_NUMBER),
            move || async move {
                let receipt = Receipt {
                    id: receipt_id.to_string(),
                    number: receipt_number(),
                    occupation_id: occupation.id.clone(),
                    payment_id: payment_id.to_string(),
                    created_on: Utc::now(),
                };
                receipts.insert_receipt(&receipt).await.map(|_| receipt)
            },
        )
        .await
    }

    /// Match unclaimed mobile payments to open occupations by the occupation
    /// number the tenant quoted, oldest payment first.
    #[instrument(skip(self))]
    pub async fn claim_unclaimed_mobile_payments(&self) -> Result<SweepReport, AppError> {
        let pending = self
            .payments
            .find_payments(&PaymentFilter {
                status: Some(PaymentStatus::Unclaimed),
                payment_type: Some(PaymentType::Mobile),
                reference_number: None,
                order: SortOrder::Asc,
            })
            .await?;

        let mut report = SweepReport {
            examined: pending.len(),
            ..Default::default()
        };

        for payment in pending {
            let Some(number) = payment.occupation_number.as_deref() else {
                warn!(payment_id = %payment.id, "Payment quotes no occupation number");
                report.skipped += 1;
                continue;
            };

            let occupation = match self
                .occupations
                .find_occupation_by_number(&number.trim().to_uppercase())
                .await?
            {
                Some(occupation) if occupation.status.is_open() => occupation,
                _ => {
                    warn!(payment_id = %payment.id, occupation_number = %number, "No open occupation for payment");
                    report.skipped += 1;
                    continue;
                }
            };

            let request = CreateReceipt {
                occupation_id: occupation.id,
                payment_id: payment.id.clone(),
            };
            match self.create(request).await {
                Ok(_) => report.processed += 1,
                Err(e) => {
                    warn!(payment_id = %payment.id, error = %e, "Payment left unclaimed");
                    report.skipped += 1;
                }
            }
        }

        info!(
            examined = report.examined,
            processed = report.processed,
            skipped = report.skipped,
            "Mobile payment sweep finished"
        );
        Ok(report)
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Receipt, AppError> {
        self.receipts
            .find_receipt(id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("Receipt with id {} does not exist!", id)))
    }

    #[instrument(skip(self, filter))]
    pub async fn find(&self, filter: ReceiptFilter) -> Result<Vec<Receipt>, AppError> {
        self.receipts.find_receipts(&filter.normalized()).await
    }
}

fn already_used(payment_id: &str) -> AppError {
    AppError::BadRequest(anyhow!("Payment with id {} already used!", payment_id))
}

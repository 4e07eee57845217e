//! Payment intake. Payments arrive unclaimed and are consumed by receipts.

use crate::models::{NewPayment, Payment, PaymentFilter};
use crate::services::store::{indexes, is_duplicate_on, PaymentStore};
use anyhow::anyhow;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

#[derive(Clone)]
pub struct PaymentService {
    payments: Arc<dyn PaymentStore>,
}

impl PaymentService {
    pub fn new(payments: Arc<dyn PaymentStore>) -> Self {
        Self { payments }
    }

    #[instrument(skip(self, new), fields(reference_number = %new.reference_number, amount = %new.amount))]
    pub async fn record(&self, new: NewPayment) -> Result<Payment, AppError> {
        new.validate()?;
        if new.amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow!(
                "Payment amount must be greater than zero!"
            )));
        }

        let payment = Payment::unclaimed(new);
        if payment.reference_number.is_empty() {
            return Err(AppError::BadRequest(anyhow!(
                "Payment reference number is required!"
            )));
        }
        if self
            .payments
            .find_payment_by_reference(&payment.reference_number)
            .await?
            .is_some()
        {
            return Err(duplicate_reference(&payment.reference_number));
        }

        self.payments
            .insert_payment(&payment)
            .await
            .map_err(|e| {
                if is_duplicate_on(&e, indexes::PAYMENT_REFERENCE) {
                    duplicate_reference(&payment.reference_number)
                } else {
                    e
                }
            })?;

        info!(payment_id = %payment.id, payment_type = %payment.payment_type.as_str(), "Payment recorded");
        Ok(payment)
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Payment, AppError> {
        self.payments
            .find_payment(id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("Payment with id {} does not exist!", id)))
    }

    #[instrument(skip(self, filter))]
    pub async fn find(&self, filter: PaymentFilter) -> Result<Vec<Payment>, AppError> {
        self.payments.find_payments(&filter.normalized()).await
    }
}

fn duplicate_reference(reference: &str) -> AppError {
    AppError::BadRequest(anyhow!(
        "Payment already exists with reference no. {}!",
        reference
    ))
}

//! Refunds against BOOKING invoices. A refund is recorded for the books of
//! the property manager only and posts nothing to the occupation ledger.

use crate::models::{
    new_id, BookingRefund, BookingRefundFilter, CreateBookingRefund, InvoiceType,
};
use crate::services::store::{indexes, is_duplicate_on, BookingRefundStore, InvoiceStore};
use anyhow::anyhow;
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

#[derive(Clone)]
pub struct BookingRefundService {
    invoices: Arc<dyn InvoiceStore>,
    refunds: Arc<dyn BookingRefundStore>,
}

impl BookingRefundService {
    pub fn new(invoices: Arc<dyn InvoiceStore>, refunds: Arc<dyn BookingRefundStore>) -> Self {
        Self { invoices, refunds }
    }

    #[instrument(skip(self, request), fields(receivable_id = %request.receivable_id, amount = %request.amount))]
    pub async fn create(&self, request: CreateBookingRefund) -> Result<BookingRefund, AppError> {
        request.validate()?;

        let invoice = self
            .invoices
            .find_invoice(&request.receivable_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow!(
                    "Receivable with id {} does not exist!",
                    request.receivable_id
                ))
            })?;
        if invoice.invoice_type != InvoiceType::Booking {
            return Err(AppError::BadRequest(anyhow!(
                "Receivable with id {} is a {} invoice and cannot be refunded!",
                invoice.id,
                invoice.invoice_type
            )));
        }

        if self
            .refunds
            .find_booking_refund_by_receivable(&invoice.id)
            .await?
            .is_some()
        {
            return Err(already_refunded(&invoice.id));
        }

        if request.amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow!(
                "Amount to be refunded must be greater than zero!"
            )));
        }
        if request.amount > invoice.total()? {
            return Err(AppError::BadRequest(anyhow!(
                "Amount to be refunded cannot be greater than the amount paid!"
            )));
        }

        let refund = BookingRefund {
            id: new_id(),
            amount: request.amount,
            refund_details: request.refund_details.trim().to_string(),
            receivable_id: invoice.id.clone(),
            created_on: Utc::now(),
        };
        self.refunds
            .insert_booking_refund(&refund)
            .await
            .map_err(|e| {
                if is_duplicate_on(&e, indexes::REFUND_RECEIVABLE) {
                    AppError::RaceLost(anyhow!(
                        "BookingRefund with receivable id {} already exists!",
                        invoice.id
                    ))
                } else {
                    e
                }
            })?;

        info!(refund_id = %refund.id, "Booking refund recorded");
        Ok(refund)
    }

    #[instrument(skip(self, filter))]
    pub async fn find(&self, filter: BookingRefundFilter) -> Result<Vec<BookingRefund>, AppError> {
        self.refunds.find_booking_refunds(&filter.normalized()).await
    }
}

fn already_refunded(receivable_id: &str) -> AppError {
    AppError::NotFound(anyhow!(
        "BookingRefund with receivable id {} already exists!",
        receivable_id
    ))
}

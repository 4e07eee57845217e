//! Persistence contracts consumed by the occupancy services.
//!
//! Units, tenants and notices belong to neighbouring CRUD services and are
//! reached through narrow reader traits. The remaining traits cover the
//! collections this service owns. Implementations must report a violated
//! unique index as `AppError::Conflict` wrapping a [`DuplicateKey`].

use crate::models::{
    BookingRefund, BookingRefundFilter, Invoice, InvoiceFilter, Notice, NoticeStatus, Occupation,
    OccupationChange, OccupationFilter, OccupationStatus, OccupationTransaction, Payment,
    PaymentFilter, Receipt, ReceiptFilter, Tenant, TenantDetails, TransactionFilter, Unit,
    UnitStatus,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use service_core::error::AppError;

/// Names of the unique indexes every store enforces.
pub mod indexes {
    pub const OCCUPATION_NUMBER: &str = "occupation_number_unique";
    pub const OCCUPATION_BOOKING_SLOT: &str = "occupation_booking_slot_unique";
    pub const OCCUPATION_TENANCY_SLOT: &str = "occupation_tenancy_slot_unique";
    pub const INVOICE_NUMBER: &str = "invoice_number_unique";
    pub const TRANSACTION_SEQUENCE: &str = "transaction_occupation_sequence_unique";
    pub const PAYMENT_REFERENCE: &str = "payment_reference_unique";
    pub const RECEIPT_NUMBER: &str = "receipt_number_unique";
    pub const RECEIPT_PAYMENT: &str = "receipt_payment_unique";
    pub const REFUND_RECEIVABLE: &str = "booking_refund_receivable_unique";
}

/// A write rejected by a unique index.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("duplicate key on index {index}")]
pub struct DuplicateKey {
    pub index: String,
}

impl DuplicateKey {
    pub fn conflict(index: &str) -> AppError {
        AppError::Conflict(anyhow::Error::new(DuplicateKey {
            index: index.to_string(),
        }))
    }
}

/// True when `err` is a duplicate key on `index`.
pub fn is_duplicate_on(err: &AppError, index: &str) -> bool {
    match err {
        AppError::Conflict(inner) => inner
            .downcast_ref::<DuplicateKey>()
            .is_some_and(|dup| dup.index == index),
        _ => false,
    }
}

#[async_trait]
pub trait UnitReader: Send + Sync {
    async fn find_unit(&self, id: &str) -> Result<Option<Unit>, AppError>;

    async fn set_unit_status(&self, id: &str, status: UnitStatus) -> Result<(), AppError>;
}

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn find_tenant(&self, id: &str) -> Result<Option<Tenant>, AppError>;

    async fn create_tenant(&self, details: TenantDetails) -> Result<Tenant, AppError>;
}

#[async_trait]
pub trait NoticeReader: Send + Sync {
    /// Latest notice in an active status for the occupation.
    async fn find_active_notice(&self, occupation_id: &str) -> Result<Option<Notice>, AppError>;
}

#[async_trait]
pub trait NoticeStore: NoticeReader {
    async fn insert_notice(&self, notice: &Notice) -> Result<(), AppError>;

    async fn set_notice_status(&self, id: &str, status: NoticeStatus) -> Result<(), AppError>;
}

#[async_trait]
pub trait OccupationStore: Send + Sync {
    async fn insert_occupation(&self, occupation: &Occupation) -> Result<(), AppError>;

    async fn find_occupation(&self, id: &str) -> Result<Option<Occupation>, AppError>;

    async fn find_occupation_by_number(&self, number: &str)
        -> Result<Option<Occupation>, AppError>;

    async fn find_occupations(&self, filter: &OccupationFilter)
        -> Result<Vec<Occupation>, AppError>;

    /// Occupations still pending whose start date is on or before `date`.
    async fn find_pending_starting_by(&self, date: NaiveDate)
        -> Result<Vec<Occupation>, AppError>;

    /// Apply `change` only if the occupation is currently in one of `from`.
    /// Returns the updated document, or `None` when the guard did not match.
    async fn transition_occupation(
        &self,
        id: &str,
        from: &[OccupationStatus],
        change: &OccupationChange,
    ) -> Result<Option<Occupation>, AppError>;
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError>;

    async fn find_invoice(&self, id: &str) -> Result<Option<Invoice>, AppError>;

    async fn find_invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, AppError>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert_transaction(&self, entry: &OccupationTransaction) -> Result<(), AppError>;

    async fn find_transaction(&self, id: &str) -> Result<Option<OccupationTransaction>, AppError>;

    /// Entry with the highest sequence for the occupation.
    async fn latest_transaction(
        &self,
        occupation_id: &str,
    ) -> Result<Option<OccupationTransaction>, AppError>;

    /// Whole ledger of one occupation in sequence order.
    async fn ledger_of(&self, occupation_id: &str)
        -> Result<Vec<OccupationTransaction>, AppError>;

    async fn find_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<OccupationTransaction>, AppError>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError>;

    async fn find_payment(&self, id: &str) -> Result<Option<Payment>, AppError>;

    async fn find_payment_by_reference(&self, reference: &str)
        -> Result<Option<Payment>, AppError>;

    async fn find_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, AppError>;

    /// Atomically mark an unclaimed payment as claimed by `receipt_id`.
    /// Returns `None` when the payment is missing or already claimed.
    async fn claim_payment(
        &self,
        id: &str,
        receipt_id: &str,
    ) -> Result<Option<Payment>, AppError>;

    /// Undo a claim made for `receipt_id`. Returns `false` when the payment
    /// is no longer claimed by that receipt.
    async fn release_claim(&self, id: &str, receipt_id: &str) -> Result<bool, AppError>;
}

#[async_trait]
pub trait ReceiptStore: Send + Sync {
    async fn insert_receipt(&self, receipt: &Receipt) -> Result<(), AppError>;

    async fn find_receipt(&self, id: &str) -> Result<Option<Receipt>, AppError>;

    async fn find_receipt_by_payment(&self, payment_id: &str)
        -> Result<Option<Receipt>, AppError>;

    async fn find_receipts(&self, filter: &ReceiptFilter) -> Result<Vec<Receipt>, AppError>;
}

#[async_trait]
pub trait BookingRefundStore: Send + Sync {
    async fn insert_booking_refund(&self, refund: &BookingRefund) -> Result<(), AppError>;

    async fn find_booking_refund_by_receivable(
        &self,
        receivable_id: &str,
    ) -> Result<Option<BookingRefund>, AppError>;

    async fn find_booking_refunds(
        &self,
        filter: &BookingRefundFilter,
    ) -> Result<Vec<BookingRefund>, AppError>;
}

/// Everything the service needs from one backing store.
#[async_trait]
pub trait OccupancyStore:
    UnitReader
    + TenantDirectory
    + NoticeStore
    + OccupationStore
    + InvoiceStore
    + TransactionStore
    + PaymentStore
    + ReceiptStore
    + BookingRefundStore
{
    async fn health_check(&self) -> Result<(), AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_is_recognised_by_index() {
        let err = DuplicateKey::conflict(indexes::RECEIPT_PAYMENT);
        assert!(is_duplicate_on(&err, indexes::RECEIPT_PAYMENT));
        assert!(!is_duplicate_on(&err, indexes::RECEIPT_NUMBER));
        assert!(!is_duplicate_on(
            &AppError::BadRequest(anyhow::anyhow!("nope")),
            indexes::RECEIPT_PAYMENT
        ));
    }
}

//! Domain models for occupancy-service.

mod booking_refund;
mod invoice;
mod notice;
mod occupation;
mod payment;
mod receipt;
mod tenant;
mod transaction;
mod unit;

pub use booking_refund::{BookingRefund, BookingRefundFilter, CreateBookingRefund};
pub use invoice::{CreateInvoice, Invoice, InvoiceAmounts, InvoiceFilter, InvoiceType};
pub use notice::{Notice, NoticeStatus};
pub use occupation::{
    CreateOccupation, Occupation, OccupationChange, OccupationFilter, OccupationStatus,
    VacateOutcome,
};
pub use payment::{NewPayment, Payment, PaymentFilter, PaymentStatus, PaymentType};
pub use receipt::{CreateReceipt, Receipt, ReceiptFilter};
pub use tenant::{Tenant, TenantDetails, TenantRef};
pub use transaction::{
    LedgerBalance, LedgerPosting, OccupationTransaction, TransactionFilter, TransactionType,
};
pub use unit::{Unit, UnitStatus};

use anyhow::anyhow;
use mongodb::bson::oid::ObjectId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

/// New document id. ObjectId hex sorts in creation order.
pub fn new_id() -> String {
    ObjectId::new().to_hex()
}

/// Treat empty or whitespace-only query values as absent.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Amount too large to represent.
pub fn amount_overflow() -> AppError {
    AppError::BadRequest(anyhow!("Amount exceeds the largest supported value!"))
}

/// Sum of `amounts`, or a bad request when the sum does not fit.
pub fn checked_total(amounts: impl IntoIterator<Item = Decimal>) -> Result<Decimal, AppError> {
    amounts.into_iter().try_fold(Decimal::ZERO, |sum, amount| {
        sum.checked_add(amount).ok_or_else(amount_overflow)
    })
}

/// Listing order by id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    #[serde(alias = "asc")]
    Asc,
    #[default]
    #[serde(alias = "desc")]
    Desc,
}

impl SortOrder {
    /// Mongo sort direction.
    pub fn direction(self) -> i32 {
        match self {
            Self::Asc => 1,
            Self::Desc => -1,
        }
    }

    /// Order a slice of items by their id.
    pub fn sort_by_id<T>(self, items: &mut [T], id: impl Fn(&T) -> &str) {
        items.sort_by(|a, b| id(a).cmp(id(b)));
        if self == Self::Desc {
            items.reverse();
        }
    }
}

/// Outcome of a batch sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub processed: usize,
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_are_absent() {
        assert_eq!(non_blank(Some("  ".to_string())), None);
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some(" inv-1 ".to_string())), Some("inv-1".to_string()));
    }

    #[test]
    fn sort_order_defaults_to_newest_first() {
        let mut ids = vec!["a", "c", "b"];
        SortOrder::default().sort_by_id(&mut ids, |s| *s);
        assert_eq!(ids, vec!["c", "b", "a"]);

        SortOrder::Asc.sort_by_id(&mut ids, |s| *s);
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn totals_that_do_not_fit_are_rejected() {
        assert_eq!(
            checked_total([Decimal::from(2), Decimal::from(3)]).unwrap(),
            Decimal::from(5)
        );
        assert!(matches!(
            checked_total([Decimal::MAX, Decimal::ONE]),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn ids_are_monotonic_within_a_process() {
        let first = new_id();
        let second = new_id();
        assert!(first < second);
    }
}

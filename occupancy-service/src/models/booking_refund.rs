use super::SortOrder;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Money returned against a cancelled booking invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRefund {
    #[serde(rename = "_id")]
    pub id: String,
    pub amount: Decimal,
    pub refund_details: String,
    pub receivable_id: String,
    pub created_on: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBookingRefund {
    #[validate(length(min = 1))]
    pub receivable_id: String,
    pub amount: Decimal,
    #[validate(length(min = 1, max = 500))]
    pub refund_details: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingRefundFilter {
    pub receivable_id: Option<String>,
    #[serde(default)]
    pub order: SortOrder,
}

impl BookingRefundFilter {
    pub fn normalized(self) -> Self {
        Self {
            receivable_id: super::non_blank(self.receivable_id),
            ..self
        }
    }

    pub fn matches(&self, refund: &BookingRefund) -> bool {
        self.receivable_id
            .as_ref()
            .map_or(true, |r| &refund.receivable_id == r)
    }
}

use super::SortOrder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Proof that a payment was applied to an occupation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(rename = "_id")]
    pub id: String,
    pub number: String,
    pub occupation_id: String,
    pub payment_id: String,
    pub created_on: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateReceipt {
    #[validate(length(min = 1))]
    pub occupation_id: String,
    #[validate(length(min = 1))]
    pub payment_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReceiptFilter {
    pub occupation_id: Option<String>,
    pub payment_id: Option<String>,
    #[serde(default)]
    pub order: SortOrder,
}

impl ReceiptFilter {
    pub fn normalized(self) -> Self {
        Self {
            occupation_id: super::non_blank(self.occupation_id),
            payment_id: super::non_blank(self.payment_id),
            ..self
        }
    }

    pub fn matches(&self, receipt: &Receipt) -> bool {
        self.occupation_id
            .as_ref()
            .map_or(true, |o| &receipt.occupation_id == o)
            && self
                .payment_id
                .as_ref()
                .map_or(true, |p| &receipt.payment_id == p)
    }
}

use super::SortOrder;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Claim state of a payment. `NEW`/`PROCESSED` from the older advance flow
/// are read as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[serde(alias = "NEW")]
    Unclaimed,
    #[serde(alias = "PROCESSED")]
    Claimed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unclaimed => "UNCLAIMED",
            Self::Claimed => "CLAIMED",
        }
    }

    /// Stored spellings of this status, legacy alias included.
    pub fn stored_values(&self) -> [&'static str; 2] {
        match self {
            Self::Unclaimed => ["UNCLAIMED", "NEW"],
            Self::Claimed => ["CLAIMED", "PROCESSED"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    Mobile,
    Card,
    Paypal,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mobile => "MOBILE",
            Self::Card => "CARD",
            Self::Paypal => "PAYPAL",
        }
    }
}

/// Inbound money reported by a payment gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: String,
    pub status: PaymentStatus,
    #[serde(rename = "type")]
    pub payment_type: PaymentType,
    pub reference_number: String,
    /// Account reference the payer typed; matched against occupation numbers.
    #[serde(default)]
    pub occupation_number: Option<String>,
    pub currency: String,
    pub amount: Decimal,
    /// Receipt that consumed this payment, recorded by the claim itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_id: Option<String>,
    pub created_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_on: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn unclaimed(new: NewPayment) -> Self {
        Self {
            id: super::new_id(),
            status: PaymentStatus::Unclaimed,
            payment_type: new.payment_type,
            reference_number: new.reference_number.trim().to_string(),
            occupation_number: super::non_blank(new.occupation_number),
            currency: new.currency.to_uppercase(),
            amount: new.amount,
            receipt_id: None,
            created_on: Utc::now(),
            modified_on: None,
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.status == PaymentStatus::Claimed
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewPayment {
    #[serde(rename = "type")]
    pub payment_type: PaymentType,
    #[validate(length(min = 1, max = 64))]
    pub reference_number: String,
    #[serde(default)]
    pub occupation_number: Option<String>,
    #[validate(length(equal = 3))]
    pub currency: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentFilter {
    pub status: Option<PaymentStatus>,
    #[serde(rename = "type")]
    pub payment_type: Option<PaymentType>,
    pub reference_number: Option<String>,
    #[serde(default)]
    pub order: SortOrder,
}

impl PaymentFilter {
    pub fn normalized(self) -> Self {
        Self {
            reference_number: super::non_blank(self.reference_number),
            ..self
        }
    }

    /// `reference_number` matches as a case-insensitive substring.
    pub fn matches(&self, payment: &Payment) -> bool {
        self.status.map_or(true, |s| payment.status == s)
            && self.payment_type.map_or(true, |t| payment.payment_type == t)
            && self.reference_number.as_ref().map_or(true, |r| {
                payment
                    .reference_number
                    .to_uppercase()
                    .contains(&r.to_uppercase())
            })
    }
}

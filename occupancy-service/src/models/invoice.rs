use super::SortOrder;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceType {
    Rent,
    RentAdvance,
    Penalty,
    Utilities,
    Booking,
}

impl InvoiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rent => "RENT",
            Self::RentAdvance => "RENT_ADVANCE",
            Self::Penalty => "PENALTY",
            Self::Utilities => "UTILITIES",
            Self::Booking => "BOOKING",
        }
    }
}

impl std::fmt::Display for InvoiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The charge lines of an invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceAmounts {
    #[serde(default)]
    pub rent_amount: Decimal,
    #[serde(default)]
    pub security_amount: Decimal,
    #[serde(default)]
    pub garbage_amount: Decimal,
    #[serde(default)]
    pub other_amounts: BTreeMap<String, Decimal>,
}

impl InvoiceAmounts {
    /// Sum of every charge line.
    pub fn total(&self) -> Result<Decimal, AppError> {
        super::checked_total(
            [self.rent_amount, self.security_amount, self.garbage_amount]
                .into_iter()
                .chain(self.other_amounts.values().copied()),
        )
    }

    /// Name of the first negative line, if any.
    pub fn negative_line(&self) -> Option<&str> {
        [
            ("rent_amount", self.rent_amount),
            ("security_amount", self.security_amount),
            ("garbage_amount", self.garbage_amount),
        ]
        .into_iter()
        .find(|(_, amount)| *amount < Decimal::ZERO)
        .map(|(name, _)| name)
        .or_else(|| {
            self.other_amounts
                .iter()
                .find(|(_, amount)| **amount < Decimal::ZERO)
                .map(|(name, _)| name.as_str())
        })
    }
}

/// A posted charge against an occupation. Never edited once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(rename = "_id")]
    pub id: String,
    pub number: String,
    #[serde(rename = "type")]
    pub invoice_type: InvoiceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub rent_amount: Decimal,
    pub security_amount: Decimal,
    pub garbage_amount: Decimal,
    #[serde(default)]
    pub other_amounts: BTreeMap<String, Decimal>,
    pub occupation_id: String,
    pub created_on: DateTime<Utc>,
}

impl Invoice {
    pub fn new(
        number: String,
        invoice_type: InvoiceType,
        occupation_id: &str,
        period: Option<(NaiveDate, NaiveDate)>,
        amounts: InvoiceAmounts,
    ) -> Self {
        Self {
            id: super::new_id(),
            number,
            invoice_type,
            start_date: period.map(|(start, _)| start),
            end_date: period.map(|(_, end)| end),
            rent_amount: amounts.rent_amount,
            security_amount: amounts.security_amount,
            garbage_amount: amounts.garbage_amount,
            other_amounts: amounts.other_amounts,
            occupation_id: occupation_id.to_string(),
            created_on: Utc::now(),
        }
    }

    pub fn amounts(&self) -> InvoiceAmounts {
        InvoiceAmounts {
            rent_amount: self.rent_amount,
            security_amount: self.security_amount,
            garbage_amount: self.garbage_amount,
            other_amounts: self.other_amounts.clone(),
        }
    }

    /// Amount this invoice adds to the occupation's balance.
    pub fn total(&self) -> Result<Decimal, AppError> {
        self.amounts().total()
    }
}

/// Input for invoice creation. Amounts are required for PENALTY (unless the
/// configured rent percentage applies), UTILITIES and BOOKING invoices and
/// ignored for rent invoices, which are priced from the unit.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateInvoice {
    #[serde(rename = "type")]
    pub invoice_type: InvoiceType,
    pub occupation_id: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub amounts: Option<InvoiceAmounts>,
}

impl CreateInvoice {
    pub fn of(invoice_type: InvoiceType, occupation_id: &str) -> Self {
        Self {
            invoice_type,
            occupation_id: occupation_id.to_string(),
            start_date: None,
            end_date: None,
            amounts: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceFilter {
    #[serde(rename = "type")]
    pub invoice_type: Option<InvoiceType>,
    pub number: Option<String>,
    pub occupation_id: Option<String>,
    #[serde(default)]
    pub order: SortOrder,
}

impl InvoiceFilter {
    pub fn normalized(self) -> Self {
        Self {
            number: super::non_blank(self.number),
            occupation_id: super::non_blank(self.occupation_id),
            ..self
        }
    }

    /// `number` matches as a case-insensitive substring.
    pub fn matches(&self, invoice: &Invoice) -> bool {
        self.invoice_type.map_or(true, |t| invoice.invoice_type == t)
            && self.number.as_ref().map_or(true, |n| {
                invoice.number.to_uppercase().contains(&n.to_uppercase())
            })
            && self
                .occupation_id
                .as_ref()
                .map_or(true, |o| &invoice.occupation_id == o)
    }
}

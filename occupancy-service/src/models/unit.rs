use super::InvoiceAmounts;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    Vacant,
    Occupied,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vacant => "VACANT",
            Self::Occupied => "OCCUPIED",
        }
    }
}

/// A rentable unit and its rates. Owned by the property catalogue; this
/// service only reads it and flips its status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub floor: Option<i32>,
    pub status: UnitStatus,
    pub advance_in_months: u32,
    pub rent_per_month: Decimal,
    #[serde(default)]
    pub security_per_month: Decimal,
    #[serde(default)]
    pub garbage_per_month: Decimal,
    #[serde(default)]
    pub other_amounts_per_month: BTreeMap<String, Decimal>,
    #[serde(default)]
    pub security_advance: Decimal,
    #[serde(default)]
    pub garbage_advance: Decimal,
    #[serde(default)]
    pub other_amounts_advance: BTreeMap<String, Decimal>,
}

impl Unit {
    /// Charges billed up front: rent for the advance months plus the flat
    /// advance deposits.
    pub fn advance_charges(&self) -> Result<InvoiceAmounts, AppError> {
        let rent_amount = self
            .rent_per_month
            .checked_mul(Decimal::from(self.advance_in_months))
            .ok_or_else(super::amount_overflow)?;
        Ok(InvoiceAmounts {
            rent_amount,
            security_amount: self.security_advance,
            garbage_amount: self.garbage_advance,
            other_amounts: self.other_amounts_advance.clone(),
        })
    }

    /// One month of regular charges.
    pub fn monthly_charges(&self) -> InvoiceAmounts {
        InvoiceAmounts {
            rent_amount: self.rent_per_month,
            security_amount: self.security_per_month,
            garbage_amount: self.garbage_per_month,
            other_amounts: self.other_amounts_per_month.clone(),
        }
    }

    /// Minimum payment that secures a booking: the advance plus the first month.
    pub fn required_upfront(&self) -> Result<Decimal, AppError> {
        super::checked_total([
            self.advance_charges()?.total()?,
            self.monthly_charges().total()?,
        ])
    }
}

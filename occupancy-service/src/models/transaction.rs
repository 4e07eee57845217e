use super::SortOrder;
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

/// Ledger entry direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Debit,
    Credit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "DEBIT",
            Self::Credit => "CREDIT",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A posting waiting to be appended to an occupation's ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerPosting {
    Debit {
        occupation_id: String,
        invoice_id: String,
        amount_owed: Decimal,
    },
    Credit {
        occupation_id: String,
        receipt_id: String,
        amount_paid: Decimal,
    },
}

impl LedgerPosting {
    pub fn occupation_id(&self) -> &str {
        match self {
            Self::Debit { occupation_id, .. } | Self::Credit { occupation_id, .. } => occupation_id,
        }
    }

    pub fn transaction_type(&self) -> TransactionType {
        match self {
            Self::Debit { .. } => TransactionType::Debit,
            Self::Credit { .. } => TransactionType::Credit,
        }
    }

    /// Carried-forward balance after this posting lands on `balance`.
    pub fn applied_to(&self, balance: Decimal) -> Result<Decimal, AppError> {
        match self {
            Self::Debit { amount_owed, .. } => balance.checked_add(*amount_owed),
            Self::Credit { amount_paid, .. } => balance.checked_sub(*amount_paid),
        }
        .ok_or_else(|| {
            AppError::BadRequest(anyhow!(
                "Posting would take the balance of occupation {} past the largest supported amount!",
                self.occupation_id()
            ))
        })
    }
}

/// Immutable ledger entry of an occupation.
///
/// `sequence` is the 1-based position in the occupation's ledger and is
/// unique per occupation, so two writers that read the same predecessor
/// cannot both append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupationTransaction {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub occupation_id: String,
    pub sequence: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_transaction_id: Option<String>,
    #[serde(default)]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub receipt_id: Option<String>,
    pub total_amount_owed: Decimal,
    pub total_amount_paid: Decimal,
    pub total_amount_carried_forward: Decimal,
    pub created_on: DateTime<Utc>,
}

impl OccupationTransaction {
    /// Build the entry that follows `previous` (or opens the ledger).
    pub fn following(
        previous: Option<&OccupationTransaction>,
        posting: &LedgerPosting,
    ) -> Result<Self, AppError> {
        let brought_forward = previous
            .map(|p| p.total_amount_carried_forward)
            .unwrap_or(Decimal::ZERO);

        let (invoice_id, receipt_id, owed, paid) = match posting {
            LedgerPosting::Debit {
                invoice_id,
                amount_owed,
                ..
            } => (Some(invoice_id.clone()), None, *amount_owed, Decimal::ZERO),
            LedgerPosting::Credit {
                receipt_id,
                amount_paid,
                ..
            } => (None, Some(receipt_id.clone()), Decimal::ZERO, *amount_paid),
        };

        Ok(Self {
            id: super::new_id(),
            transaction_type: posting.transaction_type(),
            occupation_id: posting.occupation_id().to_string(),
            sequence: previous.map(|p| p.sequence + 1).unwrap_or(1),
            previous_transaction_id: previous.map(|p| p.id.clone()),
            invoice_id,
            receipt_id,
            total_amount_owed: owed,
            total_amount_paid: paid,
            total_amount_carried_forward: posting.applied_to(brought_forward)?,
            created_on: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionFilter {
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
    pub occupation_id: Option<String>,
    pub invoice_id: Option<String>,
    pub receipt_id: Option<String>,
    #[serde(default)]
    pub order: SortOrder,
}

impl TransactionFilter {
    /// Blank values dropped and the invoice/receipt combination checked.
    pub fn validated(self) -> Result<Self, AppError> {
        let filter = Self {
            occupation_id: super::non_blank(self.occupation_id),
            invoice_id: super::non_blank(self.invoice_id),
            receipt_id: super::non_blank(self.receipt_id),
            ..self
        };

        if filter.invoice_id.is_some() && filter.receipt_id.is_some() {
            return Err(AppError::BadRequest(anyhow!(
                "Choose either invoiceId or receiptId. Both will not exist!"
            )));
        }
        match filter.transaction_type {
            Some(TransactionType::Credit) if filter.invoice_id.is_some() => Err(
                AppError::BadRequest(anyhow!("CREDIT will not have an invoice id!")),
            ),
            Some(TransactionType::Debit) if filter.receipt_id.is_some() => Err(
                AppError::BadRequest(anyhow!("DEBIT will not have an receipt id!")),
            ),
            _ => Ok(filter),
        }
    }

    pub fn matches(&self, entry: &OccupationTransaction) -> bool {
        self.transaction_type
            .map_or(true, |t| entry.transaction_type == t)
            && self
                .occupation_id
                .as_ref()
                .map_or(true, |o| &entry.occupation_id == o)
            && self
                .invoice_id
                .as_ref()
                .map_or(true, |i| entry.invoice_id.as_ref() == Some(i))
            && self
                .receipt_id
                .as_ref()
                .map_or(true, |r| entry.receipt_id.as_ref() == Some(r))
    }
}

/// Running totals of an occupation's ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerBalance {
    pub occupation_id: String,
    pub total_amount_owed: Decimal,
    pub total_amount_paid: Decimal,
    pub total_amount_carried_forward: Decimal,
    pub entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_transaction_id: Option<String>,
}

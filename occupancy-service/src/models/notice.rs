use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoticeStatus {
    AwaitingExit,
    Active,
    Closed,
    Fulfilled,
    Cancelled,
}

impl NoticeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingExit => "AWAITING_EXIT",
            Self::Active => "ACTIVE",
            Self::Closed => "CLOSED",
            Self::Fulfilled => "FULFILLED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Statuses that still gate re-occupation of the unit.
    pub const ACTIVE: [NoticeStatus; 2] = [Self::AwaitingExit, Self::Active];

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }
}

/// A tenant's notice to vacate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    #[serde(rename = "_id")]
    pub id: String,
    pub occupation_id: String,
    pub status: NoticeStatus,
    pub notice_date: NaiveDate,
    pub vacating_date: NaiveDate,
    pub created_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_on: Option<DateTime<Utc>>,
}

use super::{SortOrder, TenantRef};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OccupationStatus {
    PendingOccupation,
    Current,
    PendingVacating,
    Vacated,
    Moved,
}

impl OccupationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingOccupation => "PENDING_OCCUPATION",
            Self::Current => "CURRENT",
            Self::PendingVacating => "PENDING_VACATING",
            Self::Vacated => "VACATED",
            Self::Moved => "MOVED",
        }
    }

    /// Still holds a claim on its unit.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            Self::PendingOccupation | Self::Current | Self::PendingVacating
        )
    }
}

impl std::fmt::Display for OccupationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One tenancy of one unit by one tenant.
///
/// `booking_slot` carries the unit id while the occupation is a pending
/// booking and `tenancy_slot` while the tenant is in residence (current or
/// serving notice). Both are backed by unique indexes, so a unit can have at
/// most one booking and one tenancy at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Occupation {
    #[serde(rename = "_id")]
    pub id: String,
    pub number: String,
    pub status: OccupationStatus,
    pub unit_id: String,
    pub tenant_id: String,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_slot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenancy_slot: Option<String>,
    pub created_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_on: Option<DateTime<Utc>>,
}

impl Occupation {
    /// A fresh booking holding the unit's booking slot.
    pub fn booked(number: String, unit_id: &str, tenant_id: &str, start_date: NaiveDate) -> Self {
        Self {
            id: super::new_id(),
            number,
            status: OccupationStatus::PendingOccupation,
            unit_id: unit_id.to_string(),
            tenant_id: tenant_id.to_string(),
            start_date,
            end_date: None,
            booking_slot: Some(unit_id.to_string()),
            tenancy_slot: None,
            created_on: Utc::now(),
            modified_on: None,
        }
    }

    /// Apply a transition in memory, mirroring what the store persists.
    pub fn apply(&mut self, change: &OccupationChange) {
        self.status = change.status;
        self.booking_slot = change.booking_slot.clone();
        self.tenancy_slot = change.tenancy_slot.clone();
        if change.end_date.is_some() {
            self.end_date = change.end_date;
        }
        self.modified_on = Some(Utc::now());
    }
}

/// Target state of a status transition. Slots set to `None` are released.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupationChange {
    pub status: OccupationStatus,
    pub booking_slot: Option<String>,
    pub tenancy_slot: Option<String>,
    pub end_date: Option<NaiveDate>,
}

impl OccupationChange {
    /// Booking becomes a tenancy.
    pub fn activate(unit_id: &str) -> Self {
        Self {
            status: OccupationStatus::Current,
            booking_slot: None,
            tenancy_slot: Some(unit_id.to_string()),
            end_date: None,
        }
    }

    /// Tenant has filed a notice; the tenancy slot is kept until exit.
    pub fn notice_given(unit_id: &str) -> Self {
        Self {
            status: OccupationStatus::PendingVacating,
            booking_slot: None,
            tenancy_slot: Some(unit_id.to_string()),
            end_date: None,
        }
    }

    /// Tenancy has ended; the unit is released.
    pub fn close(outcome: VacateOutcome, end_date: NaiveDate) -> Self {
        Self {
            status: outcome.status(),
            booking_slot: None,
            tenancy_slot: None,
            end_date: Some(end_date),
        }
    }
}

/// How a tenancy ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VacateOutcome {
    #[default]
    Vacated,
    Moved,
}

impl VacateOutcome {
    pub fn status(self) -> OccupationStatus {
        match self {
            Self::Vacated => OccupationStatus::Vacated,
            Self::Moved => OccupationStatus::Moved,
        }
    }
}

/// Input for standing up a new tenancy.
#[derive(Debug, Clone)]
pub struct CreateOccupation {
    pub tenant: TenantRef,
    pub unit_id: String,
    pub payment_id: String,
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OccupationFilter {
    pub status: Option<OccupationStatus>,
    pub unit_id: Option<String>,
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub order: SortOrder,
}

impl OccupationFilter {
    pub fn normalized(self) -> Self {
        Self {
            unit_id: super::non_blank(self.unit_id),
            tenant_id: super::non_blank(self.tenant_id),
            ..self
        }
    }

    pub fn matches(&self, occupation: &Occupation) -> bool {
        self.status.map_or(true, |s| occupation.status == s)
            && self.unit_id.as_ref().map_or(true, |u| &occupation.unit_id == u)
            && self
                .tenant_id
                .as_ref()
                .map_or(true, |t| &occupation.tenant_id == t)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    #[serde(rename = "_id")]
    pub id: String,
    pub first_name: String,
    pub surname: String,
    pub mobile_number: String,
    pub email: String,
    pub created_on: DateTime<Utc>,
}

/// Contact details for a tenant created inline with an occupation.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TenantDetails {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub surname: String,
    #[validate(length(min = 7, max = 20))]
    pub mobile_number: String,
    #[validate(email)]
    pub email: String,
}

/// The incoming tenant of an occupation request.
#[derive(Debug, Clone)]
pub enum TenantRef {
    Existing(String),
    New(TenantDetails),
}

//! Request and response bodies of the HTTP surface that have no model of
//! their own.

use crate::models::{CreateOccupation, Notice, Occupation, TenantDetails, TenantRef, VacateOutcome};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

/// Either `tenant_id` of a known tenant or inline `tenant` details.
#[derive(Debug, Deserialize)]
pub struct CreateOccupationRequest {
    pub unit_id: String,
    pub payment_id: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub tenant: Option<TenantDetails>,
}

impl TryFrom<CreateOccupationRequest> for CreateOccupation {
    type Error = AppError;

    fn try_from(request: CreateOccupationRequest) -> Result<Self, Self::Error> {
        let tenant_id = request.tenant_id.filter(|id| !id.trim().is_empty());
        let tenant = match (tenant_id, request.tenant) {
            (Some(id), None) => TenantRef::Existing(id),
            (None, Some(details)) => TenantRef::New(details),
            (Some(_), Some(_)) => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Provide either tenant_id or tenant details, not both!"
                )))
            }
            (None, None) => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "A tenant_id or tenant details are required!"
                )))
            }
        };

        Ok(Self {
            tenant,
            unit_id: request.unit_id,
            payment_id: request.payment_id,
            start_date: request.start_date,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct GiveNoticeRequest {
    /// Defaults to today.
    #[serde(default)]
    pub notice_date: Option<NaiveDate>,
    pub vacating_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct NoticeResponse {
    pub occupation: Occupation,
    pub notice: Notice,
}

#[derive(Debug, Default, Deserialize)]
pub struct CloseOccupationRequest {
    /// Defaults to today.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub outcome: VacateOutcome,
}

/// Optional body of the date-driven sweeps.
#[derive(Debug, Default, Deserialize)]
pub struct SweepRequest {
    /// Defaults to today.
    #[serde(default)]
    pub today: Option<NaiveDate>,
}

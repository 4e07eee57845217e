//! Operator-triggered sweeps. The host schedules these; nothing runs in the
//! background inside the service.

use crate::dtos::SweepRequest;
use crate::models::SweepReport;
use crate::startup::AppState;
use axum::{extract::State, Json};
use chrono::{NaiveDate, Utc};
use service_core::error::AppError;

/// Receipt unclaimed mobile payments against the occupations they quote.
pub async fn sweep_payments(State(state): State<AppState>) -> Result<Json<SweepReport>, AppError> {
    Ok(Json(
        state
            .services
            .receipts
            .claim_unclaimed_mobile_payments()
            .await?,
    ))
}

/// Activate bookings whose start date has arrived.
pub async fn sweep_occupations(
    State(state): State<AppState>,
    body: Option<Json<SweepRequest>>,
) -> Result<Json<SweepReport>, AppError> {
    let today = sweep_date(body);
    Ok(Json(state.services.occupations.activate_due(today).await?))
}

/// Bill the current month's rent to every tenancy not yet billed for it.
pub async fn sweep_rent_invoices(
    State(state): State<AppState>,
    body: Option<Json<SweepRequest>>,
) -> Result<Json<SweepReport>, AppError> {
    let today = sweep_date(body);
    Ok(Json(
        state.services.invoices.invoice_current_rent(today).await?,
    ))
}

/// Vacate tenancies whose notice period has run out.
pub async fn sweep_vacating(
    State(state): State<AppState>,
    body: Option<Json<SweepRequest>>,
) -> Result<Json<SweepReport>, AppError> {
    let today = sweep_date(body);
    Ok(Json(state.services.occupations.vacate_due(today).await?))
}

fn sweep_date(body: Option<Json<SweepRequest>>) -> NaiveDate {
    body.and_then(|Json(request)| request.today)
        .unwrap_or_else(|| Utc::now().date_naive())
}

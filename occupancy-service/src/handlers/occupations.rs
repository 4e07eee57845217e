use crate::dtos::{
    CloseOccupationRequest, CreateOccupationRequest, GiveNoticeRequest, NoticeResponse,
};
use crate::models::{CreateOccupation, LedgerBalance, Occupation, OccupationFilter};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;

pub async fn create_occupation(
    State(state): State<AppState>,
    Json(payload): Json<CreateOccupationRequest>,
) -> Result<(StatusCode, Json<Occupation>), AppError> {
    let request = CreateOccupation::try_from(payload)?;
    let occupation = state.services.occupations.create(request).await?;
    Ok((StatusCode::CREATED, Json(occupation)))
}

pub async fn list_occupations(
    State(state): State<AppState>,
    Query(filter): Query<OccupationFilter>,
) -> Result<Json<Vec<Occupation>>, AppError> {
    Ok(Json(state.services.occupations.find(filter).await?))
}

/// Looks up by id, falling back to the occupation number tenants quote.
pub async fn get_occupation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Occupation>, AppError> {
    let occupations = &state.services.occupations;
    match occupations.find_by_id(&id).await {
        Err(AppError::NotFound(_)) => Ok(Json(occupations.find_by_number(&id).await?)),
        other => Ok(Json(other?)),
    }
}

pub async fn activate_occupation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Occupation>, AppError> {
    Ok(Json(state.services.occupations.activate(&id).await?))
}

pub async fn give_notice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<GiveNoticeRequest>,
) -> Result<(StatusCode, Json<NoticeResponse>), AppError> {
    let notice_date = payload
        .notice_date
        .unwrap_or_else(|| Utc::now().date_naive());
    let (occupation, notice) = state
        .services
        .notices
        .give_notice(&id, notice_date, payload.vacating_date)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(NoticeResponse { occupation, notice }),
    ))
}

pub async fn close_occupation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<CloseOccupationRequest>,
) -> Result<Json<Occupation>, AppError> {
    let end_date = payload.end_date.unwrap_or_else(|| Utc::now().date_naive());
    Ok(Json(
        state
            .services
            .occupations
            .close(&id, end_date, payload.outcome)
            .await?,
    ))
}

pub async fn occupation_balance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LedgerBalance>, AppError> {
    Ok(Json(state.services.occupations.balance(&id).await?))
}

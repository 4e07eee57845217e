use crate::models::{OccupationTransaction, TransactionFilter};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use service_core::error::AppError;

pub async fn list_transactions(
    State(state): State<AppState>,
    Query(filter): Query<TransactionFilter>,
) -> Result<Json<Vec<OccupationTransaction>>, AppError> {
    Ok(Json(state.services.ledger.find(filter).await?))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OccupationTransaction>, AppError> {
    Ok(Json(state.services.ledger.find_by_id(&id).await?))
}

use crate::models::{CreateReceipt, Receipt, ReceiptFilter};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

pub async fn create_receipt(
    State(state): State<AppState>,
    Json(payload): Json<CreateReceipt>,
) -> Result<(StatusCode, Json<Receipt>), AppError> {
    let receipt = state.services.receipts.create(payload).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn list_receipts(
    State(state): State<AppState>,
    Query(filter): Query<ReceiptFilter>,
) -> Result<Json<Vec<Receipt>>, AppError> {
    Ok(Json(state.services.receipts.find(filter).await?))
}

pub async fn get_receipt(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Receipt>, AppError> {
    Ok(Json(state.services.receipts.find_by_id(&id).await?))
}

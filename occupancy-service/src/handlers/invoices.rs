use crate::models::{CreateInvoice, Invoice, InvoiceFilter};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

pub async fn create_invoice(
    State(state): State<AppState>,
    Json(payload): Json<CreateInvoice>,
) -> Result<(StatusCode, Json<Invoice>), AppError> {
    let invoice = state.services.invoices.create(payload).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    Query(filter): Query<InvoiceFilter>,
) -> Result<Json<Vec<Invoice>>, AppError> {
    Ok(Json(state.services.invoices.find(filter).await?))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(state.services.invoices.find_by_id(&id).await?))
}

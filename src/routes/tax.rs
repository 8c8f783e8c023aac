use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{utils, AppState};
use crate::error::ApiError;
use crate::services::tax::TaxItem;

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub items: Vec<TaxItem>,
    pub destination_state: String,
    #[serde(default)]
    pub freight: Decimal,
}

async fn quote(
    State(state): State<AppState>,
    body: Result<Json<QuoteRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = utils::json_body(body)?;
    let breakdown = state
        .tax
        .quote(&req.items, &req.destination_state, req.freight)?;
    Ok(Json(breakdown))
}

pub fn tax_routes(state: AppState) -> Router {
    Router::new()
        .route("/tax/quote", post(quote))
        .with_state(state)
}

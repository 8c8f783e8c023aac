use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use super::{utils, AppState};
use crate::error::ApiError;
use crate::services::withdrawal::WithdrawalRequest;

async fn request_withdrawal(
    headers: HeaderMap,
    State(state): State<AppState>,
    body: Result<Json<WithdrawalRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let session = utils::validate_auth_token(&headers, &state.auth)?;
    let req = utils::json_body(body)?;
    let withdrawal = state.withdrawals.request(session.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(withdrawal)))
}

async fn list_withdrawals(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let session = utils::validate_auth_token(&headers, &state.auth)?;
    let withdrawals = state.withdrawals.list_for_seller(session.user_id).await?;
    Ok(Json(withdrawals))
}

pub fn withdrawal_routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/seller/withdrawals",
            get(list_withdrawals).post(request_withdrawal),
        )
        .with_state(state)
}

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use super::{utils, AppState};
use crate::error::ApiError;
use crate::services::auth::{LoginRequest, RefreshTokenRequest, RegisterRequest};

// New seller: user row plus an empty ledger account
async fn register_handler(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = utils::json_body(body)?;
    let response = state.auth.register(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn login_handler(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = utils::json_body(body)?;
    let response = state.auth.login(req).await?;
    Ok((StatusCode::OK, Json(response)))
}

async fn refresh_token_handler(
    State(state): State<AppState>,
    body: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = utils::json_body(body)?;
    let response = state.auth.refresh_token(req.refresh_token).await?;
    Ok((StatusCode::OK, Json(response)))
}

pub fn auth_routes(state: AppState) -> Router {
    Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/refresh", post(refresh_token_handler))
        .with_state(state)
}

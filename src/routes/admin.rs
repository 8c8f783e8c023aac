use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{utils, AppState};
use crate::domain::{AccountTransaction, Withdrawal, WithdrawalStatus};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct StatusFilter {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewNote {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreditRequest {
    pub amount: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LockRequest {
    pub locked_until: Option<DateTime<Utc>>,
}

/// A review that moved money: the withdrawal and the ledger entry it posted.
#[derive(Debug, Serialize)]
pub struct ReviewOutcome {
    pub withdrawal: Withdrawal,
    pub entry: AccountTransaction,
}

async fn list_withdrawals(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(filter): Query<StatusFilter>,
) -> Result<impl IntoResponse, ApiError> {
    utils::require_admin(&headers, &state.auth)?;
    let status = match filter.status.as_deref() {
        None => WithdrawalStatus::Pending,
        Some(raw) => raw.to_ascii_uppercase().parse::<WithdrawalStatus>().map_err(|_| {
            ApiError::Validation {
                message: format!("unknown withdrawal status: {raw}"),
                fields: vec!["status"],
            }
        })?,
    };
    let withdrawals = state.withdrawals.list_by_status(status).await?;
    Ok(Json(withdrawals))
}

async fn approve(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = utils::require_admin(&headers, &state.auth)?;
    let (withdrawal, entry) = state.withdrawals.approve(id, admin.user_id).await?;
    Ok(Json(ReviewOutcome { withdrawal, entry }))
}

// the body is optional, a request without one rejects without a reason
async fn reject(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    note: Result<Json<ReviewNote>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = utils::require_admin(&headers, &state.auth)?;
    let note = utils::optional_json_body(note)?;
    let withdrawal = state
        .withdrawals
        .reject(id, admin.user_id, note.reason.as_deref())
        .await?;
    Ok(Json(withdrawal))
}

async fn process(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = utils::require_admin(&headers, &state.auth)?;
    let withdrawal = state.withdrawals.start_processing(id, admin.user_id).await?;
    Ok(Json(withdrawal))
}

async fn complete(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = utils::require_admin(&headers, &state.auth)?;
    let withdrawal = state.withdrawals.complete(id, admin.user_id).await?;
    Ok(Json(withdrawal))
}

async fn fail(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    note: Result<Json<ReviewNote>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = utils::require_admin(&headers, &state.auth)?;
    let note = utils::json_body(note)?;
    let reason = match note.reason.as_deref().map(str::trim) {
        Some(reason) if !reason.is_empty() => reason.to_string(),
        _ => {
            return Err(ApiError::Validation {
                message: "a failure reason is required".into(),
                fields: vec!["reason"],
            })
        }
    };
    let (withdrawal, entry) = state.withdrawals.fail(id, admin.user_id, &reason).await?;
    Ok(Json(ReviewOutcome { withdrawal, entry }))
}

async fn credit(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(number): Path<String>,
    body: Result<Json<CreditRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = utils::require_admin(&headers, &state.auth)?;
    let req = utils::json_body(body)?;
    let entry = state
        .accounts
        .credit(admin.user_id, &number, req.amount, req.description)
        .await?;
    Ok(Json(entry))
}

async fn lock(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(number): Path<String>,
    body: Result<Json<LockRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = utils::require_admin(&headers, &state.auth)?;
    let req = utils::optional_json_body(body)?;
    let account = state
        .accounts
        .lock(admin.user_id, &number, req.locked_until)
        .await?;
    Ok(Json(account))
}

async fn unlock(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = utils::require_admin(&headers, &state.auth)?;
    let account = state.accounts.unlock(admin.user_id, &number).await?;
    Ok(Json(account))
}

pub fn admin_routes(state: AppState) -> Router {
    Router::new()
        .route("/admin/withdrawals", get(list_withdrawals))
        .route("/admin/withdrawals/:id/approve", post(approve))
        .route("/admin/withdrawals/:id/reject", post(reject))
        .route("/admin/withdrawals/:id/process", post(process))
        .route("/admin/withdrawals/:id/complete", post(complete))
        .route("/admin/withdrawals/:id/fail", post(fail))
        .route("/admin/accounts/:number/credit", post(credit))
        .route("/admin/accounts/:number/lock", post(lock))
        .route("/admin/accounts/:number/unlock", post(unlock))
        .with_state(state)
}

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{sse::Event, IntoResponse, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use uuid::Uuid;

use super::{utils, AppState};
use crate::error::ApiError;
use crate::services::transfer::TransferRequest;

async fn account_summary(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let session = utils::validate_auth_token(&headers, &state.auth)?;
    let summary = state.withdrawals.balance(session.user_id).await?;
    Ok(Json(summary))
}

async fn create_transfer(
    headers: HeaderMap,
    State(state): State<AppState>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Starting transfer process");
    let session = utils::validate_auth_token(&headers, &state.auth)?;

    // unreadable payloads still count against the limiter and the audit log
    let payload = body
        .map_err(|_| vec!["body"])
        .and_then(|Json(value)| TransferRequest::from_json(value));
    let outcome = match payload {
        Ok(transfer) => state.transfers.transfer(session.user_id, transfer).await,
        Err(fields) => Err(state.transfers.reject_malformed(session.user_id, fields).await),
    };

    match outcome {
        Ok(receipt) => {
            tracing::info!("Transfer successful with reference: {}", receipt.reference_id);
            Ok((StatusCode::OK, Json(receipt)))
        }
        Err(err) => {
            tracing::warn!("Transfer by {} refused [{}]: {err}", session.user_id, err.code());
            Err(err.into())
        }
    }
}

// a single ledger entry, owned by the caller, with its signature checked
async fn get_transaction(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = utils::validate_auth_token(&headers, &state.auth)?;
    let entry = state.accounts.entry(session.user_id, transaction_id).await?;
    Ok(Json(entry))
}

// the caller's full ledger in posting order, streamed as server-sent events
async fn list_transactions(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let session = utils::validate_auth_token(&headers, &state.auth)?;
    let entries = state.accounts.statement(session.user_id).await?;

    let stream = futures::stream::iter(entries).map(|entry| Event::default().json_data(entry));

    let sse = Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(std::time::Duration::from_secs(2))
            .text("keep-alive-text"),
    );

    Ok(sse)
}

pub fn account_routes(state: AppState) -> Router {
    Router::new()
        .route("/seller/account", get(account_summary))
        .route("/seller/account/transfer", post(create_transfer))
        .route("/seller/account/transactions", get(list_transactions))
        .route("/seller/account/transactions/:id", get(get_transaction))
        .with_state(state)
}

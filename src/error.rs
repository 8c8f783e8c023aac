use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::db::StoreError;
use crate::services::{
    account::AccountError, auth::AuthError, tax::TaxError, transfer::TransferError,
    withdrawal::WithdrawalError,
};

/// Error body returned by every handler: `{"error": "...", "fields": [...]}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        message: String,
        fields: Vec<&'static str>,
    },
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    TooManyRequests(String),
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn validation(message: impl Into<String>, fields: Vec<&'static str>) -> Self {
        ApiError::Validation {
            message: message.into(),
            fields,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Validation { message, fields } => json!({ "error": message, "fields": fields }),
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound("not found".into()),
            StoreError::BalanceLimit => ApiError::BadRequest(err.to_string()),
            other => {
                tracing::error!("storage failure: {other}");
                ApiError::Internal
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::UserExists => ApiError::Conflict(err.to_string()),
            AuthError::WeakPassword(_) => ApiError::validation(err.to_string(), vec!["password"]),
            AuthError::InvalidCredentials
            | AuthError::InvalidToken
            | AuthError::InvalidRefreshToken => ApiError::Unauthorized(err.to_string()),
            AuthError::Hash | AuthError::Token(_) => {
                tracing::error!("auth failure: {err}");
                ApiError::Internal
            }
            AuthError::Store(store) => store.into(),
        }
    }
}

impl From<TransferError> for ApiError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Validation(fields) => ApiError::validation("invalid transfer payload", fields),
            TransferError::RateLimited => ApiError::TooManyRequests(err.to_string()),
            TransferError::AccountLocked { until: Some(until) } => {
                ApiError::Forbidden(format!("account is locked until {}", until.to_rfc3339()))
            }
            TransferError::AccountLocked { until: None } | TransferError::Suspicious(_) => {
                ApiError::Forbidden(err.to_string())
            }
            TransferError::SourceNotFound | TransferError::DestinationNotFound => {
                ApiError::NotFound(err.to_string())
            }
            TransferError::AmountOutOfBounds { .. }
            | TransferError::InsufficientBalance
            | TransferError::DailyLimitExceeded { .. }
            | TransferError::DestinationInactive
            | TransferError::SelfTransfer
            | TransferError::DestinationLimit => ApiError::BadRequest(err.to_string()),
            TransferError::Store(store) => store.into(),
        }
    }
}

impl From<WithdrawalError> for ApiError {
    fn from(err: WithdrawalError) -> Self {
        match err {
            WithdrawalError::Validation(fields) => {
                ApiError::validation("invalid withdrawal request", fields)
            }
            WithdrawalError::BelowMinimum(_)
            | WithdrawalError::ExceedsAvailable(_)
            | WithdrawalError::AlreadyInFlight
            | WithdrawalError::InsufficientBalance => ApiError::BadRequest(err.to_string()),
            WithdrawalError::AccountLocked => ApiError::Forbidden(err.to_string()),
            WithdrawalError::AccountNotFound | WithdrawalError::NotFound => {
                ApiError::NotFound(err.to_string())
            }
            WithdrawalError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            WithdrawalError::Store(store) => store.into(),
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::AccountNotFound | AccountError::EntryNotFound => {
                ApiError::NotFound(err.to_string())
            }
            AccountError::InvalidAmount | AccountError::BalanceLimit(_) => {
                ApiError::validation(err.to_string(), vec!["amount"])
            }
            AccountError::InvalidLockExpiry => {
                ApiError::validation(err.to_string(), vec!["locked_until"])
            }
            AccountError::Store(store) => store.into(),
        }
    }
}

impl From<TaxError> for ApiError {
    fn from(err: TaxError) -> Self {
        let field = match &err {
            TaxError::InvalidItem { field, .. } => *field,
            TaxError::InvalidState(_) => "destination_state",
            TaxError::InvalidFreight => "freight",
            TaxError::InvalidRate(_) => "rate",
            TaxError::Overflow => "items",
        };
        ApiError::validation(err.to_string(), vec![field])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_errors_map_to_statuses() {
        let cases = [
            (TransferError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (TransferError::Suspicious("x".into()), StatusCode::FORBIDDEN),
            (TransferError::InsufficientBalance, StatusCode::BAD_REQUEST),
            (TransferError::DestinationNotFound, StatusCode::NOT_FOUND),
            (TransferError::Validation(vec!["amount"]), StatusCode::BAD_REQUEST),
            (
                TransferError::Store(StoreError::Conflict("x")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn withdrawal_conflicts() {
        let err = WithdrawalError::InvalidTransition {
            current: crate::domain::WithdrawalStatus::Completed,
            requested: crate::domain::WithdrawalStatus::Approved,
        };
        let api = ApiError::from(err);
        assert_eq!(api.status(), StatusCode::CONFLICT);
        assert_eq!(
            api.to_string(),
            "withdrawal is COMPLETED and cannot become APPROVED"
        );
    }
}

use axum::{
    extract::rejection::JsonRejection,
    http::{header::AUTHORIZATION, HeaderMap},
    Json,
};

use crate::domain::Role;
use crate::error::ApiError;
use crate::services::auth::{AuthService, Session};

/// Accepts `Bearer <jwt>` as well as the bare token.
#[inline]
pub fn validate_auth_token(headers: &HeaderMap, service: &AuthService) -> Result<Session, ApiError> {
    let jwt_header_token = match headers.get(AUTHORIZATION).map(|token| token.to_str()) {
        Some(Ok(token)) => token.trim(),
        _ => {
            return Err(ApiError::Unauthorized("Invalid token".into()));
        }
    };
    let token = jwt_header_token
        .strip_prefix("Bearer ")
        .unwrap_or(jwt_header_token)
        .trim();

    match service.verify_token(token) {
        Ok(session) => Ok(session),
        Err(err) => {
            tracing::warn!("rejected bearer token: {err}");
            Err(ApiError::Unauthorized("Invalid token".into()))
        }
    }
}

#[inline]
pub fn require_admin(headers: &HeaderMap, service: &AuthService) -> Result<Session, ApiError> {
    let session = validate_auth_token(headers, service)?;
    if session.role != Role::Admin {
        tracing::warn!("admin route denied for user: {}", session.user_id);
        return Err(ApiError::Forbidden("admin role required".into()));
    }
    Ok(session)
}

/// Unwraps a JSON body taken as `Result`, so handlers can authenticate before
/// looking at it. Rejections become the usual `{"error", "fields"}` body.
pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            tracing::debug!("unreadable request body: {rejection}");
            Err(ApiError::Validation {
                message: rejection.body_text(),
                fields: vec!["body"],
            })
        }
    }
}

/// For endpoints where the body may be left out; a request without one gets `T::default()`.
pub fn optional_json_body<T: Default>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match body {
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        other => json_body(other),
    }
}

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, Request},
    response::IntoResponse,
    Router,
};
use tower_http::{
    compression::CompressionLayer, limit::RequestBodyLimitLayer,
    validate_request::ValidateRequestHeaderLayer,
};

use crate::config::Config;
use crate::db::Store;
use crate::error::ApiError;
use crate::security::{RateLimiter, TransferSigner};
use crate::services::{AccountService, AuthService, TaxCalculator, TransferService, WithdrawalService};

pub mod account;
pub mod admin;
pub mod auth;
pub mod tax;
pub mod utils;
pub mod withdrawal;

const BODY_LIMIT: usize = 1024 * 10; // 10KB limit

/// Shared handles every handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub transfers: Arc<TransferService>,
    pub withdrawals: Arc<WithdrawalService>,
    pub accounts: Arc<AccountService>,
    pub tax: Arc<TaxCalculator>,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<dyn Store>) -> Self {
        let signer = TransferSigner::new(config.signing_secret.as_bytes());
        Self {
            auth: Arc::new(AuthService::new(store.clone(), config.jwt_secret.clone())),
            transfers: Arc::new(TransferService::new(
                store.clone(),
                signer.clone(),
                RateLimiter::new(config.rate_limit_max, config.rate_limit_window),
                config.transfer_limits.clone(),
                config.suspicion.clone(),
            )),
            withdrawals: Arc::new(WithdrawalService::new(store.clone(), config.min_withdrawal)),
            accounts: Arc::new(AccountService::new(store, signer)),
            tax: Arc::new(TaxCalculator::new(config.tax.clone())),
        }
    }
}

fn require_authorization_header() -> ValidateRequestHeaderLayer<
    impl FnMut(&mut Request<Body>) -> Result<(), axum::response::Response> + Clone,
> {
    ValidateRequestHeaderLayer::custom(|request: &mut Request<Body>| {
        if request.headers().contains_key(AUTHORIZATION) {
            Ok(())
        } else {
            Err(ApiError::Unauthorized("Invalid token".into()).into_response())
        }
    })
}

pub fn router(state: AppState) -> Router {
    let head_route = Router::new();

    let auth_routes = auth::auth_routes(state.clone());
    let account_routes = account::account_routes(state.clone())
        .route_layer(require_authorization_header())
        .route_layer(CompressionLayer::new().gzip(true));
    let withdrawal_routes =
        withdrawal::withdrawal_routes(state.clone()).route_layer(require_authorization_header());
    let admin_routes = admin::admin_routes(state.clone()).route_layer(require_authorization_header());
    let tax_routes = tax::tax_routes(state);

    let api = auth_routes
        .merge(account_routes)
        .merge(withdrawal_routes)
        .merge(admin_routes)
        .merge(tax_routes);

    head_route
        .nest("/v1", api)
        .route_layer(RequestBodyLimitLayer::new(BODY_LIMIT))
}

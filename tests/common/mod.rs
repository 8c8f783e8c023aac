#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

use seller_ledger::config::Config;
use seller_ledger::db::{memory::MemoryStore, NewUser, UserStore};
use seller_ledger::domain::Role;
use seller_ledger::routes::{self, AppState};
use seller_ledger::security::SuspicionPolicy;
use seller_ledger::services::tax::TaxConfig;
use seller_ledger::services::transfer::TransferLimits;

pub const PASSWORD: &str = "Str0ng!Pass";

pub fn test_config() -> Config {
    Config {
        database_url: None,
        jwt_secret: "test-jwt-secret".into(),
        signing_secret: "test-signing-secret".into(),
        max_connection_pooling: 1,
        port: 0,
        log_file: "test.log".into(),
        transfer_limits: TransferLimits::default(),
        rate_limit_max: 5,
        rate_limit_window: Duration::from_secs(60),
        suspicion: SuspicionPolicy::default(),
        min_withdrawal: Decimal::new(20, 0),
        tax: TaxConfig::default(),
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: MemoryStore,
}

pub struct Seller {
    pub token: String,
    pub account_number: String,
}

impl TestApp {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let state = AppState::new(&test_config(), Arc::new(store.clone()));
        Self {
            router: routes::router(state.clone()),
            state,
            store,
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, bytes) = self.send_raw(method, uri, token, body).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    pub async fn register(&self, email: &str) -> Seller {
        let (status, body) = self
            .send(
                Method::POST,
                "/v1/auth/register",
                None,
                Some(json!({ "email": email, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        Seller {
            token: body["access_token"].as_str().unwrap().to_string(),
            account_number: body["account_number"].as_str().unwrap().to_string(),
        }
    }

    pub async fn admin_token(&self) -> String {
        let admin = self
            .store
            .create_user(NewUser {
                email: "admin@example.com",
                password_hash: "unused",
                full_name: Some("Back office"),
                role: Role::Admin,
            })
            .await
            .unwrap();
        let (access, _) = self.state.auth.generate_tokens(admin.id, Role::Admin).unwrap();
        access
    }

    pub async fn credit(&self, admin: &str, account_number: &str, amount: &str) {
        let (status, body) = self
            .send(
                Method::POST,
                &format!("/v1/admin/accounts/{account_number}/credit"),
                Some(admin),
                Some(json!({ "amount": amount, "description": "sale settlement" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    pub async fn balance(&self, token: &str) -> Decimal {
        let (status, body) = self.send(Method::GET, "/v1/seller/account", Some(token), None).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        money(&body["balance"])
    }
}

pub fn money(value: &Value) -> Decimal {
    match value {
        Value::String(raw) => raw.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}

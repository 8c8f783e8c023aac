mod common;

use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use serde_json::json;

use common::{money, TestApp};
use seller_ledger::domain::AuditAction;

#[tokio::test]
async fn transfer_moves_money_between_sellers() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let alice = app.register("alice@example.com").await;
    let bob = app.register("bob@example.com").await;
    app.credit(&admin, &alice.account_number, "150.00").await;

    let (status, receipt) = app
        .send(
            Method::POST,
            "/v1/seller/account/transfer",
            Some(&alice.token),
            Some(json!({ "destination_account": bob.account_number, "amount": "100.00" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{receipt}");
    assert_eq!(money(&receipt["balance_after"]), dec!(50));
    assert!(!receipt["signature"].as_str().unwrap().is_empty());

    assert_eq!(app.balance(&alice.token).await, dec!(50));
    assert_eq!(app.balance(&bob.token).await, dec!(100));

    let (status, body) = app
        .send(
            Method::POST,
            "/v1/seller/account/transfer",
            Some(&alice.token),
            Some(json!({ "destination_account": bob.account_number, "amount": "200.00" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(app.balance(&alice.token).await, dec!(50));
}

#[tokio::test]
async fn malformed_transfer_names_the_bad_fields() {
    let app = TestApp::new();
    let alice = app.register("alice@example.com").await;

    let (status, body) = app
        .send(
            Method::POST,
            "/v1/seller/account/transfer",
            Some(&alice.token),
            Some(json!({ "destination_account": "12ab", "amount": "-5" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields = body["fields"].as_array().unwrap();
    assert!(fields.contains(&json!("amount")));
    assert!(fields.contains(&json!("destination_account")));
}

#[tokio::test]
async fn ledger_entries_are_listed_and_verified() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let alice = app.register("alice@example.com").await;
    let bob = app.register("bob@example.com").await;
    app.credit(&admin, &alice.account_number, "80.00").await;

    let (status, _) = app
        .send(
            Method::POST,
            "/v1/seller/account/transfer",
            Some(&alice.token),
            Some(json!({ "destination_account": bob.account_number, "amount": "30.00" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, raw) = app
        .send_raw(
            Method::GET,
            "/v1/seller/account/transactions",
            Some(&alice.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(raw).unwrap();
    let events: Vec<serde_json::Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect();
    assert_eq!(events.len(), 2);

    let transfer_out = events
        .iter()
        .find(|event| event["kind"] == "TRANSFER_OUT")
        .unwrap();
    let id = transfer_out["id"].as_str().unwrap();
    let (status, entry) = app
        .send(
            Method::GET,
            &format!("/v1/seller/account/transactions/{id}"),
            Some(&alice.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{entry}");
    assert_eq!(entry["signature_valid"], json!(true));

    // other sellers cannot read it
    let (status, _) = app
        .send(
            Method::GET,
            &format!("/v1/seller/account/transactions/{id}"),
            Some(&bob.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn locked_account_cannot_send() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let alice = app.register("alice@example.com").await;
    let bob = app.register("bob@example.com").await;
    app.credit(&admin, &alice.account_number, "80.00").await;

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/v1/admin/accounts/{}/lock", alice.account_number),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let transfer = json!({ "destination_account": bob.account_number, "amount": "10.00" });
    let (status, _) = app
        .send(
            Method::POST,
            "/v1/seller/account/transfer",
            Some(&alice.token),
            Some(transfer.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/v1/admin/accounts/{}/unlock", alice.account_number),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            Method::POST,
            "/v1/seller/account/transfer",
            Some(&alice.token),
            Some(transfer),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn requests_without_a_valid_token_are_rejected() {
    let app = TestApp::new();

    let (status, _) = app.send(Method::GET, "/v1/seller/account", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(Method::GET, "/v1/seller/account", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token");
}

#[tokio::test]
async fn unreadable_transfers_are_limited_and_audited() {
    let app = TestApp::new();
    let alice = app.register("alice@example.com").await;
    let limit = common::test_config().rate_limit_max;

    for _ in 0..limit {
        let (status, body) = app
            .send(
                Method::POST,
                "/v1/seller/account/transfer",
                Some(&alice.token),
                Some(json!({ "amount": "abc" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(body["fields"], json!(["destination_account", "amount"]));
    }

    let (status, body) = app
        .send(
            Method::POST,
            "/v1/seller/account/transfer",
            Some(&alice.token),
            Some(json!({ "amount": "abc" })),
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS, "{body}");

    let events = app.store.audit_events().await;
    let failed = events
        .iter()
        .filter(|event| event.action == AuditAction::TransferFailed)
        .count();
    assert_eq!(failed, limit);
    assert_eq!(events.last().unwrap().action, AuditAction::TransferRateLimited);
}

#[tokio::test]
async fn bad_token_is_refused_before_the_body_is_read() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            Method::POST,
            "/v1/seller/account/transfer",
            Some("garbage"),
            Some(json!({ "amount": "abc" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token");
    assert!(app.store.audit_events().await.is_empty());
}

#[tokio::test]
async fn transfers_past_the_window_limit_get_429() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let alice = app.register("alice@example.com").await;
    let bob = app.register("bob@example.com").await;
    app.credit(&admin, &alice.account_number, "100.00").await;
    let limit = common::test_config().rate_limit_max;

    let transfer = json!({ "destination_account": bob.account_number, "amount": "1.00" });
    for _ in 0..limit {
        let (status, body) = app
            .send(
                Method::POST,
                "/v1/seller/account/transfer",
                Some(&alice.token),
                Some(transfer.clone()),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }
    let (status, body) = app
        .send(
            Method::POST,
            "/v1/seller/account/transfer",
            Some(&alice.token),
            Some(transfer),
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS, "{body}");
    assert!(body["error"].as_str().is_some());
    assert_eq!(
        app.balance(&alice.token).await,
        dec!(100) - rust_decimal::Decimal::from(limit)
    );
}

#[tokio::test]
async fn credits_past_the_balance_ceiling_are_refused() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let alice = app.register("alice@example.com").await;
    app.credit(&admin, &alice.account_number, "999999999999.00").await;

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/v1/admin/accounts/{}/credit", alice.account_number),
            Some(&admin),
            Some(json!({ "amount": "1.00" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["fields"], json!(["amount"]));

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/v1/admin/accounts/{}/credit", alice.account_number),
            Some(&admin),
            Some(json!({ "amount": "79228162514264337593543950335" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(app.balance(&alice.token).await, dec!(999999999999.00));
}

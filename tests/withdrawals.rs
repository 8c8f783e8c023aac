mod common;

use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use serde_json::json;

use common::{money, TestApp};

fn pix(amount: &str) -> serde_json::Value {
    json!({
        "amount": amount,
        "method": "PIX",
        "key": "seller@example.com",
        "key_type": "EMAIL",
    })
}

#[tokio::test]
async fn only_one_withdrawal_in_flight() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let seller = app.register("seller@example.com").await;
    app.credit(&admin, &seller.account_number, "150.00").await;

    let (status, withdrawal) = app
        .send(Method::POST, "/v1/seller/withdrawals", Some(&seller.token), Some(pix("50.00")))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{withdrawal}");
    assert_eq!(withdrawal["status"], "PENDING");
    // pending requests do not touch the ledger
    assert_eq!(app.balance(&seller.token).await, dec!(150));

    let (status, body) = app
        .send(Method::POST, "/v1/seller/withdrawals", Some(&seller.token), Some(pix("30.00")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, list) = app
        .send(Method::GET, "/v1/seller/withdrawals", Some(&seller.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn withdrawal_rules_are_enforced() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let seller = app.register("seller@example.com").await;
    app.credit(&admin, &seller.account_number, "40.00").await;

    let (status, _) = app
        .send(Method::POST, "/v1/seller/withdrawals", Some(&seller.token), Some(pix("10.00")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(Method::POST, "/v1/seller/withdrawals", Some(&seller.token), Some(pix("41.00")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let bad_key = json!({ "amount": "25.00", "method": "PIX", "key": "123", "key_type": "CPF" });
    let (status, body) = app
        .send(Method::POST, "/v1/seller/withdrawals", Some(&seller.token), Some(bad_key))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"], json!(["key"]));
}

#[tokio::test]
async fn admin_lifecycle_debits_and_refunds() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let seller = app.register("seller@example.com").await;
    app.credit(&admin, &seller.account_number, "150.00").await;

    let (_, withdrawal) = app
        .send(Method::POST, "/v1/seller/withdrawals", Some(&seller.token), Some(pix("50.00")))
        .await;
    let id = withdrawal["id"].as_str().unwrap().to_string();

    let (status, pending) = app
        .send(Method::GET, "/v1/admin/withdrawals", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let (status, approved) = app
        .send(
            Method::POST,
            &format!("/v1/admin/withdrawals/{id}/approve"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{approved}");
    assert_eq!(approved["withdrawal"]["status"], "APPROVED");
    assert_eq!(money(&approved["entry"]["balance_after"]), dec!(100));
    assert_eq!(app.balance(&seller.token).await, dec!(100));

    // approving twice is a state conflict
    let (status, _) = app
        .send(
            Method::POST,
            &format!("/v1/admin/withdrawals/{id}/approve"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/v1/admin/withdrawals/{id}/process"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, failed) = app
        .send(
            Method::POST,
            &format!("/v1/admin/withdrawals/{id}/fail"),
            Some(&admin),
            Some(json!({ "reason": "bank rejected the key" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{failed}");
    assert_eq!(failed["withdrawal"]["status"], "FAILED");
    assert_eq!(failed["entry"]["kind"], "WITHDRAWAL_REFUND");
    assert_eq!(app.balance(&seller.token).await, dec!(150));

    // a failed withdrawal no longer blocks a new one
    let (status, _) = app
        .send(Method::POST, "/v1/seller/withdrawals", Some(&seller.token), Some(pix("20.00")))
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn rejected_withdrawal_leaves_balance_alone() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let seller = app.register("seller@example.com").await;
    app.credit(&admin, &seller.account_number, "60.00").await;

    let (_, withdrawal) = app
        .send(Method::POST, "/v1/seller/withdrawals", Some(&seller.token), Some(pix("60.00")))
        .await;
    let id = withdrawal["id"].as_str().unwrap().to_string();

    let (status, rejected) = app
        .send(
            Method::POST,
            &format!("/v1/admin/withdrawals/{id}/reject"),
            Some(&admin),
            Some(json!({ "reason": "documents pending" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{rejected}");
    assert_eq!(rejected["status"], "REJECTED");
    assert_eq!(app.balance(&seller.token).await, dec!(60));

    let (status, list) = app
        .send(Method::GET, "/v1/admin/withdrawals?status=rejected", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn sellers_cannot_use_admin_routes() {
    let app = TestApp::new();
    let seller = app.register("seller@example.com").await;

    let (status, _) = app
        .send(Method::GET, "/v1/admin/withdrawals", Some(&seller.token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/v1/admin/accounts/{}/credit", seller.account_number),
            Some(&seller.token),
            Some(json!({ "amount": "1000.00" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(app.balance(&seller.token).await, dec!(0));
}

#[tokio::test]
async fn unreadable_withdrawal_bodies_get_the_error_body() {
    let app = TestApp::new();
    let seller = app.register("seller@example.com").await;
    let garbled = json!({ "amount": "abc", "method": "PIX" });

    let (status, _) = app
        .send(Method::POST, "/v1/seller/withdrawals", Some("garbage"), Some(garbled.clone()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(Method::POST, "/v1/seller/withdrawals", Some(&seller.token), Some(garbled))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"], json!(["body"]));
    assert!(body["error"].is_string());
}

mod common;

use axum::http::StatusCode;
use floorplan::api;
use serde_json::{json, Value};
use tower::util::ServiceExt;

async fn call(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };

    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn connect(app: &axum::Router, wallet: &str, email: &str) -> String {
    let (status, body) = call(
        app,
        "POST",
        "/v1/dealers/connect-wallet",
        Some(json!({
            "wallet_address": wallet,
            "name": "Bayside Auto",
            "address": "9 Pier Rd",
            "phone": "555-0199",
            "email": email
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_and_ready() {
    let env = common::setup().await;
    let app = api::create_router(env.state.clone());

    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = call(&app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_wallet_connection_is_idempotent() {
    let env = common::setup().await;
    let app = api::create_router(env.state.clone());

    let first = connect(&app, "0xAB12", "bay@example.com").await;
    let second = connect(&app, "0xab12", "bay@example.com").await;
    assert_eq!(first, second);

    let (status, body) = call(&app, "GET", "/v1/dealers/wallet/0xAB12", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], first.as_str());
    assert_eq!(body["data"]["kyc_status"], "pending");

    let (status, body) = call(
        &app,
        "POST",
        "/v1/dealers/connect-wallet",
        Some(json!({
            "wallet_address": "0xcd34",
            "name": "Other",
            "address": "x",
            "phone": "x",
            "email": "bay@example.com"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_loan_flow_over_http() {
    let env = common::setup().await;
    let app = api::create_router(env.state.clone());
    let dealer_id = connect(&app, "0xfeed", "feed@example.com").await;

    let (status, body) = call(
        &app,
        "POST",
        "/v1/loans",
        Some(json!({"dealer_id": dealer_id, "amount": 1200, "vehicles_financed": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    let loan = &body["data"];
    assert_eq!(loan["status"], "pending");
    assert_eq!(loan["currency"], "USDC");
    assert_eq!(loan["term_months"], 6);
    let loan_id = loan["id"].as_str().unwrap().to_string();

    let (status, body) = call(&app, "POST", &format!("/v1/loans/{loan_id}/approve"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["next_payment_amount"].as_f64(), Some(200.0));

    let (status, body) = call(&app, "POST", &format!("/v1/loans/{loan_id}/approve"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("pending"));

    let (status, body) = call(
        &app,
        "POST",
        &format!("/v1/loans/{loan_id}/payment"),
        Some(json!({"amount": 500})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["loan"]["remaining_balance"].as_f64(), Some(700.0));
    assert_eq!(body["data"]["transaction"]["type"], "payment");
    assert_eq!(body["data"]["transaction"]["method"], "ACH");

    let (status, body) = call(
        &app,
        "GET",
        &format!("/v1/loans?dealerId={dealer_id}&status=active"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = call(&app, "GET", &format!("/v1/loans/{loan_id}/transactions"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, body) = call(&app, "GET", &format!("/v1/dealers/{dealer_id}/reconcile"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["consistent"], true);

    let (status, body) = call(
        &app,
        "GET",
        &format!("/v1/transactions/dealer/{dealer_id}/summary?days=7"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_transactions"], 2);
    assert_eq!(body["data"]["total_disbursed"].as_f64(), Some(1200.0));
    assert_eq!(body["data"]["total_payments"].as_f64(), Some(500.0));
}

#[tokio::test]
async fn test_error_envelopes() {
    let env = common::setup().await;
    let app = api::create_router(env.state.clone());
    let dealer_id = connect(&app, "0xbead", "bead@example.com").await;

    let (status, body) = call(&app, "GET", "/v1/loans/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(body.get("data").is_none());

    let (status, _) = call(&app, "GET", "/v1/loans?status=bogus", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &app,
        "POST",
        "/v1/loans",
        Some(json!({"dealer_id": dealer_id, "amount": 1000, "term": 0, "vehicles_financed": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = call(
        &app,
        "POST",
        "/v1/loans",
        Some(json!({"dealer_id": dealer_id})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        "POST",
        "/v1/transactions",
        Some(json!({"dealer_id": dealer_id, "type": "payment", "amount": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &app,
        "POST",
        "/v1/loans",
        Some(json!({"dealer_id": dealer_id, "amount": 1e20, "vehicles_financed": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["success"], false);

    let (status, _) = call(
        &app,
        "POST",
        "/v1/transactions",
        Some(json!({"dealer_id": dealer_id, "type": "fee", "amount": 1e20})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &app,
        "POST",
        "/v1/transactions",
        Some(json!({"dealer_id": dealer_id, "type": "fee", "amount": 25})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["type"], "fee");
}

#[tokio::test]
async fn test_vehicle_and_audit_routes() {
    let env = common::setup().await;
    let app = api::create_router(env.state.clone());
    let dealer_id = connect(&app, "0xcafe", "cafe@example.com").await;

    let (status, body) = call(
        &app,
        "POST",
        "/v1/vehicles",
        Some(json!({
            "dealer_id": dealer_id,
            "vin": "5YJ3E1EA7KF317000",
            "make": "Tesla",
            "model": "Model 3",
            "year": 2019,
            "mileage": 41000,
            "color": "White",
            "price": 27500
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let vehicle_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["status"], "on_lot");

    let (status, body) = call(&app, "GET", "/v1/vehicles/vin/5yj3e1ea7kf317000", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], vehicle_id.as_str());

    let (status, body) = call(
        &app,
        "GET",
        &format!("/v1/vehicles?dealerId={dealer_id}&status=on_lot"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // No registered lot, so the configured default lot applies.
    let lot = env.state.config.default_lot;
    let (status, body) = call(
        &app,
        "POST",
        "/v1/audits/nfc-scan",
        Some(json!({
            "vin": "5YJ3E1EA7KF317000",
            "dealer_id": dealer_id,
            "auditor_wallet": "0xa0d1",
            "location": {"lat": lot.lat + 0.5, "lng": lot.lng}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "flagged");
    let audit_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &app,
        "POST",
        &format!("/v1/audits/{audit_id}/resolve"),
        Some(json!({"resolution_notes": "Moved to overflow lot"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "compliant");

    let (status, body) = call(
        &app,
        "GET",
        &format!("/v1/audits/vehicle/{vehicle_id}/history"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = call(&app, "GET", &format!("/v1/dealers/{dealer_id}/notifications"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = call(
        &app,
        "POST",
        &format!("/v1/vehicles/{vehicle_id}/sell"),
        Some(json!({"price": 26000})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "sold");

    let (status, _) = call(&app, "POST", &format!("/v1/vehicles/{vehicle_id}/sell"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(&app, "DELETE", &format!("/v1/vehicles/{vehicle_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, "GET", &format!("/v1/vehicles/{vehicle_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rewards_credit_dealer_tokens() {
    let env = common::setup().await;
    let app = api::create_router(env.state.clone());
    let dealer_id = connect(&app, "0xbeef", "beef@example.com").await;

    let (status, body) = call(
        &app,
        "POST",
        &format!("/v1/dealers/{dealer_id}/rewards"),
        Some(json!({"tokens": 250, "reason": "Early repayment"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["type"], "anvl_reward");
    assert_eq!(body["data"]["currency"], "ANVL");

    let (_, body) = call(&app, "GET", &format!("/v1/dealers/{dealer_id}"), None).await;
    assert_eq!(body["data"]["anvl_tokens"], 250);

    let (status, _) = call(
        &app,
        "POST",
        &format!("/v1/dealers/{dealer_id}/rewards"),
        Some(json!({"tokens": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

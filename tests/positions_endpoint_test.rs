use axum::http::StatusCode;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use termvault::api;
use termvault::config::Config;
use termvault::db::init_db;
use termvault::domain::DAY_MS;
use termvault::{ManualClock, Repository, TimeMs};
use tower::util::ServiceExt;

struct TestApp {
    app: axum::Router,
    clock: Arc<ManualClock>,
    _temp: TempDir,
}

async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    repo.seed_default_plans().await.unwrap();

    let mut env = HashMap::new();
    env.insert("DATABASE_PATH".to_string(), db_path);
    let config = Config::from_env_map(env).unwrap();

    let clock = Arc::new(ManualClock::new(TimeMs::new(0)));
    let state = api::AppState::new(repo, clock.clone(), &config);
    let app = api::create_router(state);

    TestApp {
        app,
        clock,
        _temp: temp_dir,
    }
}

async fn request(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn fund(app: &axum::Router, owner: i64, amount: u64) {
    let (status, _) = request(
        app,
        "POST",
        "/v1/admin/accounts",
        Some(json!({"ownerId": owner, "initialBalance": amount})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_health_and_plans() {
    let t = setup_test_app().await;

    let (status, body) = request(&t.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = request(&t.app, "GET", "/v1/plans", None).await;
    assert_eq!(status, StatusCode::OK);
    let plans = body["plans"].as_array().unwrap();
    assert_eq!(plans.len(), 6);
    assert_eq!(plans[0]["label"], "1D");
    assert_eq!(plans[1]["rewardPercentage"], "1");
    assert_eq!(plans[5]["maxAmount"], "1000000");
}

#[tokio::test]
async fn test_create_list_and_mature_over_http() {
    let t = setup_test_app().await;
    fund(&t.app, 1, 1500).await;

    let (status, created) = request(
        &t.app,
        "POST",
        "/v1/positions",
        Some(json!({"ownerId": 1, "amount": 1000, "duration": 7, "autoResubmit": false})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "active");
    assert_eq!(created["estimatedIncome"], "10");
    let id = created["id"].as_str().unwrap().to_string();

    t.clock.set(TimeMs::new(7 * DAY_MS / 2));
    let (status, listed) = request(&t.app, "GET", "/v1/positions?ownerId=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["positions"][0]["profit"], "5");
    assert_eq!(listed["summary"]["activePositions"], 1);
    assert_eq!(listed["summary"]["availableBalance"], "500");

    t.clock.set(TimeMs::new(7 * DAY_MS));
    let (status, report) = request(&t.app, "POST", "/v1/admin/process-positions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["due"], 1);
    assert_eq!(report["credited"], 1);

    let (_, listed) = request(&t.app, "GET", "/v1/positions?ownerId=1", None).await;
    assert_eq!(listed["positions"][0]["id"], id.as_str());
    assert_eq!(listed["positions"][0]["status"], "completed");
    assert_eq!(listed["summary"]["availableBalance"], "1510");
    assert_eq!(listed["summary"]["profitLoss"], "10");
}

#[tokio::test]
async fn test_create_position_validation() {
    let t = setup_test_app().await;
    fund(&t.app, 1, 100).await;

    let cases = [
        (json!({"ownerId": 1, "amount": 50, "duration": 3}), StatusCode::BAD_REQUEST),
        (json!({"ownerId": 1, "amount": 20000, "duration": 1}), StatusCode::BAD_REQUEST),
        (json!({"ownerId": 1, "amount": 500, "duration": 7}), StatusCode::CONFLICT),
        (json!({"ownerId": 2, "amount": 50, "duration": 7}), StatusCode::NOT_FOUND),
    ];
    for (body, expected) in cases {
        let (status, resp) = request(&t.app, "POST", "/v1/positions", Some(body.clone())).await;
        assert_eq!(status, expected, "body {} -> {}", body, resp);
        assert!(resp["error"].is_string());
    }
}

#[tokio::test]
async fn test_auto_resubmit_toggle_checks_owner() {
    let t = setup_test_app().await;
    fund(&t.app, 1, 1000).await;
    let (_, created) = request(
        &t.app,
        "POST",
        "/v1/positions",
        Some(json!({"ownerId": 1, "amount": 100, "duration": 1})),
    )
    .await;
    let uri = format!("/v1/positions/{}/auto-resubmit", created["id"].as_str().unwrap());

    let (status, _) = request(
        &t.app,
        "PUT",
        &uri,
        Some(json!({"ownerId": 2, "autoResubmit": true})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = request(
        &t.app,
        "PUT",
        &uri,
        Some(json!({"ownerId": 1, "autoResubmit": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["autoResubmit"], true);
}

#[tokio::test]
async fn test_admin_status_cancel_and_deposit() {
    let t = setup_test_app().await;
    fund(&t.app, 1, 100).await;
    let (_, created) = request(
        &t.app,
        "POST",
        "/v1/positions",
        Some(json!({"ownerId": 1, "amount": 100, "duration": 7})),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _) = request(
        &t.app,
        "PUT",
        &format!("/v1/admin/positions/{}/status", id),
        Some(json!({"status": "paused"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, cancelled) = request(
        &t.app,
        "POST",
        &format!("/v1/admin/positions/{}/cancel", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(cancelled["profit"], "0");

    let (status, _) = request(
        &t.app,
        "PUT",
        &format!("/v1/admin/positions/{}/status", id),
        Some(json!({"status": "active"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, account) = request(
        &t.app,
        "POST",
        "/v1/admin/accounts/1/deposit",
        Some(json!({"amount": 25.5})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(account["availableBalance"], "125.5");

    let (status, _) = request(&t.app, "POST", "/v1/admin/accounts/9/deposit", Some(json!({"amount": 1}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, anomalies) = request(&t.app, "GET", "/v1/admin/anomalies", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(anomalies.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_withdraw_over_http() {
    let t = setup_test_app().await;
    fund(&t.app, 1, 300).await;

    let (status, account) = request(
        &t.app,
        "POST",
        "/v1/admin/accounts/1/withdraw",
        Some(json!({"amount": 120.5})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(account["availableBalance"], "179.5");

    let cases = [
        ("/v1/admin/accounts/1/withdraw", json!({"amount": 0}), StatusCode::BAD_REQUEST),
        ("/v1/admin/accounts/1/withdraw", json!({"amount": 99}), StatusCode::BAD_REQUEST),
        ("/v1/admin/accounts/1/withdraw", json!({"amount": 180}), StatusCode::CONFLICT),
        ("/v1/admin/accounts/9/withdraw", json!({"amount": 100}), StatusCode::NOT_FOUND),
    ];
    for (uri, body, expected) in cases {
        let (status, resp) = request(&t.app, "POST", uri, Some(body.clone())).await;
        assert_eq!(status, expected, "body {} -> {}", body, resp);
        assert!(resp["error"].is_string());
    }

    let (_, listed) = request(&t.app, "GET", "/v1/positions?ownerId=1", None).await;
    assert_eq!(listed["summary"]["availableBalance"], "179.5");
}

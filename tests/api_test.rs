use axum::http::StatusCode;
use residual_recon::api;
use residual_recon::config::{Config, DedupHashMode, SchemaFlags};
use residual_recon::datasource::{MockPartnerDirectory, PartnerRecord};
use residual_recon::db::init_db;
use residual_recon::domain::{DealDraft, Decimal, MerchantId, Participant};
use residual_recon::Repository;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

struct TestApp {
    app: axum::Router,
    repo: Arc<Repository>,
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

    let config = Config {
        port: 0,
        database_path: db_path,
        partner_directory_url: None,
        partner_directory_token: None,
        reconstruct_batch_size: 100,
        bulk_batch_size: 50,
        dedup_hash: DedupHashMode::Sha256,
        schema: SchemaFlags::default(),
    };
    let directory = MockPartnerDirectory::new().with_page(vec![PartnerRecord {
        external_ref: "recA".to_string(),
        display_name: "Alice".to_string(),
    }]);
    let state = api::AppState::new(repo.clone(), config, Arc::new(directory));

    TestApp {
        app: api::create_router(state),
        repo,
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
    send(app, req).await
}

async fn send(app: &axum::Router, req: axum::http::Request<axum::body::Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn import(app: &axum::Router, month: &str, csv: &str) -> (StatusCode, Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(format!("/v1/imports?payoutMonth={}", month))
        .header("content-type", "text/csv")
        .body(axum::body::Body::from(csv.to_string()))
        .unwrap();
    send(app, req).await
}

const CSV: &str = "MID,DBA,Volume,Fees\n007123,Corner Shop,1000,0\n";

#[tokio::test]
async fn test_health_and_ready() {
    let test_app = setup_test_app().await;
    let (status, body) = request(&test_app.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = request(&test_app.app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_import_reports_counts() {
    let test_app = setup_test_app().await;

    let (status, body) = import(&test_app.app, "2024-03", CSV).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["parsed"], 1);
    assert_eq!(body["inserted"], 1);

    let (_, body) = import(&test_app.app, "2024-03", CSV).await;
    assert_eq!(body["inserted"], 0);
    assert_eq!(body["duplicates"], 1);

    let (status, body) = request(&test_app.app, "GET", "/v1/events?status=unassigned", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["merchantId"], "007123");
    assert_eq!(body[0]["payoutMonth"], "2024-03");
    assert_eq!(body[0]["netResidual"], "1000");
}

#[tokio::test]
async fn test_bad_inputs_are_400() {
    let test_app = setup_test_app().await;

    let (status, _) = import(&test_app.app, "March", CSV).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = request(&test_app.app, "GET", "/v1/events?status=done", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = request(
        &test_app.app,
        "POST",
        "/v1/payouts/mark-paid",
        Some(json!({"ids": ["p1"], "status": "settled"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("paid_status"));

    let (status, _) = request(&test_app.app, "GET", "/v1/adjustments/counts?subjectType=merchant", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_assign_confirm_and_delete_flow() {
    let test_app = setup_test_app().await;
    import(&test_app.app, "2024-03", CSV).await;
    let events = test_app.repo.query_events(None, None, None).await.unwrap();
    let event_id = events[0].id.clone();

    let (status, _) = request(&test_app.app, "POST", &format!("/v1/events/{}/confirm", event_id), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let deal_id = test_app
        .repo
        .upsert_deal(&DealDraft {
            merchant_id: MerchantId::new("007123"),
            payout_type: "residual".to_string(),
            participants: vec![Participant {
                partner_ref: "rec1".to_string(),
                partner_name: "Alice".to_string(),
                role: "Partner".to_string(),
                split_pct: Decimal::from(100),
            }],
            effective_date: None,
            assigned_at: None,
        })
        .await
        .unwrap();

    let (status, _) = request(
        &test_app.app,
        "POST",
        &format!("/v1/events/{}/assign", event_id),
        Some(json!({"dealId": deal_id})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = request(&test_app.app, "POST", &format!("/v1/events/{}/confirm", event_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payoutsCreated"], 1);
    assert_eq!(body["alreadyConfirmed"], false);
    assert!(body["hookFailures"].as_array().unwrap().is_empty());

    let (status, _) = request(&test_app.app, "DELETE", &format!("/v1/events/{}", event_id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = request(
        &test_app.app,
        "PATCH",
        &format!("/v1/events/{}", event_id),
        Some(json!({"merchantName": "Corner Shop LLC"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["merchantId"], "007123");
    assert_eq!(body["payoutsUpdated"], 1);

    let (status, _) = request(&test_app.app, "DELETE", "/v1/events/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_adjustment_endpoints() {
    let test_app = setup_test_app().await;

    let (status, body) = request(
        &test_app.app,
        "POST",
        "/v1/adjustments",
        Some(json!({
            "subjectType": "merchant",
            "subjectId": "M1",
            "description": "rebalance",
            "changes": [{"after": {"split": 40}}, {"after": {"split": 60}}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = body["auditIds"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_i64().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);

    let (status, body) = request(
        &test_app.app,
        "GET",
        "/v1/adjustments/counts?subjectType=merchant&subjectId=M1",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["total"], 1);
    assert_eq!(body[0]["pending"], 1);

    let (status, body) = request(
        &test_app.app,
        "POST",
        "/v1/adjustments/reject",
        Some(json!({"ids": ids, "reason": "entered twice"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["rejected"], 2);
    assert!(body["errors"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_deal_maintenance_endpoints() {
    let test_app = setup_test_app().await;
    test_app
        .repo
        .upsert_deal(&DealDraft {
            merchant_id: MerchantId::new("M1"),
            payout_type: "residual".to_string(),
            participants: vec![Participant {
                partner_ref: String::new(),
                partner_name: "Alice".to_string(),
                role: "Partner".to_string(),
                split_pct: Decimal::from(100),
            }],
            effective_date: None,
            assigned_at: None,
        })
        .await
        .unwrap();

    let (status, body) = request(&test_app.app, "POST", "/v1/deals/backfill-partners", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["participantsFilled"], 1);

    let (status, body) = request(&test_app.app, "POST", "/v1/deals/reconstruct", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attempted"], 0);
    assert_eq!(body["succeeded"], 0);
}

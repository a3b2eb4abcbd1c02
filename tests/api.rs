mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use common::*;
use loan_eligibility_rust::api::{self, AppState};
use loan_eligibility_rust::config::MatchingConfig;
use loan_eligibility_rust::db::InMemoryRepository;
use loan_eligibility_rust::{MatchingPipeline, QualitativeAssessor};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tower::ServiceExt;

async fn app() -> (Router, Arc<InMemoryRepository>, Seeded) {
    let repo = Arc::new(InMemoryRepository::new());
    let seeded = seed(&repo).await;
    let config = fast_config();
    let pipeline = MatchingPipeline::new(
        repo.clone(),
        repo.clone(),
        QualitativeAssessor::offline(&config),
        config,
    );
    (api::router(AppState::new(Arc::new(pipeline))), repo, seeded)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

fn json_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn health_check_responds() {
    let (app, _, _) = app().await;
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn batch_match_returns_summary() {
    let (app, repo, _) = app().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/match/batch",
        Some(json!({ "batch_id": BATCH_A })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["success"], true);
    assert_eq!(body["summary"]["status"], "completed");
    assert_eq!(body["summary"]["reached_stage"], "persisted");
    assert_eq!(body["summary"]["final_matches"], 6);
    assert_eq!(body["summary"]["counts"]["generation"]["passed"], 6);
    assert_eq!(repo.all_matches().await.len(), 6);
}

#[tokio::test]
async fn batch_match_requires_exactly_one_scope() {
    let (app, _, _) = app().await;

    for payload in [json!({}), json!({ "batch_id": BATCH_A, "applicant_ids": [1] }), json!({ "batch_id": "  " })] {
        let (status, body) = send(&app, Method::POST, "/api/match/batch", Some(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&body)["success"], false);
    }
}

#[tokio::test]
async fn failed_batch_returns_server_error_with_summary() {
    let repo = Arc::new(InMemoryRepository::new());
    let config = MatchingConfig::default();
    let pipeline = MatchingPipeline::new(
        Arc::new(UnavailableCatalog),
        repo,
        QualitativeAssessor::offline(&config),
        config,
    );
    let app = api::router(AppState::new(Arc::new(pipeline)));

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/match/batch",
        Some(json!({ "batch_id": BATCH_A })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(&body);
    assert_eq!(body["success"], false);
    assert_eq!(body["summary"]["status"], "failed");
    assert!(body["summary"]["reached_stage"].is_null());
}

#[tokio::test]
async fn query_endpoints_expose_batch_results() {
    let (app, _, s) = app().await;
    send(&app, Method::POST, "/api/match/batch", Some(json!({ "batch_id": BATCH_A }))).await;

    let (status, body) = send(&app, Method::GET, "/api/matches/pending?batch_id=batch-a", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body).as_array().unwrap().len(), 6);

    let (status, body) = send(&app, Method::GET, "/api/batches/batch-a/matches?limit=1", None).await;
    assert_eq!(status, StatusCode::OK);
    let top = json_body(&body);
    assert_eq!(top.as_array().unwrap().len(), 1);
    assert_eq!(top[0]["applicant_id"], s.strong.id);
    assert_eq!(top[0]["product_id"], s.starter.id);
    assert_eq!(top[0]["match_source"], "llm_check");

    let (status, body) = send(&app, Method::GET, "/api/batches/batch-a/summary", None).await;
    assert_eq!(status, StatusCode::OK);
    let summary = json_body(&body);
    assert_eq!(summary["total_matches"], 6);
    assert_eq!(summary["applicants_with_matches"], 4);
}

#[tokio::test]
async fn export_produces_csv() {
    let (app, _, _) = app().await;
    send(&app, Method::POST, "/api/match/batch", Some(json!({ "batch_id": BATCH_A }))).await;

    let request = Request::builder()
        .uri("/api/batches/batch-a/export")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 7);
    assert!(lines[0].starts_with("applicant_id,product_id,match_score,status"));
}

#[tokio::test]
async fn clear_removes_only_the_requested_batch() {
    let (app, repo, _) = app().await;
    send(&app, Method::POST, "/api/match/batch", Some(json!({ "batch_id": BATCH_A }))).await;
    send(&app, Method::POST, "/api/match/batch", Some(json!({ "batch_id": BATCH_B }))).await;
    assert_eq!(repo.all_matches().await.len(), 8);

    let (status, body) = send(&app, Method::DELETE, "/api/matches?batch_id=batch-b", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["deleted"], 2);
    assert_eq!(repo.all_matches().await.len(), 6);
}

/// 每次评估 10s, 单批 2 个候选并发完成
async fn slow_app() -> Router {
    let repo = Arc::new(InMemoryRepository::new());
    seed(&repo).await;
    add(&repo, applicant_draft("U-OTHER-C", 90_000, 820, "business owner", 40, "batch-c")).await;

    let config = MatchingConfig {
        assessment_concurrency: 4,
        assessment_timeout_secs: 60,
        ..fast_config()
    };
    let pipeline = pipeline_with(
        repo,
        Some(Arc::new(Slow {
            delay: Duration::from_secs(10),
        })),
        config,
    );
    api::router(AppState::new(Arc::new(pipeline)))
}

#[tokio::test(start_paused = true)]
async fn same_batch_runs_are_serialised() {
    let app = slow_app().await;
    let started = Instant::now();

    let (first, second) = tokio::join!(
        send(&app, Method::POST, "/api/match/batch", Some(json!({ "batch_id": BATCH_B }))),
        send(&app, Method::POST, "/api/match/batch", Some(json!({ "batch_id": BATCH_B }))),
    );

    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::OK);
    assert!(started.elapsed() >= Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn different_batches_run_concurrently() {
    let app = slow_app().await;
    let started = Instant::now();

    let (b, c) = tokio::join!(
        send(&app, Method::POST, "/api/match/batch", Some(json!({ "batch_id": BATCH_B }))),
        send(&app, Method::POST, "/api/match/batch", Some(json!({ "batch_id": "batch-c" }))),
    );

    assert_eq!(json_body(&b.1)["summary"]["final_matches"], 2);
    assert_eq!(json_body(&c.1)["summary"]["final_matches"], 2);
    assert!(started.elapsed() < Duration::from_secs(20));
}

//! HTTP API integration tests
//!
//! Drive the full router with stub adapters and a stub classifier.

mod helpers;

use axum::http::{Method, StatusCode};
use serde_json::json;
use std::sync::Arc;
use sts_api::build_router;
use sts_api::models::SourceKind;
use sts_common::events::TaskStatus;

use helpers::{
    all_sources, empty_analysis, sample_analysis, send, wait_for_terminal, StubAdapter,
    StubClassifier,
};

#[tokio::test]
async fn test_health_reports_ok() {
    let state = helpers::test_state(all_sources(2), Arc::new(StubClassifier::new(sample_analysis())));
    let app = build_router(state);

    let (status, body) = send(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "sts-api");
    assert_eq!(body["store_connected"], true);
    assert!(body.get("last_error").is_none());
}

#[tokio::test]
async fn test_service_info() {
    let state = helpers::test_state(all_sources(2), Arc::new(StubClassifier::new(sample_analysis())));
    let app = build_router(state);

    let (status, body) = send(&app, Method::GET, "/", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "sts-api");
    assert_eq!(body["health"], "/health");
    assert_eq!(body["store_backend"], "memory");

    let git_hash = body["git_hash"].as_str().unwrap();
    assert!(!git_hash.is_empty());
    let built = body["build_timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(built).is_ok(), "{}", built);
    assert!(!body["build_profile"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_scrape_rejects_empty_product_name() {
    let state = helpers::test_state(all_sources(2), Arc::new(StubClassifier::new(sample_analysis())));
    let app = build_router(state);

    let (status, body) = send(
        &app,
        Method::POST,
        "/scrape",
        Some(json!({ "product_name": "   " })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_scrape_rejects_no_sources() {
    let state = helpers::test_state(all_sources(2), Arc::new(StubClassifier::new(sample_analysis())));
    let app = build_router(state);

    let (status, body) = send(
        &app,
        Method::POST,
        "/scrape",
        Some(json!({
            "product_name": "Spotify",
            "include_reddit": false,
            "include_google_search": false
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("At least one source"));
}

#[tokio::test]
async fn test_scrape_then_poll_until_completed() {
    let state = helpers::test_state(all_sources(3), Arc::new(StubClassifier::new(sample_analysis())));
    let store = state.store.clone();
    let app = build_router(state);

    let (status, body) = send(
        &app,
        Method::POST,
        "/scrape",
        Some(json!({
            "product_name": "Spotify",
            "google_play": { "product_id": "com.spotify.music" },
            "apple_store": { "product_id": "324684580" }
        })),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "pending");
    let task_id = body["task_id"].as_str().unwrap().to_string();
    assert_eq!(body["poll_url"], format!("/task/{}", task_id));
    assert_eq!(body["websocket_url"], format!("/task/{}/progress", task_id));
    assert_eq!(body["events_url"], format!("/task/{}/events", task_id));

    let task = wait_for_terminal(&store, &task_id).await;
    assert_eq!(task.status, TaskStatus::Completed);

    let (status, body) = send(&app, Method::GET, &format!("/task/{}", task_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["progress"], 100);

    let result = &body["result"];
    assert_eq!(result["product_name"], "Spotify");
    assert_eq!(result["sources"].as_array().unwrap().len(), 4);
    assert_eq!(result["processing_mode"], "single_request");

    let sentiment = &result["sentiment_analysis"];
    assert_eq!(sentiment["summary_counts"]["bugs"], 2);
    assert_eq!(sentiment["summary_counts"]["requirements"], 1);
    assert_eq!(sentiment["overall_sentiment"]["total_reviews_analyzed"], 12);
    // Mean of three 4.0 and three 2.0 app store ratings
    assert_eq!(sentiment["overall_sentiment"]["average_rating"], 3.0);
}

#[tokio::test]
async fn test_single_source_endpoint() {
    let state = helpers::test_state(
        vec![StubAdapter::new(SourceKind::Reddit, 4)],
        Arc::new(StubClassifier::new(sample_analysis())),
    );
    let store = state.store.clone();
    let app = build_router(state);

    let (status, body) = send(
        &app,
        Method::POST,
        "/scrape/reddit",
        Some(json!({ "keyword": "spotify" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let task = wait_for_terminal(&store, body["task_id"].as_str().unwrap()).await;
    let result = task.result.expect("completed task has a result");
    assert_eq!(result.sources, vec![SourceKind::Reddit]);
    assert_eq!(result.sentiment_analysis.overall_sentiment.average_rating, 0.0);
}

#[tokio::test]
async fn test_unknown_task_is_404() {
    let state = helpers::test_state(all_sources(1), Arc::new(StubClassifier::new(sample_analysis())));
    let app = build_router(state);

    let (status, body) = send(&app, Method::GET, "/task/does-not-exist", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = send(&app, Method::GET, "/task/does-not-exist/events", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failed_task_reported_in_health() {
    let state = helpers::test_state(
        vec![
            StubAdapter::failing(SourceKind::Reddit, 503),
            StubAdapter::failing(SourceKind::GoogleSearch, 429),
        ],
        Arc::new(StubClassifier::new(sample_analysis())),
    );
    let store = state.store.clone();
    let token = tokio_util::sync::CancellationToken::new();
    let recorder = state.spawn_error_recorder(token.clone());
    let app = build_router(state);

    let (status, body) = send(
        &app,
        Method::POST,
        "/scrape",
        Some(json!({ "product_name": "Spotify" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let task = wait_for_terminal(&store, body["task_id"].as_str().unwrap()).await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.result.is_none());

    let mut last_error = serde_json::Value::Null;
    for _ in 0..100 {
        let (_, health) = send(&app, Method::GET, "/health", None).await;
        if !health["last_error"].is_null() {
            last_error = health["last_error"].clone();
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(last_error.as_str().unwrap().contains("All sources failed"));

    token.cancel();
    let _ = recorder.await;
}

// ============================================================================
// Prioritization
// ============================================================================

async fn completed_task(app: &axum::Router, store: &sts_api::store::TaskStore) -> String {
    let (_, body) = send(
        app,
        Method::POST,
        "/scrape",
        Some(json!({ "product_name": "Spotify" })),
    )
    .await;
    let task_id = body["task_id"].as_str().unwrap().to_string();
    wait_for_terminal(store, &task_id).await;
    task_id
}

#[tokio::test]
async fn test_prioritize_unknown_task_is_404() {
    let state = helpers::test_state(all_sources(1), Arc::new(StubClassifier::new(sample_analysis())));
    let app = build_router(state);

    let (status, _) = send(
        &app,
        Method::POST,
        "/prioritize",
        Some(json!({ "task_id": "missing", "business_goal": "retention" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_prioritize_rejects_bad_method() {
    let state = helpers::test_state(all_sources(1), Arc::new(StubClassifier::new(sample_analysis())));
    let store = state.store.clone();
    let app = build_router(state);
    let task_id = completed_task(&app, &store).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/prioritize",
        Some(json!({ "task_id": task_id, "method": "RICE", "business_goal": "retention" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_prioritize_running_task_is_400() {
    let state = helpers::test_state(all_sources(1), Arc::new(StubClassifier::new(sample_analysis())));
    let store = state.store.clone();
    let app = build_router(state);
    let task_id = store.create(&[SourceKind::Reddit]).await.unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        "/prioritize",
        Some(json!({ "task_id": task_id, "business_goal": "retention" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("pending"));
}

#[tokio::test]
async fn test_prioritize_without_findings_is_422() {
    let state = helpers::test_state(all_sources(1), Arc::new(StubClassifier::new(empty_analysis())));
    let store = state.store.clone();
    let app = build_router(state);
    let task_id = completed_task(&app, &store).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/prioritize",
        Some(json!({ "task_id": task_id, "business_goal": "retention" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_DATA");
}

#[tokio::test]
async fn test_prioritize_builds_plan() {
    let state = helpers::test_state(all_sources(2), Arc::new(StubClassifier::new(sample_analysis())));
    let store = state.store.clone();
    let app = build_router(state);
    let task_id = completed_task(&app, &store).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/prioritize",
        Some(json!({
            "task_id": task_id,
            "method": "Lean",
            "duration": 10,
            "budget": 200,
            "business_goal": "Reduce crashes and improve stability"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["task_id"], task_id.as_str());
    let plan = &body["plan"];
    assert_eq!(plan["plan_metadata"]["sprint_duration_days"], 10);
    assert_eq!(plan["prioritized_categories"].as_array().unwrap().len(), 4);

    let total: u64 = plan["summary"]["included_tasks"].as_u64().unwrap()
        + plan["summary"]["excluded_tasks"].as_u64().unwrap();
    assert_eq!(total, 4);
    assert!(plan["summary"]["total_estimated_hours"].as_f64().unwrap() <= 200.0);
}

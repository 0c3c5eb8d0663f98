//! HTTP and WebSocket surface over a real socket.

mod common;

use common::{collect_until, TestServer, WAIT};
use k6_dashboard::testing::{TestContext, WRITES_SUMMARY};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

async fn post(client: &reqwest::Client, url: String, body: Value) -> (StatusCode, Value) {
    let response = client.post(url).json(&body).send().await.unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

async fn get(url: String) -> (StatusCode, Value) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_health() {
    let ctx = TestContext::new().unwrap();
    let server = TestServer::start(ctx.settings()).await.unwrap();

    let (status, body) = get(server.url("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["running"], 0);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_lists_available_tests() {
    let ctx = TestContext::new().unwrap();
    ctx.create_file("tests/login.js", "").unwrap();
    ctx.create_file("tests/account.js", "").unwrap();
    ctx.create_file("tests/helpers.ts", "").unwrap();
    let server = TestServer::start(ctx.settings()).await.unwrap();

    let (_, body) = get(server.url("/api/tests")).await;
    assert_eq!(body["data"], json!(["account", "login"]));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_run_streams_events_and_serves_results() {
    let ctx = TestContext::new().unwrap();
    ctx.fake_k6(WRITES_SUMMARY).unwrap();
    let server = TestServer::start(ctx.settings()).await.unwrap();
    let mut ws = server.connect_ws().await.unwrap();
    let client = reqwest::Client::new();

    let (status, body) = post(
        &client,
        server.url("/api/tests/run"),
        json!({"test": "account", "profile": "LIGHT", "environment": "PROD"}),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let run_id = body["data"]["runId"].as_str().unwrap().to_string();
    let result_file = body["data"]["resultFile"].as_str().unwrap().to_string();
    assert!(run_id.starts_with("account-"));

    let events = collect_until(&mut ws, &run_id, "resultsUpdated").await;
    let names: Vec<&str> = events.iter().filter_map(|e| e["event"].as_str()).collect();
    assert!(names.contains(&"complete"));
    assert_eq!(events[0]["payload"]["data"], "🚀 Starting test: account");
    assert_eq!(
        events.last().unwrap()["payload"]["resultFile"],
        result_file.as_str()
    );

    let (_, listing) = get(server.url("/api/results")).await;
    let name = result_file.trim_start_matches("results/");
    assert_eq!(listing["data"][0]["name"], name);

    let (status, artifact) = get(server.url(&format!("/api/results/{name}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(artifact["data"], json!({"metrics": {}}));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_run_all_uses_batch_mode() {
    let ctx = TestContext::new().unwrap();
    ctx.fake_batch_script("echo \"all for $1\"").unwrap();
    let server = TestServer::start(ctx.settings()).await.unwrap();
    let mut ws = server.connect_ws().await.unwrap();
    let client = reqwest::Client::new();

    let (status, body) = post(
        &client,
        server.url("/api/tests/run-all"),
        json!({"profile": "HEAVY", "environment": "STAGING"}),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["mode"], "batch");
    assert!(body["data"].get("resultFile").is_none());
    let run_id = body["data"]["runId"].as_str().unwrap().to_string();

    let events = collect_until(&mut ws, &run_id, "complete").await;
    assert!(events
        .iter()
        .any(|e| e["payload"]["data"] == "all for HEAVY"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_request_is_rejected() {
    let ctx = TestContext::new().unwrap();
    let server = TestServer::start(ctx.settings()).await.unwrap();
    let client = reqwest::Client::new();

    let (status, body) = post(
        &client,
        server.url("/api/tests/run"),
        json!({"test": "../../etc/passwd", "profile": "LIGHT", "environment": "PROD"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("test"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_spawn_failure_is_server_error() {
    let ctx = TestContext::new().unwrap();
    let mut settings = ctx.settings();
    settings.k6_binary = "/nonexistent/k6-binary".to_string();
    let server = TestServer::start(settings).await.unwrap();
    let client = reqwest::Client::new();

    let (status, body) = post(
        &client,
        server.url("/api/tests/run"),
        json!({"test": "account", "profile": "LIGHT", "environment": "PROD"}),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);

    let (_, running) = get(server.url("/api/tests/running")).await;
    assert_eq!(running["data"], json!([]));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_running_test() {
    let ctx = TestContext::new().unwrap();
    ctx.fake_k6("sleep 30").unwrap();
    let server = TestServer::start(ctx.settings()).await.unwrap();
    let mut ws = server.connect_ws().await.unwrap();
    let client = reqwest::Client::new();

    let (_, body) = post(
        &client,
        server.url("/api/tests/run"),
        json!({"test": "account", "profile": "LIGHT", "environment": "PROD", "runId": "ui-1"}),
    )
    .await;
    assert_eq!(body["data"]["runId"], "ui-1");

    let (_, running) = get(server.url("/api/tests/running")).await;
    assert_eq!(running["data"][0]["runId"], "ui-1");
    assert_eq!(running["data"][0]["state"], "running");

    let (status, stopped) = post(&client, server.url("/api/tests/stop"), json!({"runId": "ui-1"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stopped["data"]["stopped"], true);

    let events = collect_until(&mut ws, "ui-1", "stopped").await;
    assert_eq!(events.last().unwrap()["payload"]["type"], "stopped");

    let (_, again) = post(&client, server.url("/api/tests/stop"), json!({"runId": "ui-1"})).await;
    assert_eq!(again["data"]["stopped"], false);

    let (_, running) = get(server.url("/api/tests/running")).await;
    assert_eq!(running["data"], json!([]));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_result_lookup_errors() {
    let ctx = TestContext::new().unwrap();
    let server = TestServer::start(ctx.settings()).await.unwrap();

    let (status, _) = get(server.url("/api/results/missing.json")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(server.url("/api/results/..%2Fsecret.json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_active_runs() {
    let ctx = TestContext::new().unwrap();
    ctx.fake_k6("sleep 30").unwrap();
    let server = TestServer::start(ctx.settings()).await.unwrap();
    let client = reqwest::Client::new();

    let (_, body) = post(
        &client,
        server.url("/api/tests/run"),
        json!({"test": "account", "profile": "LIGHT", "environment": "PROD"}),
    )
    .await;
    let run_id = body["data"]["runId"].as_str().unwrap().to_string();
    let execution = server
        .orchestrator
        .registry()
        .lookup(&run_id.as_str().into())
        .unwrap();

    let orchestrator = std::sync::Arc::clone(&server.orchestrator);
    server.shutdown().await.unwrap();

    assert!(orchestrator.list_running().is_empty());
    tokio::time::timeout(WAIT, execution.handle.lifecycle().wait_exited())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
}

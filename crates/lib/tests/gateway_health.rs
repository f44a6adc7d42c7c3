//! Integration test: start the gateway on a free port, GET /health, assert health JSON.
//! The server task is left running when the test ends.

mod common;

use common::{free_port, start_gateway, test_config};

#[tokio::test]
async fn gateway_health_http_responds_with_running() {
    let port = free_port();
    let base = start_gateway(test_config(port)).await;

    let json: serde_json::Value = reqwest::get(format!("{}/health", base))
        .await
        .expect("GET /health")
        .json()
        .await
        .expect("parse JSON");
    assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
    assert_eq!(json.get("port").and_then(|v| v.as_u64()), Some(port as u64));
    assert_eq!(json.get("sessions").and_then(|v| v.as_u64()), Some(0));
}

#[tokio::test]
async fn entry_form_posts_to_create() {
    let base = start_gateway(test_config(free_port())).await;
    let body = reqwest::get(format!("{}/", base))
        .await
        .expect("GET /")
        .text()
        .await
        .expect("body");
    assert!(body.contains(r#"action="/meeting/create""#));
}

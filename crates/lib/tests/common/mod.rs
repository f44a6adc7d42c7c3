//! Shared helpers for the gateway integration tests: start a server on a free port and wait
//! until it answers.

#![allow(dead_code)]

use futures_util::StreamExt;
use lib::config::Config;
use lib::gateway;
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

pub fn test_config(port: u16) -> Config {
    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    config
}

/// Spawn the gateway and poll /health until it responds. The server task is left running.
pub async fn start_gateway(config: Config) -> String {
    let port = config.gateway.port;
    tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });
    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(format!("{}/health", base)).send().await {
            if resp.status().is_success() {
                return base;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("gateway on port {} did not come up within 5s", port);
}

/// HTTP client that does not follow redirects, so the create redirect can be inspected.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("build client")
}

/// POST /meeting/create and return (code, host id) from the redirect.
pub async fn create_meeting(base: &str, name: &str) -> (String, String) {
    let resp = http_client()
        .post(format!("{}/meeting/create", base))
        .form(&[("name", name)])
        .send()
        .await
        .expect("create meeting");
    assert_eq!(resp.status(), reqwest::StatusCode::SEE_OTHER);
    let location = resp
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("Location header")
        .to_string();
    let rest = location.strip_prefix("/meeting/").expect("meeting path");
    let (code, query) = rest.split_once('?').expect("query string");
    let host_id = query.strip_prefix("participantId=").expect("participantId");
    (code.to_string(), host_id.to_string())
}

pub async fn connect(base: &str, code: &str, pid: &str, name: Option<&str>) -> Ws {
    let mut url = format!(
        "{}/ws/{}/{}",
        base.replacen("http://", "ws://", 1),
        urlencoding::encode(code),
        urlencoding::encode(pid)
    );
    if let Some(n) = name {
        url.push_str(&format!("?name={}", urlencoding::encode(n)));
    }
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.expect("ws connect");
    ws
}

/// Next JSON text frame, skipping pings; panics after 5s.
pub async fn next_json(ws: &mut Ws) -> Value {
    let deadline = Duration::from_secs(5);
    loop {
        let frame = tokio::time::timeout(deadline, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("ws error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("server sent JSON");
        }
    }
}

/// Read until a message of type `typ` arrives, skipping others.
pub async fn next_of_type(ws: &mut Ws, typ: &str) -> Value {
    loop {
        let v = next_json(ws).await;
        if v["type"] == typ {
            return v;
        }
    }
}

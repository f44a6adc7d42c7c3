//! End-to-end admission and relay over real HTTP and WebSocket connections.

mod common;

use common::{
    connect, create_meeting, free_port, http_client, next_json, next_of_type, start_gateway,
    test_config,
};
use futures_util::{SinkExt, StreamExt};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

async fn view(base: &str, code: &str, pid: &str, name: &str) -> (StatusCode, Value) {
    let resp = http_client()
        .get(format!("{}/meeting/{}", base, code))
        .query(&[("participantId", pid), ("name", name)])
        .send()
        .await
        .expect("GET meeting");
    let status = resp.status();
    let body = if status.is_success() {
        resp.json().await.expect("view JSON")
    } else {
        Value::Null
    };
    (status, body)
}

async fn host_action(base: &str, code: &str, action: &str, pid: &str, host_id: &str) -> StatusCode {
    http_client()
        .post(format!("{}/meeting/{}/{}/{}", base, code, action, pid))
        .form(&[("hostId", host_id)])
        .send()
        .await
        .expect("host action")
        .status()
}

#[tokio::test]
async fn waiting_participant_is_admitted_only_by_host() {
    let base = start_gateway(test_config(free_port())).await;
    let (code, host_id) = create_meeting(&base, "Alice").await;
    assert_eq!(code.len(), 8);
    assert_eq!(host_id.len(), 16);

    let (status, v) = view(&base, &code, "P", "Bob").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["view"], "waiting");
    assert_eq!(v["isWaiting"], true);

    assert_eq!(
        host_action(&base, &code, "admit", "P", "not-the-host").await,
        StatusCode::UNAUTHORIZED
    );
    let (_, v) = view(&base, &code, "P", "Bob").await;
    assert_eq!(v["isWaiting"], true);
    assert_eq!(v["isAdmitted"], false);

    assert_eq!(host_action(&base, &code, "admit", "P", &host_id).await, StatusCode::OK);
    let (_, v) = view(&base, &code, "P", "Bob").await;
    assert_eq!(v["view"], "meeting");
    assert_eq!(v["isAdmitted"], true);

    // Admitting twice: P is no longer waiting.
    assert_eq!(
        host_action(&base, &code, "admit", "P", &host_id).await,
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn unknown_meeting_is_not_found() {
    let base = start_gateway(test_config(free_port())).await;
    let (status, _) = view(&base, "nosuchmeeting", "P", "Bob").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        host_action(&base, "nosuchmeeting", "admit", "P", "H").await,
        StatusCode::NOT_FOUND
    );
    let url = format!("{}/ws/nosuchmeeting/P", base.replacen("http://", "ws://", 1));
    assert!(tokio_tungstenite::connect_async(&url).await.is_err());
}

#[tokio::test]
async fn signal_and_chat_relay_between_admitted_participants() {
    let base = start_gateway(test_config(free_port())).await;
    let (code, host_id) = create_meeting(&base, "Alice").await;
    view(&base, &code, "P", "Bob").await;
    assert_eq!(host_action(&base, &code, "admit", "P", &host_id).await, StatusCode::OK);

    let mut host = connect(&base, &code, &host_id, None).await;
    let init = next_json(&mut host).await;
    assert_eq!(init["type"], "init");
    assert_eq!(init["content"]["isHost"], true);
    assert_eq!(init["content"]["meetingCode"], code.as_str());

    let mut p = connect(&base, &code, "P", None).await;
    let init = next_json(&mut p).await;
    assert_eq!(init["type"], "init");
    assert_eq!(init["content"]["isAdmitted"], true);

    let joined = next_of_type(&mut host, "participant-joined").await;
    assert_eq!(joined["content"]["participantId"], "P");
    assert_eq!(joined["content"]["name"], "Bob");

    let offer = json!({
        "type": "signal",
        "content": { "targetId": "P", "sdp": "v=0", "senderId": "forged" }
    });
    host.send(Message::Text(offer.to_string())).await.unwrap();
    let sig = next_of_type(&mut p, "signal").await;
    assert_eq!(sig["content"]["senderId"], host_id.as_str());
    assert_eq!(sig["content"]["targetId"], "P");
    assert_eq!(sig["content"]["sdp"], "v=0");

    let chat = json!({ "type": "chat", "content": { "text": "hi all" } });
    p.send(Message::Text(chat.to_string())).await.unwrap();
    let got = next_of_type(&mut host, "chat").await;
    assert_eq!(got["content"]["text"], "hi all");
    assert_eq!(got["content"]["sender"], "Bob");
    assert_eq!(got["content"]["senderId"], "P");
    assert!(got["content"]["timestamp"].as_i64().unwrap_or(0) > 0);

    p.close(None).await.unwrap();
    let left = next_of_type(&mut host, "participant-left").await;
    assert_eq!(left["content"]["participantId"], "P");
}

#[tokio::test]
async fn waiting_socket_sees_rejection() {
    let base = start_gateway(test_config(free_port())).await;
    let (code, host_id) = create_meeting(&base, "Alice").await;

    let mut host = connect(&base, &code, &host_id, None).await;
    assert_eq!(next_json(&mut host).await["type"], "init");

    let mut w = connect(&base, &code, "W", Some("Walt")).await;
    let init = next_json(&mut w).await;
    assert_eq!(init["content"]["isWaiting"], true);
    assert_eq!(init["content"]["isAdmitted"], false);

    let update = next_of_type(&mut host, "waiting-room-update").await;
    assert_eq!(update["content"]["participants"][0]["id"], "W");
    assert_eq!(update["content"]["participants"][0]["name"], "Walt");

    // Waiting participants cannot reach the host.
    let chat = json!({ "type": "chat", "content": { "text": "let me in" } });
    w.send(Message::Text(chat.to_string())).await.unwrap();

    assert_eq!(host_action(&base, &code, "reject", "W", &host_id).await, StatusCode::OK);
    let rejected = next_of_type(&mut w, "rejected").await;
    assert_eq!(rejected["content"]["participantId"], "W");

    let update = next_of_type(&mut host, "waiting-room-update").await;
    assert_eq!(update["content"]["participants"], json!([]));
    let (_, v) = view(&base, &code, &host_id, "").await;
    assert_eq!(v["waitingRoom"], json!([]));
}

#[tokio::test]
async fn host_ends_meeting_and_sockets_close() {
    let base = start_gateway(test_config(free_port())).await;
    let (code, host_id) = create_meeting(&base, "Alice").await;
    let mut host = connect(&base, &code, &host_id, None).await;
    assert_eq!(next_json(&mut host).await["type"], "init");

    assert_eq!(
        http_client()
            .post(format!("{}/meeting/{}/end", base, code))
            .form(&[("hostId", "someone-else")])
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        http_client()
            .post(format!("{}/meeting/{}/end", base, code))
            .form(&[("hostId", host_id.as_str())])
            .send()
            .await
            .unwrap()
            .status(),
        StatusCode::OK
    );
    assert_eq!(next_of_type(&mut host, "meeting-ended").await["content"]["meetingCode"], code.as_str());
    let (status, _) = view(&base, &code, &host_id, "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn silent_connection_is_dropped_after_idle_timeout() {
    let mut config = test_config(free_port());
    config.gateway.heartbeat.ping_interval_secs = 1;
    config.gateway.heartbeat.idle_timeout_secs = 2;
    let base = start_gateway(config).await;
    let (code, host_id) = create_meeting(&base, "Alice").await;

    let mut host = connect(&base, &code, &host_id, None).await;
    // Not reading means pings go unanswered.
    tokio::time::sleep(Duration::from_millis(3500)).await;

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(frame) = host.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => return true,
                Ok(_) => {}
            }
        }
        true
    })
    .await
    .unwrap_or(false);
    assert!(closed, "server kept an idle connection open");

    let health: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["connections"], 0);
}

async fn admitted_member(base: &str, code: &str, host_id: &str, pid: &str, name: &str) {
    view(base, code, pid, name).await;
    assert_eq!(host_action(base, code, "admit", pid, host_id).await, StatusCode::OK);
}

async fn open_connections(base: &str) -> u64 {
    let health: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    health["connections"].as_u64().unwrap_or(u64::MAX)
}

#[tokio::test]
async fn garbage_frame_ends_only_that_connection() {
    let base = start_gateway(test_config(free_port())).await;
    let (code, host_id) = create_meeting(&base, "Alice").await;
    admitted_member(&base, &code, &host_id, "P", "Bob").await;
    admitted_member(&base, &code, &host_id, "Q", "Quinn").await;

    let mut host = connect(&base, &code, &host_id, None).await;
    let mut p = connect(&base, &code, "P", None).await;
    let mut q = connect(&base, &code, "Q", None).await;
    for ws in [&mut host, &mut p, &mut q] {
        assert_eq!(next_json(ws).await["type"], "init");
    }
    assert_eq!(open_connections(&base).await, 3);

    q.send(Message::Text("not json".into())).await.unwrap();
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(frame) = q.next().await {
            if matches!(frame, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "server kept the connection that sent garbage");
    assert_eq!(open_connections(&base).await, 2);

    let left = next_of_type(&mut host, "participant-left").await;
    assert_eq!(left["content"]["participantId"], "Q");

    let chat = json!({ "type": "chat", "content": { "text": "still here" } });
    p.send(Message::Text(chat.to_string())).await.unwrap();
    let got = next_of_type(&mut host, "chat").await;
    assert_eq!(got["content"]["text"], "still here");
    assert_eq!(got["content"]["sender"], "Bob");
}

#[tokio::test]
async fn malformed_signal_is_dropped_and_connection_stays_open() {
    let base = start_gateway(test_config(free_port())).await;
    let (code, host_id) = create_meeting(&base, "Alice").await;
    admitted_member(&base, &code, &host_id, "P", "Bob").await;

    let mut host = connect(&base, &code, &host_id, None).await;
    let mut p = connect(&base, &code, "P", None).await;
    assert_eq!(next_json(&mut host).await["type"], "init");
    assert_eq!(next_json(&mut p).await["type"], "init");

    for bad in [
        json!({ "type": "signal", "content": "offer" }),
        json!({ "type": "signal", "content": { "sdp": "v=0" } }),
    ] {
        p.send(Message::Text(bad.to_string())).await.unwrap();
    }
    let chat = json!({ "type": "chat", "content": { "text": "after bad signals" } });
    p.send(Message::Text(chat.to_string())).await.unwrap();

    loop {
        let v = next_json(&mut host).await;
        assert_ne!(v["type"], "signal", "malformed signal was relayed: {}", v);
        if v["type"] == "chat" {
            assert_eq!(v["content"]["text"], "after bad signals");
            break;
        }
    }
    assert_eq!(open_connections(&base).await, 2);
}

#[tokio::test]
async fn signal_sent_with_legacy_target_keeps_its_fields() {
    let base = start_gateway(test_config(free_port())).await;
    let (code, host_id) = create_meeting(&base, "Alice").await;
    admitted_member(&base, &code, &host_id, "P", "Bob").await;

    let mut host = connect(&base, &code, &host_id, None).await;
    let mut p = connect(&base, &code, "P", Some("Bob Jones")).await;
    assert_eq!(next_json(&mut host).await["type"], "init");
    assert_eq!(next_json(&mut p).await["type"], "init");

    let answer = json!({ "type": "signal", "content": { "target": host_id.as_str(), "sdp": "v=0" } });
    p.send(Message::Text(answer.to_string())).await.unwrap();
    let sig = next_of_type(&mut host, "signal").await;
    assert_eq!(
        sig["content"],
        json!({ "senderId": "P", "target": host_id.as_str(), "sdp": "v=0" })
    );
}

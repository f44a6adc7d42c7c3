//! Gateway HTTP + WebSocket server (single port).

use crate::config::Config;
use crate::error::MeetingError;
use crate::gateway::admission;
use crate::gateway::connections::ConnectionHub;
use crate::gateway::heartbeat::{HeartbeatPolicy, HeartbeatPolicyError};
use crate::gateway::protocol::ServerMessage;
use crate::gateway::socket;
use crate::gateway::views::{self, JoinQuery};
use crate::ids::IdGenerator;
use crate::registry::SessionRegistry;
use anyhow::{Context, Result};
use axum::{
    extract::{ws::WebSocketUpgrade, Form, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Shared state for the gateway: config, session registry, live connections, id source.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub heartbeat: HeartbeatPolicy,
    pub registry: Arc<SessionRegistry>,
    pub connections: Arc<ConnectionHub>,
    pub ids: Arc<IdGenerator>,
}

impl GatewayState {
    /// Fresh state with an empty registry and an entropy-seeded id generator.
    pub fn new(config: Config) -> Result<Self, HeartbeatPolicyError> {
        let heartbeat = HeartbeatPolicy::from_config(&config.gateway.heartbeat)?;
        let ids = IdGenerator::new(
            config.meetings.code_length,
            config.meetings.participant_id_length,
        );
        Ok(Self {
            config: Arc::new(config),
            heartbeat,
            registry: Arc::new(SessionRegistry::new()),
            connections: Arc::new(ConnectionHub::new()),
            ids: Arc::new(ids),
        })
    }
}

/// Form body of `POST /meeting/create`.
#[derive(Debug, Default, Deserialize)]
struct CreateForm {
    #[serde(default)]
    name: Option<String>,
}

/// Form body of the host-only endpoints.
#[derive(Debug, Default, Deserialize)]
struct HostForm {
    #[serde(rename = "hostId", default)]
    host_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct WsQuery {
    name: Option<String>,
}

impl IntoResponse for MeetingError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

/// All gateway routes over the given state.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(entry_form))
        .route("/health", get(health_http))
        .route("/meeting/create", post(create_meeting))
        .route("/meeting/:code", get(join_meeting))
        .route("/meeting/:code/admit/:participant_id", post(admit_participant))
        .route("/meeting/:code/reject/:participant_id", post(reject_participant))
        .route("/meeting/:code/end", post(end_meeting))
        .route("/ws/:code/:participant_id", get(ws_handler))
        .with_state(state)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let state = GatewayState::new(config).context("invalid heartbeat settings")?;
    let bind_addr = format!("{}:{}", state.config.gateway.bind.trim(), state.config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Ends every meeting's connections so graceful shutdown is not held open by idle sockets.
async fn shutdown_signal(state: GatewayState) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, closing meeting connections");

    for code in state.registry.codes().await {
        let msg = ServerMessage::MeetingEnded {
            meeting_code: code.clone(),
        };
        let _ = state.connections.close_meeting(&code, &msg).await;
    }
}

/// GET / serves the entry form.
async fn entry_form() -> Html<&'static str> {
    Html(views::ENTRY_FORM_HTML)
}

/// GET /health returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
        "sessions": state.registry.len().await,
        "connections": state.connections.connection_count().await,
    }))
}

/// POST /meeting/create creates a meeting and redirects the host to it with their participant id.
async fn create_meeting(
    State(state): State<GatewayState>,
    form: Option<Form<CreateForm>>,
) -> Response {
    let form = form.map(|Form(f)| f).unwrap_or_default();
    match admission::create_meeting(&state, form.name.as_deref()).await {
        Ok((session, host_id)) => Redirect::to(&format!(
            "/meeting/{}?participantId={}",
            session.code(),
            host_id
        ))
        .into_response(),
        Err(e) => {
            log::error!("creating meeting failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "could not allocate a meeting code").into_response()
        }
    }
}

/// GET /meeting/{code} picks the join, meeting, or waiting view depending on admission state.
async fn join_meeting(
    State(state): State<GatewayState>,
    Path(code): Path<String>,
    Query(query): Query<JoinQuery>,
) -> Response {
    match views::meeting_view(&state, &code, &query).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /meeting/{code}/admit/{participantId} (host only).
async fn admit_participant(
    State(state): State<GatewayState>,
    Path((code, participant_id)): Path<(String, String)>,
    form: Option<Form<HostForm>>,
) -> Response {
    let host = form.map(|Form(f)| f).unwrap_or_default();
    match admission::admit(&state, &code, &host.host_id, &participant_id).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /meeting/{code}/reject/{participantId} (host only).
async fn reject_participant(
    State(state): State<GatewayState>,
    Path((code, participant_id)): Path<(String, String)>,
    form: Option<Form<HostForm>>,
) -> Response {
    let host = form.map(|Form(f)| f).unwrap_or_default();
    match admission::reject(&state, &code, &host.host_id, &participant_id).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /meeting/{code}/end (host only) tears the meeting down.
async fn end_meeting(
    State(state): State<GatewayState>,
    Path(code): Path<String>,
    form: Option<Form<HostForm>>,
) -> Response {
    let host = form.map(|Form(f)| f).unwrap_or_default();
    match admission::end_meeting(&state, &code, &host.host_id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /ws/{code}/{participantId} upgrades to WebSocket. Unknown participants are enrolled in
/// the waiting room first; the first frame sent is `init`.
async fn ws_handler(
    State(state): State<GatewayState>,
    Path((code, participant_id)): Path<(String, String)>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let attachment = match socket::attach(&state, &code, &participant_id, query.name.as_deref()).await {
        Ok(a) => a,
        Err(e) => return e.into_response(),
    };
    let max = state.config.gateway.max_message_bytes;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_failed_upgrade(|e| log::warn!("websocket upgrade failed: {}", e))
        .on_upgrade(move |socket| socket::run_connection(socket, state, attachment))
}

//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.huddle/config.json`) and environment.
//! `PORT` overrides the gateway port; everything else comes from the file or defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Meeting defaults (names, id lengths).
    #[serde(default)]
    pub meetings: MeetingsConfig,
}

/// Gateway bind, port, and connection limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP and WebSocket (default 8080).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Largest inbound WebSocket frame accepted, in bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    /// Per-connection outbound queue length; frames beyond it are dropped for that connection.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

/// Liveness probing. `ping_interval_secs` must stay below `idle_timeout_secs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatConfig {
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingsConfig {
    #[serde(default = "default_host_name")]
    pub default_host_name: String,
    #[serde(default = "default_guest_name")]
    pub default_guest_name: String,
    #[serde(default = "default_code_length")]
    pub code_length: usize,
    #[serde(default = "default_participant_id_length")]
    pub participant_id_length: usize,
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_max_message_bytes() -> usize {
    4096
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_ping_interval_secs() -> u64 {
    54
}

fn default_idle_timeout_secs() -> u64 {
    60
}

fn default_write_timeout_secs() -> u64 {
    10
}

fn default_host_name() -> String {
    crate::session::DEFAULT_HOST_NAME.to_string()
}

fn default_guest_name() -> String {
    crate::session::DEFAULT_GUEST_NAME.to_string()
}

fn default_code_length() -> usize {
    crate::ids::DEFAULT_CODE_LEN
}

fn default_participant_id_length() -> usize {
    crate::ids::DEFAULT_PARTICIPANT_ID_LEN
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            max_message_bytes: default_max_message_bytes(),
            outbound_buffer: default_outbound_buffer(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
        }
    }
}

impl Default for MeetingsConfig {
    fn default() -> Self {
        Self {
            default_host_name: default_host_name(),
            default_guest_name: default_guest_name(),
            code_length: default_code_length(),
            participant_id_length: default_participant_id_length(),
        }
    }
}

impl HeartbeatConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

/// Resolve the port: env PORT overrides config when it parses as a port number.
pub fn resolve_port(config: &Config) -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|s| s.trim().parse::<u16>().ok())
        .unwrap_or(config.gateway.port)
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("HUDDLE_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".huddle").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path (default: HUDDLE_CONFIG_PATH or ~/.huddle/config.json).
/// Missing file => default config. PORT is applied on top.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    config.gateway.port = resolve_port(&config);
    Ok((config, path))
}

//! Heartbeat policy and the per-connection writer task.
//!
//! The writer drains the outbound queue and sends a ping every `ping_interval`. The reader side
//! applies `idle_timeout` to every receive; any frame (data, ping, or pong) resets it.

use crate::config::HeartbeatConfig;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatPolicy {
    pub ping_interval: Duration,
    pub idle_timeout: Duration,
    pub write_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeartbeatPolicyError {
    #[error("heartbeat ping interval must be non-zero")]
    ZeroInterval,
    #[error("heartbeat ping interval ({ping:?}) must be shorter than the idle timeout ({idle:?})")]
    IntervalNotShorter { ping: Duration, idle: Duration },
}

impl HeartbeatPolicy {
    pub fn new(
        ping_interval: Duration,
        idle_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Self, HeartbeatPolicyError> {
        if ping_interval.is_zero() {
            return Err(HeartbeatPolicyError::ZeroInterval);
        }
        if ping_interval >= idle_timeout {
            return Err(HeartbeatPolicyError::IntervalNotShorter {
                ping: ping_interval,
                idle: idle_timeout,
            });
        }
        Ok(Self {
            ping_interval,
            idle_timeout,
            write_timeout,
        })
    }

    pub fn from_config(config: &HeartbeatConfig) -> Result<Self, HeartbeatPolicyError> {
        Self::new(
            config.ping_interval(),
            config.idle_timeout(),
            config.write_timeout(),
        )
    }
}

/// Why the writer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterExit {
    /// Outbound queue closed: the connection is being torn down.
    Drained,
    /// A write failed or exceeded the write timeout.
    WriteFailed,
}

/// Run until the outbound queue closes or a write fails. `first_frame` goes out before anything
/// already queued. Sends a close frame on normal drain.
pub async fn run_writer(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<String>,
    policy: HeartbeatPolicy,
    first_frame: Option<String>,
) -> WriterExit {
    if let Some(text) = first_frame {
        if !write_frame(&mut sink, Message::Text(text), policy.write_timeout).await {
            return WriterExit::WriteFailed;
        }
    }
    let mut ping = time::interval_at(Instant::now() + policy.ping_interval, policy.ping_interval);
    loop {
        let frame = tokio::select! {
            msg = rx.recv() => match msg {
                Some(text) => Message::Text(text),
                None => {
                    let _ = time::timeout(policy.write_timeout, sink.send(Message::Close(None))).await;
                    return WriterExit::Drained;
                }
            },
            _ = ping.tick() => Message::Ping(Vec::new()),
        };
        if !write_frame(&mut sink, frame, policy.write_timeout).await {
            return WriterExit::WriteFailed;
        }
    }
}

async fn write_frame(
    sink: &mut SplitSink<WebSocket, Message>,
    frame: Message,
    write_timeout: Duration,
) -> bool {
    match time::timeout(write_timeout, sink.send(frame)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            log::debug!("websocket write failed: {}", e);
            false
        }
        Err(_) => {
            log::debug!("websocket write timed out after {:?}", write_timeout);
            false
        }
    }
}

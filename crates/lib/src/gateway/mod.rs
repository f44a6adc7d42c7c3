//! Gateway: HTTP + WebSocket front of the meeting service.
//!
//! Single port serves the admission endpoints and the per-participant WebSocket. The first frame
//! on every socket is `init`; after that the client sends `signal`/`chat` and the server pushes
//! relayed messages and admission events.

pub mod admission;
pub mod connections;
pub mod heartbeat;
pub mod protocol;
pub mod relay;
mod server;
pub mod socket;
pub mod views;

pub use connections::{ConnectionHandle, ConnectionHub};
pub use heartbeat::HeartbeatPolicy;
pub use protocol::{ClientMessage, ServerMessage};
pub use server::{router, run_gateway, GatewayState};

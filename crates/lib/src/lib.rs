//! Huddle core library: meeting sessions, waiting-room admission, and the WebSocket gateway
//! that relays signaling and chat between admitted participants.

pub mod config;
pub mod error;
pub mod gateway;
pub mod ids;
pub mod registry;
pub mod session;

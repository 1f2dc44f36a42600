//! WebSocket telemetry transport

pub mod handler;
pub mod protocol;

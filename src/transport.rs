//! Transport layer for the server sockets
//!
//! The audio, waterfall and events streams are each a websocket. This module
//! provides the connection wrapper shared by all three, plus the codec that
//! turns raw frames into protocol types.

use thiserror::Error;

mod codec;
mod connection;

pub use codec::{encode_command, parse_settings_frame};
pub use connection::{Frame, StreamConnection, stream_url};

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] async_tungstenite::tungstenite::Error),
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Protocol error: {0}")]
    Protocol(#[from] crate::protocol::ProtocolError),
    #[error("Stream closed before {0}")]
    Closed(&'static str),
}

//! Websocket connection shared by the audio, waterfall and events streams

use crate::protocol::{ClientCommand, ServerSettings};
use crate::transport::TransportError;
use crate::transport::codec;
use async_tungstenite::WebSocketStream;
use async_tungstenite::tokio::{ConnectStream, connect_async};
use async_tungstenite::tungstenite::{self, Message};
use futures::{SinkExt, StreamExt};

/// Payload frames surfaced to the stream tasks
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Join the configured base URL and a stream path
pub fn stream_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// A connected stream socket
pub struct StreamConnection {
    ws: WebSocketStream<ConnectStream>,
    url: String,
}

impl StreamConnection {
    /// Connect to a stream endpoint
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws, _response) = connect_async(url).await.map_err(|e| match e {
            tungstenite::Error::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
                TransportError::Connection(format!(
                    "Server refused the connection at {}. Is the SDR server running?",
                    url
                ))
            }
            other => TransportError::Connection(format!("Failed to connect to {}: {}", url, other)),
        })?;

        log::debug!("Connected to {}", url);
        Ok(Self {
            ws,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Read the next text or binary frame
    ///
    /// Returns `Ok(None)` once the server closes the stream. Control frames
    /// are consumed here.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        while let Some(message) = self.ws.next().await {
            match message? {
                Message::Text(text) => return Ok(Some(Frame::Text(text))),
                Message::Binary(bytes) => return Ok(Some(Frame::Binary(bytes))),
                Message::Close(_) => return Ok(None),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
        Ok(None)
    }

    /// Wait for the settings message that opens every data stream
    pub async fn read_settings(&mut self) -> Result<ServerSettings, TransportError> {
        loop {
            match self.next_frame().await? {
                None => return Err(TransportError::Closed("settings were received")),
                Some(Frame::Text(text)) => {
                    if let Some(settings) = codec::parse_settings_frame(&text)? {
                        return Ok(settings);
                    }
                    log::debug!("Skipping text frame before settings on {}", self.url);
                }
                Some(Frame::Binary(_)) => {
                    log::debug!("Skipping binary frame before settings on {}", self.url);
                }
            }
        }
    }

    /// Send a command as a single JSON text frame
    pub async fn send(&mut self, command: &ClientCommand) -> Result<(), TransportError> {
        let text = codec::encode_command(command)?;
        self.ws.send(Message::Text(text)).await?;
        Ok(())
    }

    /// Close the socket, ignoring errors from an already-dead peer
    pub async fn close(mut self) {
        if let Err(e) = self.ws.close(None).await {
            log::debug!("Error closing {}: {}", self.url, e);
        }
    }
}

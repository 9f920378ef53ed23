//! JSON codec for control and settings frames
//!
//! Commands go out as one JSON object per text frame. The settings message is
//! the first text frame that carries `fft_size`; anything before it is chatter
//! from the server and is skipped.

use crate::protocol::{ClientCommand, ServerSettings};
use crate::transport::TransportError;

/// Encode a client command into a JSON text frame payload
pub fn encode_command(command: &ClientCommand) -> Result<String, TransportError> {
    Ok(serde_json::to_string(command)?)
}

/// Parse a text frame that may carry the server settings
///
/// Returns `Ok(None)` for frames without `fft_size` so the caller keeps
/// waiting, and an error when the frame claims to be settings but is
/// missing required fields.
pub fn parse_settings_frame(text: &str) -> Result<Option<ServerSettings>, TransportError> {
    let value: serde_json::Value = serde_json::from_str(text.trim())?;
    if value.get("fft_size").is_none_or(|v| v.is_null()) {
        return Ok(None);
    }
    let settings: ServerSettings = serde_json::from_value(value)?;
    Ok(Some(settings))
}

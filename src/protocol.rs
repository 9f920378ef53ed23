//! Wire schema for the SDR server sockets
//!
//! The server speaks JSON text frames for settings and control, and binary
//! frames for audio and waterfall payloads. Everything that crosses a socket is
//! parsed into one of the closed types below before the rest of the client
//! sees it: unknown fields are ignored, missing required fields are rejected.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Highest output rate the playback path will request from the device
pub const MAX_OUTPUT_SAMPLE_RATE: f64 = 96_000.0;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid JSON message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid audio packet: {0}")]
    Packet(String),
    #[error("Unsupported {stream} compression: {name}")]
    UnsupportedCompression { stream: &'static str, name: String },
}

/// Default audio passband suggested by the server
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct BandDefaults {
    pub l: f64,
    pub m: f64,
    pub r: f64,
}

/// First text message on the audio and waterfall sockets
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub fft_size: u32,
    pub fft_result_size: u32,
    pub basefreq: f64,
    pub total_bandwidth: f64,
    pub sps: f64,
    #[serde(default)]
    pub fft_overlap: u32,
    pub audio_max_sps: f64,
    pub audio_compression: String,
    pub waterfall_compression: String,
    pub defaults: BandDefaults,
    #[serde(default)]
    pub waterfall_size: Option<u32>,
    #[serde(default)]
    pub grid_locator: Option<String>,
}

impl ServerSettings {
    /// Parse the settings message, rejecting it if a required field is missing
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Number of FFT bins the server slices out for the audio passband,
    /// rounded up to a multiple of four
    pub fn target_fft_bins(&self) -> f64 {
        (self.audio_max_sps * self.fft_result_size as f64 / self.sps / 4.0).ceil() * 4.0
    }

    /// Sample rate of the PCM the audio decoder produces
    pub fn true_audio_sps(&self) -> f64 {
        self.target_fft_bins() / self.fft_result_size as f64 * self.sps
    }

    /// Rate the output device is opened at
    pub fn audio_output_sps(&self) -> u32 {
        self.audio_max_sps.min(MAX_OUTPUT_SAMPLE_RATE).round() as u32
    }

    /// Audio overlap in samples (half the FFT overlap)
    pub fn audio_overlap(&self) -> u32 {
        self.fft_overlap / 2
    }

    /// How many FFT rows the server skips between waterfall lines
    pub fn waterfall_skip(&self) -> f64 {
        let rows_per_sec = self.sps / self.fft_size as f64;
        ((rows_per_sec / 10.0).floor() * 2.0).max(1.0)
    }

    /// Rate at which waterfall rows arrive (and are drawn)
    pub fn waterfall_fps(&self) -> f64 {
        (self.sps / self.fft_size as f64) / (self.waterfall_skip() / 2.0)
    }

    /// Period of the fixed-rate draw timer
    pub fn draw_interval(&self) -> Duration {
        let fps = self.waterfall_fps();
        if fps.is_finite() && fps > 0.0 {
            Duration::from_secs_f64(1.0 / fps)
        } else {
            Duration::from_millis(100)
        }
    }
}

/// Commands sent from the client to the server, one JSON text frame each
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum ClientCommand {
    /// Audio passband (with `m`) or waterfall viewport (without)
    Window {
        l: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        m: Option<f64>,
        r: i64,
    },
    Demodulation { demodulation: String },
    Options { options: serde_json::Value },
    Mute { mute: bool },
    #[serde(rename = "userid")]
    UserId { userid: String },
}

impl ClientCommand {
    pub fn audio_window(l: i64, m: f64, r: i64) -> Self {
        ClientCommand::Window { l, m: Some(m), r }
    }

    pub fn waterfall_window(l: i64, r: i64) -> Self {
        ClientCommand::Window { l, m: None, r }
    }

    pub fn demodulation(mode: &str) -> Self {
        ClientCommand::Demodulation {
            demodulation: mode.to_string(),
        }
    }

    pub fn user_id(userid: &str) -> Self {
        ClientCommand::UserId {
            userid: userid.to_string(),
        }
    }
}

/// Binary audio frame: received power plus an opaque compressed payload
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AudioPacket {
    #[serde(deserialize_with = "cbor::number")]
    pub pwr: f64,
    #[serde(with = "cbor::bytes")]
    pub data: Vec<u8>,
}

impl AudioPacket {
    /// Decode the CBOR envelope `{pwr, data}`
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        ciborium::from_reader(bytes).map_err(|e| ProtocolError::Packet(e.to_string()))
    }

    /// Encode the CBOR envelope (used by tests and loopback tooling)
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut out = Vec::new();
        ciborium::into_writer(self, &mut out).map_err(|e| ProtocolError::Packet(e.to_string()))?;
        Ok(out)
    }
}

/// Field helpers for the CBOR audio envelope
mod cbor {
    use serde::de::{self, SeqAccess, Visitor};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::fmt;

    /// The server sends whole-number power as a CBOR integer
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Float(f64),
        Int(i64),
    }

    pub fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(match Number::deserialize(deserializer)? {
            Number::Float(f) => f,
            Number::Int(i) => i as f64,
        })
    }

    pub mod bytes {
        use super::*;

        pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_bytes(data)
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_byte_buf(ByteBufVisitor)
        }
    }

    struct ByteBufVisitor;

    impl<'de> Visitor<'de> for ByteBufVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a byte string")
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
            Ok(v.to_vec())
        }

        fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
            Ok(v)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(byte) = seq.next_element()? {
                out.push(byte);
            }
            Ok(out)
        }
    }
}

/// Update broadcast on the events socket
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct EventUpdate {
    /// Full listing of other listeners' tuned ranges
    #[serde(default)]
    pub signal_list: Option<HashMap<String, Vec<f64>>>,
    /// Incremental changes; a range of `[-1, -1]` means the listener left
    #[serde(default)]
    pub signal_changes: Option<HashMap<String, Vec<f64>>>,
    #[serde(default)]
    pub signal_clients: Option<u32>,
    #[serde(default)]
    pub waterfall_clients: Option<u32>,
    #[serde(default)]
    pub waterfall_kbits: Option<f64>,
    #[serde(default)]
    pub audio_kbits: Option<f64>,
}

impl EventUpdate {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS: &str = r#"{
        "fft_size": 131072,
        "fft_result_size": 65536,
        "basefreq": 0,
        "total_bandwidth": 30000000,
        "sps": 60000000,
        "fft_overlap": 65536,
        "audio_max_sps": 12000,
        "audio_compression": "pcm",
        "waterfall_compression": "raw",
        "waterfall_size": 1024,
        "defaults": {"l": 100, "m": 120.5, "r": 150},
        "some_future_field": [1, 2, 3]
    }"#;

    #[test]
    fn test_settings_ignore_unknown_fields() {
        let settings = ServerSettings::from_json(SETTINGS).unwrap();
        assert_eq!(settings.fft_size, 131072);
        assert_eq!(settings.defaults.m, 120.5);
        assert_eq!(settings.waterfall_size, Some(1024));
        assert_eq!(settings.grid_locator, None);
    }

    #[test]
    fn test_settings_reject_missing_required_field() {
        let result = ServerSettings::from_json(r#"{"fft_size": 1024, "sps": 48000}"#);
        assert!(matches!(result, Err(ProtocolError::Json(_))));
    }

    #[test]
    fn test_derived_rates() {
        let settings = ServerSettings::from_json(SETTINGS).unwrap();
        // 12000 * 65536 / 60e6 / 4 = 3.27 -> ceil 4 -> 16 bins
        assert_eq!(settings.target_fft_bins(), 16.0);
        assert!((settings.true_audio_sps() - 16.0 / 65536.0 * 60_000_000.0).abs() < 1e-6);
        assert_eq!(settings.audio_output_sps(), 12000);
        assert_eq!(settings.audio_overlap(), 32768);
    }

    #[test]
    fn test_output_rate_capped() {
        let mut settings = ServerSettings::from_json(SETTINGS).unwrap();
        settings.audio_max_sps = 192_000.0;
        assert_eq!(settings.audio_output_sps(), 96_000);
    }

    #[test]
    fn test_waterfall_draw_rate() {
        let mut settings = ServerSettings::from_json(SETTINGS).unwrap();
        // 60e6 / 131072 = 457.8 rows/s -> skip 90 -> 10.17 fps
        assert_eq!(settings.waterfall_skip(), 90.0);
        assert!((settings.waterfall_fps() - 457.763_671_875 / 45.0).abs() < 1e-9);

        // Slow servers never skip below one row
        settings.sps = 5.0 * settings.fft_size as f64;
        assert_eq!(settings.waterfall_skip(), 1.0);
        assert!((settings.waterfall_fps() - 10.0).abs() < 1e-9);
        assert_eq!(settings.draw_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_window_commands_serialize() {
        let audio = serde_json::to_value(ClientCommand::audio_window(10, 12.5, 20)).unwrap();
        assert_eq!(audio, serde_json::json!({"cmd": "window", "l": 10, "m": 12.5, "r": 20}));

        let waterfall = serde_json::to_value(ClientCommand::waterfall_window(0, 1024)).unwrap();
        assert_eq!(waterfall, serde_json::json!({"cmd": "window", "l": 0, "r": 1024}));
    }

    #[test]
    fn test_other_commands_serialize() {
        let userid = serde_json::to_value(ClientCommand::user_id("abc")).unwrap();
        assert_eq!(userid, serde_json::json!({"cmd": "userid", "userid": "abc"}));

        let mute = serde_json::to_value(ClientCommand::Mute { mute: true }).unwrap();
        assert_eq!(mute, serde_json::json!({"cmd": "mute", "mute": true}));

        let demod = serde_json::to_value(ClientCommand::demodulation("LSB")).unwrap();
        assert_eq!(demod, serde_json::json!({"cmd": "demodulation", "demodulation": "LSB"}));
    }

    #[test]
    fn test_audio_packet_decode() {
        let packet = AudioPacket {
            pwr: 0.25,
            data: vec![1, 2, 3],
        };
        let decoded = AudioPacket::decode(&packet.encode().unwrap()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_audio_packet_integer_power() {
        use ciborium::Value;

        let value = Value::Map(vec![
            (Value::Text("data".into()), Value::Bytes(vec![9])),
            (Value::Text("pwr".into()), Value::Integer(3.into())),
        ]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&value, &mut bytes).unwrap();

        let packet = AudioPacket::decode(&bytes).unwrap();
        assert_eq!(packet.pwr, 3.0);
        assert_eq!(packet.data, vec![9]);
    }

    #[test]
    fn test_audio_packet_missing_data() {
        use ciborium::Value;

        let value = Value::Map(vec![(Value::Text("pwr".into()), Value::Float(1.0))]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&value, &mut bytes).unwrap();

        assert!(matches!(AudioPacket::decode(&bytes), Err(ProtocolError::Packet(_))));
    }

    #[test]
    fn test_audio_packet_ignores_extra_keys() {
        use ciborium::Value;

        let value = Value::Map(vec![
            (Value::Text("pwr".into()), Value::Float(0.5)),
            (Value::Text("seq".into()), Value::Integer(7.into())),
            (Value::Text("data".into()), Value::Bytes(vec![4, 5])),
        ]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&value, &mut bytes).unwrap();

        let packet = AudioPacket::decode(&bytes).unwrap();
        assert_eq!(packet.data, vec![4, 5]);
    }

    #[test]
    fn test_audio_packet_text_data_rejected() {
        use ciborium::Value;

        let value = Value::Map(vec![
            (Value::Text("pwr".into()), Value::Float(0.5)),
            (Value::Text("data".into()), Value::Text("abc".into())),
        ]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&value, &mut bytes).unwrap();

        assert!(matches!(AudioPacket::decode(&bytes), Err(ProtocolError::Packet(_))));
    }

    #[test]
    fn test_event_update_parses_partial() {
        let update = EventUpdate::from_json(
            r#"{"signal_changes": {"ab12": [-1, -1]}, "signal_clients": 3}"#,
        )
        .unwrap();
        assert!(update.signal_list.is_none());
        assert_eq!(update.signal_clients, Some(3));
        assert_eq!(update.signal_changes.unwrap()["ab12"], vec![-1.0, -1.0]);
    }
}

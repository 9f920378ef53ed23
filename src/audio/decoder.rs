use crate::protocol::ProtocolError;

/// Turns the opaque `data` payload of an audio packet into PCM samples
///
/// An empty result means more input is needed, not an error.
pub trait AudioDecoder: Send {
    fn decode(&mut self, encoded: &[u8]) -> Vec<f32>;
}

/// Uncompressed little-endian signed 16-bit PCM
///
/// Packets are not guaranteed to end on a sample boundary; a trailing odd
/// byte is held until the next packet.
#[derive(Debug, Default)]
pub struct PcmDecoder {
    carry: Option<u8>,
}

impl PcmDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioDecoder for PcmDecoder {
    fn decode(&mut self, encoded: &[u8]) -> Vec<f32> {
        let mut bytes = Vec::with_capacity(encoded.len() + 1);
        bytes.extend(self.carry.take());
        bytes.extend_from_slice(encoded);

        let mut pairs = bytes.chunks_exact(2);
        let samples = pairs
            .by_ref()
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
            .collect();
        self.carry = pairs.remainder().first().copied();
        samples
    }
}

/// Pick a decoder for the server's `audio_compression` name
pub fn create_decoder(compression: &str) -> Result<Box<dyn AudioDecoder>, ProtocolError> {
    match compression.to_ascii_lowercase().as_str() {
        "none" | "pcm" | "raw" => Ok(Box::new(PcmDecoder::new())),
        _ => Err(ProtocolError::UnsupportedCompression {
            stream: "audio",
            name: compression.to_string(),
        }),
    }
}

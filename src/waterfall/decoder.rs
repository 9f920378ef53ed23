use crate::protocol::ProtocolError;

/// One spectrum row and the bin window it was captured under
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralFrame {
    pub bins: Vec<f32>,
    pub l: i64,
    pub r: i64,
}

/// Turns a binary waterfall message into zero or more rows
pub trait WaterfallDecoder: Send {
    fn decode(&mut self, message: &[u8]) -> Vec<SpectralFrame>;
}

/// Uncompressed rows: `l` and `r` as little-endian u32, then one signed
/// byte per bin in dB
///
/// Messages may carry several rows back to back.
#[derive(Debug, Default)]
pub struct RawWaterfallDecoder;

const HEADER_LEN: usize = 8;

impl WaterfallDecoder for RawWaterfallDecoder {
    fn decode(&mut self, message: &[u8]) -> Vec<SpectralFrame> {
        let mut frames = Vec::new();
        let mut rest = message;

        while rest.len() >= HEADER_LEN {
            let l = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as i64;
            let r = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]) as i64;
            let width = (r - l).max(0) as usize;
            if width == 0 || rest.len() < HEADER_LEN + width {
                log::debug!("Dropping malformed waterfall row {}..{} ({} bytes)", l, r, rest.len());
                break;
            }

            let bins = rest[HEADER_LEN..HEADER_LEN + width]
                .iter()
                .map(|&b| b as i8 as f32)
                .collect();
            frames.push(SpectralFrame { bins, l, r });
            rest = &rest[HEADER_LEN + width..];
        }

        frames
    }
}

pub fn create_waterfall_decoder(
    compression: &str,
) -> Result<Box<dyn WaterfallDecoder>, ProtocolError> {
    match compression.to_ascii_lowercase().as_str() {
        "none" | "raw" => Ok(Box::new(RawWaterfallDecoder)),
        _ => Err(ProtocolError::UnsupportedCompression {
            stream: "waterfall",
            name: compression.to_string(),
        }),
    }
}

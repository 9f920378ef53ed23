//! FT8 block collection and post-processing

mod decoder;
mod locator;
mod window;

pub use decoder::{BlockDecoder, DecodedMessage, WavBlockRecorder, write_wav};
pub use locator::{distance_km, extract_locators, haversine_km, to_lat_lon};
pub use window::{CollectionWindow, Transition, WindowEdge, WindowState, WindowTiming};

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Messages decoded from one collection window
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeResult {
    /// Sequence number of the window the block came from
    pub window: u64,
    pub messages: Vec<DecodedMessage>,
}

/// Decode `block` off the collection path and deliver the result on `results`
///
/// Decodes are not serialised: a slow decode may finish after the next
/// window's, so results can arrive out of window order. A failed decode is
/// reported as a window with no messages. If the receiver is gone the result
/// is dropped.
pub fn spawn_decode(
    decoder: Arc<dyn BlockDecoder>,
    block: Vec<f32>,
    sample_rate: u32,
    window: u64,
    results: mpsc::UnboundedSender<DecodeResult>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let samples = block.len();
        let messages = match decoder.decode(block, sample_rate).await {
            Ok(messages) => messages,
            Err(e) => {
                log::warn!("FT8 decode of window {} ({} samples) failed: {:#}", window, samples, e);
                Vec::new()
            }
        };
        if results.send(DecodeResult { window, messages }).is_err() {
            log::debug!("Discarding FT8 result for window {}", window);
        }
    })
}

/// A decoded message that carries at least one locator
#[derive(Debug, Clone, PartialEq)]
pub struct Ft8Report {
    pub text: String,
    pub locators: Vec<String>,
    /// Distance from the home locator to the first locator in the message
    pub distance_km: Option<f64>,
    /// Farthest distance seen so far, including this message
    pub farthest_km: f64,
}

#[derive(Debug, Default)]
pub struct Ft8Reporter {
    home: Option<(f64, f64)>,
    farthest_km: f64,
}

impl Ft8Reporter {
    pub fn new(home_locator: Option<&str>) -> Self {
        let home = home_locator.and_then(|locator| {
            let home = to_lat_lon(locator);
            if home.is_none() {
                log::warn!("Ignoring invalid grid locator '{}'", locator);
            }
            home
        });
        Self {
            home,
            farthest_km: 0.0,
        }
    }

    pub fn farthest_km(&self) -> f64 {
        self.farthest_km
    }

    /// Turn decoded messages into reports, skipping those without locators
    pub fn report(&mut self, messages: &[DecodedMessage]) -> Vec<Ft8Report> {
        let mut reports = Vec::new();
        for message in messages {
            let locators = extract_locators(&message.text);
            let Some(target) = locators.first() else {
                continue;
            };

            let distance_km = self
                .home
                .zip(to_lat_lon(target))
                .map(|(home, target)| haversine_km(home, target));
            if let Some(distance) = distance_km {
                self.farthest_km = self.farthest_km.max(distance);
            }

            reports.push(Ft8Report {
                text: message.text.clone(),
                locators,
                distance_km,
                farthest_km: self.farthest_km,
            });
        }
        reports
    }
}

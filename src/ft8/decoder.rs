use anyhow::{Context, Result};
use hound::{WavSpec, WavWriter};
use jiff::Zoned;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

/// One message demodulated from a collected block
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    pub text: String,
}

impl DecodedMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Block decoder: one collected window in, messages out
pub trait BlockDecoder: Send + Sync {
    fn decode(
        &self,
        samples: Vec<f32>,
        sample_rate: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DecodedMessage>>> + Send + 'static>>;
}

/// Stores each block as a WAV file for offline decoding
pub struct WavBlockRecorder {
    dir: PathBuf,
}

impl WavBlockRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn block_path(&self) -> PathBuf {
        let timestamp = Zoned::now().strftime("%Y-%m-%d_%H-%M-%S");
        self.dir.join(format!("ft8_{}.wav", timestamp))
    }
}

impl BlockDecoder for WavBlockRecorder {
    fn decode(
        &self,
        samples: Vec<f32>,
        sample_rate: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DecodedMessage>>> + Send + 'static>> {
        let dir = self.dir.clone();
        let path = self.block_path();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || -> Result<Vec<DecodedMessage>> {
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
                write_wav(&path, &samples, sample_rate)?;
                log::info!("Saved {} samples to {}", samples.len(), path.display());
                Ok(Vec::new())
            })
            .await?
        })
    }
}

pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for &sample in samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

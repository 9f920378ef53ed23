use crate::audio::{PlayoutTuning, SchedulerConfig};
use crate::ft8::WindowTiming;
use crate::waterfall::WaterfallConfig;
use anyhow::{Context, Result, anyhow, ensure};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "spectrum-client";

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub playout: PlayoutConfig,
    #[serde(default)]
    pub waterfall: WaterfallConfig,
    #[serde(default)]
    pub ft8: Ft8Config,
    #[serde(default)]
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_audio_path")]
    pub audio_path: String,
    #[serde(default = "default_waterfall_path")]
    pub waterfall_path: String,
    #[serde(default = "default_events_path")]
    pub events_path: String,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct PlayoutConfig {
    #[serde(flatten)]
    pub scheduler: SchedulerConfig,
    #[serde(flatten)]
    pub tuning: PlayoutTuning,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct Ft8Config {
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub timing: WindowTiming,
    #[serde(default)]
    pub grid_locator: Option<String>,
    #[serde(default)]
    pub record_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AudioConfig {
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub squelch: bool,
    #[serde(default)]
    pub squelch_threshold_db: f64,
    #[serde(default = "default_demodulation")]
    pub demodulation: String,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default = "default_gain")]
    pub gain: f32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            audio_path: default_audio_path(),
            waterfall_path: default_waterfall_path(),
            events_path: default_events_path(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            mute: false,
            squelch: false,
            squelch_threshold_db: 0.0,
            demodulation: default_demodulation(),
            device: None,
            gain: default_gain(),
        }
    }
}

fn default_url() -> String {
    "ws://localhost:9002".into()
}

fn default_audio_path() -> String {
    "/audio".into()
}

fn default_waterfall_path() -> String {
    "/waterfall".into()
}

fn default_events_path() -> String {
    "/events".into()
}

fn default_demodulation() -> String {
    "USB".into()
}

fn default_gain() -> f32 {
    1.0
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(directories::BaseDirs::new()
        .ok_or_else(|| anyhow!("Could not find config directory"))?
        .config_dir()
        .join(APP_DIR)
        .join("config.toml"))
}

/// Where collected FT8 blocks go when no `record_dir` is configured
pub fn recordings_dir() -> Result<PathBuf> {
    Ok(directories::BaseDirs::new()
        .ok_or_else(|| anyhow!("Could not find data directory"))?
        .data_local_dir()
        .join(APP_DIR)
        .join("recordings"))
}

/// Load the config file; a missing file gives the defaults
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };

    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(ClientConfig::default());
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };

    parse_config(&content).with_context(|| format!("Invalid config {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<ClientConfig> {
    let config: ClientConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

impl ClientConfig {
    /// Reject values the timing and drawing code cannot work with
    pub fn validate(&self) -> Result<()> {
        let timing = &self.ft8.timing;
        ensure!(timing.period_secs > 0, "ft8.period_secs must be positive");
        ensure!(
            timing.headroom_secs < timing.period_secs,
            "ft8.headroom_secs ({}) must be shorter than ft8.period_secs ({})",
            timing.headroom_secs,
            timing.period_secs
        );

        let waterfall = &self.waterfall;
        ensure!(
            waterfall.min_db < waterfall.max_db,
            "waterfall.min_db ({}) must be below waterfall.max_db ({})",
            waterfall.min_db,
            waterfall.max_db
        );
        ensure!(
            waterfall.zoom_step > 0.0 && waterfall.zoom_step < 1.0,
            "waterfall.zoom_step must be between 0 and 1, got {}",
            waterfall.zoom_step
        );
        ensure!(
            waterfall.canvas_width > 0.0,
            "waterfall.canvas_width must be positive"
        );
        ensure!(
            (0.0..=1.0).contains(&waterfall.spectrum_alpha),
            "waterfall.spectrum_alpha must be between 0 and 1, got {}",
            waterfall.spectrum_alpha
        );
        Ok(())
    }
}

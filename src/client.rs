//! Connects the audio, waterfall and events streams and runs them together

mod audio;
mod control;
mod waterfall;

pub use control::{Control, parse_control};

use crate::audio::AudioOutput;
use crate::config::{ClientConfig, recordings_dir};
use crate::ft8::{BlockDecoder, WavBlockRecorder};
use crate::protocol::ServerSettings;
use crate::transport::{StreamConnection, stream_url};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Everything `run` needs beyond the config file
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub user_id: String,
    /// Draw the waterfall and spectrum; frames are discarded otherwise
    pub draw_waterfall: bool,
}

/// Connect to the audio socket and return its settings
pub async fn probe(config: &ClientConfig) -> Result<ServerSettings> {
    let url = stream_url(&config.server.url, &config.server.audio_path);
    let mut conn = StreamConnection::connect(&url).await?;
    let settings = conn
        .read_settings()
        .await
        .with_context(|| format!("No settings from {}", url))?;
    conn.close().await;
    Ok(settings)
}

fn ft8_decoder(config: &ClientConfig) -> Result<Option<Arc<dyn BlockDecoder>>> {
    if !config.ft8.enabled {
        return Ok(None);
    }
    let dir = match &config.ft8.record_dir {
        Some(dir) => dir.clone(),
        None => recordings_dir()?,
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    log::info!("FT8 blocks will be written to {}", dir.display());
    let decoder: Arc<dyn BlockDecoder> = Arc::new(WavBlockRecorder::new(dir));
    Ok(Some(decoder))
}

/// Route stdin commands to the stream that handles them
async fn read_controls(
    audio_tx: mpsc::UnboundedSender<Control>,
    waterfall_tx: mpsc::UnboundedSender<Control>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::warn!("Failed to read command: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_control(&line) {
            Ok(control) => {
                let tx = if control.is_audio() { &audio_tx } else { &waterfall_tx };
                if tx.send(control).is_err() {
                    log::debug!("Stream for command already stopped");
                }
            }
            Err(e) => log::warn!("{:#}", e),
        }
    }
}

/// Run all streams until one ends or ctrl-c is pressed
///
/// The output device is opened here and stays on this task, since the
/// device stream cannot move between threads. The audio task only gets a
/// handle to its timeline.
pub async fn run(config: ClientConfig, options: RunOptions) -> Result<()> {
    let server = &config.server;
    let audio_url = stream_url(&server.url, &server.audio_path);
    let mut audio_conn = StreamConnection::connect(&audio_url).await?;
    let settings = audio_conn
        .read_settings()
        .await
        .with_context(|| format!("No settings from {}", audio_url))?;

    let output = AudioOutput::open(
        config.audio.device.as_deref(),
        settings.audio_output_sps(),
        config.audio.gain,
    )
    .context("Failed to open audio output")?;

    let waterfall_conn =
        StreamConnection::connect(&stream_url(&server.url, &server.waterfall_path)).await?;
    let events_conn =
        match StreamConnection::connect(&stream_url(&server.url, &server.events_path)).await {
            Ok(conn) => Some(conn),
            Err(e) => {
                log::warn!("Continuing without listener events: {}", e);
                None
            }
        };

    let (audio_tx, audio_rx) = mpsc::unbounded_channel();
    let (waterfall_tx, waterfall_rx) = mpsc::unbounded_channel();

    let mut audio_task = tokio::spawn(audio::run_audio(
        audio_conn,
        settings,
        output.handle(),
        config.clone(),
        options.user_id.clone(),
        ft8_decoder(&config)?,
        audio_rx,
    ));
    let mut waterfall_task = tokio::spawn(waterfall::run_waterfall(
        waterfall_conn,
        events_conn,
        config.waterfall,
        options.user_id.clone(),
        options.draw_waterfall,
        waterfall_rx,
    ));
    let control_task = tokio::spawn(read_controls(audio_tx, waterfall_tx));

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted, disconnecting");
            Ok(())
        }
        result = &mut audio_task => result.context("Audio task failed").and_then(|r| r),
        result = &mut waterfall_task => result.context("Waterfall task failed").and_then(|r| r),
    };

    audio_task.abort();
    waterfall_task.abort();
    control_task.abort();
    drop(output);
    result
}

mod audio;
mod client;
mod config;
mod events;
mod ft8;
mod protocol;
mod transport;
mod waterfall;

use crate::client::RunOptions;
use crate::config::ClientConfig;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "spectrum-client")]
#[command(about = "Listen to a web SDR server from the terminal")]
#[command(version = "0.1.0")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the server, play audio and follow the waterfall
    Run {
        /// Server base URL, e.g. ws://host:9002
        #[arg(long)]
        url: Option<String>,

        /// Output device name (see `devices`)
        #[arg(long)]
        device: Option<String>,

        /// Collect FT8 blocks on the 15 second grid
        #[arg(long)]
        ft8: bool,

        /// Discard waterfall frames instead of drawing them
        #[arg(long)]
        no_waterfall: bool,

        /// Demodulation mode sent on connect
        #[arg(long)]
        demodulation: Option<String>,

        /// Start muted
        #[arg(long)]
        mute: bool,
    },

    /// Print the server settings and derived stream rates as JSON
    Probe {
        /// Server base URL, e.g. ws://host:9002
        #[arg(long)]
        url: Option<String>,
    },

    /// List available audio output devices
    Devices,
}

fn apply_overrides(
    config: &mut ClientConfig,
    url: Option<String>,
    device: Option<String>,
    ft8: bool,
    demodulation: Option<String>,
    mute: bool,
) {
    if let Some(url) = url {
        config.server.url = url;
    }
    if device.is_some() {
        config.audio.device = device;
    }
    if let Some(demodulation) = demodulation {
        config.audio.demodulation = demodulation.to_uppercase();
    }
    config.ft8.enabled |= ft8;
    config.audio.mute |= mute;
}

async fn probe(config: &ClientConfig) -> Result<()> {
    let settings = client::probe(config).await?;
    let report = serde_json::json!({
        "fft_size": settings.fft_size,
        "fft_result_size": settings.fft_result_size,
        "basefreq": settings.basefreq,
        "total_bandwidth": settings.total_bandwidth,
        "sps": settings.sps,
        "audio_max_sps": settings.audio_max_sps,
        "audio_compression": settings.audio_compression,
        "waterfall_compression": settings.waterfall_compression,
        "grid_locator": settings.grid_locator,
        "derived": {
            "target_fft_bins": settings.target_fft_bins(),
            "true_audio_sps": settings.true_audio_sps(),
            "audio_output_sps": settings.audio_output_sps(),
            "audio_overlap": settings.audio_overlap(),
            "waterfall_skip": settings.waterfall_skip(),
            "waterfall_fps": settings.waterfall_fps(),
            "draw_interval_ms": settings.draw_interval().as_millis() as u64,
        },
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn list_devices() -> Result<()> {
    let devices = audio::list_devices()?;
    println!("Available Output Devices:");
    println!("{:<30} {:<10} {:<20} Formats", "Name", "Default", "Sample Rates");
    println!("{}", "-".repeat(80));

    for device in devices {
        let default_str = if device.is_default { "YES" } else { "NO" };
        let sample_rates = device
            .supported_sample_rates
            .iter()
            .take(3)
            .map(|(min, max)| format!("{}-{}", min, max))
            .collect::<Vec<_>>()
            .join(", ");
        let formats = device
            .supported_formats
            .iter()
            .take(2)
            .map(|f| format!("{:?}", f))
            .collect::<Vec<_>>()
            .join(", ");

        println!(
            "{:<30} {:<10} {:<20} {}",
            device.name.chars().take(30).collect::<String>(),
            default_str,
            sample_rates,
            formats
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    let mut config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            url,
            device,
            ft8,
            no_waterfall,
            demodulation,
            mute,
        } => {
            apply_overrides(&mut config, url, device, ft8, demodulation, mute);
            let options = RunOptions {
                user_id: uuid::Uuid::new_v4().to_string(),
                draw_waterfall: !no_waterfall,
            };
            log::info!("Connecting to {} as {}", config.server.url, options.user_id);
            client::run(config, options).await
        }
        Commands::Probe { url } => {
            if let Some(url) = url {
                config.server.url = url;
            }
            probe(&config).await
        }
        Commands::Devices => list_devices(),
    }
}

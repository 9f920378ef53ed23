//! Audio stream task: packets in, scheduled playback and FT8 blocks out

use crate::audio::{AudioGate, AudioSession, OutputHandle, OutputSink};
use crate::client::control::Control;
use crate::config::{ClientConfig, Ft8Config};
use crate::ft8::{
    BlockDecoder, CollectionWindow, DecodeResult, Ft8Reporter, WindowEdge, spawn_decode,
};
use crate::protocol::{ClientCommand, ServerSettings};
use crate::transport::{Frame, StreamConnection};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Hands closed collection windows to the block decoder and reports results
pub struct Ft8Collector {
    decoder: Arc<dyn BlockDecoder>,
    results_tx: mpsc::UnboundedSender<DecodeResult>,
    reporter: Ft8Reporter,
    windows: u64,
}

impl Ft8Collector {
    pub fn new(
        decoder: Arc<dyn BlockDecoder>,
        home_locator: Option<&str>,
    ) -> (Self, mpsc::UnboundedReceiver<DecodeResult>) {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let collector = Self {
            decoder,
            results_tx,
            reporter: Ft8Reporter::new(home_locator),
            windows: 0,
        };
        (collector, results_rx)
    }

    /// Act on a window edge; a close with samples starts a decode
    pub fn on_edge(
        &mut self,
        window: &mut CollectionWindow,
        edge: WindowEdge,
        sample_rate: u32,
    ) -> Option<JoinHandle<()>> {
        match edge {
            WindowEdge::Open => {
                window.open();
                log::debug!("FT8 window opened");
                None
            }
            WindowEdge::Close => {
                let block = window.close()?;
                if block.is_empty() {
                    log::debug!("FT8 window closed with no audio");
                    return None;
                }
                self.windows += 1;
                log::debug!("FT8 window {} closed with {} samples", self.windows, block.len());
                Some(spawn_decode(
                    self.decoder.clone(),
                    block,
                    sample_rate,
                    self.windows,
                    self.results_tx.clone(),
                ))
            }
        }
    }

    pub fn on_result(&mut self, result: DecodeResult) {
        for report in self.reporter.report(&result.messages) {
            match report.distance_km {
                Some(distance) => log::info!(
                    "FT8 [{}] {} ({:.0} km, farthest {:.0} km)",
                    result.window,
                    report.text,
                    distance,
                    report.farthest_km
                ),
                None => log::info!("FT8 [{}] {}", result.window, report.text),
            }
        }
    }
}

/// The configured locator wins over the one the server advertises
fn home_locator<'a>(config: &'a Ft8Config, settings: &'a ServerSettings) -> Option<&'a str> {
    config
        .grid_locator
        .as_deref()
        .or(settings.grid_locator.as_deref())
}

/// Send the opening commands for a fresh audio connection
async fn handshake(
    conn: &mut StreamConnection,
    session: &mut AudioSession,
    settings: &ServerSettings,
    user_id: &str,
    demodulation: &str,
    mute: bool,
) -> Result<()> {
    let defaults = settings.defaults;
    conn.send(&ClientCommand::user_id(user_id)).await?;
    conn.send(&session.set_demodulation(demodulation)).await?;
    conn.send(&session.set_audio_range(defaults.l, defaults.m, defaults.r))
        .await?;
    if let Some(command) = session.set_mute(mute) {
        conn.send(&command).await?;
    }
    Ok(())
}

fn apply_control(
    session: &mut AudioSession,
    output: &OutputHandle,
    control: Control,
) -> Option<ClientCommand> {
    match control {
        Control::Tune { l, m, r } => Some(session.set_audio_range(l, m, r)),
        Control::Demodulation(mode) => Some(session.set_demodulation(&mode)),
        Control::Mute(mute) => session.set_mute(mute),
        Control::Squelch {
            enabled,
            threshold_db,
        } => {
            session.set_squelch(enabled, threshold_db);
            None
        }
        Control::Options(options) => Some(session.set_options(options)),
        Control::Gain(gain) => {
            output.set_gain(gain);
            log::info!("Playback gain {:.2}", output.gain());
            None
        }
        other => {
            log::debug!("Audio stream ignores {:?}", other);
            None
        }
    }
}

/// Run the audio stream until the server closes it
pub async fn run_audio(
    mut conn: StreamConnection,
    settings: ServerSettings,
    mut output: OutputHandle,
    config: ClientConfig,
    user_id: String,
    ft8_decoder: Option<Arc<dyn BlockDecoder>>,
    mut controls: mpsc::UnboundedReceiver<Control>,
) -> Result<()> {
    let audio = &config.audio;
    // The server is told about mute in the handshake; start open so the
    // change is sent
    let gate = AudioGate::new(false, audio.squelch, audio.squelch_threshold_db);
    let mut session = AudioSession::new(
        &settings,
        config.playout.scheduler,
        config.playout.tuning,
        gate,
        output.now(),
    )
    .context("Unsupported audio stream")?;

    handshake(
        &mut conn,
        &mut session,
        &settings,
        &user_id,
        &audio.demodulation,
        audio.mute,
    )
    .await?;

    let (mut collector, mut results) = match ft8_decoder {
        Some(decoder) => {
            session.attach_collection(CollectionWindow::new(config.ft8.timing));
            let (collector, results) =
                Ft8Collector::new(decoder, home_locator(&config.ft8, &settings));
            (Some(collector), Some(results))
        }
        None => (None, None),
    };

    log::info!(
        "Audio stream at {} Hz ({})",
        session.sample_rate(),
        settings.audio_compression
    );

    let mut stats = tokio::time::interval(STATS_INTERVAL);
    loop {
        let upcoming = session
            .collection_mut()
            .map(|window| window.next_edge(jiff::Timestamp::now()));
        let edge_wait = async {
            match upcoming {
                Some((delay, edge)) => {
                    tokio::time::sleep(delay).await;
                    edge
                }
                None => std::future::pending().await,
            }
        };
        let next_result = async {
            match results.as_mut() {
                Some(rx) => rx.recv().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            frame = conn.next_frame() => {
                match frame? {
                    None => {
                        log::info!("Audio stream closed by server");
                        break;
                    }
                    Some(Frame::Binary(bytes)) => {
                        if let Err(e) = session.handle_packet(&bytes, Instant::now(), &mut output) {
                            log::warn!("Dropping audio packet: {}", e);
                        }
                    }
                    Some(Frame::Text(text)) => {
                        log::debug!("Ignoring text on audio stream: {}", text);
                    }
                }
            }
            edge = edge_wait => {
                let sample_rate = session.sample_rate();
                if let (Some(collector), Some(window)) =
                    (collector.as_mut(), session.collection_mut())
                {
                    collector.on_edge(window, edge, sample_rate);
                }
            }
            Some(result) = next_result => {
                if let Some(collector) = collector.as_mut() {
                    collector.on_result(result);
                }
            }
            Some(control) = controls.recv() => {
                if let Some(command) = apply_control(&mut session, &output, control) {
                    conn.send(&command).await?;
                }
            }
            _ = stats.tick() => {
                let scheduler = session.scheduler();
                log::debug!(
                    "Audio: power {:.1} dB, gain {:.2}, buffer {:.0} ms",
                    session.power_db(),
                    output.gain(),
                    session.clock().target_buffer_ms()
                );
                log::debug!(
                    "Playout: margin {:.3} s, {} underruns, {} overruns",
                    scheduler.margin(output.now()),
                    scheduler.underruns(),
                    scheduler.overruns()
                );
            }
        }
    }

    output.clear();
    conn.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{PlayoutTuning, SchedulerConfig};
    use crate::ft8::{DecodedMessage, WindowTiming};
    use std::future::Future;
    use std::pin::Pin;

    /// Reports the block length as a message
    struct CountingDecoder;

    impl BlockDecoder for CountingDecoder {
        fn decode(
            &self,
            samples: Vec<f32>,
            sample_rate: u32,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<DecodedMessage>>> + Send + 'static>>
        {
            Box::pin(async move {
                Ok(vec![DecodedMessage::new(format!(
                    "CQ {} {} FN42",
                    samples.len(),
                    sample_rate
                ))])
            })
        }
    }

    #[tokio::test]
    async fn test_close_edge_starts_numbered_decode() {
        let (mut collector, mut results) = Ft8Collector::new(Arc::new(CountingDecoder), None);
        let mut window = CollectionWindow::new(WindowTiming::default());

        assert!(collector.on_edge(&mut window, WindowEdge::Open, 12000).is_none());
        window.push_samples(&[0.5; 6]);
        let handle = collector
            .on_edge(&mut window, WindowEdge::Close, 12000)
            .unwrap();
        handle.await.unwrap();

        let result = results.recv().await.unwrap();
        assert_eq!(result.window, 1);
        assert_eq!(result.messages, vec![DecodedMessage::new("CQ 6 12000 FN42")]);
        assert!(!window.is_collecting());
    }

    #[tokio::test]
    async fn test_empty_or_idle_close_is_skipped() {
        let (mut collector, _results) = Ft8Collector::new(Arc::new(CountingDecoder), None);
        let mut window = CollectionWindow::new(WindowTiming::default());

        // Not collecting
        assert!(collector.on_edge(&mut window, WindowEdge::Close, 12000).is_none());

        window.open();
        assert!(collector.on_edge(&mut window, WindowEdge::Close, 12000).is_none());
        assert_eq!(collector.windows, 0);
    }

    fn settings(grid_locator: Option<&str>) -> ServerSettings {
        let mut settings = ServerSettings::from_json(
            r#"{
                "fft_size": 8192, "fft_result_size": 4096, "basefreq": 0,
                "total_bandwidth": 30000000, "sps": 60000000,
                "audio_max_sps": 12000, "audio_compression": "none",
                "waterfall_compression": "none",
                "defaults": {"l": 10.5, "m": 12.0, "r": 14.2}
            }"#,
        )
        .unwrap();
        settings.grid_locator = grid_locator.map(str::to_string);
        settings
    }

    #[test]
    fn test_home_locator_prefers_config() {
        let mut ft8 = Ft8Config::default();
        assert_eq!(home_locator(&ft8, &settings(None)), None);
        assert_eq!(home_locator(&ft8, &settings(Some("JO62"))), Some("JO62"));

        ft8.grid_locator = Some("FN31".to_string());
        assert_eq!(home_locator(&ft8, &settings(Some("JO62"))), Some("FN31"));
    }

    #[test]
    fn test_server_locator_gives_distances() {
        let settings = settings(Some("JO62"));
        let (mut collector, _results) = Ft8Collector::new(
            Arc::new(CountingDecoder),
            home_locator(&Ft8Config::default(), &settings),
        );

        let reports = collector
            .reporter
            .report(&[DecodedMessage::new("CQ DL1ABC JO31")]);
        assert_eq!(reports.len(), 1);
        assert!(reports[0].distance_km.is_some_and(|km| km > 100.0));
    }

    #[test]
    fn test_gain_control_updates_output() {
        let settings = settings(None);
        let output = OutputHandle::new(settings.audio_output_sps(), 1.0);
        let mut session = AudioSession::new(
            &settings,
            SchedulerConfig::default(),
            PlayoutTuning::default(),
            AudioGate::new(false, false, 0.0),
            0.0,
        )
        .unwrap();

        assert_eq!(apply_control(&mut session, &output, Control::Gain(0.4)), None);
        assert_eq!(output.gain(), 0.4);
        assert!(apply_control(&mut session, &output, Control::Mute(true)).is_some());
    }
}

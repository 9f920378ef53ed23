//! Waterfall stream task, with the events socket feeding listener markers

use crate::client::control::Control;
use crate::events::SignalDirectory;
use crate::protocol::{ClientCommand, EventUpdate, ServerSettings};
use crate::transport::{Frame, StreamConnection, TransportError};
use crate::waterfall::{
    DrawPipeline, FrameRenderer, FrequencyAxis, LogRenderer, WaterfallConfig,
    create_waterfall_decoder,
};
use anyhow::{Context, Result};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

const TERMINAL_COLUMNS: usize = 100;

/// Apply a waterfall control; returns the command to send when the view moved
fn apply_control(
    pipeline: &mut DrawPipeline,
    renderer: &mut dyn FrameRenderer,
    control: Control,
) -> Option<ClientCommand> {
    let command = match control {
        Control::Zoom { x, zoom_in } => {
            log::debug!("Zooming around {:.0} Hz", pipeline.mapper().pixel_to_freq(x));
            pipeline.zoom(x, zoom_in)
        }
        Control::Pan(dx) => pipeline.pan(dx),
        Control::View { l, r } => match pipeline.set_viewport(l, r) {
            Ok(command) => Some(command),
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        },
        Control::Redraw => {
            pipeline.redraw(renderer);
            None
        }
        Control::Range { min_db, max_db } => {
            if pipeline.set_colour_range(min_db, max_db) {
                pipeline.redraw(renderer);
            } else {
                log::warn!("Colour range needs min below max, got {} {}", min_db, max_db);
            }
            None
        }
        Control::Alpha(alpha) => {
            pipeline.set_spectrum_alpha(alpha);
            None
        }
        Control::Width(width) => {
            if pipeline.set_canvas_width(width) {
                renderer.resize(width);
                pipeline.draw_scale(renderer);
                pipeline.redraw(renderer);
            } else {
                log::warn!("Canvas width must be positive, got {}", width);
            }
            None
        }
        Control::Height(rows) => {
            pipeline.set_canvas_height(rows);
            None
        }
        other => {
            log::debug!("Waterfall stream ignores {:?}", other);
            None
        }
    };
    if command.is_some() {
        pipeline.draw_scale(renderer);
    }
    command
}

fn log_markers(directory: &SignalDirectory, pipeline: &DrawPipeline) {
    let markers = directory.markers(&pipeline.viewport(), &pipeline.mapper());
    log::debug!(
        "{} listener(s), {} in view",
        directory.len(),
        markers.len()
    );
    for marker in markers {
        log::trace!("Listener {} at x={:.0}", marker.id, marker.x);
    }
}

fn handle_event(directory: &mut SignalDirectory, pipeline: &DrawPipeline, text: &str) {
    match EventUpdate::from_json(text) {
        Ok(update) => {
            if directory.apply(update, Instant::now()) {
                log_markers(directory, pipeline);
            }
        }
        Err(e) => log::warn!("Ignoring malformed event: {}", e),
    }
}

async fn next_event(
    events: &mut Option<StreamConnection>,
) -> Result<Option<Frame>, TransportError> {
    match events.as_mut() {
        Some(conn) => conn.next_frame().await,
        None => std::future::pending().await,
    }
}

/// Identify this client on the waterfall and events sockets
///
/// An events socket that cannot take the id is dropped, like one that
/// failed to connect.
async fn announce(
    conn: &mut StreamConnection,
    events: &mut Option<StreamConnection>,
    user_id: &str,
) -> Result<()> {
    let command = ClientCommand::user_id(user_id);
    conn.send(&command).await?;
    if let Some(events_conn) = events.as_mut()
        && let Err(e) = events_conn.send(&command).await
    {
        log::warn!("Continuing without listener events: {}", e);
        *events = None;
    }
    Ok(())
}

/// Run the waterfall stream until the server closes it
///
/// `events` is optional: without it the listener directory stays empty.
pub async fn run_waterfall(
    mut conn: StreamConnection,
    mut events: Option<StreamConnection>,
    config: WaterfallConfig,
    user_id: String,
    draw: bool,
    mut controls: mpsc::UnboundedReceiver<Control>,
) -> Result<()> {
    let settings: ServerSettings = conn
        .read_settings()
        .await
        .context("Waterfall stream did not send settings")?;
    announce(&mut conn, &mut events, &user_id).await?;
    let mut decoder = create_waterfall_decoder(&settings.waterfall_compression)
        .context("Unsupported waterfall stream")?;

    let canvas_width = config.canvas_width;
    let mut pipeline = DrawPipeline::new(config, FrequencyAxis::from_settings(&settings));
    pipeline.set_draw_enabled(draw, draw);
    let mut renderer = LogRenderer::new(TERMINAL_COLUMNS, canvas_width);
    let mut directory = SignalDirectory::new();

    let interval = settings.draw_interval();
    log::info!(
        "Waterfall stream: {} bins, {:.1} fps",
        settings.fft_result_size,
        settings.waterfall_fps()
    );
    pipeline.draw_scale(&mut renderer);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = conn.next_frame() => {
                match frame? {
                    None => {
                        log::info!("Waterfall stream closed by server");
                        break;
                    }
                    Some(Frame::Binary(bytes)) => {
                        for frame in decoder.decode(&bytes) {
                            pipeline.enqueue(frame);
                        }
                    }
                    Some(Frame::Text(text)) => {
                        log::debug!("Ignoring text on waterfall stream: {}", text);
                    }
                }
            }
            event = next_event(&mut events) => {
                match event {
                    Ok(Some(Frame::Text(text))) => handle_event(&mut directory, &pipeline, &text),
                    Ok(Some(Frame::Binary(_))) => {}
                    Ok(None) => {
                        log::info!("Events stream closed by server");
                        events = None;
                    }
                    Err(e) => {
                        log::warn!("Events stream failed: {}", e);
                        events = None;
                    }
                }
            }
            _ = ticker.tick() => {
                pipeline.draw_tick(&mut renderer);
            }
            Some(control) = controls.recv() => {
                if let Some(command) = apply_control(&mut pipeline, &mut renderer, control) {
                    conn.send(&command).await?;
                    log_markers(&directory, &pipeline);
                }
            }
        }
    }

    log::debug!(
        "Waterfall drew {} rows, dropped {} frames",
        renderer.rows_drawn(),
        pipeline.dropped()
    );
    if let Some(events) = events {
        events.close().await;
    }
    conn.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waterfall::{BandMarker, Graduation, RenderRow};
    use async_tungstenite::tungstenite::Message;
    use futures::StreamExt;
    use tokio::task::JoinHandle;

    #[derive(Default)]
    struct CountingRenderer {
        rows: usize,
        scales: usize,
        width: Option<f64>,
    }

    impl FrameRenderer for CountingRenderer {
        fn draw_waterfall_row(&mut self, _row: &RenderRow) {
            self.rows += 1;
        }

        fn draw_spectrum(&mut self, _line: &[f32], _px_l: f64, _px_r: f64) {}

        fn draw_scale(&mut self, _graduation: &Graduation, _bands: &[BandMarker]) {
            self.scales += 1;
        }

        fn resize(&mut self, canvas_width: f64) {
            self.width = Some(canvas_width);
        }
    }

    /// Accept one websocket and return the first text message it sends
    async fn first_text_server() -> (String, JoinHandle<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = async_tungstenite::tokio::accept_async(stream).await.unwrap();
            loop {
                if let Message::Text(text) = ws.next().await.unwrap().unwrap() {
                    return text;
                }
            }
        });
        (url, handle)
    }

    fn parse_json(text: &str) -> serde_json::Value {
        serde_json::from_str(text).unwrap()
    }

    fn pipeline() -> DrawPipeline {
        let axis = FrequencyAxis {
            basefreq: 0.0,
            total_bandwidth: 30_000_000.0,
            max_bins: 4096.0,
        };
        DrawPipeline::new(WaterfallConfig::default(), axis)
    }

    #[test]
    fn test_view_change_sends_window_and_redraws_scale() {
        let mut pipeline = pipeline();
        let mut renderer = CountingRenderer::default();

        let command = apply_control(&mut pipeline, &mut renderer, Control::View { l: 100, r: 612 });
        assert_eq!(command, Some(ClientCommand::waterfall_window(100, 612)));
        assert_eq!(renderer.scales, 1);
    }

    #[test]
    fn test_rejected_view_sends_nothing() {
        let mut pipeline = pipeline();
        let mut renderer = CountingRenderer::default();

        assert_eq!(
            apply_control(&mut pipeline, &mut renderer, Control::View { l: 50, r: 50 }),
            None
        );
        assert_eq!(
            apply_control(&mut pipeline, &mut renderer, Control::Mute(true)),
            None
        );
        assert_eq!(renderer.scales, 0);
        assert_eq!(pipeline.viewport().width(), 4096);
    }

    #[test]
    fn test_zoom_narrows_view() {
        let mut pipeline = pipeline();
        let mut renderer = CountingRenderer::default();

        let command = apply_control(
            &mut pipeline,
            &mut renderer,
            Control::Zoom {
                x: 512.0,
                zoom_in: true,
            },
        );
        assert!(command.is_some());
        assert!(pipeline.viewport().width() < 4096);
    }

    #[test]
    fn test_malformed_event_is_ignored() {
        let pipeline = pipeline();
        let mut directory = SignalDirectory::new();
        handle_event(&mut directory, &pipeline, "not json");
        handle_event(&mut directory, &pipeline, r#"{"signal_list": {"a": [1, 2, 3]}}"#);
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_colour_range_redraws_history() {
        let mut pipeline = pipeline();
        let mut renderer = CountingRenderer::default();
        pipeline.enqueue(crate::waterfall::SpectralFrame {
            bins: vec![10.0; 4],
            l: 0,
            r: 4,
        });
        pipeline.draw_tick(&mut renderer);
        assert_eq!(renderer.rows, 1);

        let range = Control::Range {
            min_db: 0.0,
            max_db: 80.0,
        };
        assert_eq!(apply_control(&mut pipeline, &mut renderer, range), None);
        assert_eq!(renderer.rows, 2);

        let inverted = Control::Range {
            min_db: 80.0,
            max_db: 0.0,
        };
        apply_control(&mut pipeline, &mut renderer, inverted);
        assert_eq!(renderer.rows, 2);
    }

    #[test]
    fn test_width_follows_into_renderer() {
        let mut pipeline = pipeline();
        let mut renderer = CountingRenderer::default();

        assert_eq!(
            apply_control(&mut pipeline, &mut renderer, Control::Width(640.0)),
            None
        );
        assert_eq!(pipeline.canvas_width(), 640.0);
        assert_eq!(renderer.width, Some(640.0));
        assert_eq!(renderer.scales, 1);

        apply_control(&mut pipeline, &mut renderer, Control::Width(-1.0));
        assert_eq!(pipeline.canvas_width(), 640.0);
        assert_eq!(renderer.width, Some(640.0));
    }

    #[test]
    fn test_height_and_alpha_apply_locally() {
        let mut pipeline = pipeline();
        let mut renderer = CountingRenderer::default();

        assert_eq!(
            apply_control(&mut pipeline, &mut renderer, Control::Height(2)),
            None
        );
        assert_eq!(
            apply_control(&mut pipeline, &mut renderer, Control::Alpha(0.2)),
            None
        );
        for i in 0..5 {
            pipeline.enqueue(crate::waterfall::SpectralFrame {
                bins: vec![i as f32; 2],
                l: 0,
                r: 2,
            });
            pipeline.draw_tick(&mut renderer);
        }
        assert_eq!(pipeline.history().count(), 2);
    }

    #[tokio::test]
    async fn test_announce_sends_user_id_on_both_sockets() {
        let (waterfall_url, waterfall_server) = first_text_server().await;
        let (events_url, events_server) = first_text_server().await;

        let mut conn = StreamConnection::connect(&waterfall_url).await.unwrap();
        let mut events = Some(StreamConnection::connect(&events_url).await.unwrap());
        announce(&mut conn, &mut events, "listener-7").await.unwrap();
        assert!(events.is_some());

        let expected = serde_json::json!({"cmd": "userid", "userid": "listener-7"});
        assert_eq!(parse_json(&waterfall_server.await.unwrap()), expected);
        assert_eq!(parse_json(&events_server.await.unwrap()), expected);
    }

    #[tokio::test]
    async fn test_announce_without_events_socket() {
        let (waterfall_url, waterfall_server) = first_text_server().await;

        let mut conn = StreamConnection::connect(&waterfall_url).await.unwrap();
        let mut events = None;
        announce(&mut conn, &mut events, "listener-8").await.unwrap();

        let sent = parse_json(&waterfall_server.await.unwrap());
        assert_eq!(sent["userid"], "listener-8");
    }
}

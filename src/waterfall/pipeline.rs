use crate::protocol::ClientCommand;
use crate::waterfall::decoder::SpectralFrame;
use crate::waterfall::graduation::{self, BandMarker, Graduation};
use crate::waterfall::queue::{BoundedQueue, FrameQueue};
use crate::waterfall::viewport::{FrequencyAxis, Viewport, ViewportError, ViewportMapper};
use serde::Deserialize;

/// Waterfall and spectrum display settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WaterfallConfig {
    pub queue_capacity: usize,
    pub history_rows: usize,
    pub canvas_width: f64,
    pub min_db: f32,
    pub max_db: f32,
    pub spectrum_alpha: f32,
    pub min_zoom_bins: i64,
    pub zoom_step: f64,
}

impl Default for WaterfallConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 2,
            history_rows: 200,
            canvas_width: 1024.0,
            min_db: -30.0,
            max_db: 110.0,
            spectrum_alpha: 0.5,
            min_zoom_bins: 128,
            zoom_step: 0.85,
        }
    }
}

/// Map a dB value onto a 256 entry colour table
pub fn colour_index(value: f32, min_db: f32, max_db: f32) -> u8 {
    let clamped = value.clamp(min_db, max_db);
    let normalised = (clamped - min_db) / (max_db - min_db);
    (normalised * 255.0).floor().clamp(0.0, 255.0) as u8
}

/// A row ready to draw: colour indices stretched over `[px_l, px_r]`
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRow {
    pub colours: Vec<u8>,
    pub px_l: f64,
    pub px_r: f64,
}

/// Drawing backend
pub trait FrameRenderer: Send {
    fn draw_waterfall_row(&mut self, row: &RenderRow);

    fn draw_spectrum(&mut self, line: &[f32], px_l: f64, px_r: f64);

    fn draw_scale(&mut self, _graduation: &Graduation, _bands: &[BandMarker]) {}

    /// The canvas changed width
    fn resize(&mut self, _canvas_width: f64) {}
}

/// Exponential smoothing of the spectrum line, reset when the window moves
#[derive(Debug, Default)]
pub struct SpectrumSmoother {
    window: Option<(i64, i64)>,
    values: Vec<f32>,
}

impl SpectrumSmoother {
    pub fn apply(&mut self, row: &[u8], l: i64, r: i64, alpha: f32) -> &[f32] {
        if self.window != Some((l, r)) || self.values.len() != row.len() {
            self.window = Some((l, r));
            self.values = row.iter().map(|&c| c as f32).collect();
        }
        for (smoothed, &value) in self.values.iter_mut().zip(row) {
            *smoothed = alpha * value as f32 + (1.0 - alpha) * *smoothed;
        }
        &self.values
    }
}

/// Frame queue, viewport and draw tick for one waterfall stream
pub struct DrawPipeline {
    config: WaterfallConfig,
    axis: FrequencyAxis,
    viewport: Viewport,
    queue: FrameQueue<SpectralFrame>,
    history: BoundedQueue<SpectralFrame>,
    smoother: SpectrumSmoother,
    waterfall_enabled: bool,
    spectrum_enabled: bool,
}

impl DrawPipeline {
    pub fn new(config: WaterfallConfig, axis: FrequencyAxis) -> Self {
        Self {
            viewport: Viewport::full(axis.max_bins as u32),
            queue: FrameQueue::new(config.queue_capacity),
            history: BoundedQueue::new(config.history_rows),
            smoother: SpectrumSmoother::default(),
            waterfall_enabled: true,
            spectrum_enabled: true,
            axis,
            config,
        }
    }

    fn draw_enabled(&self) -> bool {
        self.waterfall_enabled || self.spectrum_enabled
    }

    pub fn set_draw_enabled(&mut self, waterfall: bool, spectrum: bool) {
        self.waterfall_enabled = waterfall;
        self.spectrum_enabled = spectrum;
        if !self.draw_enabled() {
            self.queue.clear();
        }
    }

    pub fn enqueue(&mut self, frame: SpectralFrame) {
        let enabled = self.draw_enabled();
        self.queue.enqueue(frame, enabled);
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn mapper(&self) -> ViewportMapper {
        ViewportMapper::new(&self.viewport, self.config.canvas_width, self.axis)
    }

    pub fn history(&self) -> impl DoubleEndedIterator<Item = &SpectralFrame> {
        self.history.iter()
    }

    /// Resize the redraw history to the canvas height
    pub fn set_canvas_height(&mut self, rows: usize) {
        self.history.set_capacity(rows);
    }

    pub fn canvas_width(&self) -> f64 {
        self.config.canvas_width
    }

    /// Returns false and keeps the old width when `width` is not positive
    pub fn set_canvas_width(&mut self, width: f64) -> bool {
        if width <= 0.0 {
            return false;
        }
        self.config.canvas_width = width;
        true
    }

    /// Returns false and keeps the old range unless `min_db < max_db`
    pub fn set_colour_range(&mut self, min_db: f32, max_db: f32) -> bool {
        if min_db >= max_db {
            return false;
        }
        self.config.min_db = min_db;
        self.config.max_db = max_db;
        true
    }

    pub fn set_spectrum_alpha(&mut self, alpha: f32) {
        self.config.spectrum_alpha = alpha.clamp(0.0, 1.0);
    }

    fn render_row(&self, mapper: &ViewportMapper, frame: &SpectralFrame) -> RenderRow {
        let (px_l, px_r) = mapper.row_span(frame.l, frame.r);
        RenderRow {
            colours: frame
                .bins
                .iter()
                .map(|&v| colour_index(v, self.config.min_db, self.config.max_db))
                .collect(),
            px_l,
            px_r,
        }
    }

    /// Fixed-rate draw step; returns whether a frame was drawn
    pub fn draw_tick(&mut self, renderer: &mut dyn FrameRenderer) -> bool {
        let Some(frame) = self.queue.drain_one_for_draw() else {
            return false;
        };

        let mapper = self.mapper();
        let row = self.render_row(&mapper, &frame);
        if self.waterfall_enabled {
            renderer.draw_waterfall_row(&row);
        }
        if self.spectrum_enabled {
            let line = self
                .smoother
                .apply(&row.colours, frame.l, frame.r, self.config.spectrum_alpha);
            renderer.draw_spectrum(line, row.px_l, row.px_r);
        }

        self.history.push(frame);
        true
    }

    /// Re-render the retained rows, oldest first, under the current viewport
    pub fn redraw(&self, renderer: &mut dyn FrameRenderer) {
        let mapper = self.mapper();
        for frame in self.history.iter() {
            renderer.draw_waterfall_row(&self.render_row(&mapper, frame));
        }
    }

    pub fn graduation(&self) -> (Graduation, Vec<BandMarker>) {
        let mapper = self.mapper();
        (graduation::graduation(&mapper), graduation::visible_bands(&mapper))
    }

    pub fn draw_scale(&self, renderer: &mut dyn FrameRenderer) {
        let (graduation, bands) = self.graduation();
        renderer.draw_scale(&graduation, &bands);
    }

    /// Move the viewport and build the command that tells the server
    pub fn set_viewport(&mut self, l: i64, r: i64) -> Result<ClientCommand, ViewportError> {
        self.viewport.set_range(l, r)?;
        Ok(ClientCommand::waterfall_window(
            self.viewport.left(),
            self.viewport.right(),
        ))
    }

    /// Wheel zoom around pixel `x`
    pub fn zoom(&mut self, x: f64, zoom_in: bool) -> Option<ClientCommand> {
        let (l, r) = self.viewport.zoom_range(
            x,
            self.config.canvas_width,
            zoom_in,
            self.config.zoom_step,
            self.config.min_zoom_bins,
        )?;
        self.set_viewport(l, r).ok()
    }

    /// Drag by `dx` pixels; queued frames are discarded first
    pub fn pan(&mut self, dx: f64) -> Option<ClientCommand> {
        self.queue.clear();
        let (l, r) = self.viewport.pan_range(dx, self.config.canvas_width)?;
        self.set_viewport(l, r).ok()
    }
}

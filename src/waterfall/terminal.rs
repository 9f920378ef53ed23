use crate::waterfall::graduation::{BandMarker, Graduation};
use crate::waterfall::pipeline::{FrameRenderer, RenderRow};

const SHADES: &[u8] = b" .:-=+*#%@";

/// Renders rows as coarse ASCII lines through the `trace` log level
pub struct LogRenderer {
    columns: usize,
    canvas_width: f64,
    rows_drawn: u64,
}

impl LogRenderer {
    pub fn new(columns: usize, canvas_width: f64) -> Self {
        Self {
            columns: columns.max(1),
            canvas_width,
            rows_drawn: 0,
        }
    }

    pub fn canvas_width(&self) -> f64 {
        self.canvas_width
    }

    pub fn rows_drawn(&self) -> u64 {
        self.rows_drawn
    }

    /// Resample a row onto the terminal columns
    pub fn ascii_row(&self, row: &RenderRow) -> String {
        let span = row.px_r - row.px_l;
        (0..self.columns)
            .map(|col| {
                let x = (col as f64 + 0.5) / self.columns as f64 * self.canvas_width;
                if span <= 0.0 || row.colours.is_empty() || x < row.px_l || x >= row.px_r {
                    return ' ';
                }
                let idx = ((x - row.px_l) / span * row.colours.len() as f64) as usize;
                let colour = row.colours[idx.min(row.colours.len() - 1)];
                SHADES[colour as usize * (SHADES.len() - 1) / 255] as char
            })
            .collect()
    }
}

impl FrameRenderer for LogRenderer {
    fn draw_waterfall_row(&mut self, row: &RenderRow) {
        self.rows_drawn += 1;
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("|{}|", self.ascii_row(row));
        }
    }

    fn draw_spectrum(&mut self, line: &[f32], _px_l: f64, _px_r: f64) {
        if let Some(peak) = line.iter().copied().reduce(f32::max) {
            log::trace!("Spectrum peak {:.0}/255", peak);
        }
    }

    fn draw_scale(&mut self, graduation: &Graduation, bands: &[BandMarker]) {
        let labels: Vec<&str> = graduation
            .ticks
            .iter()
            .filter_map(|t| t.label.as_deref())
            .collect();
        let names: Vec<&str> = bands.iter().map(|b| b.name).collect();
        log::debug!("Scale: {} | bands: {}", labels.join(" "), names.join(", "));
    }

    fn resize(&mut self, canvas_width: f64) {
        self.canvas_width = canvas_width;
    }
}

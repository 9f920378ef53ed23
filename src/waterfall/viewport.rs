//! Visible bin range and its mapping to pixels and frequencies

use crate::protocol::ServerSettings;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ViewportError {
    #[error("Empty viewport range: {left}..{right}")]
    EmptyRange { left: i64, right: i64 },
}

/// Bin range `[left, right)` over `[0, max_bins)`, always non-empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    left: i64,
    right: i64,
    max_bins: i64,
}

impl Viewport {
    /// The whole spectrum
    pub fn full(max_bins: u32) -> Self {
        let max_bins = (max_bins as i64).max(1);
        Self {
            left: 0,
            right: max_bins,
            max_bins,
        }
    }

    pub fn left(&self) -> i64 {
        self.left
    }

    pub fn right(&self) -> i64 {
        self.right
    }

    pub fn width(&self) -> i64 {
        self.right - self.left
    }

    pub fn max_bins(&self) -> i64 {
        self.max_bins
    }

    /// Move to `[left, right)`
    ///
    /// Empty or inverted ranges are rejected and leave the viewport as it
    /// was. A range hanging off one end is shifted back inside keeping its
    /// width; one hanging off both ends becomes the full range.
    pub fn set_range(&mut self, left: i64, right: i64) -> Result<(), ViewportError> {
        if left >= right {
            return Err(ViewportError::EmptyRange { left, right });
        }

        let width = (right - left).min(self.max_bins);
        let (left, right) = if left < 0 && right > self.max_bins {
            (0, self.max_bins)
        } else if left < 0 {
            (0, width)
        } else if right > self.max_bins {
            (self.max_bins - width, self.max_bins)
        } else {
            (left, right)
        };

        self.left = left;
        self.right = right;
        Ok(())
    }

    /// Range after a wheel step centred on pixel `x`
    ///
    /// Returns `None` when zooming in would go below `min_bins`.
    pub fn zoom_range(
        &self,
        x: f64,
        canvas_width: f64,
        zoom_in: bool,
        step: f64,
        min_bins: i64,
    ) -> Option<(i64, i64)> {
        if zoom_in && self.width() <= min_bins {
            return None;
        }

        let left = self.left as f64;
        let right = self.right as f64;
        let centre = (right - left) * x / canvas_width + left;
        let factor = if zoom_in { step } else { 1.0 / step };
        let width_l = (centre - left) * factor;
        let width_r = (right - centre) * factor;

        Some(((centre - width_l).round() as i64, (centre + width_r).round() as i64))
    }

    /// Range after dragging by `dx` pixels; `None` if the drag is under one bin
    pub fn pan_range(&self, dx: f64, canvas_width: f64) -> Option<(i64, i64)> {
        let shift = (dx / canvas_width * self.width() as f64).round() as i64;
        if shift == 0 {
            return None;
        }
        Some((self.left - shift, self.right - shift))
    }
}

/// Bin index to frequency scale of the server
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyAxis {
    pub basefreq: f64,
    pub total_bandwidth: f64,
    pub max_bins: f64,
}

impl FrequencyAxis {
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            basefreq: settings.basefreq,
            total_bandwidth: settings.total_bandwidth,
            max_bins: settings.fft_result_size as f64,
        }
    }

    pub fn index_to_freq(&self, idx: f64) -> f64 {
        idx / self.max_bins * self.total_bandwidth + self.basefreq
    }

    pub fn freq_to_index(&self, freq: f64) -> f64 {
        (freq - self.basefreq) / self.total_bandwidth * self.max_bins
    }
}

/// Index/pixel transforms for one viewport and canvas width
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportMapper {
    left: f64,
    right: f64,
    canvas_width: f64,
    axis: FrequencyAxis,
}

impl ViewportMapper {
    pub fn new(viewport: &Viewport, canvas_width: f64, axis: FrequencyAxis) -> Self {
        Self {
            left: viewport.left() as f64,
            right: viewport.right() as f64,
            canvas_width,
            axis,
        }
    }

    pub fn canvas_width(&self) -> f64 {
        self.canvas_width
    }

    pub fn axis(&self) -> &FrequencyAxis {
        &self.axis
    }

    pub fn index_to_pixel(&self, idx: f64) -> f64 {
        (idx - self.left) / (self.right - self.left) * self.canvas_width
    }

    pub fn pixel_to_index(&self, x: f64) -> f64 {
        x / self.canvas_width * (self.right - self.left) + self.left
    }

    pub fn pixel_to_freq(&self, x: f64) -> f64 {
        self.axis.index_to_freq(self.pixel_to_index(x))
    }

    pub fn freq_to_pixel(&self, freq: f64) -> f64 {
        self.index_to_pixel(self.axis.freq_to_index(freq))
    }

    /// Frequencies at the left and right canvas edges
    pub fn visible_freqs(&self) -> (f64, f64) {
        (
            self.axis.index_to_freq(self.left),
            self.axis.index_to_freq(self.right),
        )
    }

    /// Horizontal extent of a row captured under bins `[l, r)`
    pub fn row_span(&self, l: i64, r: i64) -> (f64, f64) {
        (self.index_to_pixel(l as f64), self.index_to_pixel(r as f64))
    }
}

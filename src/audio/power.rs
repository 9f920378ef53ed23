//! Received power tracking and playback gating

/// Smoothed received power reported by the server with each packet
#[derive(Debug, Clone, Copy)]
pub struct PowerMeter {
    power: f64,
}

impl Default for PowerMeter {
    fn default() -> Self {
        Self { power: 1.0 }
    }
}

impl PowerMeter {
    /// Fold in the `pwr` of one packet and return the new level in dB
    pub fn update(&mut self, received: f64) -> f64 {
        let smoothed = 0.5 * self.power + 0.5 * received;
        self.power = if smoothed.is_normal() { smoothed } else { 1.0 };
        self.db()
    }

    pub fn power(&self) -> f64 {
        self.power
    }

    pub fn db(&self) -> f64 {
        20.0 * (self.power.sqrt() / 2.0).log10()
    }
}

/// Mute and squelch state
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioGate {
    pub mute: bool,
    pub squelch: bool,
    pub squelch_threshold_db: f64,
    squelched: bool,
}

impl AudioGate {
    pub fn new(mute: bool, squelch: bool, squelch_threshold_db: f64) -> Self {
        Self {
            mute,
            squelch,
            squelch_threshold_db,
            squelched: false,
        }
    }

    /// Re-evaluate squelch for the latest power reading
    pub fn observe_power(&mut self, power_db: f64) {
        self.squelched = self.squelch && power_db < self.squelch_threshold_db;
    }

    /// Whether decoded audio should reach the output and the FT8 window
    pub fn is_open(&self) -> bool {
        !(self.mute || self.squelch && self.squelched)
    }
}

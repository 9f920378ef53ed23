//! Wall-clock aligned sample accumulation
//!
//! A window opens on each period boundary and closes `headroom` seconds
//! before the next one, leaving time for the block decoder. Boundaries are
//! aligned to Unix time, which matches the minute-aligned FT8 slots since the
//! period divides 60.

use jiff::Timestamp;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WindowTiming {
    pub period_secs: u64,
    pub headroom_secs: u64,
}

impl Default for WindowTiming {
    fn default() -> Self {
        Self {
            period_secs: 15,
            headroom_secs: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Idle,
    Collecting,
}

/// Next state change the driver should apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEdge {
    Open,
    Close,
}

/// Outcome of a polling tick
#[derive(Debug, PartialEq)]
pub enum Transition {
    Opened,
    Closed(Vec<f32>),
}

#[derive(Debug)]
pub struct CollectionWindow {
    timing: WindowTiming,
    state: WindowState,
    buffer: Vec<f32>,
}

impl CollectionWindow {
    pub fn new(timing: WindowTiming) -> Self {
        Self {
            timing,
            state: WindowState::Idle,
            buffer: Vec::new(),
        }
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn is_collecting(&self) -> bool {
        self.state == WindowState::Collecting
    }

    /// Samples gathered so far in the open window
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn open(&mut self) {
        self.state = WindowState::Collecting;
        self.buffer.clear();
    }

    /// Close the window and hand off the block; `None` when already idle
    pub fn close(&mut self) -> Option<Vec<f32>> {
        if !self.is_collecting() {
            return None;
        }
        self.state = WindowState::Idle;
        Some(std::mem::take(&mut self.buffer))
    }

    /// Append decoded samples; ignored while idle
    pub fn push_samples(&mut self, samples: &[f32]) {
        if self.is_collecting() {
            self.buffer.extend_from_slice(samples);
        }
    }

    /// Once-per-second polling step
    ///
    /// `second` is any wall-clock seconds counter aligned to the period.
    pub fn tick(&mut self, second: u64) -> Option<Transition> {
        let countdown = self.timing.period_secs - second % self.timing.period_secs;
        match self.state {
            WindowState::Idle if countdown == self.timing.period_secs => {
                self.open();
                Some(Transition::Opened)
            }
            WindowState::Collecting if countdown == self.timing.headroom_secs => {
                self.close().map(Transition::Closed)
            }
            _ => None,
        }
    }

    /// Time until the next edge from `now`, and which edge it is
    ///
    /// Idle windows wait for the next boundary (zero delay when `now` sits
    /// exactly on one). A collecting window past its close point closes
    /// immediately.
    pub fn next_edge(&self, now: Timestamp) -> (Duration, WindowEdge) {
        let period = (self.timing.period_secs * 1000) as i64;
        let headroom = (self.timing.headroom_secs * 1000) as i64;
        let now_ms = now.as_millisecond();
        let into_period = now_ms.rem_euclid(period);

        let (wait, edge) = match self.state {
            WindowState::Idle if into_period == 0 => (0, WindowEdge::Open),
            WindowState::Idle => (period - into_period, WindowEdge::Open),
            WindowState::Collecting => (
                (period - headroom - into_period).max(0),
                WindowEdge::Close,
            ),
        };
        (Duration::from_millis(wait as u64), edge)
    }
}

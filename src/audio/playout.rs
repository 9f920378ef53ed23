//! Adaptive playout delay estimation
//!
//! Tracks the inter-arrival delay of audio chunks and derives how much audio
//! should be kept queued ahead of the output clock. The estimator is a
//! two-mode hybrid: an exponential average while arrivals are steady, and
//! absolute jump tracking while a sudden delay shift settles.

use serde::Deserialize;
use std::time::Instant;

/// Tuning constants for the delay estimator
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlayoutTuning {
    /// Starting value for the smoothed delay and the delay history (ms)
    pub initial_delay_ms: f64,
    /// Starting value for the smoothed deviation (ms)
    pub initial_deviation_ms: f64,
    /// Fixed slack added to twice the deviation before a jump counts as a spike (ms)
    pub spike_threshold_ms: f64,
    /// Spike variance at or below which the shift is considered settled
    pub settle_threshold: f64,
    /// Deviations of margin kept on top of the smoothed delay
    pub deviation_multiplier: f64,
}

impl Default for PlayoutTuning {
    fn default() -> Self {
        Self {
            initial_delay_ms: 10.0,
            initial_deviation_ms: 10.0,
            spike_threshold_ms: 800.0,
            settle_threshold: 63.0,
            deviation_multiplier: 4.0,
        }
    }
}

/// Estimator mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayMode {
    Steady,
    Transitioning,
}

/// Jitter/delay state, updated once per received chunk
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayModel {
    pub mode: DelayMode,
    pub smoothed_delay: f64,
    pub smoothed_deviation: f64,
    pub prev_delay1: f64,
    pub prev_delay2: f64,
    /// Accumulated second-difference energy while transitioning
    pub spike_variance: f64,
}

impl DelayModel {
    pub fn new(tuning: &PlayoutTuning) -> Self {
        Self {
            mode: DelayMode::Steady,
            smoothed_delay: tuning.initial_delay_ms,
            smoothed_deviation: tuning.initial_deviation_ms,
            prev_delay1: tuning.initial_delay_ms,
            prev_delay2: tuning.initial_delay_ms,
            spike_variance: tuning.initial_deviation_ms,
        }
    }

    /// Fold one inter-arrival delay into the model and return the new state
    ///
    /// Non-finite or negative delays leave the model untouched.
    pub fn observe(&self, delay: f64, tuning: &PlayoutTuning) -> Self {
        if !delay.is_finite() || delay < 0.0 {
            return *self;
        }

        let mut next = *self;
        let mut update = true;

        match next.mode {
            DelayMode::Steady => {
                let spike = 2.0 * next.smoothed_deviation.abs() + tuning.spike_threshold_ms;
                if (delay - next.prev_delay1).abs() > spike {
                    next.spike_variance = 0.0;
                    next.mode = DelayMode::Transitioning;
                }
            }
            DelayMode::Transitioning => {
                next.spike_variance = next.spike_variance / 2.0
                    + ((2.0 * delay - next.prev_delay1 - next.prev_delay2) / 8.0).abs();
                if next.spike_variance <= tuning.settle_threshold {
                    next.mode = DelayMode::Steady;
                    // Reconvergence sample, not a steady-state one
                    update = false;
                }
            }
        }

        if update {
            next.smoothed_delay = match next.mode {
                DelayMode::Steady => 0.125 * delay + 0.875 * next.smoothed_delay,
                DelayMode::Transitioning => next.smoothed_delay + delay - next.prev_delay1,
            };
            next.smoothed_deviation =
                0.125 * (delay - next.smoothed_delay).abs() + 0.875 * next.smoothed_deviation;
        }

        next.prev_delay2 = next.prev_delay1;
        next.prev_delay1 = delay;
        next
    }

    /// Playout margin in milliseconds
    pub fn target_buffer_ms(&self, tuning: &PlayoutTuning) -> f64 {
        self.smoothed_delay + tuning.deviation_multiplier * self.smoothed_deviation
    }
}

/// Converts chunk arrivals into a target playout margin
#[derive(Debug)]
pub struct PlayoutClock {
    model: DelayModel,
    tuning: PlayoutTuning,
    last_arrival: Option<Instant>,
}

impl PlayoutClock {
    pub fn new(tuning: PlayoutTuning) -> Self {
        Self {
            model: DelayModel::new(&tuning),
            tuning,
            last_arrival: None,
        }
    }

    /// Record a chunk arrival and return the target buffer in milliseconds
    ///
    /// The first arrival only establishes the baseline.
    pub fn on_arrival(&mut self, now: Instant) -> f64 {
        match self.last_arrival.replace(now) {
            None => self.target_buffer_ms(),
            Some(previous) => {
                let delay_ms = now.saturating_duration_since(previous).as_secs_f64() * 1000.0;
                self.observe(delay_ms)
            }
        }
    }

    /// Fold an inter-arrival delay (ms) into the model
    pub fn observe(&mut self, delay_ms: f64) -> f64 {
        self.model = self.model.observe(delay_ms, &self.tuning);
        self.target_buffer_ms()
    }

    pub fn target_buffer_ms(&self) -> f64 {
        self.model.target_buffer_ms(&self.tuning)
    }

    pub fn model(&self) -> &DelayModel {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn feed(clock: &mut PlayoutClock, delays: impl IntoIterator<Item = f64>) {
        for delay in delays {
            clock.observe(delay);
        }
    }

    #[test]
    fn test_converges_on_constant_delay() {
        let mut clock = PlayoutClock::new(PlayoutTuning::default());
        feed(&mut clock, std::iter::repeat_n(100.0, 60));

        let model = clock.model();
        assert_eq!(model.mode, DelayMode::Steady);
        assert!((model.smoothed_delay - 100.0).abs() < 1.0, "{}", model.smoothed_delay);
        assert!(model.smoothed_deviation < 1.0, "{}", model.smoothed_deviation);

        feed(&mut clock, std::iter::repeat_n(100.0, 100));
        assert!(clock.model().smoothed_deviation < 0.01);
    }

    #[test]
    fn test_spike_enters_transitioning() {
        let mut clock = PlayoutClock::new(PlayoutTuning::default());
        feed(&mut clock, [100.0, 98.0, 103.0, 101.0, 99.0, 100.0, 102.0, 100.0]);
        assert_eq!(clock.model().mode, DelayMode::Steady);

        clock.observe(2000.0);
        let model = clock.model();
        assert_eq!(model.mode, DelayMode::Transitioning);
        assert_eq!(model.prev_delay1, 2000.0);
        // Jump tracking moves the estimate by the full step
        assert!(model.smoothed_delay > 1000.0);
    }

    #[test]
    fn test_settling_returns_to_steady_without_update() {
        let tuning = PlayoutTuning::default();
        let mut model = DelayModel::new(&tuning);
        for _ in 0..10 {
            model = model.observe(100.0, &tuning);
        }
        model = model.observe(2000.0, &tuning);
        assert_eq!(model.mode, DelayMode::Transitioning);

        // Keep feeding the same delay until the second difference decays
        let mut settled = None;
        for _ in 0..20 {
            let before = model;
            model = model.observe(100.0, &tuning);
            if model.mode == DelayMode::Steady {
                settled = Some((before, model));
                break;
            }
        }
        let (before, after) = settled.expect("model never settled");
        assert_eq!(after.smoothed_delay, before.smoothed_delay);
        assert_eq!(after.smoothed_deviation, before.smoothed_deviation);
        assert_eq!(after.prev_delay1, 100.0);
    }

    #[test]
    fn test_target_never_below_smoothed_delay() {
        let tuning = PlayoutTuning::default();
        let mut model = DelayModel::new(&tuning);
        let delays = [5.0, 300.0, 12.0, 2500.0, 0.0, 40.0, 41.0, 39.0, 1000.0, 7.0];
        for delay in delays.iter().cycle().take(200) {
            model = model.observe(*delay, &tuning);
            assert!(model.target_buffer_ms(&tuning) >= model.smoothed_delay);
        }
    }

    #[test]
    fn test_non_finite_delay_ignored() {
        let tuning = PlayoutTuning::default();
        let model = DelayModel::new(&tuning);
        assert_eq!(model.observe(f64::NAN, &tuning), model);
        assert_eq!(model.observe(f64::INFINITY, &tuning), model);
        assert_eq!(model.observe(-5.0, &tuning), model);
    }

    #[test]
    fn test_first_arrival_returns_default_target() {
        let mut clock = PlayoutClock::new(PlayoutTuning::default());
        let initial = *clock.model();
        let start = Instant::now();

        let target = clock.on_arrival(start);
        assert_eq!(target, 50.0);
        assert_eq!(*clock.model(), initial);

        clock.on_arrival(start + Duration::from_millis(20));
        assert!((clock.model().prev_delay1 - 20.0).abs() < 1e-9);
    }
}

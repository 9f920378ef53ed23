//! Playback scheduling against the output clock
//!
//! Chunks are laid end to end on the output timeline. After each chunk the
//! remaining margin is checked; when it collapses below one chunk (underrun)
//! or grows past the overrun limit, the cursor is pulled back to
//! `now + target` from the playout clock.

use serde::Deserialize;

/// Where scheduled audio ends up
pub trait OutputSink {
    /// Current position of the output clock in seconds
    fn now(&self) -> f64;

    /// Queue `samples` to start playing at `start` (output clock seconds)
    fn play_at(&mut self, samples: &[f32], start: f64);
}

/// Scheduler thresholds
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Lead given to the first chunk after the output opens (seconds)
    pub initial_lead_secs: f64,
    /// Margin above which buffered audio counts as an overrun (seconds)
    pub overrun_secs: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_lead_secs: 0.1,
            overrun_secs: 2.0,
        }
    }
}

/// Resynchronisation reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayoutEvent {
    Underrun,
    Overrun,
}

/// Result of scheduling one chunk
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scheduled {
    /// Duration of the chunk in seconds
    pub duration: f64,
    /// Start time the chunk was queued at
    pub start: f64,
    pub correction: Option<PlayoutEvent>,
}

/// Owns the "next play time" cursor
#[derive(Debug)]
pub struct AudioScheduler {
    sample_rate: u32,
    next_play_time: f64,
    config: SchedulerConfig,
    underruns: u64,
    overruns: u64,
    last_event: Option<PlayoutEvent>,
}

impl AudioScheduler {
    /// Create a scheduler whose cursor starts slightly ahead of `now`
    pub fn new(sample_rate: u32, now: f64, config: SchedulerConfig) -> Self {
        Self {
            sample_rate,
            next_play_time: now + config.initial_lead_secs,
            config,
            underruns: 0,
            overruns: 0,
            last_event: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn next_play_time(&self) -> f64 {
        self.next_play_time
    }

    pub fn underruns(&self) -> u64 {
        self.underruns
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    pub fn last_event(&self) -> Option<PlayoutEvent> {
        self.last_event
    }

    /// Seconds of audio currently queued ahead of `now`
    pub fn margin(&self, now: f64) -> f64 {
        self.next_play_time - now
    }

    /// Hand a chunk to the sink at the cursor and reconcile the margin
    ///
    /// `now` is the output clock at the time of the call and
    /// `target_buffer_ms` the current playout target.
    pub fn schedule(
        &mut self,
        chunk: &[f32],
        sink: &mut dyn OutputSink,
        now: f64,
        target_buffer_ms: f64,
    ) -> Scheduled {
        let duration = chunk.len() as f64 / self.sample_rate as f64;
        let start = self.next_play_time;

        sink.play_at(chunk, start);
        self.next_play_time += duration;

        let margin = self.margin(now);
        let correction = if margin <= duration {
            Some(PlayoutEvent::Underrun)
        } else if margin > self.config.overrun_secs {
            Some(PlayoutEvent::Overrun)
        } else {
            None
        };

        if let Some(event) = correction {
            self.next_play_time = now + target_buffer_ms / 1000.0;
            self.last_event = Some(event);
            match event {
                PlayoutEvent::Underrun => self.underruns += 1,
                PlayoutEvent::Overrun => self.overruns += 1,
            }
            log::debug!(
                "{:?}: margin {:.3}s, resync to {:.1}ms ahead",
                event,
                margin,
                target_buffer_ms
            );
        }

        Scheduled {
            duration,
            start,
            correction,
        }
    }
}

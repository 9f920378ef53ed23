//! Other listeners on the server and stream statistics

use crate::protocol::EventUpdate;
use crate::waterfall::{Viewport, ViewportMapper};
use std::collections::HashMap;
use std::time::Instant;

/// Tuned ranges of every listener, keyed by user id
#[derive(Debug, Default)]
pub struct SignalDirectory {
    signals: HashMap<String, Vec<f64>>,
    last_modified: Option<Instant>,
    stats: ServerStats,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ServerStats {
    pub signal_clients: Option<u32>,
    pub waterfall_clients: Option<u32>,
    pub waterfall_kbits: Option<f64>,
    pub audio_kbits: Option<f64>,
}

/// Marker for another listener whose centre falls inside the view
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerMarker {
    pub id: String,
    pub x: f64,
}

fn is_removal(range: &[f64]) -> bool {
    range.len() == 2 && range[0] == -1.0 && range[1] == -1.0
}

impl SignalDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event message; returns whether the listener set changed
    pub fn apply(&mut self, update: EventUpdate, now: Instant) -> bool {
        let mut changed = false;

        if let Some(list) = update.signal_list {
            self.signals = list;
            changed = true;
        }
        if let Some(changes) = update.signal_changes {
            for (user, range) in changes {
                if is_removal(&range) {
                    self.signals.remove(&user);
                } else {
                    self.signals.insert(user, range);
                }
            }
            changed = true;
        }

        let stats = &mut self.stats;
        stats.signal_clients = update.signal_clients.or(stats.signal_clients);
        stats.waterfall_clients = update.waterfall_clients.or(stats.waterfall_clients);
        stats.waterfall_kbits = update.waterfall_kbits.or(stats.waterfall_kbits);
        stats.audio_kbits = update.audio_kbits.or(stats.audio_kbits);

        if changed {
            self.last_modified = Some(now);
        }
        changed
    }

    /// Copy of the current listener map
    pub fn snapshot(&self) -> HashMap<String, Vec<f64>> {
        self.signals.clone()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn last_modified(&self) -> Option<Instant> {
        self.last_modified
    }

    pub fn stats(&self) -> ServerStats {
        self.stats
    }

    /// Listeners tuned inside `viewport`, positioned on the canvas
    pub fn markers(&self, viewport: &Viewport, mapper: &ViewportMapper) -> Vec<ListenerMarker> {
        let mut markers: Vec<ListenerMarker> = self
            .signals
            .iter()
            .filter_map(|(id, range)| {
                let centre = *range.get(1)?;
                let inside =
                    centre >= viewport.left() as f64 && centre < viewport.right() as f64;
                inside.then(|| ListenerMarker {
                    id: id.clone(),
                    x: mapper.index_to_pixel(centre),
                })
            })
            .collect();
        markers.sort_by(|a, b| a.x.total_cmp(&b.x));
        markers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waterfall::FrequencyAxis;

    fn update(json: &str) -> EventUpdate {
        EventUpdate::from_json(json).unwrap()
    }

    #[test]
    fn test_list_replaces_and_changes_patch() {
        let mut directory = SignalDirectory::new();
        let now = Instant::now();
        assert!(directory.apply(
            update(r#"{"signal_list": {"a1": [10, 20, 30], "b2": [40, 50, 60]}}"#),
            now
        ));
        assert_eq!(directory.len(), 2);

        directory.apply(
            update(r#"{"signal_changes": {"a1": [-1, -1], "c3": [1, 2, 3]}}"#),
            now,
        );
        let snapshot = directory.snapshot();
        assert!(!snapshot.contains_key("a1"));
        assert_eq!(snapshot["c3"], vec![1.0, 2.0, 3.0]);
        assert_eq!(directory.last_modified(), Some(now));
    }

    #[test]
    fn test_counters_do_not_touch_listeners() {
        let mut directory = SignalDirectory::new();
        let counters = update(r#"{"audio_kbits": 12.5, "signal_clients": 3}"#);
        let changed = directory.apply(counters, Instant::now());
        assert!(!changed);
        assert_eq!(directory.last_modified(), None);
        assert_eq!(directory.stats().audio_kbits, Some(12.5));

        directory.apply(update(r#"{"waterfall_kbits": 80}"#), Instant::now());
        assert_eq!(directory.stats().signal_clients, Some(3));
        assert_eq!(directory.stats().waterfall_kbits, Some(80.0));
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut directory = SignalDirectory::new();
        directory.apply(update(r#"{"signal_list": {"a1": [1, 2, 3]}}"#), Instant::now());
        let mut snapshot = directory.snapshot();
        snapshot.clear();
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_markers_inside_view() {
        let mut directory = SignalDirectory::new();
        directory.apply(
            update(r#"{"signal_list": {"in": [90, 150, 160], "out": [0, 10, 20], "short": [5]}}"#),
            Instant::now(),
        );

        let mut viewport = Viewport::full(1000);
        viewport.set_range(100, 300).unwrap();
        let axis = FrequencyAxis {
            basefreq: 0.0,
            total_bandwidth: 1.0,
            max_bins: 1000.0,
        };
        let mapper = ViewportMapper::new(&viewport, 200.0, axis);

        assert_eq!(
            directory.markers(&viewport, &mapper),
            vec![ListenerMarker {
                id: "in".to_string(),
                x: 50.0
            }]
        );
    }
}

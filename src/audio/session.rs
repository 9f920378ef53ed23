use crate::audio::decoder::{AudioDecoder, create_decoder};
use crate::audio::playout::{PlayoutClock, PlayoutTuning};
use crate::audio::power::{AudioGate, PowerMeter};
use crate::audio::scheduler::{AudioScheduler, OutputSink, Scheduled, SchedulerConfig};
use crate::ft8::CollectionWindow;
use crate::protocol::{AudioPacket, ClientCommand, ProtocolError, ServerSettings};
use std::time::Instant;

/// What happened to one audio packet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketOutcome {
    pub power_db: f64,
    pub samples: usize,
    /// Set when the decoder produced samples and the gate was open
    pub scheduled: Option<Scheduled>,
}

/// Per-connection audio state: decode, jitter model, gating and scheduling
///
/// Owned by a single task; nothing here is shared.
pub struct AudioSession {
    decoder: Box<dyn AudioDecoder>,
    clock: PlayoutClock,
    scheduler: AudioScheduler,
    power: PowerMeter,
    gate: AudioGate,
    band: (f64, f64, f64),
    demodulation: String,
    collection: Option<CollectionWindow>,
}

impl AudioSession {
    pub fn new(
        settings: &ServerSettings,
        scheduler: SchedulerConfig,
        tuning: PlayoutTuning,
        gate: AudioGate,
        now: f64,
    ) -> Result<Self, ProtocolError> {
        let decoder = create_decoder(&settings.audio_compression)?;
        Ok(Self::with_decoder(decoder, settings, scheduler, tuning, gate, now))
    }

    pub fn with_decoder(
        decoder: Box<dyn AudioDecoder>,
        settings: &ServerSettings,
        scheduler: SchedulerConfig,
        tuning: PlayoutTuning,
        gate: AudioGate,
        now: f64,
    ) -> Self {
        let defaults = settings.defaults;
        Self {
            decoder,
            clock: PlayoutClock::new(tuning),
            scheduler: AudioScheduler::new(settings.audio_output_sps(), now, scheduler),
            power: PowerMeter::default(),
            gate,
            band: (defaults.l, defaults.m, defaults.r),
            demodulation: String::new(),
            collection: None,
        }
    }

    /// Start accumulating gated audio for block decoding
    pub fn attach_collection(&mut self, window: CollectionWindow) {
        self.collection = Some(window);
    }

    pub fn collection_mut(&mut self) -> Option<&mut CollectionWindow> {
        self.collection.as_mut()
    }

    pub fn sample_rate(&self) -> u32 {
        self.scheduler.sample_rate()
    }

    pub fn scheduler(&self) -> &AudioScheduler {
        &self.scheduler
    }

    pub fn clock(&self) -> &PlayoutClock {
        &self.clock
    }

    pub fn power_db(&self) -> f64 {
        self.power.db()
    }

    /// Handle one binary frame from the audio socket
    pub fn handle_packet(
        &mut self,
        bytes: &[u8],
        arrival: Instant,
        sink: &mut dyn OutputSink,
    ) -> Result<PacketOutcome, ProtocolError> {
        let packet = AudioPacket::decode(bytes)?;
        let power_db = self.power.update(packet.pwr);
        self.gate.observe_power(power_db);

        let pcm = self.decoder.decode(&packet.data);
        let mut outcome = PacketOutcome {
            power_db,
            samples: pcm.len(),
            scheduled: None,
        };
        // Decoder wants more input
        if pcm.is_empty() {
            return Ok(outcome);
        }

        let target_buffer_ms = self.clock.on_arrival(arrival);
        if !self.gate.is_open() {
            return Ok(outcome);
        }

        if let Some(window) = self.collection.as_mut() {
            window.push_samples(&pcm);
        }
        let now = sink.now();
        outcome.scheduled = Some(self.scheduler.schedule(&pcm, sink, now, target_buffer_ms));
        Ok(outcome)
    }

    /// Select the audio passband; `l` is floored and `r` ceiled on the wire
    pub fn set_audio_range(&mut self, l: f64, m: f64, r: f64) -> ClientCommand {
        self.band = (l, m, r);
        ClientCommand::audio_window(l.floor() as i64, m, r.ceil() as i64)
    }

    /// Unrounded passband as last requested
    pub fn audio_range(&self) -> (f64, f64, f64) {
        self.band
    }

    pub fn set_demodulation(&mut self, demodulation: &str) -> ClientCommand {
        self.demodulation = demodulation.to_string();
        ClientCommand::demodulation(demodulation)
    }

    pub fn demodulation(&self) -> &str {
        &self.demodulation
    }

    pub fn set_options(&mut self, options: serde_json::Value) -> ClientCommand {
        ClientCommand::Options { options }
    }

    /// Returns a command only when the state actually changes
    pub fn set_mute(&mut self, mute: bool) -> Option<ClientCommand> {
        if self.gate.mute == mute {
            return None;
        }
        self.gate.mute = mute;
        Some(ClientCommand::Mute { mute })
    }

    pub fn is_muted(&self) -> bool {
        self.gate.mute
    }

    pub fn set_squelch(&mut self, squelch: bool, threshold_db: f64) {
        self.gate.squelch = squelch;
        self.gate.squelch_threshold_db = threshold_db;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::scheduler::PlayoutEvent;
    use crate::ft8::WindowTiming;
    use std::time::Duration;

    /// Passes the payload through as one sample per byte
    struct ByteDecoder;

    impl AudioDecoder for ByteDecoder {
        fn decode(&mut self, encoded: &[u8]) -> Vec<f32> {
            encoded.iter().map(|&b| b as f32).collect()
        }
    }

    #[derive(Default)]
    struct FakeSink {
        now: f64,
        played: Vec<(Vec<f32>, f64)>,
    }

    impl OutputSink for FakeSink {
        fn now(&self) -> f64 {
            self.now
        }

        fn play_at(&mut self, samples: &[f32], start: f64) {
            self.played.push((samples.to_vec(), start));
        }
    }

    fn settings() -> ServerSettings {
        ServerSettings::from_json(
            r#"{
                "fft_size": 8192, "fft_result_size": 4096, "basefreq": 0,
                "total_bandwidth": 30000000, "sps": 60000000,
                "audio_max_sps": 100, "audio_compression": "none",
                "waterfall_compression": "none",
                "defaults": {"l": 10.5, "m": 12.0, "r": 14.2}
            }"#,
        )
        .unwrap()
    }

    fn session(gate: AudioGate) -> AudioSession {
        AudioSession::with_decoder(
            Box::new(ByteDecoder),
            &settings(),
            SchedulerConfig::default(),
            PlayoutTuning::default(),
            gate,
            0.0,
        )
    }

    fn packet(pwr: f64, data: &[u8]) -> Vec<u8> {
        AudioPacket {
            pwr,
            data: data.to_vec(),
        }
        .encode()
        .unwrap()
    }

    #[test]
    fn test_packet_scheduled_at_cursor() {
        let mut session = session(AudioGate::default());
        let mut sink = FakeSink::default();
        let outcome = session
            .handle_packet(&packet(4.0, &[1, 2, 3, 4, 5]), Instant::now(), &mut sink)
            .unwrap();

        assert_eq!(outcome.samples, 5);
        assert_eq!(sink.played, vec![(vec![1.0, 2.0, 3.0, 4.0, 5.0], 0.1)]);
        let scheduled = outcome.scheduled.unwrap();
        assert!((scheduled.duration - 0.05).abs() < 1e-12);
        assert_eq!(scheduled.correction, None);
    }

    #[test]
    fn test_empty_decode_is_not_an_arrival() {
        let mut session = session(AudioGate::default());
        let mut sink = FakeSink::default();
        let start = Instant::now();

        session.handle_packet(&packet(1.0, &[]), start, &mut sink).unwrap();
        session
            .handle_packet(&packet(1.0, &[1]), start + Duration::from_millis(40), &mut sink)
            .unwrap();
        // First real arrival only sets the baseline
        assert_eq!(session.clock().model().prev_delay1, 10.0);
        assert_eq!(sink.played.len(), 1);
    }

    #[test]
    fn test_muted_audio_feeds_jitter_model_only() {
        let mut session = session(AudioGate::new(true, false, 0.0));
        let mut window = CollectionWindow::new(WindowTiming::default());
        window.open();
        session.attach_collection(window);

        let mut sink = FakeSink::default();
        let start = Instant::now();
        session.handle_packet(&packet(1.0, &[1, 2]), start, &mut sink).unwrap();
        let outcome = session
            .handle_packet(&packet(1.0, &[3]), start + Duration::from_millis(25), &mut sink)
            .unwrap();

        assert_eq!(outcome.scheduled, None);
        assert!(sink.played.is_empty());
        assert_eq!(session.collection_mut().unwrap().len(), 0);
        assert!((session.clock().model().prev_delay1 - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_squelch_follows_power() {
        let mut session = session(AudioGate::new(false, true, 0.0));
        let mut window = CollectionWindow::new(WindowTiming::default());
        window.open();
        session.attach_collection(window);
        let mut sink = FakeSink::default();

        // Smoothed power 0.5 -> about -9 dB: squelched
        let quiet = session
            .handle_packet(&packet(0.0, &[1]), Instant::now(), &mut sink)
            .unwrap();
        assert!(quiet.power_db < 0.0);
        assert!(quiet.scheduled.is_none());

        // Smoothed power 50.25 -> above 0 dB: open
        let loud = session
            .handle_packet(&packet(100.0, &[1, 2]), Instant::now(), &mut sink)
            .unwrap();
        assert!(loud.scheduled.is_some());
        assert_eq!(session.collection_mut().unwrap().len(), 2);
    }

    #[test]
    fn test_late_packet_resyncs() {
        let mut session = session(AudioGate::default());
        let mut sink = FakeSink {
            now: 10.0,
            ..FakeSink::default()
        };
        let outcome = session
            .handle_packet(&packet(1.0, &[1; 10]), Instant::now(), &mut sink)
            .unwrap();

        assert_eq!(outcome.scheduled.unwrap().correction, Some(PlayoutEvent::Underrun));
        assert_eq!(session.scheduler().underruns(), 1);
        assert!((session.scheduler().next_play_time() - 10.05).abs() < 1e-9);
    }

    #[test]
    fn test_audio_range_rounding() {
        let mut session = session(AudioGate::default());
        assert_eq!(session.audio_range(), (10.5, 12.0, 14.2));

        let command = session.set_audio_range(100.7, 101.5, 102.2);
        assert_eq!(command, ClientCommand::audio_window(100, 101.5, 103));
        assert_eq!(session.audio_range(), (100.7, 101.5, 102.2));
    }

    #[test]
    fn test_set_mute_only_on_change() {
        let mut session = session(AudioGate::default());
        assert_eq!(session.set_mute(false), None);
        assert_eq!(session.set_mute(true), Some(ClientCommand::Mute { mute: true }));
        assert_eq!(session.set_mute(true), None);
        assert!(session.is_muted());
    }

    #[test]
    fn test_invalid_packet_is_an_error() {
        let mut session = session(AudioGate::default());
        let mut sink = FakeSink::default();
        assert!(session.handle_packet(&[0xff, 0x00], Instant::now(), &mut sink).is_err());
    }
}

//! Process-lifetime session counters.
//!
//! Plain atomics behind an `Arc`; no exporter. The round-trip observation
//! (end of user utterance to first audible TTS sample) is recorded exactly
//! once per turn by the `on_first_speak` callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Metrics {
    pub wake_triggers: AtomicU64,
    pub sessions_started: AtomicU64,
    pub sessions_ended: AtomicU64,
    pub interactions: AtomicU64,
    pub tts_speak_calls: AtomicU64,
    pub unknown_answer: AtomicU64,
    pub errors_total: AtomicU64,
    round_trip: Mutex<RoundTrip>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RoundTrip {
    pub count: u64,
    pub total_secs: f64,
    pub last_secs: f64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe_round_trip(&self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        let mut rt = self.round_trip.lock().unwrap();
        rt.count += 1;
        rt.total_secs += secs;
        rt.last_secs = secs;
    }

    pub fn round_trip(&self) -> RoundTrip {
        *self.round_trip.lock().unwrap()
    }
}

/// Relaxed is fine everywhere: counters are monotonic and readers only
/// need eventual values.
pub fn inc(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn get(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

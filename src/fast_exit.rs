//! Fast-exit arbiter: a cross-thread pending flag that short-circuits the
//! current turn.
//!
//! Set by stop phrases in partial/final transcripts or by the stop hotword
//! in `exit` mode; checked at every producer/consumer boundary (shaped
//! token tee, TTS wait loop, next-capture scheduling). Once set it stays
//! set until the orchestrator resets it on entering a new session.
//!
//! The anti-echo guard keeps the bot from hearing its own playback as a
//! stop command: a transcript that fuzzy-matches the last bot reply at 85+
//! (both sides longer than 8 after normalization) is discarded.

use std::sync::Mutex;
use std::time::Instant;

use tracing::{debug, info};

use crate::text::{normalize_text, partial_ratio};

/// Similarity at which a transcript is treated as TTS echo.
const ECHO_SIMILARITY: u32 = 85;

/// Both sides must exceed this many normalized chars for the echo guard
/// to apply.
const ECHO_MIN_LEN: usize = 8;

#[derive(Debug, Default)]
struct Inner {
    pending: bool,
    reason: String,
    armed_at_ms: u64,
    last_bot_reply: String,
}

/// Orchestrator-scoped arbiter. All readers tolerate a frame of staleness;
/// the mutex only orders writes.
pub struct FastExit {
    inner: Mutex<Inner>,
    stop_phrases: Vec<String>,
    epoch: Instant,
}

impl FastExit {
    pub fn new(stop_phrases: &[String]) -> Self {
        let stop_phrases = stop_phrases
            .iter()
            .map(|p| normalize_text(p))
            .filter(|p| !p.is_empty())
            .collect();
        Self {
            inner: Mutex::new(Inner::default()),
            stop_phrases,
            epoch: Instant::now(),
        }
    }

    pub fn pending(&self) -> bool {
        self.inner.lock().unwrap().pending
    }

    pub fn reason(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner.pending.then(|| inner.reason.clone())
    }

    /// Monotonic milliseconds (since arbiter creation) at which the flag
    /// was armed.
    pub fn armed_at_ms(&self) -> Option<u64> {
        let inner = self.inner.lock().unwrap();
        inner.pending.then_some(inner.armed_at_ms)
    }

    /// Arm the flag. Safe from any thread; later triggers keep the first
    /// reason.
    pub fn trigger(&self, reason: &str) {
        let mut inner = self.inner.lock().unwrap();
        if inner.pending {
            return;
        }
        inner.pending = true;
        inner.reason = reason.to_string();
        inner.armed_at_ms = self.epoch.elapsed().as_millis() as u64;
        info!(reason, "Fast-exit armed");
    }

    /// Clear for a new session. Idempotent.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.pending = false;
        inner.reason.clear();
        inner.armed_at_ms = 0;
    }

    /// Record the reply the bot just spoke, for the echo guard.
    pub fn set_last_reply(&self, reply: &str) {
        self.inner.lock().unwrap().last_bot_reply = normalize_text(reply);
    }

    /// Streaming partial transcript hook. Returns `true` when it armed
    /// fast-exit (the event is consumed).
    pub fn on_partial(&self, text: &str) -> bool {
        self.handle_transcript(text, "stop-phrase-partial")
    }

    /// Final transcript hook.
    pub fn on_final(&self, text: &str) -> bool {
        self.handle_transcript(text, "stop-phrase-final")
    }

    fn handle_transcript(&self, text: &str, reason: &str) -> bool {
        let norm = normalize_text(text);
        if norm.is_empty() {
            return false;
        }
        if self.is_echo(&norm) {
            debug!(text = %norm, "Transcript discarded as TTS echo");
            return false;
        }
        if let Some(phrase) = self
            .stop_phrases
            .iter()
            .find(|p| norm.contains(p.as_str()))
        {
            debug!(phrase = %phrase, "Stop phrase matched");
            self.trigger(reason);
            return true;
        }
        false
    }

    /// True when `norm` fuzzy-matches the last bot reply closely enough to
    /// be the bot hearing itself.
    pub fn is_echo(&self, norm: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        let reply = &inner.last_bot_reply;
        if norm.chars().count() <= ECHO_MIN_LEN || reply.chars().count() <= ECHO_MIN_LEN {
            return false;
        }
        partial_ratio(norm, reply) >= ECHO_SIMILARITY
    }
}

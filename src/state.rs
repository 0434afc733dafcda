//! Atomic session-state machine.
//!
//! Tracks where the dialogue is (standby vs the phases of an active
//! session) using an `AtomicU8` so the orchestrator thread, the TTS
//! worker and the watcher threads can all observe it without locking.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Dialogue states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Waiting for a wake word; no session is active.
    Standby = 0,
    /// Session active, capturing the next user utterance.
    Listening = 1,
    /// Transcribing and generating a reply.
    Thinking = 2,
    /// Playing the reply; barge-in and stop-hotword are live.
    Speaking = 3,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Listening,
            2 => Self::Thinking,
            3 => Self::Speaking,
            _ => Self::Standby,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standby => write!(f, "standby"),
            Self::Listening => write!(f, "listening"),
            Self::Thinking => write!(f, "thinking"),
            Self::Speaking => write!(f, "speaking"),
        }
    }
}

/// Thread-safe state cell, shareable via `Arc`.
#[derive(Debug)]
pub struct StateCell {
    state: AtomicU8,
}

impl StateCell {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(SessionState::Standby as u8),
        })
    }

    pub fn current(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set(&self, next: SessionState) {
        self.state.store(next as u8, Ordering::Release);
    }

    /// Standby -> Listening, fails if a session is already active.
    pub fn enter_session(&self) -> bool {
        self.state
            .compare_exchange(
                SessionState::Standby as u8,
                SessionState::Listening as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Back to Standby from any state.
    pub fn reset(&self) {
        self.state.store(SessionState::Standby as u8, Ordering::Release);
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Standby as u8),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_session_only_from_standby() {
        let cell = StateCell::new();
        assert!(cell.enter_session());
        assert_eq!(cell.current(), SessionState::Listening);
        assert!(!cell.enter_session());
        cell.reset();
        assert!(cell.enter_session());
    }

    #[test]
    fn set_and_read_round_trip() {
        let cell = StateCell::new();
        cell.set(SessionState::Speaking);
        assert_eq!(cell.current(), SessionState::Speaking);
        assert_eq!(cell.current().to_string(), "speaking");
    }
}

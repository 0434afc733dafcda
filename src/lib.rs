//! convo-core — wake-word driven, multi-turn voice assistant core.
//!
//! The interesting part is the interactive dialogue orchestrator: a
//! standby/session state machine that couples VAD-endpointed capture, a
//! streaming LLM backend shaped into sentence-sized TTS chunks, and
//! human-voice barge-in with anti-echo guards, fast-exit cancellation and
//! idle timeouts. Engines (ASR, LLM, TTS synthesis, hotword detection)
//! sit behind narrow seams so the orchestrator can be driven end-to-end
//! in tests.

pub mod asr;
pub mod audio;
pub mod config;
pub mod debug_dump;
pub mod fast_exit;
pub mod hotword;
pub mod llm;
pub mod metrics;
pub mod session;
pub mod state;
pub mod text;
pub mod tts;
pub mod wake;

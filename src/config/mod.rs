//! Configuration loading and data directory paths.

pub mod paths;

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use paths::get_data_dir;

/// Top-level config.json shape. Every field has a default so a missing or
/// partial file still yields a runnable configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub wake: WakeConfig,
    pub stop_hotword: StopHotwordConfig,
    pub asr: AsrConfig,
    pub tts: TtsConfig,
    pub llm: LlmConfig,
    pub fast_exit: FastExitConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture sample rate. Must be 8000 or 16000 (frame VAD constraint).
    pub sample_rate: u32,
    /// Frame length in milliseconds for the per-frame DSP loop.
    pub block_ms: u64,
    /// Frame VAD aggressiveness 0..=3.
    pub vad_aggressiveness: u8,
    /// Silence needed after voiced audio before an utterance ends.
    pub silence_ms_to_end: u64,
    pub max_record_seconds: f64,
    pub min_valid_seconds: f64,
    pub session_idle_seconds: u64,

    pub barge_enabled: bool,
    pub barge_allow_during_tts: bool,
    /// Continuous human voice required to fire a barge-in.
    pub barge_min_voice_ms: u64,
    pub barge_debounce_ms: u64,
    pub barge_cooldown_ms: u64,
    /// Detection is suppressed this long after the listener arms.
    pub barge_arm_after_ms: u64,
    /// Accumulator erosion per non-voiced frame. `None` = one block.
    pub barge_voice_drop_ms: Option<u64>,
    /// Voice latch: detections stick active this long after the last hit.
    pub barge_voice_hold_ms: u64,
    pub barge_leak_margin_db: f32,
    /// Leak baseline forgets itself after this long without updates.
    /// `None` = max(1200, cooldown).
    pub barge_leak_decay_ms: Option<u64>,
    pub barge_min_rms_dbfs: f32,
    pub barge_highpass_hz: f32,
    pub barge_zcr_min: f32,
    pub barge_zcr_max: f32,
    /// Only accept frames the keyword VAD flags as speech.
    pub barge_require_cobra: bool,
    /// RMS margin relaxation while the keyword VAD fires.
    pub barge_cobra_relax_db: f32,

    pub prefer_echo_cancel: bool,
    pub input_device_hint: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            block_ms: 30,
            vad_aggressiveness: 3,
            silence_ms_to_end: 1000,
            max_record_seconds: 6.0,
            min_valid_seconds: 0.35,
            session_idle_seconds: 12,
            barge_enabled: true,
            barge_allow_during_tts: true,
            barge_min_voice_ms: 650,
            barge_debounce_ms: 150,
            barge_cooldown_ms: 800,
            barge_arm_after_ms: 400,
            barge_voice_drop_ms: None,
            barge_voice_hold_ms: 200,
            barge_leak_margin_db: 3.0,
            barge_leak_decay_ms: None,
            barge_min_rms_dbfs: -28.0,
            barge_highpass_hz: 300.0,
            barge_zcr_min: 0.05,
            barge_zcr_max: 0.35,
            barge_require_cobra: false,
            barge_cobra_relax_db: 3.0,
            prefer_echo_cancel: true,
            input_device_hint: String::new(),
        }
    }
}

impl AudioConfig {
    /// Samples per frame at the configured rate.
    pub fn block_samples(&self) -> usize {
        (self.sample_rate as u64 * self.block_ms / 1000) as usize
    }

    pub fn voice_drop_ms(&self) -> u64 {
        self.barge_voice_drop_ms.unwrap_or(self.block_ms)
    }

    pub fn leak_decay_ms(&self) -> u64 {
        self.barge_leak_decay_ms
            .unwrap_or_else(|| self.barge_cooldown_ms.max(1200))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    /// "porcupine", "asr" or "auto".
    pub engine: String,
    pub wake_phrases: Vec<String>,
    /// Fuzzy partial-ratio score a transcript must reach to wake.
    pub match_threshold: u32,
    /// Explicit phrase -> language ("ro"/"en") mapping. Unmapped phrases
    /// fall back to the greeting heuristic, then to English.
    pub phrase_languages: HashMap<String, String>,
    pub acknowledgement: Acknowledgement,
    pub porcupine: PorcupineConfig,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            engine: "auto".into(),
            wake_phrases: vec![
                "hello robot".into(),
                "salut robot".into(),
                "hei robot".into(),
            ],
            match_threshold: 85,
            phrase_languages: HashMap::new(),
            acknowledgement: Acknowledgement::default(),
            porcupine: PorcupineConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Acknowledgement {
    pub ro: String,
    pub en: String,
}

impl Default for Acknowledgement {
    fn default() -> Self {
        Self {
            ro: "Salut! Cu ce te pot ajuta?".into(),
            en: "Hi! How can I help?".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PorcupineConfig {
    pub access_key: String,
    pub keyword_paths: Vec<String>,
    pub sensitivity: f32,
    /// Language reported for hotword wakes ("ro"/"en").
    pub language: String,
}

impl Default for PorcupineConfig {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            keyword_paths: Vec::new(),
            sensitivity: 0.6,
            language: "en".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StopHotwordConfig {
    pub enabled: bool,
    /// "exit" closes the session, "barge" only stops playback.
    pub mode: String,
    pub label: String,
    pub access_key: String,
    pub keyword_path: String,
    pub sensitivity: f32,
}

impl Default for StopHotwordConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: "exit".into(),
            label: "stop".into(),
            access_key: String::new(),
            keyword_path: String::new(),
            sensitivity: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AsrConfig {
    /// Whisper-compatible transcription endpoint (multipart WAV upload).
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8002/transcribe".into(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Characters buffered before the first chunk is released to TTS.
    pub prebuffer_chars: usize,
    pub min_chunk_chars: usize,
    pub soft_max_chars: usize,
    /// Pending text is flushed after this long without a new token.
    pub max_idle_ms: u64,
    /// Synthesis endpoint returning WAV audio.
    pub endpoint: String,
    pub output_device: Option<String>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            prebuffer_chars: 120,
            min_chunk_chars: 60,
            soft_max_chars: 140,
            max_idle_ms: 250,
            endpoint: "http://127.0.0.1:8001/synthesize".into(),
            output_device: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub host: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// "precise" or "friendly".
    pub default_mode: String,
    pub strict_facts: bool,
    pub warmup_enabled: bool,
    pub history_enabled: bool,
    pub max_history_turns: usize,
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".into(),
            host: "http://localhost:11434".into(),
            model: "qwen2.5:3b".into(),
            temperature: 0.4,
            max_tokens: 120,
            default_mode: "precise".into(),
            strict_facts: true,
            warmup_enabled: true,
            history_enabled: true,
            max_history_turns: 5,
            system_prompt: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FastExitConfig {
    /// Normalized containment of any of these in a partial or final
    /// transcript arms fast-exit.
    pub stop_phrases: Vec<String>,
}

impl Default for FastExitConfig {
    fn default() -> Self {
        Self {
            stop_phrases: vec!["stop robot".into(), "gata robot".into()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Data directory override. Defaults to the platform data dir.
    pub data: Option<PathBuf>,
}

impl AppConfig {
    /// Read config.json from the data directory, falling back to defaults.
    pub fn load() -> Self {
        let path = get_data_dir().join("config.json");
        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!("Failed to parse {}: {} — using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {} — using defaults", path.display(), e);
                }
                Self::default()
            }
        }
    }

    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.paths.data.clone().unwrap_or_else(get_data_dir)
    }
}

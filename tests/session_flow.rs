//! End-to-end orchestrator scenarios over scripted engines.
//!
//! The real orchestrator, shaper, fast-exit arbiter and metrics run
//! against mock ASR/LLM/TTS/microphone seams, covering the standby→wake
//! round trip, the anti-echo guard, stop-hotword exit, the hotword
//! circuit breaker and the idle timeout.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{bounded, unbounded, Receiver};

use convo_core::asr::{SpeechToText, Transcript};
use convo_core::audio::recorder::{RecordProfile, Utterance, UtteranceSource};
use convo_core::config::AppConfig;
use convo_core::hotword::{WatcherHandle, WatcherMsg};
use convo_core::llm::{ConversationTurn, Mode, ReplyEngine};
use convo_core::metrics::get;
use convo_core::session::{Capabilities, Orchestrator};
use convo_core::state::SessionState;
use convo_core::tts::{FirstSpeakFn, SpeechOutput};

// ---------------------------------------------------------------------------
// Scripted engines
// ---------------------------------------------------------------------------

/// Returns scripted durations; once exhausted it requests shutdown so the
/// orchestrator winds down deterministically.
struct ScriptedMic {
    durations: VecDeque<f64>,
    shutdown: Arc<AtomicBool>,
}

impl ScriptedMic {
    fn new(durations: &[f64], shutdown: Arc<AtomicBool>) -> Self {
        Self {
            durations: durations.iter().copied().collect(),
            shutdown,
        }
    }
}

impl UtteranceSource for ScriptedMic {
    fn record(&mut self, _profile: &RecordProfile, path: &Path) -> Result<Utterance> {
        match self.durations.pop_front() {
            Some(d) => {
                // Give background routers a moment, like a real capture
                // would.
                std::thread::sleep(Duration::from_millis(20));
                Ok(Utterance {
                    path: path.to_path_buf(),
                    duration_seconds: d,
                })
            }
            None => {
                self.shutdown.store(true, Ordering::Release);
                std::thread::sleep(Duration::from_millis(10));
                Ok(Utterance {
                    path: path.to_path_buf(),
                    duration_seconds: 0.0,
                })
            }
        }
    }
}

struct ScriptedAsr {
    transcripts: VecDeque<(String, String)>,
}

impl ScriptedAsr {
    fn new(transcripts: &[(&str, &str)]) -> Self {
        Self {
            transcripts: transcripts
                .iter()
                .map(|(t, l)| (t.to_string(), l.to_string()))
                .collect(),
        }
    }
}

impl SpeechToText for ScriptedAsr {
    fn transcribe(&mut self, _path: &Path, _lang: Option<&str>) -> Result<Transcript> {
        let (text, lang) = self
            .transcripts
            .pop_front()
            .unwrap_or_default();
        Ok(Transcript {
            text,
            lang: if lang.is_empty() { "en".into() } else { lang },
        })
    }
}

struct ScriptedLlm {
    replies: VecDeque<Vec<String>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedLlm {
    fn new(replies: &[&[&str]]) -> Self {
        Self {
            replies: replies
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ReplyEngine for ScriptedLlm {
    fn stream(
        &mut self,
        _user_text: &str,
        _lang_hint: &str,
        _mode: Mode,
        _history: &[ConversationTurn],
    ) -> Receiver<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = unbounded();
        for tok in self.replies.pop_front().unwrap_or_default() {
            let _ = tx.send(tok);
        }
        rx
    }
}

/// Consumes streamed chunks inline and records everything spoken.
#[derive(Clone, Default)]
struct RecordingTts {
    said: Arc<Mutex<Vec<String>>>,
    streamed: Arc<Mutex<Vec<String>>>,
    stops: Arc<AtomicUsize>,
}

impl SpeechOutput for RecordingTts {
    fn say(&mut self, text: &str, _lang: &str) -> Result<()> {
        self.said.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn say_stream(
        &mut self,
        chunks: Receiver<String>,
        _lang: &str,
        on_first_speak: FirstSpeakFn,
        _min_chunk_chars: usize,
    ) {
        let mut first = Some(on_first_speak);
        let mut text = String::new();
        for chunk in chunks.iter() {
            if let Some(cb) = first.take() {
                cb();
            }
            text.push_str(&chunk);
        }
        self.streamed.lock().unwrap().push(text);
    }

    fn is_speaking(&self) -> bool {
        false
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

fn test_config(idle_seconds: u64) -> (AppConfig, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = AppConfig::default();
    cfg.paths.data = Some(tmp.path().to_path_buf());
    cfg.audio.session_idle_seconds = idle_seconds;
    cfg.wake.engine = "asr".into();
    (cfg, tmp)
}

fn caps(
    mic: ScriptedMic,
    asr: ScriptedAsr,
    llm: ScriptedLlm,
    tts: RecordingTts,
) -> Capabilities {
    Capabilities {
        asr: Box::new(asr),
        llm: Box::new(llm),
        tts: Box::new(tts),
        mic: Box::new(mic),
        barge: None,
        wake_watcher: None,
        stop_watcher: None,
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn standby_wake_simple_turn_and_goodbye() {
    let (cfg, _tmp) = test_config(10);
    let shutdown = Arc::new(AtomicBool::new(false));

    let mic = ScriptedMic::new(&[1.0, 1.0, 0.6], Arc::clone(&shutdown));
    let asr = ScriptedAsr::new(&[
        ("hello robot", "en"),
        ("what time is it", "en"),
        ("goodbye robot", "en"),
    ]);
    let llm = ScriptedLlm::new(&[&["Hi ", "there."]]);
    let llm_calls = Arc::clone(&llm.calls);
    let tts = RecordingTts::default();
    let said = Arc::clone(&tts.said);
    let streamed = Arc::clone(&tts.streamed);
    let stops = Arc::clone(&tts.stops);

    let mut orch = Orchestrator::new(cfg, caps(mic, asr, llm, tts), shutdown);
    orch.run();

    let m = orch.metrics();
    assert_eq!(get(&m.wake_triggers), 1);
    assert_eq!(stops.load(Ordering::SeqCst), 0, "nothing should interrupt playback");
    assert_eq!(get(&m.sessions_started), 1);
    assert_eq!(get(&m.interactions), 1);
    assert_eq!(get(&m.sessions_ended), 1);
    // Acknowledgement + streamed reply + farewell.
    assert_eq!(get(&m.tts_speak_calls), 3);
    assert_eq!(m.round_trip().count, 1);
    assert_eq!(llm_calls.load(Ordering::SeqCst), 1);

    assert_eq!(orch.last_bot_reply(), "Hi there.");
    let said = said.lock().unwrap();
    assert_eq!(said[0], "Hi! How can I help?");
    assert_eq!(said[1], "Goodbye!");
    assert_eq!(streamed.lock().unwrap().join(""), "Hi there.");
    assert_eq!(orch.state().current(), SessionState::Standby);
}

#[test]
fn romanian_wake_phrase_acknowledges_in_romanian() {
    let (cfg, _tmp) = test_config(10);
    let shutdown = Arc::new(AtomicBool::new(false));

    let mic = ScriptedMic::new(&[1.0, 0.6], Arc::clone(&shutdown));
    let asr = ScriptedAsr::new(&[("salut robot", "en"), ("goodbye robot", "ro")]);
    let llm = ScriptedLlm::new(&[]);
    let tts = RecordingTts::default();
    let said = Arc::clone(&tts.said);

    let mut orch = Orchestrator::new(cfg, caps(mic, asr, llm, tts), shutdown);
    orch.run();

    let said = said.lock().unwrap();
    assert_eq!(said[0], "Salut! Cu ce te pot ajuta?");
    assert_eq!(said[1], "La revedere!");
}

#[test]
fn own_echo_neither_exits_nor_counts_as_interaction() {
    let (cfg, _tmp) = test_config(1);
    let shutdown = Arc::new(AtomicBool::new(false));

    let mic = ScriptedMic::new(&[1.0, 1.0, 1.0], Arc::clone(&shutdown));
    let asr = ScriptedAsr::new(&[
        ("hello robot", "en"),
        ("tell me about paris", "en"),
        // The mic hears the bot's own reply back.
        ("the capital of france is paris", "en"),
    ]);
    let llm = ScriptedLlm::new(&[&["The capital of France is Paris."]]);
    let llm_calls = Arc::clone(&llm.calls);
    let tts = RecordingTts::default();

    let mut orch = Orchestrator::new(cfg, caps(mic, asr, llm, tts), shutdown);
    orch.run();

    let m = orch.metrics();
    assert_eq!(get(&m.interactions), 1, "echo must not start a second turn");
    assert_eq!(llm_calls.load(Ordering::SeqCst), 1);
    assert!(!orch.fast_exit().pending(), "echo must never arm fast-exit");
    assert_eq!(get(&m.sessions_ended), 1);
}

#[test]
fn stop_hotword_exit_mode_closes_the_session() {
    let (mut cfg, _tmp) = test_config(10);
    cfg.stop_hotword.enabled = true;
    cfg.stop_hotword.mode = "exit".into();
    let shutdown = Arc::new(AtomicBool::new(false));

    // Wake, then a run of too-short captures while the stop hotword event
    // is routed into fast-exit.
    let mic = ScriptedMic::new(
        &[1.0, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1],
        Arc::clone(&shutdown),
    );
    let asr = ScriptedAsr::new(&[("hello robot", "en")]);
    let llm = ScriptedLlm::new(&[]);
    let tts = RecordingTts::default();

    // Stop watcher that has already heard its keyword.
    let (tx, rx) = bounded(4);
    tx.send(WatcherMsg::Detected { keyword_index: 0 }).unwrap();
    drop(tx);
    let mut caps = caps(mic, asr, llm, tts);
    caps.stop_watcher = Some(Box::new(move || WatcherHandle::from_events(rx.clone())));

    let mut orch = Orchestrator::new(cfg, caps, shutdown);
    orch.run();

    let m = orch.metrics();
    assert_eq!(get(&m.sessions_started), 1);
    assert_eq!(get(&m.sessions_ended), 1);
    assert_eq!(get(&m.interactions), 0);
    assert!(orch.fast_exit().pending(), "stop hotword must arm fast-exit");
    assert_eq!(
        orch.fast_exit().reason().as_deref(),
        Some("stop-hotword")
    );
    assert_eq!(orch.state().current(), SessionState::Standby);
}

#[test]
fn hotword_circuit_breaker_switches_to_asr_wake() {
    let (mut cfg, _tmp) = test_config(10);
    cfg.wake.engine = "porcupine".into();
    let shutdown = Arc::new(AtomicBool::new(false));

    let mic = ScriptedMic::new(&[1.0, 0.6], Arc::clone(&shutdown));
    let asr = ScriptedAsr::new(&[("hello robot", "en"), ("goodbye robot", "en")]);
    let llm = ScriptedLlm::new(&[]);
    let tts = RecordingTts::default();

    // Every spawned watcher dies immediately.
    let factory_calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&factory_calls);
    let mut caps = caps(mic, asr, llm, tts);
    caps.wake_watcher = Some(Box::new(move || {
        counted.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = bounded(2);
        tx.send(WatcherMsg::Failed("detector exploded".into()))
            .unwrap();
        drop(tx);
        WatcherHandle::from_events(rx)
    }));

    let mut orch = Orchestrator::new(cfg, caps, shutdown);
    orch.run();

    assert_eq!(factory_calls.load(Ordering::SeqCst), 3);
    assert!(orch.hotword_broken(), "breaker must be sticky");
    let m = orch.metrics();
    assert_eq!(get(&m.wake_triggers), 1, "wake must arrive via ASR fallback");
    assert_eq!(get(&m.sessions_started), 1);
}

#[test]
fn idle_timeout_ends_the_session_cleanly() {
    let (cfg, _tmp) = test_config(1);
    let shutdown = Arc::new(AtomicBool::new(false));

    // Wake, then nothing but sub-threshold noise for longer than the idle
    // window.
    let durations: Vec<f64> = std::iter::once(1.0)
        .chain(std::iter::repeat(0.1).take(80))
        .collect();
    let mic = ScriptedMic::new(&durations, Arc::clone(&shutdown));
    let asr = ScriptedAsr::new(&[("hello robot", "en")]);
    let llm = ScriptedLlm::new(&[]);
    let tts = RecordingTts::default();

    let mut orch = Orchestrator::new(cfg, caps(mic, asr, llm, tts), shutdown);
    orch.run();

    let m = orch.metrics();
    assert_eq!(get(&m.sessions_started), 1);
    assert_eq!(get(&m.sessions_ended), 1);
    assert_eq!(get(&m.interactions), 0);
    assert_eq!(get(&m.errors_total), 0);
    assert_eq!(orch.state().current(), SessionState::Standby);
}

#[test]
fn transcription_error_aborts_turn_but_not_session() {
    let (cfg, _tmp) = test_config(10);
    let shutdown = Arc::new(AtomicBool::new(false));

    struct FailingOnceAsr {
        inner: ScriptedAsr,
        failed: bool,
    }
    impl SpeechToText for FailingOnceAsr {
        fn transcribe(&mut self, path: &Path, lang: Option<&str>) -> Result<Transcript> {
            self.inner.transcribe(path, lang)
        }

        fn transcribe_ro_en(&mut self, path: &Path) -> Result<Transcript> {
            if !self.failed {
                self.failed = true;
                anyhow::bail!("ASR backend hiccup");
            }
            self.inner.transcribe(path, None)
        }
    }

    let mic = ScriptedMic::new(&[1.0, 1.0, 0.6], Arc::clone(&shutdown));
    let asr = FailingOnceAsr {
        inner: ScriptedAsr::new(&[("hello robot", "en"), ("goodbye robot", "en")]),
        failed: false,
    };

    let caps = Capabilities {
        asr: Box::new(asr),
        llm: Box::new(ScriptedLlm::new(&[])),
        tts: Box::new(RecordingTts::default()),
        mic: Box::new(mic),
        barge: None,
        wake_watcher: None,
        stop_watcher: None,
    };

    let mut orch = Orchestrator::new(cfg, caps, shutdown);
    orch.run();

    let m = orch.metrics();
    assert_eq!(get(&m.errors_total), 1);
    // The session survived the hiccup and closed on goodbye.
    assert_eq!(get(&m.sessions_ended), 1);
}

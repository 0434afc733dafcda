//! Dialogue orchestration: standby ↔ session state machine.
//!
//! The orchestrator owns the engines through narrow seams (ASR, LLM, TTS,
//! microphone, barge monitor, hotword watchers) and runs the whole
//! round-trip on the calling thread: wake, capture, transcribe, stream the
//! reply through the shaper into TTS, and watch for barge-in, stop
//! hotwords, fast-exit and idle timeout while the bot speaks.
//!
//! Worker errors never propagate into this loop; they are logged and
//! degrade to a fallback, a self-disable, or an aborted turn.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::bounded;
use tracing::{debug, error, info, warn};

use crate::audio::barge::BargeMonitor;
use crate::audio::recorder::{RecordProfile, UtteranceSource};
use crate::asr::SpeechToText;
use crate::config::{paths, AppConfig};
use crate::debug_dump::DebugDump;
use crate::fast_exit::FastExit;
use crate::hotword::{WatcherFactory, WatcherMsg};
use crate::llm::shaper::{shape_stream, ShaperConfig};
use crate::llm::{unknown_sentence, Mode, ReplyEngine, Role, History};
use crate::metrics::{self, Metrics};
use crate::state::{SessionState, StateCell};
use crate::text::normalize_text;
use crate::tts::SpeechOutput;
use crate::wake::WakeMatcher;

/// Consecutive hotword failures before the sticky ASR fallback.
const HOTWORD_MAX_FAILS: u32 = 3;

/// Per-session barge monitor factory.
pub type BargeFactory = Box<dyn FnMut() -> Result<Box<dyn BargeMonitor>>>;

/// Engine set chosen at startup; immutable for the process lifetime.
pub struct Capabilities {
    pub asr: Box<dyn SpeechToText>,
    pub llm: Box<dyn ReplyEngine>,
    pub tts: Box<dyn SpeechOutput>,
    pub mic: Box<dyn UtteranceSource>,
    /// `None` disables barge-in for the process.
    pub barge: Option<BargeFactory>,
    /// `None` forces ASR-based wake.
    pub wake_watcher: Option<WatcherFactory>,
    /// `None` disables the stop hotword.
    pub stop_watcher: Option<WatcherFactory>,
}

/// Exact-match session closers.
pub fn is_goodbye(text: &str) -> bool {
    let t = normalize_text(text);
    t == "goodbye robot" || t == "good bye robot"
}

pub struct Orchestrator {
    cfg: AppConfig,
    caps: Capabilities,
    fast_exit: Arc<FastExit>,
    metrics: Arc<Metrics>,
    state: Arc<StateCell>,
    wake: WakeMatcher,
    history: History,
    last_bot_reply: String,
    data_dir: PathBuf,
    shutdown: Arc<AtomicBool>,
    stop_barge: Arc<AtomicBool>,
    hotword_failures: u32,
    hotword_broken: bool,
    hotword_warned: bool,
}

impl Orchestrator {
    pub fn new(cfg: AppConfig, caps: Capabilities, shutdown: Arc<AtomicBool>) -> Self {
        let fast_exit = Arc::new(FastExit::new(&cfg.fast_exit.stop_phrases));
        Self::with_arbiter(cfg, caps, fast_exit, shutdown)
    }

    /// Construct around an externally created arbiter, so the binary can
    /// register it as an ASR partial/final listener before handing the
    /// engine over.
    pub fn with_arbiter(
        cfg: AppConfig,
        caps: Capabilities,
        fast_exit: Arc<FastExit>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let wake = WakeMatcher::new(&cfg.wake);
        let history = History::new(cfg.llm.max_history_turns);
        let data_dir = cfg.data_dir();
        Self {
            cfg,
            caps,
            fast_exit,
            metrics: Arc::new(Metrics::new()),
            state: StateCell::new(),
            wake,
            history,
            last_bot_reply: String::new(),
            data_dir,
            shutdown,
            stop_barge: Arc::new(AtomicBool::new(false)),
            hotword_failures: 0,
            hotword_broken: false,
            hotword_warned: false,
        }
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn state(&self) -> Arc<StateCell> {
        Arc::clone(&self.state)
    }

    pub fn fast_exit(&self) -> Arc<FastExit> {
        Arc::clone(&self.fast_exit)
    }

    pub fn last_bot_reply(&self) -> &str {
        &self.last_bot_reply
    }

    /// Sticky hotword circuit-breaker state.
    pub fn hotword_broken(&self) -> bool {
        self.hotword_broken
    }

    /// One-time startup work (LLM warm-up).
    pub fn init(&mut self) {
        self.caps.llm.warm_up();
    }

    /// Standby ↔ session loop until shutdown.
    pub fn run(&mut self) {
        info!("Standby: say the wake phrase to start a conversation");
        while !self.shutdown.load(Ordering::Acquire) {
            let Some(lang) = self.wait_for_wake() else {
                break;
            };
            self.run_session(&lang);
        }
        info!("Orchestrator stopped");
    }

    // -- Standby ----------------------------------------------------------

    fn wait_for_wake(&mut self) -> Option<String> {
        let engine = self.cfg.wake.engine.as_str();
        let wants_hotword = engine == "porcupine" || engine == "auto";
        let use_hotword =
            wants_hotword && self.caps.wake_watcher.is_some() && !self.hotword_broken;

        if wants_hotword && self.caps.wake_watcher.is_none() && !self.hotword_warned {
            warn!("Wake hotword requested but not configured — falling back to ASR wake");
            self.hotword_warned = true;
        }

        if use_hotword {
            match self.wake_via_hotword() {
                HotwordOutcome::Detected => {
                    metrics::inc(&self.metrics.wake_triggers);
                    let lang = if self.cfg.wake.porcupine.language.starts_with("ro") {
                        "ro".to_string()
                    } else {
                        "en".to_string()
                    };
                    info!("Wake word detected (hotword engine)");
                    return Some(lang);
                }
                HotwordOutcome::Broken => {
                    // Fall through to ASR wake, permanently.
                }
                HotwordOutcome::Shutdown => return None,
            }
        }

        self.wake_via_asr()
    }

    fn wake_via_hotword(&mut self) -> HotwordOutcome {
        let factory = self.caps.wake_watcher.as_mut().expect("checked by caller");
        let mut watcher = factory();
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return HotwordOutcome::Shutdown;
            }
            match watcher.events().recv_timeout(Duration::from_millis(250)) {
                Ok(WatcherMsg::Detected { keyword_index }) => {
                    debug!(keyword_index, "Wake hotword hit");
                    self.hotword_failures = 0;
                    return HotwordOutcome::Detected;
                }
                Ok(WatcherMsg::Failed(e)) => {
                    self.hotword_failures += 1;
                    warn!(
                        failures = self.hotword_failures,
                        "Wake hotword failure: {e}"
                    );
                    if self.hotword_failures >= HOTWORD_MAX_FAILS {
                        warn!("Hotword engine failed repeatedly — switching to ASR wake for the process lifetime");
                        self.hotword_broken = true;
                        return HotwordOutcome::Broken;
                    }
                    watcher = factory();
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    // Watcher thread went away without reporting; count it.
                    self.hotword_failures += 1;
                    if self.hotword_failures >= HOTWORD_MAX_FAILS {
                        self.hotword_broken = true;
                        return HotwordOutcome::Broken;
                    }
                    watcher = factory();
                }
            }
        }
    }

    fn wake_via_asr(&mut self) -> Option<String> {
        let profile = RecordProfile::standby(&self.cfg.audio);
        let standby_path = paths::standby_wav(&self.data_dir);

        while !self.shutdown.load(Ordering::Acquire) {
            let utt = match self.caps.mic.record(&profile, &standby_path) {
                Ok(u) => u,
                Err(e) => {
                    error!("Standby recording failed: {e}");
                    metrics::inc(&self.metrics.errors_total);
                    std::thread::sleep(Duration::from_millis(500));
                    continue;
                }
            };
            if utt.duration_seconds < profile.min_valid_seconds {
                debug!(duration = utt.duration_seconds, "Standby clip too short");
                continue;
            }

            // Standby transcription is forced to English; the matched
            // phrase decides the session language.
            let heard = match self.caps.asr.transcribe(&utt.path, Some("en")) {
                Ok(t) => t.text,
                Err(e) => {
                    warn!("Standby transcription failed: {e}");
                    metrics::inc(&self.metrics.errors_total);
                    continue;
                }
            };
            if heard.is_empty() {
                continue;
            }

            debug!(scores = ?self.wake.debug_scores(&heard), transcript = %heard, "Standby");
            let Some(phrase) = self.wake.match_transcript(&heard) else {
                continue;
            };
            let phrase = phrase.to_string();
            let lang = self.wake.language_for(&phrase);
            info!(phrase = %phrase, lang = %lang, "Wake phrase detected");
            metrics::inc(&self.metrics.wake_triggers);
            return Some(lang);
        }
        None
    }

    // -- Session ----------------------------------------------------------

    fn run_session(&mut self, wake_lang: &str) {
        self.state.reset();
        if !self.state.enter_session() {
            return;
        }
        metrics::inc(&self.metrics.sessions_started);
        self.fast_exit.reset();
        self.history.clear();

        // Acknowledge in the heard language.
        let ack = if wake_lang == "ro" {
            self.cfg.wake.acknowledgement.ro.clone()
        } else {
            self.cfg.wake.acknowledgement.en.clone()
        };
        metrics::inc(&self.metrics.tts_speak_calls);
        if let Err(e) = self.caps.tts.say(&ack, wake_lang) {
            warn!("Acknowledgement playback failed: {e}");
        }

        info!("Session active (say \"goodbye robot\" to close)");

        // Stop-hotword watcher + router for the session.
        let session_over = Arc::new(AtomicBool::new(false));
        let stop_teardown = self.spawn_stop_router(&session_over);

        // Session-lifetime barge monitor; the gate rearms at each
        // Speaking entry.
        let mut barge_monitor: Option<Box<dyn BargeMonitor>> =
            match self.caps.barge.as_mut() {
                Some(factory) if self.cfg.audio.barge_enabled => match factory() {
                    Ok(m) => Some(m),
                    Err(e) => {
                        warn!("Barge-in listener unavailable this session: {e}");
                        None
                    }
                },
                _ => None,
            };

        let idle_limit = Duration::from_secs(self.cfg.audio.session_idle_seconds);
        let mut last_activity = Instant::now();

        while !self.shutdown.load(Ordering::Acquire) && last_activity.elapsed() < idle_limit {
            if self.fast_exit.pending() {
                info!("Fast-exit: closing session");
                break;
            }
            if !self.run_turn(wake_lang, &mut barge_monitor, &mut last_activity) {
                break;
            }
        }

        // Teardown: stop watcher + router, back to standby.
        session_over.store(true, Ordering::Release);
        if let Some((watcher_stop, router)) = stop_teardown {
            watcher_stop();
            let _ = router.join();
        }
        self.state.reset();
        metrics::inc(&self.metrics.sessions_ended);
        info!("Back in standby (say the wake phrase for a new session)");
    }

    /// One capture → reply round. Returns `false` when the session should
    /// close (goodbye, fast-exit, device failure).
    fn run_turn(
        &mut self,
        wake_lang: &str,
        barge_monitor: &mut Option<Box<dyn BargeMonitor>>,
        last_activity: &mut Instant,
    ) -> bool {
        self.state.set(SessionState::Listening);
        let profile = RecordProfile::in_session(&self.cfg.audio);
        let utt_path = paths::user_utterance_wav(&self.data_dir);

        let utt = match self.caps.mic.record(&profile, &utt_path) {
            Ok(u) => u,
            Err(e) => {
                error!("In-session recording failed: {e}");
                metrics::inc(&self.metrics.errors_total);
                return false;
            }
        };
        if utt.duration_seconds < profile.min_valid_seconds {
            return true;
        }

        self.state.set(SessionState::Thinking);

        // ASR restricted to ro/en; a transcription error aborts only the
        // turn.
        let (user_text, user_lang) = match self.caps.asr.transcribe_ro_en(&utt.path) {
            Ok(t) => (t.text, t.lang),
            Err(e) => {
                warn!("Transcription failed: {e}");
                metrics::inc(&self.metrics.errors_total);
                (String::new(), "en".to_string())
            }
        };
        info!(lang = %user_lang, text = %user_text, "Heard");

        // Anti-echo: the mic picked up our own playback. Does not count as
        // activity.
        if self.fast_exit.is_echo(&normalize_text(&user_text)) {
            info!("Ignoring input (TTS echo)");
            return true;
        }
        if user_text.is_empty() {
            return true;
        }

        if self.fast_exit.on_final(&user_text) {
            info!("Fast-exit: closed on final transcript");
            return false;
        }

        if is_goodbye(&user_text) {
            self.state.set(SessionState::Speaking);
            metrics::inc(&self.metrics.tts_speak_calls);
            let farewell = if user_lang == "ro" { "La revedere!" } else { "Goodbye!" };
            if let Err(e) = self.caps.tts.say(farewell, &user_lang) {
                warn!("Farewell playback failed: {e}");
            }
            info!("Session closed by user (goodbye robot)");
            return false;
        }

        metrics::inc(&self.metrics.interactions);
        let rt_start = Instant::now();

        let dump = DebugDump::new(&self.data_dir);
        dump.write_asr(&user_text);

        // LLM stream -> shaper -> tee -> TTS, as a bounded channel chain.
        let turns = self.history.turns();
        let mode = Mode::parse(&self.cfg.llm.default_mode);
        let tokens = self.caps.llm.stream(&user_text, &user_lang, mode, &turns);
        self.history.push(Role::User, &user_text);

        let shaped = shape_stream(tokens, ShaperConfig::from(&self.cfg.tts));

        let (tts_tx, tts_rx) = bounded::<String>(8);
        let reply_buf = Arc::new(Mutex::new(String::new()));
        let turn_abort = Arc::new(AtomicBool::new(false));

        let tee_fast_exit = Arc::clone(&self.fast_exit);
        let tee_abort = Arc::clone(&turn_abort);
        let tee_buf = Arc::clone(&reply_buf);
        let tee = std::thread::Builder::new()
            .name("reply-tee".into())
            .spawn(move || {
                let mut forwarding = true;
                for chunk in shaped.iter() {
                    // A fast-exit (or cancelled turn) set before this point
                    // means the chunk never reaches TTS.
                    if tee_fast_exit.pending() || tee_abort.load(Ordering::Acquire) {
                        break;
                    }
                    tee_buf.lock().unwrap().push_str(&chunk);
                    if forwarding && tts_tx.send(chunk).is_err() {
                        // TTS side closed (stopped); keep teeing into the
                        // reply buffer only.
                        forwarding = false;
                    }
                }
            })
            .expect("spawning tee thread");

        self.state.set(SessionState::Speaking);
        metrics::inc(&self.metrics.tts_speak_calls);
        self.stop_barge.store(false, Ordering::Release);
        let rt_metrics = Arc::clone(&self.metrics);
        self.caps.tts.say_stream(
            tts_rx,
            &user_lang,
            Box::new(move || rt_metrics.observe_round_trip(rt_start.elapsed())),
            self.cfg.tts.min_chunk_chars,
        );

        self.speaking_wait_loop(barge_monitor, &turn_abort);

        if let Err(e) = tee.join() {
            warn!("Tee thread panicked: {e:?}");
        }

        // Reply bookkeeping happens only after playback finished or was
        // cancelled.
        let reply = reply_buf.lock().unwrap().clone();
        self.last_bot_reply = reply.clone();
        self.fast_exit.set_last_reply(&reply);
        if !reply.is_empty() {
            self.history.push(Role::Assistant, &reply);
        }
        dump.write_tts(&reply);
        if reply == unknown_sentence(&user_lang) {
            metrics::inc(&self.metrics.unknown_answer);
        }

        if self.fast_exit.pending() {
            info!("Fast-exit: session closing after cancelled turn");
            return false;
        }
        *last_activity = Instant::now();
        true
    }

    /// Poll while TTS plays: fast-exit, stop-hotword barge events and
    /// continuous-voice barge-in all stop playback.
    fn speaking_wait_loop(
        &mut self,
        barge_monitor: &mut Option<Box<dyn BargeMonitor>>,
        turn_abort: &Arc<AtomicBool>,
    ) {
        let barge_active = self.cfg.audio.barge_enabled
            && self.cfg.audio.barge_allow_during_tts
            && barge_monitor.is_some();
        let need_ms = self.cfg.audio.barge_min_voice_ms;

        if let Some(monitor) = barge_monitor.as_mut().filter(|_| barge_active) {
            monitor.begin_turn();
            while self.caps.tts.is_speaking() && !self.shutdown.load(Ordering::Acquire) {
                if self.fast_exit.pending() || self.stop_barge.swap(false, Ordering::AcqRel) {
                    self.caps.tts.stop();
                    turn_abort.store(true, Ordering::Release);
                    break;
                }
                if monitor.heard_speech(need_ms) {
                    info!("Barge-in detected — stopping TTS, back to listening");
                    self.caps.tts.stop();
                    turn_abort.store(true, Ordering::Release);
                    break;
                }
                std::thread::sleep(Duration::from_millis(30));
            }
        } else {
            while self.caps.tts.is_speaking() && !self.shutdown.load(Ordering::Acquire) {
                if self.fast_exit.pending() || self.stop_barge.swap(false, Ordering::AcqRel) {
                    self.caps.tts.stop();
                    turn_abort.store(true, Ordering::Release);
                    break;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }

    /// Start the stop-hotword watcher and a router thread translating its
    /// events into fast-exit (mode `exit`) or a TTS-stop request (mode
    /// `barge`).
    #[allow(clippy::type_complexity)]
    fn spawn_stop_router(
        &mut self,
        session_over: &Arc<AtomicBool>,
    ) -> Option<(Box<dyn FnOnce()>, std::thread::JoinHandle<()>)> {
        if !self.cfg.stop_hotword.enabled {
            return None;
        }
        let factory = self.caps.stop_watcher.as_mut()?;
        let watcher = factory();
        let events = watcher.events().clone();

        let mode_is_exit = self.cfg.stop_hotword.mode != "barge";
        let label = self.cfg.stop_hotword.label.clone();
        let fast_exit = Arc::clone(&self.fast_exit);
        let stop_barge = Arc::clone(&self.stop_barge);
        let over = Arc::clone(session_over);

        let router = std::thread::Builder::new()
            .name("stop-hotword-router".into())
            .spawn(move || loop {
                if over.load(Ordering::Acquire) {
                    return;
                }
                match events.recv_timeout(Duration::from_millis(100)) {
                    Ok(WatcherMsg::Detected { .. }) => {
                        if mode_is_exit {
                            info!(label = %label, "Stop hotword — closing the session");
                            fast_exit.trigger("stop-hotword");
                        } else {
                            info!(label = %label, "Stop hotword — stopping playback");
                            stop_barge.store(true, Ordering::Release);
                        }
                    }
                    Ok(WatcherMsg::Failed(e)) => {
                        warn!("Stop hotword disabled for this session: {e}");
                        return;
                    }
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
                }
            })
            .expect("spawning stop router thread");

        Some((Box::new(move || watcher.stop()), router))
    }
}

enum HotwordOutcome {
    Detected,
    Broken,
    Shutdown,
}

//! convo-core binary: logging, config, engine wiring, signal handling.
//!
//! All behavior lives in the library; this is the bootstrap that chooses
//! concrete engines and runs the orchestrator on the main thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use convo_core::asr::http::HttpAsr;
use convo_core::asr::AsrEngine;
use convo_core::audio::barge::{BargeInListener, BargeMonitor};
use convo_core::audio::{resolve_input_device, MicRecorder};
use convo_core::config::paths::get_data_dir;
use convo_core::config::AppConfig;
use convo_core::fast_exit::FastExit;
use convo_core::hotword::WatcherFactory;
use convo_core::llm::LlmEngine;
use convo_core::session::{Capabilities, Orchestrator};
use convo_core::tts::http::RemoteSynth;
use convo_core::tts::TtsEngine;

fn main() {
    // Tracing first (respects RUST_LOG, defaults to info). Log to a file
    // in the data dir when possible, stderr otherwise.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_dir = get_data_dir();
    let use_file = std::fs::create_dir_all(&log_dir).is_ok();

    let _guard: Option<tracing_appender::non_blocking::WorkerGuard>;
    if use_file {
        let file_appender = tracing_appender::rolling::never(&log_dir, "convo-core.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        _guard = Some(guard);
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(non_blocking)
            .with_ansi(false)
            .init();
    } else {
        _guard = None;
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let cfg = AppConfig::load();
    let data_dir = cfg.data_dir();
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        error!("Cannot create data dir {}: {e}", data_dir.display());
        return;
    }
    info!(data_dir = %data_dir.display(), "Configuration loaded");

    // Clean shutdown on keyboard interrupt.
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || {
            info!("Interrupt received — shutting down");
            flag.store(true, Ordering::Release);
        }) {
            warn!("Could not install interrupt handler: {e}");
        }
    }

    // Fast-exit arbiter is shared between the orchestrator and the ASR
    // partial/final hooks.
    let fast_exit = Arc::new(FastExit::new(&cfg.fast_exit.stop_phrases));

    // ── Engines ──────────────────────────────────────────────────────
    let asr = {
        let partial_fx = Arc::clone(&fast_exit);
        let final_fx = Arc::clone(&fast_exit);
        AsrEngine::new(Box::new(HttpAsr::new(
            &cfg.asr.endpoint,
            cfg.asr.api_key.clone(),
        )))
        .on_partial(Box::new(move |text| partial_fx.on_partial(text)))
        .on_final(Box::new(move |text| final_fx.on_final(text)))
    };

    let llm = LlmEngine::new(cfg.llm.clone());

    // Audio output failing at startup is fatal (recover by restart).
    let tts = match TtsEngine::new(
        Arc::new(RemoteSynth::new(&cfg.tts.endpoint)),
        cfg.tts.output_device.as_deref(),
    ) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Audio output unavailable: {e}");
            return;
        }
    };

    // Input device failing at startup is fatal too.
    if let Err(e) = resolve_input_device(&cfg.audio.input_device_hint, cfg.audio.prefer_echo_cancel)
    {
        error!("Audio input unavailable: {e}");
        return;
    }
    let mic = MicRecorder::new(cfg.audio.clone());

    let barge_audio = cfg.audio.clone();
    let barge = Box::new(move || {
        BargeInListener::open(&barge_audio, None).map(|l| Box::new(l) as Box<dyn BargeMonitor>)
    });

    let wake_watcher = wake_watcher_factory(&cfg);
    let stop_watcher = stop_watcher_factory(&cfg);

    let caps = Capabilities {
        asr: Box::new(asr),
        llm: Box::new(llm),
        tts: Box::new(tts),
        mic: Box::new(mic),
        barge: Some(barge),
        wake_watcher,
        stop_watcher,
    };

    let mut orchestrator = Orchestrator::with_arbiter(cfg, caps, fast_exit, shutdown);
    orchestrator.init();
    orchestrator.run();
    info!("Bye!");
}

#[cfg(feature = "porcupine")]
fn wake_watcher_factory(cfg: &AppConfig) -> Option<WatcherFactory> {
    use std::path::PathBuf;

    use convo_core::hotword::{spawn_watcher, HotwordDetector};
    use convo_core::hotword::porcupine::PorcupineDetector;

    let pc = &cfg.wake.porcupine;
    if pc.access_key.is_empty() || pc.keyword_paths.is_empty() {
        warn!("Porcupine wake: access key or keyword path missing — using ASR wake");
        return None;
    }
    let paths: Vec<PathBuf> = pc.keyword_paths.iter().map(PathBuf::from).collect();
    if let Some(missing) = paths.iter().find(|p| !p.exists()) {
        warn!(
            "Porcupine wake keyword missing: {} — using ASR wake",
            missing.display()
        );
        return None;
    }

    let access_key = pc.access_key.clone();
    let sensitivity = pc.sensitivity;
    let hint = cfg.audio.input_device_hint.clone();
    let prefer_echo = cfg.audio.prefer_echo_cancel;
    Some(Box::new(move || {
        let access_key = access_key.clone();
        let paths = paths.clone();
        spawn_watcher(
            move || {
                PorcupineDetector::new(&access_key, &paths, sensitivity)
                    .map(|d| Box::new(d) as Box<dyn HotwordDetector>)
            },
            hint.clone(),
            prefer_echo,
            "wake".into(),
            false,
        )
    }))
}

#[cfg(not(feature = "porcupine"))]
fn wake_watcher_factory(cfg: &AppConfig) -> Option<WatcherFactory> {
    if cfg.wake.engine == "porcupine" {
        warn!("Built without the porcupine feature — using ASR wake");
    }
    None
}

#[cfg(feature = "porcupine")]
fn stop_watcher_factory(cfg: &AppConfig) -> Option<WatcherFactory> {
    use std::path::PathBuf;

    use convo_core::hotword::{spawn_watcher, HotwordDetector};
    use convo_core::hotword::porcupine::PorcupineDetector;

    let sh = &cfg.stop_hotword;
    if !sh.enabled {
        return None;
    }
    if sh.access_key.is_empty() || sh.keyword_path.is_empty() {
        warn!("Stop hotword: access key or keyword path missing — disabled");
        return None;
    }
    let keyword = PathBuf::from(&sh.keyword_path);
    if !keyword.exists() {
        warn!("Stop hotword keyword missing: {} — disabled", keyword.display());
        return None;
    }

    let access_key = sh.access_key.clone();
    let sensitivity = sh.sensitivity;
    let label = sh.label.clone();
    let hint = cfg.audio.input_device_hint.clone();
    let prefer_echo = cfg.audio.prefer_echo_cancel;
    Some(Box::new(move || {
        let access_key = access_key.clone();
        let keyword = keyword.clone();
        spawn_watcher(
            move || {
                PorcupineDetector::new(&access_key, &[keyword], sensitivity)
                    .map(|d| Box::new(d) as Box<dyn HotwordDetector>)
            },
            hint.clone(),
            prefer_echo,
            label.clone(),
            true,
        )
    }))
}

#[cfg(not(feature = "porcupine"))]
fn stop_watcher_factory(cfg: &AppConfig) -> Option<WatcherFactory> {
    if cfg.stop_hotword.enabled {
        warn!("Built without the porcupine feature — stop hotword disabled");
    }
    None
}

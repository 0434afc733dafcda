//! Text-to-speech output.
//!
//! The synthesizer itself is an external collaborator behind the
//! [`Synthesizer`] seam; [`TtsEngine`] owns playback: blocking `say`,
//! non-blocking `say_stream` over a chunk channel (single-writer, a new
//! stream first retires the previous worker), `is_speaking`, and an
//! idempotent `stop`. `on_first_speak` fires exactly once per stream,
//! right as the first audible samples are queued.

pub mod http;
pub mod playback;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use rodio::buffer::SamplesBuffer;
use rodio::Sink;
use tracing::{debug, warn};

use playback::AudioPlayer;

/// Synthesized PCM.
pub struct SynthAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Blocking synthesis contract.
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, text: &str, lang: &str) -> Result<SynthAudio>;
}

/// Callback fired once per stream at the first audible output.
pub type FirstSpeakFn = Box<dyn FnOnce() + Send>;

/// Speech output contract the orchestrator drives.
pub trait SpeechOutput {
    /// Synthesize and play to completion (or until stopped).
    fn say(&mut self, text: &str, lang: &str) -> Result<()>;

    /// Start streaming playback of shaped chunks; returns immediately.
    fn say_stream(
        &mut self,
        chunks: Receiver<String>,
        lang: &str,
        on_first_speak: FirstSpeakFn,
        min_chunk_chars: usize,
    );

    fn is_speaking(&self) -> bool;

    /// Stop playback and cancel any in-flight synthesis. Idempotent.
    fn stop(&self);
}

pub struct TtsEngine {
    synth: Arc<dyn Synthesizer>,
    player: AudioPlayer,
    cancel: Arc<AtomicBool>,
    worker_active: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl TtsEngine {
    pub fn new(synth: Arc<dyn Synthesizer>, output_device: Option<&str>) -> Result<Self> {
        let player = AudioPlayer::new(output_device)?;
        Ok(Self {
            synth,
            player,
            cancel: Arc::new(AtomicBool::new(false)),
            worker_active: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }

    /// Retire a previous streaming worker so streams never overlap.
    fn join_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            self.cancel.store(true, Ordering::SeqCst);
            self.player.sink_handle().stop();
            let _ = handle.join();
        }
    }

    fn append_audio(sink: &Sink, audio: SynthAudio) {
        if audio.samples.is_empty() {
            return;
        }
        sink.append(SamplesBuffer::new(1, audio.sample_rate, audio.samples));
    }
}

impl SpeechOutput for TtsEngine {
    fn say(&mut self, text: &str, lang: &str) -> Result<()> {
        self.join_worker();
        self.cancel.store(false, Ordering::SeqCst);

        let audio = self.synth.synthesize(text, lang)?;
        let sink = self.player.sink_handle();
        Self::append_audio(&sink, audio);
        while !sink.empty() {
            if self.cancel.load(Ordering::SeqCst) {
                sink.stop();
                break;
            }
            std::thread::sleep(Duration::from_millis(30));
        }
        Ok(())
    }

    fn say_stream(
        &mut self,
        chunks: Receiver<String>,
        lang: &str,
        on_first_speak: FirstSpeakFn,
        min_chunk_chars: usize,
    ) {
        self.join_worker();
        self.cancel.store(false, Ordering::SeqCst);
        self.worker_active.store(true, Ordering::SeqCst);

        let synth = Arc::clone(&self.synth);
        let sink = self.player.sink_handle();
        let cancel = Arc::clone(&self.cancel);
        let active = Arc::clone(&self.worker_active);
        let lang = lang.to_string();

        let handle = std::thread::Builder::new()
            .name("tts-stream".into())
            .spawn(move || {
                let mut on_first = Some(on_first_speak);
                let mut pending = String::new();
                let mut closed = false;

                while !closed && !cancel.load(Ordering::SeqCst) {
                    match chunks.recv_timeout(Duration::from_millis(100)) {
                        Ok(chunk) => pending.push_str(&chunk),
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => closed = true,
                    }

                    // Coalesce dribbles below the synth's comfortable size.
                    while !closed && pending.chars().count() < min_chunk_chars {
                        match chunks.recv_timeout(Duration::from_millis(50)) {
                            Ok(chunk) => pending.push_str(&chunk),
                            Err(RecvTimeoutError::Timeout) => break,
                            Err(RecvTimeoutError::Disconnected) => closed = true,
                        }
                    }

                    if pending.trim().is_empty() {
                        pending.clear();
                        continue;
                    }
                    if cancel.load(Ordering::SeqCst) {
                        break;
                    }

                    match synth.synthesize(&pending, &lang) {
                        Ok(audio) => {
                            if let Some(cb) = on_first.take() {
                                cb();
                            }
                            TtsEngine::append_audio(&sink, audio);
                        }
                        Err(e) => {
                            // One bad chunk aborts neither the stream nor
                            // the session.
                            warn!("TTS synthesis error: {e}");
                        }
                    }
                    pending.clear();
                }

                while !sink.empty() && !cancel.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(20));
                }
                if cancel.load(Ordering::SeqCst) {
                    sink.stop();
                    debug!("TTS stream cancelled");
                }
                active.store(false, Ordering::SeqCst);
            })
            .expect("spawning tts stream thread");

        self.worker = Some(handle);
    }

    fn is_speaking(&self) -> bool {
        self.worker_active.load(Ordering::SeqCst) || !self.player.sink_handle().empty()
    }

    fn stop(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.player.sink_handle().stop();
    }
}

impl Drop for TtsEngine {
    fn drop(&mut self) {
        self.join_worker();
    }
}

//! VAD-endpointed utterance capture.
//!
//! Records from the microphone until silence follows speech or a maximum
//! length is hit, then writes the segment as 16-bit mono WAV. Two
//! profiles: a patient one for standby wake listening and a snappier one
//! for in-session turns.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::AudioConfig;

use super::capture::{resolve_input_device, start_capture};
use super::probe::FrameVad;
use super::ring_buffer::sample_ring_buffer;

/// Endpointing parameters for one recording.
#[derive(Debug, Clone)]
pub struct RecordProfile {
    pub silence_ms_to_end: u64,
    pub max_record_seconds: f64,
    pub min_valid_seconds: f64,
    pub vad_aggressiveness: u8,
}

impl RecordProfile {
    /// Standby wake listening: patient endpointing, short cap.
    pub fn standby(base: &AudioConfig) -> Self {
        let _ = base;
        Self {
            silence_ms_to_end: 1000,
            max_record_seconds: 4.0,
            min_valid_seconds: 0.7,
            vad_aggressiveness: 3,
        }
    }

    /// In-session turns: fast endpointing, admits short utterances
    /// ("goodbye robot" must survive the min-valid gate).
    pub fn in_session(base: &AudioConfig) -> Self {
        Self {
            silence_ms_to_end: 450,
            max_record_seconds: base.max_record_seconds,
            min_valid_seconds: 0.35,
            vad_aggressiveness: base.vad_aggressiveness,
        }
    }
}

/// A captured segment on disk.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub path: PathBuf,
    pub duration_seconds: f64,
}

/// Why a recording ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    SilenceAfterVoice,
    MaxLength,
}

/// Pure endpointing state machine, one `push` per frame.
#[derive(Debug)]
pub struct Endpointer {
    silence_ms_to_end: u64,
    max_ms: u64,
    heard_voice: bool,
    silence_ms: u64,
    total_ms: u64,
}

impl Endpointer {
    pub fn new(profile: &RecordProfile) -> Self {
        Self {
            silence_ms_to_end: profile.silence_ms_to_end,
            max_ms: (profile.max_record_seconds * 1000.0) as u64,
            heard_voice: false,
            silence_ms: 0,
            total_ms: 0,
        }
    }

    pub fn push(&mut self, is_voiced: bool, block_ms: u64) -> Option<EndReason> {
        self.total_ms += block_ms;
        if is_voiced {
            self.heard_voice = true;
            self.silence_ms = 0;
        } else if self.heard_voice {
            self.silence_ms += block_ms;
            if self.silence_ms >= self.silence_ms_to_end {
                return Some(EndReason::SilenceAfterVoice);
            }
        }
        if self.total_ms >= self.max_ms {
            return Some(EndReason::MaxLength);
        }
        None
    }

    pub fn heard_voice(&self) -> bool {
        self.heard_voice
    }
}

/// Capture source for one utterance at a time.
///
/// The orchestrator is the only caller, so the microphone is consumed by
/// at most one recording per instant.
pub trait UtteranceSource: Send {
    fn record(&mut self, profile: &RecordProfile, path: &Path) -> Result<Utterance>;
}

/// cpal-backed recorder. Opens a fresh input stream per recording and
/// closes it before returning.
pub struct MicRecorder {
    audio: AudioConfig,
}

impl MicRecorder {
    pub fn new(audio: AudioConfig) -> Self {
        Self { audio }
    }
}

impl UtteranceSource for MicRecorder {
    fn record(&mut self, profile: &RecordProfile, path: &Path) -> Result<Utterance> {
        let block_samples = self.audio.block_samples();
        let block_ms = self.audio.block_ms;
        let sample_rate = self.audio.sample_rate;

        let mut vad = FrameVad::energy(sample_rate, profile.vad_aggressiveness)?;
        let device = resolve_input_device(
            &self.audio.input_device_hint,
            self.audio.prefer_echo_cancel,
        )?;
        let (producer, mut consumer) = sample_ring_buffer(None);
        let stream = start_capture(&device, producer, sample_rate, block_samples)?;

        let mut endpointer = Endpointer::new(profile);
        let mut recorded: Vec<i16> = Vec::new();
        let mut frame = vec![0i16; block_samples];
        // Wall-clock backstop in case the device stalls.
        let deadline =
            Instant::now() + Duration::from_secs_f64(profile.max_record_seconds + 2.0);

        let reason = loop {
            if Instant::now() > deadline {
                break EndReason::MaxLength;
            }
            if consumer.available() < block_samples {
                std::thread::sleep(Duration::from_millis(block_ms / 3 + 1));
                continue;
            }
            let read = consumer.pop_slice(&mut frame);
            debug_assert_eq!(read, block_samples);
            let is_voiced = vad.is_speech(&frame);
            recorded.extend_from_slice(&frame);
            if let Some(reason) = endpointer.push(is_voiced, block_ms) {
                break reason;
            }
        };
        drop(stream);

        let duration_seconds = recorded.len() as f64 / sample_rate as f64;
        debug!(
            ?reason,
            duration_seconds,
            voiced = endpointer.heard_voice(),
            "Recording finished"
        );

        write_wav(path, &recorded, sample_rate)?;
        info!(path = %path.display(), duration_seconds, "Utterance captured");

        Ok(Utterance {
            path: path.to_path_buf(),
            duration_seconds,
        })
    }
}

/// Write int16 mono samples as a PCM WAV file.
pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

//! Per-frame DSP probes: RMS, high-pass, zero-crossing rate, frame VAD.
//!
//! Everything here is per-frame and allocation-light; the barge-in
//! listener runs all of it inside a sub-30 ms frame loop.

use anyhow::{bail, Result};

/// RMS level of an int16 frame in dBFS. Empty frames read as -120 dB.
pub fn rms_dbfs(frame: &[i16]) -> f32 {
    if frame.is_empty() {
        return -120.0;
    }
    let mut acc = 0.0f64;
    for &s in frame {
        let x = s as f64 / 32768.0;
        acc += x * x;
    }
    let rms = (acc / frame.len() as f64 + 1e-12).sqrt();
    (20.0 * (rms + 1e-12).log10()) as f32
}

/// First-order IIR high-pass. Cuts table thumps and HVAC rumble
/// (~50-200 Hz) without touching the voice band.
///
/// `alpha = RC / (RC + dt)` with `RC = 1/(2*pi*fc)`, `dt = 1/sr`.
/// Output is clipped back to int16 range.
pub fn highpass(frame: &[i16], cutoff_hz: f32, sample_rate: u32) -> Vec<i16> {
    if cutoff_hz <= 0.0 {
        return frame.to_vec();
    }
    let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
    let dt = 1.0 / sample_rate as f32;
    let alpha = rc / (rc + dt);

    let mut out = Vec::with_capacity(frame.len());
    let mut y_prev = 0.0f32;
    let mut x_prev = 0.0f32;
    for &s in frame {
        let x = s as f32;
        let y = alpha * (y_prev + x - x_prev);
        y_prev = y;
        x_prev = x;
        out.push(y.clamp(-32768.0, 32767.0) as i16);
    }
    out
}

/// Zero-crossing rate in `0..=1`.
///
/// Human voice sits roughly in [0.05, 0.35]; impulsive noise runs higher,
/// continuous low rumble lower.
pub fn zero_crossing_rate(frame: &[i16]) -> f32 {
    if frame.len() < 2 {
        return 0.0;
    }
    let mut crossings = 0u32;
    for pair in frame.windows(2) {
        let a = pair[0].signum();
        let b = pair[1].signum();
        crossings += (a - b).unsigned_abs() as u32;
    }
    (crossings as f32 / 2.0) / (frame.len() - 1) as f32
}

/// Per-frame verdict assembled by the barge gate. Lives for one frame.
#[derive(Debug, Clone, Copy)]
pub struct VoiceDecision {
    pub rms_dbfs: f32,
    pub zcr: Option<f32>,
    pub vad_prob: Option<f32>,
    pub hotword_hit: bool,
    pub is_human_voice: bool,
}

/// Speech-probability source for a single PCM frame.
///
/// Neural engines (Silero, Cobra) plug in here; `EnergyVad` is the
/// built-in fallback when none is configured.
pub trait VoiceActivity: Send {
    fn speech_prob(&mut self, frame: &[i16]) -> Result<f32>;

    fn reset(&mut self) {}
}

/// Mean-absolute-amplitude pseudo-probability.
///
/// Scales the energy so that quiet room noise maps near 0 and normal
/// close-mic speech saturates toward 1.
pub struct EnergyVad {
    full_scale_energy: f32,
}

impl EnergyVad {
    pub fn new() -> Self {
        Self {
            full_scale_energy: 0.05,
        }
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceActivity for EnergyVad {
    fn speech_prob(&mut self, frame: &[i16]) -> Result<f32> {
        if frame.is_empty() {
            return Ok(0.0);
        }
        let sum: f64 = frame.iter().map(|s| (*s as f64 / 32768.0).abs()).sum();
        let energy = (sum / frame.len() as f64) as f32;
        Ok((energy / self.full_scale_energy).min(1.0))
    }
}

/// Probability threshold for a VAD aggressiveness level 0..=3.
pub fn threshold_for_aggressiveness(level: u8) -> f32 {
    match level {
        0 => 0.3,
        1 => 0.4,
        2 => 0.5,
        3 => 0.6,
        _ => 0.5,
    }
}

/// Thresholded frame VAD over a pluggable probability source.
pub struct FrameVad {
    backend: Box<dyn VoiceActivity>,
    threshold: f32,
}

impl FrameVad {
    pub fn new(backend: Box<dyn VoiceActivity>, sample_rate: u32, aggressiveness: u8) -> Result<Self> {
        if sample_rate != 8000 && sample_rate != 16_000 {
            bail!("frame VAD requires 8000 or 16000 Hz, got {sample_rate}");
        }
        Ok(Self {
            backend,
            threshold: threshold_for_aggressiveness(aggressiveness),
        })
    }

    /// Energy-backed VAD, the default when no neural engine is wired in.
    pub fn energy(sample_rate: u32, aggressiveness: u8) -> Result<Self> {
        Self::new(Box::new(EnergyVad::new()), sample_rate, aggressiveness)
    }

    pub fn speech_prob(&mut self, frame: &[i16]) -> f32 {
        // Probe errors read as silence, same as the engines' own fallback.
        self.backend.speech_prob(frame).unwrap_or(0.0)
    }

    pub fn is_speech(&mut self, frame: &[i16]) -> bool {
        self.speech_prob(frame) >= self.threshold
    }

    pub fn reset(&mut self) {
        self.backend.reset();
    }
}

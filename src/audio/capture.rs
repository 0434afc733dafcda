//! Audio capture via cpal.
//!
//! Opens the requested (or default) input device, captures at the device's
//! native rate, resamples to the pipeline rate, converts to mono int16 and
//! pushes fixed-size blocks into a ring buffer. The returned `Stream` must
//! be kept alive for the duration of the capture.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use tracing::{debug, error, info};

use super::ring_buffer::SampleProducer;

/// List available input device names.
pub fn list_devices() -> Vec<String> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    if let Ok(devices) = host.input_devices() {
        for dev in devices {
            if let Ok(name) = dev.name() {
                names.push(name);
            }
        }
    }
    names
}

/// Pick an input device.
///
/// Preference order: a device advertising echo cancellation (when
/// `prefer_echo_cancel`), then a device whose name contains `hint`, then
/// the system default.
pub fn resolve_input_device(
    hint: &str,
    prefer_echo_cancel: bool,
) -> anyhow::Result<cpal::Device> {
    let host = cpal::default_host();
    let devices: Vec<cpal::Device> = host
        .input_devices()
        .map_err(|e| anyhow::anyhow!("Failed to enumerate input devices: {e}"))?
        .collect();

    if prefer_echo_cancel {
        for dev in &devices {
            if let Ok(name) = dev.name() {
                let lower = name.to_lowercase();
                if lower.contains("echo") || lower.contains("aec") {
                    info!(device = %name, "Selected echo-cancelling input device");
                    return Ok(dev.clone());
                }
            }
        }
    }

    if !hint.is_empty() {
        for dev in &devices {
            if let Ok(name) = dev.name() {
                if name.to_lowercase().contains(&hint.to_lowercase()) {
                    info!(device = %name, "Selected input device by hint");
                    return Ok(dev.clone());
                }
            }
        }
        debug!(hint, "No input device matched hint, falling back to default");
    }

    host.default_input_device()
        .ok_or_else(|| anyhow::anyhow!("No default input device available"))
}

/// Simple linear resampler, mono f32.
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx.floor() as usize;
        let frac = (src_idx - idx0 as f64) as f32;
        let s0 = input.get(idx0).copied().unwrap_or(0.0);
        let s1 = input.get(idx0 + 1).copied().unwrap_or(s0);
        output.push(s0 + frac * (s1 - s0));
    }
    output
}

/// Down-mix interleaved multi-channel audio to mono by averaging.
fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

/// Start capture on `device` at `target_rate`, delivering `block_samples`-
/// sized runs of int16 mono samples to `on_block`.
///
/// The callback runs on the cpal audio thread; keep it cheap.
pub fn start_block_stream(
    device: &cpal::Device,
    target_rate: u32,
    block_samples: usize,
    mut on_block: impl FnMut(Vec<i16>) + Send + 'static,
) -> anyhow::Result<Stream> {
    let default_config = device
        .default_input_config()
        .map_err(|e| anyhow::anyhow!("Failed to get default input config: {e}"))?;

    let native_rate = default_config.sample_rate().0;
    let channels = default_config.channels();
    let stream_config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(native_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        native_rate,
        channels, target_rate, block_samples, "Opening input stream"
    );

    let needs_resample = native_rate != target_rate;
    let needs_downmix = channels > 1;
    let mut chunk_buf: Vec<i16> = Vec::with_capacity(block_samples * 2);

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let mono = if needs_downmix {
                    to_mono(data, channels)
                } else {
                    data.to_vec()
                };
                let resampled = if needs_resample {
                    resample_linear(&mono, native_rate, target_rate)
                } else {
                    mono
                };

                chunk_buf.extend(resampled.iter().copied().map(f32_to_i16));
                while chunk_buf.len() >= block_samples {
                    let chunk: Vec<i16> = chunk_buf.drain(..block_samples).collect();
                    on_block(chunk);
                }
            },
            move |err| {
                error!("Audio input stream error: {}", err);
            },
            None,
        )
        .map_err(|e| anyhow::anyhow!("Failed to build input stream: {e}"))?;

    stream
        .play()
        .map_err(|e| anyhow::anyhow!("Failed to start input stream: {e}"))?;

    Ok(stream)
}

/// Block stream variant feeding a lock-free ring buffer (the recorder's
/// consumption path). A full buffer drops the tail; the consumer catches
/// up on its next poll.
pub fn start_capture(
    device: &cpal::Device,
    mut producer: SampleProducer,
    target_rate: u32,
    block_samples: usize,
) -> anyhow::Result<Stream> {
    start_block_stream(device, target_rate, block_samples, move |chunk| {
        let _ = producer.push_slice(&chunk);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_identity_when_rates_match() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_linear(&input, 16_000, 16_000), input);
    }

    #[test]
    fn resample_halves_length_for_double_rate() {
        let input: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        let out = resample_linear(&input, 32_000, 16_000);
        assert_eq!(out.len(), 50);
        // Linear interpolation preserves a ramp.
        assert!((out[10] - input[20]).abs() < 1e-4);
    }

    #[test]
    fn downmix_averages_channels() {
        let stereo = vec![0.2, 0.4, -0.2, -0.4];
        let mono = to_mono(&stereo, 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!((mono[1] + 0.3).abs() < 1e-6);
    }

    #[test]
    fn f32_conversion_clamps() {
        assert_eq!(f32_to_i16(2.0), 32767);
        assert_eq!(f32_to_i16(-2.0), -32767);
        assert_eq!(f32_to_i16(0.0), 0);
    }
}

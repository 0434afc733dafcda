//! Remote HTTP synthesizer.
//!
//! POSTs `{"text": ..., "lang": ...}` to a synthesis server and decodes
//! the WAV bytes it returns.

use std::io::Cursor;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use super::{SynthAudio, Synthesizer};

pub struct RemoteSynth {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl RemoteSynth {
    pub fn new(endpoint: &str) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            endpoint: endpoint.to_string(),
            client,
        }
    }
}

impl Synthesizer for RemoteSynth {
    fn synthesize(&self, text: &str, lang: &str) -> Result<SynthAudio> {
        debug!(chars = text.chars().count(), lang, "Requesting synthesis");
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "text": text, "lang": lang }))
            .send()?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            anyhow::bail!("TTS API error {}: {}", status, body);
        }
        let bytes = resp.bytes()?;
        decode_wav(&bytes)
    }
}

/// Decode 16-bit int or 32-bit float WAV into f32 samples.
pub fn decode_wav(bytes: &[u8]) -> Result<SynthAudio> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).context("decoding synthesized WAV")?;
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<Result<_, _>>()?,
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
    };
    Ok(SynthAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

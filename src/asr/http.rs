//! Whisper-compatible HTTP transcription adapter.
//!
//! Uploads the recorded WAV as multipart form data and reads back
//! `{"text": ..., "language": ...}`.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::multipart;
use tracing::debug;

use super::{SpeechToText, Transcript};

pub struct HttpAsr {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpAsr {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            endpoint: endpoint.to_string(),
            api_key,
            client,
        }
    }
}

impl SpeechToText for HttpAsr {
    fn transcribe(&mut self, path: &Path, language_override: Option<&str>) -> Result<Transcript> {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        debug!(bytes = bytes.len(), endpoint = %self.endpoint, "Uploading audio for transcription");

        let file_part = multipart::Part::bytes(bytes)
            .file_name("audio.wav")
            .mime_str("audio/wav")?;
        let mut form = multipart::Form::new()
            .text("model", "whisper-1")
            .part("file", file_part);
        if let Some(lang) = language_override {
            form = form.text("language", lang.to_string());
        }

        let mut req = self.client.post(&self.endpoint).multipart(form);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send()?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            anyhow::bail!("ASR API error {}: {}", status, body);
        }

        let json: serde_json::Value = resp.json()?;
        let text = json["text"].as_str().unwrap_or("").trim().to_string();
        let lang = json["language"]
            .as_str()
            .or(language_override)
            .unwrap_or("en")
            .to_string();

        Ok(Transcript { text, lang })
    }
}

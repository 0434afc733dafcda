//! Picovoice Porcupine detector (behind the `porcupine` feature).

use std::path::PathBuf;

use anyhow::{Context, Result};
use porcupine::{Porcupine, PorcupineBuilder};

use super::HotwordDetector;

pub struct PorcupineDetector {
    inner: Porcupine,
}

impl PorcupineDetector {
    pub fn new(access_key: &str, keyword_paths: &[PathBuf], sensitivity: f32) -> Result<Self> {
        let sensitivities = vec![sensitivity; keyword_paths.len()];
        let inner = PorcupineBuilder::new_with_keyword_paths(access_key, keyword_paths)
            .sensitivities(&sensitivities)
            .init()
            .context("initializing Porcupine")?;
        Ok(Self { inner })
    }
}

impl HotwordDetector for PorcupineDetector {
    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn frame_length(&self) -> usize {
        self.inner.frame_length() as usize
    }

    fn process(&mut self, frame: &[i16]) -> Result<i32> {
        self.inner
            .process(frame)
            .context("Porcupine process")
    }
}

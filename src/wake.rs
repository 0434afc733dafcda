//! Fuzzy wake-phrase matching for ASR-based standby.
//!
//! Standby transcripts are noisy ("hello robots", "ello robot"), so wake
//! phrases are matched with partial-ratio similarity rather than equality.
//! The matched phrase also decides the session language: an explicit
//! config mapping wins, otherwise a phrase containing "robot" plus a
//! Romanian greeting word classifies as Romanian, and anything else is
//! English.

use std::collections::HashMap;

use crate::config::WakeConfig;
use crate::text::{normalize_text, partial_ratio};

const RO_GREETINGS: [&str; 3] = ["salut", "hei", "bun"];

pub struct WakeMatcher {
    /// (normalized, original) wake phrases.
    phrases: Vec<(String, String)>,
    threshold: u32,
    languages: HashMap<String, String>,
}

impl WakeMatcher {
    pub fn new(cfg: &WakeConfig) -> Self {
        let phrases = cfg
            .wake_phrases
            .iter()
            .map(|p| (normalize_text(p), p.clone()))
            .filter(|(n, _)| !n.is_empty())
            .collect();
        let languages = cfg
            .phrase_languages
            .iter()
            .map(|(k, v)| (normalize_text(k), v.clone()))
            .collect();
        Self {
            phrases,
            threshold: cfg.match_threshold,
            languages,
        }
    }

    /// Best-scoring wake phrase at or above the threshold.
    pub fn match_transcript(&self, text: &str) -> Option<&str> {
        let norm = normalize_text(text);
        if norm.is_empty() {
            return None;
        }
        self.phrases
            .iter()
            .map(|(n, orig)| (partial_ratio(&norm, n), orig))
            .filter(|(score, _)| *score >= self.threshold)
            .max_by_key(|(score, _)| *score)
            .map(|(_, orig)| orig.as_str())
    }

    /// Per-phrase scores for standby debug logging.
    pub fn debug_scores(&self, text: &str) -> Vec<(String, u32)> {
        let norm = normalize_text(text);
        self.phrases
            .iter()
            .map(|(n, orig)| (orig.clone(), partial_ratio(&norm, n)))
            .collect()
    }

    /// Session language for a matched phrase.
    pub fn language_for(&self, phrase: &str) -> String {
        let norm = normalize_text(phrase);
        if let Some(lang) = self.languages.get(&norm) {
            return lang.clone();
        }
        let is_ro = norm.contains("robot") && RO_GREETINGS.iter().any(|g| norm.contains(g));
        if is_ro {
            "ro".into()
        } else {
            "en".into()
        }
    }
}

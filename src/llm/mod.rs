//! Streaming reply generation.
//!
//! The concrete backend is Ollama's `/api/generate` endpoint, read as
//! line-delimited JSON over a blocking connection on a worker thread, with
//! tokens handed to the orchestrator through a bounded channel. A closed
//! receiver aborts the HTTP read, which is how fast-exit cancellation
//! propagates all the way back to the model. Transport errors degrade to a
//! rule-based reply so a turn never dies silently.

pub mod shaper;

use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::LlmConfig;

const UNKNOWN_EN: &str =
    "That's outside my current knowledge, but I'll note it for improvement.";
const UNKNOWN_RO: &str =
    "Interesant, nu am răspunsul încă, dar exact întrebări ca asta mă ajută să devin mai bun.";

/// The configured "don't know" sentence for a language.
pub fn unknown_sentence(lang: &str) -> &'static str {
    if lang.starts_with("ro") {
        UNKNOWN_RO
    } else {
        UNKNOWN_EN
    }
}

/// Generation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Temperature 0, strict-facts preface.
    Precise,
    /// Higher temperature, friendly preface.
    Friendly,
}

impl Mode {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "friendly" => Self::Friendly,
            _ => Self::Precise,
        }
    }
}

/// One side of a conversation exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Bounded per-session history ring: at most `2 * max_history_turns`
/// entries, oldest evicted first.
#[derive(Debug)]
pub struct History {
    turns: VecDeque<ConversationTurn>,
    capacity: usize,
}

impl History {
    pub fn new(max_history_turns: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            capacity: max_history_turns * 2,
        }
    }

    pub fn push(&mut self, role: Role, content: &str) {
        if self.capacity == 0 {
            return;
        }
        while self.turns.len() >= self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(ConversationTurn {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Streaming reply contract.
pub trait ReplyEngine: Send {
    /// Idempotent model warm-up; called once at orchestrator init.
    fn warm_up(&mut self) {}

    /// Start generating. Tokens arrive in order on the returned channel;
    /// dropping the receiver cancels generation.
    fn stream(
        &mut self,
        user_text: &str,
        lang_hint: &str,
        mode: Mode,
        history: &[ConversationTurn],
    ) -> Receiver<String>;
}

/// Ollama-backed engine with a rule-based fallback.
pub struct LlmEngine {
    cfg: LlmConfig,
    client: reqwest::blocking::Client,
    warmed_up: bool,
}

impl LlmEngine {
    pub fn new(cfg: LlmConfig) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        info!(provider = %cfg.provider, model = %cfg.model, "LLM engine ready");
        Self {
            cfg,
            client,
            warmed_up: false,
        }
    }

    fn rule_based(user_text: &str, lang_hint: &str) -> String {
        if user_text.trim().is_empty() {
            return "Nu am auzit întrebarea. Poți repeta?".into();
        }
        if lang_hint.starts_with("ro") {
            format!("Am înțeles: \"{user_text}\".")
        } else {
            format!("I heard: \"{user_text}\".")
        }
    }

    fn build_prompt(
        cfg: &LlmConfig,
        user_text: &str,
        lang_hint: &str,
        mode: Mode,
        history: &[ConversationTurn],
    ) -> (String, f32) {
        let unknown = unknown_sentence(lang_hint);
        let (safety, temperature) = match mode {
            Mode::Precise => {
                let safety = if cfg.strict_facts {
                    format!(
                        "IMPORTANT: Answer only with verified facts. \
                         If uncertain or outdated, reply exactly with: '{unknown}' \
                         Keep answers concise."
                    )
                } else {
                    "Answer concisely and factually.".to_string()
                };
                (safety, 0.0)
            }
            Mode::Friendly => ("Be helpful and friendly.".to_string(), cfg.temperature),
        };

        let sys = cfg.system_prompt.trim();

        let mut history_text = String::new();
        if cfg.history_enabled && !history.is_empty() {
            let keep = cfg.max_history_turns * 2;
            let start = history.len().saturating_sub(keep);
            for turn in &history[start..] {
                match turn.role {
                    Role::User => {
                        history_text.push_str(&format!("User: {}\n", turn.content));
                    }
                    Role::Assistant => {
                        history_text.push_str(&format!("Assistant: {}\n", turn.content));
                    }
                }
            }
        }

        let prompt = if history_text.is_empty() {
            format!("{sys}\n{safety}\nUser ({lang_hint}): {user_text}\nAssistant:")
        } else {
            format!("{sys}\n{safety}\n\n{history_text}User: {user_text}\nAssistant:")
        };
        (prompt, temperature)
    }
}

impl ReplyEngine for LlmEngine {
    fn warm_up(&mut self) {
        if !self.cfg.warmup_enabled || self.warmed_up {
            return;
        }
        if self.cfg.provider != "ollama" {
            self.warmed_up = true;
            return;
        }
        let url = format!("{}/api/generate", self.cfg.host.trim_end_matches('/'));
        info!(model = %self.cfg.model, "LLM warm-up start");
        let start = Instant::now();
        let result = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "model": self.cfg.model,
                "prompt": "Hello",
                "stream": false,
                "options": { "num_predict": 5 },
            }))
            .send()
            .and_then(|r| r.error_for_status());
        match result {
            Ok(_) => {
                self.warmed_up = true;
                info!(elapsed_secs = start.elapsed().as_secs_f64(), "LLM warm-up done");
            }
            Err(e) => warn!("LLM warm-up failed: {e}"),
        }
    }

    fn stream(
        &mut self,
        user_text: &str,
        lang_hint: &str,
        mode: Mode,
        history: &[ConversationTurn],
    ) -> Receiver<String> {
        let (tx, rx) = bounded::<String>(64);

        if self.cfg.provider != "ollama" {
            let _ = tx.send(Self::rule_based(user_text, lang_hint));
            return rx;
        }

        let url = format!("{}/api/generate", self.cfg.host.trim_end_matches('/'));
        let (prompt, temperature) = Self::build_prompt(&self.cfg, user_text, lang_hint, mode, history);
        let (top_p, top_k) = match mode {
            Mode::Precise => (0.9, 40),
            Mode::Friendly => (0.95, 50),
        };
        let body = serde_json::json!({
            "model": self.cfg.model,
            "prompt": prompt,
            "stream": true,
            "options": {
                "temperature": temperature,
                "top_p": top_p,
                "top_k": top_k,
                "repeat_penalty": 1.1,
                "num_predict": self.cfg.max_tokens,
            },
        });

        let client = self.client.clone();
        let user_text = user_text.to_string();
        let lang_hint = lang_hint.to_string();

        std::thread::Builder::new()
            .name("llm-stream".into())
            .spawn(move || {
                let start = Instant::now();
                let resp = match client
                    .post(&url)
                    .json(&body)
                    .send()
                    .and_then(|r| r.error_for_status())
                {
                    Ok(r) => r,
                    Err(e) => {
                        error!("Ollama HTTP error: {e}");
                        let _ = tx.send(LlmEngine::rule_based(&user_text, &lang_hint));
                        return;
                    }
                };

                let mut first_token_at: Option<Instant> = None;
                let reader = BufReader::new(resp);
                for line in reader.lines() {
                    let line = match line {
                        Ok(l) if !l.is_empty() => l,
                        Ok(_) => continue,
                        Err(e) => {
                            warn!("Ollama stream read error: {e}");
                            break;
                        }
                    };
                    let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) else {
                        continue;
                    };
                    if let Some(tok) = value["response"].as_str() {
                        if !tok.is_empty() {
                            if first_token_at.is_none() {
                                first_token_at = Some(Instant::now());
                                info!(
                                    secs = start.elapsed().as_secs_f64(),
                                    "LLM first token"
                                );
                            }
                            // Receiver gone = turn cancelled; abandoning the
                            // read drops the connection.
                            if tx.send(tok.to_string()).is_err() {
                                return;
                            }
                        }
                    }
                    if value["done"].as_bool() == Some(true) {
                        break;
                    }
                }
                if first_token_at.is_some() {
                    info!(secs = start.elapsed().as_secs_f64(), "LLM stream completed");
                }
            })
            .expect("spawning llm stream thread");

        rx
    }
}

//! Stream shaping: raw LLM tokens -> sentence-sized TTS chunks.
//!
//! Tokens arrive in irregular dribbles; feeding them straight to TTS
//! causes choppy synthesis. The shaper prebuffers the opening of the
//! reply, then emits chunks on sentence boundaries, on a soft length cap
//! (broken at the nearest space), or after an idle gap. Concatenating all
//! emitted chunks reproduces the input character-for-character.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};

use crate::config::TtsConfig;

#[derive(Debug, Clone)]
pub struct ShaperConfig {
    pub prebuffer_chars: usize,
    pub min_chunk_chars: usize,
    pub soft_max_chars: usize,
    pub max_idle_ms: u64,
}

impl From<&TtsConfig> for ShaperConfig {
    fn from(tts: &TtsConfig) -> Self {
        Self {
            prebuffer_chars: tts.prebuffer_chars,
            min_chunk_chars: tts.min_chunk_chars,
            soft_max_chars: tts.soft_max_chars,
            max_idle_ms: tts.max_idle_ms,
        }
    }
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…' | ';' | '\n')
}

/// Next split point (exclusive char index) in `buf`, or `None` if the
/// buffer should keep accumulating.
fn split_point(buf: &[char], cfg: &ShaperConfig) -> Option<usize> {
    for (i, &c) in buf.iter().enumerate() {
        let len = i + 1;
        if is_terminator(c) && len >= cfg.min_chunk_chars {
            return Some(len);
        }
        if len >= cfg.soft_max_chars {
            // Mid-sentence overflow: break at the nearest space.
            let space = buf[..len].iter().rposition(|&b| b == ' ');
            return Some(match space {
                Some(j) if j > 0 => j + 1,
                _ => len,
            });
        }
    }
    None
}

/// Wrap a raw token stream into a shaped chunk stream.
///
/// Runs on its own thread so the idle flush works off wall-clock gaps.
/// Dropping the returned receiver closes the stage and propagates
/// cancellation upstream (the next send into a closed channel stops the
/// producer).
pub fn shape_stream(tokens: Receiver<String>, cfg: ShaperConfig) -> Receiver<String> {
    let (tx, rx) = bounded::<String>(8);

    std::thread::Builder::new()
        .name("stream-shaper".into())
        .spawn(move || {
            let idle = Duration::from_millis(cfg.max_idle_ms);
            let mut buf: Vec<char> = Vec::new();
            let mut prebuffered = false;

            loop {
                match tokens.recv_timeout(idle) {
                    Ok(tok) => {
                        buf.extend(tok.chars());
                        if !prebuffered && buf.len() >= cfg.prebuffer_chars {
                            prebuffered = true;
                        }
                        if prebuffered {
                            while let Some(end) = split_point(&buf, &cfg) {
                                let chunk: String = buf.drain(..end).collect();
                                if tx.send(chunk).is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        // Keep TTS moving: flush whatever is pending once
                        // the first chunk is out.
                        if prebuffered && !buf.is_empty() {
                            let chunk: String = buf.drain(..).collect();
                            if tx.send(chunk).is_err() {
                                return;
                            }
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        if !buf.is_empty() {
                            let chunk: String = buf.drain(..).collect();
                            let _ = tx.send(chunk);
                        }
                        return;
                    }
                }
            }
        })
        .expect("spawning shaper thread");

    rx
}

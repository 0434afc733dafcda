//! Speech-to-text seam.
//!
//! The engine itself is an external collaborator; this module defines the
//! contract, a blocking HTTP adapter, and a fan-out wrapper that routes
//! partial/final transcripts to registered listeners (fast-exit among
//! them) without displacing each other.

pub mod http;

use std::path::Path;

use anyhow::Result;

/// Transcription result.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    /// ISO-ish language code; the session loop only honors "ro"/"en".
    pub lang: String,
}

/// A partial/final transcript listener. Returning `true` consumes the
/// event and stops propagation to later listeners.
pub type TranscriptListener = Box<dyn Fn(&str) -> bool + Send>;

/// Blocking transcription contract.
pub trait SpeechToText: Send {
    fn transcribe(&mut self, path: &Path, language_override: Option<&str>) -> Result<Transcript>;

    /// Restrict the result language to Romanian/English, defaulting to
    /// English on anything ambiguous.
    fn transcribe_ro_en(&mut self, path: &Path) -> Result<Transcript> {
        let mut t = self.transcribe(path, None)?;
        if t.lang != "ro" && t.lang != "en" {
            t.lang = "en".into();
        }
        Ok(t)
    }
}

/// Listener fan-out around any [`SpeechToText`] engine.
///
/// Listeners are registered at construction time; engines that surface
/// streaming partials call [`emit_partial`](Self::emit_partial), and every
/// final transcript is dispatched before being returned.
pub struct AsrEngine {
    inner: Box<dyn SpeechToText>,
    partial_listeners: Vec<TranscriptListener>,
    final_listeners: Vec<TranscriptListener>,
}

impl AsrEngine {
    pub fn new(inner: Box<dyn SpeechToText>) -> Self {
        Self {
            inner,
            partial_listeners: Vec::new(),
            final_listeners: Vec::new(),
        }
    }

    pub fn on_partial(mut self, listener: TranscriptListener) -> Self {
        self.partial_listeners.push(listener);
        self
    }

    pub fn on_final(mut self, listener: TranscriptListener) -> Self {
        self.final_listeners.push(listener);
        self
    }

    /// Dispatch a partial transcript. Returns `true` if a listener
    /// consumed it.
    pub fn emit_partial(&self, text: &str) -> bool {
        self.partial_listeners.iter().any(|l| l(text))
    }

    fn emit_final(&self, text: &str) -> bool {
        self.final_listeners.iter().any(|l| l(text))
    }
}

impl SpeechToText for AsrEngine {
    fn transcribe(&mut self, path: &Path, language_override: Option<&str>) -> Result<Transcript> {
        let transcript = self.inner.transcribe(path, language_override)?;
        if !transcript.text.is_empty() {
            self.emit_final(&transcript.text);
        }
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedAsr(&'static str, &'static str);

    impl SpeechToText for FixedAsr {
        fn transcribe(
            &mut self,
            _path: &Path,
            _language_override: Option<&str>,
        ) -> Result<Transcript> {
            Ok(Transcript {
                text: self.0.into(),
                lang: self.1.into(),
            })
        }
    }

    #[test]
    fn ro_en_restriction_defaults_to_english() {
        let mut asr = FixedAsr("bonjour", "fr");
        let t = asr.transcribe_ro_en(Path::new("x.wav")).unwrap();
        assert_eq!(t.lang, "en");

        let mut asr = FixedAsr("salut", "ro");
        let t = asr.transcribe_ro_en(Path::new("x.wav")).unwrap();
        assert_eq!(t.lang, "ro");
    }

    #[test]
    fn final_listeners_fire_on_transcribe() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut engine = AsrEngine::new(Box::new(FixedAsr("hello robot", "en"))).on_final(
            Box::new(move |text| {
                assert_eq!(text, "hello robot");
                seen.fetch_add(1, Ordering::SeqCst);
                false
            }),
        );
        engine.transcribe(Path::new("x.wav"), None).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn consuming_listener_stops_propagation() {
        let later = Arc::new(AtomicUsize::new(0));
        let later_seen = Arc::clone(&later);
        let engine = AsrEngine::new(Box::new(FixedAsr("stop robot", "en")))
            .on_partial(Box::new(|_| true))
            .on_partial(Box::new(move |_| {
                later_seen.fetch_add(1, Ordering::SeqCst);
                false
            }));
        assert!(engine.emit_partial("stop robot"));
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }
}

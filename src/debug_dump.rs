//! Per-turn debug dumps.
//!
//! Each spoken turn gets `{data}/debug/YYYYMMDD_HHMMSS/` holding the ASR
//! transcript and the accumulated TTS text. Failures here are logged and
//! swallowed; debugging must never break a session.

use std::path::{Path, PathBuf};

use tracing::warn;

pub struct DebugDump {
    dir: Option<PathBuf>,
}

impl DebugDump {
    /// Create the per-turn directory. On error the dump becomes a no-op.
    pub fn new(data_dir: &Path) -> Self {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let dir = data_dir.join("debug").join(stamp);
        match std::fs::create_dir_all(&dir) {
            Ok(()) => Self { dir: Some(dir) },
            Err(e) => {
                warn!("Could not create debug dir {}: {e}", dir.display());
                Self { dir: None }
            }
        }
    }

    /// No-op dump for callers that have debugging disabled.
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn write_asr(&self, text: &str) {
        self.write("asr.txt", text);
    }

    pub fn write_tts(&self, text: &str) {
        self.write("tts.txt", text);
    }

    fn write(&self, name: &str, text: &str) {
        let Some(dir) = &self.dir else { return };
        let path = dir.join(name);
        if let Err(e) = std::fs::write(&path, text) {
            warn!("Could not write {}: {e}", path.display());
        }
    }
}

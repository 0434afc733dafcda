//! Platform-specific data directory paths.
//!
//!   Windows: %APPDATA%/convo-core/data
//!   macOS:   ~/Library/Application Support/convo-core/data
//!   Linux:   $XDG_CONFIG_HOME/convo-core/data (default ~/.config)

use std::path::{Path, PathBuf};

/// Data directory for config, caches and debug dumps.
pub fn get_data_dir() -> PathBuf {
    get_config_base().join("convo-core").join("data")
}

/// Standby recording buffer path.
pub fn standby_wav(data_dir: &Path) -> PathBuf {
    data_dir.join("cache").join("standby.wav")
}

/// Per-turn user utterance path.
pub fn user_utterance_wav(data_dir: &Path) -> PathBuf {
    data_dir.join("cache").join("user_utt.wav")
}

fn get_config_base() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata);
        }
        dirs::config_dir().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("AppData")
                .join("Roaming")
        })
    }

    #[cfg(target_os = "macos")]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Library")
            .join("Application Support")
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
    }
}

//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Config | `~/Library/Application Support/metasearch/` | `~/.config/metasearch/` |
//! | Data | `~/Library/Application Support/metasearch/` | `~/.local/share/metasearch/` |
//!
//! `METASEARCH_CONFIG_DIR` and `METASEARCH_DATA_DIR` override the defaults.

use std::path::PathBuf;

/// Settings directory. Override with `METASEARCH_CONFIG_DIR`.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("METASEARCH_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("metasearch"))
        .unwrap_or_else(|| PathBuf::from("/tmp/metasearch-config"))
}

/// Data root. Override with `METASEARCH_DATA_DIR`.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("METASEARCH_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("metasearch"))
        .unwrap_or_else(|| PathBuf::from("/tmp/metasearch-data"))
}

/// Default settings file (`config_dir()/settings.toml`).
#[must_use]
pub fn settings_file() -> PathBuf {
    config_dir().join("settings.toml")
}

/// Default rolling log directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

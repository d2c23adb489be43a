//! Centralized application directory paths for the overlay.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! # Environment Overrides
//!
//! - `FAE_OVERLAY_DATA_DIR` overrides [`data_dir`]
//! - `FAE_OVERLAY_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

const APP_DIR: &str = "fae-overlay";

/// Application data root directory (logs, phrase books).
///
/// Resolves to `dirs::data_dir()/fae-overlay/` by default.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("FAE_OVERLAY_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("/tmp/fae-overlay-data"))
}

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/fae-overlay/` by default.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("FAE_OVERLAY_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("/tmp/fae-overlay-config"))
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default phrase book path (`config_dir()/phrases.toml`).
#[must_use]
pub fn phrases_file() -> PathBuf {
    config_dir().join("phrases.toml")
}

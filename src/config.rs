//! Configuration types for the companion overlay.
//!
//! [`OverlayConfig`] is loaded from TOML. The scheduler never caches it:
//! it holds a [`SharedConfig`] and takes a fresh snapshot for every event it
//! processes, so operator changes apply to the very next utterance.

use crate::error::{OverlayError, Result};
use crate::utterance::SourceKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

/// Top-level configuration for the overlay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Optional phrase book file (built-in phrases are used when absent).
    pub phrases_path: Option<PathBuf>,
    /// Delay and duration policy knobs.
    pub pacing: PacingConfig,
    /// Sound/haptic cue cadence and admission rules.
    pub cues: CueConfig,
    /// Async reply gate settings.
    pub reply: ReplyConfig,
    /// Idle chatter timer.
    pub idle: IdleConfig,
    /// Randomized trigger timer.
    pub triggers: TriggerConfig,
}

/// Pacing knobs for the delay and duration policies.
///
/// All times are seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Minimum gap between the end of one utterance and the start of the next.
    pub min_delay_secs: f64,
    /// Extra gap after an AI-sourced utterance.
    pub ai_bonus_secs: f64,
    /// Characters beyond this length add `per_char_delay_secs` each.
    pub long_text_threshold: usize,
    /// Extra gap per character beyond `long_text_threshold`.
    pub per_char_delay_secs: f64,
    /// Base on-screen time per source.
    pub base_duration_secs: SourceDurations,
    /// Extra on-screen time per character.
    pub per_char_duration_secs: f64,
    /// Lower clamp for on-screen time.
    pub min_duration_secs: f64,
    /// Upper clamp for on-screen time.
    pub max_duration_secs: f64,
    /// How long a hovered bubble is held before re-checking.
    pub hover_extension_secs: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_delay_secs: 2.0,
            ai_bonus_secs: 5.0,
            long_text_threshold: 100,
            per_char_delay_secs: 0.02,
            base_duration_secs: SourceDurations::default(),
            per_char_duration_secs: 0.05,
            min_duration_secs: 5.0,
            max_duration_secs: 16.0,
            hover_extension_secs: 1.0,
        }
    }
}

/// Per-source base duration in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceDurations {
    pub preset: f64,
    pub trigger: f64,
    pub ai: f64,
}

impl Default for SourceDurations {
    fn default() -> Self {
        Self {
            preset: 5.0,
            trigger: 5.0,
            ai: 8.0,
        }
    }
}

impl SourceDurations {
    /// Base duration for a given source.
    #[must_use]
    pub fn for_source(&self, source: SourceKind) -> f64 {
        match source {
            SourceKind::Preset => self.preset,
            SourceKind::Trigger => self.trigger,
            SourceKind::Ai => self.ai,
        }
    }
}

/// Cue cadence and admission rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CueConfig {
    /// A preset utterance plays the giggle sound every N-th time (0 = never).
    pub preset_sound_every: u32,
    /// Fire a haptic pattern alongside each sound cue.
    pub haptics_enabled: bool,
    /// Discard preset utterances while an AI utterance is on screen.
    pub suppress_presets_during_ai: bool,
}

impl Default for CueConfig {
    fn default() -> Self {
        Self {
            preset_sound_every: 5,
            haptics_enabled: true,
            suppress_presets_during_ai: true,
        }
    }
}

/// Async reply gate settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyConfig {
    /// Provider calls longer than this resolve to a fallback phrase.
    pub timeout_secs: u64,
    /// Drop replies that resolve after a newer priority utterance was shown.
    ///
    /// Off by default: a late reply is shown anyway.
    pub discard_stale_replies: bool,
    /// Show a short "thinking" phrase while the reply is pending.
    pub thinking_placeholder: bool,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            discard_stale_replies: false,
            thinking_placeholder: true,
        }
    }
}

/// Idle chatter timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    pub enabled: bool,
    /// Seconds between idle phrases.
    pub interval_secs: u64,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
        }
    }
}

/// Randomized trigger timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub enabled: bool,
    pub min_interval_secs: u64,
    pub max_interval_secs: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_secs: 600,
            max_interval_secs: 1800,
        }
    }
}

impl OverlayConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| OverlayError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| OverlayError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config_dir>/config.toml`.
    pub fn default_config_path() -> PathBuf {
        crate::overlay_dirs::config_file()
    }
}

/// Runtime-mutable configuration shared between the scheduler and operators.
///
/// Every change bumps a revision counter; receivers from
/// [`SharedConfig::subscribe`] wake on it, so a waiting scheduler re-derives
/// its pending delay at once.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<OverlayConfig>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(OverlayConfig::default())
    }
}

impl SharedConfig {
    pub fn new(config: OverlayConfig) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(config)),
            revision: Arc::new(revision),
        }
    }

    /// Receiver that wakes after every change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Copy of the current configuration.
    #[must_use]
    pub fn snapshot(&self) -> OverlayConfig {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Mutate the configuration in place.
    pub fn update(&self, f: impl FnOnce(&mut OverlayConfig)) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
        drop(guard);
        self.revision.send_modify(|rev| *rev = rev.wrapping_add(1));
    }

    /// Replace the whole configuration.
    pub fn replace(&self, config: OverlayConfig) {
        self.update(|current| *current = config);
    }

    /// Set a single value addressed by a dotted key, e.g. `pacing.min_delay_secs`.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError::Config`] if the key does not exist or the
    /// patched config no longer deserializes. The config is left untouched.
    pub fn patch(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let current = self.snapshot();
        let mut tree = serde_json::to_value(&current)
            .map_err(|e| OverlayError::Config(format!("cannot serialize config: {e}")))?;

        let pointer = format!("/{}", key.trim().replace('.', "/"));
        let slot = tree
            .pointer_mut(&pointer)
            .ok_or_else(|| OverlayError::Config(format!("unknown config key '{key}'")))?;
        *slot = value;

        let patched: OverlayConfig = serde_json::from_value(tree)
            .map_err(|e| OverlayError::Config(format!("invalid value for '{key}': {e}")))?;
        self.replace(patched);
        Ok(())
    }

    /// Read a single value addressed by a dotted key, or the whole config.
    pub fn get(&self, key: Option<&str>) -> Result<serde_json::Value> {
        let tree = serde_json::to_value(self.snapshot())
            .map_err(|e| OverlayError::Config(format!("cannot serialize config: {e}")))?;
        let Some(key) = key else {
            return Ok(tree);
        };
        let pointer = format!("/{}", key.trim().replace('.', "/"));
        tree.pointer(&pointer)
            .cloned()
            .ok_or_else(|| OverlayError::Config(format!("unknown config key '{key}'")))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = OverlayConfig::default();
        assert!(config.pacing.min_duration_secs <= config.pacing.max_duration_secs);
        assert!(config.pacing.base_duration_secs.ai > config.pacing.base_duration_secs.preset);
        assert_eq!(config.cues.preset_sound_every, 5);
        assert!(!config.reply.discard_stale_replies);
        assert!(config.triggers.min_interval_secs <= config.triggers.max_interval_secs);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");

        let mut config = OverlayConfig::default();
        config.pacing.min_delay_secs = 3.5;
        config.cues.preset_sound_every = 7;
        config.phrases_path = Some(PathBuf::from("/tmp/phrases.toml"));

        config.save_to_file(&path).expect("save");
        let loaded = OverlayConfig::from_file(&path).expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let loaded: OverlayConfig = toml::from_str(
            "[pacing]\nmin_delay_secs = 1.0\n\n[pacing.base_duration_secs]\nai = 12.0\n",
        )
        .expect("parse");
        assert!((loaded.pacing.min_delay_secs - 1.0).abs() < f64::EPSILON);
        assert!((loaded.pacing.base_duration_secs.ai - 12.0).abs() < f64::EPSILON);
        assert!((loaded.pacing.base_duration_secs.preset - 5.0).abs() < f64::EPSILON);
        assert_eq!(loaded.cues, CueConfig::default());
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").expect("write");
        assert!(matches!(
            OverlayConfig::from_file(&path),
            Err(OverlayError::Config(_))
        ));
    }

    #[test]
    fn from_file_nonexistent_returns_io_error() {
        let result = OverlayConfig::from_file(Path::new("/nonexistent/path/config.toml"));
        assert!(matches!(result, Err(OverlayError::Io(_))));
    }

    #[test]
    fn shared_config_updates_are_visible_to_snapshots() {
        let shared = SharedConfig::new(OverlayConfig::default());
        let reader = shared.clone();
        shared.update(|c| c.pacing.ai_bonus_secs = 9.0);
        assert!((reader.snapshot().pacing.ai_bonus_secs - 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn every_change_bumps_revision() {
        let shared = SharedConfig::default();
        let mut rx = shared.subscribe();
        assert!(!rx.has_changed().unwrap());

        shared.update(|c| c.pacing.min_delay_secs = 1.0);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 1);

        shared.patch("idle.enabled", serde_json::json!(false)).expect("patch");
        assert_eq!(*rx.borrow_and_update(), 2);
    }

    #[test]
    fn patch_sets_nested_value() {
        let shared = SharedConfig::default();
        shared
            .patch("pacing.base_duration_secs.trigger", serde_json::json!(6.5))
            .expect("patch");
        assert!((shared.snapshot().pacing.base_duration_secs.trigger - 6.5).abs() < f64::EPSILON);
        assert_eq!(
            shared.get(Some("pacing.base_duration_secs.trigger")).expect("get"),
            serde_json::json!(6.5)
        );
    }

    #[test]
    fn patch_rejects_unknown_key_and_bad_type() {
        let shared = SharedConfig::default();
        assert!(shared.patch("pacing.nope", serde_json::json!(1)).is_err());
        assert!(
            shared
                .patch("cues.preset_sound_every", serde_json::json!("often"))
                .is_err()
        );
        assert_eq!(shared.snapshot(), OverlayConfig::default());
    }
}

//! Authored phrases for preset and trigger utterances.

use crate::error::{OverlayError, Result};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Which list a phrase is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhraseCategory {
    /// Periodic idle chatter.
    Idle,
    /// Response to the user clicking the companion.
    Click,
    /// Random trigger timer.
    Trigger,
    /// Placeholder shown while a reply is pending.
    Thinking,
    /// Shown when a reply request fails.
    Fallback,
}

impl PhraseCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Click => "click",
            Self::Trigger => "trigger",
            Self::Thinking => "thinking",
            Self::Fallback => "fallback",
        }
    }
}

/// Phrase lists per category plus feature-event hooks.
///
/// Loaded from TOML; any list missing from the file keeps its built-in
/// default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhraseBook {
    pub idle: Vec<String>,
    pub click: Vec<String>,
    pub trigger: Vec<String>,
    pub thinking: Vec<String>,
    pub fallback: Vec<String>,
    /// Feature event name to the phrases it may fire.
    pub hooks: BTreeMap<String, Vec<String>>,
}

fn owned(phrases: &[&str]) -> Vec<String> {
    phrases.iter().map(|p| (*p).to_owned()).collect()
}

impl Default for PhraseBook {
    fn default() -> Self {
        let mut hooks = BTreeMap::new();
        hooks.insert(
            "build.failed".to_owned(),
            owned(&["Oof, the build broke.", "Red build. Want to look together?"]),
        );
        hooks.insert(
            "build.succeeded".to_owned(),
            owned(&["Green build!", "It compiles. Ship it?"]),
        );
        hooks.insert(
            "focus.long_session".to_owned(),
            owned(&["You've been at this a while. Stretch?"]),
        );

        Self {
            idle: owned(&[
                "Still here if you need me.",
                "Just keeping you company.",
                "Hmm hmm hmm...",
                "Did you drink some water today?",
            ]),
            click: owned(&["Hi!", "Hehe, that tickles.", "Need something?", "Boop."]),
            trigger: owned(&[
                "Oh! I just remembered something.",
                "Psst. Take a break soon?",
                "Guess what? Nothing. Just saying hi.",
            ]),
            thinking: owned(&["Hmm, let me think...", "Thinking..."]),
            fallback: owned(&[
                "Hmm, I lost my train of thought.",
                "Sorry, my brain hiccuped. Try again?",
            ]),
            hooks,
        }
    }
}

impl PhraseBook {
    /// Parse a phrase book from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| OverlayError::Phrases(format!("{}: {e}", path.display())))
    }

    /// Load `path` (or `phrases.toml` in the config directory) when it
    /// exists, otherwise the built-in phrases.
    ///
    /// A file that fails to parse is logged and ignored.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = path.map_or_else(crate::overlay_dirs::phrases_file, Path::to_path_buf);
        let path = path.as_path();
        if !path.exists() {
            info!("no phrase book at {}; using built-in phrases", path.display());
            return Self::default();
        }
        match Self::from_file(path) {
            Ok(book) => book,
            Err(e) => {
                warn!("ignoring phrase book: {e}");
                Self::default()
            }
        }
    }

    pub fn phrases(&self, category: PhraseCategory) -> &[String] {
        match category {
            PhraseCategory::Idle => &self.idle,
            PhraseCategory::Click => &self.click,
            PhraseCategory::Trigger => &self.trigger,
            PhraseCategory::Thinking => &self.thinking,
            PhraseCategory::Fallback => &self.fallback,
        }
    }

    /// Uniformly random phrase from `category`, or `None` if the list is empty.
    pub fn pick(&self, category: PhraseCategory) -> Option<String> {
        choose(self.phrases(category))
    }

    /// Uniformly random phrase registered for a feature event.
    pub fn pick_hook(&self, event: &str) -> Option<String> {
        self.hooks.get(event).and_then(|phrases| choose(phrases))
    }
}

fn choose(phrases: &[String]) -> Option<String> {
    phrases
        .choose(&mut rand::thread_rng())
        .filter(|p| !p.trim().is_empty())
        .cloned()
}

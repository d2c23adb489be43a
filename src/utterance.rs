//! The unit of text shown on the companion's display surface.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Producer category of an utterance.
///
/// Governs admission priority, pacing bonuses, and which cue accompanies
/// the text when it renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Authored phrase (idle chatter, click responses, placeholders).
    Preset,
    /// Phrase fired by a randomized trigger timer or a feature hook.
    Trigger,
    /// Reply produced by the language model.
    Ai,
}

impl SourceKind {
    /// Wire name used in config keys, events, and host payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preset => "preset",
            Self::Trigger => "trigger",
            Self::Ai => "ai",
        }
    }

    /// Parse a source name, accepting a few informal aliases.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "preset" | "phrase" => Some(Self::Preset),
            "trigger" | "hook" => Some(Self::Trigger),
            "ai" | "llm" | "reply" => Some(Self::Ai),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable value produced by a source adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    /// Text to display.
    pub content: String,
    /// Which producer created it.
    pub source: SourceKind,
    /// When the utterance entered the scheduler.
    pub enqueued_at: Instant,
}

impl Utterance {
    /// Create an utterance stamped with the current (tokio) time.
    pub fn new(content: impl Into<String>, source: SourceKind) -> Self {
        Self::at(content, source, Instant::now())
    }

    /// Create an utterance with an explicit enqueue time.
    pub fn at(content: impl Into<String>, source: SourceKind, enqueued_at: Instant) -> Self {
        Self {
            content: content.into(),
            source,
            enqueued_at,
        }
    }

    /// Length in characters, as used by the pacing policies.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_parses_aliases() {
        assert_eq!(SourceKind::parse("AI"), Some(SourceKind::Ai));
        assert_eq!(SourceKind::parse(" hook "), Some(SourceKind::Trigger));
        assert_eq!(SourceKind::parse("preset"), Some(SourceKind::Preset));
        assert_eq!(SourceKind::parse("bogus"), None);
    }

    #[test]
    fn source_kind_serializes_snake_case() {
        let json = serde_json::to_string(&SourceKind::Ai).unwrap_or_default();
        assert_eq!(json, "\"ai\"");
    }

    #[test]
    fn char_len_counts_characters_not_bytes() {
        let u = Utterance::new("héllo ✨", SourceKind::Preset);
        assert_eq!(u.char_len(), 7);
    }
}

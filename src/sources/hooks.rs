//! Event-driven sources: user clicks and feature hooks.

use crate::error::Result;
use crate::scheduler::SchedulerHandle;
use crate::sources::phrases::{PhraseBook, PhraseCategory};
use crate::utterance::SourceKind;
use std::sync::Arc;
use tracing::debug;

/// Turns clicks on the companion into preset utterances.
#[derive(Debug, Clone)]
pub struct ClickAdapter {
    handle: SchedulerHandle,
    phrases: Arc<PhraseBook>,
}

impl ClickAdapter {
    pub fn new(handle: SchedulerHandle, phrases: Arc<PhraseBook>) -> Self {
        Self { handle, phrases }
    }

    /// Enqueue a click phrase. Returns the phrase, or `None` when the book
    /// has no click phrases.
    pub fn click(&self) -> Result<Option<String>> {
        let Some(text) = self.phrases.pick(PhraseCategory::Click) else {
            return Ok(None);
        };
        self.handle.enqueue(text.clone(), SourceKind::Preset)?;
        Ok(Some(text))
    }
}

/// Maps named feature events (`build.failed`, ...) to trigger utterances.
#[derive(Debug, Clone)]
pub struct HookRouter {
    handle: SchedulerHandle,
    phrases: Arc<PhraseBook>,
}

impl HookRouter {
    pub fn new(handle: SchedulerHandle, phrases: Arc<PhraseBook>) -> Self {
        Self { handle, phrases }
    }

    /// Event names with at least one registered phrase.
    pub fn events(&self) -> Vec<String> {
        self.phrases
            .hooks
            .iter()
            .filter(|(_, phrases)| !phrases.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Enqueue a trigger phrase for `event`. Unknown events are ignored and
    /// return `None`.
    pub fn fire(&self, event: &str) -> Result<Option<String>> {
        let Some(text) = self.phrases.pick_hook(event.trim()) else {
            debug!("no phrases for hook '{event}'");
            return Ok(None);
        };
        self.handle.enqueue(text.clone(), SourceKind::Trigger)?;
        Ok(Some(text))
    }
}

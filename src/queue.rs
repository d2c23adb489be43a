//! FIFO holding area for utterances waiting to be displayed.

use crate::utterance::{SourceKind, Utterance};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Why an utterance was refused at the door.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// An async reply is pending; the reply takes the surface next.
    AwaitingReply,
    /// A preset arrived while an AI utterance was on screen.
    PresetDuringAi,
    /// Text was empty after trimming.
    Empty,
}

impl DropReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingReply => "awaiting_reply",
            Self::PresetDuringAi => "preset_during_ai",
            Self::Empty => "empty",
        }
    }
}

/// Result of offering an utterance to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Appended to the tail; `depth` is the queue length afterwards.
    Queued { depth: usize },
    /// Silently discarded.
    Dropped(DropReason),
}

/// What the queue needs to know about the scheduler to admit an utterance.
#[derive(Debug, Clone, Copy, Default)]
pub struct Admission {
    /// An async reply request is outstanding.
    pub awaiting_reply: bool,
    /// Source of the utterance currently on screen, if any.
    pub displaying: Option<SourceKind>,
    /// Apply the preset-during-AI suppression rule.
    pub suppress_presets_during_ai: bool,
}

/// Ordered FIFO of pending utterances.
#[derive(Debug, Default)]
pub struct UtteranceQueue {
    pending: VecDeque<Utterance>,
}

impl UtteranceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply the admission rules and append to the tail when accepted.
    pub fn offer(&mut self, utterance: Utterance, admission: Admission) -> EnqueueOutcome {
        if utterance.content.trim().is_empty() {
            return EnqueueOutcome::Dropped(DropReason::Empty);
        }
        if admission.awaiting_reply {
            return EnqueueOutcome::Dropped(DropReason::AwaitingReply);
        }
        if admission.suppress_presets_during_ai
            && utterance.source == SourceKind::Preset
            && admission.displaying == Some(SourceKind::Ai)
        {
            return EnqueueOutcome::Dropped(DropReason::PresetDuringAi);
        }

        self.pending.push_back(utterance);
        EnqueueOutcome::Queued {
            depth: self.pending.len(),
        }
    }

    pub fn pop_next(&mut self) -> Option<Utterance> {
        self.pending.pop_front()
    }

    /// Empty the queue, returning how many utterances were discarded.
    pub fn clear(&mut self) -> usize {
        let cleared = self.pending.len();
        self.pending.clear();
        cleared
    }

    /// Pending texts in display order.
    pub fn texts(&self) -> Vec<String> {
        self.pending.iter().map(|u| u.content.clone()).collect()
    }
}

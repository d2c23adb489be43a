//! Runtime events emitted by the scheduler for UI and observability.
//!
//! Events are small and cloneable; they are broadcast without blocking the
//! scheduler, and sending with no subscribers is fine.

use crate::effects::{HapticPattern, SoundKind};
use crate::queue::DropReason;
use crate::utterance::SourceKind;
use serde::Serialize;

/// What the scheduler just did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverlayEvent {
    /// Text went onto the display surface.
    Rendered {
        text: String,
        source: SourceKind,
        duration_ms: u64,
    },
    /// The display surface was cleared.
    Hidden,
    /// An utterance was consumed without rendering because the gate was closed.
    Skipped { source: SourceKind, chars: usize },
    /// An utterance was refused before reaching the queue.
    Dropped {
        source: SourceKind,
        reason: DropReason,
    },
    /// A priority utterance discarded pending items.
    QueueCleared { dropped: usize },
    /// The pointer held the bubble open past its dismissal time.
    HeldOpen { extension_ms: u64 },
    /// A sound (and optional haptic) accompanied a render.
    Cue {
        sound: SoundKind,
        haptic: Option<HapticPattern>,
    },
    /// An async reply request was issued.
    ReplyRequested { generation: u64 },
    /// The await window closed and the reply (or its fallback) was shown.
    ReplyResolved { generation: u64, fallback: bool },
    /// A reply arrived after a newer priority utterance and was dropped.
    ReplyDiscarded { generation: u64 },
    /// An ask arrived while another reply was still pending.
    ReplyRejected,
}

impl OverlayEvent {
    /// Wire name used by the host event stream.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rendered { .. } => "surface.render",
            Self::Hidden => "surface.hide",
            Self::Skipped { .. } => "utterance.skipped",
            Self::Dropped { .. } => "utterance.dropped",
            Self::QueueCleared { .. } => "queue.cleared",
            Self::HeldOpen { .. } => "surface.held_open",
            Self::Cue { .. } => "cue.sound",
            Self::ReplyRequested { .. } => "reply.requested",
            Self::ReplyResolved { .. } => "reply.resolved",
            Self::ReplyDiscarded { .. } => "reply.discarded",
            Self::ReplyRejected => "reply.rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn rendered_serializes_with_kind_tag() {
        let event = OverlayEvent::Rendered {
            text: "hi".to_owned(),
            source: SourceKind::Ai,
            duration_ms: 8000,
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"kind": "rendered", "text": "hi", "source": "ai", "duration_ms": 8000})
        );
        assert_eq!(event.name(), "surface.render");
    }

    #[test]
    fn dropped_reason_is_snake_case() {
        let event = OverlayEvent::Dropped {
            source: SourceKind::Preset,
            reason: DropReason::PresetDuringAi,
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["reason"], "preset_during_ai");
    }
}

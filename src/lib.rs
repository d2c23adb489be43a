//! Fae overlay: utterance scheduling for an on-screen desktop companion.
//!
//! Several producers want to put short text into the companion's single
//! speech bubble: idle chatter, click responses, random triggers, feature
//! hooks and language-model replies. This crate decides what is shown, when,
//! and for how long.
//!
//! # Architecture
//!
//! - **Sources** (`sources`): adapters that only produce utterances
//! - **Scheduler** (`scheduler`): one tokio task owning a pure state machine
//!   with a FIFO queue, pacing delays, dismissal timers, and an async reply gate
//! - **Effects** (`effects`): display, sound and haptic traits driven
//!   best-effort by the scheduler
//! - **Host bridge** (`host`): versioned JSON envelopes so a native shell can
//!   own the actual window

pub mod config;
pub mod effects;
pub mod error;
pub mod gate;
pub mod host;
pub mod overlay_dirs;
pub mod pacing;
pub mod queue;
pub mod runtime;
pub mod scheduler;
pub mod sources;
pub mod utterance;

pub use config::{OverlayConfig, SharedConfig};
pub use effects::{DisplaySurface, Effectors, Haptics, SoundKind, SoundPlayer};
pub use error::{OverlayError, Result};
pub use runtime::OverlayEvent;
pub use scheduler::{ReplyProvider, SchedulerHandle, SchedulerSnapshot, UtteranceScheduler};
pub use sources::{ClickAdapter, HookRouter, PhraseBook};
pub use utterance::{SourceKind, Utterance};

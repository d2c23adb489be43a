//! Utterance scheduler.
//!
//! A pure state machine ([`state`]) owned by a single tokio task
//! ([`runner`]), plus the async reply gate ([`reply`]).

pub mod reply;
pub mod runner;
pub mod state;

pub use reply::{CannedReplyProvider, ReplyProvider, UnavailableReplyProvider};
pub use runner::{SchedulerCommand, SchedulerHandle, UtteranceScheduler};
pub use state::{Effect, Phase, SchedulerSnapshot, SchedulerState};

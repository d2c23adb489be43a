//! Utterance source adapters.
//!
//! Sources only produce utterances; every one goes through a
//! [`SchedulerHandle`](crate::scheduler::SchedulerHandle).

pub mod hooks;
pub mod phrases;
pub mod timers;

pub use hooks::{ClickAdapter, HookRouter};
pub use phrases::{PhraseBook, PhraseCategory};
pub use timers::{spawn_idle_chatter, spawn_random_triggers};

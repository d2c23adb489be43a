//! Timer-driven sources: idle chatter and random triggers.
//!
//! Both loops read the configuration fresh on every cycle, so interval and
//! enable changes apply from the next wait onward.

use crate::config::{SharedConfig, TriggerConfig};
use crate::scheduler::SchedulerHandle;
use crate::sources::phrases::{PhraseBook, PhraseCategory};
use crate::utterance::SourceKind;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Enqueue an idle preset phrase every `idle.interval_secs`.
pub fn spawn_idle_chatter(
    handle: SchedulerHandle,
    config: SharedConfig,
    phrases: Arc<PhraseBook>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("idle chatter started");
        loop {
            let wait = Duration::from_secs(config.snapshot().idle.interval_secs.max(1));
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }
            if !config.snapshot().idle.enabled {
                continue;
            }
            let Some(text) = phrases.pick(PhraseCategory::Idle) else {
                continue;
            };
            if handle.enqueue(text, SourceKind::Preset).is_err() {
                debug!("scheduler gone; stopping idle chatter");
                break;
            }
        }
    })
}

/// Enqueue a trigger phrase after each uniformly random interval in
/// `[min_interval_secs, max_interval_secs]`.
pub fn spawn_random_triggers(
    handle: SchedulerHandle,
    config: SharedConfig,
    phrases: Arc<PhraseBook>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("random triggers started");
        loop {
            let wait = trigger_interval(&config.snapshot().triggers);
            debug!("next random trigger in {}s", wait.as_secs());
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }
            if !config.snapshot().triggers.enabled {
                continue;
            }
            let Some(text) = phrases.pick(PhraseCategory::Trigger) else {
                continue;
            };
            if handle.enqueue(text, SourceKind::Trigger).is_err() {
                debug!("scheduler gone; stopping random triggers");
                break;
            }
        }
    })
}

/// Draw the next trigger wait. Reversed bounds are swapped; the wait is at
/// least one second.
pub fn trigger_interval(cfg: &TriggerConfig) -> Duration {
    let lo = cfg.min_interval_secs.min(cfg.max_interval_secs).max(1);
    let hi = cfg.min_interval_secs.max(cfg.max_interval_secs).max(lo);
    Duration::from_secs(rand::thread_rng().gen_range(lo..=hi))
}

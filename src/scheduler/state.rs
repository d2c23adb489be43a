//! Single-owner utterance scheduling state machine.
//!
//! [`SchedulerState`] is pure: every transition takes the current time and a
//! configuration snapshot and returns the [`Effect`]s the owner must carry
//! out. It never sleeps and never touches an effector. Pending waits are a
//! single deadline exposed by [`SchedulerState::next_deadline`]; cancelling
//! a delay or dismissal is simply replacing the stage that owns it.
//!
//! ```text
//!            enqueue (delay pending)            deadline
//!   Idle ───────────────────────────▶ Delaying ─────────┐
//!    ▲  │ enqueue (delay satisfied)                     ▼
//!    │  └──────────────────────────────────────▶ gate ─┬─▶ Displaying
//!    │                                  ineligible │   │      │
//!    └──────────── finalize ◀──────────────────────┘   │      │ deadline, not hovered
//!    └──────────── finalize ◀──────────────────────────┼──────┘
//!                                   priority (any) ────┘
//! ```

use crate::config::OverlayConfig;
use crate::effects::{Cue, CueSelector};
use crate::gate::SurfaceState;
use crate::pacing::{required_delay, required_duration, secs};
use crate::queue::{Admission, DropReason, EnqueueOutcome, UtteranceQueue};
use crate::scheduler::reply::ReplyStamp;
use crate::utterance::{SourceKind, Utterance};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Shortest hover hold, so a zero extension cannot spin the owner loop.
const MIN_HOVER_HOLD: Duration = Duration::from_millis(100);

/// Stand-in for "never" when a configured duration overflows `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(365 * 24 * 3600);

/// Coarse scheduler phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Delaying,
    Displaying,
}

/// Work the owner of the state must perform after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Show text on the display surface for `duration`.
    Render {
        text: String,
        source: SourceKind,
        duration: Duration,
    },
    /// Take the current text off the display surface.
    Hide,
    /// Fire a sound (and optional haptic).
    Cue(Cue),
    /// An utterance was consumed without rendering (muted or hidden).
    Skipped { source: SourceKind, chars: usize },
    /// An utterance was refused or discarded before display.
    Dropped {
        source: SourceKind,
        reason: DropReason,
    },
    /// A priority utterance emptied the queue.
    QueueCleared { dropped: usize },
    /// The pointer is over the bubble; dismissal postponed.
    HeldOpen { extension: Duration },
}

/// What happened to a finished reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyDisposition {
    /// Pushed through priority display.
    Shown(Vec<Effect>),
    /// A newer priority utterance superseded it and stale replies are discarded.
    Discarded,
}

/// Bookkeeping for the utterance that most recently finished its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Completion {
    ended_at: Instant,
    source: SourceKind,
    length: usize,
}

#[derive(Debug, Default)]
enum Stage {
    #[default]
    Idle,
    Delaying {
        until: Instant,
    },
    Displaying {
        utterance: Utterance,
        dismiss_at: Instant,
    },
}

/// Serializable view of the scheduler for status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub phase: Phase,
    /// Text currently on the display surface.
    pub displayed: Option<String>,
    pub displayed_source: Option<SourceKind>,
    /// Pending texts in display order.
    pub queued: Vec<String>,
    pub awaiting_reply: bool,
    pub last_source: Option<SourceKind>,
    pub last_length: Option<usize>,
    /// Utterances that finished their lifecycle, rendered or skipped.
    pub completed: u64,
    pub surface: SurfaceState,
}

/// Scheduler state, owned and mutated by exactly one task.
#[derive(Debug, Default)]
pub struct SchedulerState {
    queue: UtteranceQueue,
    stage: Stage,
    awaiting_reply: bool,
    last: Option<Completion>,
    surface: SurfaceState,
    cues: CueSelector,
    /// Bumped by every priority display; stamps replies for staleness.
    priority_epoch: u64,
    reply_generation: u64,
    completed: u64,
}

impl SchedulerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        match self.stage {
            Stage::Idle => Phase::Idle,
            Stage::Delaying { .. } => Phase::Delaying,
            Stage::Displaying { .. } => Phase::Displaying,
        }
    }

    pub fn awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    pub fn surface(&self) -> SurfaceState {
        self.surface
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Number of utterances that finished their lifecycle.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// When the last finished utterance ended.
    pub fn last_display_ended_at(&self) -> Option<Instant> {
        self.last.map(|l| l.ended_at)
    }

    /// The single pending wake-up: end of the current delay or dismissal.
    pub fn next_deadline(&self) -> Option<Instant> {
        match &self.stage {
            Stage::Idle => None,
            Stage::Delaying { until } => Some(*until),
            Stage::Displaying { dismiss_at, .. } => Some(*dismiss_at),
        }
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let (displayed, displayed_source) = match &self.stage {
            Stage::Displaying { utterance, .. } => {
                (Some(utterance.content.clone()), Some(utterance.source))
            }
            _ => (None, None),
        };
        SchedulerSnapshot {
            phase: self.phase(),
            displayed,
            displayed_source,
            queued: self.queue.texts(),
            awaiting_reply: self.awaiting_reply,
            last_source: self.last.map(|l| l.source),
            last_length: self.last.map(|l| l.length),
            completed: self.completed,
            surface: self.surface,
        }
    }

    /// Offer an utterance through the normal, paced path.
    pub fn enqueue(&mut self, utterance: Utterance, now: Instant, cfg: &OverlayConfig) -> Vec<Effect> {
        let mut out = Vec::new();
        let source = utterance.source;
        let admission = Admission {
            awaiting_reply: self.awaiting_reply,
            displaying: self.displaying_source(),
            suppress_presets_during_ai: cfg.cues.suppress_presets_during_ai,
        };

        match self.queue.offer(utterance, admission) {
            EnqueueOutcome::Queued { depth } => {
                debug!("queued {source} utterance (depth {depth})");
                self.pump(now, cfg, &mut out);
            }
            EnqueueOutcome::Dropped(reason) => {
                debug!("dropped {source} utterance: {}", reason.as_str());
                out.push(Effect::Dropped { source, reason });
            }
        }
        out
    }

    /// Preempt everything and display `utterance` now, subject only to the gate.
    ///
    /// Clears the awaiting-reply flag, empties the queue, and cancels any
    /// pending delay or dismissal.
    pub fn priority_show(
        &mut self,
        utterance: Utterance,
        play_sound: bool,
        now: Instant,
        cfg: &OverlayConfig,
    ) -> Vec<Effect> {
        let mut out = Vec::new();
        self.awaiting_reply = false;
        self.priority_epoch = self.priority_epoch.wrapping_add(1);

        let dropped = self.queue.clear();
        if dropped > 0 {
            out.push(Effect::QueueCleared { dropped });
        }

        if let Stage::Displaying { utterance: current, .. } = std::mem::take(&mut self.stage) {
            out.push(Effect::Hide);
            self.complete(current.source, current.char_len(), now);
        }

        if utterance.content.trim().is_empty() {
            out.push(Effect::Dropped {
                source: utterance.source,
                reason: DropReason::Empty,
            });
        } else {
            self.present(utterance, play_sound, now, cfg, &mut out);
        }
        self.pump(now, cfg, &mut out);
        out
    }

    /// The pending deadline may have passed; advance the machine.
    pub fn on_timer(&mut self, now: Instant, cfg: &OverlayConfig) -> Vec<Effect> {
        let mut out = Vec::new();
        match &mut self.stage {
            Stage::Idle => {}
            Stage::Delaying { .. } => self.pump(now, cfg, &mut out),
            Stage::Displaying { dismiss_at, .. } => {
                if now < *dismiss_at {
                    return out;
                }
                if self.surface.hovered {
                    let extension = secs(cfg.pacing.hover_extension_secs).max(MIN_HOVER_HOLD);
                    *dismiss_at = deadline_after(now, extension);
                    out.push(Effect::HeldOpen { extension });
                    return out;
                }
                self.finish_display(now, cfg, &mut out);
            }
        }
        out
    }

    /// Re-run the pacing decision after the configuration changed.
    ///
    /// Only a pending delay is affected; an utterance on screen keeps the
    /// duration it was rendered with.
    pub fn reevaluate(&mut self, now: Instant, cfg: &OverlayConfig) -> Vec<Effect> {
        let mut out = Vec::new();
        self.pump(now, cfg, &mut out);
        out
    }

    pub fn set_muted(&mut self, muted: bool, now: Instant, cfg: &OverlayConfig) -> Vec<Effect> {
        self.surface.muted = muted;
        self.on_gate_change(now, cfg)
    }

    pub fn set_surface_visible(
        &mut self,
        visible: bool,
        now: Instant,
        cfg: &OverlayConfig,
    ) -> Vec<Effect> {
        self.surface.visible = visible;
        self.on_gate_change(now, cfg)
    }

    /// Hover only affects the next dismissal check.
    pub fn set_hovered(&mut self, hovered: bool) {
        self.surface.hovered = hovered;
    }

    /// Open an await window for an async reply.
    ///
    /// The optional placeholder goes through the normal path before the
    /// flag is raised. Returns `None` when a reply is already pending.
    pub fn begin_reply(
        &mut self,
        placeholder: Option<Utterance>,
        now: Instant,
        cfg: &OverlayConfig,
    ) -> Option<(ReplyStamp, Vec<Effect>)> {
        if self.awaiting_reply {
            return None;
        }
        let effects = match placeholder {
            Some(p) => self.enqueue(p, now, cfg),
            None => Vec::new(),
        };
        self.awaiting_reply = true;
        self.reply_generation = self.reply_generation.wrapping_add(1);
        let stamp = ReplyStamp {
            generation: self.reply_generation,
            epoch: self.priority_epoch,
        };
        Some((stamp, effects))
    }

    /// Close the await window opened for `stamp` by showing `text`.
    pub fn finish_reply(
        &mut self,
        stamp: ReplyStamp,
        text: String,
        now: Instant,
        cfg: &OverlayConfig,
    ) -> ReplyDisposition {
        if cfg.reply.discard_stale_replies && stamp.epoch != self.priority_epoch {
            debug!(
                "discarding stale reply {} (epoch {} != {})",
                stamp.generation, stamp.epoch, self.priority_epoch
            );
            return ReplyDisposition::Discarded;
        }
        let reply = Utterance::at(text, SourceKind::Ai, now);
        ReplyDisposition::Shown(self.priority_show(reply, true, now, cfg))
    }

    fn displaying_source(&self) -> Option<SourceKind> {
        match &self.stage {
            Stage::Displaying { utterance, .. } => Some(utterance.source),
            _ => None,
        }
    }

    fn ready_at(&self, cfg: &OverlayConfig) -> Option<Instant> {
        self.last.map(|l| {
            deadline_after(
                l.ended_at,
                required_delay(l.source, l.length, &cfg.pacing),
            )
        })
    }

    /// Move queued utterances toward the display unless one is on screen.
    ///
    /// A pending delay is re-derived from `cfg` on every call, so pacing
    /// changes shorten or lengthen a wait that is already running.
    fn pump(&mut self, now: Instant, cfg: &OverlayConfig, out: &mut Vec<Effect>) {
        while !matches!(self.stage, Stage::Displaying { .. }) {
            if self.queue.is_empty() {
                self.stage = Stage::Idle;
                return;
            }
            if let Some(ready_at) = self.ready_at(cfg) {
                if now < ready_at {
                    self.stage = Stage::Delaying { until: ready_at };
                    return;
                }
            }
            self.stage = Stage::Idle;
            let Some(next) = self.queue.pop_next() else {
                return;
            };
            self.present(next, true, now, cfg, out);
        }
    }

    /// Gate check, cue, and render. Ineligible utterances are consumed at once.
    fn present(
        &mut self,
        utterance: Utterance,
        play_sound: bool,
        now: Instant,
        cfg: &OverlayConfig,
        out: &mut Vec<Effect>,
    ) {
        let source = utterance.source;
        let chars = utterance.char_len();

        if !self.surface.is_eligible() {
            debug!("surface ineligible; consuming {source} utterance without render");
            out.push(Effect::Skipped { source, chars });
            self.complete(source, chars, now);
            return;
        }

        let duration = required_duration(source, chars, &cfg.pacing);
        out.push(Effect::Render {
            text: utterance.content.clone(),
            source,
            duration,
        });
        if play_sound {
            if let Some(cue) = self.cues.select(source, &cfg.cues) {
                out.push(Effect::Cue(cue));
            }
        }
        self.stage = Stage::Displaying {
            utterance,
            dismiss_at: deadline_after(now, duration),
        };
    }

    fn finish_display(&mut self, now: Instant, cfg: &OverlayConfig, out: &mut Vec<Effect>) {
        if let Stage::Displaying { utterance, .. } = std::mem::take(&mut self.stage) {
            out.push(Effect::Hide);
            self.complete(utterance.source, utterance.char_len(), now);
        }
        self.pump(now, cfg, out);
    }

    fn on_gate_change(&mut self, now: Instant, cfg: &OverlayConfig) -> Vec<Effect> {
        let mut out = Vec::new();
        if !self.surface.is_eligible() && matches!(self.stage, Stage::Displaying { .. }) {
            debug!("surface became ineligible; tearing down current bubble");
            self.finish_display(now, cfg, &mut out);
        } else {
            self.pump(now, cfg, &mut out);
        }
        out
    }

    /// Record the end of one utterance's lifecycle. Called exactly once per
    /// utterance that rendered or was skipped.
    fn complete(&mut self, source: SourceKind, length: usize, now: Instant) {
        let ended_at = match self.last {
            Some(prev) if prev.ended_at > now => prev.ended_at,
            _ => now,
        };
        self.last = Some(Completion {
            ended_at,
            source,
            length,
        });
        self.completed += 1;
    }
}

fn deadline_after(start: Instant, wait: Duration) -> Instant {
    start
        .checked_add(wait)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

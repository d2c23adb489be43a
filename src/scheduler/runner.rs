//! Scheduler owner loop.
//!
//! One tokio task owns [`SchedulerState`]. It waits on the command channel,
//! configuration changes and the state's single deadline, applies each
//! transition's effects to the effectors, and broadcasts an [`OverlayEvent`]
//! per effect. Adapters talk to it only through a cloneable
//! [`SchedulerHandle`].

use crate::config::{OverlayConfig, SharedConfig};
use crate::effects::Effectors;
use crate::error::{OverlayError, Result};
use crate::runtime::OverlayEvent;
use crate::scheduler::reply::{
    DEFAULT_FALLBACK, ReplyProvider, ReplyResolution, ReplyStamp, ReplyTicket, spawn_reply,
};
use crate::scheduler::state::{Effect, Phase, ReplyDisposition, SchedulerSnapshot, SchedulerState};
use crate::sources::phrases::{PhraseBook, PhraseCategory};
use crate::utterance::{SourceKind, Utterance};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Broadcast capacity for runtime events.
const EVENT_CAPACITY: usize = 256;

/// Messages processed by the owning task, in arrival order.
#[derive(Debug)]
pub enum SchedulerCommand {
    Enqueue(Utterance),
    PriorityShow {
        utterance: Utterance,
        play_sound: bool,
    },
    Ask {
        prompt: String,
    },
    /// Sent exactly once per await window by its [`ReplyTicket`].
    ReplyFinished {
        stamp: ReplyStamp,
        resolution: ReplyResolution,
    },
    SetMuted(bool),
    SetSurfaceVisible(bool),
    SetHovered(bool),
    Snapshot(oneshot::Sender<SchedulerSnapshot>),
    Shutdown,
}

/// Cloneable entry point for every utterance source.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerCommand>,
    events: broadcast::Sender<OverlayEvent>,
}

impl SchedulerHandle {
    fn send(&self, command: SchedulerCommand) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| OverlayError::Channel("utterance scheduler has stopped".to_owned()))
    }

    /// Offer text through the normal, paced path.
    pub fn enqueue(&self, text: impl Into<String>, source: SourceKind) -> Result<()> {
        self.send(SchedulerCommand::Enqueue(Utterance::new(text, source)))
    }

    /// Preempt the queue and display immediately, subject to the gate.
    pub fn priority_show(
        &self,
        text: impl Into<String>,
        source: SourceKind,
        play_sound: bool,
    ) -> Result<()> {
        self.send(SchedulerCommand::PriorityShow {
            utterance: Utterance::new(text, source),
            play_sound,
        })
    }

    /// Ask the reply provider a question; the answer arrives as a priority
    /// AI utterance.
    pub fn ask(&self, prompt: impl Into<String>) -> Result<()> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(OverlayError::Scheduler("prompt cannot be empty".to_owned()));
        }
        self.send(SchedulerCommand::Ask { prompt })
    }

    pub fn set_muted(&self, muted: bool) -> Result<()> {
        self.send(SchedulerCommand::SetMuted(muted))
    }

    pub fn set_surface_visible(&self, visible: bool) -> Result<()> {
        self.send(SchedulerCommand::SetSurfaceVisible(visible))
    }

    pub fn set_hovered(&self, hovered: bool) -> Result<()> {
        self.send(SchedulerCommand::SetHovered(hovered))
    }

    /// Current state, after every command sent before this call was processed.
    pub async fn snapshot(&self) -> Result<SchedulerSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SchedulerCommand::Snapshot(reply_tx))?;
        reply_rx
            .await
            .map_err(|e| OverlayError::Channel(format!("scheduler snapshot dropped: {e}")))
    }

    /// Stop the owning task after pending commands are processed.
    pub fn shutdown(&self) -> Result<()> {
        self.send(SchedulerCommand::Shutdown)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OverlayEvent> {
        self.events.subscribe()
    }
}

/// The single owner of scheduling state.
pub struct UtteranceScheduler {
    state: SchedulerState,
    config: SharedConfig,
    config_rx: watch::Receiver<u64>,
    effectors: Effectors,
    provider: Arc<dyn ReplyProvider>,
    phrases: Arc<PhraseBook>,
    command_rx: mpsc::UnboundedReceiver<SchedulerCommand>,
    /// Weak so the loop still ends once every handle is dropped.
    command_tx: mpsc::WeakUnboundedSender<SchedulerCommand>,
    events: broadcast::Sender<OverlayEvent>,
    cancel: CancellationToken,
}

impl UtteranceScheduler {
    pub fn new(
        config: SharedConfig,
        effectors: Effectors,
        provider: Arc<dyn ReplyProvider>,
    ) -> (Self, SchedulerHandle) {
        let (tx, command_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let scheduler = Self {
            state: SchedulerState::new(),
            config_rx: config.subscribe(),
            config,
            effectors,
            provider,
            phrases: Arc::new(PhraseBook::default()),
            command_rx,
            command_tx: tx.downgrade(),
            events: events.clone(),
            cancel: CancellationToken::new(),
        };
        (scheduler, SchedulerHandle { tx, events })
    }

    /// Phrase book for the thinking placeholder and reply fallbacks.
    pub fn with_phrases(mut self, phrases: Arc<PhraseBook>) -> Self {
        self.phrases = phrases;
        self
    }

    /// Stop the loop when `cancel` fires.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process commands and deadlines until shutdown, cancellation, or every
    /// handle is dropped.
    pub async fn run(mut self) {
        info!("utterance scheduler started");
        loop {
            let deadline = self.state.next_deadline();
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                command = self.command_rx.recv() => {
                    let Some(command) = command else {
                        debug!("all scheduler handles dropped");
                        break;
                    };
                    if !self.handle_command(command) {
                        break;
                    }
                }
                Ok(()) = self.config_rx.changed() => self.on_config_change(),
                () = wait_for(deadline) => self.on_deadline(),
            }
        }

        if self.state.phase() == Phase::Displaying {
            self.effectors.hide();
        }
        info!(
            "utterance scheduler stopped after {} utterances",
            self.state.completed()
        );
    }

    /// Returns `false` when the loop should stop.
    fn handle_command(&mut self, command: SchedulerCommand) -> bool {
        let cfg = self.config.snapshot();
        let now = Instant::now();
        let effects = match command {
            SchedulerCommand::Enqueue(utterance) => self.state.enqueue(utterance, now, &cfg),
            SchedulerCommand::PriorityShow {
                utterance,
                play_sound,
            } => self.state.priority_show(utterance, play_sound, now, &cfg),
            SchedulerCommand::Ask { prompt } => self.begin_ask(prompt, now, &cfg),
            SchedulerCommand::ReplyFinished { stamp, resolution } => {
                self.finish_reply(stamp, resolution, now, &cfg)
            }
            SchedulerCommand::SetMuted(muted) => self.state.set_muted(muted, now, &cfg),
            SchedulerCommand::SetSurfaceVisible(visible) => {
                self.state.set_surface_visible(visible, now, &cfg)
            }
            SchedulerCommand::SetHovered(hovered) => {
                self.state.set_hovered(hovered);
                Vec::new()
            }
            SchedulerCommand::Snapshot(reply_tx) => {
                let _ = reply_tx.send(self.state.snapshot());
                Vec::new()
            }
            SchedulerCommand::Shutdown => return false,
        };
        self.apply(effects);
        true
    }

    fn on_deadline(&mut self) {
        let cfg = self.config.snapshot();
        let effects = self.state.on_timer(Instant::now(), &cfg);
        self.apply(effects);
    }

    fn on_config_change(&mut self) {
        let cfg = self.config.snapshot();
        let effects = self.state.reevaluate(Instant::now(), &cfg);
        self.apply(effects);
    }

    fn begin_ask(&mut self, prompt: String, now: Instant, cfg: &OverlayConfig) -> Vec<Effect> {
        let Some(tx) = self.command_tx.upgrade() else {
            warn!("ask ignored: scheduler is shutting down");
            return Vec::new();
        };
        let placeholder = if cfg.reply.thinking_placeholder {
            self.phrases
                .pick(PhraseCategory::Thinking)
                .map(|text| Utterance::at(text, SourceKind::Preset, now))
        } else {
            None
        };

        let Some((stamp, effects)) = self.state.begin_reply(placeholder, now, cfg) else {
            warn!("ask ignored: a reply is already pending");
            self.emit(OverlayEvent::ReplyRejected);
            return Vec::new();
        };
        self.apply(effects);

        let fallback = self
            .phrases
            .pick(PhraseCategory::Fallback)
            .unwrap_or_else(|| DEFAULT_FALLBACK.to_owned());
        let ticket = ReplyTicket::new(stamp, fallback, tx);
        spawn_reply(
            Arc::clone(&self.provider),
            prompt,
            ticket,
            Duration::from_secs(cfg.reply.timeout_secs),
        );
        debug!("reply {} requested", stamp.generation);
        self.emit(OverlayEvent::ReplyRequested {
            generation: stamp.generation,
        });
        Vec::new()
    }

    fn finish_reply(
        &mut self,
        stamp: ReplyStamp,
        resolution: ReplyResolution,
        now: Instant,
        cfg: &OverlayConfig,
    ) -> Vec<Effect> {
        let generation = stamp.generation;
        let fallback = resolution.is_fallback();
        if let ReplyResolution::Fallback { reason, .. } = &resolution {
            warn!("reply {generation} failed, showing fallback: {reason}");
        }

        match self
            .state
            .finish_reply(stamp, resolution.into_text(), now, cfg)
        {
            ReplyDisposition::Shown(effects) => {
                self.apply(effects);
                self.emit(OverlayEvent::ReplyResolved {
                    generation,
                    fallback,
                });
            }
            ReplyDisposition::Discarded => {
                warn!("reply {generation} arrived after a newer priority utterance; discarded");
                self.emit(OverlayEvent::ReplyDiscarded { generation });
            }
        }
        Vec::new()
    }

    /// Drive the effectors for each effect and broadcast the matching event.
    fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            let event = match effect {
                Effect::Render {
                    text,
                    source,
                    duration,
                } => {
                    self.effectors.render(&text, source);
                    OverlayEvent::Rendered {
                        text,
                        source,
                        duration_ms: millis(duration),
                    }
                }
                Effect::Hide => {
                    self.effectors.hide();
                    OverlayEvent::Hidden
                }
                Effect::Cue(cue) => {
                    self.effectors.fire_cue(cue);
                    OverlayEvent::Cue {
                        sound: cue.sound,
                        haptic: cue.haptic,
                    }
                }
                Effect::Skipped { source, chars } => OverlayEvent::Skipped { source, chars },
                Effect::Dropped { source, reason } => OverlayEvent::Dropped { source, reason },
                Effect::QueueCleared { dropped } => OverlayEvent::QueueCleared { dropped },
                Effect::HeldOpen { extension } => OverlayEvent::HeldOpen {
                    extension_ms: millis(extension),
                },
            };
            self.emit(event);
        }
    }

    fn emit(&self, event: OverlayEvent) {
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for UtteranceScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UtteranceScheduler")
            .field("state", &self.state)
            .field("effectors", &self.effectors)
            .finish_non_exhaustive()
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

//! Async reply gate: provider contract and the single clearing path.
//!
//! The scheduler raises its awaiting-reply flag only when it hands a
//! [`ReplyTicket`] to a spawned provider call. The ticket sends exactly one
//! `ReplyFinished` command back to the owning task: through
//! [`ReplyTicket::resolve`] on success or failure, or from `Drop` if the task
//! is cancelled or panics first. Every path ends in a priority display,
//! which clears the flag.

use crate::error::{OverlayError, Result};
use crate::scheduler::runner::SchedulerCommand;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Phrase shown when a reply fails and the phrase book has no fallback.
pub const DEFAULT_FALLBACK: &str = "Hmm, I lost my train of thought.";

/// Asynchronous reply backend (model inference, remote API).
///
/// Called off the scheduler's owning task, at most once per await window.
#[async_trait]
pub trait ReplyProvider: Send + Sync + 'static {
    async fn request_reply(&self, prompt: &str) -> Result<String>;
}

/// Identifies one await window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyStamp {
    /// Monotonic request counter.
    pub generation: u64,
    /// Priority epoch when the request was issued.
    pub epoch: u64,
}

/// How an await window ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyResolution {
    /// The provider produced text.
    Answered(String),
    /// The provider failed; show the fallback phrase instead.
    Fallback { text: String, reason: String },
}

impl ReplyResolution {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Answered(text) | Self::Fallback { text, .. } => text,
        }
    }
}

/// Obligation to report the outcome of one reply request.
pub struct ReplyTicket {
    stamp: ReplyStamp,
    fallback: String,
    tx: Option<mpsc::UnboundedSender<SchedulerCommand>>,
}

impl ReplyTicket {
    pub(crate) fn new(
        stamp: ReplyStamp,
        fallback: String,
        tx: mpsc::UnboundedSender<SchedulerCommand>,
    ) -> Self {
        Self {
            stamp,
            fallback,
            tx: Some(tx),
        }
    }

    pub fn stamp(&self) -> ReplyStamp {
        self.stamp
    }

    /// Report the provider result. Failures and blank replies resolve to the
    /// fallback phrase.
    pub fn resolve(mut self, result: Result<String>) {
        let resolution = match result {
            Ok(text) if !text.trim().is_empty() => ReplyResolution::Answered(text.trim().to_owned()),
            Ok(_) => self.fallback_resolution("provider returned an empty reply".to_owned()),
            Err(e) => self.fallback_resolution(e.to_string()),
        };
        self.send(resolution);
    }

    fn fallback_resolution(&self, reason: String) -> ReplyResolution {
        ReplyResolution::Fallback {
            text: self.fallback.clone(),
            reason,
        }
    }

    fn send(&mut self, resolution: ReplyResolution) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        let command = SchedulerCommand::ReplyFinished {
            stamp: self.stamp,
            resolution,
        };
        if tx.send(command).is_err() {
            debug!("scheduler stopped before reply {} resolved", self.stamp.generation);
        }
    }
}

impl Drop for ReplyTicket {
    fn drop(&mut self) {
        if self.tx.is_some() {
            let resolution =
                self.fallback_resolution("reply task ended without a result".to_owned());
            self.send(resolution);
        }
    }
}

impl std::fmt::Debug for ReplyTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyTicket")
            .field("stamp", &self.stamp)
            .field("pending", &self.tx.is_some())
            .finish()
    }
}

/// Run the provider off the owning task and resolve the ticket.
///
/// A zero `timeout` waits indefinitely.
pub fn spawn_reply(
    provider: Arc<dyn ReplyProvider>,
    prompt: String,
    ticket: ReplyTicket,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let request = provider.request_reply(&prompt);
        let result = if timeout.is_zero() {
            request.await
        } else {
            match tokio::time::timeout(timeout, request).await {
                Ok(result) => result,
                Err(_) => Err(OverlayError::Reply(format!(
                    "no reply within {}s",
                    timeout.as_secs()
                ))),
            }
        };
        ticket.resolve(result);
    })
}

/// Provider used when no language model is configured. Always fails, so
/// every ask resolves to a fallback phrase.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableReplyProvider;

#[async_trait]
impl ReplyProvider for UnavailableReplyProvider {
    async fn request_reply(&self, _prompt: &str) -> Result<String> {
        Err(OverlayError::Reply("no reply provider configured".to_owned()))
    }
}

/// Provider that cycles through fixed replies after a simulated latency.
#[derive(Debug)]
pub struct CannedReplyProvider {
    replies: Vec<String>,
    latency: Duration,
    cursor: AtomicUsize,
}

impl CannedReplyProvider {
    pub fn new(replies: Vec<String>, latency: Duration) -> Self {
        Self {
            replies,
            latency,
            cursor: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReplyProvider for CannedReplyProvider {
    async fn request_reply(&self, prompt: &str) -> Result<String> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.replies.is_empty() {
            return Ok(format!("You said: {prompt}"));
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.replies.len();
        Ok(self.replies[idx].clone())
    }
}

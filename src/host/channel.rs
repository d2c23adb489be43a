//! Host command channel and router for native overlay shells.

use crate::config::SharedConfig;
use crate::error::{OverlayError, Result};
use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use crate::runtime::OverlayEvent;
use crate::scheduler::SchedulerHandle;
use crate::sources::HookRouter;
use crate::utterance::SourceKind;
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Operations a host shell may invoke.
#[async_trait]
pub trait OverlayCommandHandler: Send + Sync + 'static {
    fn enqueue(&self, text: &str, source: SourceKind) -> Result<()>;
    fn priority_show(&self, text: &str, source: SourceKind, play_sound: bool) -> Result<()>;
    fn request_reply(&self, prompt: &str) -> Result<()>;
    fn set_muted(&self, muted: bool) -> Result<()>;
    fn set_surface_visible(&self, visible: bool) -> Result<()>;
    fn set_hovered(&self, hovered: bool) -> Result<()>;
    /// Fire a feature hook; returns the phrase that was enqueued, if any.
    fn fire_hook(&self, _event: &str) -> Result<Option<String>> {
        Ok(None)
    }
    async fn scheduler_status(&self) -> Result<serde_json::Value>;
    fn query_config_get(&self, _key: Option<&str>) -> Result<serde_json::Value> {
        Ok(serde_json::json!({}))
    }
    fn request_config_patch(&self, _key: &str, _value: &serde_json::Value) -> Result<()> {
        Ok(())
    }
    fn request_runtime_stop(&self) -> Result<()> {
        Ok(())
    }
}

/// Handler backed by a live scheduler, hook router, and shared config.
#[derive(Debug, Clone)]
pub struct SchedulerCommandHandler {
    scheduler: SchedulerHandle,
    hooks: HookRouter,
    config: SharedConfig,
}

impl SchedulerCommandHandler {
    pub fn new(scheduler: SchedulerHandle, hooks: HookRouter, config: SharedConfig) -> Self {
        Self {
            scheduler,
            hooks,
            config,
        }
    }
}

#[async_trait]
impl OverlayCommandHandler for SchedulerCommandHandler {
    fn enqueue(&self, text: &str, source: SourceKind) -> Result<()> {
        self.scheduler.enqueue(text, source)
    }

    fn priority_show(&self, text: &str, source: SourceKind, play_sound: bool) -> Result<()> {
        self.scheduler.priority_show(text, source, play_sound)
    }

    fn request_reply(&self, prompt: &str) -> Result<()> {
        self.scheduler.ask(prompt)
    }

    fn set_muted(&self, muted: bool) -> Result<()> {
        self.scheduler.set_muted(muted)
    }

    fn set_surface_visible(&self, visible: bool) -> Result<()> {
        self.scheduler.set_surface_visible(visible)
    }

    fn set_hovered(&self, hovered: bool) -> Result<()> {
        self.scheduler.set_hovered(hovered)
    }

    fn fire_hook(&self, event: &str) -> Result<Option<String>> {
        self.hooks.fire(event)
    }

    async fn scheduler_status(&self) -> Result<serde_json::Value> {
        let snapshot = self.scheduler.snapshot().await?;
        serde_json::to_value(snapshot)
            .map_err(|e| OverlayError::Host(format!("cannot serialize scheduler status: {e}")))
    }

    fn query_config_get(&self, key: Option<&str>) -> Result<serde_json::Value> {
        self.config.get(key)
    }

    fn request_config_patch(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        self.config.patch(key, value.clone())
    }

    fn request_runtime_stop(&self) -> Result<()> {
        self.scheduler.shutdown()
    }
}

struct HostCommandRequest {
    envelope: CommandEnvelope,
    response_tx: oneshot::Sender<ResponseEnvelope>,
}

#[derive(Clone)]
pub struct HostCommandClient {
    request_tx: mpsc::Sender<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl HostCommandClient {
    pub async fn send(&self, envelope: CommandEnvelope) -> Result<ResponseEnvelope> {
        envelope.validate().map_err(|e| {
            OverlayError::Host(format!(
                "invalid host command envelope {}: {}",
                envelope.request_id, e
            ))
        })?;

        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(HostCommandRequest {
                envelope,
                response_tx,
            })
            .await
            .map_err(|e| {
                OverlayError::Channel(format!("failed to send host command request: {e}"))
            })?;

        response_rx
            .await
            .map_err(|e| OverlayError::Channel(format!("host command response dropped: {e}")))
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Sender for events that should reach the host alongside command events.
    #[must_use]
    pub fn event_sender(&self) -> broadcast::Sender<EventEnvelope> {
        self.event_tx.clone()
    }
}

pub struct HostCommandServer<H: OverlayCommandHandler> {
    request_rx: mpsc::Receiver<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
    handler: H,
}

#[must_use]
pub fn command_channel<H: OverlayCommandHandler>(
    request_capacity: usize,
    event_capacity: usize,
    handler: H,
) -> (HostCommandClient, HostCommandServer<H>) {
    let (event_tx, _event_rx) = broadcast::channel(event_capacity.max(1));
    command_channel_with_events(request_capacity, event_tx, handler)
}

/// Create a command channel using an existing event broadcast sender.
#[must_use]
pub fn command_channel_with_events<H: OverlayCommandHandler>(
    request_capacity: usize,
    event_tx: broadcast::Sender<EventEnvelope>,
    handler: H,
) -> (HostCommandClient, HostCommandServer<H>) {
    let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));

    (
        HostCommandClient {
            request_tx,
            event_tx: event_tx.clone(),
        },
        HostCommandServer {
            request_rx,
            event_tx,
            handler,
        },
    )
}

impl<H: OverlayCommandHandler> HostCommandServer<H> {
    /// Serve requests until every client is dropped. Handler failures become
    /// error responses carrying the request id.
    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            let response = match self.route(&request.envelope).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(
                        command = request.envelope.command.as_str(),
                        error = %e,
                        "host command failed"
                    );
                    ResponseEnvelope::error(request.envelope.request_id.clone(), e.to_string())
                }
            };
            let _ = request.response_tx.send(response);
        }
    }

    /// Route a command envelope to the appropriate handler.
    pub async fn route(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        match envelope.command {
            CommandName::HostPing => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({"pong": true}),
            )),
            CommandName::HostVersion => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({
                    "contract_version": crate::host::contract::CONTRACT_VERSION,
                    "channel": "overlay_host_v1",
                    "version": env!("CARGO_PKG_VERSION"),
                }),
            )),
            CommandName::UtteranceEnqueue => self.handle_enqueue(envelope),
            CommandName::UtterancePriorityShow => self.handle_priority_show(envelope),
            CommandName::ReplyRequest => self.handle_reply_request(envelope),
            CommandName::SurfaceMuteSet => {
                let muted = parse_bool_field(&envelope.payload, "muted", "surface.mute_set")?;
                self.handler.set_muted(muted)?;
                Ok(accepted(envelope, serde_json::json!({"muted": muted})))
            }
            CommandName::SurfaceVisibilitySet => {
                let visible =
                    parse_bool_field(&envelope.payload, "visible", "surface.visibility_set")?;
                self.handler.set_surface_visible(visible)?;
                Ok(accepted(envelope, serde_json::json!({"visible": visible})))
            }
            CommandName::SurfaceHoverSet => {
                let hovered = parse_bool_field(&envelope.payload, "hovered", "surface.hover_set")?;
                self.handler.set_hovered(hovered)?;
                Ok(accepted(envelope, serde_json::json!({"hovered": hovered})))
            }
            CommandName::HookFire => self.handle_hook_fire(envelope),
            CommandName::SchedulerStatus => {
                let status = self.handler.scheduler_status().await?;
                Ok(ResponseEnvelope::ok(envelope.request_id.clone(), status))
            }
            CommandName::ConfigGet => self.handle_config_get(envelope),
            CommandName::ConfigPatch => self.handle_config_patch(envelope),
            CommandName::RuntimeStop => {
                self.handler.request_runtime_stop()?;
                info!("runtime.stop accepted");
                Ok(accepted(envelope, serde_json::json!({})))
            }
        }
    }

    fn handle_enqueue(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let text = parse_non_empty_field(&envelope.payload, "text", "utterance.enqueue")?;
        let source = parse_source(&envelope.payload, SourceKind::Preset, "utterance.enqueue")?;
        self.handler.enqueue(&text, source)?;
        Ok(accepted(
            envelope,
            serde_json::json!({"source": source.as_str()}),
        ))
    }

    fn handle_priority_show(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let command = "utterance.priority_show";
        let text = parse_non_empty_field(&envelope.payload, "text", command)?;
        let source = parse_source(&envelope.payload, SourceKind::Ai, command)?;
        let play_sound = match envelope.payload.get("play_sound") {
            None | Some(serde_json::Value::Null) => true,
            Some(serde_json::Value::Bool(flag)) => *flag,
            Some(_) => {
                return Err(OverlayError::Host(format!(
                    "{command} payload.play_sound must be a boolean when provided"
                )));
            }
        };
        self.handler.priority_show(&text, source, play_sound)?;
        Ok(accepted(
            envelope,
            serde_json::json!({"source": source.as_str(), "play_sound": play_sound}),
        ))
    }

    fn handle_reply_request(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let prompt = parse_non_empty_field(&envelope.payload, "prompt", "reply.request")?;
        self.handler.request_reply(&prompt)?;
        Ok(accepted(envelope, serde_json::json!({})))
    }

    fn handle_hook_fire(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let event = parse_non_empty_field(&envelope.payload, "event", "hook.fire")?;
        let text = self.handler.fire_hook(&event)?;
        if let Some(text) = &text {
            self.emit_event(
                "hook.fired",
                serde_json::json!({"request_id": envelope.request_id, "event": event, "text": text}),
            );
        }
        Ok(ResponseEnvelope::ok(
            envelope.request_id.clone(),
            serde_json::json!({"event": event, "fired": text.is_some(), "text": text}),
        ))
    }

    fn handle_config_get(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let key = envelope
            .payload
            .get("key")
            .and_then(serde_json::Value::as_str);
        let config = self.handler.query_config_get(key)?;
        Ok(ResponseEnvelope::ok(envelope.request_id.clone(), config))
    }

    fn handle_config_patch(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let (key, value) = parse_config_patch(&envelope.payload)?;
        self.handler.request_config_patch(&key, &value)?;
        self.emit_event(
            "config.patched",
            serde_json::json!({"request_id": envelope.request_id, "key": key}),
        );
        Ok(accepted(envelope, serde_json::json!({"key": key})))
    }

    fn emit_event(&self, event: &str, payload: serde_json::Value) {
        let _ = self.event_tx.send(EventEnvelope::fresh(event, payload));
    }
}

/// `{"accepted": true, ..extra}` response.
fn accepted(envelope: &CommandEnvelope, extra: serde_json::Value) -> ResponseEnvelope {
    let mut payload = serde_json::json!({"accepted": true});
    if let (Some(map), serde_json::Value::Object(extra)) = (payload.as_object_mut(), extra) {
        map.extend(extra);
    }
    ResponseEnvelope::ok(envelope.request_id.clone(), payload)
}

/// Wrap a scheduler event for the host event stream, stamped with a fresh
/// id and the wall-clock time.
#[must_use]
pub fn overlay_event_envelope(event: &OverlayEvent) -> EventEnvelope {
    let mut payload = serde_json::to_value(event).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(map) = payload.as_object_mut() {
        map.insert(
            "at".to_owned(),
            serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
        );
    }
    EventEnvelope::fresh(event.name(), payload)
}

/// Forward scheduler events into the host event stream until the scheduler
/// stops.
pub fn forward_overlay_events(
    mut events: broadcast::Receiver<OverlayEvent>,
    event_tx: broadcast::Sender<EventEnvelope>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let _ = event_tx.send(overlay_event_envelope(&event));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged = n, "overlay event forwarder lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn parse_non_empty_field(
    payload: &serde_json::Value,
    field: &str,
    command: &str,
) -> Result<String> {
    let Some(raw) = payload.get(field).and_then(serde_json::Value::as_str) else {
        return Err(OverlayError::Host(format!(
            "{command} requires payload.{field}"
        )));
    };
    let value = raw.trim();
    if value.is_empty() {
        return Err(OverlayError::Host(format!(
            "{command} requires a non-empty payload.{field}"
        )));
    }
    Ok(value.to_owned())
}

fn parse_bool_field(payload: &serde_json::Value, field: &str, command: &str) -> Result<bool> {
    payload
        .get(field)
        .and_then(serde_json::Value::as_bool)
        .ok_or_else(|| OverlayError::Host(format!("{command} requires payload.{field} (boolean)")))
}

fn parse_source(payload: &serde_json::Value, default: SourceKind, command: &str) -> Result<SourceKind> {
    match payload.get("source") {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(serde_json::Value::String(raw)) => SourceKind::parse(raw).ok_or_else(|| {
            OverlayError::Host(format!(
                "{command}: unsupported source `{raw}` (expected preset/trigger/ai)"
            ))
        }),
        Some(_) => Err(OverlayError::Host(format!(
            "{command} payload.source must be a string when provided"
        ))),
    }
}

fn parse_config_patch(payload: &serde_json::Value) -> Result<(String, serde_json::Value)> {
    let key = parse_non_empty_field(payload, "key", "config.patch")?;
    let Some(value) = payload.get("value") else {
        return Err(OverlayError::Host(
            "config.patch requires payload.value".to_owned(),
        ));
    };
    Ok((key, value.clone()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct TestHandler {
        enqueued: Arc<Mutex<Vec<(String, SourceKind)>>>,
        shown: Arc<Mutex<Vec<(String, SourceKind, bool)>>>,
        muted: Arc<Mutex<Vec<bool>>>,
    }

    #[async_trait]
    impl OverlayCommandHandler for TestHandler {
        fn enqueue(&self, text: &str, source: SourceKind) -> Result<()> {
            self.enqueued.lock().unwrap().push((text.to_owned(), source));
            Ok(())
        }

        fn priority_show(&self, text: &str, source: SourceKind, play_sound: bool) -> Result<()> {
            self.shown
                .lock()
                .unwrap()
                .push((text.to_owned(), source, play_sound));
            Ok(())
        }

        fn request_reply(&self, _prompt: &str) -> Result<()> {
            Ok(())
        }

        fn set_muted(&self, muted: bool) -> Result<()> {
            self.muted.lock().unwrap().push(muted);
            Ok(())
        }

        fn set_surface_visible(&self, _visible: bool) -> Result<()> {
            Ok(())
        }

        fn set_hovered(&self, _hovered: bool) -> Result<()> {
            Ok(())
        }

        async fn scheduler_status(&self) -> Result<serde_json::Value> {
            Ok(serde_json::json!({"phase": "idle"}))
        }
    }

    fn make_server(handler: TestHandler) -> HostCommandServer<TestHandler> {
        let (_client, server) = command_channel(4, 8, handler);
        server
    }

    fn make_envelope(command: CommandName, payload: serde_json::Value) -> CommandEnvelope {
        CommandEnvelope::new("req-1", command, payload)
    }

    #[tokio::test]
    async fn enqueue_defaults_to_preset_and_trims() {
        let handler = TestHandler::default();
        let server = make_server(handler.clone());
        let resp = server
            .route(&make_envelope(
                CommandName::UtteranceEnqueue,
                serde_json::json!({"text": "  hi  "}),
            ))
            .await
            .unwrap();
        assert!(resp.ok);
        assert_eq!(resp.payload["source"], "preset");
        assert_eq!(
            *handler.enqueued.lock().unwrap(),
            vec![("hi".to_owned(), SourceKind::Preset)]
        );
    }

    #[tokio::test]
    async fn enqueue_rejects_blank_text_and_bad_source() {
        let server = make_server(TestHandler::default());
        let blank = server
            .route(&make_envelope(
                CommandName::UtteranceEnqueue,
                serde_json::json!({"text": "   "}),
            ))
            .await;
        assert!(matches!(blank, Err(OverlayError::Host(_))));

        let bad_source = server
            .route(&make_envelope(
                CommandName::UtteranceEnqueue,
                serde_json::json!({"text": "x", "source": "radio"}),
            ))
            .await;
        assert!(bad_source.is_err());
    }

    #[tokio::test]
    async fn priority_show_defaults_to_ai_with_sound() {
        let handler = TestHandler::default();
        let server = make_server(handler.clone());
        server
            .route(&make_envelope(
                CommandName::UtterancePriorityShow,
                serde_json::json!({"text": "now"}),
            ))
            .await
            .unwrap();
        server
            .route(&make_envelope(
                CommandName::UtterancePriorityShow,
                serde_json::json!({"text": "quiet", "source": "trigger", "play_sound": false}),
            ))
            .await
            .unwrap();
        assert_eq!(
            *handler.shown.lock().unwrap(),
            vec![
                ("now".to_owned(), SourceKind::Ai, true),
                ("quiet".to_owned(), SourceKind::Trigger, false),
            ]
        );
    }

    #[tokio::test]
    async fn mute_set_requires_boolean() {
        let handler = TestHandler::default();
        let server = make_server(handler.clone());
        assert!(
            server
                .route(&make_envelope(
                    CommandName::SurfaceMuteSet,
                    serde_json::json!({"muted": "yes"}),
                ))
                .await
                .is_err()
        );
        server
            .route(&make_envelope(
                CommandName::SurfaceMuteSet,
                serde_json::json!({"muted": true}),
            ))
            .await
            .unwrap();
        assert_eq!(*handler.muted.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn unknown_hook_reports_not_fired() {
        let server = make_server(TestHandler::default());
        let resp = server
            .route(&make_envelope(
                CommandName::HookFire,
                serde_json::json!({"event": "build.failed"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.payload["fired"], false);
    }

    #[tokio::test]
    async fn handler_error_becomes_error_response_through_client() {
        let (client, server) = command_channel(4, 8, TestHandler::default());
        tokio::spawn(server.run());
        let resp = client
            .send(make_envelope(
                CommandName::ReplyRequest,
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.request_id, "req-1");
        assert!(resp.error.unwrap().contains("payload.prompt"));
    }

    #[test]
    fn overlay_events_carry_name_and_timestamp() {
        let envelope = overlay_event_envelope(&OverlayEvent::Hidden);
        assert_eq!(envelope.event, "surface.hide");
        assert_eq!(envelope.payload["kind"], "hidden");
        let at = envelope.payload["at"].as_str().expect("timestamp");
        assert!(chrono::DateTime::parse_from_rfc3339(at).is_ok());
        assert!(uuid::Uuid::parse_str(&envelope.event_id).is_ok());
    }
}

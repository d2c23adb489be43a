#![allow(clippy::unwrap_used, clippy::expect_used)]

use fae_overlay::host::channel::{
    SchedulerCommandHandler, command_channel, command_channel_with_events, forward_overlay_events,
};
use fae_overlay::host::contract::{CommandEnvelope, CommandName, EventEnvelope};
use fae_overlay::host::stdio::run_bridge;
use fae_overlay::scheduler::UnavailableReplyProvider;
use fae_overlay::{
    Effectors, HookRouter, OverlayConfig, PhraseBook, SchedulerHandle, SharedConfig,
    UtteranceScheduler,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast;

struct Harness {
    scheduler: SchedulerHandle,
    config: SharedConfig,
    handler: SchedulerCommandHandler,
}

fn harness() -> Harness {
    let config = SharedConfig::new(OverlayConfig::default());
    let phrases = Arc::new(PhraseBook::default());
    let (scheduler, handle) = UtteranceScheduler::new(
        config.clone(),
        Effectors::detached(),
        Arc::new(UnavailableReplyProvider),
    );
    scheduler.with_phrases(Arc::clone(&phrases)).spawn();
    let hooks = HookRouter::new(handle.clone(), phrases);
    let handler = SchedulerCommandHandler::new(handle.clone(), hooks, config.clone());
    Harness {
        scheduler: handle,
        config,
        handler,
    }
}

fn command(id: &str, name: CommandName, payload: serde_json::Value) -> CommandEnvelope {
    CommandEnvelope::new(id, name, payload)
}

async fn next_event(rx: &mut broadcast::Receiver<EventEnvelope>, name: &str) -> EventEnvelope {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = rx.recv().await.expect("event stream open");
            if event.event == name {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {name}"))
}

async fn read_json<R: tokio::io::AsyncBufRead + Unpin>(
    lines: &mut tokio::io::Lines<R>,
) -> serde_json::Value {
    let line = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
        .await
        .expect("bridge output in time")
        .unwrap()
        .expect("bridge output open");
    serde_json::from_str(&line).unwrap()
}

#[tokio::test]
async fn host_ping_round_trip_returns_pong() {
    let h = harness();
    let (client, server) = command_channel(8, 8, h.handler);
    let server_task = tokio::spawn(server.run());

    let response = client
        .send(command("req-ping", CommandName::HostPing, serde_json::json!({})))
        .await
        .expect("host ping should succeed");

    assert!(response.ok);
    assert_eq!(response.request_id, "req-ping");
    assert_eq!(response.payload["pong"], true);

    server_task.abort();
}

#[tokio::test]
async fn enqueue_reaches_scheduler_and_shows_in_status() {
    let h = harness();
    let (client, server) = command_channel(8, 8, h.handler);
    let server_task = tokio::spawn(server.run());

    let response = client
        .send(command(
            "req-enqueue",
            CommandName::UtteranceEnqueue,
            serde_json::json!({"text": "hello there", "source": "trigger"}),
        ))
        .await
        .unwrap();
    assert!(response.ok);
    assert_eq!(response.payload["accepted"], true);
    assert_eq!(response.payload["source"], "trigger");

    let status = client
        .send(command(
            "req-status",
            CommandName::SchedulerStatus,
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert!(status.ok);
    assert_eq!(status.payload["phase"], "displaying");
    assert_eq!(status.payload["displayed"], "hello there");
    assert_eq!(status.payload["displayed_source"], "trigger");

    server_task.abort();
}

#[tokio::test]
async fn invalid_payload_becomes_error_response_with_request_id() {
    let h = harness();
    let (client, server) = command_channel(8, 8, h.handler);
    let server_task = tokio::spawn(server.run());

    let response = client
        .send(command(
            "req-bad",
            CommandName::UtteranceEnqueue,
            serde_json::json!({"text": "   "}),
        ))
        .await
        .unwrap();
    assert!(!response.ok);
    assert_eq!(response.request_id, "req-bad");
    assert!(
        response
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("non-empty payload.text")
    );

    let snap = h.scheduler.snapshot().await.unwrap();
    assert!(snap.displayed.is_none());

    server_task.abort();
}

#[tokio::test]
async fn scheduler_events_are_forwarded_as_envelopes() {
    let h = harness();
    let (event_tx, _) = broadcast::channel(32);
    let mut events = event_tx.subscribe();
    let forwarder = forward_overlay_events(h.scheduler.subscribe(), event_tx.clone());
    let (client, server) = command_channel_with_events(8, event_tx, h.handler);
    let server_task = tokio::spawn(server.run());

    client
        .send(command(
            "req-show",
            CommandName::UtterancePriorityShow,
            serde_json::json!({"text": "build finished"}),
        ))
        .await
        .unwrap();

    let render = next_event(&mut events, "surface.render").await;
    assert_eq!(render.v, 1);
    assert_eq!(render.payload["text"], "build finished");
    assert_eq!(render.payload["source"], "ai");
    assert!(render.payload["at"].is_string());

    let cue = next_event(&mut events, "cue.sound").await;
    assert_eq!(cue.payload["sound"], "ai_reply");

    server_task.abort();
    forwarder.abort();
}

#[tokio::test]
async fn hook_fire_routes_known_events_and_ignores_unknown() {
    let h = harness();
    let (client, server) = command_channel(8, 8, h.handler);
    let mut events = client.subscribe_events();
    let server_task = tokio::spawn(server.run());

    let known = client
        .send(command(
            "req-hook",
            CommandName::HookFire,
            serde_json::json!({"event": "build.failed"}),
        ))
        .await
        .unwrap();
    assert!(known.ok);
    assert_eq!(known.payload["fired"], true);
    let text = known.payload["text"].as_str().expect("hook text").to_owned();

    let fired = next_event(&mut events, "hook.fired").await;
    assert_eq!(fired.payload["event"], "build.failed");
    assert_eq!(fired.payload["request_id"], "req-hook");

    let unknown = client
        .send(command(
            "req-hook-2",
            CommandName::HookFire,
            serde_json::json!({"event": "nobody.listens"}),
        ))
        .await
        .unwrap();
    assert!(unknown.ok);
    assert_eq!(unknown.payload["fired"], false);

    let snap = h.scheduler.snapshot().await.unwrap();
    assert_eq!(snap.displayed.as_deref(), Some(text.as_str()));

    server_task.abort();
}

#[tokio::test]
async fn config_patch_updates_shared_config_and_emits_event() {
    let h = harness();
    let (client, server) = command_channel(8, 8, h.handler);
    let mut events = client.subscribe_events();
    let server_task = tokio::spawn(server.run());

    let patched = client
        .send(command(
            "req-patch",
            CommandName::ConfigPatch,
            serde_json::json!({"key": "pacing.min_delay_secs", "value": 4.5}),
        ))
        .await
        .unwrap();
    assert!(patched.ok);
    assert_eq!(patched.payload["key"], "pacing.min_delay_secs");
    assert!((h.config.snapshot().pacing.min_delay_secs - 4.5).abs() < f64::EPSILON);

    let event = next_event(&mut events, "config.patched").await;
    assert_eq!(event.payload["request_id"], "req-patch");

    let read_back = client
        .send(command(
            "req-get",
            CommandName::ConfigGet,
            serde_json::json!({"key": "pacing.min_delay_secs"}),
        ))
        .await
        .unwrap();
    assert!(read_back.ok);
    assert_eq!(read_back.payload, serde_json::json!(4.5));

    let rejected = client
        .send(command(
            "req-patch-bad",
            CommandName::ConfigPatch,
            serde_json::json!({"key": "pacing.nonexistent", "value": 1}),
        ))
        .await
        .unwrap();
    assert!(!rejected.ok);

    server_task.abort();
}

#[tokio::test]
async fn runtime_stop_shuts_the_scheduler_down() {
    let h = harness();
    let (client, server) = command_channel(8, 8, h.handler);
    let server_task = tokio::spawn(server.run());

    let response = client
        .send(command("req-stop", CommandName::RuntimeStop, serde_json::json!({})))
        .await
        .unwrap();
    assert!(response.ok);

    tokio::time::timeout(Duration::from_secs(2), async {
        while h.scheduler.snapshot().await.is_ok() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("scheduler should stop after runtime.stop");

    server_task.abort();
}

#[tokio::test]
async fn stdio_bridge_round_trip_over_duplex_pipes() {
    let h = harness();
    let (mut cmd_in, cmd_out) = tokio::io::duplex(4096);
    let (bridge_out, test_in) = tokio::io::duplex(16 * 1024);
    let events = h.scheduler.subscribe();
    let bridge = tokio::spawn(run_bridge(
        h.handler,
        events,
        BufReader::new(cmd_out),
        bridge_out,
    ));
    let mut lines = BufReader::new(test_in).lines();

    cmd_in.write_all(b"not json\n").await.unwrap();
    let parse_error = read_json(&mut lines).await;
    assert_eq!(parse_error["request_id"], "parse-error");
    assert_eq!(parse_error["ok"], false);

    cmd_in
        .write_all(br#"{"v":1,"request_id":"r1","command":"host.ping","payload":{}}"#)
        .await
        .unwrap();
    cmd_in.write_all(b"\n").await.unwrap();
    let pong = read_json(&mut lines).await;
    assert_eq!(pong["request_id"], "r1");
    assert_eq!(pong["payload"]["pong"], true);

    cmd_in
        .write_all(
            br#"{"v":1,"request_id":"r2","command":"utterance.enqueue","payload":{"text":"hi"}}"#,
        )
        .await
        .unwrap();
    cmd_in.write_all(b"\n").await.unwrap();

    let mut saw_response = false;
    let mut saw_render = false;
    while !(saw_response && saw_render) {
        let value = read_json(&mut lines).await;
        if value["request_id"] == "r2" {
            assert_eq!(value["ok"], true);
            saw_response = true;
        } else if value["event"] == "surface.render" {
            assert_eq!(value["payload"]["text"], "hi");
            saw_render = true;
        }
    }

    cmd_in
        .write_all(br#"{"v":1,"request_id":"r3","command":"runtime.stop","payload":{}}"#)
        .await
        .unwrap();
    cmd_in.write_all(b"\n").await.unwrap();

    let mut stopped = false;
    while !stopped {
        let value = read_json(&mut lines).await;
        stopped = value["request_id"] == "r3" && value["ok"] == true;
    }

    tokio::time::timeout(Duration::from_secs(2), bridge)
        .await
        .expect("bridge exits after runtime.stop")
        .unwrap()
        .expect("bridge returns cleanly");
}

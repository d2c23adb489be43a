//! Headless overlay host bridge for stdin/stdout JSON communication.
//!
//! The native shell owns the window and renders from `surface.render` /
//! `surface.hide` events; this process owns scheduling. All tracing output
//! goes to stderr so that stdout remains a clean JSON protocol channel.

use clap::Parser;
use fae_overlay::host::channel::SchedulerCommandHandler;
use fae_overlay::host::stdio::run_stdio_bridge;
use fae_overlay::scheduler::UnavailableReplyProvider;
use fae_overlay::{
    Effectors, HookRouter, OverlayConfig, PhraseBook, SharedConfig, UtteranceScheduler,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Overlay scheduler driven over newline-delimited JSON on stdin/stdout.
#[derive(Parser)]
#[command(name = "fae-overlay-host", version, about)]
struct Args {
    /// Path to TOML configuration file.
    #[arg(short, long, env = "FAE_OVERLAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fae_overlay=info")),
        )
        .init();

    let args = Args::parse();
    let config = match args.config {
        Some(path) => OverlayConfig::from_file(&path)
            .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", path.display()))?,
        None => OverlayConfig::default(),
    };
    let phrases = Arc::new(PhraseBook::load_or_default(config.phrases_path.as_deref()));
    let config = SharedConfig::new(config);

    tracing::info!("fae-overlay-host starting");

    let (scheduler, handle) = UtteranceScheduler::new(
        config.clone(),
        Effectors::detached(),
        Arc::new(UnavailableReplyProvider),
    );
    let scheduler = scheduler.with_phrases(Arc::clone(&phrases));
    let events = handle.subscribe();
    let scheduler_task = scheduler.spawn();

    let hooks = HookRouter::new(handle.clone(), phrases);
    let handler = SchedulerCommandHandler::new(handle.clone(), hooks, config);

    let result = run_stdio_bridge(handler, events).await;
    let _ = handle.shutdown();
    let _ = scheduler_task.await;

    result.map_err(|e| {
        tracing::error!(error = %e, "fae-overlay-host exited with error");
        anyhow::anyhow!("fae-overlay-host failed: {e}")
    })?;

    tracing::info!("fae-overlay-host shut down cleanly");
    Ok(())
}

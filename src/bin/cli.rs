//! CLI binary for the fae overlay scheduler.

use clap::{Parser, Subcommand};
use fae_overlay::effects::{DisplaySurface, HapticPattern, Haptics, SoundKind, SoundPlayer};
use fae_overlay::pacing::{required_delay, required_duration};
use fae_overlay::scheduler::CannedReplyProvider;
use fae_overlay::sources::{spawn_idle_chatter, spawn_random_triggers};
use fae_overlay::{
    ClickAdapter, Effectors, HookRouter, OverlayConfig, PhraseBook, SchedulerHandle, SharedConfig,
    SourceKind, UtteranceScheduler,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Fae overlay: a desktop companion's speech bubble, in your terminal.
#[derive(Parser)]
#[command(name = "fae-overlay", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, env = "FAE_OVERLAY_CONFIG")]
    config: Option<PathBuf>,

    /// Write logs to a daily rolling file in the overlay logs directory
    /// instead of stderr.
    #[arg(long)]
    log_file: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Run the companion interactively. Type `!help` for input commands.
    Run {
        /// Canned reply returned for `?question` input (repeatable).
        #[arg(long = "reply")]
        replies: Vec<String>,

        /// Simulated reply latency in seconds.
        #[arg(long, default_value_t = 1.5)]
        reply_latency_secs: f64,

        /// Disable idle chatter and random triggers.
        #[arg(long)]
        no_timers: bool,
    },

    /// Show how long a text would display and the delay that follows it.
    Pacing {
        /// Utterance text.
        text: String,

        /// Utterance source (preset, trigger, ai).
        #[arg(long, default_value = "preset")]
        source: String,
    },

    /// Print the effective configuration as TOML.
    Config {
        /// Print the default config file path instead.
        #[arg(long)]
        path: bool,

        /// Write the effective configuration to the config file.
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file)?;

    let config_path = cli.config.clone();
    let config = match &config_path {
        Some(path) => OverlayConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", path.display()))?,
        None => load_default_config(),
    };

    match cli.command.unwrap_or(Command::Run {
        replies: Vec::new(),
        reply_latency_secs: 1.5,
        no_timers: false,
    }) {
        Command::Run {
            replies,
            reply_latency_secs,
            no_timers,
        } => run_companion(config, replies, reply_latency_secs, no_timers).await,
        Command::Pacing { text, source } => show_pacing(&config, &text, &source),
        Command::Config { path, write } => show_config(&config, config_path.as_deref(), path, write),
    }
}

fn init_tracing(
    log_file: bool,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fae_overlay=info"));

    if log_file {
        let dir = fae_overlay::overlay_dirs::logs_dir();
        std::fs::create_dir_all(&dir)?;
        let appender = tracing_appender::rolling::daily(dir, "fae-overlay.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_writer(writer)
            .with_ansi(false)
            .with_env_filter(filter)
            .init();
        return Ok(Some(guard));
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
    Ok(None)
}

/// The config file at the default path if present, otherwise defaults.
fn load_default_config() -> OverlayConfig {
    let path = OverlayConfig::default_config_path();
    if !path.exists() {
        return OverlayConfig::default();
    }
    match OverlayConfig::from_file(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("ignoring {}: {e}", path.display());
            OverlayConfig::default()
        }
    }
}

async fn run_companion(
    config: OverlayConfig,
    replies: Vec<String>,
    reply_latency_secs: f64,
    no_timers: bool,
) -> anyhow::Result<()> {
    println!("Fae overlay v{}", env!("CARGO_PKG_VERSION"));

    let phrases = Arc::new(PhraseBook::load_or_default(config.phrases_path.as_deref()));
    let config = SharedConfig::new(config);
    let cancel = CancellationToken::new();

    let effectors = Effectors::new(
        Arc::new(ConsoleSurface),
        Arc::new(ConsoleSpeaker),
        Arc::new(ConsoleHaptics),
    );
    let latency = Duration::try_from_secs_f64(reply_latency_secs).unwrap_or(Duration::ZERO);
    let provider = Arc::new(CannedReplyProvider::new(replies, latency));
    let (scheduler, handle) = UtteranceScheduler::new(config.clone(), effectors, provider);
    let scheduler_task = scheduler
        .with_phrases(Arc::clone(&phrases))
        .with_cancel_token(cancel.clone())
        .spawn();

    if !no_timers {
        spawn_idle_chatter(handle.clone(), config.clone(), Arc::clone(&phrases), cancel.clone());
        spawn_random_triggers(handle.clone(), config.clone(), Arc::clone(&phrases), cancel.clone());
    }

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            cancel_clone.cancel();
        }
    });

    println!("\nPress Enter to poke the companion, `?question` to ask, `!help` for more.\n");

    let clicks = ClickAdapter::new(handle.clone(), Arc::clone(&phrases));
    let hooks = HookRouter::new(handle.clone(), phrases);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            () = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        match parse_input(&line) {
            ConsoleInput::Quit => break,
            input => dispatch(input, &handle, &clicks, &hooks).await?,
        }
    }

    cancel.cancel();
    let _ = scheduler_task.await;
    Ok(())
}

/// One line of interactive input.
#[derive(Debug, PartialEq, Eq)]
enum ConsoleInput {
    Click,
    Say(String),
    Priority(String),
    Ask(String),
    Hook(String),
    Muted(bool),
    Visible(bool),
    Hovered(bool),
    Status,
    Help,
    Quit,
    Unknown(String),
}

fn parse_input(line: &str) -> ConsoleInput {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleInput::Click;
    }
    if let Some(prompt) = line.strip_prefix('?') {
        return ConsoleInput::Ask(prompt.trim().to_owned());
    }
    if let Some(text) = line.strip_prefix("!!") {
        return ConsoleInput::Priority(text.trim().to_owned());
    }
    let Some(command) = line.strip_prefix('!') else {
        return ConsoleInput::Say(line.to_owned());
    };
    let (name, arg) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(n, a)| (n, a.trim()));
    match name {
        "click" => ConsoleInput::Click,
        "hook" => ConsoleInput::Hook(arg.to_owned()),
        "mute" => ConsoleInput::Muted(true),
        "unmute" => ConsoleInput::Muted(false),
        "hide" => ConsoleInput::Visible(false),
        "show" => ConsoleInput::Visible(true),
        "hover" => ConsoleInput::Hovered(true),
        "unhover" => ConsoleInput::Hovered(false),
        "status" => ConsoleInput::Status,
        "help" => ConsoleInput::Help,
        "quit" | "exit" => ConsoleInput::Quit,
        other => ConsoleInput::Unknown(other.to_owned()),
    }
}

async fn dispatch(
    input: ConsoleInput,
    handle: &SchedulerHandle,
    clicks: &ClickAdapter,
    hooks: &HookRouter,
) -> anyhow::Result<()> {
    match input {
        ConsoleInput::Click => {
            clicks.click()?;
        }
        ConsoleInput::Say(text) => handle.enqueue(text, SourceKind::Preset)?,
        ConsoleInput::Priority(text) => handle.priority_show(text, SourceKind::Preset, true)?,
        ConsoleInput::Ask(prompt) => {
            if let Err(e) = handle.ask(prompt) {
                println!("  (not asked: {e})");
            }
        }
        ConsoleInput::Hook(event) => {
            if hooks.fire(&event)?.is_none() {
                println!("  (no phrases for `{event}`; known: {})", hooks.events().join(", "));
            }
        }
        ConsoleInput::Muted(muted) => handle.set_muted(muted)?,
        ConsoleInput::Visible(visible) => handle.set_surface_visible(visible)?,
        ConsoleInput::Hovered(hovered) => handle.set_hovered(hovered)?,
        ConsoleInput::Status => {
            let snapshot = handle.snapshot().await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        ConsoleInput::Help => print_help(),
        ConsoleInput::Unknown(name) => println!("  (unknown command `!{name}`; try !help)"),
        ConsoleInput::Quit => {}
    }
    Ok(())
}

fn print_help() {
    println!(
        "  <Enter>          click the companion\n  \
         text             say a preset phrase\n  \
         !!text           show text immediately\n  \
         ?question        ask for a reply\n  \
         !hook NAME       fire a feature hook\n  \
         !mute / !unmute  toggle mute\n  \
         !hide / !show    toggle surface visibility\n  \
         !hover / !unhover\n  \
         !status          print scheduler state\n  \
         !quit"
    );
}

fn show_pacing(config: &OverlayConfig, text: &str, source: &str) -> anyhow::Result<()> {
    let source = SourceKind::parse(source)
        .ok_or_else(|| anyhow::anyhow!("unknown source `{source}` (expected preset/trigger/ai)"))?;
    let len = text.chars().count();
    let shown = required_duration(source, len, &config.pacing);
    let delay = required_delay(source, len, &config.pacing);
    println!("source:   {source}");
    println!("length:   {len} chars");
    println!("shown:    {:.2}s", shown.as_secs_f64());
    println!("then wait {:.2}s before the next utterance", delay.as_secs_f64());
    Ok(())
}

fn show_config(
    config: &OverlayConfig,
    explicit_path: Option<&Path>,
    print_path: bool,
    write: bool,
) -> anyhow::Result<()> {
    let path = explicit_path.map_or_else(OverlayConfig::default_config_path, Path::to_path_buf);
    if print_path {
        println!("{}", path.display());
        return Ok(());
    }
    if write {
        config.save_to_file(&path)?;
        println!("wrote {}", path.display());
        return Ok(());
    }
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Speech bubble rendered as terminal lines.
struct ConsoleSurface;

impl DisplaySurface for ConsoleSurface {
    fn render(&self, text: &str, source: SourceKind) -> fae_overlay::Result<()> {
        println!("[{source}] {text}");
        Ok(())
    }

    fn hide(&self) -> fae_overlay::Result<()> {
        Ok(())
    }
}

struct ConsoleSpeaker;

impl SoundPlayer for ConsoleSpeaker {
    fn play(&self, sound: SoundKind) -> fae_overlay::Result<()> {
        println!("  ~ {} ~", sound.as_str());
        Ok(())
    }
}

struct ConsoleHaptics;

impl Haptics for ConsoleHaptics {
    fn trigger(&self, pattern: HapticPattern) -> fae_overlay::Result<()> {
        tracing::debug!("haptic {}", pattern.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_console_input() {
        assert_eq!(parse_input("  "), ConsoleInput::Click);
        assert_eq!(parse_input("hello"), ConsoleInput::Say("hello".to_owned()));
        assert_eq!(parse_input("!!now"), ConsoleInput::Priority("now".to_owned()));
        assert_eq!(parse_input("? why"), ConsoleInput::Ask("why".to_owned()));
        assert_eq!(
            parse_input("!hook build.failed"),
            ConsoleInput::Hook("build.failed".to_owned())
        );
        assert_eq!(parse_input("!mute"), ConsoleInput::Muted(true));
        assert_eq!(parse_input("!show"), ConsoleInput::Visible(true));
        assert_eq!(parse_input("!exit"), ConsoleInput::Quit);
        assert_eq!(parse_input("!dance"), ConsoleInput::Unknown("dance".to_owned()));
    }
}

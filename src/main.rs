//! # Controller Keys
//!
//! Turns a game controller into a keyboard, mouse and macro pad.
//!
//! The controller decoder runs as a separate process and writes one JSON
//! [`RawInput`] per line to our stdin. This binary feeds those lines to the
//! engine, ticks analog frames, runs actions and keeps usage statistics.
//!
//! ```text
//! controller-keys [config.toml]
//! controller-keys analyze <profile.json> <stats.json>
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use controller_keys::config::{Config, LoggingConfig};
use controller_keys::dispatch::obs::ObsClient;
use controller_keys::dispatch::script::{ProcessScriptRunner, ScriptRunner};
use controller_keys::dispatch::synth::{InputSynthesizer, LoggingSynthesizer};
use controller_keys::dispatch::system::SystemRunner;
use controller_keys::dispatch::worker::ActionWorker;
use controller_keys::dispatch::Notification;
use controller_keys::input::event::RawInput;
use controller_keys::optimizer;
use controller_keys::profile::Profile;
use controller_keys::runtime::Runtime;
use controller_keys::telemetry::Telemetry;

/// Config file used when none is given and it exists.
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, args_conflicts_with_subcommands = true)]
struct Cli {
    /// Config file (defaults to config/default.toml when present)
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Commands {
    /// Print binding recommendations for a profile from recorded usage
    Analyze {
        /// Profile JSON file
        profile: PathBuf,
        /// Usage statistics JSON file
        stats: PathBuf,
    },
}

/// Console logging, plus a daily rolling file when enabled.
///
/// The returned guard must live until exit so buffered file output is
/// flushed.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let console_layer = fmt::layer().with_target(true).with_filter(console_filter);

    let (file_layer, guard) = if config.file_enabled {
        let appender = tracing_appender::rolling::daily(&config.log_dir, "controller-keys.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true)
            .with_filter(EnvFilter::new("debug"));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();
    guard
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path).with_context(|| format!("loading config {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Config::load(DEFAULT_CONFIG_PATH).with_context(|| format!("loading config {}", DEFAULT_CONFIG_PATH))
        }
        None => Ok(Config::default()),
    }
}

fn load_profile(path: &str) -> Result<Profile> {
    if !Path::new(path).exists() {
        warn!("No profile at {}, starting with an empty one", path);
        return Ok(serde_json::from_str(r#"{"name": "Empty"}"#)?);
    }
    Profile::load(path).with_context(|| format!("loading profile {}", path))
}

/// Prints the binding analysis of a profile against recorded usage.
fn analyze(profile: &Path, stats: &Path) -> Result<()> {
    let parts = Profile::load(profile)
        .with_context(|| format!("loading profile {}", profile.display()))?
        .into_parts();
    let stats = Telemetry::load(stats)
        .with_context(|| format!("loading stats {}", stats.display()))?
        .snapshot();
    let report = optimizer::analyze(&parts.table, &stats);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn handle_line(runtime: &mut Runtime, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<RawInput>(line) {
        Ok(input) => runtime.handle_raw(input, Instant::now()),
        Err(e) => warn!("Ignoring malformed input line: {}", e),
    }
}

fn show_notification(notification: Notification) {
    match notification {
        // Already logged where it was raised.
        Notification::Error { action, error } => debug!(action = %action, %error, "Failure notified"),
        Notification::Hint { script, hint } => info!(%script, "{}", hint),
    }
}

fn save_stats(telemetry: &Telemetry, config: &Config) {
    if !config.telemetry.enabled {
        return;
    }
    if let Err(e) = telemetry.save(&config.telemetry.stats_path) {
        error!("Failed to save usage statistics: {}", e);
    }
}

/// Main entry point for Controller Keys
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration, set up logging
///    - Load the profile and previous usage statistics
///    - Start the action worker
///
/// 2. **Main Loop**
///    - Analog frame at the configured rate
///    - One decoded input per stdin line
///    - Periodic statistics autosave
///    - Ctrl+C or end of input stops the loop
///
/// 3. **Graceful Shutdown**
///    - Release everything still held
///    - Let in-flight actions finish
///    - Save statistics
///
/// # Errors
///
/// Returns error if the configuration, profile or statistics file exists
/// but cannot be loaded.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Some(Commands::Analyze { profile, stats }) = &cli.cmd {
        return analyze(profile, stats);
    }
    let config_path = cli.config;

    let config = load_config(config_path.as_deref())?;
    let _log_guard = init_logging(&config.logging);

    info!("Controller Keys v{} starting...", env!("CARGO_PKG_VERSION"));

    let profile = load_profile(&config.profile.path)?;
    let telemetry = if config.telemetry.enabled {
        Telemetry::load(&config.telemetry.stats_path)
            .with_context(|| format!("loading stats {}", config.telemetry.stats_path))?
    } else {
        Telemetry::new()
    };

    let synth: Arc<dyn InputSynthesizer> = Arc::new(LoggingSynthesizer);
    let scripts: Arc<dyn ScriptRunner> = Arc::new(ProcessScriptRunner::new(
        &config.worker.scripts_dir,
        config.worker.script_timeout(),
    ));
    let system = SystemRunner::new(config.worker.http_timeout(), ObsClient::new(config.obs.settings()));

    let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();
    let (worker_handle, worker) = ActionWorker::new(
        Arc::clone(&synth),
        scripts,
        system,
        telemetry.clone(),
        notify_tx.clone(),
    );
    let worker_task = tokio::spawn(worker.run());

    let mut runtime = Runtime::new(profile.into_parts(), synth, worker_handle, telemetry.clone(), notify_tx);
    runtime.start(Instant::now());

    let mut frames = interval(config.engine.frame_interval());
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let autosave_period = Duration::from_secs(config.telemetry.autosave_interval_s);
    let mut autosave = tokio::time::interval_at(tokio::time::Instant::now() + autosave_period, autosave_period);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    info!(
        "Reading controller input from stdin at {}Hz frame rate",
        config.engine.frame_rate_hz
    );
    info!("Press Ctrl+C to exit");

    // Main loop
    loop {
        tokio::select! {
            _ = frames.tick() => runtime.frame(Instant::now()),

            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&mut runtime, &line),
                Ok(None) => {
                    info!("Input stream closed, shutting down...");
                    break;
                }
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            },

            Some(notification) = notify_rx.recv() => show_notification(notification),

            _ = autosave.tick() => save_stats(&telemetry, &config),

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    runtime.shutdown(Instant::now());
    drop(runtime);
    if let Err(e) = worker_task.await {
        error!("Action worker ended abnormally: {}", e);
    }
    while let Ok(notification) = notify_rx.try_recv() {
        show_notification(notification);
    }
    save_stats(&telemetry, &config);

    let stats = telemetry.snapshot();
    info!(
        "Total actions: {}, failures: {}",
        stats.total_actions(),
        stats.dispatch_failures
    );
    Ok(())
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use rustls::crypto::{ring, CryptoProvider};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sfu_signal::config::ConfigStore;
use sfu_signal::events::{EventBus, SessionEvent};
use sfu_signal::media::HeadlessEngine;
use sfu_signal::room::{RoomSession, SessionOptions};
use sfu_signal::signaling::{SignalingClient, WsChannel};

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// How the room entry sequence ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnterOutcome {
    Entered,
    Failed,
    /// Ctrl-C during entry; tear down without waiting again
    Interrupted,
}

impl EnterOutcome {
    /// Only a completed entry waits for the leave signal
    fn stays_in_room(self) -> bool {
        self == EnterOutcome::Entered
    }
}

/// sfu-signal command line arguments
#[derive(Parser, Debug)]
#[command(name = "sfu-signal")]
#[command(version, about = "Join an SFU room over WebSocket signaling", long_about = None)]
struct CliArgs {
    /// Signaling server URL, ws:// or wss:// (overrides database config)
    #[arg(short = 'u', long, value_name = "URL")]
    url: Option<String>,

    /// Room to join (overrides database config)
    #[arg(short = 'r', long, value_name = "ROOM")]
    room: Option<String>,

    /// Data directory path (default: ~/.sfu-signal)
    #[arg(short = 'd', long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Do not publish audio
    #[arg(long)]
    no_audio: bool,

    /// Do not publish video
    #[arg(long)]
    no_video: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose);

    // Install default crypto provider (required by rustls 0.23+)
    CryptoProvider::install_default(ring::default_provider())
        .expect("Failed to install rustls crypto provider");

    tracing::info!("Starting sfu-signal v{}", env!("CARGO_PKG_VERSION"));

    let data_dir = args.data_dir.unwrap_or_else(get_data_dir);
    tracing::info!("Data directory: {}", data_dir.display());
    tokio::fs::create_dir_all(&data_dir).await?;

    let config_store = ConfigStore::new(&data_dir.join("sfu-signal.db")).await?;
    let mut config = (*config_store.get()).clone();

    // Apply CLI argument overrides to config (only if explicitly specified)
    if let Some(url) = args.url {
        config.server.url = url;
    }
    if let Some(room) = args.room {
        config.server.room_id = room;
    }
    if args.no_audio {
        config.media.produce_audio = false;
    }
    if args.no_video {
        config.media.produce_video = false;
    }

    tracing::info!(
        "Joining room '{}' at {}",
        config.server.room_id,
        config.server.url
    );

    let events = Arc::new(EventBus::new());
    let event_logger = tokio::spawn(log_events(events.subscribe()));

    let (channel, inbound) = WsChannel::connect(&config.server.url)?;
    tracing::info!("Connecting to {}", channel.url());
    let signaling = SignalingClient::start(channel, inbound, events.clone());
    signaling
        .wait_open(Duration::from_millis(config.server.connect_timeout_ms))
        .await?;

    let session = RoomSession::new(
        signaling.clone(),
        Arc::new(HeadlessEngine::new()),
        events,
        SessionOptions::from_config(&config),
    );

    let outcome = tokio::select! {
        result = session.enter() => match result {
            Ok(()) => EnterOutcome::Entered,
            Err(e) => {
                tracing::error!("Failed to enter room: {}", e);
                EnterOutcome::Failed
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted while entering room");
            EnterOutcome::Interrupted
        }
    };

    if outcome.stays_in_room() {
        tracing::info!("In room '{}', press Ctrl-C to leave", session.room_id());
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown signal received"),
            _ = signaling.join_worker() => tracing::warn!("Signaling channel ended"),
        }
    }

    session.close();
    signaling.close();
    event_logger.abort();

    tracing::info!("Bye");
    Ok(())
}

/// Log every session event until the bus goes away
async fn log_events(mut rx: broadcast::Receiver<SessionEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => tracing::info!("event {}", json),
                Err(_) => tracing::info!("event {}", event.event_name()),
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Event logger lagged, {} events skipped", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "sfu_signal=error",
        LogLevel::Warn => "sfu_signal=warn",
        LogLevel::Info => "sfu_signal=info",
        LogLevel::Verbose => "sfu_signal=debug,tokio_tungstenite=info",
        LogLevel::Debug => "sfu_signal=debug,tokio_tungstenite=debug",
        LogLevel::Trace => "sfu_signal=trace,tokio_tungstenite=debug,sqlx=debug",
    };

    // RUST_LOG takes priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

fn get_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var("SFU_SIGNAL_DATA_DIR") {
        return PathBuf::from(path);
    }

    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".sfu-signal"),
        Err(_) => PathBuf::from(".sfu-signal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupted_entry_goes_straight_to_teardown() {
        assert!(EnterOutcome::Entered.stays_in_room());
        assert!(!EnterOutcome::Interrupted.stays_in_room());
        assert!(!EnterOutcome::Failed.stays_in_room());
    }

    #[test]
    fn test_cli_flags() {
        let args = CliArgs::parse_from([
            "sfu-signal", "--url", "ws://10.0.0.2:4443", "--room", "lobby", "--no-video", "-vv",
        ]);
        assert_eq!(args.url.as_deref(), Some("ws://10.0.0.2:4443"));
        assert_eq!(args.room.as_deref(), Some("lobby"));
        assert!(args.no_video);
        assert!(!args.no_audio);
        assert_eq!(args.verbose, 2);
    }
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;

use airwave_session::config::{AirwaveConfig, BusBackend};
use airwave_session::media::{MediaSource, MicrophoneSource, PlaylistSource, SilentCapture};
use airwave_session::signaling::{MemoryBus, PgSignalBus, SignalBus, spawn_retention_sweep};
use airwave_session::{SessionManager, SessionStatus, logging};

#[derive(Parser)]
#[command(name = "airwave", version, about = "Peer-to-peer audio rooms")]
struct Cli {
    /// Configuration file. Missing file means defaults.
    #[arg(short, long, default_value = "airwave.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Broadcast to a room until Ctrl-C.
    Broadcast {
        #[arg(long)]
        room: String,

        /// Defaults to a random id.
        #[arg(long)]
        user: Option<String>,

        /// Ogg/Opus files to loop instead of the microphone. MP3 or other
        /// formats must be transcoded first, e.g.
        /// `ffmpeg -i song.mp3 -c:a libopus song.opus`.
        #[arg(long, num_args = 1..)]
        playlist: Vec<PathBuf>,
    },

    /// Listen to a room's broadcaster until Ctrl-C.
    Listen {
        #[arg(long)]
        room: String,

        #[arg(long)]
        user: Option<String>,
    },

    /// Only run the signaling table retention sweep.
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AirwaveConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if !logging::is_valid_format(&config.logging.format) {
        eprintln!(
            "{} unknown log format {:?}, using text",
            "⚠".yellow(),
            config.logging.format
        );
    }
    logging::init(&config.logging.level, &config.logging.format);

    let bus = connect_bus(&config).await?;

    match cli.command {
        Commands::Broadcast {
            room,
            user,
            playlist,
        } => {
            let user = user.unwrap_or_else(random_user);
            let source: Box<dyn MediaSource> = if playlist.is_empty() {
                Box::new(MicrophoneSource::new(
                    Box::new(SilentCapture),
                    config.audio.clone(),
                ))
            } else {
                Box::new(PlaylistSource::new(playlist))
            };

            let mut manager = SessionManager::new(bus, config.transport_config());
            manager
                .start_broadcast(room.as_str().into(), user.as_str().into(), source)
                .await
                .context("Failed to start broadcast")?;

            println!(
                "{} {} as {}",
                "📡 Broadcasting to".green().bold(),
                room.cyan(),
                user.cyan()
            );
            run_until_ctrl_c(&mut manager).await;
        }

        Commands::Listen { room, user } => {
            let user = user.unwrap_or_else(random_user);
            let mut manager = SessionManager::new(bus, config.transport_config());
            manager
                .join_as_listener(room.as_str().into(), user.as_str().into())
                .await
                .context("Failed to join room")?;

            println!(
                "{} {} as {}",
                "🎧 Listening to".green().bold(),
                room.cyan(),
                user.cyan()
            );
            run_until_ctrl_c(&mut manager).await;
        }

        Commands::Sweep => {
            let policy = config.retention_policy();
            println!(
                "{} every {:?}, dropping rows older than {:?}",
                "🧹 Sweeping".green().bold(),
                policy.sweep_interval,
                policy.max_age
            );
            let sweeper = spawn_retention_sweep(bus, policy);
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            sweeper.abort();
        }
    }

    Ok(())
}

async fn connect_bus(config: &AirwaveConfig) -> Result<Arc<dyn SignalBus>> {
    match config.bus.backend {
        BusBackend::Memory => {
            println!(
                "{}",
                "⚠ Using the in-process bus: only this process can join.".yellow()
            );
            Ok(Arc::new(MemoryBus::new()))
        }
        BusBackend::Postgres => {
            let bus = PgSignalBus::connect(&config.bus.database_url, config.bus.max_connections)
                .await
                .context("Failed to connect to signaling database")?;
            if config.bus.apply_schema {
                bus.ensure_schema()
                    .await
                    .context("Failed to apply signaling schema")?;
            }
            Ok(Arc::new(bus))
        }
    }
}

async fn run_until_ctrl_c(manager: &mut SessionManager) {
    let mut status = manager.watch_status();
    print_status(&status.borrow_and_update());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                print_status(&status.borrow_and_update());
            }
        }
    }

    println!("{}", "Stopping...".yellow());
    let closed = manager.stop().await;
    println!("{} ({} peer connections closed)", "✨ Stopped".green().bold(), closed);
}

fn print_status(status: &SessionStatus) {
    let audio = if status.receiving_audio {
        "receiving audio".green()
    } else {
        "no audio".dimmed()
    };
    println!(
        "   {} {} connected peer(s), {}",
        status.role.to_string().cyan(),
        status.connected_peers,
        audio
    );
}

fn random_user() -> String {
    uuid::Uuid::new_v4().to_string()
}

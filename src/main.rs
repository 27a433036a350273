use anyhow::Context;
use cadence::config::{self, Config};
use cadence::console::{self, NoticePrinter};
use cadence::effects::Topology;
use cadence::engine::Engine;
use cadence::models::{Track, TrackRef};
use cadence::player::MpvHandle;
use cadence::queue::HISTORY_LIMIT;
use cadence::storage::StorageHandle;
use cadence::tunehub::TuneHubClient;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cadence", version, about = "Multi-platform music player (headless)")]
struct Cli {
    /// Override config file path.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Search tracks and print to stdout.
    Search {
        query: String,
        /// Search one platform instead of all configured ones.
        #[arg(long)]
        platform: Option<String>,
    },
    /// Search, queue the results and play them, reading commands from stdin.
    Play {
        query: String,
        #[arg(long)]
        platform: Option<String>,
    },
    /// Print recently played tracks.
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Audio output device management (mpv).
    Audio {
        #[command(subcommand)]
        cmd: AudioCommand,
    },
}

#[derive(Debug, Subcommand)]
enum AudioCommand {
    /// List mpv audio devices.
    List,
    /// Set mpv audio device (name as shown in list).
    Set { device: String },
    /// Clear mpv audio device override.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref()).context("load config")?;

    match cli.command {
        Command::Search { query, platform } => {
            let client = TuneHubClient::new(&cfg.api)?;
            let tracks = search(&client, &cfg, &query, platform.as_deref()).await?;
            print_tracks(&tracks);
        }
        Command::Play { query, platform } => {
            let client = TuneHubClient::new(&cfg.api)?;
            let tracks = search(&client, &cfg, &query, platform.as_deref()).await?;
            if tracks.is_empty() {
                println!("No results for \"{query}\".");
                return Ok(());
            }
            play(cfg, client, tracks).await?;
        }
        Command::History { limit } => {
            let tracks = storage(&cfg).history(limit).await?;
            print_tracks(&tracks);
        }
        Command::Audio { cmd } => match cmd {
            AudioCommand::List => {
                let out = tokio::process::Command::new("mpv")
                    .args(["--audio-device=help", "--no-video", "--idle=no"])
                    .output()
                    .await
                    .context("run mpv --audio-device=help")?;
                print!("{}", String::from_utf8_lossy(&out.stdout));
                eprint!("{}", String::from_utf8_lossy(&out.stderr));
            }
            AudioCommand::Set { device } => {
                let mut cfg = cfg;
                cfg.player.audio_device = Some(device);
                config::save(&cfg, cli.config.as_deref()).context("save config")?;
                println!("Updated audio device in config.");
            }
            AudioCommand::Clear => {
                let mut cfg = cfg;
                cfg.player.audio_device = None;
                config::save(&cfg, cli.config.as_deref()).context("save config")?;
                println!("Cleared audio device override.");
            }
        },
    }

    Ok(())
}

async fn search(
    client: &TuneHubClient,
    cfg: &Config,
    query: &str,
    platform: Option<&str>,
) -> anyhow::Result<Vec<Track>> {
    match platform {
        Some(p) => client.search_platform(query, p, 1, cfg.api.page_size).await,
        None => Ok(client.aggregate_search(query).await),
    }
}

fn storage(cfg: &Config) -> StorageHandle {
    StorageHandle::new(cfg.paths.data_dir.join("cadence.sqlite3"))
}

async fn play(cfg: Config, client: TuneHubClient, tracks: Vec<Track>) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel(256);
    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();

    let mpv = MpvHandle::spawn(
        tx.clone(),
        cfg.player.audio_device.as_deref(),
        None,
        cfg.paths.data_dir.join("effects"),
    )
    .await
    .context("start mpv")?;

    let history = storage(&cfg);
    let seeded = match history.history(HISTORY_LIMIT).await {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!("could not load play history: {e:#}");
            Vec::new()
        }
    };

    let mut engine = Engine::new(
        &cfg.engine,
        mpv,
        Arc::new(client),
        Arc::new(history),
        tx.clone(),
        notice_tx,
    );
    engine.seed_history(seeded);

    tokio::spawn(async move {
        let mut printer = NoticePrinter::new();
        while let Some(notice) = notice_rx.recv().await {
            if let Some(line) = printer.render(&notice) {
                println!("{line}");
            }
        }
    });

    engine.set_volume(cfg.player.volume).await;
    engine.set_mode(cfg.player.mode);
    if cfg.player.effect != Topology::Original {
        engine.set_effect(cfg.player.effect).await;
    }
    engine
        .set_queue(tracks.into_iter().map(TrackRef::new).collect(), 0)
        .await;

    eprintln!("{}", console::HELP);
    console::spawn_stdin_task(tx);
    engine.run(rx).await;
    Ok(())
}

fn print_tracks(tracks: &[Track]) {
    for (i, t) in tracks.iter().enumerate() {
        let duration = match t.duration_secs {
            0 => "--:--".to_string(),
            s => format!("{}:{:02}", s / 60, s % 60),
        };
        println!(
            "{:>3}. {:<24} {} · {} [{}]",
            i + 1,
            t.id,
            t.display_name(),
            duration,
            t.album
        );
    }
}

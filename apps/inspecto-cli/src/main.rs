mod summary;

use std::{env, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use inspecto_capture::{PixelFormat, SoftwareGpu};
use inspecto_coordinator::{RefreshOutcome, TickScheduler};
use inspecto_ops::{ensure_dump_dir, init_tracing};
use inspecto_session::InspectSession;
use inspecto_types::{
    clock::SystemClock,
    config::InspectoConfig,
    record::{ContentId, EntityId, HistoryOrder},
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{interval, timeout},
};
use tracing::{info, warn};

use crate::summary::{HistoryEntry, Tables, ROSTER};

type Session = InspectSession<SoftwareGpu>;

/// Replays examine-window sessions against an in-memory render host and
/// prints the resulting inspection history as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Configuration file. Defaults to $INSPECTO_CONFIG, then configs/dev.toml.
    config: Option<PathBuf>,
    /// How many scripted characters to examine per round.
    #[arg(long, default_value_t = 3)]
    characters: usize,
    /// How many times the roster is examined.
    #[arg(long, default_value_t = 2)]
    rounds: usize,
    /// Render and update frame interval in milliseconds.
    #[arg(long, default_value_t = 16)]
    frame_ms: u64,
    /// Frames before drawn portrait content becomes visible in the render target.
    #[arg(long, default_value_t = 2)]
    flush_latency: u32,
    /// Edge length of the square portrait render target.
    #[arg(long, default_value_t = 128)]
    portrait_size: u32,
    /// Write every captured portrait as PNG into this directory.
    #[arg(long)]
    dump_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.clone());
    init_tracing(&config.ops)?;

    let gpu = SoftwareGpu::with_flush_latency(args.flush_latency);
    gpu.install_target(
        config.capture.inspect_slot,
        args.portrait_size,
        args.portrait_size,
        PixelFormat::Bgra8Unorm,
    );
    let session = Arc::new(InspectSession::from_config(
        gpu,
        TickScheduler::new(),
        Arc::new(SystemClock),
        &config,
    ));

    let frame = Duration::from_millis(args.frame_ms.max(1));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
    let render = spawn_render_task(Arc::clone(&session), frame, shutdown_rx.clone());
    let update = spawn_update_task(Arc::clone(&session), frame, outcome_tx, shutdown_rx);

    let wait_limit = wait_limit(&config, frame);
    let characters = &ROSTER[..args.characters.min(ROSTER.len())];
    let mut next_entity = 0x1000_0000u32;

    for round in 0..args.rounds {
        info!("Starting examine round {}", round + 1);
        for character in characters {
            next_entity += 1;
            session
                .hook()
                .backend()
                .draw(
                    config.capture.inspect_slot,
                    character.portrait(args.portrait_size, args.portrait_size),
                )
                .context("drawing portrait")?;
            session.on_examine_opened(character.snapshot(EntityId(next_entity)));

            match timeout(wait_limit, wait_for(&mut outcome_rx, character.key())).await {
                Ok(Some(outcome)) => info!("{} -> {:?}", character.name, outcome),
                Ok(None) => warn!("Update task stopped before {} settled", character.name),
                Err(_) => warn!("No refresh outcome for {} within {:?}", character.name, wait_limit),
            }
            session.on_examine_closed();
        }
    }

    shutdown_tx.send(true).ok();
    render.await.context("render task")?;
    update.await.context("update task")?;

    let stats = session.hook().backend().stats();
    info!(
        "Render host: {} captures published, {} staging textures created, {} released",
        session.hook().published_count(),
        stats.staging_created,
        stats.staging_released
    );

    let order = HistoryOrder::from_sort_by_update(config.history.sort_by_update);
    let history = session.history(order);
    if let Some(dir) = &args.dump_dir {
        let dir = ensure_dump_dir(dir)?;
        for record in &history {
            if let Some(image) = record.image.to_rgba_image() {
                let path = dir.join(format!("{}.png", record.key));
                image
                    .save(&path)
                    .with_context(|| format!("writing {}", path.display()))?;
                info!("Saved portrait of {} to {:?}", record.name, path);
            }
        }
    }

    let tables = Tables::default();
    let entries: Vec<_> = history
        .iter()
        .map(|record| HistoryEntry::decorate(record, &tables))
        .collect();
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn spawn_render_task(
    session: Arc<Session>,
    frame: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(frame);
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let hook = session.hook();
                    hook.process_commands(|| hook.backend().end_frame());
                }
                _ = shutdown.changed() => {
                    info!("Render loop received shutdown signal");
                    break;
                }
            }
        }
    })
}

fn spawn_update_task(
    session: Arc<Session>,
    frame: Duration,
    outcomes: mpsc::UnboundedSender<RefreshOutcome>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(frame);
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    session.on_examine_repainted();
                    for outcome in session.tick() {
                        outcomes.send(outcome).ok();
                    }
                }
                _ = shutdown.changed() => {
                    info!("Update loop received shutdown signal");
                    break;
                }
            }
        }
    })
}

async fn wait_for(
    outcomes: &mut mpsc::UnboundedReceiver<RefreshOutcome>,
    key: ContentId,
) -> Option<RefreshOutcome> {
    while let Some(outcome) = outcomes.recv().await {
        if outcome.target() == key {
            return Some(outcome);
        }
    }
    None
}

/// Upper bound on how long one examined character may take to settle.
fn wait_limit(config: &InspectoConfig, frame: Duration) -> Duration {
    let frames = config
        .refresh
        .check_delay_ticks
        .saturating_add(config.capture.settle_frames)
        .saturating_add(10)
        .saturating_mul(2);
    config
        .refresh
        .image_refresh_delay()
        .saturating_add(frame.saturating_mul(frames))
}

fn load_config(from_args: Option<PathBuf>) -> InspectoConfig {
    let from_env = env::var("INSPECTO_CONFIG").ok().map(PathBuf::from);
    let path = from_args
        .or(from_env)
        .unwrap_or_else(|| PathBuf::from("configs/dev.toml"));
    match InspectoConfig::from_file(&path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path.display()
                );
                default_config()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path.display()
            );
            default_config()
        }
    }
}

fn default_config() -> InspectoConfig {
    let config = InspectoConfig::default();
    debug_assert!(config.validate().is_ok());
    config
}

//! edge-explorer binary
//!
//! Headless run of the motion + presence core against the in-process
//! presence store: the local avatar walks a scripted loop around a few
//! placed objects while a second simulated participant shares the world.
//!
//! ## Configuration (CLI / env, tunables via TOML + `EXPLORER_*` env)
//!
//! | Key                        | Default        | Description                     |
//! |----------------------------|----------------|---------------------------------|
//! | `EXPLORER_CONFIG`          | *(none)*       | TOML file with `[motion]` / `[presence]` |
//! | `EXPLORER_WORLD`           | `default`      | World (community) id            |
//! | `EXPLORER_PARTICIPANT_ID`  | `local-player` | Local participant id            |
//! | `EXPLORER_DISPLAY_NAME`    | `Explorer`     | Name shown to others            |
//! | `EXPLORER_CHARACTER`       | `robot`        | Character reference             |
//! | `EXPLORER_GUEST`           | `false`        | Guest session (presence off)    |
//! | `EXPLORER_FRAME_RATE_HZ`   | `60`           | Frame loop rate                 |
//! | `EXPLORER_DURATION_SECS`   | `0`            | Stop after N seconds (0 = Ctrl-C) |

use anyhow::{Context, Result};
use clap::Parser;
use edge_explorer::{
    footprint::{ObjectChange, ObjectDescriptor, ShapeKind},
    settings::ExplorerSettings,
    CharacterRef, ExplorerSession, Identity, MemoryPresenceStore, ParticipantId, Pose,
    StepOutcome, SystemClock, Vec3, WorldId,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "edge-explorer", about = "Edge Explorer motion/presence core", version)]
struct Args {
    /// TOML settings file
    #[arg(long, env = "EXPLORER_CONFIG")]
    config: Option<PathBuf>,

    /// World (community) to join
    #[arg(long, env = "EXPLORER_WORLD", default_value = "default")]
    world: String,

    /// Local participant id
    #[arg(long, env = "EXPLORER_PARTICIPANT_ID", default_value = "local-player")]
    participant_id: String,

    /// Display name shown to other participants
    #[arg(long, env = "EXPLORER_DISPLAY_NAME", default_value = "Explorer")]
    display_name: String,

    /// Selected character
    #[arg(long, env = "EXPLORER_CHARACTER", default_value = "robot")]
    character: String,

    /// Join as a guest (no presence)
    #[arg(long, env = "EXPLORER_GUEST", default_value_t = false)]
    guest: bool,

    /// Frame loop rate (Hz)
    #[arg(long, env = "EXPLORER_FRAME_RATE_HZ", default_value_t = 60.0)]
    frame_rate_hz: f32,

    /// Stop after this many seconds (0 runs until Ctrl-C)
    #[arg(long, env = "EXPLORER_DURATION_SECS", default_value_t = 0)]
    duration_secs: u64,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("edge_explorer=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    let settings = ExplorerSettings::load(args.config.as_deref())
        .context("Failed to load explorer settings")?;

    log::info!(
        "Starting edge-explorer (world='{}', participant='{}', island_radius={})",
        args.world,
        args.participant_id,
        settings.motion.island_radius,
    );

    let store = Arc::new(MemoryPresenceStore::default());
    let world = WorldId::new(args.world.clone());
    let clock = Arc::new(SystemClock);

    let identity = if args.guest {
        Identity::Guest {
            display_name: args.display_name.clone(),
        }
    } else {
        Identity::Registered {
            id: ParticipantId::new(args.participant_id.clone()),
            display_name: args.display_name.clone(),
        }
    };

    let mut session = ExplorerSession::new(
        store.clone(),
        identity,
        world.clone(),
        Some(CharacterRef::new(args.character.clone())),
        settings.motion.clone(),
        Pose::default(),
    );
    place_demo_objects(&session);

    // Second participant so the roster has someone to show.
    let mut guide = ExplorerSession::new(
        store.clone(),
        Identity::Registered {
            id: ParticipantId::new("edge-guide"),
            display_name: "Edge Guide".into(),
        },
        world.clone(),
        Some(CharacterRef::new("guide")),
        settings.motion.clone(),
        Pose::new(Vec3::new(-6.0, 0.0, 6.0), 0.0),
    );

    let (stop_tx, stop_rx) = watch::channel(false);

    // Presence loops
    let mut presence_tasks = Vec::new();
    for sync in [
        session.presence(settings.presence.clone(), clock.clone()),
        guide.presence(settings.presence.clone(), clock.clone()),
    ]
    .into_iter()
    .flatten()
    {
        if sync.key().participant_id.as_str() != "edge-guide" {
            spawn_roster_logger(sync.roster_watch());
        }
        presence_tasks.push(tokio::spawn(sync.run(stopped(stop_rx.clone()))));
    }

    // Frame loops
    let rate = args.frame_rate_hz;
    let guide_stop = stopped(stop_rx.clone());
    let guide_task = tokio::spawn(async move {
        guide
            .run_frames(rate, guide_stop, |frame, _, input| {
                // Slow figure-eight.
                let t = frame as f32 / 180.0;
                input.joystick((t * 2.0).sin() * 0.5, t.cos() * 0.5);
            })
            .await;
    });

    let local_stop = stopped(stop_rx.clone());
    let local_task = tokio::spawn(async move {
        session
            .run_frames(rate, local_stop, |frame, outcome, input| {
                // Circle the island; log every second.
                let t = frame as f32 / 120.0;
                input.joystick(t.cos(), t.sin());
                if frame % 60 == 0 {
                    if let StepOutcome::Moved(pose) | StepOutcome::Blocked(pose) = outcome {
                        log::info!(
                            "frame {} pose {} heading {:.2}",
                            frame,
                            pose.position,
                            pose.heading
                        );
                    }
                }
            })
            .await;
    });

    // Shutdown
    if args.duration_secs > 0 {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(args.duration_secs)) => {
                log::info!("Run duration elapsed");
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("edge-explorer shutting down (SIGINT)");
            }
        }
    } else {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        log::info!("edge-explorer shutting down (SIGINT)");
    }

    stop_tx.send_replace(true);
    local_task.await.context("Local frame loop panicked")?;
    guide_task.await.context("Guide frame loop panicked")?;
    for task in presence_tasks {
        let stats = task.await.context("Presence loop panicked")?;
        log::info!("Presence stats: {:?}", stats);
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn place_demo_objects<S: edge_explorer::PresenceStore>(session: &ExplorerSession<S>) {
    let objects = [
        ObjectDescriptor::new(
            "crate-1",
            ShapeKind::Box,
            Vec3::new(5.0, 0.5, 0.0),
            Vec3::new(2.0, 1.0, 2.0),
        ),
        ObjectDescriptor::new(
            "ring-1",
            ShapeKind::Torus,
            Vec3::new(-4.0, 0.5, -3.0),
            Vec3::new(1.0, 1.0, 1.0),
        ),
        ObjectDescriptor::new(
            "cone-1",
            ShapeKind::Cone,
            Vec3::new(0.0, 0.5, 8.0),
            Vec3::new(1.5, 2.0, 1.5),
        ),
    ];
    for obj in objects {
        session.apply_object_change(ObjectChange::Added(obj));
    }
}

/// Resolves once the stop flag flips to true.
async fn stopped(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

fn spawn_roster_logger(mut rx: watch::Receiver<Vec<edge_explorer::RemoteParticipant>>) {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let names: Vec<String> = rx
                .borrow_and_update()
                .iter()
                .map(|p| format!("{} @ {}", p.display_name, p.pose.position))
                .collect();
            log::debug!("Roster: [{}]", names.join(", "));
        }
    });
}

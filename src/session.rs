//! ExplorerSession – the host that owns the local avatar while in a world.
//!
//! ```text
//! ExplorerSession
//!   ├── InputCells          ← key / joystick listeners
//!   ├── ObjectRegistry      ← object store notifications
//!   ├── MotionIntegrator    ← frame()
//!   ├── PoseCell            → PresenceSynchronizer publish timer
//!   └── watch<Pose>         → render layer
//! ```
//!
//! The presence store handle is passed in, never looked up globally.

use crate::footprint::{ObjectChange, ObjectRegistry};
use crate::input::InputCells;
use crate::motion::{MotionIntegrator, StepOutcome};
use crate::presence::{Clock, PoseCell, PresenceSynchronizer};
use crate::store::PresenceStore;
use crate::types::{CharacterRef, Identity, MotionConfig, Pose, PresenceConfig, WorldId};
use log::{debug, info};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

pub struct ExplorerSession<S: PresenceStore> {
    store: Arc<S>,
    identity: Identity,
    world: WorldId,
    character: Option<CharacterRef>,
    integrator: MotionIntegrator,
    input: InputCells,
    objects: Arc<RwLock<ObjectRegistry>>,
    pose: PoseCell,
    pose_tx: watch::Sender<Pose>,
    frames: u64,
}

impl<S: PresenceStore> ExplorerSession<S> {
    pub fn new(
        store: Arc<S>,
        identity: Identity,
        world: WorldId,
        character: Option<CharacterRef>,
        motion: MotionConfig,
        spawn: Pose,
    ) -> Self {
        let integrator = MotionIntegrator::new(motion, spawn);
        let start = integrator.pose();
        let (pose_tx, _) = watch::channel(start);
        Self {
            store,
            identity,
            world,
            character,
            integrator,
            input: InputCells::new(),
            objects: Arc::new(RwLock::new(ObjectRegistry::new())),
            pose: PoseCell::new(start),
            pose_tx,
            frames: 0,
        }
    }

    pub fn world(&self) -> &WorldId {
        &self.world
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Handle for key/joystick listeners.
    pub fn input(&self) -> InputCells {
        self.input.clone()
    }

    /// Shared object mirror; feed it with [`ExplorerSession::apply_object_change`]
    /// or lock it directly.
    pub fn objects(&self) -> Arc<RwLock<ObjectRegistry>> {
        self.objects.clone()
    }

    pub fn apply_object_change(&self, change: ObjectChange) {
        self.objects.write().apply(change);
    }

    pub fn pose(&self) -> Pose {
        self.integrator.pose()
    }

    pub fn pose_watch(&self) -> watch::Receiver<Pose> {
        self.pose_tx.subscribe()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// One animation frame: fresh input snapshot, fresh footprints, one
    /// integrator step. Idle frames touch nothing.
    pub fn frame(&mut self) -> StepOutcome {
        self.frames += 1;
        let input = self.input.snapshot();
        let footprints = self.objects.read().footprints();

        let outcome = self.integrator.step(&input, &footprints);
        if let Some(pose) = outcome.pose() {
            self.pose.set(pose);
            self.pose_tx.send_if_modified(|current| {
                let changed = *current != pose;
                *current = pose;
                changed
            });
        }
        outcome
    }

    /// Drive [`ExplorerSession::frame`] at `rate_hz` until `shutdown`
    /// resolves. `on_frame` sees every outcome (scripted input, debug HUD).
    pub async fn run_frames<F>(
        &mut self,
        rate_hz: f32,
        shutdown: impl Future<Output = ()>,
        mut on_frame: F,
    ) where
        F: FnMut(u64, &StepOutcome, &InputCells),
    {
        let period = frame_period(rate_hz);
        let mut timer = tokio::time::interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!("Frame loop running at {:.0}Hz", rate_hz);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = timer.tick() => {
                    let outcome = self.frame();
                    on_frame(self.frames, &outcome, &self.input);
                }
            }
        }
        debug!("Frame loop stopped after {} frames", self.frames);
    }

    /// Presence synchronizer sharing this session's store and pose cell.
    /// `None` for guests.
    pub fn presence(
        &self,
        config: PresenceConfig,
        clock: Arc<dyn Clock>,
    ) -> Option<PresenceSynchronizer<S>> {
        PresenceSynchronizer::start(
            self.store.clone(),
            &self.identity,
            self.world.clone(),
            self.character.clone(),
            config,
            self.pose.clone(),
            clock,
        )
    }
}

/// Frame timer period for `rate_hz`, never shorter than 1 ms.
fn frame_period(rate_hz: f32) -> Duration {
    let rate = if rate_hz.is_finite() { rate_hz.max(1.0) } else { 1.0 };
    Duration::from_secs_f32(1.0 / rate).max(Duration::from_millis(1))
}

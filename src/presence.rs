//! Presence Synchronizer – publishes the local pose, mirrors everyone else.
//!
//! ## Loop
//!
//! ```text
//! PresenceSynchronizer::run()
//!   subscribe(world)          change feed first, so nothing slips by
//!   join()                    snapshot of live rows → roster
//!   select! {
//!     publish tick (200ms)  → publish_now()  (throttled upsert)
//!     sweep tick   (5s)     → sweep()        (evict > 30s silent)
//!     feed event            → handle_event()
//!     shutdown              → break
//!   }
//!   leave()                   mark own row inactive
//! ```
//!
//! Store failures are logged and swallowed; the next tick is the retry.

use crate::protocol::{ChangeEvent, PresenceKey, PresenceRecord};
use crate::roster::{RemoteParticipant, Roster};
use crate::store::{ChangeFeed, PresenceStore};
use crate::types::{CharacterRef, Identity, Pose, PresenceConfig, PresenceStats, WorldId};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Wall-clock source for `last_seen_ms` stamps and staleness checks.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Pose cell
// ---------------------------------------------------------------------------

/// Latest local pose, written by the frame loop and read by the publish
/// timer. Separate from render-facing state so neither loop restarts the
/// other.
#[derive(Debug, Clone, Default)]
pub struct PoseCell(Arc<RwLock<Pose>>);

impl PoseCell {
    pub fn new(pose: Pose) -> Self {
        Self(Arc::new(RwLock::new(pose)))
    }

    pub fn get(&self) -> Pose {
        *self.0.read()
    }

    pub fn set(&self, pose: Pose) {
        *self.0.write() = pose;
    }
}

// ---------------------------------------------------------------------------
// Throttle
// ---------------------------------------------------------------------------

/// Drops attempts closer than `min_gap` to the last accepted one.
#[derive(Debug, Clone)]
pub struct PublishThrottle {
    min_gap: Duration,
    last: Option<Instant>,
}

impl PublishThrottle {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            last: None,
        }
    }

    pub fn try_acquire(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.min_gap => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

/// What a single [`PresenceSynchronizer::publish_now`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent,
    Throttled,
    Failed,
}

pub struct PresenceSynchronizer<S: PresenceStore> {
    store: Arc<S>,
    key: PresenceKey,
    display_name: String,
    character: Option<CharacterRef>,
    config: PresenceConfig,
    pose: PoseCell,
    clock: Arc<dyn Clock>,
    throttle: PublishThrottle,
    roster: Roster,
    roster_tx: watch::Sender<Vec<RemoteParticipant>>,
    stats: PresenceStats,
}

impl<S: PresenceStore> PresenceSynchronizer<S> {
    /// Build a synchronizer, or `None` when the identity has no participant
    /// id to publish under (guest session: presence stays off).
    pub fn start(
        store: Arc<S>,
        identity: &Identity,
        world: WorldId,
        character: Option<CharacterRef>,
        config: PresenceConfig,
        pose: PoseCell,
        clock: Arc<dyn Clock>,
    ) -> Option<Self> {
        let Some(id) = identity.participant_id() else {
            info!(
                "Presence disabled for '{}': no participant id",
                identity.display_name()
            );
            return None;
        };

        let (roster_tx, _) = watch::channel(Vec::new());
        Some(Self {
            store,
            key: PresenceKey::new(id.clone(), world),
            display_name: identity.display_name().to_string(),
            character,
            throttle: PublishThrottle::new(config.min_publish_gap()),
            roster: Roster::new(id.clone(), config.stale_after_ms),
            config,
            pose,
            clock,
            roster_tx,
            stats: PresenceStats::default(),
        })
    }

    pub fn key(&self) -> &PresenceKey {
        &self.key
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Render-facing view of the roster; updated on every change.
    pub fn roster_watch(&self) -> watch::Receiver<Vec<RemoteParticipant>> {
        self.roster_tx.subscribe()
    }

    pub fn stats(&self) -> PresenceStats {
        PresenceStats {
            roster_size: self.roster.len(),
            ..self.stats.clone()
        }
    }

    // -----------------------------------------------------------------------
    // Publish path
    // -----------------------------------------------------------------------

    pub fn record(&self) -> PresenceRecord {
        let pose = self.pose.get();
        PresenceRecord {
            participant_id: self.key.participant_id.clone(),
            world_id: self.key.world_id.clone(),
            display_name: self.display_name.clone(),
            position: pose.position,
            rotation: pose.heading,
            character: self.character.clone(),
            is_active: true,
            last_seen_ms: self.clock.now_ms(),
        }
    }

    /// Upsert the current pose unless the last upsert was too recent.
    pub async fn publish_now(&mut self) -> PublishOutcome {
        if !self.throttle.try_acquire(Instant::now()) {
            self.stats.throttled += 1;
            return PublishOutcome::Throttled;
        }

        match self.store.upsert(self.record()).await {
            Ok(()) => {
                self.stats.publishes += 1;
                PublishOutcome::Sent
            }
            Err(e) => {
                warn!("Failed to publish presence for {}: {}", self.key, e);
                self.stats.failed_publishes += 1;
                PublishOutcome::Failed
            }
        }
    }

    // -----------------------------------------------------------------------
    // Subscribe path
    // -----------------------------------------------------------------------

    /// Seed the roster from the store's live rows. Safe to repeat on rejoin.
    pub async fn join(&mut self) {
        let now = self.clock.now_ms();
        let since = now.saturating_sub(self.config.stale_after_ms);
        match self.store.fetch_active(&self.key.world_id, since).await {
            Ok(rows) => {
                self.roster.seed(&rows, now);
                self.notify();
            }
            Err(e) => warn!("Failed to fetch presence snapshot for {}: {}", self.key.world_id, e),
        }
    }

    pub fn handle_event(&mut self, event: &ChangeEvent) {
        if event.world_id() != &self.key.world_id {
            return;
        }
        if self.roster.apply(event, self.clock.now_ms()) {
            self.notify();
        }
    }

    /// Evict silent participants. Returns how many were dropped.
    pub fn sweep(&mut self) -> usize {
        let evicted = self.roster.sweep(self.clock.now_ms());
        if evicted > 0 {
            self.stats.evicted += evicted as u64;
            self.notify();
        }
        evicted
    }

    /// Mark our own row inactive so other clients drop us.
    pub async fn leave(&self) {
        match self.store.mark_inactive(&self.key).await {
            Ok(()) => info!("Left world {} as {}", self.key.world_id, self.key.participant_id),
            Err(e) => warn!("Failed to mark {} inactive: {}", self.key, e),
        }
    }

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------

    /// Run until `shutdown` resolves, then leave. Returns final stats.
    #[tracing::instrument(
        skip_all,
        fields(participant = %self.key.participant_id, world = %self.key.world_id)
    )]
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> PresenceStats {
        let mut feed = match self.store.subscribe(&self.key.world_id) {
            Ok(feed) => Some(feed),
            Err(e) => {
                warn!("Presence subscribe failed, running publish-only: {}", e);
                None
            }
        };

        self.join().await;

        let mut publish = tokio::time::interval(self.config.publish_interval());
        publish.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweep = tokio::time::interval(self.config.sweep_interval());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::pin!(shutdown);

        info!(
            "Presence sync active (publish every {:?}, sweep every {:?})",
            self.config.publish_interval(),
            self.config.sweep_interval()
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = publish.tick() => {
                    self.publish_now().await;
                }
                _ = sweep.tick() => {
                    self.sweep();
                }
                event = next_event(&mut feed) => match event {
                    Some(event) => self.handle_event(&event),
                    None => {
                        warn!("Presence change feed closed; relying on sweep");
                        feed = None;
                    }
                },
            }
        }

        self.leave().await;
        debug!("Presence loop stopped: {:?}", self.stats());
        self.stats()
    }

    fn notify(&self) {
        self.roster_tx.send_replace(self.roster.participants());
    }
}

async fn next_event(feed: &mut Option<ChangeFeed>) -> Option<ChangeEvent> {
    match feed {
        Some(feed) => feed.next().await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

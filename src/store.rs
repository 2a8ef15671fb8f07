//! Presence store seam: upsert-by-key, filtered query and a per-world
//! change feed.
//!
//! [`MemoryPresenceStore`] is the in-process backend: a keyed table plus a
//! broadcast topic. Hosted backends implement [`PresenceStore`] the same way.

use crate::error::{ExplorerError, Result};
use crate::protocol::{channels, ChangeEvent, PresenceKey, PresenceRecord};
use crate::types::WorldId;
use log::{debug, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// The shared "last known position" table.
///
/// Writes are last-writer-wins per key; there is no locking or transaction
/// across participants.
pub trait PresenceStore: Send + Sync + 'static {
    /// Insert the row, or replace the existing row with the same key.
    fn upsert(&self, record: PresenceRecord) -> impl Future<Output = Result<()>> + Send;

    /// Active rows of `world` with `last_seen_ms >= since_ms`.
    fn fetch_active(
        &self,
        world: &WorldId,
        since_ms: u64,
    ) -> impl Future<Output = Result<Vec<PresenceRecord>>> + Send;

    /// Subscribe to row changes scoped to `world`.
    fn subscribe(&self, world: &WorldId) -> Result<ChangeFeed>;

    /// Flag the row inactive (graceful leave).
    fn mark_inactive(&self, key: &PresenceKey) -> impl Future<Output = Result<()>> + Send;
}

// ---------------------------------------------------------------------------
// Change feed
// ---------------------------------------------------------------------------

/// Receiving end of a world-scoped change subscription.
pub struct ChangeFeed {
    world: WorldId,
    rx: broadcast::Receiver<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(world: WorldId, rx: broadcast::Receiver<ChangeEvent>) -> Self {
        Self { world, rx }
    }

    pub fn world(&self) -> &WorldId {
        &self.world
    }

    /// Next event for this world, or `None` once the topic is closed.
    ///
    /// Lagging drops events; the staleness sweep covers what was missed.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(ev) if ev.world_id() == &self.world => return Some(ev),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Change feed for {} lagged, {} events dropped", self.world, n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

pub struct MemoryPresenceStore {
    rows: RwLock<HashMap<PresenceKey, PresenceRecord>>,
    topic: broadcast::Sender<ChangeEvent>,
}

impl MemoryPresenceStore {
    /// `feed_capacity` bounds how far a slow subscriber may fall behind.
    pub fn new(feed_capacity: usize) -> Self {
        let (topic, _) = broadcast::channel(feed_capacity.max(1));
        Self {
            rows: RwLock::new(HashMap::new()),
            topic,
        }
    }

    pub fn get(&self, key: &PresenceKey) -> Option<PresenceRecord> {
        self.rows.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Hard-delete a row (admin cleanup); emits a delete event.
    pub fn delete(&self, key: &PresenceKey) -> bool {
        let removed = self.rows.write().remove(key).is_some();
        if removed {
            self.emit(ChangeEvent::Delete(key.clone()));
        }
        removed
    }

    fn emit(&self, event: ChangeEvent) {
        // No subscribers is not an error.
        let _ = self.topic.send(event);
    }
}

impl Default for MemoryPresenceStore {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl PresenceStore for MemoryPresenceStore {
    async fn upsert(&self, record: PresenceRecord) -> Result<()> {
        let event = {
            let mut rows = self.rows.write();
            match rows.insert(record.key(), record.clone()) {
                None => ChangeEvent::Insert(record),
                Some(_) => ChangeEvent::Update(record),
            }
        };
        self.emit(event);
        Ok(())
    }

    async fn fetch_active(&self, world: &WorldId, since_ms: u64) -> Result<Vec<PresenceRecord>> {
        let rows = self.rows.read();
        Ok(rows
            .values()
            .filter(|r| &r.world_id == world && r.is_active && r.last_seen_ms >= since_ms)
            .cloned()
            .collect())
    }

    fn subscribe(&self, world: &WorldId) -> Result<ChangeFeed> {
        debug!("Subscribing to {}", channels::presence(world));
        Ok(ChangeFeed::new(world.clone(), self.topic.subscribe()))
    }

    async fn mark_inactive(&self, key: &PresenceKey) -> Result<()> {
        let event = {
            let mut rows = self.rows.write();
            let row = rows
                .get_mut(key)
                .ok_or_else(|| ExplorerError::Store(format!("no presence row for {}", key)))?;
            row.is_active = false;
            ChangeEvent::Update(row.clone())
        };
        self.emit(event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vec3;

    fn row(id: &str, world: &str, last_seen_ms: u64) -> PresenceRecord {
        PresenceRecord {
            participant_id: id.into(),
            world_id: world.into(),
            display_name: id.into(),
            position: Vec3::zero(),
            rotation: 0.0,
            character: None,
            is_active: true,
            last_seen_ms,
        }
    }

    #[test]
    fn upsert_replaces_by_key() {
        let store = MemoryPresenceStore::default();
        tokio_test::block_on(async {
            store.upsert(row("a", "w", 1)).await.unwrap();
            store.upsert(row("a", "w", 2)).await.unwrap();
            store.upsert(row("a", "other", 2)).await.unwrap();
        });
        assert_eq!(store.len(), 2);
        let key = PresenceKey::new("a".into(), "w".into());
        assert_eq!(store.get(&key).unwrap().last_seen_ms, 2);
    }

    #[test]
    fn fetch_filters_world_activity_and_age() {
        let store = MemoryPresenceStore::default();
        let rows = tokio_test::block_on(async {
            store.upsert(row("a", "w", 100)).await.unwrap();
            store.upsert(row("b", "w", 10)).await.unwrap();
            store.upsert(row("c", "x", 100)).await.unwrap();
            store.upsert(row("d", "w", 100)).await.unwrap();
            store
                .mark_inactive(&PresenceKey::new("d".into(), "w".into()))
                .await
                .unwrap();
            store.fetch_active(&"w".into(), 50).await.unwrap()
        });
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].participant_id.as_str(), "a");
    }

    #[test]
    fn feed_emits_insert_then_update_for_this_world_only() {
        let store = MemoryPresenceStore::default();
        let mut feed = store.subscribe(&"w".into()).unwrap();
        tokio_test::block_on(async {
            store.upsert(row("x", "elsewhere", 1)).await.unwrap();
            store.upsert(row("a", "w", 1)).await.unwrap();
            store.upsert(row("a", "w", 2)).await.unwrap();

            assert!(matches!(feed.next().await, Some(ChangeEvent::Insert(_))));
            assert!(matches!(feed.next().await, Some(ChangeEvent::Update(_))));
        });
    }

    #[test]
    fn mark_inactive_on_missing_row_is_an_error() {
        let store = MemoryPresenceStore::default();
        let res = tokio_test::block_on(
            store.mark_inactive(&PresenceKey::new("ghost".into(), "w".into())),
        );
        assert!(matches!(res, Err(ExplorerError::Store(_))));
    }

    #[test]
    fn delete_emits_delete_event() {
        let store = MemoryPresenceStore::default();
        let mut feed = store.subscribe(&"w".into()).unwrap();
        tokio_test::block_on(store.upsert(row("a", "w", 1))).unwrap();
        assert!(store.delete(&PresenceKey::new("a".into(), "w".into())));
        tokio_test::block_on(async {
            assert!(matches!(feed.next().await, Some(ChangeEvent::Insert(_))));
            assert!(matches!(feed.next().await, Some(ChangeEvent::Delete(_))));
        });
    }
}

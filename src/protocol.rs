//! Presence wire protocol.
//!
//! Every message that crosses the boundary between this client and the
//! shared presence table lives here.
//!
//! ## Design rules
//!
//! 1. Every struct is `Serialize + Deserialize` with snake_case JSON.
//! 2. One row per `(participant_id, world_id)`; writes replace, never append.
//! 3. `last_seen_ms` is wall-clock milliseconds since the Unix epoch, stamped
//!    by the publisher.
//! 4. Change events carry the full row for insert/update, only the key for
//!    delete.

use crate::types::{CharacterRef, ParticipantId, Pose, Vec3, WorldId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// Primary key of a presence row.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct PresenceKey {
    pub participant_id: ParticipantId,
    pub world_id: WorldId,
}

impl PresenceKey {
    pub fn new(participant_id: ParticipantId, world_id: WorldId) -> Self {
        Self {
            participant_id,
            world_id,
        }
    }
}

impl std::fmt::Display for PresenceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.participant_id, self.world_id)
    }
}

/// Last known position of one participant in one world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub participant_id: ParticipantId,
    pub world_id: WorldId,
    pub display_name: String,
    pub position: Vec3,
    /// Heading in radians.
    pub rotation: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character: Option<CharacterRef>,
    pub is_active: bool,
    pub last_seen_ms: u64,
}

impl PresenceRecord {
    pub fn key(&self) -> PresenceKey {
        PresenceKey::new(self.participant_id.clone(), self.world_id.clone())
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation)
    }

    /// Seen within `stale_after_ms` of `now_ms`. Future timestamps (clock
    /// skew between clients) count as fresh.
    pub fn is_fresh(&self, now_ms: u64, stale_after_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_seen_ms) <= stale_after_ms
    }

    /// Active and fresh: worth showing.
    pub fn is_live(&self, now_ms: u64, stale_after_ms: u64) -> bool {
        self.is_active && self.is_fresh(now_ms, stale_after_ms)
    }
}

// ---------------------------------------------------------------------------
// Change feed
// ---------------------------------------------------------------------------

/// A row-level change on the presence table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    Insert(PresenceRecord),
    Update(PresenceRecord),
    Delete(PresenceKey),
}

impl ChangeEvent {
    pub fn world_id(&self) -> &WorldId {
        match self {
            ChangeEvent::Insert(r) | ChangeEvent::Update(r) => &r.world_id,
            ChangeEvent::Delete(k) => &k.world_id,
        }
    }

    pub fn participant_id(&self) -> &ParticipantId {
        match self {
            ChangeEvent::Insert(r) | ChangeEvent::Update(r) => &r.participant_id,
            ChangeEvent::Delete(k) => &k.participant_id,
        }
    }
}

/// Table and channel names used against the presence backend.
pub mod channels {
    use crate::types::WorldId;

    pub const PRESENCE_TABLE: &str = "player_positions";

    /// Change-feed channel scoped to one world.
    pub fn presence(world: &WorldId) -> String {
        format!("{}:world_id=eq.{}", PRESENCE_TABLE, world)
    }
}

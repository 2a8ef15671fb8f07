//! `Roster` — local mirror of the other participants in this world.
//!
//! Seeded from a snapshot on join, then kept current by the change feed and
//! the periodic staleness sweep. Keyed by participant id, so at most one
//! entry exists per identity.

use crate::protocol::{ChangeEvent, PresenceRecord};
use crate::types::{CharacterRef, ParticipantId, Pose};
use log::debug;
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteParticipant {
    pub id: ParticipantId,
    pub display_name: String,
    pub pose: Pose,
    pub character: Option<CharacterRef>,
    /// Publisher's timestamp of the last update we applied.
    pub last_seen_ms: u64,
}

impl From<&PresenceRecord> for RemoteParticipant {
    fn from(r: &PresenceRecord) -> Self {
        Self {
            id: r.participant_id.clone(),
            display_name: r.display_name.clone(),
            pose: r.pose(),
            character: r.character.clone(),
            last_seen_ms: r.last_seen_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Roster {
    local: ParticipantId,
    stale_after_ms: u64,
    entries: HashMap<ParticipantId, RemoteParticipant>,
}

impl Roster {
    /// `local` is never admitted; rows older than `stale_after_ms` are
    /// treated as departed.
    pub fn new(local: ParticipantId, stale_after_ms: u64) -> Self {
        Self {
            local,
            stale_after_ms,
            entries: HashMap::new(),
        }
    }

    /// Replace the roster with the live rows of a snapshot.
    pub fn seed<'a>(&mut self, records: impl IntoIterator<Item = &'a PresenceRecord>, now_ms: u64) {
        self.entries.clear();
        for r in records {
            if self.admits(r, now_ms) {
                self.entries.insert(r.participant_id.clone(), r.into());
            }
        }
        debug!("Roster seeded with {} participants", self.entries.len());
    }

    /// Apply one change-feed event. Returns true if the roster changed.
    pub fn apply(&mut self, event: &ChangeEvent, now_ms: u64) -> bool {
        match event {
            ChangeEvent::Insert(r) | ChangeEvent::Update(r) => {
                if r.participant_id == self.local {
                    return false;
                }
                if self.admits(r, now_ms) {
                    let entry = RemoteParticipant::from(r);
                    let previous = self.entries.insert(r.participant_id.clone(), entry.clone());
                    if previous.is_none() {
                        debug!("Participant {} joined", r.participant_id);
                    }
                    previous.as_ref() != Some(&entry)
                } else {
                    self.evict(&r.participant_id)
                }
            }
            ChangeEvent::Delete(key) => self.evict(&key.participant_id),
        }
    }

    /// Drop entries whose `last_seen_ms` is older than the threshold.
    /// Returns how many were evicted.
    pub fn sweep(&mut self, now_ms: u64) -> usize {
        let threshold = self.stale_after_ms;
        let before = self.entries.len();
        self.entries
            .retain(|_, p| now_ms.saturating_sub(p.last_seen_ms) <= threshold);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!("Swept {} stale participants", evicted);
        }
        evicted
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&RemoteParticipant> {
        self.entries.get(id)
    }

    /// Current participants, ordered by id for a stable render order.
    pub fn participants(&self) -> Vec<RemoteParticipant> {
        let mut out: Vec<_> = self.entries.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn admits(&self, r: &PresenceRecord, now_ms: u64) -> bool {
        r.participant_id != self.local && r.is_live(now_ms, self.stale_after_ms)
    }

    fn evict(&mut self, id: &ParticipantId) -> bool {
        let removed = self.entries.remove(id).is_some();
        if removed {
            debug!("Participant {} left", id);
        }
        removed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

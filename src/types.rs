//! Core types shared across all modules.

use crate::error::{ExplorerError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn invalid(msg: String) -> ExplorerError {
    ExplorerError::Config(config::ConfigError::Message(msg))
}

// ---------------------------------------------------------------------------
// Basic math
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Distance from the world origin on the ground (XZ) plane.
    pub fn planar_length(&self) -> f32 {
        (self.x * self.x + self.z * self.z).sqrt()
    }

    pub fn offset(&self, dx: f32, dz: f32) -> Self {
        Self::new(self.x + dx, self.y, self.z + dz)
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// A participant's placement: ground position plus heading (radians, yaw
/// about +Y, `0` facing +Z).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub heading: f32,
}

impl Pose {
    pub fn new(position: Vec3, heading: f32) -> Self {
        Self { position, heading }
    }
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Stable identity of a signed-in participant.
    ParticipantId
);
string_id!(
    /// Community world the participant joined.
    WorldId
);
string_id!(
    /// Selected character model.
    CharacterRef
);

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MotionConfig {
    /// Displacement per frame for a fully pressed direction.
    pub move_speed: f32,
    /// Collision radius of the local avatar on the ground plane.
    pub player_radius: f32,
    /// Radius of the playable island, centred on the origin.
    pub island_radius: f32,
    /// Fraction of the remaining turn applied per frame, in (0, 1].
    pub heading_smoothing: f32,
}

impl MotionConfig {
    /// Reject values the integrator cannot honour. A smoothing factor above
    /// one overshoots the target heading.
    pub fn validate(&self) -> Result<()> {
        if !(self.heading_smoothing > 0.0 && self.heading_smoothing <= 1.0) {
            return Err(invalid(format!(
                "motion.heading_smoothing must be in (0, 1], got {}",
                self.heading_smoothing
            )));
        }
        for (name, value) in [
            ("move_speed", self.move_speed),
            ("player_radius", self.player_radius),
            ("island_radius", self.island_radius),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!(
                    "motion.{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            move_speed: 0.1,
            player_radius: 0.4,
            island_radius: 20.0,
            heading_smoothing: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PresenceConfig {
    /// Cadence of the presence publish loop, in milliseconds.
    pub publish_interval_ms: u64,
    /// Upserts closer together than this are dropped.
    pub min_publish_gap_ms: u64,
    /// Cadence of the roster staleness sweep, in milliseconds.
    pub sweep_interval_ms: u64,
    /// Silence after which a participant counts as gone, in milliseconds.
    pub stale_after_ms: u64,
}

impl PresenceConfig {
    /// Both loop periods must be non-zero.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("publish_interval_ms", self.publish_interval_ms),
            ("sweep_interval_ms", self.sweep_interval_ms),
        ] {
            if value == 0 {
                return Err(invalid(format!("presence.{} must be greater than 0", name)));
            }
        }
        Ok(())
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms.max(1))
    }

    pub fn min_publish_gap(&self) -> Duration {
        Duration::from_millis(self.min_publish_gap_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            publish_interval_ms: 200,
            min_publish_gap_ms: 100,
            sweep_interval_ms: 5_000,
            stale_after_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresenceStats {
    pub roster_size: usize,
    pub publishes: u64,
    pub throttled: u64,
    pub failed_publishes: u64,
    pub evicted: u64,
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Who is playing, as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    /// Signed in with a backing participant record.
    Registered {
        id: ParticipantId,
        display_name: String,
    },
    /// Locally fabricated guest; nothing to publish presence under.
    Guest { display_name: String },
}

impl Identity {
    pub fn participant_id(&self) -> Option<&ParticipantId> {
        match self {
            Identity::Registered { id, .. } => Some(id),
            Identity::Guest { .. } => None,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Identity::Registered { display_name, .. } | Identity::Guest { display_name } => {
                display_name
            }
        }
    }
}

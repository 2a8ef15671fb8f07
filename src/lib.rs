//! Edge Explorer Core
//!
//! Client-side movement and presence for a shared 3D island.
//!
//! ## Architecture
//!
//! ```text
//! ExplorerSession  (session.rs)        ← host, owns the local avatar
//!   ├── MotionIntegrator  (motion.rs)  ← per-frame input → pose
//!   │     ├── InputState    (input.rs)
//!   │     └── Footprints    (footprint.rs) + Boundary
//!   └── PresenceSynchronizer  (presence.rs)
//!         ├── PresenceStore  (store.rs)   ← upsert / fetch / change feed
//!         └── Roster         (roster.rs)  ← other participants
//! ```
//!
//! Data flow: input → integrator → {render pose, publish timer} → store →
//! change feed → other clients' rosters.

// Pure simulation and protocol types are always available.
pub mod error;
pub mod footprint;
pub mod input;
pub mod motion;
pub mod protocol;
pub mod roster;
pub mod settings;
pub mod types;

// Timer/async pieces require the `runtime` feature.
#[cfg(feature = "runtime")]
pub mod presence;
#[cfg(feature = "runtime")]
pub mod session;
#[cfg(feature = "runtime")]
pub mod store;

// Convenience re-exports (runtime only)
#[cfg(feature = "runtime")]
pub use presence::{Clock, PoseCell, PresenceSynchronizer, PublishOutcome, SystemClock};
#[cfg(feature = "runtime")]
pub use session::ExplorerSession;
#[cfg(feature = "runtime")]
pub use store::{ChangeFeed, MemoryPresenceStore, PresenceStore};

pub use error::{ExplorerError, Result};
pub use footprint::{Boundary, ObjectDescriptor, ShapeKind, WorldObjectFootprint};
pub use input::{InputState, Key};
pub use motion::{MotionIntegrator, StepOutcome};
pub use protocol::{ChangeEvent, PresenceKey, PresenceRecord};
pub use roster::{RemoteParticipant, Roster};
pub use types::{
    CharacterRef, Identity, MotionConfig, ParticipantId, Pose, PresenceConfig, Vec3, WorldId,
};

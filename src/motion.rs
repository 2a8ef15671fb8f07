//! Local Motion Integrator.
//!
//! One [`MotionIntegrator::step`] per rendered frame turns the current input
//! into a validated pose: footprint collision with single-axis sliding,
//! then the island boundary clamp, then an eased heading.

use crate::footprint::{Boundary, WorldObjectFootprint};
use crate::input::InputState;
use crate::types::{MotionConfig, Pose, Vec3};
use std::f32::consts::{PI, TAU};

/// Result of one integrator step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// No input this frame. Nothing changed, no re-render needed.
    Idle,
    /// Position advanced (possibly sliding along one axis).
    Moved(Pose),
    /// Every axis combination collided; only the heading changed.
    Blocked(Pose),
}

impl StepOutcome {
    pub fn pose(&self) -> Option<Pose> {
        match self {
            StepOutcome::Idle => None,
            StepOutcome::Moved(p) | StepOutcome::Blocked(p) => Some(*p),
        }
    }
}

pub struct MotionIntegrator {
    config: MotionConfig,
    boundary: Boundary,
    pose: Pose,
}

impl MotionIntegrator {
    pub fn new(config: MotionConfig, spawn: Pose) -> Self {
        let boundary = Boundary::new(config.island_radius);
        Self {
            pose: Pose::new(boundary.clamp(spawn.position), spawn.heading),
            boundary,
            config,
        }
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Place the avatar directly (respawn, teleport). Still bounded.
    pub fn teleport(&mut self, pose: Pose) {
        self.pose = Pose::new(self.boundary.clamp(pose.position), pose.heading);
    }

    /// Advance one frame against the footprints visible this frame.
    ///
    /// The heading eases toward the input direction even when the move is
    /// blocked, so a `Blocked` frame may still need a re-render.
    pub fn step(&mut self, input: &InputState, footprints: &[WorldObjectFootprint]) -> StepOutcome {
        let (dx, dz) = input.displacement(self.config.move_speed);
        if dx == 0.0 && dz == 0.0 {
            return StepOutcome::Idle;
        }

        let current = self.pose.position;
        // Full move, then X-only, then Z-only. A zero slide axis is no move.
        let resolved = [(dx, dz), (dx, 0.0), (0.0, dz)]
            .into_iter()
            .filter(|(ox, oz)| *ox != 0.0 || *oz != 0.0)
            .map(|(ox, oz)| current.offset(ox, oz))
            .find(|candidate| self.is_free(*candidate, footprints));

        self.pose.heading = ease_heading(
            self.pose.heading,
            dx.atan2(dz),
            self.config.heading_smoothing,
        );

        match resolved {
            Some(candidate) => {
                self.pose.position = self.boundary.clamp(candidate);
                StepOutcome::Moved(self.pose)
            }
            None => StepOutcome::Blocked(self.pose),
        }
    }

    fn is_free(&self, candidate: Vec3, footprints: &[WorldObjectFootprint]) -> bool {
        !footprints
            .iter()
            .any(|f| f.blocks(candidate.x, candidate.z, self.config.player_radius))
    }
}

/// Wrap an angle difference into (−π, π].
pub fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Move `current` toward `target` by `smoothing` of the shortest turn.
pub fn ease_heading(current: f32, target: f32, smoothing: f32) -> f32 {
    current + wrap_angle(target - current) * smoothing
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

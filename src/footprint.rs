//! Collision geometry: object footprints, the island boundary, and the
//! local mirror of placed objects they are derived from.

use crate::types::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Shapes
// ---------------------------------------------------------------------------

/// Primitive a placed object is built from.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Box,
    Sphere,
    Cylinder,
    Cone,
    Torus,
}

impl ShapeKind {
    /// Ground-plane radius of the unit primitive before scaling.
    ///
    /// Box is a unit cube, the round primitives have radius 0.5, and the
    /// torus is major radius 0.5 plus tube radius 0.2.
    pub fn base_radius(self) -> f32 {
        match self {
            ShapeKind::Box => 0.5,
            ShapeKind::Sphere | ShapeKind::Cylinder | ShapeKind::Cone => 0.5,
            ShapeKind::Torus => 0.7,
        }
    }
}

// ---------------------------------------------------------------------------
// Object descriptors (as reported by the object store)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectDescriptor {
    pub id: String,
    pub kind: ShapeKind,
    pub position: Vec3,
    pub scale: Vec3,
}

impl ObjectDescriptor {
    pub fn new(id: impl Into<String>, kind: ShapeKind, position: Vec3, scale: Vec3) -> Self {
        Self {
            id: id.into(),
            kind,
            position,
            scale,
        }
    }
}

/// Add/update/remove notification from the object store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectChange {
    Added(ObjectDescriptor),
    Updated(ObjectDescriptor),
    Removed { id: String },
}

// ---------------------------------------------------------------------------
// Footprint
// ---------------------------------------------------------------------------

/// Circular collision proxy for a placed object on the XZ plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldObjectFootprint {
    pub kind: ShapeKind,
    pub center_x: f32,
    pub center_z: f32,
    pub radius: f32,
}

impl WorldObjectFootprint {
    pub fn new(kind: ShapeKind, center_x: f32, center_z: f32, radius: f32) -> Self {
        Self {
            kind,
            center_x,
            center_z,
            radius,
        }
    }

    /// Derive a footprint from a descriptor. Non-uniform scale uses the
    /// larger planar axis so the proxy never undershoots the object.
    pub fn from_descriptor(desc: &ObjectDescriptor) -> Self {
        let planar = desc.scale.x.abs().max(desc.scale.z.abs());
        Self::new(
            desc.kind,
            desc.position.x,
            desc.position.z,
            desc.kind.base_radius() * planar,
        )
    }

    /// True when an avatar of `player_radius` centred at `(x, z)` would
    /// overlap this footprint. Height is ignored.
    pub fn blocks(&self, x: f32, z: f32, player_radius: f32) -> bool {
        let dx = x - self.center_x;
        let dz = z - self.center_z;
        (dx * dx + dz * dz).sqrt() < player_radius + self.radius
    }
}

// ---------------------------------------------------------------------------
// Boundary
// ---------------------------------------------------------------------------

/// The circular island edge, centred on the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Boundary {
    pub radius: f32,
}

impl Boundary {
    pub fn new(radius: f32) -> Self {
        Self { radius }
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.planar_length() <= self.radius
    }

    /// Pull `p` back onto the rim if it lies outside. `y` is preserved.
    pub fn clamp(&self, p: Vec3) -> Vec3 {
        let distance = p.planar_length();
        if distance <= self.radius || distance == 0.0 {
            return p;
        }
        let k = self.radius / distance;
        Vec3::new(p.x * k, p.y, p.z * k)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Local mirror of the objects placed in the current world.
///
/// Kept in step with the object store via [`ObjectRegistry::apply`]; the
/// frame loop reads [`ObjectRegistry::footprints`] fresh every frame.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    objects: HashMap<String, ObjectDescriptor>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace by id.
    pub fn insert(&mut self, object: ObjectDescriptor) {
        self.objects.insert(object.id.clone(), object);
    }

    pub fn remove(&mut self, id: &str) -> Option<ObjectDescriptor> {
        self.objects.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&ObjectDescriptor> {
        self.objects.get(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn apply(&mut self, change: ObjectChange) {
        match change {
            ObjectChange::Added(obj) | ObjectChange::Updated(obj) => self.insert(obj),
            ObjectChange::Removed { id } => {
                self.remove(&id);
            }
        }
    }

    pub fn footprints(&self) -> Vec<WorldObjectFootprint> {
        self.objects
            .values()
            .map(WorldObjectFootprint::from_descriptor)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(id: &str, kind: ShapeKind, x: f32, z: f32, sx: f32, sz: f32) -> ObjectDescriptor {
        ObjectDescriptor::new(id, kind, Vec3::new(x, 0.0, z), Vec3::new(sx, 1.0, sz))
    }

    #[test]
    fn radius_follows_shape_and_largest_planar_scale() {
        let b = WorldObjectFootprint::from_descriptor(&desc("b", ShapeKind::Box, 0.0, 0.0, 2.0, 4.0));
        assert!((b.radius - 2.0).abs() < f32::EPSILON);

        let t = WorldObjectFootprint::from_descriptor(&desc("t", ShapeKind::Torus, 0.0, 0.0, 1.0, 1.0));
        assert!((t.radius - 0.7).abs() < f32::EPSILON);

        let c = WorldObjectFootprint::from_descriptor(&desc("c", ShapeKind::Cone, 3.0, -1.0, 3.0, 1.0));
        assert!((c.radius - 1.5).abs() < f32::EPSILON);
        assert_eq!((c.center_x, c.center_z), (3.0, -1.0));
    }

    #[test]
    fn blocks_ignores_height_and_uses_combined_radius() {
        let f = WorldObjectFootprint::new(ShapeKind::Sphere, 5.0, 0.0, 1.0);
        assert!(f.blocks(3.7, 0.0, 0.4));
        assert!(!f.blocks(3.5, 0.0, 0.4));
        assert!(!f.blocks(5.0, 2.0, 0.4));
    }

    #[test]
    fn clamp_rescales_onto_rim() {
        let b = Boundary::new(10.0);
        let p = b.clamp(Vec3::new(30.0, 2.5, 40.0));
        assert!((p.planar_length() - 10.0).abs() < 1e-4);
        assert_eq!(p.y, 2.5);
        assert!((p.x - 6.0).abs() < 1e-4);
        assert!((p.z - 8.0).abs() < 1e-4);
    }

    #[test]
    fn clamp_leaves_inside_points_alone() {
        let b = Boundary::new(10.0);
        let p = Vec3::new(1.0, 0.0, 1.0);
        assert_eq!(b.clamp(p), p);
        assert_eq!(b.clamp(Vec3::zero()), Vec3::zero());
    }

    #[test]
    fn registry_applies_store_changes() {
        let mut r = ObjectRegistry::new();
        r.apply(ObjectChange::Added(desc("a", ShapeKind::Box, 0.0, 0.0, 1.0, 1.0)));
        r.apply(ObjectChange::Updated(desc("a", ShapeKind::Box, 2.0, 0.0, 1.0, 1.0)));
        assert_eq!(r.len(), 1);
        assert_eq!(r.get("a").map(|o| o.position.x), Some(2.0));

        r.apply(ObjectChange::Removed { id: "a".into() });
        assert!(r.is_empty());
        r.apply(ObjectChange::Removed { id: "ghost".into() });
        assert!(r.footprints().is_empty());
    }
}

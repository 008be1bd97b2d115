use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle of an actor living on the simulator side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub u32);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

/// Class of a remote actor, derived from its blueprint family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorKind {
    Vehicle,
    Walker,
    Controller,
    Sensor,
    Other,
}

impl ActorKind {
    /// Classify a blueprint id such as `vehicle.tesla.model3` or `walker.pedestrian.0001`.
    pub fn from_blueprint_id(id: &str) -> Self {
        match id.split('.').next() {
            Some("vehicle") => Self::Vehicle,
            Some("walker") => Self::Walker,
            Some("controller") => Self::Controller,
            Some("sensor") => Self::Sensor,
            _ => Self::Other,
        }
    }
}

/// Euler rotation in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotation {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Rotation {
    pub fn from_yaw(yaw: f32) -> Self {
        Self {
            yaw,
            ..Self::default()
        }
    }

    /// Unit vector the actor faces on the ground plane.
    pub fn forward(&self) -> Vec3 {
        let yaw = self.yaw.to_radians();
        Vec3::new(yaw.cos(), yaw.sin(), 0.0)
    }
}

/// Native spatial transform: location in meters plus rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NativeTransform {
    pub location: Vec3,
    pub rotation: Rotation,
}

impl NativeTransform {
    pub fn new(location: Vec3, rotation: Rotation) -> Self {
        Self { location, rotation }
    }
}

impl Default for NativeTransform {
    fn default() -> Self {
        Self {
            location: Vec3::ZERO,
            rotation: Rotation::default(),
        }
    }
}

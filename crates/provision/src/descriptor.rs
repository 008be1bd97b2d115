use std::fmt;

use glam::DVec2;
use serde::{Deserialize, Serialize};
use simlink_coords::Pose;

/// Scenario-side description of one entity to spawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub blueprint: String,
    #[serde(default)]
    pub role_name: Option<String>,
    /// Scenario ground-plane position in meters.
    pub position: DVec2,
    /// Radians, counter-clockwise from north.
    #[serde(default)]
    pub heading: f64,
    /// Added to the vertical coordinate at spawn.
    #[serde(default)]
    pub elevation: f64,
    #[serde(default = "physics_on")]
    pub physics: bool,
    /// Initial speed in m/s along `heading`.
    #[serde(default)]
    pub speed: Option<f64>,
}

fn physics_on() -> bool {
    true
}

impl EntityDescriptor {
    pub fn new(blueprint: impl Into<String>, position: DVec2) -> Self {
        Self {
            blueprint: blueprint.into(),
            role_name: None,
            position,
            heading: 0.0,
            elevation: 0.0,
            physics: true,
            speed: None,
        }
    }

    pub fn with_role_name(mut self, role_name: impl Into<String>) -> Self {
        self.role_name = Some(role_name.into());
        self
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = heading;
        self
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = elevation;
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn without_physics(mut self) -> Self {
        self.physics = false;
        self
    }

    pub fn pose(&self) -> Pose {
        Pose {
            position: self.position,
            elevation: self.elevation,
            heading: self.heading,
        }
    }
}

/// Identifies a descriptor in errors and on managed entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorRef {
    /// Position in the provisioning order.
    pub index: usize,
    pub blueprint: String,
    pub role_name: Option<String>,
}

impl DescriptorRef {
    pub fn new(index: usize, descriptor: &EntityDescriptor) -> Self {
        Self {
            index,
            blueprint: descriptor.blueprint.clone(),
            role_name: descriptor.role_name.clone(),
        }
    }
}

impl fmt::Display for DescriptorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.index, self.blueprint)?;
        if let Some(role) = &self.role_name {
            write!(f, " ({role})")?;
        }
        Ok(())
    }
}

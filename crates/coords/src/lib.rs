//! Coordinate adapter.
//!
//! Scenario convention: right-handed ground plane, `x` east, `y` north,
//! heading in radians measured counter-clockwise from north, elevation as a
//! separate scalar.
//!
//! Simulator convention: left-handed, z-up, yaw in degrees measured clockwise
//! from `+x`, angular velocity in degrees per second.
//!
//! The two planes differ by a mirrored `y` axis, so `heading = -(yaw + 90°)`.
//!
//! # Invariants
//! - Every function is pure.
//! - `to_native_*` followed by `to_scenario_*` reproduces its input within
//!   `f32` precision; headings come back normalized to `(-π, π]`.

use std::f64::consts::{PI, TAU};

use glam::{DVec2, Vec3};
use serde::{Deserialize, Serialize};
use simlink_common::{NativeTransform, Rotation};

/// Planar pose in scenario convention.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: DVec2,
    pub elevation: f64,
    /// Radians, counter-clockwise from north.
    pub heading: f64,
}

/// Wrap an angle into `(-π, π]`.
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI { wrapped + TAU } else { wrapped }
}

/// Ground-plane location, vertical coordinate left at zero.
pub fn to_native_location(position: DVec2) -> Vec3 {
    Vec3::new(position.x as f32, -position.y as f32, 0.0)
}

pub fn to_native_rotation(heading: f64) -> Rotation {
    Rotation::from_yaw((-heading.to_degrees() - 90.0) as f32)
}

/// Native transform with `pose.elevation` added to the vertical coordinate.
pub fn to_native_transform(pose: &Pose) -> NativeTransform {
    let mut location = to_native_location(pose.position);
    location.z += pose.elevation as f32;
    NativeTransform::new(location, to_native_rotation(pose.heading))
}

/// Velocity vector for travelling at `speed` along `heading`.
pub fn speed_to_native_velocity(speed: f64, heading: f64) -> Vec3 {
    let yaw = to_native_rotation(heading).yaw.to_radians();
    Vec3::new(
        (speed * f64::from(yaw).cos()) as f32,
        (speed * f64::from(yaw).sin()) as f32,
        0.0,
    )
}

/// Planar velocity in scenario convention back into a native vector.
pub fn to_native_velocity(velocity: DVec2) -> Vec3 {
    to_native_location(velocity)
}

pub fn to_scenario_position(location: Vec3) -> DVec2 {
    DVec2::new(f64::from(location.x), -f64::from(location.y))
}

pub fn to_scenario_elevation(location: Vec3) -> f64 {
    f64::from(location.z)
}

pub fn to_scenario_heading(rotation: &Rotation) -> f64 {
    normalize_angle(-(f64::from(rotation.yaw) + 90.0).to_radians())
}

pub fn to_scenario_velocity(velocity: Vec3) -> DVec2 {
    to_scenario_position(velocity)
}

/// Yaw rate in rad/s, counter-clockwise positive.
pub fn to_scenario_angular_speed(angular_velocity: Vec3) -> f64 {
    -f64::from(angular_velocity.z).to_radians()
}

pub fn to_scenario_pose(transform: &NativeTransform) -> Pose {
    Pose {
        position: to_scenario_position(transform.location),
        elevation: to_scenario_elevation(transform.location),
        heading: to_scenario_heading(&transform.rotation),
    }
}

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Driving command for a vehicle actor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleControl {
    /// 0.0 ..= 1.0
    pub throttle: f32,
    /// -1.0 ..= 1.0
    pub steer: f32,
    /// 0.0 ..= 1.0
    pub brake: f32,
    pub hand_brake: bool,
    pub reverse: bool,
    pub manual_gear_shift: bool,
    pub gear: i32,
}

impl VehicleControl {
    /// Manual shift into first gear. Needs one tick to settle on the simulator.
    pub fn first_gear() -> Self {
        Self {
            manual_gear_shift: true,
            gear: 1,
            ..Self::default()
        }
    }

    /// Hands gear selection back to the automatic gearbox.
    pub fn automatic() -> Self {
        Self {
            manual_gear_shift: false,
            ..Self::default()
        }
    }

    pub fn throttle(throttle: f32) -> Self {
        Self {
            throttle: throttle.clamp(0.0, 1.0),
            ..Self::default()
        }
    }
}

/// Locomotion command for a walker actor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerControl {
    pub direction: Vec3,
    /// m/s
    pub speed: f32,
    pub jump: bool,
}

impl Default for WalkerControl {
    fn default() -> Self {
        Self {
            direction: Vec3::X,
            speed: 0.0,
            jump: false,
        }
    }
}

/// A control command addressed to one actor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    Vehicle(VehicleControl),
    Walker(WalkerControl),
}

impl From<VehicleControl> for Control {
    fn from(control: VehicleControl) -> Self {
        Self::Vehicle(control)
    }
}

impl From<WalkerControl> for Control {
    fn from(control: WalkerControl) -> Self {
        Self::Walker(control)
    }
}

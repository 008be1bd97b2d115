//! Simulator client boundary.
//!
//! The controller never talks to a transport directly. It consumes the
//! [`Connector`] and [`SimulatorClient`] traits, whose methods map one-to-one
//! onto the blocking RPC calls exposed by the remote simulator.
//!
//! # Invariants
//! - Every method is a single blocking round-trip. Nothing here retries.
//! - `try_spawn_actor` reports a refused spawn as `Ok(None)`; `Err` is reserved
//!   for transport or protocol failures.

pub mod blueprint;
pub mod control;
pub mod loopback;
pub mod settings;

use std::time::Duration;

use glam::Vec3;
use simlink_common::{ActorId, ActorKind, NativeTransform};

pub use blueprint::Blueprint;
pub use control::{Control, VehicleControl, WalkerControl};
pub use loopback::{LoopbackClient, LoopbackServer, SimEvent};
pub use settings::{Weather, WeatherParameters, WorldSettings};

/// Errors reported by a simulator client.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("connection to {address}:{port} refused: {reason}")]
    Connect {
        address: String,
        port: u16,
        reason: String,
    },
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("map not found: {0}")]
    MapNotFound(String),
    #[error("invalid track description: {0}")]
    InvalidTrack(String),
    #[error("unknown weather preset: {0}")]
    UnknownWeatherPreset(String),
    #[error("blueprint not found: {0}")]
    BlueprintNotFound(String),
    #[error("{0} does not exist")]
    ActorNotFound(ActorId),
    #[error("remote call failed: {0}")]
    Remote(String),
}

/// Where and how long to wait when connecting.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
    pub timeout: Duration,
}

/// A freshly spawned actor as reported by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnedActor {
    pub id: ActorId,
    pub kind: ActorKind,
}

/// One frame captured by a camera sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraImage {
    /// Simulator frame the image was captured on.
    pub frame: u64,
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGB8 pixels, row-major.
    pub pixels: Vec<u8>,
}

/// Opens connections to a simulator.
pub trait Connector {
    type Client: SimulatorClient;

    fn connect(&self, endpoint: &Endpoint) -> Result<Self::Client, ClientError>;
}

/// Blocking RPC surface of a connected simulator.
pub trait SimulatorClient {
    fn load_world(&mut self, map: &str) -> Result<(), ClientError>;

    /// Build a world from an inline track description (OpenDRIVE text).
    fn generate_world(&mut self, track: &str) -> Result<(), ClientError>;

    fn set_weather(&mut self, weather: &Weather) -> Result<(), ClientError>;

    fn world_settings(&mut self) -> Result<WorldSettings, ClientError>;

    fn apply_world_settings(&mut self, settings: &WorldSettings) -> Result<(), ClientError>;

    /// Toggle synchronous mode on the traffic-control subsystem.
    fn set_traffic_synchronous(&mut self, enabled: bool) -> Result<(), ClientError>;

    fn find_blueprint(&mut self, id: &str) -> Result<Blueprint, ClientError>;

    fn try_spawn_actor(
        &mut self,
        blueprint: &Blueprint,
        transform: &NativeTransform,
        parent: Option<ActorId>,
    ) -> Result<Option<SpawnedActor>, ClientError>;

    /// Returns `false` when the actor was already gone.
    fn destroy_actor(&mut self, actor: ActorId) -> Result<bool, ClientError>;

    fn apply_control(&mut self, actor: ActorId, control: &Control) -> Result<(), ClientError>;

    fn set_simulate_physics(&mut self, actor: ActorId, enabled: bool) -> Result<(), ClientError>;

    fn set_target_velocity(&mut self, actor: ActorId, velocity: Vec3) -> Result<(), ClientError>;

    fn stop_controller(&mut self, controller: ActorId) -> Result<(), ClientError>;

    fn actor_transform(&mut self, actor: ActorId) -> Result<NativeTransform, ClientError>;

    /// Linear velocity in m/s.
    fn actor_velocity(&mut self, actor: ActorId) -> Result<Vec3, ClientError>;

    /// Angular velocity in deg/s.
    fn actor_angular_velocity(&mut self, actor: ActorId) -> Result<Vec3, ClientError>;

    /// Latest image produced by a camera sensor, if it has produced one yet.
    fn camera_image(&mut self, sensor: ActorId) -> Result<Option<CameraImage>, ClientError>;

    /// Advance the world one step. Blocks until the simulator reports the
    /// step complete and returns the new frame number.
    fn tick(&mut self) -> Result<u64, ClientError>;
}

//! In-process simulator speaking the [`SimulatorClient`] protocol.
//!
//! The loopback world keeps every actor in a BTreeMap for deterministic
//! iteration and records each accepted call in an append-only [`SimEvent`]
//! log, so callers can assert on the exact order of remote operations.
//! Faults (refused connections, refused spawns, failing ticks) can be
//! injected when the server is built.
//!
//! Kinematics are minimal: vehicles accelerate along their heading
//! from throttle/brake and turn from steer, walkers follow their control
//! direction, and everything else keeps whatever velocity was last set.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use glam::Vec3;
use simlink_common::{ActorId, ActorKind, NativeTransform, Rotation};

use crate::blueprint::{IS_INVINCIBLE, ROLE_NAME};
use crate::{
    Blueprint, CameraImage, ClientError, Connector, Control, Endpoint, SimulatorClient,
    SpawnedActor, Weather, WeatherParameters, WorldSettings,
};

/// Simulated seconds per tick when no fixed timestep is configured.
const DEFAULT_DELTA_SECONDS: f64 = 0.05;
/// m/s^2 at full throttle.
const VEHICLE_ACCELERATION: f32 = 4.0;
/// m/s^2 at full brake.
const VEHICLE_BRAKING: f32 = 8.0;
/// deg/s at full steer.
const MAX_YAW_RATE: f32 = 45.0;
const DEFAULT_IMAGE_SIZE: (u32, u32) = (800, 600);

const STOCK_MAPS: [&str; 6] = ["Town01", "Town02", "Town03", "Town04", "Town05", "Town10HD"];

/// A record of every accepted mutation on the loopback world.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Connected {
        client: u32,
    },
    WorldLoaded {
        map: String,
    },
    WorldGenerated {
        bytes: usize,
    },
    WeatherSet {
        weather: WeatherParameters,
    },
    SettingsApplied {
        settings: WorldSettings,
    },
    TrafficSynchronous {
        enabled: bool,
    },
    Spawned {
        id: ActorId,
        blueprint: Blueprint,
        parent: Option<ActorId>,
        transform: NativeTransform,
    },
    SpawnRefused {
        blueprint: String,
    },
    Destroyed {
        id: ActorId,
    },
    ControlApplied {
        id: ActorId,
        control: Control,
    },
    PhysicsSet {
        id: ActorId,
        enabled: bool,
    },
    VelocitySet {
        id: ActorId,
        velocity: Vec3,
    },
    ControllerStopped {
        id: ActorId,
    },
    Ticked {
        frame: u64,
    },
}

/// Server-side state of one actor.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorRecord {
    pub blueprint: Blueprint,
    pub kind: ActorKind,
    pub parent: Option<ActorId>,
    /// Relative to the parent when attached, world otherwise.
    pub transform: NativeTransform,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub simulate_physics: bool,
    pub control: Option<Control>,
}

#[derive(Debug, Default)]
struct Faults {
    refuse_connections: Option<String>,
    rejected_blueprints: BTreeSet<String>,
    rejected_spawn_attempt: Option<u64>,
    failing_frame: Option<u64>,
    failing_settings_read: Option<u64>,
}

#[derive(Debug)]
struct LoopbackWorld {
    maps: BTreeSet<String>,
    current_map: Option<String>,
    actors: BTreeMap<ActorId, ActorRecord>,
    next_actor: u32,
    next_client: u32,
    frame: u64,
    settings: WorldSettings,
    traffic_synchronous: bool,
    weather: WeatherParameters,
    spawn_attempts: u64,
    settings_reads: u64,
    events: Vec<SimEvent>,
    faults: Faults,
}

impl Default for LoopbackWorld {
    fn default() -> Self {
        Self {
            maps: STOCK_MAPS.iter().map(|m| m.to_string()).collect(),
            current_map: None,
            actors: BTreeMap::new(),
            next_actor: 1,
            next_client: 1,
            frame: 0,
            settings: WorldSettings::default(),
            traffic_synchronous: false,
            weather: WeatherParameters::default(),
            spawn_attempts: 0,
            settings_reads: 0,
            events: Vec::new(),
            faults: Faults::default(),
        }
    }
}

impl LoopbackWorld {
    fn actor(&self, id: ActorId) -> Result<&ActorRecord, ClientError> {
        self.actors.get(&id).ok_or(ClientError::ActorNotFound(id))
    }

    fn actor_mut(&mut self, id: ActorId) -> Result<&mut ActorRecord, ClientError> {
        self.actors.get_mut(&id).ok_or(ClientError::ActorNotFound(id))
    }

    /// Resolve an attached actor's transform into world space.
    fn world_transform(&self, id: ActorId) -> Result<NativeTransform, ClientError> {
        let actor = self.actor(id)?;
        match actor.parent {
            Some(parent) => {
                let base = self.world_transform(parent)?;
                Ok(NativeTransform::new(
                    base.location + actor.transform.location,
                    Rotation {
                        pitch: base.rotation.pitch + actor.transform.rotation.pitch,
                        yaw: base.rotation.yaw + actor.transform.rotation.yaw,
                        roll: base.rotation.roll + actor.transform.rotation.roll,
                    },
                ))
            }
            None => Ok(actor.transform),
        }
    }

    fn step(&mut self) {
        let dt = self.settings.fixed_delta_seconds.unwrap_or(DEFAULT_DELTA_SECONDS) as f32;
        for actor in self.actors.values_mut() {
            if actor.parent.is_some() || !actor.simulate_physics {
                continue;
            }
            match (actor.kind, actor.control) {
                (ActorKind::Vehicle, Some(Control::Vehicle(c))) => {
                    let mut speed = actor.velocity.dot(actor.transform.rotation.forward());
                    let direction = if c.reverse { -1.0 } else { 1.0 };
                    speed += direction * c.throttle * VEHICLE_ACCELERATION * dt;
                    let braking = if c.hand_brake { 1.0 } else { c.brake };
                    speed = approach_zero(speed, braking * VEHICLE_BRAKING * dt);
                    let yaw_rate = if speed.abs() > 0.1 {
                        c.steer * MAX_YAW_RATE
                    } else {
                        0.0
                    };
                    actor.angular_velocity = Vec3::new(0.0, 0.0, yaw_rate);
                    actor.transform.rotation.yaw += yaw_rate * dt;
                    actor.velocity = actor.transform.rotation.forward() * speed;
                }
                (ActorKind::Walker, Some(Control::Walker(c))) if c.speed > 0.0 => {
                    actor.velocity = c.direction.normalize_or_zero() * c.speed;
                }
                _ => {}
            }
            actor.transform.location += actor.velocity * dt;
        }
        self.frame += 1;
    }
}

fn approach_zero(value: f32, amount: f32) -> f32 {
    if value > 0.0 {
        (value - amount).max(0.0)
    } else {
        (value + amount).min(0.0)
    }
}

fn lock(world: &Mutex<LoopbackWorld>) -> MutexGuard<'_, LoopbackWorld> {
    world.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The shared loopback simulator. Cloning yields another handle to the same world.
#[derive(Debug, Clone, Default)]
pub struct LoopbackServer {
    world: Arc<Mutex<LoopbackWorld>>,
}

impl LoopbackServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an extra map available to `load_world`.
    pub fn with_map(self, map: impl Into<String>) -> Self {
        lock(&self.world).maps.insert(map.into());
        self
    }

    /// Refuse every connection attempt with the given reason.
    pub fn refusing_connections(self, reason: impl Into<String>) -> Self {
        lock(&self.world).faults.refuse_connections = Some(reason.into());
        self
    }

    /// Refuse every spawn of the given blueprint id.
    pub fn rejecting_blueprint(self, id: impl Into<String>) -> Self {
        lock(&self.world).faults.rejected_blueprints.insert(id.into());
        self
    }

    /// Refuse the n-th spawn attempt (1-based, counted across all blueprints).
    pub fn rejecting_spawn_attempt(self, attempt: u64) -> Self {
        lock(&self.world).faults.rejected_spawn_attempt = Some(attempt);
        self
    }

    /// Fail the tick that would produce the given frame.
    pub fn failing_tick(self, frame: u64) -> Self {
        lock(&self.world).faults.failing_frame = Some(frame);
        self
    }

    /// Fail the n-th world settings read (1-based, counted across all clients).
    pub fn failing_settings_read(self, read: u64) -> Self {
        lock(&self.world).faults.failing_settings_read = Some(read);
        self
    }

    /// Overwrite the world settings, as another client sharing the simulator would.
    pub fn set_world_settings(&self, settings: WorldSettings) {
        lock(&self.world).settings = settings;
    }

    pub fn events(&self) -> Vec<SimEvent> {
        lock(&self.world).events.clone()
    }

    pub fn live_actors(&self) -> Vec<ActorId> {
        lock(&self.world).actors.keys().copied().collect()
    }

    pub fn actor(&self, id: ActorId) -> Option<ActorRecord> {
        lock(&self.world).actors.get(&id).cloned()
    }

    pub fn world_settings(&self) -> WorldSettings {
        lock(&self.world).settings
    }

    pub fn traffic_synchronous(&self) -> bool {
        lock(&self.world).traffic_synchronous
    }

    pub fn current_map(&self) -> Option<String> {
        lock(&self.world).current_map.clone()
    }

    pub fn weather(&self) -> WeatherParameters {
        lock(&self.world).weather
    }

    pub fn frame(&self) -> u64 {
        lock(&self.world).frame
    }
}

impl Connector for LoopbackServer {
    type Client = LoopbackClient;

    fn connect(&self, endpoint: &Endpoint) -> Result<LoopbackClient, ClientError> {
        let mut world = lock(&self.world);
        if let Some(reason) = &world.faults.refuse_connections {
            return Err(ClientError::Connect {
                address: endpoint.address.clone(),
                port: endpoint.port,
                reason: reason.clone(),
            });
        }
        if endpoint.timeout.is_zero() {
            return Err(ClientError::Timeout(endpoint.timeout));
        }
        let client = world.next_client;
        world.next_client += 1;
        world.events.push(SimEvent::Connected { client });
        tracing::debug!(client, address = %endpoint.address, port = endpoint.port, "loopback connection accepted");
        Ok(LoopbackClient {
            world: Arc::clone(&self.world),
        })
    }
}

/// A connection to a [`LoopbackServer`].
#[derive(Debug, Clone)]
pub struct LoopbackClient {
    world: Arc<Mutex<LoopbackWorld>>,
}

impl LoopbackClient {
    fn world(&self) -> MutexGuard<'_, LoopbackWorld> {
        lock(&self.world)
    }
}

impl SimulatorClient for LoopbackClient {
    fn load_world(&mut self, map: &str) -> Result<(), ClientError> {
        let mut world = self.world();
        if !world.maps.contains(map) {
            return Err(ClientError::MapNotFound(map.to_string()));
        }
        world.actors.clear();
        world.current_map = Some(map.to_string());
        world.events.push(SimEvent::WorldLoaded {
            map: map.to_string(),
        });
        Ok(())
    }

    fn generate_world(&mut self, track: &str) -> Result<(), ClientError> {
        if !track.contains("<OpenDRIVE") {
            return Err(ClientError::InvalidTrack(
                "missing <OpenDRIVE> root element".into(),
            ));
        }
        let mut world = self.world();
        world.actors.clear();
        world.current_map = Some("OpenDriveMap".into());
        world.events.push(SimEvent::WorldGenerated { bytes: track.len() });
        Ok(())
    }

    fn set_weather(&mut self, weather: &Weather) -> Result<(), ClientError> {
        let params = match weather {
            Weather::Preset(name) => WeatherParameters::preset(name)
                .ok_or_else(|| ClientError::UnknownWeatherPreset(name.clone()))?,
            Weather::Parameters(params) => *params,
        };
        let mut world = self.world();
        world.weather = params;
        world.events.push(SimEvent::WeatherSet { weather: params });
        Ok(())
    }

    fn world_settings(&mut self) -> Result<WorldSettings, ClientError> {
        let mut world = self.world();
        world.settings_reads += 1;
        if world.faults.failing_settings_read == Some(world.settings_reads) {
            return Err(ClientError::Remote("world settings unavailable".into()));
        }
        Ok(world.settings)
    }

    fn apply_world_settings(&mut self, settings: &WorldSettings) -> Result<(), ClientError> {
        let mut world = self.world();
        world.settings = *settings;
        world.events.push(SimEvent::SettingsApplied {
            settings: *settings,
        });
        Ok(())
    }

    fn set_traffic_synchronous(&mut self, enabled: bool) -> Result<(), ClientError> {
        let mut world = self.world();
        world.traffic_synchronous = enabled;
        world.events.push(SimEvent::TrafficSynchronous { enabled });
        Ok(())
    }

    fn find_blueprint(&mut self, id: &str) -> Result<Blueprint, ClientError> {
        let blueprint = Blueprint::new(id);
        match blueprint.kind() {
            ActorKind::Vehicle => Ok(blueprint.with_attribute(ROLE_NAME, "")),
            ActorKind::Walker => Ok(blueprint
                .with_attribute(ROLE_NAME, "")
                .with_attribute(IS_INVINCIBLE, "true")),
            ActorKind::Sensor => Ok(blueprint
                .with_attribute(ROLE_NAME, "")
                .with_attribute("image_size_x", DEFAULT_IMAGE_SIZE.0.to_string())
                .with_attribute("image_size_y", DEFAULT_IMAGE_SIZE.1.to_string())
                .with_attribute("fov", "90")),
            ActorKind::Controller => Ok(blueprint),
            ActorKind::Other if id.starts_with("static.") => Ok(blueprint),
            ActorKind::Other => Err(ClientError::BlueprintNotFound(id.to_string())),
        }
    }

    fn try_spawn_actor(
        &mut self,
        blueprint: &Blueprint,
        transform: &NativeTransform,
        parent: Option<ActorId>,
    ) -> Result<Option<SpawnedActor>, ClientError> {
        let mut world = self.world();
        if let Some(parent) = parent {
            world.actor(parent)?;
        }
        world.spawn_attempts += 1;
        let attempt = world.spawn_attempts;
        let refused = world.faults.rejected_blueprints.contains(blueprint.id())
            || world.faults.rejected_spawn_attempt == Some(attempt);
        if refused {
            world.events.push(SimEvent::SpawnRefused {
                blueprint: blueprint.id().to_string(),
            });
            return Ok(None);
        }

        let id = ActorId(world.next_actor);
        world.next_actor += 1;
        let kind = blueprint.kind();
        world.actors.insert(
            id,
            ActorRecord {
                blueprint: blueprint.clone(),
                kind,
                parent,
                transform: *transform,
                velocity: Vec3::ZERO,
                angular_velocity: Vec3::ZERO,
                simulate_physics: true,
                control: None,
            },
        );
        world.events.push(SimEvent::Spawned {
            id,
            blueprint: blueprint.clone(),
            parent,
            transform: *transform,
        });
        Ok(Some(SpawnedActor { id, kind }))
    }

    fn destroy_actor(&mut self, actor: ActorId) -> Result<bool, ClientError> {
        let mut world = self.world();
        if world.actors.remove(&actor).is_none() {
            return Ok(false);
        }
        world.events.push(SimEvent::Destroyed { id: actor });
        Ok(true)
    }

    fn apply_control(&mut self, actor: ActorId, control: &Control) -> Result<(), ClientError> {
        let mut world = self.world();
        world.actor_mut(actor)?.control = Some(*control);
        world.events.push(SimEvent::ControlApplied {
            id: actor,
            control: *control,
        });
        Ok(())
    }

    fn set_simulate_physics(&mut self, actor: ActorId, enabled: bool) -> Result<(), ClientError> {
        let mut world = self.world();
        world.actor_mut(actor)?.simulate_physics = enabled;
        world.events.push(SimEvent::PhysicsSet { id: actor, enabled });
        Ok(())
    }

    fn set_target_velocity(&mut self, actor: ActorId, velocity: Vec3) -> Result<(), ClientError> {
        let mut world = self.world();
        world.actor_mut(actor)?.velocity = velocity;
        world.events.push(SimEvent::VelocitySet {
            id: actor,
            velocity,
        });
        Ok(())
    }

    fn stop_controller(&mut self, controller: ActorId) -> Result<(), ClientError> {
        let mut world = self.world();
        let record = world.actor(controller)?;
        if record.kind != ActorKind::Controller {
            return Err(ClientError::Remote(format!(
                "{controller} is not a controller"
            )));
        }
        world.events.push(SimEvent::ControllerStopped { id: controller });
        Ok(())
    }

    fn actor_transform(&mut self, actor: ActorId) -> Result<NativeTransform, ClientError> {
        self.world().world_transform(actor)
    }

    fn actor_velocity(&mut self, actor: ActorId) -> Result<Vec3, ClientError> {
        Ok(self.world().actor(actor)?.velocity)
    }

    fn actor_angular_velocity(&mut self, actor: ActorId) -> Result<Vec3, ClientError> {
        Ok(self.world().actor(actor)?.angular_velocity)
    }

    fn camera_image(&mut self, sensor: ActorId) -> Result<Option<CameraImage>, ClientError> {
        let world = self.world();
        let record = world.actor(sensor)?;
        if record.kind != ActorKind::Sensor {
            return Err(ClientError::Remote(format!("{sensor} is not a sensor")));
        }
        if world.frame == 0 {
            return Ok(None);
        }
        let dimension = |key: &str, default: u32| {
            record
                .blueprint
                .attribute(key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let width = dimension("image_size_x", DEFAULT_IMAGE_SIZE.0);
        let height = dimension("image_size_y", DEFAULT_IMAGE_SIZE.1);
        let shade = (world.frame % 256) as u8;
        Ok(Some(CameraImage {
            frame: world.frame,
            width,
            height,
            pixels: vec![shade; width as usize * height as usize * 3],
        }))
    }

    fn tick(&mut self) -> Result<u64, ClientError> {
        let mut world = self.world();
        if world.faults.failing_frame == Some(world.frame + 1) {
            return Err(ClientError::Remote(format!(
                "tick to frame {} failed",
                world.frame + 1
            )));
        }
        world.step();
        let frame = world.frame;
        world.events.push(SimEvent::Ticked { frame });
        Ok(frame)
    }
}

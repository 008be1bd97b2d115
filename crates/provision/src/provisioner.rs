use simlink_client::blueprint::{IS_INVINCIBLE, ROLE_NAME};
use simlink_client::{ClientError, Control, SimulatorClient, VehicleControl, WalkerControl};
use simlink_common::{ActorId, ActorKind, NativeTransform};
use simlink_present::{CameraRig, RigSpec, CAMERA_BLUEPRINT};

use crate::log::{Created, SpawnLog};
use crate::{DescriptorRef, EntityClass, EntityDescriptor, GearSettle, ManagedEntity};

/// Blueprint of the AI controller attached to every pedestrian.
pub const WALKER_CONTROLLER_BLUEPRINT: &str = "controller.ai.walker";

/// Errors from provisioning. Every variant is reported after a full rollback.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("unable to spawn entity {0}")]
    Spawn(DescriptorRef),
    #[error("unable to spawn walker controller for entity {0}")]
    ControllerSpawn(DescriptorRef),
    #[error("unable to spawn camera rig for entity {0}")]
    RigSpawn(DescriptorRef),
    #[error("simulator call failed while provisioning")]
    Client {
        /// `None` for calls made after all entities were spawned.
        entity: Option<DescriptorRef>,
        #[source]
        source: ClientError,
    },
}

impl ProvisionError {
    /// The descriptor whose provisioning failed, when one can be named.
    pub fn descriptor(&self) -> Option<&DescriptorRef> {
        match self {
            Self::Spawn(d) | Self::ControllerSpawn(d) | Self::RigSpawn(d) => Some(d),
            Self::Client { entity, .. } => entity.as_ref(),
        }
    }
}

fn remote(entity: &DescriptorRef) -> impl FnOnce(ClientError) -> ProvisionError + '_ {
    move |source| ProvisionError::Client {
        entity: Some(entity.clone()),
        source,
    }
}

fn settle(source: ClientError) -> ProvisionError {
    ProvisionError::Client {
        entity: None,
        source,
    }
}

/// Spawn every descriptor in order and settle them.
///
/// `rig` is built on the first descriptor only. On failure nothing created by
/// this call survives, and one tick is issued to flush the destroys.
pub fn provision<C: SimulatorClient>(
    client: &mut C,
    descriptors: &[EntityDescriptor],
    rig: Option<&RigSpec>,
) -> Result<Vec<ManagedEntity>, ProvisionError> {
    let _span = tracing::info_span!("provision", entities = descriptors.len()).entered();
    let mut log = SpawnLog::new();
    match spawn_all(client, descriptors, rig, &mut log) {
        Ok(entities) => {
            log.commit();
            tracing::info!(entities = entities.len(), "entities provisioned");
            Ok(entities)
        }
        Err(err) => {
            tracing::warn!(error = %err, created = log.len(), "provisioning failed, rolling back");
            let rolled_back = log.len();
            let cleanup_errors = log.unwind(client);
            if rolled_back > 0 {
                if let Err(tick_err) = client.tick() {
                    tracing::warn!(error = %tick_err, "flush tick after rollback failed");
                }
            }
            if !cleanup_errors.is_empty() {
                tracing::warn!(failures = cleanup_errors.len(), "rollback was incomplete");
            }
            Err(err)
        }
    }
}

fn spawn_all<C: SimulatorClient>(
    client: &mut C,
    descriptors: &[EntityDescriptor],
    rig: Option<&RigSpec>,
    log: &mut SpawnLog,
) -> Result<Vec<ManagedEntity>, ProvisionError> {
    let mut entities = Vec::with_capacity(descriptors.len());
    for (index, descriptor) in descriptors.iter().enumerate() {
        let rig = if index == 0 { rig } else { None };
        entities.push(spawn_one(client, index, descriptor, rig, log)?);
    }

    // Let the manual gear shift take effect before releasing it.
    client.tick().map_err(settle)?;
    let automatic = Control::from(VehicleControl::automatic());
    for entity in &mut entities {
        let actor = entity.actor();
        if let EntityClass::Vehicle { gear } = entity.class_mut() {
            client.apply_control(actor, &automatic).map_err(settle)?;
            *gear = GearSettle::Released;
        }
    }
    client.tick().map_err(settle)?;

    for (entity, descriptor) in entities.iter().zip(descriptors) {
        if let Some(speed) = descriptor.speed {
            let velocity = simlink_coords::speed_to_native_velocity(speed, descriptor.heading);
            client
                .set_target_velocity(entity.actor(), velocity)
                .map_err(remote(entity.descriptor()))?;
            tracing::debug!(entity = %entity.descriptor(), speed, "initial speed set");
        }
    }
    Ok(entities)
}

fn spawn_one<C: SimulatorClient>(
    client: &mut C,
    index: usize,
    descriptor: &EntityDescriptor,
    rig: Option<&RigSpec>,
    log: &mut SpawnLog,
) -> Result<ManagedEntity, ProvisionError> {
    let entity = DescriptorRef::new(index, descriptor);

    let mut blueprint = client
        .find_blueprint(&descriptor.blueprint)
        .map_err(remote(&entity))?;
    if let Some(role_name) = &descriptor.role_name {
        blueprint.set_attribute(ROLE_NAME, role_name.as_str());
    }
    // Pedestrians must take damage and collide like everything else.
    if blueprint.has_attribute(IS_INVINCIBLE) {
        blueprint.set_attribute(IS_INVINCIBLE, "false");
    }

    let transform = simlink_coords::to_native_transform(&descriptor.pose());
    let Some(spawned) = client
        .try_spawn_actor(&blueprint, &transform, None)
        .map_err(remote(&entity))?
    else {
        return Err(ProvisionError::Spawn(entity));
    };
    log.record(Created::Actor(spawned.id));
    tracing::debug!(%entity, actor = %spawned.id, kind = ?spawned.kind, "actor spawned");

    client
        .set_simulate_physics(spawned.id, descriptor.physics)
        .map_err(remote(&entity))?;

    let class = match spawned.kind {
        ActorKind::Vehicle => {
            client
                .apply_control(spawned.id, &VehicleControl::first_gear().into())
                .map_err(remote(&entity))?;
            EntityClass::Vehicle {
                gear: GearSettle::FirstGearHeld,
            }
        }
        ActorKind::Walker => {
            client
                .apply_control(spawned.id, &WalkerControl::default().into())
                .map_err(remote(&entity))?;
            let controller = spawn_walker_controller(client, spawned.id, &entity, log)?;
            EntityClass::Pedestrian { controller }
        }
        _ => EntityClass::Other,
    };

    let rig = match rig {
        Some(spec) => Some(spawn_camera(client, spec, spawned.id, &entity, log)?),
        None => None,
    };

    Ok(ManagedEntity::new(entity, spawned.id, class, rig))
}

fn spawn_walker_controller<C: SimulatorClient>(
    client: &mut C,
    walker: ActorId,
    entity: &DescriptorRef,
    log: &mut SpawnLog,
) -> Result<ActorId, ProvisionError> {
    let blueprint = client
        .find_blueprint(WALKER_CONTROLLER_BLUEPRINT)
        .map_err(remote(entity))?;
    let spawned = client
        .try_spawn_actor(&blueprint, &NativeTransform::default(), Some(walker))
        .map_err(remote(entity))?
        .ok_or_else(|| ProvisionError::ControllerSpawn(entity.clone()))?;
    log.record(Created::Controller(spawned.id));
    tracing::debug!(%entity, controller = %spawned.id, "walker controller attached");
    Ok(spawned.id)
}

fn spawn_camera<C: SimulatorClient>(
    client: &mut C,
    spec: &RigSpec,
    parent: ActorId,
    entity: &DescriptorRef,
    log: &mut SpawnLog,
) -> Result<CameraRig, ProvisionError> {
    let mut blueprint = client
        .find_blueprint(CAMERA_BLUEPRINT)
        .map_err(remote(entity))?;
    for (key, value) in spec.attributes() {
        blueprint.set_attribute(key, value);
    }
    let spawned = client
        .try_spawn_actor(&blueprint, &spec.mount_transform(), Some(parent))
        .map_err(remote(entity))?
        .ok_or_else(|| ProvisionError::RigSpawn(entity.clone()))?;
    log.record(Created::Sensor(spawned.id));
    tracing::debug!(%entity, sensor = %spawned.id, mount = ?spec.mount, "camera rig attached");
    Ok(CameraRig {
        sensor: spawned.id,
        spec: *spec,
    })
}

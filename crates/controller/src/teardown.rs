use simlink_client::{ClientError, SimulatorClient};
use simlink_common::ActorId;
use simlink_provision::ManagedEntity;

/// Release every remote resource owned by `entities`.
///
/// Runs in three passes so that no actor is destroyed while anything is still
/// attached to it: walker controllers (stopped, then destroyed), then the
/// camera rig, then the entity actors. Every release is attempted; failures
/// are logged and returned in the order they happened.
pub fn release_entities<C: SimulatorClient>(
    client: &mut C,
    mut entities: Vec<ManagedEntity>,
) -> Vec<ClientError> {
    let mut errors = Vec::new();

    for entity in &entities {
        if let Some(controller) = entity.controller() {
            if let Err(err) = client.stop_controller(controller) {
                tracing::warn!(entity = %entity.descriptor(), error = %err, "failed to stop walker controller");
                errors.push(err);
            }
            destroy(client, controller, "walker controller", &mut errors);
        }
    }

    for entity in &mut entities {
        if let Some(rig) = entity.take_rig() {
            destroy(client, rig.sensor, "camera rig", &mut errors);
        }
    }

    for entity in &entities {
        destroy(client, entity.actor(), "entity actor", &mut errors);
    }
    errors
}

fn destroy<C: SimulatorClient>(
    client: &mut C,
    actor: ActorId,
    what: &'static str,
    errors: &mut Vec<ClientError>,
) {
    match client.destroy_actor(actor) {
        Ok(true) => tracing::debug!(%actor, what, "destroyed"),
        Ok(false) => tracing::debug!(%actor, what, "already gone"),
        Err(err) => {
            tracing::warn!(%actor, what, error = %err, "destroy failed");
            errors.push(err);
        }
    }
}

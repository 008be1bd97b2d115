//! The three phases of a step, kept as separate passes over all entities.

use simlink_client::{ClientError, Control, SimulatorClient};
use simlink_common::ActorId;
use simlink_present::{Frame, Presenter};
use simlink_provision::{DescriptorRef, EntityState, ManagedEntity};

use crate::readback;

/// Drain every pending slot, then apply the drained commands in entity order.
///
/// Slots are emptied up front so they are empty after this call even when an
/// apply fails part way through.
pub fn apply_pending<C: SimulatorClient>(
    client: &mut C,
    entities: &mut [ManagedEntity],
) -> Result<usize, ClientError> {
    let drained: Vec<(ActorId, Control)> = entities
        .iter_mut()
        .filter_map(|entity| entity.take_pending().map(|control| (entity.actor(), control)))
        .collect();
    for (actor, control) in &drained {
        client.apply_control(*actor, control)?;
        tracing::debug!(%actor, ?control, "control applied");
    }
    Ok(drained.len())
}

/// Hand the primary's latest camera frame to every presenter.
///
/// Nothing here can fail the step: a missing frame is skipped and errors are
/// logged.
pub fn present<C: SimulatorClient>(
    client: &mut C,
    entities: &[ManagedEntity],
    step: u64,
    presenters: &mut [Box<dyn Presenter>],
) {
    if presenters.is_empty() {
        return;
    }
    let Some(rig) = entities.first().and_then(ManagedEntity::rig) else {
        return;
    };
    let image = match client.camera_image(rig.sensor) {
        Ok(Some(image)) => image,
        Ok(None) => {
            tracing::debug!(step, "camera has not produced a frame yet");
            return;
        }
        Err(err) => {
            tracing::warn!(step, error = %err, "failed to fetch camera frame");
            return;
        }
    };
    let frame = Frame {
        step,
        image: &image,
    };
    for presenter in presenters.iter_mut() {
        if let Err(err) = presenter.present(&frame) {
            tracing::warn!(step, error = %err, "presentation failed");
        }
    }
}

/// Read back and store the state of every entity.
pub fn read_back<C: SimulatorClient>(
    client: &mut C,
    entities: &mut [ManagedEntity],
) -> Result<Vec<EntityState>, (DescriptorRef, ClientError)> {
    let mut states = Vec::with_capacity(entities.len());
    for entity in entities.iter_mut() {
        let state = readback::read_state(client, entity.actor())
            .map_err(|err| (entity.descriptor().clone(), err))?;
        entity.record_state(state);
        states.push(state);
    }
    Ok(states)
}

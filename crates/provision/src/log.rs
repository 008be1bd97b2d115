use simlink_client::{ClientError, SimulatorClient};
use simlink_common::ActorId;

/// A remote resource created during one provisioning call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Created {
    Actor(ActorId),
    /// Must be stopped before it is destroyed.
    Controller(ActorId),
    Sensor(ActorId),
}

impl Created {
    pub fn id(&self) -> ActorId {
        match *self {
            Self::Actor(id) | Self::Controller(id) | Self::Sensor(id) => id,
        }
    }
}

/// Transaction log of everything a provisioning call has created so far.
///
/// Children are always recorded after their parent, so unwinding in reverse
/// creation order releases controllers and sensors before the actor they
/// are attached to.
#[derive(Debug, Default)]
#[must_use = "a spawn log must be committed or unwound"]
pub struct SpawnLog {
    created: Vec<Created>,
}

impl SpawnLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, created: Created) {
        self.created.push(created);
    }

    pub fn len(&self) -> usize {
        self.created.len()
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }

    pub fn entries(&self) -> &[Created] {
        &self.created
    }

    /// Keep everything; ownership has moved to the managed entities.
    pub fn commit(self) {
        tracing::debug!(resources = self.created.len(), "spawn log committed");
    }

    /// Destroy everything in reverse creation order.
    ///
    /// Every entry is attempted; failures are logged and returned.
    pub fn unwind<C: SimulatorClient>(self, client: &mut C) -> Vec<ClientError> {
        let mut errors = Vec::new();
        for created in self.created.into_iter().rev() {
            if let Created::Controller(id) = created {
                if let Err(err) = client.stop_controller(id) {
                    tracing::warn!(actor = %id, error = %err, "failed to stop controller during rollback");
                    errors.push(err);
                }
            }
            match client.destroy_actor(created.id()) {
                Ok(_) => tracing::debug!(?created, "rolled back"),
                Err(err) => {
                    tracing::warn!(?created, error = %err, "failed to destroy during rollback");
                    errors.push(err);
                }
            }
        }
        errors
    }
}

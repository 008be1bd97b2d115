use glam::DVec2;
use serde::{Deserialize, Serialize};
use simlink_client::Control;
use simlink_common::ActorId;
use simlink_present::CameraRig;

use crate::DescriptorRef;

/// Where a vehicle is in the spawn-time gear workaround.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GearSettle {
    /// Manual first gear applied at spawn, waiting for the first settle tick.
    FirstGearHeld,
    /// Handed back to the automatic gearbox.
    Released,
}

/// Class-specific resources of a managed entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityClass {
    Vehicle { gear: GearSettle },
    /// The controller is an AI walker actor parented to the pedestrian.
    Pedestrian { controller: ActorId },
    Other,
}

impl EntityClass {
    /// Whether a control command of this kind can drive this class.
    pub fn accepts(&self, control: &Control) -> bool {
        matches!(
            (self, control),
            (Self::Vehicle { .. }, Control::Vehicle(_)) | (Self::Pedestrian { .. }, Control::Walker(_))
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Vehicle { .. } => "vehicle",
            Self::Pedestrian { .. } => "pedestrian",
            Self::Other => "other",
        }
    }
}

/// Physical state of an entity in scenario convention, as last read back.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityState {
    pub position: DVec2,
    pub elevation: f64,
    /// Radians, counter-clockwise from north, in `(-π, π]`.
    pub heading: f64,
    /// m/s
    pub velocity: DVec2,
    /// Norm of `velocity`.
    pub speed: f64,
    /// rad/s, counter-clockwise positive.
    pub angular_speed: f64,
}

/// Returned when a control command does not fit the entity's class.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{class} entity {entity} cannot accept {control:?}")]
pub struct ControlMismatch {
    pub entity: DescriptorRef,
    pub class: &'static str,
    pub control: Control,
}

/// Runtime record of one provisioned entity.
#[derive(Debug)]
pub struct ManagedEntity {
    descriptor: DescriptorRef,
    actor: ActorId,
    class: EntityClass,
    rig: Option<CameraRig>,
    pending: Option<Control>,
    state: Option<EntityState>,
}

impl ManagedEntity {
    pub(crate) fn new(
        descriptor: DescriptorRef,
        actor: ActorId,
        class: EntityClass,
        rig: Option<CameraRig>,
    ) -> Self {
        Self {
            descriptor,
            actor,
            class,
            rig,
            pending: None,
            state: None,
        }
    }

    pub fn descriptor(&self) -> &DescriptorRef {
        &self.descriptor
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn class(&self) -> &EntityClass {
        &self.class
    }

    pub(crate) fn class_mut(&mut self) -> &mut EntityClass {
        &mut self.class
    }

    pub fn is_primary(&self) -> bool {
        self.descriptor.index == 0
    }

    pub fn controller(&self) -> Option<ActorId> {
        match self.class {
            EntityClass::Pedestrian { controller } => Some(controller),
            _ => None,
        }
    }

    pub fn rig(&self) -> Option<&CameraRig> {
        self.rig.as_ref()
    }

    /// Give up ownership of the camera rig, leaving none behind.
    pub fn take_rig(&mut self) -> Option<CameraRig> {
        self.rig.take()
    }

    pub fn pending(&self) -> Option<&Control> {
        self.pending.as_ref()
    }

    /// Queue a command for the next step. A command already queued is
    /// replaced and returned.
    pub fn enqueue(&mut self, control: Control) -> Result<Option<Control>, ControlMismatch> {
        if !self.class.accepts(&control) {
            return Err(ControlMismatch {
                entity: self.descriptor.clone(),
                class: self.class.label(),
                control,
            });
        }
        Ok(self.pending.replace(control))
    }

    pub fn take_pending(&mut self) -> Option<Control> {
        self.pending.take()
    }

    pub fn state(&self) -> Option<&EntityState> {
        self.state.as_ref()
    }

    /// Store a freshly read-back state.
    pub fn record_state(&mut self, state: EntityState) {
        self.state = Some(state);
    }
}

//! Entity provisioning: turns scenario descriptors into remote actors.
//!
//! # Invariants
//! - The first descriptor is the primary entity; only it may own a camera rig.
//! - A pedestrian entity always owns exactly one walker controller; no other
//!   class owns one.
//! - Provisioning is all-or-nothing. On any failure every resource created by
//!   the call is destroyed, children before parents, before the error is
//!   returned.
//! - Vehicles hold a manual first-gear control until the first settle tick,
//!   are released to automatic before the second, and initial speeds are set
//!   only after both ticks.

mod descriptor;
mod entity;
mod log;
mod provisioner;

pub use descriptor::{DescriptorRef, EntityDescriptor};
pub use entity::{ControlMismatch, EntityClass, EntityState, GearSettle, ManagedEntity};
pub use log::{Created, SpawnLog};
pub use provisioner::{provision, ProvisionError, WALKER_CONTROLLER_BLUEPRINT};

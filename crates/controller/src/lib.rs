//! Simulation session controller.
//!
//! A [`Simulation`] owns one open [`Session`](simlink_session::Session) and the
//! entities provisioned into it. Each [`Simulation::step`] runs as a strict
//! barrier over all entities:
//!
//! 1. apply every queued control command and empty the slots,
//! 2. advance the world exactly one fixed timestep,
//! 3. present the primary's camera frame when rendering,
//! 4. read back every entity's state.
//!
//! # Invariants
//! - Pending-control slots are empty at the start and end of every step.
//! - Presenters never change tick cadence or entity state.
//! - `destroy` releases walker controllers, then the camera rig, then the
//!   entity actors, issues one flush tick and closes the session. It runs at
//!   most once; later calls are no-ops.

pub mod readback;
pub mod scheduler;
mod simulation;
pub mod teardown;

pub use simulation::{Simulation, SimulationError};

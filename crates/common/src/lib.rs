//! Shared types for the simlink controller.
//!
//! Everything here is expressed in the simulator's *native* convention:
//! left-handed, z-up, meters, rotations in degrees. Scenario-side types live
//! next to the code that consumes them.

pub mod types;

pub use types::{ActorId, ActorKind, NativeTransform, Rotation};

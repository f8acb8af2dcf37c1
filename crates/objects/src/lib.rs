//! Mission objects, calculated parameters, and the object store.

mod error;
pub mod object;
pub mod parameter;
pub mod solar_system;
mod spacecraft;
pub mod store;
mod value;

pub use error::ObjectError;
pub use object::{
    Array, CoordinateSystem, MissionObject, PropagatorSettings, SolverSettings, StringObject,
    Variable, create_object, exit_mode_name, objects_from_mission, parse_exit_mode,
};
pub use parameter::{Apsis, SpacecraftParameter};
pub use solar_system::{CelestialBody, SolarSystem};
pub use spacecraft::{SPACECRAFT_STATE_SIZE, Spacecraft};
pub use store::{ObjectHandle, ObjectStore, Scope};
pub use value::{PropertyValue, format_real};

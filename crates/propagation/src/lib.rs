//! Numerical propagation: integrators, force models, and propagator setups.

mod error;
pub mod force;
pub mod integrator;
pub mod setup;
pub mod state;

pub use error::PropagationError;
pub use force::{ForceModel, PointMassForce};
pub use integrator::{Integrator, PrinceDormand45, RungeKutta4, create_integrator};
pub use setup::{PropSetup, PropSnapshot};
pub use state::{PropState, PropagationStateManager};

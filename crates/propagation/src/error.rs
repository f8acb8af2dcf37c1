use mcs_objects::ObjectError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PropagationError {
    #[error("unknown integrator type `{0}`")]
    UnknownIntegrator(String),
    #[error(transparent)]
    Object(#[from] ObjectError),
    #[error("propagator `{propagator}` has no spacecraft to propagate")]
    NothingToPropagate { propagator: String },
    #[error(
        "spacecraft `{spacecraft}` epoch {found} does not match propagation epoch {expected}"
    )]
    EpochMismatch {
        spacecraft: String,
        expected: String,
        found: String,
    },
    #[error("integration step failed after {attempts} attempts (last step {step_s} s)")]
    StepFailed { attempts: u32, step_s: f64 },
    #[error("accuracy {error:e} exceeds tolerance {accuracy:e} at the minimum step {min_step_s} s")]
    AccuracyViolated {
        error: f64,
        accuracy: f64,
        min_step_s: f64,
    },
    #[error("non-finite state produced during integration")]
    NonFinite,
    #[error("propagator `{0}` is not bound to any spacecraft")]
    NotBound(String),
}

//! The sandbox: owns a run's objects and sequence, initializes every command,
//! and drives execution with interrupt polling.

mod error;
pub mod interrupt;
mod sandbox;

pub use error::SandboxError;
pub use interrupt::{AtomicInterrupt, InterruptHandle, InterruptSource, NeverInterrupt, RunState};
pub use sandbox::{DEFAULT_INTERNAL_CS, RunSummary, Sandbox};

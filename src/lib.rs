//! Mission control sequence engine.
//!
//! Mission objects come from a YAML or TOML description, the sequence from a
//! script; a [`sandbox::Sandbox`] binds the two and runs them. Each layer lives
//! in its own crate and is re-exported here so front-ends need one dependency.

pub use mcs_command as command;
pub use mcs_config as config;
pub use mcs_core as base;
pub use mcs_export as export;
pub use mcs_objects as objects;
pub use mcs_propagation as propagation;
pub use mcs_sandbox as sandbox;

/// Returns the version of the library for smoke tests.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

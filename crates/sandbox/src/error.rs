use mcs_command::CommandError;
use mcs_objects::ObjectError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SandboxError {
    #[error("no mission sequence has been set")]
    NoSequence,
    #[error("the mission sequence must start with a NoOp, found `{0}`")]
    BadHead(String),
    #[error("internal coordinate system `{0}` is not defined")]
    UnknownCoordinateSystem(String),
    #[error(transparent)]
    Object(#[from] ObjectError),
    #[error("{} error(s) while initializing the sandbox:\n{}", .0.len(), .0.join("\n"))]
    Initialization(Vec<String>),
    #[error("the sandbox must be initialized before it can execute")]
    NotInitialized,
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("execution interrupted: {0}")]
    Interrupted(String),
}

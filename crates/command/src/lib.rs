//! Mission control sequence: the command contract, control flow, propagation
//! and targeting commands, and the pieces they bind to at run time.

mod error;

pub mod branch;
pub mod command;
pub mod commands;
pub mod condition;
pub mod expression;
pub mod factory;
pub mod publisher;
pub mod script;
pub mod sequence;
pub mod solver;
pub mod stop;
pub mod wrapper;

pub use command::{
    CommandBase, CommandId, ExecStatus, GenMode, GmatCommand, InitContext, RunContext, initialize_command,
};
pub use error::{CommandError, PublishError, SolverError, StopConditionError, WrapperError};
pub use factory::CommandFactory;
pub use publisher::{PenAction, Publisher, Sample, StreamId, StreamInfo, Subscriber};
pub use script::{ScriptLoader, parse_script};
pub use sequence::Sequence;
pub use solver::{DifferentialCorrector, Solver, SolverAction, create_solver};
pub use stop::{StopCondition, StopState};
pub use wrapper::ElementWrapper;

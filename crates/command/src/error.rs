use mcs_objects::ObjectError;
use mcs_propagation::PropagationError;
use thiserror::Error;

/// Failures binding, reading, or writing element wrappers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WrapperError {
    #[error("cannot interpret `{0}` as a script element")]
    Syntax(String),
    #[error("`{0}` is not bound to a live object")]
    Unbound(String),
    #[error(transparent)]
    Object(#[from] ObjectError),
    #[error("`{description}` is {} {found}, expected {expected}", indefinite_article(.found))]
    TypeMismatch {
        description: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("cannot assign {rhs_type} `{rhs}` to {lhs_type} `{lhs}`")]
    IncompatibleAssignment {
        lhs: String,
        lhs_type: &'static str,
        rhs: String,
        rhs_type: &'static str,
    },
    #[error("`{0}` needs a reference epoch before it can be evaluated")]
    NoReferenceEpoch(String),
    #[error("array index `{description}` must be a positive integer, found {value}")]
    BadIndex { description: String, value: f64 },
    #[error("`{0}` cannot be written")]
    ReadOnly(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StopConditionError {
    #[error("stop condition `{0}` has no stop parameter bound")]
    Uninitialized(String),
    #[error("stop parameter `{0}` must be a spacecraft parameter")]
    NotAParameter(String),
    #[error("stop goal `{0}` must be a scalar")]
    NonScalarGoal(String),
    #[error(transparent)]
    Wrapper(#[from] WrapperError),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    #[error("solver `{0}` has no variables registered")]
    NoVariables(String),
    #[error("solver `{0}` has no goals registered")]
    NoGoals(String),
    #[error("solver `{solver}` has no goal with id {id}")]
    UnknownGoal { solver: String, id: usize },
    #[error("solver `{0}` produced a singular sensitivity matrix")]
    Singular(String),
    #[error("unknown solver type `{0}`")]
    UnknownType(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PublishError {
    #[error("publish stream {0} is not registered")]
    UnknownStream(usize),
    #[error("stream {stream} expects {expected} values, received {found}")]
    LengthMismatch {
        stream: usize,
        expected: usize,
        found: usize,
    },
    #[error("subscriber `{name}` failed: {message}")]
    Subscriber { name: String, message: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommandError {
    #[error("{command}: {reason}")]
    Parse { command: String, reason: String },
    #[error("{command}: no wrapper slot named `{name}`")]
    NoSuchSlot { command: String, name: String },
    #[error(transparent)]
    Wrapper(#[from] WrapperError),
    #[error(transparent)]
    StopCondition(#[from] StopConditionError),
    #[error(transparent)]
    Propagation(#[from] PropagationError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Object(#[from] ObjectError),
    #[error("{0}")]
    Consistency(String),
    #[error("`{command}` requires a solver but none is active")]
    NoSolver { command: String },
    #[error("`{command}` references solver `{requested}` inside a `{active}` loop")]
    WrongSolver {
        command: String,
        requested: String,
        active: String,
    },
    #[error("structure error: {0}")]
    Structure(String),
    #[error("{count} error(s) while initializing:\n{}", .1.join("\n"), count = .0)]
    Aggregate(usize, Vec<String>),
    #[error("in `{command}`: {source}")]
    InCommand {
        command: String,
        #[source]
        source: Box<CommandError>,
    },
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("line {line}: {source}")]
    AtLine {
        line: usize,
        #[source]
        source: Box<CommandError>,
    },
    #[error("execution interrupted: {0}")]
    Interrupted(String),
    #[error("mission sequence stopped by a Stop command")]
    Stopped,
}

impl CommandError {
    pub(crate) fn parse(command: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            command: command.to_string(),
            reason: reason.into(),
        }
    }

    /// Attach the generating string of the failing command.
    pub fn in_command(self, command: impl Into<String>) -> Self {
        match self {
            Self::InCommand { .. } | Self::Aggregate(..) | Self::Stopped | Self::Interrupted(_) => {
                self
            }
            other => Self::InCommand {
                command: command.into(),
                source: Box::new(other),
            },
        }
    }

    /// Flatten nested aggregates into individual messages.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Aggregate(_, messages) => messages.clone(),
            other => vec![other.to_string()],
        }
    }
}

fn indefinite_article(word: &str) -> &'static str {
    match word.chars().next() {
        Some(c) if "AEIOUaeiou".contains(c) => "an",
        _ => "a",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_lists_every_message_under_a_count() {
        let err = CommandError::Aggregate(2, vec!["first".into(), "second".into()]);
        assert_eq!(err.to_string(), "2 error(s) while initializing:\nfirst\nsecond");
        assert_eq!(err.messages(), vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn type_mismatch_names_the_found_type() {
        let array = WrapperError::TypeMismatch {
            description: "Goals".into(),
            expected: "Real",
            found: "Array",
        };
        assert_eq!(array.to_string(), "`Goals` is an Array, expected Real");
        let string = WrapperError::TypeMismatch {
            description: "Label".into(),
            expected: "Real",
            found: "String",
        };
        assert_eq!(string.to_string(), "`Label` is a String, expected Real");
    }
}

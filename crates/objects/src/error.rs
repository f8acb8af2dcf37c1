use thiserror::Error;

/// Errors raised while reading, writing, or locating mission objects.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ObjectError {
    #[error("object `{0}` was not found in the local or global object map")]
    NotFound(String),
    #[error("object handle for `{0}` no longer refers to a live object")]
    StaleHandle(String),
    #[error("object `{0}` already exists with different contents")]
    Duplicate(String),
    #[error("{kind} `{object}` has no property `{property}`")]
    UnknownProperty {
        kind: &'static str,
        object: String,
        property: String,
    },
    #[error("property `{object}.{property}` is read-only")]
    ReadOnly { object: String, property: String },
    #[error("property `{object}.{property}` expects {expected}, found {found}")]
    TypeMismatch {
        object: String,
        property: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("invalid value for `{object}.{property}`: {reason}")]
    InvalidValue {
        object: String,
        property: String,
        reason: String,
    },
    #[error("array `{name}` index ({row}, {col}) is outside its {rows}x{cols} bounds")]
    IndexOutOfRange {
        name: String,
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
    #[error("`{name}` is a {found}, expected a {expected}")]
    WrongKind {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("celestial body `{0}` is not in the body registry")]
    UnknownBody(String),
}

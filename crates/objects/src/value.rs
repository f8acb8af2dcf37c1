use std::fmt;

/// Typed value read from or written to an object property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Real(f64),
    Integer(i64),
    Text(String),
    Boolean(bool),
    OnOff(bool),
}

impl PropertyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Real(_) => "Real",
            Self::Integer(_) => "Integer",
            Self::Text(_) => "String",
            Self::Boolean(_) => "Boolean",
            Self::OnOff(_) => "OnOff",
        }
    }

    /// Numeric view with integer widening; `None` for non-numeric values.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real(v) => write!(f, "{}", format_real(*v)),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "'{s}'"),
            Self::Boolean(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Self::OnOff(b) => write!(f, "{}", if *b { "On" } else { "Off" }),
        }
    }
}

/// Format a real the way generating strings and string coercion expect:
/// shortest representation that round-trips.
pub fn format_real(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude != 0.0 && (magnitude < 1.0e-4 || magnitude >= 1.0e15) {
        format!("{value:e}")
    } else if value == value.trunc() {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

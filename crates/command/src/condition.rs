//! Relational conditions for `If` and `While`.

use std::fmt;

use mcs_objects::ObjectStore;

use crate::commands::rename_leading;
use crate::wrapper::ValueType;
use crate::{CommandError, ElementWrapper, WrapperError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl RelOp {
    // Two-character operators first so `<=` is not read as `<`.
    const ALL: [(&'static str, RelOp); 6] = [
        ("==", RelOp::Eq),
        ("~=", RelOp::Ne),
        ("<=", RelOp::Le),
        (">=", RelOp::Ge),
        ("<", RelOp::Lt),
        (">", RelOp::Gt),
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "~=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
        }
    }

    fn compare<T: PartialOrd>(&self, a: &T, b: &T) -> bool {
        match self {
            Self::Eq => a == b,
            Self::Ne => a != b,
            Self::Lt => a < b,
            Self::Gt => a > b,
            Self::Le => a <= b,
            Self::Ge => a >= b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    And,
    Or,
}

#[derive(Debug, Clone)]
struct Clause {
    lhs: String,
    op: RelOp,
    rhs: String,
    lhs_wrapper: Option<ElementWrapper>,
    rhs_wrapper: Option<ElementWrapper>,
}

impl Clause {
    fn evaluate(&self, store: &ObjectStore) -> Result<bool, WrapperError> {
        let lhs = self
            .lhs_wrapper
            .as_ref()
            .ok_or_else(|| WrapperError::Unbound(self.lhs.clone()))?;
        let rhs = self
            .rhs_wrapper
            .as_ref()
            .ok_or_else(|| WrapperError::Unbound(self.rhs.clone()))?;
        if lhs.value_type() == ValueType::String && rhs.value_type() == ValueType::String {
            return Ok(self
                .op
                .compare(&lhs.evaluate_string(store)?, &rhs.evaluate_string(store)?));
        }
        Ok(self
            .op
            .compare(&lhs.evaluate_real(store)?, &rhs.evaluate_real(store)?))
    }
}

/// Clauses joined by `&` and `|`; `&` binds tighter.
#[derive(Debug, Clone)]
pub struct ConditionSet {
    clauses: Vec<Clause>,
    connectors: Vec<Logic>,
}

impl ConditionSet {
    pub fn parse(command: &str, text: &str) -> Result<Self, CommandError> {
        let mut clauses = Vec::new();
        let mut connectors = Vec::new();
        let mut start = 0;
        for (i, c) in text.char_indices() {
            let logic = match c {
                '&' => Logic::And,
                '|' => Logic::Or,
                _ => continue,
            };
            clauses.push(parse_clause(command, &text[start..i])?);
            connectors.push(logic);
            start = i + 1;
        }
        clauses.push(parse_clause(command, &text[start..])?);
        Ok(Self {
            clauses,
            connectors,
        })
    }

    pub fn wrapper_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for clause in &self.clauses {
            for side in [&clause.lhs, &clause.rhs] {
                if !names.contains(side) {
                    names.push(side.clone());
                }
            }
        }
        names
    }

    pub fn set_wrapper(&mut self, wrapper: ElementWrapper, name: &str) -> Option<Option<ElementWrapper>> {
        let mut found = None;
        for clause in &mut self.clauses {
            if clause.lhs == name {
                found = Some(clause.lhs_wrapper.replace(wrapper.clone()));
            }
            if clause.rhs == name {
                let previous = clause.rhs_wrapper.replace(wrapper.clone());
                found = Some(found.flatten().or(previous));
            }
        }
        found
    }

    pub fn clear_wrappers(&mut self) {
        for clause in &mut self.clauses {
            clause.lhs_wrapper = None;
            clause.rhs_wrapper = None;
        }
    }

    pub fn evaluate(&self, store: &ObjectStore) -> Result<bool, WrapperError> {
        let mut any = false;
        let mut group = true;
        for (i, clause) in self.clauses.iter().enumerate() {
            group &= clause.evaluate(store)?;
            let closes_group = self.connectors.get(i).is_none_or(|c| *c == Logic::Or);
            if closes_group {
                any |= group;
                group = true;
            }
        }
        Ok(any)
    }

    pub fn rename_object(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        for clause in &mut self.clauses {
            for (text, wrapper) in [
                (&mut clause.lhs, &mut clause.lhs_wrapper),
                (&mut clause.rhs, &mut clause.rhs_wrapper),
            ] {
                if let Some(wrapper) = wrapper {
                    if wrapper.rename_object(old, new) {
                        *text = wrapper.description().to_string();
                        changed = true;
                        continue;
                    }
                }
                if let Some(renamed) = rename_leading(text, old, new) {
                    *text = renamed;
                    changed = true;
                }
            }
        }
        changed
    }
}

impl fmt::Display for ConditionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                let joiner = match self.connectors[i - 1] {
                    Logic::And => " & ",
                    Logic::Or => " | ",
                };
                f.write_str(joiner)?;
            }
            write!(f, "{} {} {}", clause.lhs, clause.op.symbol(), clause.rhs)?;
        }
        Ok(())
    }
}

fn parse_clause(command: &str, text: &str) -> Result<Clause, CommandError> {
    let text = text.trim();
    for (symbol, op) in RelOp::ALL {
        if let Some((lhs, rhs)) = text.split_once(symbol) {
            let (lhs, rhs) = (lhs.trim(), rhs.trim());
            if lhs.is_empty() || rhs.is_empty() {
                break;
            }
            return Ok(Clause {
                lhs: lhs.to_string(),
                op,
                rhs: rhs.to_string(),
                lhs_wrapper: None,
                rhs_wrapper: None,
            });
        }
    }
    Err(CommandError::parse(
        command,
        format!("`{text}` is not a relational condition"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcs_objects::{MissionObject, Variable};

    fn bound(text: &str, store: &ObjectStore) -> ConditionSet {
        let mut set = ConditionSet::parse("If", text).unwrap();
        for name in set.wrapper_names() {
            let wrapper = ElementWrapper::create(&name, store).unwrap();
            set.set_wrapper(wrapper, &name);
        }
        set
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let mut store = ObjectStore::default();
        store.add(MissionObject::Variable(Variable::new("a", 1.0))).unwrap();
        // false & false | true
        let set = bound("a > 2 & a < 0 | a == 1", &store);
        assert!(set.evaluate(&store).unwrap());
        // true | false & false
        let set = bound("a == 1 | a > 2 & a < 0", &store);
        assert!(set.evaluate(&store).unwrap());
        let set = bound("a <= 1 & a ~= 1", &store);
        assert!(!set.evaluate(&store).unwrap());
        assert_eq!(set.to_string(), "a <= 1 & a ~= 1");
    }

    #[test]
    fn missing_operator_is_a_parse_error() {
        assert!(matches!(
            ConditionSet::parse("While", "a"),
            Err(CommandError::Parse { .. })
        ));
    }
}

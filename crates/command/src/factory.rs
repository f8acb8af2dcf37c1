//! Command construction by script type name.

use crate::command::GmatCommand;
use crate::commands::{Achieve, Assignment, EndMarker, For, If, NoOp, Propagate, Stop, Target, Vary, While};

pub type Constructor = fn() -> Box<dyn GmatCommand>;

/// Registry mapping type names to constructors; unknown names yield `None`.
#[derive(Debug, Clone)]
pub struct CommandFactory {
    entries: Vec<(&'static str, Constructor)>,
}

impl Default for CommandFactory {
    fn default() -> Self {
        let mut factory = Self { entries: Vec::new() };
        factory.register("NoOp", || Box::new(NoOp::new()));
        factory.register("Assignment", || Box::new(Assignment::new()));
        factory.register("Propagate", || Box::new(Propagate::new()));
        factory.register("For", || Box::new(For::new()));
        factory.register("While", || Box::new(While::new()));
        factory.register("If", || Box::new(If::new()));
        factory.register("Target", || Box::new(Target::new()));
        factory.register("Vary", || Box::new(Vary::new()));
        factory.register("Achieve", || Box::new(Achieve::new()));
        factory.register("Stop", || Box::new(Stop::new()));
        factory
    }
}

impl CommandFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the constructor for `type_name`.
    pub fn register(&mut self, type_name: &'static str, constructor: Constructor) {
        match self.entries.iter_mut().find(|(name, _)| *name == type_name) {
            Some(entry) => entry.1 = constructor,
            None => self.entries.push((type_name, constructor)),
        }
    }

    pub fn create(&self, type_name: &str) -> Option<Box<dyn GmatCommand>> {
        if let Some((_, constructor)) = self.entries.iter().find(|(name, _)| *name == type_name) {
            return Some(constructor());
        }
        EndMarker::new(type_name).map(|end| Box::new(end) as Box<dyn GmatCommand>)
    }

    pub fn supports(&self, type_name: &str) -> bool {
        self.entries.iter().any(|(name, _)| *name == type_name) || EndMarker::TYPES.contains(&type_name)
    }

    /// Every creatable type name, end markers last.
    pub fn type_names(&self) -> Vec<&'static str> {
        self.entries
            .iter()
            .map(|(name, _)| *name)
            .chain(EndMarker::TYPES.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_types_are_none() {
        let factory = CommandFactory::new();
        assert!(factory.create("Maneuver").is_none());
        assert!(!factory.supports("Maneuver"));
    }

    #[test]
    fn end_markers_are_created_by_type() {
        let factory = CommandFactory::new();
        let end = factory.create("EndTarget").expect("end marker");
        assert_eq!(end.type_name(), "EndTarget");
        assert!(end.is_branch_end());
        assert_eq!(factory.create("For").expect("for").depth_change(), 1);
    }
}

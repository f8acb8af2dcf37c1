//! The top-level mission control sequence.

use crate::command::{CommandId, GenMode, GmatCommand};
use crate::commands::NoOp;
use crate::CommandError;

/// Ordered command list headed by a `NoOp`; branch commands own their nested sequences.
#[derive(Debug)]
pub struct Sequence {
    commands: Vec<Box<dyn GmatCommand>>,
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequence {
    pub fn new() -> Self {
        Self {
            commands: vec![Box::new(NoOp::new())],
        }
    }

    /// Append at the tail, descending into any branch that is still open.
    pub fn append(&mut self, command: Box<dyn GmatCommand>) -> Result<(), CommandError> {
        if let Some(open) = self
            .commands
            .last_mut()
            .and_then(|c| c.branch_mut())
            .filter(|b| !b.is_closed())
        {
            return open.append(command);
        }
        if command.is_branch_end() {
            return Err(CommandError::Structure(format!(
                "`{}` has no matching branch command",
                command.type_name()
            )));
        }
        self.commands.push(command);
        Ok(())
    }

    pub fn insert_after(
        &mut self,
        after: CommandId,
        command: Box<dyn GmatCommand>,
    ) -> Result<(), CommandError> {
        let mut command = command;
        if let Some(pos) = self.commands.iter().position(|c| c.id() == after) {
            self.commands.insert(pos + 1, command);
            return Ok(());
        }
        for child in &mut self.commands {
            if let Some(branch) = child.branch_mut() {
                match branch.insert_after(after, command) {
                    Ok(()) => return Ok(()),
                    Err(back) => command = back,
                }
            }
        }
        Err(CommandError::Structure(format!(
            "no command {after} to insert `{}` after",
            command.type_name()
        )))
    }

    /// Remove a command by id; the head `NoOp` stays.
    pub fn remove(&mut self, id: CommandId) -> Option<Box<dyn GmatCommand>> {
        if let Some(pos) = self.commands.iter().position(|c| c.id() == id) {
            return (pos > 0).then(|| self.commands.remove(pos));
        }
        self.commands
            .iter_mut()
            .find_map(|c| c.branch_mut().and_then(|b| b.remove(id)))
    }

    pub fn head(&self) -> Option<&dyn GmatCommand> {
        let head: &dyn GmatCommand = self.commands.first()?.as_ref();
        Some(head)
    }

    pub fn commands(&self) -> &[Box<dyn GmatCommand>] {
        &self.commands
    }

    pub fn commands_mut(&mut self) -> &mut [Box<dyn GmatCommand>] {
        &mut self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True when only the head is present.
    pub fn is_empty(&self) -> bool {
        self.commands.len() <= 1
    }

    /// Every branch command has found its end marker.
    pub fn is_closed(&self) -> bool {
        self.commands
            .iter()
            .filter_map(|c| c.branch())
            .all(|b| b.is_closed())
    }

    /// Script text of the whole sequence, one command per line.
    pub fn generating_string(&self, mode: GenMode) -> String {
        self.commands
            .iter()
            .skip(1)
            .map(|c| c.generating_string(mode, "", true))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn rename_ref_object(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        for command in &mut self.commands {
            changed |= command.rename_ref_object(old, new);
        }
        changed
    }

    pub fn run_complete(&mut self) {
        for command in &mut self.commands {
            command.run_complete();
        }
    }
}

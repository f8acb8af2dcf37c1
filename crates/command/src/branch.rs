//! Nested sub-sequences owned by control-flow commands.

use crate::command::{
    CommandId, ExecStatus, GenMode, GmatCommand, INDENT, InitContext, RunContext, initialize_command,
};
use crate::CommandError;

/// Result of advancing a branch by one child execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    Running(ExecStatus),
    /// The active branch reached its terminator.
    Finished,
}

/// Child sequences of a branch command plus the execution cursor into them.
///
/// Each branch is terminated by its closing marker: `Else` for the first
/// branch of an `If` that has one, the matching `End*` command for the last.
#[derive(Debug)]
pub struct BranchBehavior {
    end_type: &'static str,
    else_type: Option<&'static str>,
    branches: Vec<Vec<Box<dyn GmatCommand>>>,
    current: usize,
    cursor: usize,
    closed: bool,
}

impl BranchBehavior {
    pub fn new(end_type: &'static str) -> Self {
        Self {
            end_type,
            else_type: None,
            branches: vec![Vec::new()],
            current: 0,
            cursor: 0,
            closed: false,
        }
    }

    /// A branch that also accepts an `else_type` marker splitting it in two.
    pub fn with_else(end_type: &'static str, else_type: &'static str) -> Self {
        Self {
            else_type: Some(else_type),
            ..Self::new(end_type)
        }
    }

    pub fn end_type(&self) -> &'static str {
        self.end_type
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    pub fn commands(&self, branch: usize) -> &[Box<dyn GmatCommand>] {
        self.branches.get(branch).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every direct child, terminators included.
    pub fn children(&self) -> impl Iterator<Item = &Box<dyn GmatCommand>> {
        self.branches.iter().flatten()
    }

    fn open_child(&mut self) -> Option<&mut BranchBehavior> {
        self.branches
            .last_mut()
            .and_then(|b| b.last_mut())
            .and_then(|c| c.branch_mut())
            .filter(|b| !b.closed)
    }

    /// Route `command` into the innermost open branch.
    pub fn append(&mut self, command: Box<dyn GmatCommand>) -> Result<(), CommandError> {
        if self.closed {
            return Err(CommandError::Structure(format!(
                "cannot append `{}` after `{}`",
                command.type_name(),
                self.end_type
            )));
        }
        if let Some(child) = self.open_child() {
            return child.append(command);
        }
        let kind = command.type_name();
        if kind == self.end_type {
            self.push(command);
            self.closed = true;
        } else if Some(kind) == self.else_type {
            if self.branches.len() > 1 {
                return Err(CommandError::Structure(format!("second `{kind}` in one branch")));
            }
            self.push(command);
            self.branches.push(Vec::new());
        } else if command.is_branch_end() {
            return Err(CommandError::Structure(format!(
                "`{kind}` cannot close a branch ended by `{}`",
                self.end_type
            )));
        } else {
            self.push(command);
        }
        Ok(())
    }

    fn push(&mut self, command: Box<dyn GmatCommand>) {
        if let Some(branch) = self.branches.last_mut() {
            branch.push(command);
        }
    }

    /// Insert `command` after the node with id `after`, searching nested branches.
    pub fn insert_after(
        &mut self,
        after: CommandId,
        command: Box<dyn GmatCommand>,
    ) -> Result<(), Box<dyn GmatCommand>> {
        let mut command = command;
        for branch in &mut self.branches {
            if let Some(pos) = branch.iter().position(|c| c.id() == after) {
                if branch[pos].is_branch_end() {
                    return Err(command);
                }
                branch.insert(pos + 1, command);
                return Ok(());
            }
            for child in branch.iter_mut() {
                if let Some(nested) = child.branch_mut() {
                    match nested.insert_after(after, command) {
                        Ok(()) => return Ok(()),
                        Err(back) => command = back,
                    }
                }
            }
        }
        Err(command)
    }

    /// Remove the node with id `id`; terminators cannot be removed on their own.
    pub fn remove(&mut self, id: CommandId) -> Option<Box<dyn GmatCommand>> {
        for branch in &mut self.branches {
            if let Some(pos) = branch.iter().position(|c| c.id() == id) {
                if branch[pos].is_branch_end() {
                    return None;
                }
                return Some(branch.remove(pos));
            }
            for child in branch.iter_mut() {
                if let Some(found) = child.branch_mut().and_then(|b| b.remove(id)) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Position the cursor at the head of `branch`.
    pub fn start(&mut self, branch: usize) {
        self.current = branch.min(self.branches.len().saturating_sub(1));
        self.cursor = 0;
    }

    pub fn current_branch(&self) -> usize {
        self.current
    }

    /// Execute the child under the cursor.
    pub fn execute_child(&mut self, ctx: &mut RunContext<'_>) -> Result<ChildStatus, CommandError> {
        let Some(command) = self
            .branches
            .get_mut(self.current)
            .and_then(|b| b.get_mut(self.cursor))
        else {
            return Ok(ChildStatus::Finished);
        };
        if command.is_branch_end() {
            return Ok(ChildStatus::Finished);
        }
        let status = command.execute(ctx).map_err(|err| {
            err.in_command(command.generating_string(GenMode::NoComments, "", false))
        })?;
        if status == ExecStatus::Done {
            self.cursor += 1;
        }
        Ok(ChildStatus::Running(status))
    }

    /// Initialize every child, collecting failures into one aggregate error.
    pub fn initialize_children(&mut self, ctx: &mut InitContext<'_>) -> Result<(), CommandError> {
        if !self.closed {
            return Err(CommandError::Structure(format!("missing `{}`", self.end_type)));
        }
        let mut messages = Vec::new();
        for command in self.branches.iter_mut().flatten() {
            if let Err(err) = initialize_command(command.as_mut(), ctx) {
                messages.extend(err.messages());
            }
        }
        if messages.is_empty() {
            Ok(())
        } else {
            Err(CommandError::Aggregate(messages.len(), messages))
        }
    }

    pub fn run_complete(&mut self) {
        for command in self.branches.iter_mut().flatten() {
            command.run_complete();
        }
        self.start(0);
    }

    pub fn reset_loop_data(&mut self) {
        for command in self.branches.iter_mut().flatten() {
            command.reset_loop_data();
        }
    }

    pub fn rename_ref_object(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        for command in self.branches.iter_mut().flatten() {
            changed |= command.rename_ref_object(old, new);
        }
        changed
    }

    /// Append the children's script lines, one nesting level deeper than `prefix`.
    pub fn append_generating_lines(&self, out: &mut String, mode: GenMode, prefix: &str, use_name: bool) {
        let nested = format!("{prefix}{INDENT}");
        for command in self.branches.iter().flatten() {
            let child_prefix = if command.is_branch_end() { prefix } else { &nested };
            out.push('\n');
            out.push_str(&command.generating_string(mode, child_prefix, use_name));
        }
    }
}

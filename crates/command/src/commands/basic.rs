use crate::command::{CommandBase, ExecStatus, GmatCommand, InitContext, RunContext};
use crate::CommandError;

/// Head of every sequence; does nothing.
#[derive(Debug)]
pub struct NoOp {
    base: CommandBase,
}

impl NoOp {
    pub fn new() -> Self {
        Self {
            base: CommandBase::new("NoOp"),
        }
    }
}

impl Default for NoOp {
    fn default() -> Self {
        Self::new()
    }
}

impl GmatCommand for NoOp {
    fn base(&self) -> &CommandBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CommandBase {
        &mut self.base
    }

    fn interpret_action(&mut self, line: &str) -> Result<(), CommandError> {
        let rest = self.base.split_line(line)?;
        if rest.is_empty() {
            Ok(())
        } else {
            Err(CommandError::parse("NoOp", format!("unexpected `{rest}`")))
        }
    }

    fn action_text(&self) -> String {
        String::new()
    }

    fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<(), CommandError> {
        Ok(())
    }

    fn execute(&mut self, _ctx: &mut RunContext<'_>) -> Result<ExecStatus, CommandError> {
        Ok(ExecStatus::Done)
    }
}

/// Ends the run early; the sandbox reports it as a clean stop.
#[derive(Debug)]
pub struct Stop {
    base: CommandBase,
}

impl Stop {
    pub fn new() -> Self {
        Self {
            base: CommandBase::new("Stop"),
        }
    }
}

impl Default for Stop {
    fn default() -> Self {
        Self::new()
    }
}

impl GmatCommand for Stop {
    fn base(&self) -> &CommandBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CommandBase {
        &mut self.base
    }

    fn interpret_action(&mut self, line: &str) -> Result<(), CommandError> {
        let rest = self.base.split_line(line)?;
        if rest.is_empty() {
            Ok(())
        } else {
            Err(CommandError::parse("Stop", format!("unexpected `{rest}`")))
        }
    }

    fn action_text(&self) -> String {
        String::new()
    }

    fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<(), CommandError> {
        Ok(())
    }

    fn execute(&mut self, _ctx: &mut RunContext<'_>) -> Result<ExecStatus, CommandError> {
        Err(CommandError::Stopped)
    }
}

/// Terminator of a branch: `EndFor`, `EndWhile`, `EndIf`, `EndTarget`, or `Else`.
#[derive(Debug)]
pub struct EndMarker {
    base: CommandBase,
}

impl EndMarker {
    /// Marker types understood by [`EndMarker::new`].
    pub const TYPES: [&'static str; 5] = ["EndFor", "EndWhile", "EndIf", "EndTarget", "Else"];

    pub fn new(type_name: &str) -> Option<Self> {
        let type_name = Self::TYPES.into_iter().find(|t| *t == type_name)?;
        Some(Self {
            base: CommandBase::new(type_name),
        })
    }
}

impl GmatCommand for EndMarker {
    fn base(&self) -> &CommandBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CommandBase {
        &mut self.base
    }

    fn interpret_action(&mut self, line: &str) -> Result<(), CommandError> {
        let rest = self.base.split_line(line)?;
        if rest.is_empty() {
            Ok(())
        } else {
            Err(CommandError::parse(
                self.base.type_name(),
                format!("unexpected `{rest}`"),
            ))
        }
    }

    fn action_text(&self) -> String {
        String::new()
    }

    fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<(), CommandError> {
        Ok(())
    }

    fn execute(&mut self, _ctx: &mut RunContext<'_>) -> Result<ExecStatus, CommandError> {
        Ok(ExecStatus::Done)
    }

    fn is_branch_end(&self) -> bool {
        true
    }
}

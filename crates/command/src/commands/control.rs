//! Loop and conditional branch commands.

use tracing::trace;

use crate::branch::{BranchBehavior, ChildStatus};
use crate::command::{CommandBase, ExecStatus, GmatCommand, InitContext, RunContext};
use crate::commands::{matching_close, rename_leading};
use crate::condition::ConditionSet;
use crate::{CommandError, ElementWrapper, WrapperError};

/// Map a child status to what the owning branch reports to the driver.
fn running(status: ExecStatus) -> ExecStatus {
    match status {
        ExecStatus::Yield => ExecStatus::Yield,
        ExecStatus::Done | ExecStatus::Continue => ExecStatus::Continue,
    }
}

/// `For Index = Start:End` or `For Index = Start:Step:End`.
#[derive(Debug)]
pub struct For {
    base: CommandBase,
    branch: BranchBehavior,
    index: String,
    start: String,
    step: String,
    end: String,
    index_wrapper: Option<ElementWrapper>,
    start_wrapper: Option<ElementWrapper>,
    step_wrapper: Option<ElementWrapper>,
    end_wrapper: Option<ElementWrapper>,
    current: Option<f64>,
    step_value: f64,
    end_value: f64,
}

impl For {
    pub fn new() -> Self {
        Self {
            base: CommandBase::new("For"),
            branch: BranchBehavior::new("EndFor"),
            index: String::new(),
            start: String::new(),
            step: "1".into(),
            end: String::new(),
            index_wrapper: None,
            start_wrapper: None,
            step_wrapper: None,
            end_wrapper: None,
            current: None,
            step_value: 1.0,
            end_value: 0.0,
        }
    }

    fn in_range(&self, value: f64) -> bool {
        if self.step_value > 0.0 {
            value <= self.end_value
        } else {
            value >= self.end_value
        }
    }

    fn slots(&mut self) -> [(&str, &mut Option<ElementWrapper>); 4] {
        [
            (&self.index, &mut self.index_wrapper),
            (&self.start, &mut self.start_wrapper),
            (&self.step, &mut self.step_wrapper),
            (&self.end, &mut self.end_wrapper),
        ]
    }

    fn evaluate(wrapper: &Option<ElementWrapper>, name: &str, ctx: &RunContext<'_>) -> Result<f64, WrapperError> {
        wrapper
            .as_ref()
            .ok_or_else(|| WrapperError::Unbound(name.to_string()))?
            .evaluate_real(ctx.store)
    }

    fn set_index(&self, ctx: &mut RunContext<'_>, value: f64) -> Result<(), WrapperError> {
        self.index_wrapper
            .as_ref()
            .ok_or_else(|| WrapperError::Unbound(self.index.clone()))?
            .set_real(ctx.store, value)
    }
}

impl Default for For {
    fn default() -> Self {
        Self::new()
    }
}

impl GmatCommand for For {
    fn base(&self) -> &CommandBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CommandBase {
        &mut self.base
    }

    fn interpret_action(&mut self, line: &str) -> Result<(), CommandError> {
        let rest = self.base.split_line(line)?;
        let (index, range) = rest
            .split_once('=')
            .ok_or_else(|| CommandError::parse("For", format!("expected `Index = Start:End`, found `{rest}`")))?;
        let parts: Vec<&str> = range.split(':').map(str::trim).collect();
        let (start, step, end) = match parts.as_slice() {
            [start, end] => (*start, "1", *end),
            [start, step, end] => (*start, *step, *end),
            _ => return Err(CommandError::parse("For", format!("bad range `{}`", range.trim()))),
        };
        if [index.trim(), start, step, end].iter().any(|p| p.is_empty()) {
            return Err(CommandError::parse("For", format!("incomplete loop `{rest}`")));
        }
        self.index = index.trim().to_string();
        self.start = start.to_string();
        self.step = step.to_string();
        self.end = end.to_string();
        Ok(())
    }

    fn action_text(&self) -> String {
        if self.step == "1" {
            format!("{} = {}:{}", self.index, self.start, self.end)
        } else {
            format!("{} = {}:{}:{}", self.index, self.start, self.step, self.end)
        }
    }

    fn wrapper_object_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in [&self.index, &self.start, &self.step, &self.end] {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    fn set_element_wrapper(
        &mut self,
        wrapper: ElementWrapper,
        name: &str,
    ) -> Result<Option<ElementWrapper>, CommandError> {
        if !wrapper.is_scalar() {
            return Err(WrapperError::TypeMismatch {
                description: name.to_string(),
                expected: "Real",
                found: wrapper.value_type().name(),
            }
            .into());
        }
        let mut matched = false;
        let mut previous = None;
        for (slot_name, slot) in self.slots() {
            if slot_name == name {
                previous = slot.replace(wrapper.clone()).or(previous);
                matched = true;
            }
        }
        if matched {
            Ok(previous)
        } else {
            Err(CommandError::NoSuchSlot {
                command: "For".into(),
                name: name.to_string(),
            })
        }
    }

    fn clear_wrappers(&mut self) {
        for (_, slot) in self.slots() {
            *slot = None;
        }
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), CommandError> {
        self.current = None;
        self.branch.initialize_children(ctx)
    }

    fn execute(&mut self, ctx: &mut RunContext<'_>) -> Result<ExecStatus, CommandError> {
        let Some(current) = self.current else {
            let start = Self::evaluate(&self.start_wrapper, &self.start, ctx)?;
            self.step_value = Self::evaluate(&self.step_wrapper, &self.step, ctx)?;
            self.end_value = Self::evaluate(&self.end_wrapper, &self.end, ctx)?;
            if self.step_value == 0.0 {
                return Err(CommandError::Consistency(format!(
                    "For loop `{}` has a zero step",
                    self.action_text()
                )));
            }
            if !self.in_range(start) {
                return Ok(ExecStatus::Done);
            }
            self.set_index(ctx, start)?;
            self.current = Some(start);
            self.branch.start(0);
            return Ok(ExecStatus::Continue);
        };
        match self.branch.execute_child(ctx)? {
            ChildStatus::Running(status) => Ok(running(status)),
            ChildStatus::Finished => {
                let next = current + self.step_value;
                if self.in_range(next) {
                    trace!(index = %self.index, value = next, "for iteration");
                    self.set_index(ctx, next)?;
                    self.current = Some(next);
                    self.branch.start(0);
                    Ok(ExecStatus::Continue)
                } else {
                    self.current = None;
                    Ok(ExecStatus::Done)
                }
            }
        }
    }

    fn run_complete(&mut self) {
        self.current = None;
        self.branch.run_complete();
    }

    fn rename_ref_object(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        for field in [&mut self.index, &mut self.start, &mut self.step, &mut self.end] {
            if let Some(renamed) = rename_leading(field, old, new) {
                *field = renamed;
                changed = true;
            }
        }
        if changed {
            self.clear_wrappers();
        }
        self.branch.rename_ref_object(old, new) || changed
    }

    fn branch(&self) -> Option<&BranchBehavior> {
        Some(&self.branch)
    }

    fn branch_mut(&mut self) -> Option<&mut BranchBehavior> {
        Some(&mut self.branch)
    }

    fn reset_loop_data(&mut self) {
        self.current = None;
        self.branch.reset_loop_data();
    }
}

/// `While condition`.
#[derive(Debug)]
pub struct While {
    base: CommandBase,
    branch: BranchBehavior,
    condition: Option<ConditionSet>,
    running: bool,
}

impl While {
    pub fn new() -> Self {
        Self {
            base: CommandBase::new("While"),
            branch: BranchBehavior::new("EndWhile"),
            condition: None,
            running: false,
        }
    }

    fn test(&self, ctx: &RunContext<'_>) -> Result<bool, CommandError> {
        let condition = self
            .condition
            .as_ref()
            .ok_or_else(|| CommandError::parse("While", "no condition"))?;
        Ok(condition.evaluate(ctx.store)?)
    }
}

impl Default for While {
    fn default() -> Self {
        Self::new()
    }
}

impl GmatCommand for While {
    fn base(&self) -> &CommandBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CommandBase {
        &mut self.base
    }

    fn interpret_action(&mut self, line: &str) -> Result<(), CommandError> {
        let rest = self.base.split_line(line)?;
        self.condition = Some(ConditionSet::parse("While", rest)?);
        Ok(())
    }

    fn action_text(&self) -> String {
        self.condition.as_ref().map(|c| c.to_string()).unwrap_or_default()
    }

    fn wrapper_object_names(&self) -> Vec<String> {
        self.condition
            .as_ref()
            .map(ConditionSet::wrapper_names)
            .unwrap_or_default()
    }

    fn set_element_wrapper(
        &mut self,
        wrapper: ElementWrapper,
        name: &str,
    ) -> Result<Option<ElementWrapper>, CommandError> {
        self.condition
            .as_mut()
            .and_then(|c| c.set_wrapper(wrapper, name))
            .ok_or_else(|| CommandError::NoSuchSlot {
                command: "While".into(),
                name: name.to_string(),
            })
    }

    fn clear_wrappers(&mut self) {
        if let Some(condition) = &mut self.condition {
            condition.clear_wrappers();
        }
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), CommandError> {
        self.running = false;
        self.branch.initialize_children(ctx)
    }

    fn execute(&mut self, ctx: &mut RunContext<'_>) -> Result<ExecStatus, CommandError> {
        if !self.running {
            if !self.test(ctx)? {
                return Ok(ExecStatus::Done);
            }
            self.running = true;
            self.branch.start(0);
            return Ok(ExecStatus::Continue);
        }
        match self.branch.execute_child(ctx)? {
            ChildStatus::Running(status) => Ok(running(status)),
            ChildStatus::Finished => {
                if self.test(ctx)? {
                    self.branch.start(0);
                    Ok(ExecStatus::Continue)
                } else {
                    self.running = false;
                    Ok(ExecStatus::Done)
                }
            }
        }
    }

    fn run_complete(&mut self) {
        self.running = false;
        self.branch.run_complete();
    }

    fn rename_ref_object(&mut self, old: &str, new: &str) -> bool {
        let changed = self
            .condition
            .as_mut()
            .is_some_and(|c| c.rename_object(old, new));
        self.branch.rename_ref_object(old, new) || changed
    }

    fn branch(&self) -> Option<&BranchBehavior> {
        Some(&self.branch)
    }

    fn branch_mut(&mut self) -> Option<&mut BranchBehavior> {
        Some(&mut self.branch)
    }

    fn reset_loop_data(&mut self) {
        self.running = false;
        self.branch.reset_loop_data();
    }
}

/// `If condition` with an optional `Else` branch.
#[derive(Debug)]
pub struct If {
    base: CommandBase,
    branch: BranchBehavior,
    condition: Option<ConditionSet>,
    running: bool,
}

impl If {
    pub fn new() -> Self {
        Self {
            base: CommandBase::new("If"),
            branch: BranchBehavior::with_else("EndIf", "Else"),
            condition: None,
            running: false,
        }
    }
}

impl Default for If {
    fn default() -> Self {
        Self::new()
    }
}

impl GmatCommand for If {
    fn base(&self) -> &CommandBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CommandBase {
        &mut self.base
    }

    fn interpret_action(&mut self, line: &str) -> Result<(), CommandError> {
        let rest = self.base.split_line(line)?;
        // `If (a < b)` is accepted as well as the bare form.
        let rest = match matching_close(rest, 0) {
            Some(close) if close + 1 == rest.len() => &rest[1..close],
            _ => rest,
        };
        self.condition = Some(ConditionSet::parse("If", rest)?);
        Ok(())
    }

    fn action_text(&self) -> String {
        self.condition.as_ref().map(|c| c.to_string()).unwrap_or_default()
    }

    fn wrapper_object_names(&self) -> Vec<String> {
        self.condition
            .as_ref()
            .map(ConditionSet::wrapper_names)
            .unwrap_or_default()
    }

    fn set_element_wrapper(
        &mut self,
        wrapper: ElementWrapper,
        name: &str,
    ) -> Result<Option<ElementWrapper>, CommandError> {
        self.condition
            .as_mut()
            .and_then(|c| c.set_wrapper(wrapper, name))
            .ok_or_else(|| CommandError::NoSuchSlot {
                command: "If".into(),
                name: name.to_string(),
            })
    }

    fn clear_wrappers(&mut self) {
        if let Some(condition) = &mut self.condition {
            condition.clear_wrappers();
        }
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), CommandError> {
        self.running = false;
        self.branch.initialize_children(ctx)
    }

    fn execute(&mut self, ctx: &mut RunContext<'_>) -> Result<ExecStatus, CommandError> {
        if !self.running {
            let condition = self
                .condition
                .as_ref()
                .ok_or_else(|| CommandError::parse("If", "no condition"))?;
            let branch = if condition.evaluate(ctx.store)? {
                0
            } else if self.branch.branch_count() > 1 {
                1
            } else {
                return Ok(ExecStatus::Done);
            };
            self.running = true;
            self.branch.start(branch);
            return Ok(ExecStatus::Continue);
        }
        match self.branch.execute_child(ctx)? {
            ChildStatus::Running(status) => Ok(running(status)),
            ChildStatus::Finished => {
                self.running = false;
                Ok(ExecStatus::Done)
            }
        }
    }

    fn run_complete(&mut self) {
        self.running = false;
        self.branch.run_complete();
    }

    fn rename_ref_object(&mut self, old: &str, new: &str) -> bool {
        let changed = self
            .condition
            .as_mut()
            .is_some_and(|c| c.rename_object(old, new));
        self.branch.rename_ref_object(old, new) || changed
    }

    fn branch(&self) -> Option<&BranchBehavior> {
        Some(&self.branch)
    }

    fn branch_mut(&mut self) -> Option<&mut BranchBehavior> {
        Some(&mut self.branch)
    }

    fn reset_loop_data(&mut self) {
        self.running = false;
        self.branch.reset_loop_data();
    }
}

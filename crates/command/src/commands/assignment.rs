use crate::command::{CommandBase, ExecStatus, GmatCommand, InitContext, RunContext};
use crate::commands::rename_leading;
use crate::expression::Expression;
use crate::{CommandError, ElementWrapper, WrapperError};

/// `GMAT lhs = rhs`; the `GMAT` keyword is optional in scripts.
#[derive(Debug)]
pub struct Assignment {
    base: CommandBase,
    lhs: String,
    rhs: String,
    expression: Option<Expression>,
    lhs_wrapper: Option<ElementWrapper>,
    rhs_wrapper: Option<ElementWrapper>,
}

impl Assignment {
    pub fn new() -> Self {
        Self {
            base: CommandBase::with_keyword("Assignment", "GMAT"),
            lhs: String::new(),
            rhs: String::new(),
            expression: None,
            lhs_wrapper: None,
            rhs_wrapper: None,
        }
    }

    pub fn lhs(&self) -> &str {
        &self.lhs
    }

    pub fn rhs(&self) -> &str {
        &self.rhs
    }
}

impl Default for Assignment {
    fn default() -> Self {
        Self::new()
    }
}

impl GmatCommand for Assignment {
    fn base(&self) -> &CommandBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CommandBase {
        &mut self.base
    }

    fn interpret_action(&mut self, line: &str) -> Result<(), CommandError> {
        let trimmed = line.trim();
        let text = if trimmed.starts_with("GMAT ") || trimmed.starts_with("GMAT'") {
            self.base.split_line(trimmed)?
        } else {
            self.base.set_label(None);
            trimmed.trim_end_matches(';').trim_end()
        };
        let (lhs, rhs) = text
            .split_once('=')
            .map(|(l, r)| (l.trim(), r.trim()))
            .filter(|(l, r)| !l.is_empty() && !r.is_empty() && !r.starts_with('='))
            .ok_or_else(|| CommandError::parse("Assignment", format!("expected `lhs = rhs`, found `{text}`")))?;
        self.expression = Expression::parse("Assignment", rhs)?;
        self.lhs = lhs.to_string();
        self.rhs = rhs.to_string();
        Ok(())
    }

    fn action_text(&self) -> String {
        match &self.expression {
            Some(expr) => format!("{} = {expr}", self.lhs),
            None => format!("{} = {}", self.lhs, self.rhs),
        }
    }

    fn wrapper_object_names(&self) -> Vec<String> {
        let mut names = vec![self.lhs.clone()];
        let operands = match &self.expression {
            Some(expr) => expr.operand_names(),
            None => vec![self.rhs.clone()],
        };
        for name in operands {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    fn set_element_wrapper(
        &mut self,
        wrapper: ElementWrapper,
        name: &str,
    ) -> Result<Option<ElementWrapper>, CommandError> {
        let mut matched = false;
        let mut previous = None;
        if self.lhs == name {
            previous = self.lhs_wrapper.replace(wrapper.clone());
            matched = true;
        }
        match &mut self.expression {
            Some(expr) => {
                if let Some(replaced) = expr.set_wrapper(wrapper, name)? {
                    previous = previous.or(replaced);
                    matched = true;
                }
            }
            None if self.rhs == name => {
                previous = self.rhs_wrapper.replace(wrapper).or(previous);
                matched = true;
            }
            None => {}
        }
        if matched {
            Ok(previous)
        } else {
            Err(CommandError::NoSuchSlot {
                command: self.action_text(),
                name: name.to_string(),
            })
        }
    }

    fn clear_wrappers(&mut self) {
        self.lhs_wrapper = None;
        self.rhs_wrapper = None;
        if let Some(expr) = &mut self.expression {
            expr.clear_wrappers();
        }
    }

    fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<(), CommandError> {
        let lhs = self
            .lhs_wrapper
            .as_ref()
            .ok_or_else(|| WrapperError::Unbound(self.lhs.clone()))?;
        if self.expression.is_some() && !lhs.is_scalar() {
            return Err(WrapperError::IncompatibleAssignment {
                lhs: self.lhs.clone(),
                lhs_type: lhs.value_type().name(),
                rhs: self.rhs.clone(),
                rhs_type: "Real",
            }
            .into());
        }
        if self.expression.is_none() && self.rhs_wrapper.is_none() {
            return Err(WrapperError::Unbound(self.rhs.clone()).into());
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &mut RunContext<'_>) -> Result<ExecStatus, CommandError> {
        let lhs = self
            .lhs_wrapper
            .as_ref()
            .ok_or_else(|| WrapperError::Unbound(self.lhs.clone()))?;
        match &self.expression {
            Some(expr) => {
                let value = expr.evaluate(ctx.store)?;
                lhs.take_required_action(ctx.store)?;
                lhs.set_real(ctx.store, value)?;
            }
            None => {
                let rhs = self
                    .rhs_wrapper
                    .as_ref()
                    .ok_or_else(|| WrapperError::Unbound(self.rhs.clone()))?;
                ElementWrapper::set_value(lhs, rhs, ctx.store)?;
            }
        }
        Ok(ExecStatus::Done)
    }

    fn rename_ref_object(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        if let Some(renamed) = rename_leading(&self.lhs, old, new) {
            self.lhs = renamed;
            changed = true;
        }
        match &mut self.expression {
            Some(expr) => {
                if expr.rename_object(old, new) {
                    self.rhs = expr.to_string();
                    changed = true;
                }
            }
            None => {
                if let Some(renamed) = rename_leading(&self.rhs, old, new) {
                    self.rhs = renamed;
                    changed = true;
                }
            }
        }
        for wrapper in [self.lhs_wrapper.as_mut(), self.rhs_wrapper.as_mut()]
            .into_iter()
            .flatten()
        {
            changed |= wrapper.rename_object(old, new);
        }
        changed
    }
}

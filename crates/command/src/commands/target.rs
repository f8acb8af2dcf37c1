//! Solver branch (`Target`) and the solver-facing commands nested in it.

use mcs_config::ExitMode;
use mcs_objects::{MissionObject, ObjectError, ObjectHandle, ObjectStore, exit_mode_name, parse_exit_mode};
use tracing::{debug, info, instrument};

use crate::branch::{BranchBehavior, ChildStatus};
use crate::command::{CommandBase, ExecStatus, GmatCommand, InitContext, RunContext, SolverRef};
use crate::commands::{parse_number, parse_options, rename_leading, solver_call, split_top_level};
use crate::publisher::PenAction;
use crate::solver::{GoalSpec, Solver, SolverAction, VariableSpec, create_solver};
use crate::{CommandError, ElementWrapper, SolverError, WrapperError};

/// Iterates its nested sequence while a solver adjusts the `Vary` variables.
#[derive(Debug)]
pub struct Target {
    base: CommandBase,
    branch: BranchBehavior,
    solver_name: String,
    exit_override: Option<ExitMode>,
    solver: Option<Box<dyn Solver>>,
    loop_data: Option<Vec<(ObjectHandle, MissionObject)>>,
    running: bool,
    in_pass: bool,
    converged: Option<bool>,
}

impl Target {
    pub fn new() -> Self {
        Self {
            base: CommandBase::new("Target"),
            branch: BranchBehavior::new("EndTarget"),
            solver_name: String::new(),
            exit_override: None,
            solver: None,
            loop_data: None,
            running: false,
            in_pass: false,
            converged: None,
        }
    }

    pub fn solver_name(&self) -> &str {
        &self.solver_name
    }

    /// Outcome of the most recent completed run of the loop.
    pub fn converged(&self) -> Option<bool> {
        self.converged
    }

    /// Clone every spacecraft so each pass starts from the same state.
    fn store_loop_data(&mut self, store: &ObjectStore) -> Result<(), ObjectError> {
        let handles = store.spacecraft_handles();
        self.loop_data = Some(store.snapshot(&handles)?);
        Ok(())
    }

    fn restore_loop_data(&mut self, store: &mut ObjectStore) -> Result<(), ObjectError> {
        if let Some(snapshot) = &self.loop_data {
            store.restore(snapshot)?;
        }
        self.branch.reset_loop_data();
        Ok(())
    }

    fn free_loop_data(&mut self) {
        self.loop_data = None;
    }

    fn finish(&mut self, ctx: &mut RunContext<'_>, converged: bool) -> Result<ExecStatus, CommandError> {
        self.running = false;
        self.in_pass = false;
        self.converged = Some(converged);
        self.free_loop_data();
        ctx.publisher.pen_action(PenAction::Darken);
        let (exit_mode, progress) = match &self.solver {
            Some(solver) => (solver.exit_mode(), solver.report_progress()),
            None => (ExitMode::default(), String::new()),
        };
        if converged {
            info!(solver = %self.solver_name, "targeting converged; {progress}");
            return Ok(ExecStatus::Done);
        }
        ctx.warn(format!(
            "solver `{}` did not converge; {progress}",
            self.solver_name
        ));
        if exit_mode == ExitMode::Stop {
            return Err(CommandError::Interrupted(format!(
                "solver `{}` did not converge and its exit mode is Stop",
                self.solver_name
            )));
        }
        Ok(ExecStatus::Done)
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::new()
    }
}

impl GmatCommand for Target {
    fn base(&self) -> &CommandBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CommandBase {
        &mut self.base
    }

    fn interpret_action(&mut self, line: &str) -> Result<(), CommandError> {
        let rest = self.base.split_line(line)?;
        let (name, options) = match rest.find('{') {
            Some(open) => (rest[..open].trim(), Some(&rest[open..])),
            None => (rest.trim(), None),
        };
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(CommandError::parse("Target", format!("expected a solver name, found `{rest}`")));
        }
        self.exit_override = None;
        if let Some(options) = options {
            for (key, value) in parse_options("Target", options)? {
                match key {
                    "ExitMode" => {
                        self.exit_override = Some(parse_exit_mode(value).ok_or_else(|| {
                            CommandError::parse("Target", format!("unknown exit mode `{value}`"))
                        })?);
                    }
                    "SolveMode" if value == "Solve" => {}
                    other => {
                        return Err(CommandError::parse("Target", format!("unknown option `{other}`")));
                    }
                }
            }
        }
        self.solver_name = name.to_string();
        Ok(())
    }

    fn action_text(&self) -> String {
        match self.exit_override {
            Some(mode) => format!("{} {{ExitMode = {}}}", self.solver_name, exit_mode_name(mode)),
            None => self.solver_name.clone(),
        }
    }

    #[instrument(level = "debug", skip_all, fields(solver = %self.solver_name))]
    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), CommandError> {
        let mut settings = match ctx.store.by_name(&self.solver_name) {
            Some(MissionObject::Solver(settings)) => settings.clone(),
            Some(other) => {
                return Err(ObjectError::WrongKind {
                    name: self.solver_name.clone(),
                    expected: "DifferentialCorrector",
                    found: other.type_name(),
                }
                .into());
            }
            None => return Err(ObjectError::NotFound(self.solver_name.clone()).into()),
        };
        if let Some(mode) = self.exit_override {
            settings.exit_mode = mode;
        }
        let mut solver = create_solver(&settings).ok_or_else(|| SolverError::UnknownType(settings.kind.clone()))?;
        self.branch
            .initialize_children(&mut ctx.with_solver(solver.as_mut()))?;
        solver.initialize()?;
        self.solver = Some(solver);
        self.running = false;
        self.in_pass = false;
        self.converged = None;
        Ok(())
    }

    fn execute(&mut self, ctx: &mut RunContext<'_>) -> Result<ExecStatus, CommandError> {
        if self.solver.is_none() {
            return Err(CommandError::NoSolver {
                command: format!("Target {}", self.solver_name),
            });
        }
        if !self.running {
            self.store_loop_data(ctx.store)?;
            if let Some(solver) = self.solver.as_mut() {
                solver.reset();
            }
            ctx.publisher.pen_action(PenAction::Lighten);
            self.running = true;
            self.in_pass = false;
        }
        if !self.in_pass {
            let action = match self.solver.as_mut() {
                Some(solver) => solver.advance()?,
                None => return Err(CommandError::NoSolver { command: "Target".into() }),
            };
            match action {
                SolverAction::Finished { converged } => return self.finish(ctx, converged),
                SolverAction::RunNominal => ctx.publisher.pen_action(PenAction::PenDown),
                SolverAction::RunPerturbation => ctx.publisher.pen_action(PenAction::PenUp),
            }
            debug!(solver = %self.solver_name, ?action, "starting pass");
            self.restore_loop_data(ctx.store)?;
            self.branch.start(0);
            self.in_pass = true;
            return Ok(ExecStatus::Continue);
        }
        let Self { branch, solver, .. } = self;
        let Some(solver) = solver.as_deref_mut() else {
            return Err(CommandError::NoSolver { command: "Target".into() });
        };
        let status = branch.execute_child(&mut ctx.with_solver(solver))?;
        match status {
            ChildStatus::Running(ExecStatus::Yield) => Ok(ExecStatus::Yield),
            ChildStatus::Running(_) => Ok(ExecStatus::Continue),
            ChildStatus::Finished => {
                self.in_pass = false;
                ctx.publisher.pen_action(PenAction::BreakPoint);
                Ok(ExecStatus::Continue)
            }
        }
    }

    fn run_complete(&mut self) {
        self.running = false;
        self.in_pass = false;
        self.free_loop_data();
        if let Some(solver) = self.solver.as_mut() {
            solver.reset();
        }
        self.branch.run_complete();
    }

    fn rename_ref_object(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        if self.solver_name == old {
            self.solver_name = new.to_string();
            changed = true;
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
        self.running = false;
        self.in_pass = false;
        self.free_loop_data();
        self.branch.reset_loop_data();
    }
}

/// Check that a nested command talks to the solver of its enclosing loop.
fn active_solver<'s>(
    solver: &'s mut Option<SolverRef<'_>>,
    command: &str,
    requested: &str,
) -> Result<&'s mut (dyn Solver + 'static), CommandError> {
    let solver = solver.as_deref_mut().ok_or_else(|| CommandError::NoSolver {
        command: command.to_string(),
    })?;
    if solver.name() != requested {
        return Err(CommandError::WrongSolver {
            command: command.to_string(),
            requested: requested.to_string(),
            active: solver.name().to_string(),
        });
    }
    Ok(solver)
}

fn scalar_slot(wrapper: &ElementWrapper, name: &str) -> Result<(), CommandError> {
    if wrapper.is_scalar() {
        Ok(())
    } else {
        Err(WrapperError::TypeMismatch {
            description: name.to_string(),
            expected: "Real",
            found: wrapper.value_type().name(),
        }
        .into())
    }
}

/// `Vary DC1(Sat.VX = 7.6, {Perturbation = 1e-5, Lower = 0, Upper = 10, MaxStep = 0.5})`.
#[derive(Debug)]
pub struct Vary {
    base: CommandBase,
    solver_name: String,
    variable: String,
    initial: String,
    spec: VariableSpec,
    options: Vec<(String, String)>,
    variable_wrapper: Option<ElementWrapper>,
    initial_wrapper: Option<ElementWrapper>,
    id: Option<usize>,
    last_value: Option<f64>,
}

impl Vary {
    pub fn new() -> Self {
        Self {
            base: CommandBase::new("Vary"),
            solver_name: String::new(),
            variable: String::new(),
            initial: String::new(),
            spec: VariableSpec::new(""),
            options: Vec::new(),
            variable_wrapper: None,
            initial_wrapper: None,
            id: None,
            last_value: None,
        }
    }

    pub fn spec(&self) -> &VariableSpec {
        &self.spec
    }
}

impl Default for Vary {
    fn default() -> Self {
        Self::new()
    }
}

impl GmatCommand for Vary {
    fn base(&self) -> &CommandBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CommandBase {
        &mut self.base
    }

    fn interpret_action(&mut self, line: &str) -> Result<(), CommandError> {
        let rest = self.base.split_line(line)?;
        let (solver, inner) = solver_call("Vary", rest)?;
        let parts = split_top_level(inner, ',');
        let (variable, initial) = parts[0]
            .split_once('=')
            .map(|(v, i)| (v.trim(), i.trim()))
            .filter(|(v, i)| !v.is_empty() && !i.is_empty())
            .ok_or_else(|| CommandError::parse("Vary", format!("expected `Variable = Initial`, found `{}`", parts[0])))?;
        let mut spec = VariableSpec::new(variable);
        let mut options = Vec::new();
        for part in &parts[1..] {
            for (key, value) in parse_options("Vary", part)? {
                let number = parse_number("Vary", key, value)?;
                match key {
                    "Perturbation" => spec.perturbation = number,
                    "Lower" => spec.lower = number,
                    "Upper" => spec.upper = number,
                    "MaxStep" => spec.max_step = number,
                    other => return Err(CommandError::parse("Vary", format!("unknown option `{other}`"))),
                }
                options.push((key.to_string(), value.to_string()));
            }
        }
        if spec.perturbation == 0.0 {
            return Err(CommandError::parse("Vary", "Perturbation must be non-zero"));
        }
        if spec.lower > spec.upper || spec.max_step <= 0.0 {
            return Err(CommandError::parse("Vary", "bounds must satisfy Lower <= Upper and MaxStep > 0"));
        }
        self.solver_name = solver.to_string();
        self.variable = variable.to_string();
        self.initial = initial.to_string();
        self.spec = spec;
        self.options = options;
        Ok(())
    }

    fn action_text(&self) -> String {
        let mut text = format!("{}({} = {}", self.solver_name, self.variable, self.initial);
        if !self.options.is_empty() {
            let options: Vec<String> = self.options.iter().map(|(k, v)| format!("{k} = {v}")).collect();
            text.push_str(&format!(", {{{}}}", options.join(", ")));
        }
        text.push(')');
        text
    }

    fn wrapper_object_names(&self) -> Vec<String> {
        if self.variable == self.initial {
            vec![self.variable.clone()]
        } else {
            vec![self.variable.clone(), self.initial.clone()]
        }
    }

    fn set_element_wrapper(
        &mut self,
        wrapper: ElementWrapper,
        name: &str,
    ) -> Result<Option<ElementWrapper>, CommandError> {
        scalar_slot(&wrapper, name)?;
        let mut previous = None;
        let mut matched = false;
        if self.variable == name {
            previous = self.variable_wrapper.replace(wrapper.clone());
            matched = true;
        }
        if self.initial == name {
            previous = self.initial_wrapper.replace(wrapper).or(previous);
            matched = true;
        }
        if matched {
            Ok(previous)
        } else {
            Err(CommandError::NoSuchSlot {
                command: "Vary".into(),
                name: name.to_string(),
            })
        }
    }

    fn clear_wrappers(&mut self) {
        self.variable_wrapper = None;
        self.initial_wrapper = None;
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), CommandError> {
        let initial = self
            .initial_wrapper
            .as_ref()
            .ok_or_else(|| WrapperError::Unbound(self.initial.clone()))?
            .evaluate_real(ctx.store)?;
        let solver = active_solver(&mut ctx.solver, "Vary", &self.solver_name)?;
        let spec = VariableSpec {
            name: self.variable.clone(),
            initial,
            ..self.spec.clone()
        };
        self.id = Some(solver.register_variable(spec));
        self.last_value = None;
        Ok(())
    }

    fn execute(&mut self, ctx: &mut RunContext<'_>) -> Result<ExecStatus, CommandError> {
        let id = self.id.ok_or_else(|| CommandError::NoSolver {
            command: self.action_text(),
        })?;
        let variable = self
            .variable_wrapper
            .as_ref()
            .ok_or_else(|| WrapperError::Unbound(self.variable.clone()))?;
        let initial = self
            .initial_wrapper
            .as_ref()
            .ok_or_else(|| WrapperError::Unbound(self.initial.clone()))?;
        let solver = active_solver(&mut ctx.solver, "Vary", &self.solver_name)?;
        if solver.is_first_pass() {
            let start = match (solver.exit_mode(), self.last_value) {
                (ExitMode::SaveAndContinue, Some(saved)) => saved,
                _ => initial.evaluate_real(ctx.store)?,
            };
            solver.set_initial_value(id, start);
        }
        let value = solver.variable_value(id);
        variable.take_required_action(ctx.store)?;
        variable.set_real(ctx.store, value)?;
        self.last_value = Some(value);
        Ok(ExecStatus::Done)
    }

    fn run_complete(&mut self) {
        self.last_value = None;
    }

    fn rename_ref_object(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        for field in [&mut self.variable, &mut self.initial] {
            if let Some(renamed) = rename_leading(field, old, new) {
                *field = renamed;
                changed = true;
            }
        }
        if self.solver_name == old {
            self.solver_name = new.to_string();
            changed = true;
        }
        if changed {
            self.clear_wrappers();
        }
        changed
    }
}

/// `Achieve DC1(Sat.RMAG = 42164, {Tolerance = 0.1})`.
#[derive(Debug)]
pub struct Achieve {
    base: CommandBase,
    solver_name: String,
    goal: String,
    target: String,
    tolerance: String,
    goal_wrapper: Option<ElementWrapper>,
    target_wrapper: Option<ElementWrapper>,
    tolerance_wrapper: Option<ElementWrapper>,
    id: Option<usize>,
}

impl Achieve {
    pub const DEFAULT_TOLERANCE: &'static str = "0.1";

    pub fn new() -> Self {
        Self {
            base: CommandBase::new("Achieve"),
            solver_name: String::new(),
            goal: String::new(),
            target: String::new(),
            tolerance: Self::DEFAULT_TOLERANCE.into(),
            goal_wrapper: None,
            target_wrapper: None,
            tolerance_wrapper: None,
            id: None,
        }
    }

    fn slots(&mut self) -> [(&str, &mut Option<ElementWrapper>); 3] {
        [
            (&self.goal, &mut self.goal_wrapper),
            (&self.target, &mut self.target_wrapper),
            (&self.tolerance, &mut self.tolerance_wrapper),
        ]
    }

    fn evaluate(wrapper: &Option<ElementWrapper>, name: &str, store: &ObjectStore) -> Result<f64, WrapperError> {
        wrapper
            .as_ref()
            .ok_or_else(|| WrapperError::Unbound(name.to_string()))?
            .evaluate_real(store)
    }
}

impl Default for Achieve {
    fn default() -> Self {
        Self::new()
    }
}

impl GmatCommand for Achieve {
    fn base(&self) -> &CommandBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CommandBase {
        &mut self.base
    }

    fn interpret_action(&mut self, line: &str) -> Result<(), CommandError> {
        let rest = self.base.split_line(line)?;
        let (solver, inner) = solver_call("Achieve", rest)?;
        let parts = split_top_level(inner, ',');
        let (goal, target) = parts[0]
            .split_once('=')
            .map(|(g, t)| (g.trim(), t.trim()))
            .filter(|(g, t)| !g.is_empty() && !t.is_empty())
            .ok_or_else(|| CommandError::parse("Achieve", format!("expected `Goal = Value`, found `{}`", parts[0])))?;
        let mut tolerance = Self::DEFAULT_TOLERANCE.to_string();
        for part in &parts[1..] {
            for (key, value) in parse_options("Achieve", part)? {
                match key {
                    "Tolerance" => tolerance = value.to_string(),
                    other => return Err(CommandError::parse("Achieve", format!("unknown option `{other}`"))),
                }
            }
        }
        self.solver_name = solver.to_string();
        self.goal = goal.to_string();
        self.target = target.to_string();
        self.tolerance = tolerance;
        Ok(())
    }

    fn action_text(&self) -> String {
        format!(
            "{}({} = {}, {{Tolerance = {}}})",
            self.solver_name, self.goal, self.target, self.tolerance
        )
    }

    fn wrapper_object_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in [&self.goal, &self.target, &self.tolerance] {
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
        scalar_slot(&wrapper, name)?;
        let mut previous = None;
        let mut matched = false;
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
                command: "Achieve".into(),
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
        let target = Self::evaluate(&self.target_wrapper, &self.target, ctx.store)?;
        let tolerance = Self::evaluate(&self.tolerance_wrapper, &self.tolerance, ctx.store)?;
        if self.goal_wrapper.is_none() {
            return Err(WrapperError::Unbound(self.goal.clone()).into());
        }
        let solver = active_solver(&mut ctx.solver, "Achieve", &self.solver_name)?;
        self.id = Some(solver.register_goal(GoalSpec {
            name: self.goal.clone(),
            target,
            tolerance,
        }));
        Ok(())
    }

    fn execute(&mut self, ctx: &mut RunContext<'_>) -> Result<ExecStatus, CommandError> {
        let id = self.id.ok_or_else(|| CommandError::NoSolver {
            command: self.action_text(),
        })?;
        let achieved = Self::evaluate(&self.goal_wrapper, &self.goal, ctx.store)?;
        let target = Self::evaluate(&self.target_wrapper, &self.target, ctx.store)?;
        let tolerance = Self::evaluate(&self.tolerance_wrapper, &self.tolerance, ctx.store)?;
        let solver = active_solver(&mut ctx.solver, "Achieve", &self.solver_name)?;
        solver.set_goal(id, target, tolerance)?;
        solver.set_result(id, achieved)?;
        Ok(ExecStatus::Done)
    }

    fn rename_ref_object(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        for field in [&mut self.goal, &mut self.target, &mut self.tolerance] {
            if let Some(renamed) = rename_leading(field, old, new) {
                *field = renamed;
                changed = true;
            }
        }
        if self.solver_name == old {
            self.solver_name = new.to_string();
            changed = true;
        }
        if changed {
            self.clear_wrappers();
        }
        changed
    }
}

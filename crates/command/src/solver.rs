//! Targeting solvers driven by `Target` loops.
//!
//! A solver is a small state machine. The owning branch command asks it for
//! the next pass with [`Solver::advance`], runs its nested sequence, and the
//! `Vary`/`Achieve` commands inside read variables and report achieved goal
//! values while the pass executes.

use std::fmt;

use mcs_config::ExitMode;
use mcs_objects::SolverSettings;
use nalgebra::{DMatrix, DVector};
use tracing::{debug, info};

use crate::SolverError;

/// What the owning loop must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverAction {
    RunNominal,
    RunPerturbation,
    Finished { converged: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableSpec {
    pub name: String,
    pub initial: f64,
    pub perturbation: f64,
    pub lower: f64,
    pub upper: f64,
    pub max_step: f64,
}

impl VariableSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            initial: 0.0,
            perturbation: 1.0e-6,
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
            max_step: f64::INFINITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GoalSpec {
    pub name: String,
    pub target: f64,
    pub tolerance: f64,
}

pub trait Solver: fmt::Debug + Send {
    fn name(&self) -> &str;

    fn type_name(&self) -> &'static str;

    fn exit_mode(&self) -> ExitMode;

    /// Returns the variable id used by later calls.
    fn register_variable(&mut self, spec: VariableSpec) -> usize;

    /// Returns the goal id used by [`Solver::set_result`].
    fn register_goal(&mut self, spec: GoalSpec) -> usize;

    /// Update a goal's target and tolerance before a pass.
    fn set_goal(&mut self, id: usize, target: f64, tolerance: f64) -> Result<(), SolverError>;

    fn initialize(&mut self) -> Result<(), SolverError>;

    fn advance(&mut self) -> Result<SolverAction, SolverError>;

    /// True until the first nominal pass has completed.
    fn is_first_pass(&self) -> bool;

    fn set_initial_value(&mut self, id: usize, value: f64);

    fn variable_value(&self, id: usize) -> f64;

    fn set_result(&mut self, id: usize, achieved: f64) -> Result<(), SolverError>;

    fn iteration(&self) -> u32;

    fn report_progress(&self) -> String;

    /// Forget run state; registrations are kept.
    fn reset(&mut self);

    /// Drop registrations as well, ahead of a fresh initialization.
    fn clear_registrations(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DcState {
    Initial,
    Nominal,
    Perturbing(usize),
    Finished,
}

/// Newton-Raphson targeter with a forward-difference Jacobian.
#[derive(Debug, Clone)]
pub struct DifferentialCorrector {
    settings: SolverSettings,
    variables: Vec<VariableSpec>,
    goals: Vec<GoalSpec>,
    values: Vec<f64>,
    nominal_values: Vec<f64>,
    achieved: Vec<f64>,
    nominal_achieved: Vec<f64>,
    jacobian: DMatrix<f64>,
    iteration: u32,
    state: DcState,
    converged: bool,
}

impl DifferentialCorrector {
    pub fn new(settings: SolverSettings) -> Self {
        Self {
            settings,
            variables: Vec::new(),
            goals: Vec::new(),
            values: Vec::new(),
            nominal_values: Vec::new(),
            achieved: Vec::new(),
            nominal_achieved: Vec::new(),
            jacobian: DMatrix::zeros(0, 0),
            iteration: 0,
            state: DcState::Initial,
            converged: false,
        }
    }

    pub fn is_converged(&self) -> bool {
        self.converged
    }

    fn goals_met(&self) -> bool {
        self.goals
            .iter()
            .zip(&self.nominal_achieved)
            .all(|(goal, achieved)| (achieved - goal.target).abs() <= goal.tolerance)
    }

    fn start_perturbation(&mut self, index: usize) {
        self.values.clone_from(&self.nominal_values);
        let var = &self.variables[index];
        self.values[index] = self.nominal_values[index] + var.perturbation;
        self.state = DcState::Perturbing(index);
    }

    /// Least-squares Newton update, limited per variable by max step and bounds.
    fn newton_step(&mut self) -> Result<(), SolverError> {
        let residual = DVector::from_iterator(
            self.goals.len(),
            self.goals
                .iter()
                .zip(&self.nominal_achieved)
                .map(|(goal, achieved)| goal.target - achieved),
        );
        let svd = self.jacobian.clone().svd(true, true);
        let delta = svd
            .solve(&residual, 1.0e-14)
            .map_err(|_| SolverError::Singular(self.settings.name.clone()))?;
        if delta.iter().any(|d| !d.is_finite()) {
            return Err(SolverError::Singular(self.settings.name.clone()));
        }
        for (i, var) in self.variables.iter().enumerate() {
            let step = delta[i].clamp(-var.max_step, var.max_step);
            self.nominal_values[i] = (self.nominal_values[i] + step).clamp(var.lower, var.upper);
        }
        self.values.clone_from(&self.nominal_values);
        Ok(())
    }
}

impl Solver for DifferentialCorrector {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn type_name(&self) -> &'static str {
        "DifferentialCorrector"
    }

    fn exit_mode(&self) -> ExitMode {
        self.settings.exit_mode
    }

    fn register_variable(&mut self, spec: VariableSpec) -> usize {
        self.values.push(spec.initial);
        self.nominal_values.push(spec.initial);
        self.variables.push(spec);
        self.variables.len() - 1
    }

    fn register_goal(&mut self, spec: GoalSpec) -> usize {
        self.achieved.push(0.0);
        self.nominal_achieved.push(0.0);
        self.goals.push(spec);
        self.goals.len() - 1
    }

    fn set_goal(&mut self, id: usize, target: f64, tolerance: f64) -> Result<(), SolverError> {
        let goal = self.goals.get_mut(id).ok_or_else(|| SolverError::UnknownGoal {
            solver: self.settings.name.clone(),
            id,
        })?;
        goal.target = target;
        goal.tolerance = tolerance;
        Ok(())
    }

    fn initialize(&mut self) -> Result<(), SolverError> {
        if self.variables.is_empty() {
            return Err(SolverError::NoVariables(self.settings.name.clone()));
        }
        if self.goals.is_empty() {
            return Err(SolverError::NoGoals(self.settings.name.clone()));
        }
        self.jacobian = DMatrix::zeros(self.goals.len(), self.variables.len());
        self.reset();
        Ok(())
    }

    fn advance(&mut self) -> Result<SolverAction, SolverError> {
        match self.state {
            DcState::Initial => {
                self.state = DcState::Nominal;
                Ok(SolverAction::RunNominal)
            }
            DcState::Nominal => {
                self.nominal_achieved.clone_from(&self.achieved);
                if self.settings.show_progress {
                    info!(solver = %self.settings.name, "{}", self.report_progress());
                }
                if self.goals_met() {
                    self.converged = true;
                    self.state = DcState::Finished;
                    return Ok(SolverAction::Finished { converged: true });
                }
                if self.iteration >= self.settings.max_iterations {
                    self.state = DcState::Finished;
                    return Ok(SolverAction::Finished { converged: false });
                }
                self.start_perturbation(0);
                Ok(SolverAction::RunPerturbation)
            }
            DcState::Perturbing(index) => {
                let pert = self.variables[index].perturbation;
                for (row, (achieved, nominal)) in
                    self.achieved.iter().zip(&self.nominal_achieved).enumerate()
                {
                    self.jacobian[(row, index)] = (achieved - nominal) / pert;
                }
                if index + 1 < self.variables.len() {
                    self.start_perturbation(index + 1);
                    return Ok(SolverAction::RunPerturbation);
                }
                self.newton_step()?;
                self.iteration += 1;
                debug!(solver = %self.settings.name, iteration = self.iteration, values = ?self.values, "newton step");
                self.state = DcState::Nominal;
                Ok(SolverAction::RunNominal)
            }
            DcState::Finished => Ok(SolverAction::Finished {
                converged: self.converged,
            }),
        }
    }

    fn is_first_pass(&self) -> bool {
        self.iteration == 0 && matches!(self.state, DcState::Initial | DcState::Nominal)
    }

    fn set_initial_value(&mut self, id: usize, value: f64) {
        if let Some(var) = self.variables.get_mut(id) {
            var.initial = value;
            self.values[id] = value;
            self.nominal_values[id] = value;
        }
    }

    fn variable_value(&self, id: usize) -> f64 {
        self.values.get(id).copied().unwrap_or(f64::NAN)
    }

    fn set_result(&mut self, id: usize, achieved: f64) -> Result<(), SolverError> {
        let slot = self.achieved.get_mut(id).ok_or_else(|| SolverError::UnknownGoal {
            solver: self.settings.name.clone(),
            id,
        })?;
        *slot = achieved;
        Ok(())
    }

    fn iteration(&self) -> u32 {
        self.iteration
    }

    fn report_progress(&self) -> String {
        let vars: Vec<String> = self
            .variables
            .iter()
            .zip(&self.nominal_values)
            .map(|(v, value)| format!("{} = {value:.9}", v.name))
            .collect();
        let goals: Vec<String> = self
            .goals
            .iter()
            .zip(&self.nominal_achieved)
            .map(|(g, achieved)| format!("{} = {achieved:.9} (target {:.9})", g.name, g.target))
            .collect();
        format!(
            "iteration {}: {}; {}",
            self.iteration,
            vars.join(", "),
            goals.join(", ")
        )
    }

    fn reset(&mut self) {
        for (i, var) in self.variables.iter().enumerate() {
            self.values[i] = var.initial;
            self.nominal_values[i] = var.initial;
        }
        self.achieved.iter_mut().for_each(|a| *a = 0.0);
        self.nominal_achieved.iter_mut().for_each(|a| *a = 0.0);
        self.iteration = 0;
        self.state = DcState::Initial;
        self.converged = false;
    }

    fn clear_registrations(&mut self) {
        self.variables.clear();
        self.goals.clear();
        self.values.clear();
        self.nominal_values.clear();
        self.achieved.clear();
        self.nominal_achieved.clear();
        self.reset();
    }
}

/// Build a solver from its configured settings; unknown kinds yield `None`.
pub fn create_solver(settings: &SolverSettings) -> Option<Box<dyn Solver>> {
    match settings.kind.as_str() {
        "DifferentialCorrector" => Some(Box::new(DifferentialCorrector::new(settings.clone()))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive the corrector against `f(x, y) = (x + 2y, x * y)`.
    #[test]
    fn two_by_two_system_converges() {
        let mut settings = SolverSettings::new("DC");
        settings.show_progress = false;
        let mut dc = DifferentialCorrector::new(settings);
        for (name, initial) in [("x", 1.0), ("y", 1.0)] {
            dc.register_variable(VariableSpec {
                initial,
                perturbation: 1.0e-6,
                ..VariableSpec::new(name)
            });
        }
        dc.register_goal(GoalSpec {
            name: "sum".into(),
            target: 5.0,
            tolerance: 1.0e-9,
        });
        dc.register_goal(GoalSpec {
            name: "product".into(),
            target: 2.0,
            tolerance: 1.0e-9,
        });
        dc.initialize().unwrap();
        let converged = loop {
            match dc.advance().unwrap() {
                SolverAction::Finished { converged } => break converged,
                _ => {
                    let (x, y) = (dc.variable_value(0), dc.variable_value(1));
                    dc.set_result(0, x + 2.0 * y).unwrap();
                    dc.set_result(1, x * y).unwrap();
                }
            }
        };
        assert!(converged, "{}", dc.report_progress());
        let (x, y) = (dc.variable_value(0), dc.variable_value(1));
        assert!((x + 2.0 * y - 5.0).abs() < 1e-9);
        assert!((x * y - 2.0).abs() < 1e-9);
    }

    #[test]
    fn max_step_limits_the_update() {
        let mut settings = SolverSettings::new("DC");
        settings.show_progress = false;
        settings.max_iterations = 1;
        let mut dc = DifferentialCorrector::new(settings);
        dc.register_variable(VariableSpec {
            max_step: 0.5,
            ..VariableSpec::new("x")
        });
        dc.register_goal(GoalSpec {
            name: "x".into(),
            target: 10.0,
            tolerance: 1.0e-6,
        });
        dc.initialize().unwrap();
        let mut last = None;
        while let SolverAction::RunNominal | SolverAction::RunPerturbation = dc.advance().unwrap() {
            let x = dc.variable_value(0);
            last = Some(x);
            dc.set_result(0, x).unwrap();
        }
        assert_eq!(last, Some(0.5));
        assert!(!dc.is_converged());
    }

    #[test]
    fn missing_goals_are_rejected() {
        let mut dc = DifferentialCorrector::new(SolverSettings::new("DC"));
        dc.register_variable(VariableSpec::new("x"));
        assert_eq!(dc.initialize(), Err(SolverError::NoGoals("DC".into())));
    }
}

//! Fixed and adaptive Runge-Kutta integrators.
//!
//! Step sizes are signed: a negative step integrates backward in time. The
//! direction is fixed per run through [`Integrator::set_direction`].

use std::fmt;

use mcs_objects::PropagatorSettings;
use tracing::warn;

use crate::{ForceModel, PropagationError};

pub trait Integrator: fmt::Debug + Send {
    fn type_name(&self) -> &'static str;

    /// Take one step of the integrator's own choosing; returns the signed step taken.
    fn step(
        &mut self,
        model: &dyn ForceModel,
        elapsed_s: f64,
        state: &mut [f64],
    ) -> Result<f64, PropagationError>;

    /// Advance by exactly `dt`, subdividing as needed. The working step size is left unchanged.
    fn step_by(
        &mut self,
        model: &dyn ForceModel,
        elapsed_s: f64,
        state: &mut [f64],
        dt: f64,
    ) -> Result<(), PropagationError>;

    fn step_size(&self) -> f64;

    fn set_step_size(&mut self, step_s: f64);

    fn set_direction(&mut self, backward: bool) {
        let magnitude = self.step_size().abs();
        self.set_step_size(if backward { -magnitude } else { magnitude });
    }
}

/// Build an integrator by type name; unknown names yield `None`.
pub fn create_integrator(settings: &PropagatorSettings) -> Option<Box<dyn Integrator>> {
    match settings.integrator.as_str() {
        "RungeKutta4" | "RK4" => Some(Box::new(RungeKutta4::new(settings.initial_step_s))),
        "PrinceDormand45" | "DormandPrince45" => Some(Box::new(PrinceDormand45::new(settings))),
        _ => None,
    }
}

/// Classic fixed-step fourth-order Runge-Kutta.
#[derive(Debug, Clone)]
pub struct RungeKutta4 {
    step_s: f64,
}

impl RungeKutta4 {
    pub fn new(step_s: f64) -> Self {
        Self { step_s }
    }
}

fn rk4_step(
    model: &dyn ForceModel,
    t: f64,
    state: &mut [f64],
    h: f64,
) -> Result<(), PropagationError> {
    let n = state.len();
    let mut k1 = vec![0.0; n];
    let mut k2 = vec![0.0; n];
    let mut k3 = vec![0.0; n];
    let mut k4 = vec![0.0; n];
    let mut tmp = vec![0.0; n];

    model.derivatives(t, state, &mut k1)?;
    for i in 0..n {
        tmp[i] = state[i] + 0.5 * h * k1[i];
    }
    model.derivatives(t + 0.5 * h, &tmp, &mut k2)?;
    for i in 0..n {
        tmp[i] = state[i] + 0.5 * h * k2[i];
    }
    model.derivatives(t + 0.5 * h, &tmp, &mut k3)?;
    for i in 0..n {
        tmp[i] = state[i] + h * k3[i];
    }
    model.derivatives(t + h, &tmp, &mut k4)?;
    for i in 0..n {
        state[i] += h / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
    }
    Ok(())
}

impl Integrator for RungeKutta4 {
    fn type_name(&self) -> &'static str {
        "RungeKutta4"
    }

    fn step(
        &mut self,
        model: &dyn ForceModel,
        elapsed_s: f64,
        state: &mut [f64],
    ) -> Result<f64, PropagationError> {
        rk4_step(model, elapsed_s, state, self.step_s)?;
        Ok(self.step_s)
    }

    fn step_by(
        &mut self,
        model: &dyn ForceModel,
        elapsed_s: f64,
        state: &mut [f64],
        dt: f64,
    ) -> Result<(), PropagationError> {
        if dt == 0.0 {
            return Ok(());
        }
        let pieces = (dt.abs() / self.step_s.abs()).ceil().max(1.0);
        let h = dt / pieces;
        for i in 0..pieces as usize {
            rk4_step(model, elapsed_s + i as f64 * h, state, h)?;
        }
        Ok(())
    }

    fn step_size(&self) -> f64 {
        self.step_s
    }

    fn set_step_size(&mut self, step_s: f64) {
        self.step_s = step_s;
    }
}

const A: [[f64; 6]; 6] = [
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0, 0.0],
    [
        19_372.0 / 6_561.0,
        -25_360.0 / 2_187.0,
        64_448.0 / 6_561.0,
        -212.0 / 729.0,
        0.0,
        0.0,
    ],
    [
        9_017.0 / 3_168.0,
        -355.0 / 33.0,
        46_732.0 / 5_247.0,
        49.0 / 176.0,
        -5_103.0 / 18_656.0,
        0.0,
    ],
    [
        35.0 / 384.0,
        0.0,
        500.0 / 1_113.0,
        125.0 / 192.0,
        -2_187.0 / 6_784.0,
        11.0 / 84.0,
    ],
];
const C: [f64; 7] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];
/// Difference between the fifth- and fourth-order weights.
const E: [f64; 7] = [
    71.0 / 57_600.0,
    0.0,
    -71.0 / 16_695.0,
    71.0 / 1_920.0,
    -17_253.0 / 339_200.0,
    22.0 / 525.0,
    -1.0 / 40.0,
];

/// Dormand-Prince 5(4) embedded pair with relative error control.
#[derive(Debug, Clone)]
pub struct PrinceDormand45 {
    step_s: f64,
    accuracy: f64,
    min_step_s: f64,
    max_step_s: f64,
    max_attempts: u32,
    stop_if_accuracy_violated: bool,
}

impl PrinceDormand45 {
    pub fn new(settings: &PropagatorSettings) -> Self {
        Self {
            step_s: settings.initial_step_s,
            accuracy: settings.accuracy,
            min_step_s: settings.min_step_s,
            max_step_s: settings.max_step_s,
            max_attempts: settings.max_step_attempts.max(1),
            stop_if_accuracy_violated: settings.stop_if_accuracy_violated,
        }
    }

    /// One trial step of size `h` into `out`; returns the scaled error estimate.
    fn attempt(
        &self,
        model: &dyn ForceModel,
        t: f64,
        state: &[f64],
        h: f64,
        out: &mut [f64],
    ) -> Result<f64, PropagationError> {
        let n = state.len();
        let mut k = vec![vec![0.0; n]; 7];
        let mut tmp = vec![0.0; n];
        model.derivatives(t, state, &mut k[0])?;
        for stage in 1..7 {
            for i in 0..n {
                let mut sum = 0.0;
                for (j, a) in A[stage - 1].iter().enumerate().take(stage) {
                    sum += a * k[j][i];
                }
                tmp[i] = state[i] + h * sum;
            }
            model.derivatives(t + C[stage] * h, &tmp, &mut k[stage])?;
        }
        // Stage six is the fifth-order solution (FSAL).
        out.copy_from_slice(&tmp);

        let mut error: f64 = 0.0;
        for i in 0..n {
            let delta: f64 = (0..7).map(|s| E[s] * k[s][i]).sum::<f64>() * h;
            let scale = state[i].abs().max(out[i].abs()).max(1.0);
            error = error.max(delta.abs() / scale);
        }
        if !error.is_finite() {
            return Err(PropagationError::NonFinite);
        }
        Ok(error)
    }

    fn next_magnitude(&self, h: f64, error: f64) -> f64 {
        let factor = if error == 0.0 {
            5.0
        } else {
            (0.9 * (self.accuracy / error).powf(0.2)).clamp(0.2, 5.0)
        };
        (h.abs() * factor).clamp(self.min_step_s, self.max_step_s)
    }

    /// Accept or reject a trial at the minimum step size.
    fn at_minimum(&self, error: f64) -> Result<(), PropagationError> {
        if self.stop_if_accuracy_violated {
            return Err(PropagationError::AccuracyViolated {
                error,
                accuracy: self.accuracy,
                min_step_s: self.min_step_s,
            });
        }
        warn!(
            error,
            accuracy = self.accuracy,
            "accepting step at minimum size despite accuracy violation"
        );
        Ok(())
    }
}

impl Integrator for PrinceDormand45 {
    fn type_name(&self) -> &'static str {
        "PrinceDormand45"
    }

    fn step(
        &mut self,
        model: &dyn ForceModel,
        elapsed_s: f64,
        state: &mut [f64],
    ) -> Result<f64, PropagationError> {
        let mut trial = vec![0.0; state.len()];
        for _ in 0..self.max_attempts {
            let h = self.step_s;
            let error = self.attempt(model, elapsed_s, state, h, &mut trial)?;
            if error <= self.accuracy || h.abs() <= self.min_step_s {
                if error > self.accuracy {
                    self.at_minimum(error)?;
                }
                state.copy_from_slice(&trial);
                self.step_s = self.next_magnitude(h, error).copysign(h);
                return Ok(h);
            }
            self.step_s = self.next_magnitude(h, error).copysign(h);
        }
        Err(PropagationError::StepFailed {
            attempts: self.max_attempts,
            step_s: self.step_s,
        })
    }

    fn step_by(
        &mut self,
        model: &dyn ForceModel,
        elapsed_s: f64,
        state: &mut [f64],
        dt: f64,
    ) -> Result<(), PropagationError> {
        let saved = self.step_s;
        let mut working = self.step_s.abs().max(self.min_step_s);
        let mut done = 0.0;
        let mut trial = vec![0.0; state.len()];
        let mut attempts = 0;
        while done != dt {
            let remaining = dt - done;
            let last = working >= remaining.abs();
            let h = if last { remaining } else { working.copysign(dt) };
            let error = self.attempt(model, elapsed_s + done, state, h, &mut trial)?;
            attempts += 1;
            if error <= self.accuracy || h.abs() <= self.min_step_s {
                if error > self.accuracy {
                    self.at_minimum(error)?;
                }
                state.copy_from_slice(&trial);
                done = if last { dt } else { done + h };
                working = self.next_magnitude(h, error);
                attempts = 0;
                continue;
            }
            if attempts >= self.max_attempts {
                self.step_s = saved;
                return Err(PropagationError::StepFailed {
                    attempts,
                    step_s: h,
                });
            }
            working = self.next_magnitude(h, error).min(h.abs() * 0.5).max(self.min_step_s);
        }
        self.step_s = saved;
        Ok(())
    }

    fn step_size(&self) -> f64 {
        self.step_s
    }

    fn set_step_size(&mut self, step_s: f64) {
        self.step_s = step_s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PointMassForce;
    use mcs_core::constants::MU_EARTH;
    use mcs_objects::SolarSystem;
    use std::f64::consts::PI;

    fn circular() -> ([f64; 6], f64) {
        let r = 7_000.0;
        let v = (MU_EARTH / r).sqrt();
        let period = 2.0 * PI * (r * r * r / MU_EARTH).sqrt();
        ([r, 0.0, 0.0, 0.0, v, 0.0], period)
    }

    fn two_body() -> PointMassForce {
        PointMassForce::new(&SolarSystem::default(), "Earth", &[]).unwrap()
    }

    #[test]
    fn adaptive_integrator_closes_circular_orbit() {
        let (mut state, period) = circular();
        let mut integrator = PrinceDormand45::new(&PropagatorSettings::new("Prop"));
        let force = two_body();
        integrator.step_by(&force, 0.0, &mut state, period).unwrap();
        assert!((state[0] - 7_000.0).abs() < 1e-4, "x {}", state[0]);
        assert!(state[1].abs() < 1e-3, "y {}", state[1]);
    }

    #[test]
    fn step_by_leaves_working_step_untouched() {
        let (mut state, _) = circular();
        let mut integrator = PrinceDormand45::new(&PropagatorSettings::new("Prop"));
        let before = integrator.step_size();
        integrator
            .step_by(&two_body(), 0.0, &mut state, 17.25)
            .unwrap();
        assert_eq!(integrator.step_size(), before);
    }

    #[test]
    fn backward_rk4_retraces_forward_step() {
        let (start, _) = circular();
        let force = two_body();
        let mut integrator = RungeKutta4::new(10.0);
        let mut state = start;
        integrator.step_by(&force, 0.0, &mut state, 300.0).unwrap();
        integrator.set_direction(true);
        assert_eq!(integrator.step_size(), -10.0);
        integrator.step_by(&force, 300.0, &mut state, -300.0).unwrap();
        for i in 0..6 {
            assert!((state[i] - start[i]).abs() < 1e-5);
        }
    }

    #[test]
    fn unknown_integrator_is_rejected() {
        let mut settings = PropagatorSettings::new("Prop");
        settings.integrator = "Euler".into();
        assert!(create_integrator(&settings).is_none());
    }
}

//! Stopping conditions evaluated by `Propagate` after every step.

use std::collections::VecDeque;

use mcs_core::time::Epoch;
use mcs_core::units::wrap_degrees;
use mcs_objects::{Apsis, ObjectHandle, ObjectStore, SpacecraftParameter, format_real};

use crate::commands::rename_leading;
use crate::wrapper::is_number;
use crate::{ElementWrapper, StopConditionError};

/// Samples kept for bracketing and interpolating a crossing.
pub const RING_CAPACITY: usize = 8;

/// Window around the goal inside which a spacecraft that last stopped on a
/// condition is considered to still sit on it, as a multiple of the tolerance.
const SKIP_WINDOW: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopState {
    Uninitialized,
    Initialized,
    Armed,
    Triggered,
}

#[derive(Debug, Clone)]
pub struct StopCondition {
    name: Option<String>,
    parameter_desc: String,
    goal_desc: Option<String>,
    parameter: Option<ElementWrapper>,
    goal: Option<ElementWrapper>,
    kind: Option<SpacecraftParameter>,
    goal_value: f64,
    tolerance: f64,
    custom_tolerance: bool,
    direction: f64,
    spacecraft: Option<ObjectHandle>,
    base_epoch: Option<Epoch>,
    previous: Option<f64>,
    buffer: VecDeque<(f64, f64)>,
    skip: bool,
    state: StopState,
}

impl StopCondition {
    /// Named condition; its name is what gets recorded on the spacecraft when it fires.
    pub fn new(parameter: &str, goal: Option<&str>) -> Self {
        let mut condition = Self::anonymous(parameter, goal);
        condition.name = Some(format!("StopOn{parameter}"));
        condition
    }

    /// Ad hoc condition discarded after the propagation that created it.
    pub fn anonymous(parameter: &str, goal: Option<&str>) -> Self {
        Self {
            name: None,
            parameter_desc: parameter.trim().to_string(),
            goal_desc: goal.map(|g| g.trim().to_string()),
            parameter: None,
            goal: None,
            kind: None,
            goal_value: 0.0,
            tolerance: 1.0e-7,
            custom_tolerance: false,
            direction: 1.0,
            spacecraft: None,
            base_epoch: None,
            previous: None,
            buffer: VecDeque::with_capacity(RING_CAPACITY),
            skip: false,
            state: StopState::Uninitialized,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.is_none()
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.parameter_desc)
    }

    pub fn parameter_description(&self) -> &str {
        &self.parameter_desc
    }

    pub fn goal_description(&self) -> Option<&str> {
        self.goal_desc.as_deref()
    }

    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.tolerance = tolerance;
        self.custom_tolerance = true;
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn has_custom_tolerance(&self) -> bool {
        self.custom_tolerance
    }

    pub fn state(&self) -> StopState {
        self.state
    }

    pub fn goal(&self) -> f64 {
        self.goal_value
    }

    pub fn spacecraft(&self) -> Option<ObjectHandle> {
        self.spacecraft
    }

    /// Epoch elapsed-time parameters are measured from during the current run.
    pub fn base_epoch(&self) -> Option<Epoch> {
        self.base_epoch
    }

    pub fn is_time(&self) -> bool {
        self.kind.is_some_and(|k| k.is_time())
    }

    pub fn is_cyclic(&self) -> bool {
        self.kind.is_some_and(|k| k.is_cyclic())
    }

    /// Script names this condition needs wrappers for.
    pub fn wrapper_names(&self) -> Vec<String> {
        let mut names = vec![self.parameter_desc.clone()];
        if let Some(goal) = &self.goal_desc {
            names.push(goal.clone());
        }
        names
    }

    pub fn accepts(&self, name: &str) -> bool {
        self.parameter_desc == name || self.goal_desc.as_deref() == Some(name)
    }

    /// Bind a wrapper to every slot described by `name`; returns the replaced wrapper.
    pub fn set_wrapper(
        &mut self,
        wrapper: ElementWrapper,
        name: &str,
    ) -> Result<Option<ElementWrapper>, StopConditionError> {
        let mut previous = None;
        if self.parameter_desc == name {
            if wrapper.parameter().is_none() {
                return Err(StopConditionError::NotAParameter(name.to_string()));
            }
            previous = self.parameter.replace(wrapper.clone());
        }
        if self.goal_desc.as_deref() == Some(name) {
            if !wrapper.is_scalar() {
                return Err(StopConditionError::NonScalarGoal(name.to_string()));
            }
            previous = self.goal.replace(wrapper).or(previous);
        }
        Ok(previous)
    }

    pub fn clear_wrappers(&mut self) {
        self.parameter = None;
        self.goal = None;
        self.state = StopState::Uninitialized;
    }

    /// Resolve the parameter traits and owning spacecraft.
    pub fn initialize(
        &mut self,
        store: &ObjectStore,
        default_tolerance: f64,
    ) -> Result<(), StopConditionError> {
        let parameter = self
            .parameter
            .as_ref()
            .ok_or_else(|| StopConditionError::Uninitialized(self.label().to_string()))?;
        let kind = parameter
            .parameter()
            .ok_or_else(|| StopConditionError::NotAParameter(self.parameter_desc.clone()))?;
        if !matches!(kind, SpacecraftParameter::Apsis(_)) && self.goal_desc.is_none() {
            return Err(StopConditionError::Uninitialized(format!(
                "{} has no goal",
                self.parameter_desc
            )));
        }
        self.kind = Some(kind);
        self.spacecraft = parameter.owner();
        self.goal_value = self.evaluate_goal(store)?;
        if !self.custom_tolerance {
            self.tolerance = default_tolerance;
        }
        self.reset();
        self.state = StopState::Initialized;
        Ok(())
    }

    fn evaluate_goal(&self, store: &ObjectStore) -> Result<f64, StopConditionError> {
        match (&self.goal, &self.goal_desc) {
            (Some(goal), _) => Ok(goal.evaluate_real(store)?),
            (None, Some(desc)) if is_number(desc) => desc
                .parse()
                .map_err(|_| StopConditionError::NonScalarGoal(desc.clone())),
            (None, Some(desc)) => Err(StopConditionError::Uninitialized(desc.clone())),
            (None, None) => Ok(0.0),
        }
    }

    /// Prepare for a propagation starting now, in direction `direction` (±1).
    pub fn arm(&mut self, store: &ObjectStore, direction: f64) -> Result<(), StopConditionError> {
        if self.state == StopState::Uninitialized {
            return Err(StopConditionError::Uninitialized(self.label().to_string()));
        }
        let handle = self
            .spacecraft
            .ok_or_else(|| StopConditionError::Uninitialized(self.label().to_string()))?;
        let sc = store
            .spacecraft(handle)
            .map_err(|e| StopConditionError::Wrapper(e.into()))?;
        let (epoch, last_stop) = (sc.epoch, sc.last_stop_triggered.clone());

        self.direction = direction;
        self.base_epoch = Some(epoch);
        if let Some(parameter) = self.parameter.as_mut() {
            parameter.set_reference_epoch(epoch);
        }
        let mut goal = self.evaluate_goal(store)?;
        // Elapsed goals are magnitudes measured in the direction of travel.
        if self.kind.is_some_and(|k| k.is_elapsed()) {
            goal = direction * goal.abs();
        }
        self.goal_value = goal;

        let offset = self.offset(store)?;
        self.buffer.clear();
        self.previous = Some(offset);
        self.skip = match (&self.name, &last_stop) {
            (Some(name), Some(tag)) => name == tag && offset.abs() <= SKIP_WINDOW * self.tolerance,
            _ => false,
        };
        self.state = StopState::Armed;
        Ok(())
    }

    /// Signed distance from the goal; cyclic values are wrapped into goal ± 180.
    pub fn offset(&self, store: &ObjectStore) -> Result<f64, StopConditionError> {
        let parameter = self
            .parameter
            .as_ref()
            .ok_or_else(|| StopConditionError::Uninitialized(self.label().to_string()))?;
        let value = parameter.evaluate_real(store)?;
        Ok(if self.is_cyclic() {
            wrap_degrees(value, self.goal_value) - self.goal_value
        } else {
            value - self.goal_value
        })
    }

    /// Evaluate after a nominal step; true when the goal was crossed during it.
    pub fn check(&mut self, store: &ObjectStore) -> Result<bool, StopConditionError> {
        let offset = self.offset(store)?;
        let previous = self.previous.replace(offset);
        if std::mem::take(&mut self.skip) {
            return Ok(false);
        }
        let Some(previous) = previous else {
            return Ok(false);
        };
        let d = self.direction;
        let triggered = match self.kind {
            Some(k) if k.is_time() => d * offset >= 0.0,
            Some(SpacecraftParameter::Apsis(Apsis::Periapsis)) => d * previous < 0.0 && d * offset >= 0.0,
            Some(SpacecraftParameter::Apsis(Apsis::Apoapsis)) => d * previous > 0.0 && d * offset <= 0.0,
            _ => {
                crosses(previous, offset) && (!self.is_cyclic() || (offset - previous).abs() < 180.0)
            }
        };
        if triggered {
            self.state = StopState::Triggered;
        }
        Ok(triggered)
    }

    /// Offset recorded by the last [`Self::arm`] or [`Self::check`].
    pub fn last_offset(&self) -> Option<f64> {
        self.previous
    }

    /// Seconds from the current state to the goal of a time condition.
    pub fn time_to_goal(&self, store: &ObjectStore) -> Result<Option<f64>, StopConditionError> {
        let Some(rate) = self.kind.and_then(|k| k.time_rate()) else {
            return Ok(None);
        };
        Ok(Some(-self.offset(store)? / rate))
    }

    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
    }

    /// Record an `(elapsed, offset)` sample; returns whether the buffer brackets the goal.
    pub fn add_to_buffer(&mut self, elapsed_s: f64, offset: f64) -> bool {
        if self.buffer.len() == RING_CAPACITY {
            self.buffer.pop_front();
        }
        self.buffer.push_back((elapsed_s, offset));
        self.bracket_index().is_some()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    fn bracket_index(&self) -> Option<usize> {
        (1..self.buffer.len()).find(|&i| {
            let (a, b) = (self.buffer[i - 1].1, self.buffer[i].1);
            crosses(a, b) && (!self.is_cyclic() || (b - a).abs() < 180.0)
        })
    }

    /// Estimated elapsed time of the crossing inside the buffered samples.
    ///
    /// Uses inverse Lagrange interpolation over the samples around the bracket
    /// when they are monotonic, linear interpolation across the bracket otherwise.
    pub fn estimate_crossing(&self) -> Option<f64> {
        let i = self.bracket_index()?;
        let samples: Vec<(f64, f64)> = self.buffer.iter().copied().collect();
        let ((t0, f0), (t1, f1)) = (samples[i - 1], samples[i]);
        if f1 == 0.0 {
            return Some(t1);
        }
        let linear = t0 - f0 * (t1 - t0) / (f1 - f0);
        let lo = i.saturating_sub(2);
        let hi = (i + 1).min(samples.len() - 1);
        let window = &samples[lo..=hi];
        if window.len() >= 3 && monotonic(window) {
            let estimate = inverse_lagrange(window);
            if estimate.is_finite() && estimate >= t0.min(t1) && estimate <= t0.max(t1) {
                return Some(estimate);
            }
        }
        Some(linear)
    }

    /// Clear the scan state so the next run starts clean.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.previous = None;
        self.skip = false;
        if self.state != StopState::Uninitialized {
            self.state = StopState::Initialized;
        }
    }

    pub fn rename_object(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        if let Some(renamed) = rename_leading(&self.parameter_desc, old, new) {
            self.parameter_desc = renamed;
            if self.name.is_some() {
                self.name = Some(format!("StopOn{}", self.parameter_desc));
            }
            changed = true;
        }
        if let Some(goal) = &self.goal_desc {
            if let Some(renamed) = rename_leading(goal, old, new) {
                self.goal_desc = Some(renamed);
                changed = true;
            }
        }
        for wrapper in [self.parameter.as_mut(), self.goal.as_mut()].into_iter().flatten() {
            changed |= wrapper.rename_object(old, new);
        }
        changed
    }

    /// Script text of this condition inside a `{...}` clause.
    pub fn clause(&self) -> String {
        let mut text = match &self.goal_desc {
            Some(goal) => format!("{} = {}", self.parameter_desc, goal),
            None => self.parameter_desc.clone(),
        };
        if self.custom_tolerance {
            text.push_str(&format!(", StopTolerance = {}", format_real(self.tolerance)));
        }
        text
    }
}

fn crosses(a: f64, b: f64) -> bool {
    (a < 0.0 && b >= 0.0) || (a > 0.0 && b <= 0.0)
}

fn monotonic(samples: &[(f64, f64)]) -> bool {
    let rising = samples.windows(2).all(|w| w[1].1 > w[0].1);
    let falling = samples.windows(2).all(|w| w[1].1 < w[0].1);
    rising || falling
}

/// Interpolate time as a polynomial in offset and evaluate it at zero offset.
fn inverse_lagrange(samples: &[(f64, f64)]) -> f64 {
    let mut t = 0.0;
    for (i, (ti, fi)) in samples.iter().enumerate() {
        let mut weight = 1.0;
        for (j, (_, fj)) in samples.iter().enumerate() {
            if i != j {
                weight *= -fj / (fi - fj);
            }
        }
        t += ti * weight;
    }
    t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_offsets_interpolate_exactly() {
        let mut stop = StopCondition::new("Sat.X", Some("0"));
        assert!(!stop.add_to_buffer(0.0, -3.0));
        assert!(!stop.add_to_buffer(1.0, -1.0));
        assert!(stop.add_to_buffer(2.0, 1.0));
        let t = stop.estimate_crossing().unwrap();
        assert!((t - 1.5).abs() < 1e-12, "t {t}");
    }

    #[test]
    fn ring_buffer_keeps_the_latest_samples() {
        let mut stop = StopCondition::new("Sat.X", Some("0"));
        for i in 0..12 {
            stop.add_to_buffer(i as f64, -10.0 + i as f64 * 0.1);
        }
        assert_eq!(stop.buffer_len(), RING_CAPACITY);
        assert!(stop.estimate_crossing().is_none());
    }

    #[test]
    fn cyclic_wrap_jump_is_not_a_crossing() {
        let mut stop = StopCondition::new("Sat.TA", Some("180"));
        stop.kind = Some(SpacecraftParameter::TA);
        assert!(!stop.add_to_buffer(0.0, 179.5));
        assert!(!stop.add_to_buffer(1.0, -179.5));
    }

    #[test]
    fn quadratic_offsets_use_inverse_interpolation() {
        let mut stop = StopCondition::new("Sat.X", Some("0"));
        // f(t) = t^2 - 2 crosses at sqrt(2).
        for t in [0.5_f64, 1.0, 1.5, 2.0] {
            stop.add_to_buffer(t, t * t - 2.0);
        }
        let t = stop.estimate_crossing().unwrap();
        assert!((t - 2.0_f64.sqrt()).abs() < 1e-2, "t {t}");
    }

    #[test]
    fn renaming_rewrites_name_and_clause() {
        let mut stop = StopCondition::new("Sat.ElapsedSecs", Some("60"));
        stop.set_tolerance(1.0e-5);
        assert!(stop.rename_object("Sat", "Probe"));
        assert_eq!(stop.name(), Some("StopOnProbe.ElapsedSecs"));
        assert_eq!(stop.clause(), "Probe.ElapsedSecs = 60, StopTolerance = 1e-5");
    }
}

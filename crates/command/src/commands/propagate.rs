//! `Propagate`: advance spacecraft until a stopping condition is met.
//!
//! ```text
//! Propagate [Synchronized] [BackProp] Prop(Sat1, Sat2) [-]Prop2(Sat3) {Sat1.Periapsis} {Sat3.TA = 90, StopTolerance = 1e-5};
//! ```
//!
//! Each `Prop(...)` clause becomes one [`PropSetup`]. Stop clauses may also
//! appear inside a propagator's parentheses; they are generated after them.

use mcs_core::time::Epoch;
use mcs_objects::{MissionObject, ObjectError, ObjectHandle, format_real};
use mcs_propagation::{PropSetup, PropSnapshot};
use tracing::{debug, info, instrument, trace};

use crate::command::{CommandBase, ExecStatus, GmatCommand, InitContext, RunContext};
use crate::commands::{matching_close, parse_number, rename_leading, split_top_level};
use crate::publisher::StreamId;
use crate::stop::{StopCondition, StopState};
use crate::{CommandError, ElementWrapper};

/// Sub-steps of a quarter nominal step taken while bracketing a crossing.
const MAX_SUB_STEPS: usize = 8;

/// Bound on secant/bisection refinement iterations.
const MAX_REFINE_ITERATIONS: usize = 52;

/// Epochs closer than this are treated as equal when synchronizing.
const EPOCH_MATCH_S: f64 = 1.0e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropMode {
    /// Each propagator controls its own step.
    #[default]
    Independent,
    /// The first propagator picks the step; the rest follow it exactly.
    Synchronized,
}

#[derive(Debug, Clone, PartialEq)]
struct PropClause {
    propagator: String,
    spacecraft: Vec<String>,
    backward: bool,
}

/// Runtime state for one clause.
#[derive(Debug)]
struct Ensemble {
    setup: PropSetup,
    direction: f64,
    step_start: Option<PropSnapshot>,
    start_elapsed: f64,
}

#[derive(Debug)]
pub struct Propagate {
    base: CommandBase,
    mode: PropMode,
    back_prop: bool,
    clauses: Vec<PropClause>,
    stops: Vec<StopCondition>,
    /// Index of the ensemble propagating each stop's spacecraft.
    owners: Vec<usize>,
    ensembles: Vec<Ensemble>,
    stream: Option<StreamId>,
    in_progress: bool,
    steps_taken: usize,
}

impl Propagate {
    pub fn new() -> Self {
        Self {
            base: CommandBase::new("Propagate"),
            mode: PropMode::Independent,
            back_prop: false,
            clauses: Vec::new(),
            stops: Vec::new(),
            owners: Vec::new(),
            ensembles: Vec::new(),
            stream: None,
            in_progress: false,
            steps_taken: 0,
        }
    }

    pub fn mode(&self) -> PropMode {
        self.mode
    }

    pub fn stop_conditions(&self) -> &[StopCondition] {
        &self.stops
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress
    }

    /// Add an ad hoc stop used for the next run only, e.g. `propagate_for("Sat.ElapsedSecs", "60")`.
    ///
    /// Must be called before the command is initialized so its wrappers get bound.
    pub fn propagate_for(&mut self, parameter: &str, goal: Option<&str>) {
        self.stops.push(StopCondition::anonymous(parameter, goal));
    }

    fn parse_clause(&mut self, item: &str) -> Result<PropClause, CommandError> {
        let (backward, item) = match item.strip_prefix('-') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, item),
        };
        let open = item
            .find('(')
            .ok_or_else(|| CommandError::parse("Propagate", format!("expected `Propagator(...)`, found `{item}`")))?;
        let close = matching_close(item, open)
            .filter(|close| *close == item.len() - 1)
            .ok_or_else(|| CommandError::parse("Propagate", format!("unbalanced parentheses in `{item}`")))?;
        let propagator = item[..open].trim();
        if propagator.is_empty() {
            return Err(CommandError::parse("Propagate", "missing propagator name"));
        }
        let mut spacecraft = Vec::new();
        for part in split_top_level(&item[open + 1..close], ',') {
            if part.starts_with('{') {
                self.parse_stop_clause(part)?;
            } else if !part.is_empty() {
                spacecraft.push(part.to_string());
            }
        }
        if spacecraft.is_empty() {
            return Err(CommandError::parse(
                "Propagate",
                format!("propagator `{propagator}` has no spacecraft"),
            ));
        }
        Ok(PropClause {
            propagator: propagator.to_string(),
            spacecraft,
            backward,
        })
    }

    fn parse_stop_clause(&mut self, text: &str) -> Result<(), CommandError> {
        let inner = text
            .strip_prefix('{')
            .and_then(|t| t.strip_suffix('}'))
            .ok_or_else(|| CommandError::parse("Propagate", format!("malformed stop clause `{text}`")))?;
        let mut tolerance = None;
        let mut added = Vec::new();
        for part in split_top_level(inner, ',') {
            if part.is_empty() {
                continue;
            }
            match part.split_once('=').map(|(k, v)| (k.trim(), v.trim())) {
                Some(("StopTolerance", value)) => {
                    let value = parse_number("Propagate", "StopTolerance", value)?;
                    if value <= 0.0 {
                        return Err(CommandError::parse("Propagate", "StopTolerance must be positive"));
                    }
                    tolerance = Some(value);
                }
                Some((parameter, goal)) if !parameter.is_empty() && !goal.is_empty() => {
                    added.push(StopCondition::new(parameter, Some(goal)));
                }
                Some(_) => {
                    return Err(CommandError::parse("Propagate", format!("malformed stop condition `{part}`")));
                }
                None => added.push(StopCondition::new(part, None)),
            }
        }
        if added.is_empty() {
            return Err(CommandError::parse("Propagate", format!("stop clause `{text}` names no condition")));
        }
        for mut stop in added {
            if let Some(tolerance) = tolerance {
                stop.set_tolerance(tolerance);
            }
            self.stops.push(stop);
        }
        Ok(())
    }

    fn check_synchronized(&self) -> Result<(), CommandError> {
        if self.mode != PropMode::Synchronized {
            return Ok(());
        }
        let Some(first) = self.ensembles.first() else {
            return Ok(());
        };
        let epoch = first.setup.epoch();
        for ensemble in &self.ensembles[1..] {
            let gap = ensemble.setup.epoch().seconds_since(&epoch);
            if gap.abs() > EPOCH_MATCH_S {
                return Err(CommandError::Consistency(format!(
                    "synchronized propagators start at different epochs: `{}` at {} and `{}` at {}",
                    first.setup.name(),
                    epoch,
                    ensemble.setup.name(),
                    ensemble.setup.epoch()
                )));
            }
            if ensemble.direction != first.direction {
                return Err(CommandError::Consistency(format!(
                    "synchronized propagators `{}` and `{}` run in opposite directions",
                    first.setup.name(),
                    ensemble.setup.name()
                )));
            }
        }
        Ok(())
    }

    /// Reload every setup from the store and arm the stops for a new run.
    fn prepare(&mut self, ctx: &mut RunContext<'_>) -> Result<(), CommandError> {
        if self.ensembles.is_empty() {
            return Err(CommandError::Consistency(
                "Propagate executed before it was initialized".into(),
            ));
        }
        for ensemble in &mut self.ensembles {
            ensemble.setup.reload(ctx.store)?;
            ensemble.step_start = None;
        }
        self.check_synchronized()?;
        for (stop, owner) in self.stops.iter_mut().zip(&self.owners) {
            stop.arm(ctx.store, self.ensembles[*owner].direction)?;
        }
        self.steps_taken = 0;
        self.in_progress = true;
        self.publish_sample(ctx, false)?;
        debug!(
            propagators = self.ensembles.len(),
            stops = self.stops.len(),
            "propagation armed"
        );
        Ok(())
    }

    fn step_all(&mut self) -> Result<(), CommandError> {
        for ensemble in &mut self.ensembles {
            ensemble.step_start = Some(ensemble.setup.snapshot());
            ensemble.start_elapsed = ensemble.setup.elapsed_s();
        }
        match self.mode {
            PropMode::Independent => {
                for ensemble in &mut self.ensembles {
                    ensemble.setup.step()?;
                }
            }
            PropMode::Synchronized => {
                let Some((first, rest)) = self.ensembles.split_first_mut() else {
                    return Ok(());
                };
                let dt = first.setup.step()?;
                for ensemble in rest {
                    ensemble.setup.step_by(dt)?;
                }
            }
        }
        Ok(())
    }

    fn publish_states(&self, ctx: &mut RunContext<'_>) -> Result<(), CommandError> {
        for ensemble in &self.ensembles {
            ensemble.setup.publish(ctx.store)?;
        }
        Ok(())
    }

    fn publish_sample(&self, ctx: &mut RunContext<'_>, is_final: bool) -> Result<(), CommandError> {
        let Some(stream) = self.stream else {
            return Ok(());
        };
        let mut values = Vec::new();
        for ensemble in &self.ensembles {
            for handle in ensemble.setup.spacecraft() {
                let sc = ctx.store.spacecraft(*handle)?;
                values.push(sc.epoch.mjd());
                values.extend_from_slice(&sc.state);
            }
        }
        let epoch_mjd = self
            .ensembles
            .first()
            .map(|e| e.setup.epoch().mjd())
            .unwrap_or_default();
        ctx.publisher.publish(stream, epoch_mjd, &values, is_final)?;
        Ok(())
    }

    /// Rewind every ensemble to the start of the last step and publish it.
    fn rewind(&mut self, ctx: &mut RunContext<'_>) -> Result<(), CommandError> {
        for ensemble in &mut self.ensembles {
            if let Some(snapshot) = &ensemble.step_start {
                ensemble.setup.restore(snapshot);
            }
        }
        self.publish_states(ctx)
    }

    /// Rewind, then move every ensemble to `dt` seconds past the winner's step start.
    fn advance_to(&mut self, ctx: &mut RunContext<'_>, shifts: &[f64], dt: f64) -> Result<(), CommandError> {
        self.rewind(ctx)?;
        for (ensemble, shift) in self.ensembles.iter_mut().zip(shifts) {
            let step = dt + shift;
            if step != 0.0 {
                ensemble.setup.step_by(step)?;
            }
        }
        self.publish_states(ctx)
    }

    /// Seconds from the start of the step to the crossing of stop `index`.
    ///
    /// `h` is the width of the step that triggered; the ensembles must already
    /// sit at its start.
    fn time_to_stop(
        &mut self,
        ctx: &mut RunContext<'_>,
        index: usize,
        h: f64,
    ) -> Result<Option<f64>, CommandError> {
        let owner = self.owners[index];
        let stop = &mut self.stops[index];
        if stop.is_time() {
            return Ok(stop.time_to_goal(ctx.store)?);
        }
        let ensemble = &mut self.ensembles[owner];
        let Some(start) = ensemble.step_start.clone() else {
            return Ok(None);
        };
        ensemble.setup.restore(&start);
        ensemble.setup.publish(ctx.store)?;
        stop.clear_buffer();
        let mut bracketed = stop.add_to_buffer(0.0, stop.offset(ctx.store)?);
        let mut taken = 0;
        while !bracketed && taken < MAX_SUB_STEPS {
            ensemble.setup.step_by(0.25 * h)?;
            ensemble.setup.publish(ctx.store)?;
            taken += 1;
            bracketed = stop.add_to_buffer(0.25 * h * taken as f64, stop.offset(ctx.store)?);
        }
        ensemble.setup.restore(&start);
        ensemble.setup.publish(ctx.store)?;
        trace!(stop = stop.parameter_description(), taken, bracketed, "bracketing");
        Ok(stop.estimate_crossing())
    }

    /// Land every ensemble on the earliest triggered crossing.
    #[instrument(level = "debug", skip_all)]
    fn finalize(&mut self, ctx: &mut RunContext<'_>) -> Result<(), CommandError> {
        let ends: Vec<f64> = self
            .ensembles
            .iter()
            .map(|e| e.setup.elapsed_s() - e.start_elapsed)
            .collect();
        let end_offsets: Vec<Option<f64>> = self.stops.iter().map(|s| s.last_offset()).collect();
        self.rewind(ctx)?;
        let start_offsets = self
            .stops
            .iter()
            .map(|s| s.offset(ctx.store))
            .collect::<Result<Vec<f64>, _>>()?;

        let mut winner: Option<(usize, f64)> = None;
        for index in 0..self.stops.len() {
            if self.stops[index].state() != StopState::Triggered {
                continue;
            }
            let h = ends[self.owners[index]];
            let Some(dt) = self.time_to_stop(ctx, index, h)? else {
                ctx.warn(format!(
                    "could not bracket stop condition `{}`; using the full step",
                    self.stops[index].parameter_description()
                ));
                let owner = self.owners[index];
                winner = winner.or(Some((index, ends[owner])));
                continue;
            };
            if winner.is_none_or(|(_, best)| dt.abs() < best.abs()) {
                winner = Some((index, dt));
            }
        }
        let Some((index, mut dt)) = winner else {
            return Err(CommandError::Consistency(
                "a stop condition triggered but none could be located".into(),
            ));
        };
        let owner = self.owners[index];
        let base: Epoch = self.ensembles[owner].setup.epoch();
        let shifts: Vec<f64> = self
            .ensembles
            .iter()
            .map(|e| base.seconds_since(&e.setup.epoch()))
            .collect();

        if let Some(granularity) = ctx.settings.time_granularity_s.filter(|g| *g > 0.0) {
            let rounded = (dt / granularity).round() * granularity;
            info!(dt, rounded, granularity, "final step rounded to the time granularity");
            dt = rounded;
            self.advance_to(ctx, &shifts, dt)?;
            let stop = &self.stops[index];
            let miss = stop.offset(ctx.store)?.abs();
            if miss > stop.tolerance() {
                ctx.warn(format!(
                    "stop `{}` missed its tolerance {:e} by {miss:e} after rounding to the {granularity} s granularity",
                    stop.parameter_description(),
                    stop.tolerance()
                ));
            }
        } else {
            self.advance_to(ctx, &shifts, dt)?;
            dt = self.refine(
                ctx,
                index,
                &shifts,
                dt,
                (0.0, start_offsets[index]),
                (ends[owner], end_offsets[index]),
            )?;
        }

        self.publish_sample(ctx, true)?;
        let stop = &self.stops[index];
        debug!(
            stop = stop.parameter_description(),
            dt,
            epoch = %self.ensembles[owner].setup.epoch(),
            "stopped"
        );
        let tag = stop.name().map(str::to_string);
        let handles: Vec<ObjectHandle> = self
            .ensembles
            .iter()
            .flat_map(|e| e.setup.spacecraft().to_vec())
            .collect();
        for handle in handles {
            ctx.store.spacecraft_mut(handle)?.last_stop_triggered = tag.clone();
        }
        self.finish_run();
        Ok(())
    }

    /// Secant refinement inside the step, falling back to bisection.
    fn refine(
        &mut self,
        ctx: &mut RunContext<'_>,
        index: usize,
        shifts: &[f64],
        mut t: f64,
        (mut a, mut fa): (f64, f64),
        (mut b, fb): (f64, Option<f64>),
    ) -> Result<f64, CommandError> {
        let tolerance = self.stops[index].tolerance();
        let mut ft = self.stops[index].offset(ctx.store)?;
        if ft.abs() <= tolerance || self.stops[index].is_time() {
            return Ok(t);
        }
        let Some(mut fb) = fb else {
            ctx.warn(format!(
                "stop `{}` missed its tolerance by {:e}",
                self.stops[index].parameter_description(),
                ft.abs()
            ));
            return Ok(t);
        };
        for iteration in 0..MAX_REFINE_ITERATIONS {
            if fa.signum() != ft.signum() {
                b = t;
                fb = ft;
            } else {
                a = t;
                fa = ft;
            }
            let secant = a - fa * (b - a) / (fb - fa);
            let (lo, hi) = (a.min(b), a.max(b));
            let next = if secant.is_finite() && secant > lo && secant < hi {
                secant
            } else {
                0.5 * (a + b)
            };
            if (next - t).abs() <= f64::EPSILON * t.abs().max(1.0) {
                ctx.warn(format!(
                    "stop `{}` refinement stagnated after {iteration} iterations; offset {:e} exceeds tolerance {:e}",
                    self.stops[index].parameter_description(),
                    ft.abs(),
                    tolerance
                ));
                return Ok(t);
            }
            t = next;
            self.advance_to(ctx, shifts, t)?;
            ft = self.stops[index].offset(ctx.store)?;
            trace!(iteration, t, offset = ft, "refining stop");
            if ft.abs() <= tolerance {
                return Ok(t);
            }
        }
        ctx.warn(format!(
            "stop `{}` missed its tolerance {:e} after {MAX_REFINE_ITERATIONS} refinements (offset {:e})",
            self.stops[index].parameter_description(),
            tolerance,
            ft.abs()
        ));
        Ok(t)
    }

    fn finish_run(&mut self) {
        self.in_progress = false;
        for stop in &mut self.stops {
            stop.reset();
        }
        for ensemble in &mut self.ensembles {
            ensemble.step_start = None;
        }
        if self.stops.iter().any(StopCondition::is_anonymous) {
            let (stops, owners): (Vec<_>, Vec<_>) = std::mem::take(&mut self.stops)
                .into_iter()
                .zip(std::mem::take(&mut self.owners))
                .filter(|(stop, _)| !stop.is_anonymous())
                .unzip();
            self.stops = stops;
            self.owners = owners;
        }
    }
}

impl Default for Propagate {
    fn default() -> Self {
        Self::new()
    }
}

/// Top-level items of a Propagate line: words, `name(...)` calls, and `{...}` groups.
fn split_items(text: &str) -> Result<Vec<&str>, CommandError> {
    let mut items = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() || bytes[i] == b',' {
            i += 1;
            continue;
        }
        let start = i;
        if bytes[i] == b'{' {
            let close = matching_close(text, i)
                .ok_or_else(|| CommandError::parse("Propagate", "unbalanced braces"))?;
            items.push(&text[start..=close]);
            i = close + 1;
            continue;
        }
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'(' && bytes[i] != b'{' {
            i += 1;
        }
        let mut j = i;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if j < bytes.len() && bytes[j] == b'(' {
            let close = matching_close(text, j)
                .ok_or_else(|| CommandError::parse("Propagate", "unbalanced parentheses"))?;
            items.push(&text[start..=close]);
            i = close + 1;
        } else {
            items.push(&text[start..i]);
        }
    }
    Ok(items)
}

impl GmatCommand for Propagate {
    fn base(&self) -> &CommandBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CommandBase {
        &mut self.base
    }

    fn interpret_action(&mut self, line: &str) -> Result<(), CommandError> {
        let rest = self.base.split_line(line)?;
        self.mode = PropMode::Independent;
        self.back_prop = false;
        self.clauses.clear();
        self.stops.clear();
        self.owners.clear();
        self.ensembles.clear();
        for item in split_items(rest)? {
            match item {
                "Synchronized" => self.mode = PropMode::Synchronized,
                "BackProp" => self.back_prop = true,
                _ if item.starts_with('{') => self.parse_stop_clause(item)?,
                _ if item.ends_with(')') => {
                    let clause = self.parse_clause(item)?;
                    self.clauses.push(clause);
                }
                other => {
                    return Err(CommandError::parse("Propagate", format!("unexpected `{other}`")));
                }
            }
        }
        if self.clauses.is_empty() {
            return Err(CommandError::parse("Propagate", "no propagator clause"));
        }
        let mut seen: Vec<&str> = Vec::new();
        for name in self.clauses.iter().flat_map(|c| c.spacecraft.iter()) {
            if seen.contains(&name.as_str()) {
                return Err(CommandError::Consistency(format!(
                    "spacecraft `{name}` appears in more than one propagator clause"
                )));
            }
            seen.push(name);
        }
        Ok(())
    }

    fn action_text(&self) -> String {
        let mut parts = Vec::new();
        if self.mode == PropMode::Synchronized {
            parts.push("Synchronized".to_string());
        }
        if self.back_prop {
            parts.push("BackProp".to_string());
        }
        for clause in &self.clauses {
            parts.push(format!(
                "{}{}({})",
                if clause.backward { "-" } else { "" },
                clause.propagator,
                clause.spacecraft.join(", ")
            ));
        }
        for stop in self.stops.iter().filter(|s| !s.is_anonymous()) {
            parts.push(format!("{{{}}}", stop.clause()));
        }
        parts.join(" ")
    }

    fn wrapper_object_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in self.stops.iter().flat_map(StopCondition::wrapper_names) {
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
        for stop in self.stops.iter_mut().filter(|s| s.accepts(name)) {
            previous = stop.set_wrapper(wrapper.clone(), name)?.or(previous);
            matched = true;
        }
        if matched {
            Ok(previous)
        } else {
            Err(CommandError::NoSuchSlot {
                command: "Propagate".into(),
                name: name.to_string(),
            })
        }
    }

    fn clear_wrappers(&mut self) {
        for stop in &mut self.stops {
            stop.clear_wrappers();
        }
    }

    #[instrument(level = "debug", skip_all, fields(command = %self.action_text()))]
    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), CommandError> {
        self.ensembles.clear();
        self.owners.clear();
        self.in_progress = false;
        let global_sign = if self.back_prop { -1.0 } else { 1.0 };
        let mut owners = Vec::new();
        let mut labels = Vec::new();
        for clause in &self.clauses {
            let settings = match ctx.store.by_name(&clause.propagator) {
                Some(MissionObject::Propagator(settings)) => settings.clone(),
                Some(other) => {
                    return Err(ObjectError::WrongKind {
                        name: clause.propagator.clone(),
                        expected: "Propagator",
                        found: other.type_name(),
                    }
                    .into());
                }
                None => return Err(ObjectError::NotFound(clause.propagator.clone()).into()),
            };
            let mut setup = PropSetup::new(&settings, ctx.store.solar_system())?;
            let handles = clause
                .spacecraft
                .iter()
                .map(|name| {
                    let handle = ctx.store.require(name)?;
                    ctx.store.spacecraft(handle)?;
                    Ok(handle)
                })
                .collect::<Result<Vec<_>, ObjectError>>()?;
            setup.bind(ctx.store, &handles)?;
            let direction = global_sign * if clause.backward { -1.0 } else { 1.0 };
            setup.set_direction(direction < 0.0);
            for handle in &handles {
                let sc = ctx.store.spacecraft(*handle)?;
                owners.push(sc.name.clone());
                labels.push(format!("{}.A1ModJulian", sc.name));
                labels.extend(sc.state_labels());
            }
            self.ensembles.push(Ensemble {
                setup,
                direction,
                step_start: None,
                start_elapsed: 0.0,
            });
        }
        self.check_synchronized()?;

        for stop in &mut self.stops {
            stop.initialize(ctx.store, ctx.settings.stop_tolerance)?;
            let owner = stop
                .spacecraft()
                .and_then(|h| self.ensembles.iter().position(|e| e.setup.spacecraft().contains(&h)))
                .ok_or_else(|| {
                    CommandError::Consistency(format!(
                        "stop condition `{}` is on a spacecraft this command does not propagate",
                        stop.parameter_description()
                    ))
                })?;
            self.owners.push(owner);
        }
        self.stream = Some(ctx.publisher.register_published_data(owners, labels));
        Ok(())
    }

    fn execute(&mut self, ctx: &mut RunContext<'_>) -> Result<ExecStatus, CommandError> {
        if !self.in_progress {
            self.prepare(ctx)?;
        }
        let check_every = ctx.settings.interrupt_check_frequency;
        loop {
            self.step_all()?;
            self.publish_states(ctx)?;
            self.steps_taken += 1;
            if self.stops.is_empty() {
                self.publish_sample(ctx, true)?;
                self.finish_run();
                return Ok(ExecStatus::Done);
            }
            let mut triggered = false;
            for stop in &mut self.stops {
                triggered |= stop.check(ctx.store)?;
            }
            if triggered {
                self.finalize(ctx)?;
                return Ok(ExecStatus::Done);
            }
            self.publish_sample(ctx, false)?;
            if check_every > 0 && self.steps_taken % check_every == 0 {
                return Ok(ExecStatus::Yield);
            }
        }
    }

    fn run_complete(&mut self) {
        self.finish_run();
    }

    fn reset_loop_data(&mut self) {
        self.finish_run();
    }

    fn rename_ref_object(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        for clause in &mut self.clauses {
            if clause.propagator == old {
                clause.propagator = new.to_string();
                changed = true;
            }
            for name in &mut clause.spacecraft {
                if let Some(renamed) = rename_leading(name, old, new) {
                    *name = renamed;
                    changed = true;
                }
            }
        }
        for stop in &mut self.stops {
            changed |= stop.rename_object(old, new);
        }
        changed
    }

    fn build_command_summary(&self, store: &mcs_objects::ObjectStore) -> String {
        let mut out = format!("Propagate command {}\n", self.action_text());
        for ensemble in &self.ensembles {
            out.push_str(&format!(
                "  {} ({}) elapsed {} s\n",
                ensemble.setup.name(),
                ensemble.setup.integrator_type(),
                format_real(ensemble.setup.elapsed_s())
            ));
            for handle in ensemble.setup.spacecraft() {
                match store.spacecraft(*handle) {
                    Ok(sc) => out.push_str(&format!(
                        "    {} at {}: r = [{:.6}, {:.6}, {:.6}] km\n",
                        sc.name, sc.epoch, sc.state[0], sc.state[1], sc.state[2]
                    )),
                    Err(err) => out.push_str(&format!("    <unavailable: {err}>\n")),
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(line: &str) -> Propagate {
        let mut command = Propagate::new();
        command.interpret_action(line).unwrap();
        command
    }

    #[test]
    fn stop_clauses_inside_parentheses_are_generated_after() {
        let command = parsed("Propagate Prop(Sat, {Sat.ElapsedSecs = 60});");
        assert_eq!(command.action_text(), "Prop(Sat) {Sat.ElapsedSecs = 60}");
        assert_eq!(command.stop_conditions().len(), 1);
    }

    #[test]
    fn modes_and_directions_round_trip() {
        let line = "Propagate Synchronized BackProp Prop(A, B) -Prop2(C) {A.Periapsis} {C.TA = 90, StopTolerance = 1e-5};";
        let command = parsed(line);
        assert_eq!(command.mode(), PropMode::Synchronized);
        let text = command.generating_string(crate::command::GenMode::NoComments, "", true);
        assert_eq!(text, line);
    }

    #[test]
    fn duplicate_spacecraft_across_clauses_is_rejected() {
        let mut command = Propagate::new();
        let err = command
            .interpret_action("Propagate Prop(Sat) Prop2(Sat) {Sat.ElapsedSecs = 1};")
            .unwrap_err();
        assert!(matches!(err, CommandError::Consistency(_)), "{err}");
    }

    #[test]
    fn anonymous_stops_are_not_generated() {
        let mut command = parsed("Propagate Prop(Sat);");
        command.propagate_for("Sat.ElapsedSecs", Some("60"));
        assert_eq!(command.action_text(), "Prop(Sat)");
        assert_eq!(command.wrapper_object_names(), vec!["Sat.ElapsedSecs", "60"]);
    }
}

//! Mission object variants and their script-visible properties.

use mcs_config::{
    ArrayConfig, CoordinateSystemConfig, ExitMode, MissionFile, PropagatorConfig, SolverConfig,
    StringConfig, VariableConfig,
};

use crate::{ObjectError, PropertyValue, Spacecraft};

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: f64,
    pub global: bool,
}

impl Variable {
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            global: false,
        }
    }
}

/// Row-major real matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    pub name: String,
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
    pub global: bool,
}

impl Array {
    pub fn new(name: &str, rows: usize, cols: usize) -> Self {
        Self {
            name: name.to_string(),
            rows,
            cols,
            data: vec![0.0; rows * cols],
            global: false,
        }
    }

    /// Element at zero-based `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Result<f64, ObjectError> {
        self.offset(row, col).map(|i| self.data[i])
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<(), ObjectError> {
        let i = self.offset(row, col)?;
        self.data[i] = value;
        Ok(())
    }

    fn offset(&self, row: usize, col: usize) -> Result<usize, ObjectError> {
        if row >= self.rows || col >= self.cols {
            return Err(ObjectError::IndexOutOfRange {
                name: self.name.clone(),
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(row * self.cols + col)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringObject {
    pub name: String,
    pub value: String,
    pub global: bool,
}

/// Integrator and force-model settings that a `Propagate` command clones into a PropSetup.
#[derive(Debug, Clone, PartialEq)]
pub struct PropagatorSettings {
    pub name: String,
    pub integrator: String,
    pub initial_step_s: f64,
    pub accuracy: f64,
    pub min_step_s: f64,
    pub max_step_s: f64,
    pub max_step_attempts: u32,
    pub stop_if_accuracy_violated: bool,
    pub central_body: String,
    pub point_masses: Vec<String>,
    pub global: bool,
}

impl PropagatorSettings {
    pub fn new(name: &str) -> Self {
        Self::from_config(&PropagatorConfig {
            name: name.to_string(),
            ..default_propagator_config()
        })
    }

    pub fn from_config(cfg: &PropagatorConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            integrator: cfg.integrator.clone(),
            initial_step_s: cfg.initial_step_s,
            accuracy: cfg.accuracy,
            min_step_s: cfg.min_step_s,
            max_step_s: cfg.max_step_s,
            max_step_attempts: cfg.max_step_attempts,
            stop_if_accuracy_violated: true,
            central_body: cfg.central_body.clone(),
            point_masses: cfg.point_masses.clone(),
            global: cfg.global,
        }
    }
}

fn default_propagator_config() -> PropagatorConfig {
    PropagatorConfig {
        name: String::new(),
        integrator: "PrinceDormand45".into(),
        initial_step_s: 60.0,
        accuracy: 1.0e-11,
        min_step_s: 1.0e-3,
        max_step_s: 2_700.0,
        max_step_attempts: 50,
        central_body: "Earth".into(),
        point_masses: Vec::new(),
        global: false,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverSettings {
    pub name: String,
    pub kind: String,
    pub max_iterations: u32,
    pub exit_mode: ExitMode,
    pub show_progress: bool,
    pub global: bool,
}

impl SolverSettings {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: "DifferentialCorrector".into(),
            max_iterations: 25,
            exit_mode: ExitMode::DiscardAndContinue,
            show_progress: true,
            global: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateSystem {
    pub name: String,
    pub origin: String,
    pub axes: String,
}

impl CoordinateSystem {
    /// The internal Earth-centered frame every run requires.
    pub fn earth_mj2000_eq() -> Self {
        Self {
            name: "EarthMJ2000Eq".into(),
            origin: "Earth".into(),
            axes: "MJ2000Eq".into(),
        }
    }
}

impl From<&CoordinateSystemConfig> for CoordinateSystem {
    fn from(cfg: &CoordinateSystemConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            origin: cfg.origin.clone(),
            axes: cfg.axes.clone(),
        }
    }
}

/// Every configurable object the sandbox can own.
#[derive(Debug, Clone, PartialEq)]
pub enum MissionObject {
    Spacecraft(Spacecraft),
    Variable(Variable),
    Array(Array),
    String(StringObject),
    Propagator(PropagatorSettings),
    Solver(SolverSettings),
    CoordinateSystem(CoordinateSystem),
}

impl MissionObject {
    pub fn name(&self) -> &str {
        match self {
            Self::Spacecraft(o) => &o.name,
            Self::Variable(o) => &o.name,
            Self::Array(o) => &o.name,
            Self::String(o) => &o.name,
            Self::Propagator(o) => &o.name,
            Self::Solver(o) => &o.name,
            Self::CoordinateSystem(o) => &o.name,
        }
    }

    pub fn set_name(&mut self, name: &str) {
        let slot = match self {
            Self::Spacecraft(o) => &mut o.name,
            Self::Variable(o) => &mut o.name,
            Self::Array(o) => &mut o.name,
            Self::String(o) => &mut o.name,
            Self::Propagator(o) => &mut o.name,
            Self::Solver(o) => &mut o.name,
            Self::CoordinateSystem(o) => &mut o.name,
        };
        *slot = name.to_string();
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Spacecraft(_) => "Spacecraft",
            Self::Variable(_) => "Variable",
            Self::Array(_) => "Array",
            Self::String(_) => "String",
            Self::Propagator(_) => "Propagator",
            Self::Solver(_) => "DifferentialCorrector",
            Self::CoordinateSystem(_) => "CoordinateSystem",
        }
    }

    pub fn is_global(&self) -> bool {
        match self {
            Self::Spacecraft(o) => o.global,
            Self::Variable(o) => o.global,
            Self::Array(o) => o.global,
            Self::String(o) => o.global,
            Self::Propagator(o) => o.global,
            Self::Solver(o) => o.global,
            Self::CoordinateSystem(_) => false,
        }
    }

    pub fn set_global(&mut self, global: bool) {
        match self {
            Self::Spacecraft(o) => o.global = global,
            Self::Variable(o) => o.global = global,
            Self::Array(o) => o.global = global,
            Self::String(o) => o.global = global,
            Self::Propagator(o) => o.global = global,
            Self::Solver(o) => o.global = global,
            Self::CoordinateSystem(_) => {}
        }
    }

    pub fn as_spacecraft(&self) -> Option<&Spacecraft> {
        match self {
            Self::Spacecraft(sc) => Some(sc),
            _ => None,
        }
    }

    pub fn as_spacecraft_mut(&mut self) -> Option<&mut Spacecraft> {
        match self {
            Self::Spacecraft(sc) => Some(sc),
            _ => None,
        }
    }

    /// Read a script-visible property.
    pub fn property(&self, property: &str) -> Result<PropertyValue, ObjectError> {
        match self {
            Self::Spacecraft(sc) => sc.property(property),
            Self::Variable(v) if property == "Value" => Ok(PropertyValue::Real(v.value)),
            Self::String(s) if property == "Value" => Ok(PropertyValue::Text(s.value.clone())),
            Self::Array(a) => match property {
                "NumRows" => Ok(PropertyValue::Integer(a.rows as i64)),
                "NumCols" => Ok(PropertyValue::Integer(a.cols as i64)),
                _ => Err(self.unknown(property)),
            },
            Self::Propagator(p) => match property {
                "Type" => Ok(PropertyValue::Text(p.integrator.clone())),
                "InitialStepSize" => Ok(PropertyValue::Real(p.initial_step_s)),
                "Accuracy" => Ok(PropertyValue::Real(p.accuracy)),
                "MinStep" => Ok(PropertyValue::Real(p.min_step_s)),
                "MaxStep" => Ok(PropertyValue::Real(p.max_step_s)),
                "MaxStepAttempts" => Ok(PropertyValue::Integer(p.max_step_attempts as i64)),
                "StopIfAccuracyIsViolated" => Ok(PropertyValue::OnOff(p.stop_if_accuracy_violated)),
                "CentralBody" => Ok(PropertyValue::Text(p.central_body.clone())),
                _ => Err(self.unknown(property)),
            },
            Self::Solver(s) => match property {
                "MaxIterations" => Ok(PropertyValue::Integer(s.max_iterations as i64)),
                "ExitMode" => Ok(PropertyValue::Text(exit_mode_name(s.exit_mode).into())),
                "ShowProgress" => Ok(PropertyValue::Boolean(s.show_progress)),
                _ => Err(self.unknown(property)),
            },
            Self::CoordinateSystem(cs) => match property {
                "Origin" => Ok(PropertyValue::Text(cs.origin.clone())),
                "Axes" => Ok(PropertyValue::Text(cs.axes.clone())),
                _ => Err(self.unknown(property)),
            },
            _ => Err(self.unknown(property)),
        }
    }

    /// Write a script-visible property. Integers widen to reals; nothing else coerces.
    pub fn set_property(&mut self, property: &str, value: PropertyValue) -> Result<(), ObjectError> {
        let name = self.name().to_string();
        let expect_real = |value: &PropertyValue| {
            value.as_real().ok_or_else(|| mismatch(&name, property, "Real", value))
        };
        match self {
            Self::Spacecraft(sc) => sc.set_property(property, value),
            Self::Variable(v) if property == "Value" => {
                v.value = expect_real(&value)?;
                Ok(())
            }
            Self::String(s) if property == "Value" => match value {
                PropertyValue::Text(text) => {
                    s.value = text;
                    Ok(())
                }
                other => Err(mismatch(&name, property, "String", &other)),
            },
            Self::Propagator(p) => match property {
                "InitialStepSize" => {
                    let step = expect_real(&value)?;
                    if step == 0.0 {
                        return Err(ObjectError::InvalidValue {
                            object: name,
                            property: property.into(),
                            reason: "step size cannot be zero".into(),
                        });
                    }
                    p.initial_step_s = step;
                    Ok(())
                }
                "Accuracy" => positive(&name, property, expect_real(&value)?).map(|v| p.accuracy = v),
                "MinStep" => positive(&name, property, expect_real(&value)?).map(|v| p.min_step_s = v),
                "MaxStep" => positive(&name, property, expect_real(&value)?).map(|v| p.max_step_s = v),
                "MaxStepAttempts" => match value {
                    PropertyValue::Integer(n) if n > 0 => {
                        p.max_step_attempts = n as u32;
                        Ok(())
                    }
                    other => Err(mismatch(&name, property, "Integer", &other)),
                },
                "StopIfAccuracyIsViolated" => match value {
                    PropertyValue::OnOff(flag) | PropertyValue::Boolean(flag) => {
                        p.stop_if_accuracy_violated = flag;
                        Ok(())
                    }
                    other => Err(mismatch(&name, property, "OnOff", &other)),
                },
                "CentralBody" => match value {
                    PropertyValue::Text(body) => {
                        p.central_body = body;
                        Ok(())
                    }
                    other => Err(mismatch(&name, property, "String", &other)),
                },
                "Type" => Err(ObjectError::ReadOnly {
                    object: name,
                    property: property.into(),
                }),
                _ => Err(self.unknown(property)),
            },
            Self::Solver(s) => match property {
                "MaxIterations" => match value {
                    PropertyValue::Integer(n) if n > 0 => {
                        s.max_iterations = n as u32;
                        Ok(())
                    }
                    other => Err(mismatch(&name, property, "Integer", &other)),
                },
                "ExitMode" => match value {
                    PropertyValue::Text(text) => {
                        s.exit_mode = parse_exit_mode(&text).ok_or_else(|| {
                            ObjectError::InvalidValue {
                                object: name.clone(),
                                property: property.into(),
                                reason: format!("unknown exit mode `{text}`"),
                            }
                        })?;
                        Ok(())
                    }
                    other => Err(mismatch(&name, property, "String", &other)),
                },
                "ShowProgress" => match value {
                    PropertyValue::Boolean(flag) | PropertyValue::OnOff(flag) => {
                        s.show_progress = flag;
                        Ok(())
                    }
                    other => Err(mismatch(&name, property, "Boolean", &other)),
                },
                _ => Err(self.unknown(property)),
            },
            Self::Array(_) if matches!(property, "NumRows" | "NumCols") => {
                Err(ObjectError::ReadOnly {
                    object: name,
                    property: property.into(),
                })
            }
            Self::CoordinateSystem(cs) => match (property, value) {
                ("Origin", PropertyValue::Text(origin)) => {
                    cs.origin = origin;
                    Ok(())
                }
                ("Axes", PropertyValue::Text(axes)) => {
                    cs.axes = axes;
                    Ok(())
                }
                ("Origin" | "Axes", other) => Err(mismatch(&name, property, "String", &other)),
                _ => Err(self.unknown(property)),
            },
            _ => Err(self.unknown(property)),
        }
    }

    /// Run the owner-side action tied to `property` before it is overwritten.
    pub fn take_required_action(&mut self, property: &str) {
        if let Self::Spacecraft(sc) = self {
            sc.take_required_action(property);
        }
    }

    /// Replace this object's contents with `other`, keeping its own name.
    pub fn copy_from(&mut self, other: &MissionObject) -> Result<(), ObjectError> {
        if std::mem::discriminant(self) != std::mem::discriminant(other) {
            return Err(ObjectError::WrongKind {
                name: other.name().to_string(),
                expected: self.type_name(),
                found: other.type_name(),
            });
        }
        let name = self.name().to_string();
        let global = self.is_global();
        *self = other.clone();
        self.set_name(&name);
        self.set_global(global);
        Ok(())
    }

    fn unknown(&self, property: &str) -> ObjectError {
        ObjectError::UnknownProperty {
            kind: self.type_name(),
            object: self.name().to_string(),
            property: property.to_string(),
        }
    }
}

fn mismatch(object: &str, property: &str, expected: &'static str, found: &PropertyValue) -> ObjectError {
    ObjectError::TypeMismatch {
        object: object.to_string(),
        property: property.to_string(),
        expected,
        found: found.type_name(),
    }
}

fn positive(object: &str, property: &str, value: f64) -> Result<f64, ObjectError> {
    if value > 0.0 {
        Ok(value)
    } else {
        Err(ObjectError::InvalidValue {
            object: object.to_string(),
            property: property.to_string(),
            reason: "value must be positive".into(),
        })
    }
}

pub fn exit_mode_name(mode: ExitMode) -> &'static str {
    match mode {
        ExitMode::DiscardAndContinue => "DiscardAndContinue",
        ExitMode::SaveAndContinue => "SaveAndContinue",
        ExitMode::Stop => "Stop",
    }
}

pub fn parse_exit_mode(text: &str) -> Option<ExitMode> {
    match text {
        "DiscardAndContinue" => Some(ExitMode::DiscardAndContinue),
        "SaveAndContinue" => Some(ExitMode::SaveAndContinue),
        "Stop" => Some(ExitMode::Stop),
        _ => None,
    }
}

/// Build an object with default settings from its script type name.
///
/// Unknown type names yield `None`.
pub fn create_object(type_name: &str, name: &str) -> Option<MissionObject> {
    Some(match type_name {
        "Spacecraft" => MissionObject::Spacecraft(Spacecraft::new(name)),
        "Variable" => MissionObject::Variable(Variable::new(name, 0.0)),
        "Array" => MissionObject::Array(Array::new(name, 1, 1)),
        "String" => MissionObject::String(StringObject {
            name: name.to_string(),
            value: String::new(),
            global: false,
        }),
        "Propagator" | "PropSetup" => MissionObject::Propagator(PropagatorSettings::new(name)),
        "DifferentialCorrector" => MissionObject::Solver(SolverSettings::new(name)),
        "CoordinateSystem" => MissionObject::CoordinateSystem(CoordinateSystem {
            name: name.to_string(),
            origin: "Earth".into(),
            axes: "MJ2000Eq".into(),
        }),
        _ => return None,
    })
}

impl From<&VariableConfig> for MissionObject {
    fn from(cfg: &VariableConfig) -> Self {
        Self::Variable(Variable {
            name: cfg.name.clone(),
            value: cfg.value,
            global: cfg.global,
        })
    }
}

impl From<&ArrayConfig> for MissionObject {
    fn from(cfg: &ArrayConfig) -> Self {
        let data = if cfg.values.is_empty() {
            vec![0.0; cfg.rows * cfg.cols]
        } else {
            cfg.values.clone()
        };
        Self::Array(Array {
            name: cfg.name.clone(),
            rows: cfg.rows,
            cols: cfg.cols,
            data,
            global: cfg.global,
        })
    }
}

impl From<&StringConfig> for MissionObject {
    fn from(cfg: &StringConfig) -> Self {
        Self::String(StringObject {
            name: cfg.name.clone(),
            value: cfg.value.clone(),
            global: cfg.global,
        })
    }
}

impl From<&SolverConfig> for MissionObject {
    fn from(cfg: &SolverConfig) -> Self {
        Self::Solver(SolverSettings {
            name: cfg.name.clone(),
            kind: cfg.kind.clone(),
            max_iterations: cfg.max_iterations,
            exit_mode: cfg.exit_mode,
            show_progress: cfg.show_progress,
            global: cfg.global,
        })
    }
}

/// Convert every configured object in a mission file, in file order.
pub fn objects_from_mission(file: &MissionFile) -> Vec<MissionObject> {
    let mut objects = Vec::new();
    objects.extend(
        file.coordinate_systems
            .iter()
            .map(|cfg| MissionObject::CoordinateSystem(CoordinateSystem::from(cfg))),
    );
    objects.extend(
        file.spacecraft
            .iter()
            .map(|cfg| MissionObject::Spacecraft(Spacecraft::from_config(cfg))),
    );
    objects.extend(file.variables.iter().map(MissionObject::from));
    objects.extend(file.arrays.iter().map(MissionObject::from));
    objects.extend(file.strings.iter().map(MissionObject::from));
    objects.extend(
        file.propagators
            .iter()
            .map(|cfg| MissionObject::Propagator(PropagatorSettings::from_config(cfg))),
    );
    objects.extend(file.solvers.iter().map(MissionObject::from));
    objects
}

//! Configuration models and loaders for mission objects and run settings.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default A.1 modified Julian epoch for objects that omit one (J2000).
pub const DEFAULT_EPOCH_MJD: f64 = 21_545.000_371_5;

/// Complete set of configured objects plus engine settings.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct MissionFile {
    #[serde(default)]
    pub settings: RunSettings,
    #[serde(default)]
    pub bodies: Vec<BodyConfig>,
    #[serde(default)]
    pub coordinate_systems: Vec<CoordinateSystemConfig>,
    #[serde(default)]
    pub spacecraft: Vec<SpacecraftConfig>,
    #[serde(default)]
    pub variables: Vec<VariableConfig>,
    #[serde(default)]
    pub arrays: Vec<ArrayConfig>,
    #[serde(default)]
    pub strings: Vec<StringConfig>,
    #[serde(default)]
    pub propagators: Vec<PropagatorConfig>,
    #[serde(default)]
    pub solvers: Vec<SolverConfig>,
}

/// Engine knobs shared by the sandbox and the propagation commands.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RunSettings {
    /// Propagation steps between cooperative yields.
    #[serde(default = "default_interrupt_check_frequency")]
    pub interrupt_check_frequency: usize,
    /// Command executions between interrupt polls in the sandbox loop.
    #[serde(default = "default_command_poll_frequency")]
    pub command_poll_frequency: usize,
    /// Default stopping-condition accuracy.
    #[serde(default = "default_stop_tolerance")]
    pub stop_tolerance: f64,
    /// Optional rounding applied to final propagation steps (seconds).
    #[serde(default)]
    pub time_granularity_s: Option<f64>,
    /// Most recent published samples kept in memory; 0 keeps none.
    #[serde(default = "default_sample_history")]
    pub sample_history: usize,
}

fn default_interrupt_check_frequency() -> usize {
    50
}

fn default_command_poll_frequency() -> usize {
    1
}

fn default_stop_tolerance() -> f64 {
    1.0e-7
}

fn default_sample_history() -> usize {
    10_000
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            interrupt_check_frequency: default_interrupt_check_frequency(),
            command_poll_frequency: default_command_poll_frequency(),
            stop_tolerance: default_stop_tolerance(),
            time_granularity_s: None,
            sample_history: default_sample_history(),
        }
    }
}

/// Celestial body entry for the body registry.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BodyConfig {
    pub name: String,
    pub mu_km3_s2: f64,
    pub radius_km: f64,
    /// Circular reference motion about another body; absent for the frame origin.
    #[serde(default)]
    pub orbit: Option<CircularOrbitConfig>,
}

/// Circular, equatorial reference orbit used for third-body positions.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CircularOrbitConfig {
    pub center: String,
    pub radius_km: f64,
    pub period_days: f64,
    #[serde(default)]
    pub phase_deg: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CoordinateSystemConfig {
    pub name: String,
    #[serde(default = "default_central_body")]
    pub origin: String,
    #[serde(default = "default_axes")]
    pub axes: String,
}

fn default_axes() -> String {
    "MJ2000Eq".to_string()
}

fn default_central_body() -> String {
    "Earth".to_string()
}

/// Spacecraft configuration with a Cartesian initial state.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SpacecraftConfig {
    pub name: String,
    #[serde(default = "default_epoch")]
    pub epoch_mjd: f64,
    /// Position (km) followed by velocity (km/s).
    pub state: [f64; 6],
    #[serde(default = "default_dry_mass")]
    pub dry_mass_kg: f64,
    #[serde(default = "default_central_body")]
    pub central_body: String,
    #[serde(default)]
    pub global: bool,
}

fn default_epoch() -> f64 {
    DEFAULT_EPOCH_MJD
}

fn default_dry_mass() -> f64 {
    850.0
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct VariableConfig {
    pub name: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub global: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ArrayConfig {
    pub name: String,
    pub rows: usize,
    pub cols: usize,
    /// Row-major initial values; zero-filled when empty.
    #[serde(default)]
    pub values: Vec<f64>,
    #[serde(default)]
    pub global: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StringConfig {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub global: bool,
}

/// Propagator (integrator + force model) configuration.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PropagatorConfig {
    pub name: String,
    #[serde(default = "default_integrator")]
    pub integrator: String,
    #[serde(default = "default_initial_step")]
    pub initial_step_s: f64,
    #[serde(default = "default_accuracy")]
    pub accuracy: f64,
    #[serde(default = "default_min_step")]
    pub min_step_s: f64,
    #[serde(default = "default_max_step")]
    pub max_step_s: f64,
    #[serde(default = "default_max_attempts")]
    pub max_step_attempts: u32,
    #[serde(default = "default_central_body")]
    pub central_body: String,
    /// Additional point-mass bodies acting on propagated objects.
    #[serde(default)]
    pub point_masses: Vec<String>,
    #[serde(default)]
    pub global: bool,
}

fn default_integrator() -> String {
    "PrinceDormand45".to_string()
}

fn default_initial_step() -> f64 {
    60.0
}

fn default_accuracy() -> f64 {
    1.0e-11
}

fn default_min_step() -> f64 {
    1.0e-3
}

fn default_max_step() -> f64 {
    2_700.0
}

fn default_max_attempts() -> u32 {
    50
}

/// Exit behaviour once a solver loop finishes.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitMode {
    #[default]
    DiscardAndContinue,
    SaveAndContinue,
    Stop,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SolverConfig {
    pub name: String,
    #[serde(default = "default_solver_kind")]
    pub kind: String,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default)]
    pub exit_mode: ExitMode,
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
    #[serde(default)]
    pub global: bool,
}

fn default_solver_kind() -> String {
    "DifferentialCorrector".to_string()
}

fn default_max_iterations() -> u32 {
    25
}

fn default_show_progress() -> bool {
    true
}

/// Errors that can occur while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration for `{name}`: {reason}")]
    Invalid { name: String, reason: String },
}

impl MissionFile {
    /// Parse a YAML mission description.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let file: MissionFile = serde_yaml::from_str(text)?;
        file.validate()?;
        Ok(file)
    }

    /// Parse a TOML mission description.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: MissionFile = toml::from_str(text)?;
        file.validate()?;
        Ok(file)
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for array in &self.arrays {
            if array.rows == 0 || array.cols == 0 {
                return Err(invalid(&array.name, "array dimensions must be positive"));
            }
            if !array.values.is_empty() && array.values.len() != array.rows * array.cols {
                return Err(invalid(
                    &array.name,
                    format!(
                        "expected {} values for a {}x{} array, found {}",
                        array.rows * array.cols,
                        array.rows,
                        array.cols,
                        array.values.len()
                    ),
                ));
            }
        }
        for prop in &self.propagators {
            if prop.initial_step_s == 0.0 || !prop.initial_step_s.is_finite() {
                return Err(invalid(&prop.name, "initial step must be finite and non-zero"));
            }
            if prop.accuracy <= 0.0 {
                return Err(invalid(&prop.name, "accuracy must be positive"));
            }
            if prop.min_step_s <= 0.0 || prop.max_step_s < prop.min_step_s {
                return Err(invalid(&prop.name, "step limits must satisfy 0 < min <= max"));
            }
        }
        if self.settings.interrupt_check_frequency == 0 || self.settings.command_poll_frequency == 0
        {
            return Err(invalid("settings", "poll frequencies must be positive"));
        }
        if self.settings.stop_tolerance <= 0.0 {
            return Err(invalid("settings", "stop tolerance must be positive"));
        }
        Ok(())
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Load a mission description from YAML or TOML (chosen by extension).
pub fn load_mission<P: AsRef<Path>>(path: P) -> Result<MissionFile, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)?;
    if is_toml(path) {
        MissionFile::from_toml_str(&contents)
    } else {
        MissionFile::from_yaml_str(&contents)
    }
}

/// Load body definitions from a YAML list, a TOML record, or a directory of TOML records.
pub fn load_bodies<P: AsRef<Path>>(path: P) -> Result<Vec<BodyConfig>, ConfigError> {
    load_records(path)
}

fn is_toml(path: &Path) -> bool {
    path.extension().map(|ext| ext == "toml").unwrap_or(false)
}

fn load_records<T, P>(path: P) -> Result<Vec<T>, ConfigError>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if path.is_dir() {
        read_dir_records(path)
    } else if is_toml(path) {
        let contents = std::fs::read_to_string(path)?;
        let record: T = toml::from_str(&contents)?;
        Ok(vec![record])
    } else {
        let reader = File::open(path)?;
        Ok(serde_yaml::from_reader(reader)?)
    }
}

fn read_dir_records<T>(dir: &Path) -> Result<Vec<T>, ConfigError>
where
    T: for<'de> Deserialize<'de>,
{
    let mut records = Vec::new();
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_toml(path))
        .collect();
    entries.sort();
    for path in entries {
        let contents = std::fs::read_to_string(&path)?;
        let record: T = toml::from_str(&contents)?;
        records.push(record);
    }
    Ok(records)
}

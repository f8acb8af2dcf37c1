//! Spacecraft: the space object propagated by `Propagate`.

use mcs_config::SpacecraftConfig;
use mcs_core::constants::MU_EARTH;
use mcs_core::time::Epoch;
use mcs_core::vector::Vector3;

use crate::{ObjectError, PropertyValue};

/// Number of state elements a spacecraft contributes to a propagation state vector.
pub const SPACECRAFT_STATE_SIZE: usize = 6;

const STATE_LABELS: [&str; 6] = ["X", "Y", "Z", "VX", "VY", "VZ"];

#[derive(Debug, Clone, PartialEq)]
pub struct Spacecraft {
    pub name: String,
    pub epoch: Epoch,
    /// Cartesian position (km) and velocity (km/s) about `central_body`.
    pub state: [f64; 6],
    pub dry_mass_kg: f64,
    pub central_body: String,
    /// Gravitational parameter of `central_body`, filled in during object wiring.
    pub central_mu: f64,
    /// Name of the stopping condition that ended the most recent propagation.
    pub last_stop_triggered: Option<String>,
    pub global: bool,
}

impl Spacecraft {
    /// Default spacecraft: 7100 km circular equatorial Earth orbit at J2000.
    pub fn new(name: &str) -> Self {
        let r = 7_100.0;
        Self {
            name: name.to_string(),
            epoch: Epoch::default(),
            state: [r, 0.0, 0.0, 0.0, (MU_EARTH / r).sqrt(), 0.0],
            dry_mass_kg: 850.0,
            central_body: "Earth".to_string(),
            central_mu: MU_EARTH,
            last_stop_triggered: None,
            global: false,
        }
    }

    pub fn from_config(cfg: &SpacecraftConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            epoch: Epoch::from_mjd(cfg.epoch_mjd),
            state: cfg.state,
            dry_mass_kg: cfg.dry_mass_kg,
            central_body: cfg.central_body.clone(),
            central_mu: MU_EARTH,
            last_stop_triggered: None,
            global: cfg.global,
        }
    }

    pub fn position(&self) -> Vector3 {
        [self.state[0], self.state[1], self.state[2]]
    }

    pub fn velocity(&self) -> Vector3 {
        [self.state[3], self.state[4], self.state[5]]
    }

    /// Labels of the published state elements, prefixed by the spacecraft name.
    pub fn state_labels(&self) -> Vec<String> {
        STATE_LABELS
            .iter()
            .map(|l| format!("{}.{}", self.name, l))
            .collect()
    }

    pub fn property(&self, property: &str) -> Result<PropertyValue, ObjectError> {
        if let Some(idx) = state_index(property) {
            return Ok(PropertyValue::Real(self.state[idx]));
        }
        match property {
            "Epoch" | "A1ModJulian" => Ok(PropertyValue::Real(self.epoch.mjd())),
            "DryMass" => Ok(PropertyValue::Real(self.dry_mass_kg)),
            "CentralBody" => Ok(PropertyValue::Text(self.central_body.clone())),
            _ => Err(self.unknown(property)),
        }
    }

    pub fn set_property(&mut self, property: &str, value: PropertyValue) -> Result<(), ObjectError> {
        if let Some(idx) = state_index(property) {
            self.state[idx] = self.real_value(property, &value)?;
            return Ok(());
        }
        match property {
            "Epoch" | "A1ModJulian" => {
                self.epoch = Epoch::from_mjd(self.real_value(property, &value)?);
                Ok(())
            }
            "DryMass" => {
                let mass = self.real_value(property, &value)?;
                if mass < 0.0 {
                    return Err(ObjectError::InvalidValue {
                        object: self.name.clone(),
                        property: property.to_string(),
                        reason: "mass cannot be negative".into(),
                    });
                }
                self.dry_mass_kg = mass;
                Ok(())
            }
            "CentralBody" => match value {
                PropertyValue::Text(body) => {
                    self.central_body = body;
                    Ok(())
                }
                other => Err(ObjectError::TypeMismatch {
                    object: self.name.clone(),
                    property: property.to_string(),
                    expected: "String",
                    found: other.type_name(),
                }),
            },
            _ => Err(self.unknown(property)),
        }
    }

    /// Side effects that must run before `property` is overwritten.
    ///
    /// Any change to the epoch or state invalidates the last-stop tag, so a
    /// reset spacecraft is never mistaken for one sitting on a stop crossing.
    pub fn take_required_action(&mut self, property: &str) {
        if state_index(property).is_some() || matches!(property, "Epoch" | "A1ModJulian") {
            self.last_stop_triggered = None;
        }
    }

    fn real_value(&self, property: &str, value: &PropertyValue) -> Result<f64, ObjectError> {
        value.as_real().ok_or_else(|| ObjectError::TypeMismatch {
            object: self.name.clone(),
            property: property.to_string(),
            expected: "Real",
            found: value.type_name(),
        })
    }

    fn unknown(&self, property: &str) -> ObjectError {
        ObjectError::UnknownProperty {
            kind: "Spacecraft",
            object: self.name.clone(),
            property: property.to_string(),
        }
    }
}

fn state_index(property: &str) -> Option<usize> {
    STATE_LABELS.iter().position(|l| *l == property)
}

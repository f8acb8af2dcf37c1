//! Celestial body registry used for gravitational parameters and third-body positions.

use indexmap::IndexMap;
use mcs_config::{BodyConfig, CircularOrbitConfig};
use mcs_core::constants::{J2000_A1_MJD, MU_EARTH, MU_MARS, MU_MOON, MU_SUN};
use mcs_core::time::Epoch;
use mcs_core::vector::{self, Vector3};

use crate::ObjectError;

const AU_KM: f64 = 149_597_870.7;

/// Circular reference motion of a body about its center.
#[derive(Debug, Clone, PartialEq)]
pub struct CircularOrbit {
    pub center: String,
    pub radius_km: f64,
    pub period_days: f64,
    pub phase_deg: f64,
}

impl From<&CircularOrbitConfig> for CircularOrbit {
    fn from(cfg: &CircularOrbitConfig) -> Self {
        Self {
            center: cfg.center.clone(),
            radius_km: cfg.radius_km,
            period_days: cfg.period_days,
            phase_deg: cfg.phase_deg,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CelestialBody {
    pub name: String,
    pub mu_km3_s2: f64,
    pub radius_km: f64,
    pub orbit: Option<CircularOrbit>,
}

impl CelestialBody {
    fn new(name: &str, mu: f64, radius: f64, orbit: Option<CircularOrbit>) -> Self {
        Self {
            name: name.to_string(),
            mu_km3_s2: mu,
            radius_km: radius,
            orbit,
        }
    }
}

impl From<&BodyConfig> for CelestialBody {
    fn from(cfg: &BodyConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            mu_km3_s2: cfg.mu_km3_s2,
            radius_km: cfg.radius_km,
            orbit: cfg.orbit.as_ref().map(CircularOrbit::from),
        }
    }
}

/// Named body registry; lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq)]
pub struct SolarSystem {
    bodies: IndexMap<String, CelestialBody>,
}

impl Default for SolarSystem {
    fn default() -> Self {
        let mut system = Self {
            bodies: IndexMap::new(),
        };
        system.insert(CelestialBody::new("Earth", MU_EARTH, 6_378.136_3, None));
        system.insert(CelestialBody::new(
            "Sun",
            MU_SUN,
            695_700.0,
            Some(CircularOrbit {
                center: "Earth".into(),
                radius_km: AU_KM,
                period_days: 365.256_36,
                phase_deg: 180.0,
            }),
        ));
        system.insert(CelestialBody::new(
            "Luna",
            MU_MOON,
            1_738.2,
            Some(CircularOrbit {
                center: "Earth".into(),
                radius_km: 384_400.0,
                period_days: 27.321_661,
                phase_deg: 0.0,
            }),
        ));
        system.insert(CelestialBody::new(
            "Mars",
            MU_MARS,
            3_396.19,
            Some(CircularOrbit {
                center: "Sun".into(),
                radius_km: 1.523_679 * AU_KM,
                period_days: 686.98,
                phase_deg: 0.0,
            }),
        ));
        system
    }
}

impl SolarSystem {
    /// Registry containing only the configured bodies.
    pub fn from_configs(configs: &[BodyConfig]) -> Self {
        let mut system = Self {
            bodies: IndexMap::new(),
        };
        for cfg in configs {
            system.insert(CelestialBody::from(cfg));
        }
        system
    }

    /// Add or replace a body.
    pub fn insert(&mut self, body: CelestialBody) {
        self.bodies.insert(body.name.to_ascii_uppercase(), body);
    }

    pub fn body(&self, name: &str) -> Option<&CelestialBody> {
        let key = name.to_ascii_uppercase();
        // "Moon" is accepted as an alias for the registry's "Luna".
        self.bodies.get(&key).or_else(|| match key.as_str() {
            "MOON" => self.bodies.get("LUNA"),
            _ => None,
        })
    }

    pub fn require(&self, name: &str) -> Result<&CelestialBody, ObjectError> {
        self.body(name)
            .ok_or_else(|| ObjectError::UnknownBody(name.to_string()))
    }

    pub fn mu(&self, name: &str) -> Result<f64, ObjectError> {
        Ok(self.require(name)?.mu_km3_s2)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bodies.values().map(|b| b.name.as_str())
    }

    /// Position of `body` relative to `origin` at `epoch` (km).
    pub fn position_relative(
        &self,
        body: &str,
        origin: &str,
        epoch: &Epoch,
    ) -> Result<Vector3, ObjectError> {
        let target = self.absolute_position(body, epoch, 0)?;
        let reference = self.absolute_position(origin, epoch, 0)?;
        Ok(vector::sub(&target, &reference))
    }

    fn absolute_position(
        &self,
        name: &str,
        epoch: &Epoch,
        depth: usize,
    ) -> Result<Vector3, ObjectError> {
        let body = self.require(name)?;
        let Some(orbit) = &body.orbit else {
            return Ok([0.0; 3]);
        };
        if depth > self.bodies.len() {
            // Cyclic center chain; treat as unresolvable.
            return Err(ObjectError::UnknownBody(orbit.center.clone()));
        }
        let center = self.absolute_position(&orbit.center, epoch, depth + 1)?;
        let days = epoch.mjd() - J2000_A1_MJD;
        let angle = (orbit.phase_deg + 360.0 * days / orbit.period_days).to_radians();
        Ok([
            center[0] + orbit.radius_km * angle.cos(),
            center[1] + orbit.radius_km * angle.sin(),
            center[2],
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moon_alias_resolves_to_luna() {
        let system = SolarSystem::default();
        assert_eq!(system.body("Moon").map(|b| b.name.as_str()), Some("Luna"));
    }

    #[test]
    fn relative_positions_are_antisymmetric() {
        let system = SolarSystem::default();
        let epoch = Epoch::from_mjd(21_600.25);
        let a = system.position_relative("Luna", "Earth", &epoch).unwrap();
        let b = system.position_relative("Earth", "Luna", &epoch).unwrap();
        for i in 0..3 {
            assert!((a[i] + b[i]).abs() < 1e-6);
        }
        assert!((vector::norm(&a) - 384_400.0).abs() < 1e-6);
    }
}

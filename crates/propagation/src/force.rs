//! Derivative models supplying accelerations to the integrators.

use std::fmt;

use mcs_core::time::Epoch;
use mcs_core::vector::{self, Vector3};
use mcs_objects::{SPACECRAFT_STATE_SIZE, SolarSystem};

use crate::PropagationError;

/// Time derivative of a packed propagation state.
///
/// `elapsed_s` is measured from the epoch passed to
/// [`ForceModel::update_time_dependent`].
pub trait ForceModel: fmt::Debug + Send {
    /// Evaluate `d(state)/dt` into `out`; both slices have the same length.
    fn derivatives(
        &self,
        elapsed_s: f64,
        state: &[f64],
        out: &mut [f64],
    ) -> Result<(), PropagationError>;

    /// Refresh anything that depends on the reference epoch.
    fn update_time_dependent(&mut self, base_epoch: &Epoch);
}

#[derive(Debug, Clone)]
struct ThirdBody {
    name: String,
    mu: f64,
}

/// Central-body gravity plus point-mass third-body perturbations.
#[derive(Debug, Clone)]
pub struct PointMassForce {
    central_body: String,
    central_mu: f64,
    third_bodies: Vec<ThirdBody>,
    solar_system: SolarSystem,
    base_epoch: Epoch,
}

impl PointMassForce {
    pub fn new(
        solar_system: &SolarSystem,
        central_body: &str,
        point_masses: &[String],
    ) -> Result<Self, PropagationError> {
        let central_mu = solar_system.mu(central_body)?;
        let mut third_bodies = Vec::new();
        for name in point_masses {
            let body = solar_system.require(name)?;
            if body.name.eq_ignore_ascii_case(central_body) {
                continue;
            }
            third_bodies.push(ThirdBody {
                name: body.name.clone(),
                mu: body.mu_km3_s2,
            });
        }
        Ok(Self {
            central_body: central_body.to_string(),
            central_mu,
            third_bodies,
            solar_system: solar_system.clone(),
            base_epoch: Epoch::default(),
        })
    }

    pub fn central_mu(&self) -> f64 {
        self.central_mu
    }

    fn third_body_positions(&self, elapsed_s: f64) -> Result<Vec<(f64, Vector3)>, PropagationError> {
        let epoch = self.base_epoch.add_seconds(elapsed_s);
        self.third_bodies
            .iter()
            .map(|b| {
                self.solar_system
                    .position_relative(&b.name, &self.central_body, &epoch)
                    .map(|pos| (b.mu, pos))
                    .map_err(PropagationError::from)
            })
            .collect()
    }
}

impl ForceModel for PointMassForce {
    fn derivatives(
        &self,
        elapsed_s: f64,
        state: &[f64],
        out: &mut [f64],
    ) -> Result<(), PropagationError> {
        let perturbers = if self.third_bodies.is_empty() {
            Vec::new()
        } else {
            self.third_body_positions(elapsed_s)?
        };
        for (chunk, deriv) in state
            .chunks_exact(SPACECRAFT_STATE_SIZE)
            .zip(out.chunks_exact_mut(SPACECRAFT_STATE_SIZE))
        {
            let (r, v) = vector::split_state(chunk);
            let rmag = vector::norm(&r);
            let mut accel = vector::scale(&r, -self.central_mu / (rmag * rmag * rmag));
            for (mu, body) in &perturbers {
                let rel = vector::sub(body, &r);
                let rel_mag = vector::norm(&rel);
                let body_mag = vector::norm(body);
                for i in 0..3 {
                    accel[i] += mu
                        * (rel[i] / (rel_mag * rel_mag * rel_mag)
                            - body[i] / (body_mag * body_mag * body_mag));
                }
            }
            deriv[..3].copy_from_slice(&v);
            deriv[3..].copy_from_slice(&accel);
        }
        if out.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(PropagationError::NonFinite)
        }
    }

    fn update_time_dependent(&mut self, base_epoch: &Epoch) {
        self.base_epoch = *base_epoch;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcs_core::constants::MU_EARTH;

    #[test]
    fn two_body_acceleration_points_inward() {
        let force = PointMassForce::new(&SolarSystem::default(), "Earth", &[]).unwrap();
        let state = [7_000.0, 0.0, 0.0, 0.0, 7.5, 0.0];
        let mut out = [0.0; 6];
        force.derivatives(0.0, &state, &mut out).unwrap();
        assert_eq!(out[1], 7.5);
        assert!((out[3] + MU_EARTH / 49.0e6).abs() < 1e-12);
    }

    #[test]
    fn central_body_is_not_its_own_perturber() {
        let names = vec!["Earth".to_string(), "Luna".to_string()];
        let force = PointMassForce::new(&SolarSystem::default(), "Earth", &names).unwrap();
        assert_eq!(force.third_bodies.len(), 1);
    }
}

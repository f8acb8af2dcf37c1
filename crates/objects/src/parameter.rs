//! Calculated spacecraft parameters (`Sat.SMA`, `Sat.ElapsedSecs`, ...).
//!
//! Parameters are resolved once from their script name; the resolved kind
//! carries its own metadata (cyclic range, time-ness, settability) so no
//! lookup tables are consulted during propagation.

use mcs_core::constants::SECONDS_PER_DAY;
use mcs_core::time::Epoch;
use mcs_core::units::rad_to_deg;
use mcs_core::vector::{cross, dot, norm};

use crate::Spacecraft;

const ECC_CIRCULAR: f64 = 1.0e-11;
const INC_EQUATORIAL: f64 = 1.0e-11;

/// Which apsis an r·v event function looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Apsis {
    Periapsis,
    Apoapsis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpacecraftParameter {
    X,
    Y,
    Z,
    VX,
    VY,
    VZ,
    RMAG,
    VMAG,
    SMA,
    ECC,
    INC,
    RAAN,
    AOP,
    TA,
    MA,
    Energy,
    Apsis(Apsis),
    A1ModJulian,
    ElapsedSecs,
    ElapsedDays,
    DryMass,
}

impl SpacecraftParameter {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "X" => Self::X,
            "Y" => Self::Y,
            "Z" => Self::Z,
            "VX" => Self::VX,
            "VY" => Self::VY,
            "VZ" => Self::VZ,
            "RMAG" => Self::RMAG,
            "VMAG" => Self::VMAG,
            "SMA" => Self::SMA,
            "ECC" => Self::ECC,
            "INC" => Self::INC,
            "RAAN" => Self::RAAN,
            "AOP" => Self::AOP,
            "TA" => Self::TA,
            "MA" => Self::MA,
            "Energy" => Self::Energy,
            "Periapsis" => Self::Apsis(Apsis::Periapsis),
            "Apoapsis" => Self::Apsis(Apsis::Apoapsis),
            "A1ModJulian" | "Epoch" => Self::A1ModJulian,
            "ElapsedSecs" => Self::ElapsedSecs,
            "ElapsedDays" => Self::ElapsedDays,
            "DryMass" => Self::DryMass,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::X => "X",
            Self::Y => "Y",
            Self::Z => "Z",
            Self::VX => "VX",
            Self::VY => "VY",
            Self::VZ => "VZ",
            Self::RMAG => "RMAG",
            Self::VMAG => "VMAG",
            Self::SMA => "SMA",
            Self::ECC => "ECC",
            Self::INC => "INC",
            Self::RAAN => "RAAN",
            Self::AOP => "AOP",
            Self::TA => "TA",
            Self::MA => "MA",
            Self::Energy => "Energy",
            Self::Apsis(Apsis::Periapsis) => "Periapsis",
            Self::Apsis(Apsis::Apoapsis) => "Apoapsis",
            Self::A1ModJulian => "A1ModJulian",
            Self::ElapsedSecs => "ElapsedSecs",
            Self::ElapsedDays => "ElapsedDays",
            Self::DryMass => "DryMass",
        }
    }

    /// Angles that wrap at 360 degrees.
    pub fn is_cyclic(&self) -> bool {
        matches!(self, Self::RAAN | Self::AOP | Self::TA | Self::MA)
    }

    /// Parameters that are linear in propagation time.
    pub fn is_time(&self) -> bool {
        matches!(self, Self::A1ModJulian | Self::ElapsedSecs | Self::ElapsedDays)
    }

    /// Parameters that need a reference epoch to evaluate.
    pub fn is_elapsed(&self) -> bool {
        matches!(self, Self::ElapsedSecs | Self::ElapsedDays)
    }

    /// Parameters backed directly by a spacecraft field.
    pub fn is_settable(&self) -> bool {
        matches!(
            self,
            Self::X | Self::Y | Self::Z | Self::VX | Self::VY | Self::VZ | Self::A1ModJulian
                | Self::DryMass
        )
    }

    /// Rate of change of a time parameter per elapsed second.
    pub fn time_rate(&self) -> Option<f64> {
        match self {
            Self::ElapsedSecs => Some(1.0),
            Self::ElapsedDays | Self::A1ModJulian => Some(1.0 / SECONDS_PER_DAY),
            _ => None,
        }
    }

    /// Evaluate against a spacecraft. `reference` is the base epoch for elapsed parameters.
    pub fn evaluate(&self, sc: &Spacecraft, reference: Option<&Epoch>) -> Option<f64> {
        let r = sc.position();
        let v = sc.velocity();
        let mu = sc.central_mu;
        Some(match self {
            Self::X => r[0],
            Self::Y => r[1],
            Self::Z => r[2],
            Self::VX => v[0],
            Self::VY => v[1],
            Self::VZ => v[2],
            Self::RMAG => norm(&r),
            Self::VMAG => norm(&v),
            Self::Energy => energy(&sc.state, mu),
            Self::SMA => -mu / (2.0 * energy(&sc.state, mu)),
            Self::ECC => norm(&eccentricity_vector(&sc.state, mu)),
            Self::INC => inclination(&sc.state),
            Self::RAAN => raan(&sc.state),
            Self::AOP => argument_of_periapsis(&sc.state, mu),
            Self::TA => true_anomaly(&sc.state, mu),
            Self::MA => mean_anomaly(&sc.state, mu),
            Self::Apsis(_) => dot(&r, &v),
            Self::A1ModJulian => sc.epoch.mjd(),
            Self::ElapsedSecs => sc.epoch.seconds_since(reference?),
            Self::ElapsedDays => sc.epoch.seconds_since(reference?) / SECONDS_PER_DAY,
            Self::DryMass => sc.dry_mass_kg,
        })
    }
}

fn energy(state: &[f64; 6], mu: f64) -> f64 {
    let r = [state[0], state[1], state[2]];
    let v = [state[3], state[4], state[5]];
    0.5 * dot(&v, &v) - mu / norm(&r)
}

fn eccentricity_vector(state: &[f64; 6], mu: f64) -> [f64; 3] {
    let r = [state[0], state[1], state[2]];
    let v = [state[3], state[4], state[5]];
    let rmag = norm(&r);
    let v2 = dot(&v, &v);
    let rv = dot(&r, &v);
    let mut e = [0.0; 3];
    for i in 0..3 {
        e[i] = ((v2 - mu / rmag) * r[i] - rv * v[i]) / mu;
    }
    e
}

fn angular_momentum(state: &[f64; 6]) -> [f64; 3] {
    cross(&[state[0], state[1], state[2]], &[state[3], state[4], state[5]])
}

fn node_vector(state: &[f64; 6]) -> [f64; 3] {
    let h = angular_momentum(state);
    [-h[1], h[0], 0.0]
}

fn safe_acos(x: f64) -> f64 {
    x.clamp(-1.0, 1.0).acos()
}

fn inclination(state: &[f64; 6]) -> f64 {
    let h = angular_momentum(state);
    rad_to_deg(safe_acos(h[2] / norm(&h)))
}

fn raan(state: &[f64; 6]) -> f64 {
    let n = node_vector(state);
    let nmag = norm(&n);
    if nmag < INC_EQUATORIAL * norm(&angular_momentum(state)) {
        return 0.0;
    }
    let angle = rad_to_deg(safe_acos(n[0] / nmag));
    if n[1] < 0.0 { 360.0 - angle } else { angle }
}

fn argument_of_periapsis(state: &[f64; 6], mu: f64) -> f64 {
    let e = eccentricity_vector(state, mu);
    let emag = norm(&e);
    if emag < ECC_CIRCULAR {
        return 0.0;
    }
    let n = node_vector(state);
    let nmag = norm(&n);
    if nmag < INC_EQUATORIAL * norm(&angular_momentum(state)) {
        // Equatorial: measure from the x axis, in the sense of the orbit.
        let angle = rad_to_deg(e[1].atan2(e[0]));
        let angle = if angular_momentum(state)[2] < 0.0 { -angle } else { angle };
        return angle.rem_euclid(360.0);
    }
    let angle = rad_to_deg(safe_acos(dot(&n, &e) / (nmag * emag)));
    if e[2] < 0.0 { 360.0 - angle } else { angle }
}

fn true_anomaly(state: &[f64; 6], mu: f64) -> f64 {
    let r = [state[0], state[1], state[2]];
    let v = [state[3], state[4], state[5]];
    let rmag = norm(&r);
    let e = eccentricity_vector(state, mu);
    let emag = norm(&e);
    if emag < ECC_CIRCULAR {
        // Circular orbits report the argument of latitude or true longitude.
        let n = node_vector(state);
        let nmag = norm(&n);
        if nmag < INC_EQUATORIAL * norm(&angular_momentum(state)) {
            return rad_to_deg(r[1].atan2(r[0])).rem_euclid(360.0);
        }
        let angle = rad_to_deg(safe_acos(dot(&n, &r) / (nmag * rmag)));
        return if r[2] < 0.0 { 360.0 - angle } else { angle };
    }
    let angle = rad_to_deg(safe_acos(dot(&e, &r) / (emag * rmag)));
    if dot(&r, &v) < 0.0 { 360.0 - angle } else { angle }
}

fn mean_anomaly(state: &[f64; 6], mu: f64) -> f64 {
    let ecc = norm(&eccentricity_vector(state, mu));
    let nu = true_anomaly(state, mu).to_radians();
    if ecc < 1.0 {
        let ea = 2.0 * (((1.0 - ecc) / (1.0 + ecc)).sqrt() * (nu / 2.0).tan()).atan();
        rad_to_deg(ea - ecc * ea.sin()).rem_euclid(360.0)
    } else {
        let ha = 2.0 * (((ecc - 1.0) / (ecc + 1.0)).sqrt() * (nu / 2.0).tan()).atanh();
        rad_to_deg(ecc * ha.sinh() - ha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elliptic(ecc: f64, ta_deg: f64) -> Spacecraft {
        let mut sc = Spacecraft::new("Sat");
        let mu = sc.central_mu;
        let p = 7_000.0 * (1.0 - ecc * ecc);
        let nu = ta_deg.to_radians();
        let r = p / (1.0 + ecc * nu.cos());
        let vr = (mu / p).sqrt() * ecc * nu.sin();
        let vt = (mu / p).sqrt() * (1.0 + ecc * nu.cos());
        sc.state = [
            r * nu.cos(),
            r * nu.sin(),
            0.0,
            vr * nu.cos() - vt * nu.sin(),
            vr * nu.sin() + vt * nu.cos(),
            0.0,
        ];
        sc
    }

    #[test]
    fn elements_recover_constructed_orbit() {
        let sc = elliptic(0.1, 135.0);
        let sma = SpacecraftParameter::SMA.evaluate(&sc, None).unwrap();
        let ecc = SpacecraftParameter::ECC.evaluate(&sc, None).unwrap();
        let ta = SpacecraftParameter::TA.evaluate(&sc, None).unwrap();
        assert!((sma - 7_000.0).abs() < 1e-6, "sma {sma}");
        assert!((ecc - 0.1).abs() < 1e-12, "ecc {ecc}");
        assert!((ta - 135.0).abs() < 1e-9, "ta {ta}");
    }

    #[test]
    fn true_anomaly_past_apoapsis_is_above_180() {
        let sc = elliptic(0.05, 300.0);
        let ta = SpacecraftParameter::TA.evaluate(&sc, None).unwrap();
        assert!((ta - 300.0).abs() < 1e-9, "ta {ta}");
        let rv = SpacecraftParameter::Apsis(Apsis::Periapsis)
            .evaluate(&sc, None)
            .unwrap();
        assert!(rv < 0.0);
    }

    #[test]
    fn elapsed_parameters_need_reference_epoch() {
        let sc = Spacecraft::new("Sat");
        assert!(SpacecraftParameter::ElapsedSecs.evaluate(&sc, None).is_none());
        let base = sc.epoch.add_seconds(-120.0);
        let secs = SpacecraftParameter::ElapsedSecs
            .evaluate(&sc, Some(&base))
            .unwrap();
        assert!((secs - 120.0).abs() < 1e-9);
    }
}

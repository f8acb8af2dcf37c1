//! Core units, constants, and shared primitives for the mission sequence workspace.

/// Physical and time constants expressed in km, s, and days.
pub mod constants {
    /// Seconds per Julian day.
    pub const SECONDS_PER_DAY: f64 = 86_400.0;
    /// Earth gravitational parameter (km³/s²).
    pub const MU_EARTH: f64 = 398_600.441_5;
    /// Sun gravitational parameter (km³/s²).
    pub const MU_SUN: f64 = 1.327_124_400_18e11;
    /// Moon gravitational parameter (km³/s²).
    pub const MU_MOON: f64 = 4_902.800_582_147_8;
    /// Mars gravitational parameter (km³/s²).
    pub const MU_MARS: f64 = 42_828.314;
    /// A.1 modified Julian date of the J2000 epoch.
    pub const J2000_A1_MJD: f64 = 21_545.000_371_5;
    /// Offset between Julian date and the A.1 modified Julian reference used here.
    pub const MJD_OFFSET: f64 = 2_430_000.0;
}

/// Basic unit conversion helpers.
pub mod units {
    /// Convert degrees to radians.
    #[inline]
    pub fn deg_to_rad(v: f64) -> f64 {
        v.to_radians()
    }

    /// Convert radians to degrees.
    #[inline]
    pub fn rad_to_deg(v: f64) -> f64 {
        v.to_degrees()
    }

    /// Wrap an angle in degrees into `[center - 180, center + 180)`.
    #[inline]
    pub fn wrap_degrees(value: f64, center: f64) -> f64 {
        let mut delta = (value - center) % 360.0;
        if delta < -180.0 {
            delta += 360.0;
        } else if delta >= 180.0 {
            delta -= 360.0;
        }
        center + delta
    }
}

/// Epoch handling shared across crates.
///
/// Epochs are A.1 modified Julian dates. A single `f64` holding ~21_545 days
/// only resolves a few tenths of a microsecond, which is coarser than the
/// default stop tolerance, so [`Epoch`] keeps whole days and seconds-of-day
/// apart.
pub mod time {
    use super::constants::SECONDS_PER_DAY;
    use std::fmt;

    /// Convert days to seconds.
    #[inline]
    pub fn days_to_seconds(days: f64) -> f64 {
        days * SECONDS_PER_DAY
    }

    /// Convert seconds to days.
    #[inline]
    pub fn seconds_to_days(seconds: f64) -> f64 {
        seconds / SECONDS_PER_DAY
    }

    /// Split-precision A.1 modified Julian epoch.
    #[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
    pub struct Epoch {
        days: f64,
        seconds: f64,
    }

    impl Epoch {
        /// Build from a modified Julian date.
        pub fn from_mjd(mjd: f64) -> Self {
            let days = mjd.floor();
            Self::normalized(days, (mjd - days) * SECONDS_PER_DAY)
        }

        /// Build from whole days plus seconds; seconds may be any sign or size.
        pub fn from_parts(days: f64, seconds: f64) -> Self {
            Self::normalized(days.floor(), seconds + (days - days.floor()) * SECONDS_PER_DAY)
        }

        fn normalized(mut days: f64, mut seconds: f64) -> Self {
            let carry = (seconds / SECONDS_PER_DAY).floor();
            if carry != 0.0 {
                days += carry;
                seconds -= carry * SECONDS_PER_DAY;
            }
            if seconds >= SECONDS_PER_DAY {
                days += 1.0;
                seconds -= SECONDS_PER_DAY;
            }
            Self { days, seconds }
        }

        /// Modified Julian date (lossy).
        pub fn mjd(&self) -> f64 {
            self.days + self.seconds / SECONDS_PER_DAY
        }

        /// Whole-day component.
        pub fn day_number(&self) -> f64 {
            self.days
        }

        /// Seconds past the start of [`Self::day_number`].
        pub fn seconds_of_day(&self) -> f64 {
            self.seconds
        }

        /// Epoch shifted by `seconds`.
        pub fn add_seconds(&self, seconds: f64) -> Self {
            Self::normalized(self.days, self.seconds + seconds)
        }

        /// Seconds elapsed from `earlier` to `self` (negative when `self` is earlier).
        pub fn seconds_since(&self, earlier: &Epoch) -> f64 {
            (self.days - earlier.days) * SECONDS_PER_DAY + (self.seconds - earlier.seconds)
        }
    }

    impl Default for Epoch {
        fn default() -> Self {
            Self::from_mjd(super::constants::J2000_A1_MJD)
        }
    }

    impl fmt::Display for Epoch {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:.11}", self.mjd())
        }
    }
}

/// Minimal vector helpers to avoid ad-hoc `[f64; 3]` math everywhere.
pub mod vector {
    /// Alias for a 3D vector in kilometres or km/s depending on context.
    pub type Vector3 = [f64; 3];

    /// Euclidean norm of a vector.
    #[inline]
    pub fn norm(v: &Vector3) -> f64 {
        dot(v, v).sqrt()
    }

    /// Dot product of two vectors.
    #[inline]
    pub fn dot(a: &Vector3, b: &Vector3) -> f64 {
        a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
    }

    /// Cross product of two vectors.
    #[inline]
    pub fn cross(a: &Vector3, b: &Vector3) -> Vector3 {
        [
            a[1] * b[2] - a[2] * b[1],
            a[2] * b[0] - a[0] * b[2],
            a[0] * b[1] - a[1] * b[0],
        ]
    }

    /// Vector subtraction.
    #[inline]
    pub fn sub(a: &Vector3, b: &Vector3) -> Vector3 {
        [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
    }

    /// Scale a vector by a scalar.
    #[inline]
    pub fn scale(v: &Vector3, s: f64) -> Vector3 {
        [v[0] * s, v[1] * s, v[2] * s]
    }

    /// Split a six-element state into position and velocity.
    #[inline]
    pub fn split_state(state: &[f64]) -> (Vector3, Vector3) {
        (
            [state[0], state[1], state[2]],
            [state[3], state[4], state[5]],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::time::Epoch;
    use super::units::wrap_degrees;

    #[test]
    fn epoch_keeps_sub_microsecond_offsets() {
        let base = Epoch::from_mjd(21_545.0);
        let later = base.add_seconds(60.0).add_seconds(1.0e-9);
        assert!((later.seconds_since(&base) - 60.000_000_001).abs() < 1e-12);
    }

    #[test]
    fn epoch_normalizes_negative_offsets() {
        let base = Epoch::from_mjd(21_545.5);
        let earlier = base.add_seconds(-86_400.0 * 1.25);
        assert_eq!(earlier.day_number(), 21_544.0);
        assert!((earlier.seconds_of_day() - 21_600.0).abs() < 1e-9);
    }

    #[test]
    fn wrap_keeps_values_near_center() {
        assert!((wrap_degrees(359.0, 0.0) + 1.0).abs() < 1e-12);
        assert!((wrap_degrees(1.0, 360.0) - 361.0).abs() < 1e-12);
        assert!((wrap_degrees(90.0, 90.0) - 90.0).abs() < 1e-12);
    }
}

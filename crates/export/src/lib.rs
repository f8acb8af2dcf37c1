//! Export subscribers for published mission data.

mod error;
pub mod ephemeris;
pub mod report;

pub use ephemeris::EphemerisJson;
pub use error::ExportError;
pub use report::ReportSubscriber;

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use mcs_core::constants::SECONDS_PER_DAY;

/// Modified Julian date of 2000-01-01 12:00:00 in the published time scale.
const MJD_AT_NOON_2000: f64 = 21_545.0;

/// Create a writer for the target path, handling stdout (`-`) by convention.
pub fn writer_for_path(path: &Path) -> io::Result<Box<dyn Write>> {
    if path == Path::new("-") {
        return Ok(Box::new(BufWriter::new(io::stdout())));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    Ok(Box::new(BufWriter::new(file)))
}

/// Calendar form of an A.1 modified Julian date, e.g. `01 Jan 2000 12:00:00.000`.
pub fn gregorian(mjd: f64) -> Result<String, ExportError> {
    let noon = NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .ok_or(ExportError::EpochRange(mjd))?;
    let millis = ((mjd - MJD_AT_NOON_2000) * SECONDS_PER_DAY * 1_000.0).round();
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
        return Err(ExportError::EpochRange(mjd));
    }
    let at: NaiveDateTime = TimeDelta::try_milliseconds(millis as i64)
        .and_then(|delta| noon.checked_add_signed(delta))
        .ok_or(ExportError::EpochRange(mjd))?;
    Ok(at.format("%d %b %Y %H:%M:%S%.3f").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gregorian_matches_reference_epochs() {
        assert_eq!(gregorian(21_545.0).unwrap(), "01 Jan 2000 12:00:00.000");
        assert_eq!(gregorian(21_545.5).unwrap(), "02 Jan 2000 00:00:00.000");
        assert_eq!(gregorian(21_544.25).unwrap(), "31 Dec 1999 18:00:00.000");
    }

    #[test]
    fn nonsense_epochs_are_rejected() {
        assert!(matches!(gregorian(f64::NAN), Err(ExportError::EpochRange(_))));
    }
}

//! Per-spacecraft JSON ephemeris built from published propagation samples.

use std::io::Write;
use std::path::{Path, PathBuf};

use mcs_command::{PenAction, Sample, StreamInfo, Subscriber};
use serde::Serialize;
use tracing::debug;

use crate::{ExportError, writer_for_path};

const CARTESIAN: [&str; 6] = ["X", "Y", "Z", "VX", "VY", "VZ"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EphemerisPoint {
    pub epoch_a1_mjd: f64,
    pub position_km: [f64; 3],
    pub velocity_km_s: [f64; 3],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpacecraftEphemeris {
    pub name: String,
    pub points: Vec<EphemerisPoint>,
}

#[derive(Debug, Serialize)]
struct EphemerisDocument<'a> {
    time_system: &'static str,
    spacecraft: &'a [SpacecraftEphemeris],
}

/// Where one owner's epoch and Cartesian state sit in a stream.
#[derive(Debug, Clone)]
struct OwnerColumns {
    owner: String,
    epoch: usize,
    state: [usize; 6],
}

/// Records every spacecraft state a stream carries while the pen is down.
///
/// Samples published with the pen up (solver perturbation passes) are left out,
/// so the file shows only nominal trajectories.
#[derive(Debug)]
pub struct EphemerisJson {
    name: String,
    path: PathBuf,
    layouts: Vec<(StreamInfo, Vec<OwnerColumns>)>,
    spacecraft: Vec<SpacecraftEphemeris>,
    pen_down: bool,
}

impl EphemerisJson {
    pub fn new(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
            layouts: Vec::new(),
            spacecraft: Vec::new(),
            pen_down: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn spacecraft(&self) -> &[SpacecraftEphemeris] {
        &self.spacecraft
    }

    pub fn write(&self) -> Result<(), ExportError> {
        let mut writer = writer_for_path(&self.path)?;
        let document = EphemerisDocument {
            time_system: "A1ModJulian",
            spacecraft: &self.spacecraft,
        };
        serde_json::to_writer_pretty(&mut writer, &document)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        debug!(path = %self.path.display(), spacecraft = self.spacecraft.len(), "ephemeris written");
        Ok(())
    }

    fn entry(&mut self, owner: &str) -> &mut SpacecraftEphemeris {
        let index = match self.spacecraft.iter().position(|s| s.name == owner) {
            Some(index) => index,
            None => {
                self.spacecraft.push(SpacecraftEphemeris {
                    name: owner.to_string(),
                    points: Vec::new(),
                });
                self.spacecraft.len() - 1
            }
        };
        &mut self.spacecraft[index]
    }
}

fn owner_columns(info: &StreamInfo) -> Vec<OwnerColumns> {
    let find = |label: String| info.labels.iter().position(|l| *l == label);
    info.owners
        .iter()
        .filter_map(|owner| {
            let epoch = find(format!("{owner}.A1ModJulian"))?;
            let mut state = [0; 6];
            for (slot, element) in state.iter_mut().zip(CARTESIAN) {
                *slot = find(format!("{owner}.{element}"))?;
            }
            Some(OwnerColumns {
                owner: owner.clone(),
                epoch,
                state,
            })
        })
        .collect()
}

impl Subscriber for EphemerisJson {
    fn name(&self) -> &str {
        &self.name
    }

    fn register_stream(&mut self, info: &StreamInfo) {
        let columns = owner_columns(info);
        match self.layouts.iter_mut().find(|(known, _)| known.id == info.id) {
            Some(existing) => *existing = (info.clone(), columns),
            None => self.layouts.push((info.clone(), columns)),
        }
    }

    fn receive(&mut self, sample: &Sample) -> Result<(), String> {
        if !self.pen_down {
            return Ok(());
        }
        let columns = self
            .layouts
            .iter()
            .find(|(info, _)| info.id == sample.stream)
            .map(|(_, columns)| columns.clone())
            .ok_or_else(|| format!("stream {} was never registered", sample.stream.0))?;
        for column in columns {
            let value = |index: usize| {
                sample
                    .values
                    .get(index)
                    .copied()
                    .ok_or_else(|| format!("sample for {} is missing column {index}", column.owner))
            };
            let s = &column.state;
            let point = EphemerisPoint {
                epoch_a1_mjd: value(column.epoch)?,
                position_km: [value(s[0])?, value(s[1])?, value(s[2])?],
                velocity_km_s: [value(s[3])?, value(s[4])?, value(s[5])?],
                is_final: sample.is_final,
            };
            self.entry(&column.owner).points.push(point);
        }
        Ok(())
    }

    fn pen_action(&mut self, action: PenAction) {
        match action {
            PenAction::PenUp => self.pen_down = false,
            PenAction::PenDown => self.pen_down = true,
            _ => {}
        }
    }

    fn flush(&mut self) -> Result<(), String> {
        self.write().map_err(|err| err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcs_command::StreamId;

    fn stream(owners: &[&str]) -> StreamInfo {
        let mut labels = Vec::new();
        for owner in owners {
            labels.push(format!("{owner}.A1ModJulian"));
            labels.extend(CARTESIAN.iter().map(|e| format!("{owner}.{e}")));
        }
        StreamInfo {
            id: StreamId(0),
            owners: owners.iter().map(|o| o.to_string()).collect(),
            labels,
        }
    }

    fn sample(values: Vec<f64>, is_final: bool) -> Sample {
        Sample {
            stream: StreamId(0),
            epoch_mjd: values[0],
            values,
            is_final,
        }
    }

    #[test]
    fn samples_split_by_owner() {
        let mut eph = EphemerisJson::new("Eph", "-");
        eph.register_stream(&stream(&["A", "B"]));
        let values = vec![
            21_545.0, 7_000.0, 0.0, 0.0, 0.0, 7.5, 0.0, //
            21_545.0, 8_000.0, 0.0, 0.0, 0.0, 7.0, 0.0,
        ];
        eph.receive(&sample(values, true)).unwrap();
        let craft = eph.spacecraft();
        assert_eq!(craft.len(), 2);
        assert_eq!(craft[1].name, "B");
        assert_eq!(craft[1].points[0].position_km, [8_000.0, 0.0, 0.0]);
        assert!(craft[0].points[0].is_final);
    }

    #[test]
    fn perturbation_passes_are_skipped() {
        let mut eph = EphemerisJson::new("Eph", "-");
        eph.register_stream(&stream(&["A"]));
        let values = vec![21_545.0, 7_000.0, 0.0, 0.0, 0.0, 7.5, 0.0];
        eph.pen_action(PenAction::PenUp);
        eph.receive(&sample(values.clone(), false)).unwrap();
        eph.pen_action(PenAction::PenDown);
        eph.receive(&sample(values, false)).unwrap();
        assert_eq!(eph.spacecraft()[0].points.len(), 1);
    }

    #[test]
    fn writes_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("eph.json");
        let mut eph = EphemerisJson::new("Eph", &path);
        eph.register_stream(&stream(&["A"]));
        eph.receive(&sample(vec![21_545.5, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0], true))
            .unwrap();
        eph.flush().unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["time_system"], "A1ModJulian");
        assert_eq!(parsed["spacecraft"][0]["points"][0]["velocity_km_s"][2], 6.0);
        assert_eq!(parsed["spacecraft"][0]["points"][0]["is_final"], true);
    }
}

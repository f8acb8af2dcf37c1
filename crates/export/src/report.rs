//! CSV report of published samples, one row per sample.

use std::path::{Path, PathBuf};

use mcs_command::{Sample, StreamInfo, Subscriber};
use tracing::debug;

use crate::{ExportError, gregorian, writer_for_path};

const FIXED_COLUMNS: [&str; 3] = ["A1ModJulian", "A1Gregorian", "Final"];

#[derive(Debug, Clone, PartialEq)]
struct Row {
    epoch_mjd: f64,
    is_final: bool,
    /// `(column, value)` pairs; columns index [`ReportSubscriber::columns`].
    cells: Vec<(usize, f64)>,
}

/// Collects samples and writes them as CSV when the publisher flushes.
///
/// Columns are the union of every registered label, in registration order;
/// cells a sample's stream does not carry are left empty.
#[derive(Debug)]
pub struct ReportSubscriber {
    name: String,
    path: PathBuf,
    final_only: bool,
    streams: Vec<StreamInfo>,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl ReportSubscriber {
    pub fn new(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
            final_only: false,
            streams: Vec::new(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Report only the samples a propagation ends on.
    pub fn final_only(mut self, final_only: bool) -> Self {
        self.final_only = final_only;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn column_index(&mut self, label: &str) -> usize {
        match self.columns.iter().position(|c| c == label) {
            Some(index) => index,
            None => {
                self.columns.push(label.to_string());
                self.columns.len() - 1
            }
        }
    }

    pub fn write(&self) -> Result<(), ExportError> {
        let mut writer = csv::Writer::from_writer(writer_for_path(&self.path)?);
        let header: Vec<&str> = FIXED_COLUMNS
            .iter()
            .copied()
            .chain(self.columns.iter().map(String::as_str))
            .collect();
        writer.write_record(&header)?;
        for row in &self.rows {
            let mut record = vec![
                format!("{:.11}", row.epoch_mjd),
                gregorian(row.epoch_mjd)?,
                row.is_final.to_string(),
            ];
            let mut cells = vec![String::new(); self.columns.len()];
            for (column, value) in &row.cells {
                cells[*column] = value.to_string();
            }
            record.extend(cells);
            writer.write_record(&record)?;
        }
        writer.flush()?;
        debug!(path = %self.path.display(), rows = self.rows.len(), "report written");
        Ok(())
    }
}

impl Subscriber for ReportSubscriber {
    fn name(&self) -> &str {
        &self.name
    }

    fn register_stream(&mut self, info: &StreamInfo) {
        for label in &info.labels {
            self.column_index(label);
        }
        match self.streams.iter_mut().find(|s| s.id == info.id) {
            Some(existing) => *existing = info.clone(),
            None => self.streams.push(info.clone()),
        }
    }

    fn receive(&mut self, sample: &Sample) -> Result<(), String> {
        if self.final_only && !sample.is_final {
            return Ok(());
        }
        let labels = self
            .streams
            .iter()
            .find(|s| s.id == sample.stream)
            .map(|s| s.labels.clone())
            .ok_or_else(|| format!("stream {} was never registered", sample.stream.0))?;
        let cells = labels
            .iter()
            .zip(&sample.values)
            .map(|(label, value)| (self.column_index(label), *value))
            .collect();
        self.rows.push(Row {
            epoch_mjd: sample.epoch_mjd,
            is_final: sample.is_final,
            cells,
        });
        Ok(())
    }

    fn flush(&mut self) -> Result<(), String> {
        self.write().map_err(|err| err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcs_command::StreamId;

    #[test]
    fn rows_fill_the_union_of_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let mut report = ReportSubscriber::new("Report", &path);
        report.register_stream(&StreamInfo {
            id: StreamId(0),
            owners: vec!["A".into()],
            labels: vec!["A.X".into()],
        });
        report.register_stream(&StreamInfo {
            id: StreamId(1),
            owners: vec!["B".into()],
            labels: vec!["B.X".into()],
        });
        for (stream, value) in [(0, 1.5), (1, -2.0)] {
            report
                .receive(&Sample {
                    stream: StreamId(stream),
                    epoch_mjd: 21_545.0,
                    values: vec![value],
                    is_final: stream == 1,
                })
                .unwrap();
        }
        report.flush().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "A1ModJulian,A1Gregorian,Final,A.X,B.X");
        assert_eq!(lines[1], "21545.00000000000,01 Jan 2000 12:00:00.000,false,1.5,");
        assert_eq!(lines[2], "21545.00000000000,01 Jan 2000 12:00:00.000,true,,-2");
    }

    #[test]
    fn unregistered_streams_are_rejected() {
        let mut report = ReportSubscriber::new("Report", "-");
        let err = report
            .receive(&Sample {
                stream: StreamId(3),
                epoch_mjd: 21_545.0,
                values: vec![],
                is_final: false,
            })
            .unwrap_err();
        assert!(err.contains("never registered"), "{err}");
    }
}

//! Binned median/CI traces read by the visualisation layer.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::models::records::EnrichedRecord;
use crate::models::run::{PayloadMode, TransmitterPair};
use crate::table::fields::{format_optional, parse_integral, parse_optional_field};
use crate::table::CsvTable;

/// Which variable is binned. The other one is held fixed per trace file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum TraceKind {
    /// PRR against time delta, one file per power delta.
    TimeDelta,
    /// PRR against power delta, one file per time delta.
    PowerDelta,
}

impl TraceKind {
    pub const ALL: [TraceKind; 2] = [TraceKind::TimeDelta, TraceKind::PowerDelta];

    pub fn grid_column(&self) -> &'static str {
        match self {
            TraceKind::TimeDelta => "TimeDelta",
            TraceKind::PowerDelta => "PowerDelta",
        }
    }

    /// Value of the binned variable for a record.
    pub fn binned_value(&self, record: &EnrichedRecord) -> Option<i64> {
        match self {
            TraceKind::TimeDelta => Some(record.reception.time_delta),
            TraceKind::PowerDelta => record.power_delta,
        }
    }

    /// Value of the held variable for a record.
    pub fn held_value(&self, record: &EnrichedRecord) -> Option<i64> {
        match self {
            TraceKind::TimeDelta => record.power_delta,
            TraceKind::PowerDelta => Some(record.reception.time_delta),
        }
    }

    fn file_prefix(&self) -> &'static str {
        match self {
            TraceKind::TimeDelta => "TimeDeltaTraces",
            TraceKind::PowerDelta => "PowerDeltaTraces",
        }
    }

    pub fn file_name(&self, pair: TransmitterPair, payload: PayloadMode, held: i64) -> String {
        format!(
            "{}_{}_{}_({held}).csv",
            self.file_prefix(),
            pair.label(),
            payload.label()
        )
    }

    /// Inverse of [`TraceKind::file_name`]. `None` for anything that is not a
    /// trace file of this kind.
    pub fn parse_file_name(&self, name: &str) -> Option<(TransmitterPair, PayloadMode, i64)> {
        let rest = name
            .strip_prefix(self.file_prefix())?
            .strip_prefix('_')?
            .strip_suffix(").csv")?;
        let mut parts = rest.splitn(3, '_');
        let pair = TransmitterPair::from_label(parts.next()?).ok()?;
        let payload = PayloadMode::from_label(parts.next()?).ok()?;
        let held = parts.next()?.strip_prefix('(')?.parse().ok()?;
        Some((pair, payload, held))
    }
}

/// Median and CI band of one bin for one mode. All three are undefined for an
/// empty bin; the bounds alone may be undefined for a small one.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TraceCell {
    pub median: Option<f64>,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRow {
    pub grid_value: i64,
    /// One cell per mode, in the table's mode order.
    pub cells: Vec<TraceCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceTable {
    pub kind: TraceKind,
    pub modes: Vec<String>,
    pub rows: Vec<TraceRow>,
}

impl TraceTable {
    pub fn headers(&self) -> Vec<String> {
        let mut headers = vec![self.kind.grid_column().to_string()];
        for mode in &self.modes {
            headers.push(format!("median_{mode}"));
            headers.push(format!("LB_{mode}"));
            headers.push(format!("UB_{mode}"));
        }
        headers
    }

    pub fn to_csv_string(&self) -> String {
        let mut table = CsvTable::new(self.headers());
        table.rows = self
            .rows
            .iter()
            .map(|row| {
                let mut fields = vec![row.grid_value.to_string()];
                for cell in &row.cells {
                    fields.push(format_optional(cell.median));
                    fields.push(format_optional(cell.lower));
                    fields.push(format_optional(cell.upper));
                }
                fields
            })
            .collect();
        table.to_csv_string()
    }

    pub fn parse(text: &str, kind: TraceKind, artifact: &str) -> Result<Self> {
        let table = CsvTable::parse(text, artifact)?;
        let grid_column = table
            .column(kind.grid_column())
            .ok_or_else(|| PipelineError::malformed(artifact, format!("missing column {}", kind.grid_column())))?;

        let modes: Vec<String> = table
            .headers
            .iter()
            .filter_map(|header| header.strip_prefix("median_").map(str::to_string))
            .collect();

        let mut columns = Vec::with_capacity(modes.len());
        for mode in &modes {
            let find = |prefix: &str| {
                table.column(&format!("{prefix}_{mode}")).ok_or_else(|| {
                    PipelineError::malformed(artifact, format!("missing column {prefix}_{mode}"))
                })
            };
            columns.push((find("median")?, find("LB")?, find("UB")?));
        }

        let mut rows = Vec::with_capacity(table.rows.len());
        for fields in &table.rows {
            let mut cells = Vec::with_capacity(modes.len());
            for &(median, lower, upper) in &columns {
                cells.push(TraceCell {
                    median: parse_optional_field(&fields[median], "median")?,
                    lower: parse_optional_field(&fields[lower], "LB")?,
                    upper: parse_optional_field(&fields[upper], "UB")?,
                });
            }
            rows.push(TraceRow {
                grid_value: parse_integral(&fields[grid_column], kind.grid_column())?,
                cells,
            });
        }

        Ok(Self { kind, modes, rows })
    }

    /// Cells of one mode alongside their grid value.
    pub fn mode_series(&self, mode: &str) -> Option<Vec<(i64, TraceCell)>> {
        let position = self.modes.iter().position(|m| m == mode)?;
        Some(
            self.rows
                .iter()
                .map(|row| (row.grid_value, row.cells[position]))
                .collect(),
        )
    }
}

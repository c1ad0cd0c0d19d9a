//! Read side for the visualisation layer: the global table and trace files.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::models::{GlobalRow, PayloadMode, TraceKind, TraceTable, TransmitterPair};
use crate::pipeline::DatasetAssembler;
use crate::store::{ArtifactKey, ArtifactStore};
use crate::table;

/// Equality filters over the global table; `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowFilter {
    pub pair: Option<TransmitterPair>,
    pub payload: Option<PayloadMode>,
    pub mode: Option<i64>,
    pub time_delta: Option<i64>,
    pub power_delta: Option<i64>,
}

impl RowFilter {
    pub fn matches(&self, row: &GlobalRow) -> bool {
        let record = &row.record;
        self.pair.map_or(true, |pair| record.pair == pair)
            && self.payload.map_or(true, |payload| record.payload == payload)
            && self.mode.map_or(true, |mode| record.reception.mode == mode)
            && self
                .time_delta
                .map_or(true, |delta| record.reception.time_delta == delta)
            && self
                .power_delta
                .map_or(true, |delta| record.power_delta == Some(delta))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TraceLookup {
    Available(TraceTable),
    /// No trace was computed for this triple.
    NotAvailable { key: ArtifactKey },
}

impl TraceLookup {
    pub fn table(&self) -> Option<&TraceTable> {
        match self {
            TraceLookup::Available(table) => Some(table),
            TraceLookup::NotAvailable { .. } => None,
        }
    }
}

pub struct DatasetReader<'a> {
    derived: &'a dyn ArtifactStore,
    traces: &'a dyn ArtifactStore,
}

impl<'a> DatasetReader<'a> {
    pub fn new(
        derived: &'a dyn ArtifactStore,
        traces: &'a dyn ArtifactStore,
    ) -> Self {
        Self { derived, traces }
    }

    /// Rows of the persisted snapshot matching `filter`. `Ok(None)` when no
    /// snapshot has been assembled yet.
    pub fn global_table(&self, filter: &RowFilter) -> Result<Option<Vec<GlobalRow>>> {
        let key = DatasetAssembler::snapshot_key();
        let Some(text) = self.derived.read(&key)? else {
            return Ok(None);
        };
        let rows: Vec<GlobalRow> = table::decode(&text, &key.to_string())?;
        Ok(Some(rows.into_iter().filter(|row| filter.matches(row)).collect()))
    }

    pub fn trace(
        &self,
        kind: TraceKind,
        pair: TransmitterPair,
        payload: PayloadMode,
        held: i64,
    ) -> Result<TraceLookup> {
        let key = ArtifactKey::for_trace(kind, pair, payload, held);
        match self.traces.read(&key)? {
            Some(text) => Ok(TraceLookup::Available(TraceTable::parse(
                &text,
                kind,
                &key.to_string(),
            )?)),
            None => Ok(TraceLookup::NotAvailable { key }),
        }
    }
}

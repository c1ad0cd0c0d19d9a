//! Fixed-grid median/CI traces over the global table.
//!
//! Bins are exact-value buckets: a grid point collects the records whose
//! binned variable equals it. Every trace file has one row per grid point,
//! empty bins included.
//!
//! A manifest next to the traces records a SHA-256 digest of the global table
//! they were binned from. Traces from any other table are rebuilt, and files
//! for groups that no longer exist are removed.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{GridSpec, PipelineConfig};
use crate::models::{
    EnrichedRecord, GlobalRow, PayloadMode, TraceCell, TraceKind, TraceRow, TraceTable,
    TransmitterPair,
};
use crate::pipeline::Recompute;
use crate::registry::ModeRegistry;
use crate::stats::{sorted_median, two_sided_bound};
use crate::store::{ArtifactKey, ArtifactStore, TRACE_MANIFEST_FILE};
use crate::table;
use crate::{log_debug, log_info, log_warn};

const ENABLE_LOGS: bool = true;

/// (pair, payload, held value) identifying one trace file.
pub type TraceGroup = (TransmitterPair, PayloadMode, i64);

#[derive(Debug, Clone, Default)]
pub struct TraceReport {
    pub written: Vec<ArtifactKey>,
    pub reused: Vec<ArtifactKey>,
    /// Trace files whose group is gone from the global table.
    pub removed: Vec<ArtifactKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceManifest {
    /// Hex SHA-256 of the encoded global table.
    pub snapshot_sha256: String,
    pub rows: usize,
    pub generated_at: DateTime<Utc>,
}

/// Digest of the global table as it is persisted.
pub fn snapshot_digest(rows: &[GlobalRow]) -> String {
    format!("{:x}", Sha256::digest(table::encode(rows).as_bytes()))
}

pub struct TraceBinner<'a> {
    traces: &'a dyn ArtifactStore,
    registry: &'a ModeRegistry,
    config: &'a PipelineConfig,
}

impl<'a> TraceBinner<'a> {
    pub fn new(
        traces: &'a dyn ArtifactStore,
        registry: &'a ModeRegistry,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            traces,
            registry,
            config,
        }
    }

    pub fn manifest_key() -> ArtifactKey {
        ArtifactKey::root().child(TRACE_MANIFEST_FILE)
    }

    /// An unreadable manifest counts as absent, which forces a rebuild.
    pub fn read_manifest(&self) -> Result<Option<TraceManifest>> {
        let key = Self::manifest_key();
        let Some(text) = self.traces.read(&key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&text) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(err) => {
                log_warn!("{key}: ignoring unreadable trace manifest: {err}");
                Ok(None)
            }
        }
    }

    /// Writes both trace variants for `rows`, one report per
    /// [`TraceKind::ALL`] entry. Traces binned from a different global table
    /// are rebuilt whatever `recompute` says.
    pub fn write_all(&self, rows: &[GlobalRow], recompute: Recompute) -> Result<Vec<TraceReport>> {
        let digest = snapshot_digest(rows);
        let current = self
            .read_manifest()?
            .is_some_and(|manifest| manifest.snapshot_sha256 == digest);

        let recompute = if current {
            recompute
        } else {
            log_info!("traces do not match the global table, rebuilding");
            recompute.max(Recompute::DerivedOnly)
        };

        let mut reports = Vec::with_capacity(TraceKind::ALL.len());
        for kind in TraceKind::ALL {
            reports.push(self.write_traces(kind, rows, recompute)?);
        }

        if !current {
            let manifest = TraceManifest {
                snapshot_sha256: digest,
                rows: rows.len(),
                generated_at: Utc::now(),
            };
            let key = Self::manifest_key();
            self.traces
                .write(&key, &serde_json::to_string_pretty(&manifest)?)
                .with_context(|| format!("failed to persist {key}"))?;
        }
        Ok(reports)
    }

    pub fn grid(&self, kind: TraceKind) -> &GridSpec {
        match kind {
            TraceKind::TimeDelta => &self.config.time_delta_grid,
            TraceKind::PowerDelta => &self.config.power_delta_grid,
        }
    }

    /// Records grouped per trace file. Records without a held value (power
    /// delta undefined) belong to no group.
    pub fn groups<'r>(
        &self,
        kind: TraceKind,
        rows: &'r [GlobalRow],
    ) -> BTreeMap<TraceGroup, Vec<&'r EnrichedRecord>> {
        let mut groups: BTreeMap<TraceGroup, Vec<&EnrichedRecord>> = BTreeMap::new();
        for row in rows {
            let record = &row.record;
            if let Some(held) = kind.held_value(record) {
                groups
                    .entry((record.pair, record.payload, held))
                    .or_default()
                    .push(record);
            }
        }
        groups
    }

    /// One trace table for one group.
    pub fn bin_group(&self, kind: TraceKind, records: &[&EnrichedRecord]) -> Result<TraceTable> {
        let grid = self.grid(kind);
        let mut buckets: HashMap<(i64, i64), Vec<f64>> = HashMap::new();
        let mut off_grid = 0usize;
        for record in records {
            if let Some(value) = kind.binned_value(record) {
                if !grid.contains(value) {
                    off_grid += 1;
                    continue;
                }
                buckets
                    .entry((record.reception.mode, value))
                    .or_default()
                    .push(record.prr);
            }
        }
        if off_grid > 0 {
            log_debug!("{kind:?}: {off_grid} record(s) fall outside the grid");
        }

        let mut rows = Vec::new();
        for grid_value in grid.points() {
            let mut cells = Vec::with_capacity(self.registry.modes().len());
            for mode in self.registry.modes() {
                let cell = match buckets.get_mut(&(mode.id, grid_value)) {
                    Some(samples) => {
                        samples.sort_by(f64::total_cmp);
                        self.summarize(samples)?
                    }
                    None => TraceCell::default(),
                };
                cells.push(cell);
            }
            rows.push(TraceRow { grid_value, cells });
        }

        Ok(TraceTable {
            kind,
            modes: self.registry.modes().iter().map(|m| m.name.clone()).collect(),
            rows,
        })
    }

    /// Median and CI band of a sorted bin.
    pub fn summarize(&self, sorted: &[f64]) -> Result<TraceCell> {
        let (lower, upper) = two_sided_bound(
            sorted.len(),
            self.config.ci_percentile,
            self.config.ci_confidence,
        )?;
        Ok(TraceCell {
            median: sorted_median(sorted),
            lower: lower.map(|index| sorted[index]),
            upper: upper.map(|index| sorted[index]),
        })
    }

    /// Writes one trace file per group. With [`Recompute::None`] existing
    /// files are left alone; at any higher level, files of this kind for
    /// groups absent from `rows` are removed.
    pub fn write_traces(
        &self,
        kind: TraceKind,
        rows: &[GlobalRow],
        recompute: Recompute,
    ) -> Result<TraceReport> {
        let mut report = TraceReport::default();
        let groups = self.groups(kind, rows);
        let live: BTreeSet<TraceGroup> = groups.keys().copied().collect();

        for ((pair, payload, held), records) in groups {
            let key = ArtifactKey::for_trace(kind, pair, payload, held);
            if !recompute.at_least(Recompute::DerivedOnly) && self.traces.contains(&key)? {
                log_debug!("{key}: trace retrieved (not computed)");
                report.reused.push(key);
                continue;
            }

            let table = self
                .bin_group(kind, &records)
                .with_context(|| format!("failed to bin {key}"))?;
            self.traces
                .write(&key, &table.to_csv_string())
                .with_context(|| format!("failed to persist {key}"))?;
            report.written.push(key);
        }

        if recompute.at_least(Recompute::DerivedOnly) {
            report.removed = self.remove_orphans(kind, &live)?;
        }

        log_info!(
            "{:?} traces: {} written, {} reused, {} removed",
            kind,
            report.written.len(),
            report.reused.len(),
            report.removed.len()
        );
        Ok(report)
    }

    fn remove_orphans(&self, kind: TraceKind, live: &BTreeSet<TraceGroup>) -> Result<Vec<ArtifactKey>> {
        let mut removed = Vec::new();
        for pair in TransmitterPair::ALL {
            for payload in PayloadMode::ALL {
                let folder = ArtifactKey::new([pair.folder(), payload.folder()]);
                for name in self.traces.children(&folder)? {
                    let Some(group) = kind.parse_file_name(&name) else {
                        continue;
                    };
                    if group.0 != pair || group.1 != payload || live.contains(&group) {
                        continue;
                    }
                    let key = folder.child(name);
                    if self.traces.remove(&key)? {
                        log_debug!("{key}: removed trace of a vanished group");
                        removed.push(key);
                    }
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReceptionRecord;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    fn row(mode: i64, time_delta: i64, power_delta: Option<i64>, prr: f64) -> GlobalRow {
        GlobalRow {
            index: 0,
            record: EnrichedRecord {
                reception: ReceptionRecord {
                    exp_count: 0,
                    mode,
                    tx_power_a: 0,
                    tx_power_b: 0,
                    time_delta,
                    rx_count: 0,
                    tx_count: 1,
                },
                rssi_a: None,
                rssi_b: None,
                prr,
                power_delta,
                date_time: NaiveDate::from_ymd_opt(2020, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
                payload: PayloadMode::Same,
                pair: TransmitterPair::A,
            },
        }
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            time_delta_grid: GridSpec {
                min: -10,
                max: 10,
                step: 5,
                excluded: vec![5],
            },
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn every_grid_point_gets_a_row() {
        let config = small_config();
        let registry = ModeRegistry::standard();
        let store = MemoryStore::new();
        let binner = TraceBinner::new(&store, &registry, &config);

        let rows = vec![row(0, 0, Some(2), 80.0), row(0, 0, Some(2), 90.0)];
        let groups = binner.groups(TraceKind::TimeDelta, &rows);
        let records = &groups[&(TransmitterPair::A, PayloadMode::Same, 2)];
        let table = binner.bin_group(TraceKind::TimeDelta, records).unwrap();

        let grid: Vec<i64> = table.rows.iter().map(|r| r.grid_value).collect();
        assert_eq!(grid, vec![-10, -5, 0, 10]);

        let zigbee = table.mode_series("ZigBee").unwrap();
        assert_eq!(zigbee[0].1, TraceCell::default());
        assert_eq!(zigbee[2].1.median, Some(85.0));
        // Two samples cannot support a 75% two-sided band.
        assert_eq!(zigbee[2].1.lower, None);
        assert_eq!(zigbee[2].1.upper, None);
    }

    #[test]
    fn twenty_sample_bin_uses_ranks_six_and_thirteen() {
        let config = PipelineConfig::default();
        let registry = ModeRegistry::standard();
        let store = MemoryStore::new();
        let binner = TraceBinner::new(&store, &registry, &config);

        let sorted: Vec<f64> = (0..20).map(|i| i as f64 * 5.0).collect();
        let cell = binner.summarize(&sorted).unwrap();
        assert_eq!(cell.median, Some(47.5));
        assert_eq!(cell.lower, Some(30.0));
        assert_eq!(cell.upper, Some(65.0));
    }

    #[test]
    fn rows_without_power_delta_are_left_out_of_power_groups() {
        let config = small_config();
        let registry = ModeRegistry::standard();
        let store = MemoryStore::new();
        let binner = TraceBinner::new(&store, &registry, &config);

        let rows = vec![row(1, 0, None, 10.0), row(1, 0, Some(-3), 20.0)];
        let time_groups = binner.groups(TraceKind::TimeDelta, &rows);
        assert_eq!(time_groups.len(), 1);

        // Held at time delta 0, the undefined power delta just misses every bin.
        let power_groups = binner.groups(TraceKind::PowerDelta, &rows);
        let table = binner
            .bin_group(TraceKind::PowerDelta, &power_groups[&(TransmitterPair::A, PayloadMode::Same, 0)])
            .unwrap();
        assert_eq!(table.rows.len(), 33);
        let ble_1m = table.mode_series("BLE_1M").unwrap();
        let filled: Vec<i64> = ble_1m
            .iter()
            .filter(|(_, cell)| cell.median.is_some())
            .map(|(value, _)| *value)
            .collect();
        assert_eq!(filled, vec![-3]);
    }

    #[test]
    fn existing_traces_are_kept_unless_recomputed() {
        let config = small_config();
        let registry = ModeRegistry::standard();
        let store = MemoryStore::new();
        let binner = TraceBinner::new(&store, &registry, &config);
        let rows = vec![row(0, -5, Some(1), 50.0)];

        let first = binner.write_traces(TraceKind::TimeDelta, &rows, Recompute::None).unwrap();
        assert_eq!(first.written.len(), 1);
        let second = binner.write_traces(TraceKind::TimeDelta, &rows, Recompute::None).unwrap();
        assert_eq!(second.reused, first.written);
        binner
            .write_traces(TraceKind::TimeDelta, &rows, Recompute::DerivedOnly)
            .unwrap();
        assert_eq!(store.write_count(&first.written[0]), 2);
    }

    #[test]
    fn traces_follow_the_table_they_were_binned_from() {
        let config = small_config();
        let registry = ModeRegistry::standard();
        let store = MemoryStore::new();
        let binner = TraceBinner::new(&store, &registry, &config);
        let key = ArtifactKey::for_trace(TraceKind::TimeDelta, TransmitterPair::A, PayloadMode::Same, 1);

        let rows = vec![row(0, -5, Some(1), 50.0)];
        binner.write_all(&rows, Recompute::None).unwrap();
        let manifest = binner.read_manifest().unwrap().unwrap();
        assert_eq!(manifest.snapshot_sha256, snapshot_digest(&rows));

        let reports = binner.write_all(&rows, Recompute::None).unwrap();
        assert!(reports.iter().all(|report| report.written.is_empty()));
        assert_eq!(store.write_count(&key), 1);

        // Same groups, different PRR: the table changed, so the trace does too.
        let changed = vec![row(0, -5, Some(1), 10.0)];
        let reports = binner.write_all(&changed, Recompute::None).unwrap();
        assert_eq!(reports[0].written, vec![key.clone()]);
        assert_eq!(store.write_count(&key), 2);
        assert_eq!(
            binner.read_manifest().unwrap().unwrap().snapshot_sha256,
            snapshot_digest(&changed)
        );
    }

    #[test]
    fn rebuild_removes_traces_of_vanished_groups() {
        let config = small_config();
        let registry = ModeRegistry::standard();
        let store = MemoryStore::new();
        let binner = TraceBinner::new(&store, &registry, &config);
        let old = ArtifactKey::for_trace(TraceKind::TimeDelta, TransmitterPair::A, PayloadMode::Same, 1);
        let new = ArtifactKey::for_trace(TraceKind::TimeDelta, TransmitterPair::A, PayloadMode::Same, 3);
        let unrelated = ArtifactKey::new(["transmitter_pair_a", "same_data", "notes.txt"]);
        store.write(&unrelated, "keep").unwrap();

        binner
            .write_traces(TraceKind::TimeDelta, &[row(0, -5, Some(1), 50.0)], Recompute::None)
            .unwrap();

        let rows = [row(0, -5, Some(3), 50.0)];
        let kept = binner.write_traces(TraceKind::TimeDelta, &rows, Recompute::None).unwrap();
        assert!(kept.removed.is_empty());
        assert!(store.contains(&old).unwrap());

        let report = binner
            .write_traces(TraceKind::TimeDelta, &rows, Recompute::DerivedOnly)
            .unwrap();
        assert_eq!(report.removed, vec![old.clone()]);
        assert!(!store.contains(&old).unwrap());
        assert!(store.contains(&new).unwrap());
        assert!(store.contains(&unrelated).unwrap());
    }

    #[test]
    fn off_grid_values_are_not_binned() {
        let config = small_config();
        let registry = ModeRegistry::standard();
        let store = MemoryStore::new();
        let binner = TraceBinner::new(&store, &registry, &config);

        // 5 is excluded from the grid and 7 is off the step.
        let rows = vec![row(0, 5, Some(1), 40.0), row(0, 7, Some(1), 60.0), row(0, 10, Some(1), 80.0)];
        let groups = binner.groups(TraceKind::TimeDelta, &rows);
        let table = binner
            .bin_group(TraceKind::TimeDelta, &groups[&(TransmitterPair::A, PayloadMode::Same, 1)])
            .unwrap();
        let filled: Vec<(i64, Option<f64>)> = table
            .mode_series("ZigBee")
            .unwrap()
            .into_iter()
            .filter(|(_, cell)| cell.median.is_some())
            .map(|(value, cell)| (value, cell.median))
            .collect();
        assert_eq!(filled, vec![(10, Some(80.0))]);
    }
}

//! Cleans one run's raw logs into the canonical schema.
//!
//! Two artifacts come out per run: the cleaned reception table and the
//! per-configuration median signal strength. Both are rebuilt only at
//! [`Recompute::FromRaw`] or when missing.

use std::collections::BTreeMap;

use anyhow::{Context, Result};

use crate::config::TimeDeltaFix;
use crate::error::PipelineError;
use crate::models::{MedianRssi, ReceptionRecord, RunId, SignalSample};
use crate::pipeline::Recompute;
use crate::stats::sorted_median;
use crate::store::{
    ArtifactKey, ArtifactStore, CLEAN_RECEPTION_FILE, MEDIAN_RSSI_FILE, RAW_RECEPTION_FILE,
    RAW_SIGNAL_FILE,
};
use crate::table::fields::parse_integral;
use crate::table::{self, CsvTable};
use crate::{log_debug, log_info, log_warn};

const ENABLE_LOGS: bool = true;

const RECEPTION_RENAMES: &[(&str, &str)] = &[
    ("Experiment Number", "ExpCount"),
    ("TX Power A", "TxPowerA"),
    ("TX Power B", "TxPowerB"),
    ("Time Delta", "TimeDelta"),
    ("Packets Received", "RxCount"),
    ("Packets Transmitted", "TxCount"),
];

const SIGNAL_RENAMES: &[(&str, &str)] = &[("TX Power", "TxPower")];

/// Marker the logger writes when no signal strength was captured.
const UNAVAILABLE_RSSI: &str = "NONE";

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRun {
    pub reception: Vec<ReceptionRecord>,
    pub medians: Vec<MedianRssi>,
}

pub struct MeasurementNormalizer<'a> {
    raw: &'a dyn ArtifactStore,
    derived: &'a dyn ArtifactStore,
    fix: Option<TimeDeltaFix>,
}

impl<'a> MeasurementNormalizer<'a> {
    pub fn new(
        raw: &'a dyn ArtifactStore,
        derived: &'a dyn ArtifactStore,
        fix: Option<TimeDeltaFix>,
    ) -> Self {
        Self { raw, derived, fix }
    }

    pub fn normalize(&self, run: &RunId, recompute: Recompute) -> Result<NormalizedRun> {
        let clean_key = ArtifactKey::for_run(run, CLEAN_RECEPTION_FILE);
        let median_key = ArtifactKey::for_run(run, MEDIAN_RSSI_FILE);

        if !recompute.at_least(Recompute::FromRaw) {
            if let (Some(clean), Some(medians)) =
                (self.derived.read(&clean_key)?, self.derived.read(&median_key)?)
            {
                log_debug!("{run}: normalized tables retrieved (not computed)");
                return Ok(NormalizedRun {
                    reception: table::decode(&clean, &clean_key.to_string())?,
                    medians: table::decode(&medians, &median_key.to_string())?,
                });
            }
            log_info!("{run}: no normalized tables cached, computing");
        } else {
            log_info!("{run}: recomputing normalized tables from raw logs");
        }

        let medians = median_rssi(&self.signal_samples(run)?);
        let reception = self.clean_reception(run)?;

        self.derived
            .write(&median_key, &table::encode(&medians))
            .with_context(|| format!("failed to persist median signal strength for {run}"))?;
        self.derived
            .write(&clean_key, &table::encode(&reception))
            .with_context(|| format!("failed to persist cleaned reception table for {run}"))?;

        Ok(NormalizedRun { reception, medians })
    }

    fn read_raw(&self, run: &RunId, file: &str) -> Result<(ArtifactKey, CsvTable)> {
        let key = ArtifactKey::for_run(run, file);
        let text = self.raw.read(&key)?.ok_or_else(|| PipelineError::MissingRawInput {
            run: run.to_string(),
            file: file.to_string(),
        })?;
        let table = CsvTable::parse(&text, &key.to_string())?;
        Ok((key, table))
    }

    fn clean_reception(&self, run: &RunId) -> Result<Vec<ReceptionRecord>> {
        let (key, mut raw) = self.read_raw(run, RAW_RECEPTION_FILE)?;
        raw.rename_columns(RECEPTION_RENAMES);

        // Row order is still the logger's order here; the fix depends on it.
        let mut records: Vec<ReceptionRecord> = table::decode_table(&raw, &key.to_string())?;
        if let Some(fix) = self.fix {
            let corrected = apply_time_delta_fix(&mut records, fix);
            if corrected > 0 {
                log_warn!("{run}: corrected {corrected} mis-recorded time delta value(s)");
            }
        }

        for record in &records {
            record
                .validate()
                .map_err(|err| PipelineError::malformed(&key, err))?;
        }
        Ok(records)
    }

    fn signal_samples(&self, run: &RunId) -> Result<Vec<SignalSample>> {
        let (key, mut raw) = self.read_raw(run, RAW_SIGNAL_FILE)?;
        raw.rename_columns(SIGNAL_RENAMES);
        let artifact = key.to_string();

        let mut samples = Vec::with_capacity(raw.rows.len());
        let mut unavailable = 0usize;
        for row in raw.row_views(&artifact) {
            let rssi = row.get("RSSI")?;
            if rssi.is_empty() || rssi.eq_ignore_ascii_case(UNAVAILABLE_RSSI) {
                unavailable += 1;
                continue;
            }
            samples.push(SignalSample {
                mode: parse_integral(row.get("Mode")?, "Mode")?,
                transmitter: parse_integral(row.get("Transmitter")?, "Transmitter")?,
                tx_power: parse_integral(row.get("TxPower")?, "TxPower")?,
                rssi: parse_integral(rssi, "RSSI")?,
            });
        }
        log_debug!("{run}: dropped {unavailable} unavailable signal strength sample(s)");
        Ok(samples)
    }
}

/// Restores `-misrecorded` on rows logged as `+misrecorded` right after a
/// `preceding` row. Only that adjacent pattern is touched; compares against
/// the original sequence, so a corrected row never triggers its successor.
pub fn apply_time_delta_fix(records: &mut [ReceptionRecord], fix: TimeDeltaFix) -> usize {
    let original: Vec<i64> = records.iter().map(|r| r.time_delta).collect();
    let mut corrected = 0;
    for index in 1..records.len() {
        if original[index - 1] == fix.preceding && original[index] == fix.misrecorded {
            records[index].time_delta = -fix.misrecorded;
            corrected += 1;
        }
    }
    corrected
}

/// Median signal strength per (mode, transmitter, transmit power), sorted by
/// that key.
pub fn median_rssi(samples: &[SignalSample]) -> Vec<MedianRssi> {
    let mut groups: BTreeMap<(i64, i64, i64), Vec<f64>> = BTreeMap::new();
    for sample in samples {
        groups
            .entry((sample.mode, sample.transmitter, sample.tx_power))
            .or_default()
            .push(sample.rssi as f64);
    }

    groups
        .into_iter()
        .filter_map(|((mode, transmitter, tx_power), mut values)| {
            values.sort_by(f64::total_cmp);
            sorted_median(&values).map(|median_rssi| MedianRssi {
                mode,
                transmitter,
                tx_power,
                median_rssi,
            })
        })
        .collect()
}

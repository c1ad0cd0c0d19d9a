//! Joins a run's cleaned reception table with its median signal strength and
//! derives power delta and PRR.

use std::collections::HashMap;

use anyhow::{Context, Result};

use crate::models::records::{ROLE_SENDER_A, ROLE_SENDER_B};
use crate::models::{EnrichedRecord, MedianRssi, ReceptionRecord, RunId};
use crate::pipeline::normalizer::MeasurementNormalizer;
use crate::pipeline::Recompute;
use crate::store::{ArtifactKey, ArtifactStore, ENRICHED_FILE};
use crate::table;
use crate::{log_debug, log_info};

const ENABLE_LOGS: bool = true;

pub struct RunAggregator<'a> {
    normalizer: MeasurementNormalizer<'a>,
    derived: &'a dyn ArtifactStore,
}

impl<'a> RunAggregator<'a> {
    pub fn new(normalizer: MeasurementNormalizer<'a>, derived: &'a dyn ArtifactStore) -> Self {
        Self {
            normalizer,
            derived,
        }
    }

    /// Enriched records for `run`, from cache unless `recompute` asks for at
    /// least [`Recompute::DerivedOnly`]. The same level is passed down, so
    /// [`Recompute::FromRaw`] rebuilds the normalized tables first.
    pub fn aggregate(&self, run: &RunId, recompute: Recompute) -> Result<Vec<EnrichedRecord>> {
        let key = ArtifactKey::for_run(run, ENRICHED_FILE);

        if !recompute.at_least(Recompute::DerivedOnly) {
            if let Some(cached) = self.derived.read(&key)? {
                log_debug!("{run}: enriched table retrieved (not computed)");
                return table::decode(&cached, &key.to_string());
            }
            log_info!("{run}: no enriched table cached, computing");
        } else {
            log_info!("{run}: recomputing enriched table ({})", recompute.as_str());
        }

        let normalized = self.normalizer.normalize(run, recompute)?;
        let records = enrich(run, &normalized.reception, &normalized.medians);

        self.derived
            .write(&key, &table::encode(&records))
            .with_context(|| format!("failed to persist enriched table for {run}"))?;

        Ok(records)
    }
}

/// Joins signal strength onto each reception record and tags it with the
/// run's metadata. Missing medians leave the strength, and with it the power
/// delta, undefined; the row is kept.
pub fn enrich(run: &RunId, reception: &[ReceptionRecord], medians: &[MedianRssi]) -> Vec<EnrichedRecord> {
    let lookup: HashMap<(i64, i64, i64), f64> = medians
        .iter()
        .map(|m| ((m.mode, m.transmitter, m.tx_power), m.median_rssi))
        .collect();

    reception
        .iter()
        .map(|record| {
            let rssi_a = lookup
                .get(&(record.mode, ROLE_SENDER_A, record.tx_power_a))
                .copied();
            let rssi_b = lookup
                .get(&(record.mode, ROLE_SENDER_B, record.tx_power_b))
                .copied();

            EnrichedRecord {
                reception: record.clone(),
                rssi_a,
                rssi_b,
                prr: packet_reception_ratio(record.rx_count, record.tx_count),
                power_delta: power_delta(rssi_a, rssi_b),
                date_time: run.timestamp,
                payload: run.payload,
                pair: run.pair,
            }
        })
        .collect()
}

/// Sender B minus sender A, whichever sender leads in time. Rounded half to
/// even, after the subtraction.
pub fn power_delta(rssi_a: Option<f64>, rssi_b: Option<f64>) -> Option<i64> {
    match (rssi_a, rssi_b) {
        (Some(a), Some(b)) => Some((b - a).round_ties_even() as i64),
        _ => None,
    }
}

pub fn packet_reception_ratio(rx_count: i64, tx_count: i64) -> f64 {
    100.0 * rx_count as f64 / tx_count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PayloadMode, TransmitterPair};
    use crate::store::{MemoryStore, CLEAN_RECEPTION_FILE, MEDIAN_RSSI_FILE, RAW_RECEPTION_FILE, RAW_SIGNAL_FILE};

    fn run() -> RunId {
        RunId::from_segments("transmitter_pair_b", "different_data", "20210704_153000").unwrap()
    }

    fn record(time_delta: i64, tx_power_a: i64, tx_power_b: i64) -> ReceptionRecord {
        ReceptionRecord {
            exp_count: 0,
            mode: 2,
            tx_power_a,
            tx_power_b,
            time_delta,
            rx_count: 1,
            tx_count: 3,
        }
    }

    fn medians() -> Vec<MedianRssi> {
        vec![
            MedianRssi { mode: 2, transmitter: ROLE_SENDER_A, tx_power: -8, median_rssi: -60.0 },
            MedianRssi { mode: 2, transmitter: ROLE_SENDER_B, tx_power: -4, median_rssi: -50.0 },
        ]
    }

    #[test]
    fn power_delta_is_b_minus_a_for_either_time_order() {
        let enriched = enrich(&run(), &[record(20, -8, -4), record(-20, -8, -4), record(0, -8, -4)], &medians());
        for row in &enriched {
            assert_eq!(row.power_delta, Some(10));
        }
    }

    #[test]
    fn missing_medians_propagate_as_undefined() {
        let enriched = enrich(&run(), &[record(5, -8, 0)], &medians());
        assert_eq!(enriched.len(), 1);
        assert_eq!(enriched[0].rssi_a, Some(-60.0));
        assert_eq!(enriched[0].rssi_b, None);
        assert_eq!(enriched[0].power_delta, None);
    }

    #[test]
    fn rounding_happens_after_subtraction() {
        // -50.5 - (-60.5) is exactly 10; rounding each side first would give 9 or 11.
        assert_eq!(power_delta(Some(-60.5), Some(-50.5)), Some(10));
        assert_eq!(power_delta(Some(-60.0), Some(-50.5)), Some(10));
        assert_eq!(power_delta(Some(-60.0), Some(-48.5)), Some(12));
    }

    #[test]
    fn prr_keeps_fractions_and_metadata_is_tagged() {
        let enriched = enrich(&run(), &[record(0, -8, -4)], &medians());
        let row = &enriched[0];
        assert!((row.prr - 100.0 / 3.0).abs() < 1e-12);
        assert_eq!(row.pair, TransmitterPair::B);
        assert_eq!(row.payload, PayloadMode::Different);
        assert_eq!(row.date_time.to_string(), "2021-07-04 15:30:00");
    }

    #[test]
    fn derived_only_reuses_normalized_tables() {
        let raw = MemoryStore::new();
        let derived = MemoryStore::new();
        let run = run();
        raw.write(
            &ArtifactKey::for_run(&run, RAW_RECEPTION_FILE),
            "Experiment Number,Mode,TX Power A,TX Power B,Time Delta,Packets Received,Packets Transmitted\n0,2,-8,-4,0,1,2\n",
        )
        .unwrap();
        raw.write(
            &ArtifactKey::for_run(&run, RAW_SIGNAL_FILE),
            "Mode,Transmitter,TX Power,RSSI\n2,0,-8,-60\n2,1,-4,-50\n",
        )
        .unwrap();

        let aggregator = RunAggregator::new(MeasurementNormalizer::new(&raw, &derived, None), &derived);
        let enriched_key = ArtifactKey::for_run(&run, ENRICHED_FILE);
        let median_key = ArtifactKey::for_run(&run, MEDIAN_RSSI_FILE);
        let clean_key = ArtifactKey::for_run(&run, CLEAN_RECEPTION_FILE);

        let first = aggregator.aggregate(&run, Recompute::None).unwrap();
        assert_eq!(first[0].prr, 50.0);
        aggregator.aggregate(&run, Recompute::None).unwrap();
        assert_eq!(derived.write_count(&enriched_key), 1);

        aggregator.aggregate(&run, Recompute::DerivedOnly).unwrap();
        assert_eq!(derived.write_count(&enriched_key), 2);
        assert_eq!(derived.write_count(&median_key), 1);
        assert_eq!(derived.write_count(&clean_key), 1);

        aggregator.aggregate(&run, Recompute::FromRaw).unwrap();
        assert_eq!(derived.write_count(&enriched_key), 3);
        assert_eq!(derived.write_count(&median_key), 2);
        assert_eq!(derived.write_count(&clean_key), 2);
    }
}

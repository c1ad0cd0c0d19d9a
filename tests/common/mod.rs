#![allow(dead_code)]

use std::sync::Arc;

use prr_traces_lib::config::PipelineConfig;
use prr_traces_lib::models::RunId;
use prr_traces_lib::pipeline::{Pipeline, Stores};
use prr_traces_lib::registry::ModeRegistry;
use prr_traces_lib::store::{ArtifactKey, ArtifactStore, MemoryStore, RAW_RECEPTION_FILE, RAW_SIGNAL_FILE};

/// (experiment, mode, tx power A, tx power B, time delta, received, transmitted)
pub type ReceptionRow = (i64, i64, i64, i64, i64, i64, i64);

/// (mode, transmitter role, tx power, rssi or "NONE")
pub type SignalRow<'a> = (i64, i64, i64, &'a str);

pub fn run_id(pair: &str, payload: &str, timestamp: &str) -> RunId {
    RunId::from_segments(pair, payload, timestamp).unwrap()
}

pub fn write_raw_run(store: &dyn ArtifactStore, run: &RunId, reception: &[ReceptionRow], signal: &[SignalRow<'_>]) {
    let mut prr = String::from(
        "Experiment Number , Mode , TX Power A , TX Power B , Time Delta , Packets Received , Packets Transmitted\n",
    );
    for (exp, mode, power_a, power_b, time_delta, rx, tx) in reception {
        prr.push_str(&format!("{exp} , {mode} , {power_a} , {power_b} , {time_delta} , {rx} , {tx}\n"));
    }
    store
        .write(&ArtifactKey::for_run(run, RAW_RECEPTION_FILE), &prr)
        .unwrap();

    let mut rssi = String::from("Mode , Transmitter , TX Power , RSSI\n");
    for (mode, role, power, value) in signal {
        rssi.push_str(&format!("{mode} , {role} , {power} , {value}\n"));
    }
    store
        .write(&ArtifactKey::for_run(run, RAW_SIGNAL_FILE), &rssi)
        .unwrap();
}

pub struct MemoryPipeline {
    pub raw: Arc<MemoryStore>,
    pub derived: Arc<MemoryStore>,
    pub traces: Arc<MemoryStore>,
    pub pipeline: Pipeline,
}

pub fn memory_pipeline(raw: Arc<MemoryStore>) -> MemoryPipeline {
    let derived = Arc::new(MemoryStore::new());
    let traces = Arc::new(MemoryStore::new());
    let stores = Stores {
        raw: raw.clone(),
        derived: derived.clone(),
        traces: traces.clone(),
    };
    MemoryPipeline {
        raw,
        derived,
        traces,
        pipeline: Pipeline::new(PipelineConfig::default(), ModeRegistry::standard(), stores),
    }
}

pub fn same_payload_run() -> RunId {
    run_id("transmitter_pair_a", "same_data", "20200101_100000")
}

pub fn different_payload_run() -> RunId {
    run_id("transmitter_pair_a", "different_data", "20200102_100000")
}

/// Two runs of five rows each. The same-payload run has medians -60 (A) and
/// -50 (B); the different-payload run has no sender-B readings at all.
pub fn seed_two_runs(store: &dyn ArtifactStore) {
    write_raw_run(
        store,
        &same_payload_run(),
        &[
            (0, 0, -8, -4, -20, 50, 100),
            (1, 0, -8, -4, -10, 60, 100),
            (2, 0, -8, -4, 0, 70, 100),
            (3, 0, -8, -4, 10, 80, 100),
            (4, 0, -8, -4, 20, 90, 100),
        ],
        &[
            (0, 0, -8, "-60"),
            (0, 0, -8, "-61"),
            (0, 0, -8, "-59"),
            (0, 0, -8, "NONE"),
            (0, 1, -4, "-50"),
            (0, 1, -4, "-50"),
        ],
    );
    write_raw_run(
        store,
        &different_payload_run(),
        &[
            (0, 2, 0, 0, -20, 1, 7),
            (1, 2, 0, 0, -10, 2, 7),
            (2, 2, 0, 0, 0, 3, 7),
            (3, 2, 0, 0, 10, 4, 7),
            (4, 2, 0, 0, 20, 5, 7),
        ],
        &[(2, 0, 0, "-70"), (2, 0, 0, "NONE")],
    );
}

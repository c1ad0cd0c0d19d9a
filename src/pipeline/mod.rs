//! Raw logs to cached tables to binned traces.
//!
//! Stages, leaf first: [`normalizer`] cleans one run's raw logs,
//! [`aggregator`] joins them into enriched records, [`assembler`] concatenates
//! every run into the global table, and [`binner`] turns that table into
//! trace files. Each stage reuses its cached artifacts unless a
//! [`Recompute`] level says otherwise.

pub mod aggregator;
pub mod assembler;
pub mod binner;
pub mod normalizer;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::{PipelineConfig, StoreBackend};
use crate::models::{EnrichedRecord, RunId};
use crate::reader::DatasetReader;
use crate::registry::ModeRegistry;
use crate::store::{ArtifactStore, FileStore, SqliteStore};

pub use aggregator::RunAggregator;
pub use assembler::{AssemblyReport, DatasetAssembler, RunFailure, RunFailureKind};
pub use binner::{snapshot_digest, TraceBinner, TraceManifest, TraceReport};
pub use normalizer::{MeasurementNormalizer, NormalizedRun};

/// How much cached work to throw away. Each level implies the ones below it:
/// recomputing from raw also recomputes every derived table.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "camelCase")]
pub enum Recompute {
    #[default]
    None,
    /// Rebuild the enriched per-run table from cached normalized tables.
    DerivedOnly,
    /// Rebuild the normalized tables from the raw logs, then everything above.
    FromRaw,
}

impl Recompute {
    pub fn at_least(self, level: Recompute) -> bool {
        self >= level
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Recompute::None => "none",
            Recompute::DerivedOnly => "derived-only",
            Recompute::FromRaw => "from-raw",
        }
    }
}

/// A default recompute level plus per-run overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecomputePlan {
    pub default: Recompute,
    pub overrides: BTreeMap<RunId, Recompute>,
}

impl RecomputePlan {
    pub fn uniform(level: Recompute) -> Self {
        Self {
            default: level,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_run(mut self, run: RunId, level: Recompute) -> Self {
        self.overrides.insert(run, level);
        self
    }

    pub fn level_for(&self, run: &RunId) -> Recompute {
        self.overrides
            .get(run)
            .copied()
            .map_or(self.default, |level| level.max(self.default))
    }

    /// Whether any run is asked to recompute; if so the dataset snapshot is
    /// stale too.
    pub fn requests_any(&self) -> bool {
        self.default.at_least(Recompute::DerivedOnly)
            || self
                .overrides
                .values()
                .any(|level| level.at_least(Recompute::DerivedOnly))
    }
}

/// Where each class of artifact lives.
#[derive(Clone)]
pub struct Stores {
    pub raw: Arc<dyn ArtifactStore>,
    pub derived: Arc<dyn ArtifactStore>,
    pub traces: Arc<dyn ArtifactStore>,
}

impl Stores {
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let raw: Arc<dyn ArtifactStore> = Arc::new(FileStore::new(config.raw_root.clone()));
        match config.store_backend {
            StoreBackend::Files => Ok(Self {
                raw,
                derived: Arc::new(FileStore::new(config.derived_root.clone())),
                traces: Arc::new(FileStore::new(config.trace_root.clone())),
            }),
            StoreBackend::Sqlite => {
                let shared: Arc<dyn ArtifactStore> =
                    Arc::new(SqliteStore::open(config.sqlite_path.clone())?);
                Ok(Self {
                    raw,
                    derived: shared.clone(),
                    traces: shared,
                })
            }
        }
    }
}

/// The whole pipeline wired to one configuration.
pub struct Pipeline {
    config: PipelineConfig,
    registry: ModeRegistry,
    stores: Stores,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, registry: ModeRegistry, stores: Stores) -> Self {
        Self {
            config,
            registry,
            stores,
        }
    }

    pub fn from_config(config: PipelineConfig, registry: ModeRegistry) -> Result<Self> {
        let stores = Stores::from_config(&config)?;
        Ok(Self::new(config, registry, stores))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModeRegistry {
        &self.registry
    }

    pub fn normalizer(&self) -> MeasurementNormalizer<'_> {
        MeasurementNormalizer::new(
            self.stores.raw.as_ref(),
            self.stores.derived.as_ref(),
            self.config.time_delta_fix,
        )
    }

    pub fn aggregator(&self) -> RunAggregator<'_> {
        RunAggregator::new(self.normalizer(), self.stores.derived.as_ref())
    }

    pub fn assembler(&self) -> DatasetAssembler<'_> {
        DatasetAssembler::new(
            self.aggregator(),
            self.stores.raw.as_ref(),
            self.stores.derived.as_ref(),
        )
    }

    pub fn binner(&self) -> TraceBinner<'_> {
        TraceBinner::new(self.stores.traces.as_ref(), &self.registry, &self.config)
    }

    pub fn reader(&self) -> DatasetReader<'_> {
        DatasetReader::new(
            self.stores.derived.as_ref(),
            self.stores.traces.as_ref(),
        )
    }

    pub fn aggregate_run(&self, run: &RunId, recompute: Recompute) -> Result<Vec<EnrichedRecord>> {
        self.aggregator().aggregate(run, recompute)
    }

    pub fn assemble(&self, plan: &RecomputePlan) -> Result<AssemblyReport> {
        self.assembler().assemble(plan)
    }

    /// Assemble the dataset, then write both trace variants. Traces are
    /// rebuilt whenever the dataset was rebuilt in this call or since they
    /// were last written, and written fresh if missing.
    pub fn build_traces(&self, plan: &RecomputePlan) -> Result<(AssemblyReport, Vec<TraceReport>)> {
        let assembly = self.assemble(plan)?;
        let recompute = if assembly.from_cache {
            Recompute::None
        } else {
            Recompute::DerivedOnly
        };

        let reports = self.binner().write_all(&assembly.rows, recompute)?;
        Ok((assembly, reports))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PayloadMode, TransmitterPair};
    use chrono::NaiveDate;

    fn run(second: u32) -> RunId {
        let timestamp = NaiveDate::from_ymd_opt(2020, 5, 1)
            .unwrap()
            .and_hms_opt(10, 0, second)
            .unwrap();
        RunId::new(TransmitterPair::A, PayloadMode::Same, timestamp)
    }

    #[test]
    fn levels_are_ordered() {
        assert!(Recompute::FromRaw.at_least(Recompute::DerivedOnly));
        assert!(Recompute::FromRaw.at_least(Recompute::FromRaw));
        assert!(Recompute::DerivedOnly.at_least(Recompute::None));
        assert!(!Recompute::DerivedOnly.at_least(Recompute::FromRaw));
        assert!(!Recompute::None.at_least(Recompute::DerivedOnly));
    }

    #[test]
    fn overrides_never_lower_the_default() {
        let plan = RecomputePlan::uniform(Recompute::DerivedOnly)
            .with_run(run(1), Recompute::None)
            .with_run(run(2), Recompute::FromRaw);
        assert_eq!(plan.level_for(&run(1)), Recompute::DerivedOnly);
        assert_eq!(plan.level_for(&run(2)), Recompute::FromRaw);
        assert_eq!(plan.level_for(&run(3)), Recompute::DerivedOnly);
    }

    #[test]
    fn any_run_override_invalidates_the_snapshot() {
        assert!(!RecomputePlan::default().requests_any());
        assert!(!RecomputePlan::default()
            .with_run(run(1), Recompute::None)
            .requests_any());
        assert!(RecomputePlan::default()
            .with_run(run(1), Recompute::DerivedOnly)
            .requests_any());
    }
}

//! Discovers every run and concatenates their enriched tables.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::error::PipelineError;
use crate::models::{GlobalRow, RunId};
use crate::pipeline::aggregator::RunAggregator;
use crate::pipeline::RecomputePlan;
use crate::store::{ArtifactKey, ArtifactStore, SNAPSHOT_FILE};
use crate::table;
use crate::{log_error, log_info, log_warn};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunFailureKind {
    /// A folder that does not parse as a run identity.
    InvalidIdentity,
    MissingRawInput,
    MalformedInput,
    Other,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFailure {
    /// Folder path relative to the raw root.
    pub location: String,
    pub kind: RunFailureKind,
    pub message: String,
}

impl RunFailure {
    fn from_error(location: String, err: &anyhow::Error) -> Self {
        let kind = match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::InvalidRunIdentity { .. }) => RunFailureKind::InvalidIdentity,
            Some(PipelineError::MissingRawInput { .. }) => RunFailureKind::MissingRawInput,
            Some(PipelineError::MalformedTable { .. }) => RunFailureKind::MalformedInput,
            _ => RunFailureKind::Other,
        };
        Self {
            location,
            kind,
            message: format!("{err:#}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssemblyReport {
    pub rows: Vec<GlobalRow>,
    pub runs: Vec<RunId>,
    pub failures: Vec<RunFailure>,
    /// True when the snapshot was reused and no run was visited.
    pub from_cache: bool,
}

pub struct DatasetAssembler<'a> {
    aggregator: RunAggregator<'a>,
    raw: &'a dyn ArtifactStore,
    derived: &'a dyn ArtifactStore,
}

impl<'a> DatasetAssembler<'a> {
    pub fn new(
        aggregator: RunAggregator<'a>,
        raw: &'a dyn ArtifactStore,
        derived: &'a dyn ArtifactStore,
    ) -> Self {
        Self {
            aggregator,
            raw,
            derived,
        }
    }

    pub fn snapshot_key() -> ArtifactKey {
        ArtifactKey::root().child(SNAPSHOT_FILE)
    }

    /// Walks pair / payload / timestamp folders under the raw root.
    /// Folders that do not name a run are reported, not fatal.
    pub fn discover(&self) -> Result<(Vec<RunId>, Vec<RunFailure>)> {
        let mut runs = Vec::new();
        let mut failures = Vec::new();

        for pair in self.raw.children(&ArtifactKey::root())? {
            let pair_key = ArtifactKey::new([pair.as_str()]);
            for payload in self.raw.children(&pair_key)? {
                let payload_key = pair_key.child(payload.as_str());
                for timestamp in self.raw.children(&payload_key)? {
                    match RunId::from_segments(&pair, &payload, &timestamp) {
                        Ok(run) => runs.push(run),
                        Err(err) => {
                            let location = format!("{pair}/{payload}/{timestamp}");
                            log_warn!("skipping {location}: {err}");
                            failures.push(RunFailure::from_error(location, &anyhow::Error::new(err)));
                        }
                    }
                }
            }
        }

        Ok((runs, failures))
    }

    pub fn assemble(&self, plan: &RecomputePlan) -> Result<AssemblyReport> {
        let key = Self::snapshot_key();

        if !plan.requests_any() {
            if let Some(cached) = self.derived.read(&key)? {
                log_info!("dataset snapshot retrieved (not computed)");
                let rows: Vec<GlobalRow> = table::decode(&cached, &key.to_string())?;
                let mut runs: Vec<RunId> = Vec::new();
                for row in &rows {
                    let run = RunId::new(row.record.pair, row.record.payload, row.record.date_time);
                    if runs.last() != Some(&run) {
                        runs.push(run);
                    }
                }
                return Ok(AssemblyReport {
                    rows,
                    runs,
                    failures: Vec::new(),
                    from_cache: true,
                });
            }
            log_info!("no dataset snapshot cached, computing");
        } else {
            log_info!("recompute requested, rebuilding dataset snapshot");
        }

        let (discovered, mut failures) = self.discover()?;
        let mut runs = Vec::with_capacity(discovered.len());
        let mut rows = Vec::new();

        for run in discovered {
            match self.aggregator.aggregate(&run, plan.level_for(&run)) {
                Ok(records) => {
                    // Dense, discovery-ordered index.
                    let base = rows.len();
                    rows.extend(
                        records
                            .into_iter()
                            .enumerate()
                            .map(|(offset, record)| GlobalRow {
                                index: base + offset,
                                record,
                            }),
                    );
                    runs.push(run);
                }
                Err(err) => {
                    log_error!("{run}: {err:#}");
                    failures.push(RunFailure::from_error(run.to_string(), &err));
                }
            }
        }

        self.derived
            .write(&key, &table::encode(&rows))
            .context("failed to persist dataset snapshot")?;

        log_info!(
            "assembled {} row(s) from {} run(s), {} failure(s)",
            rows.len(),
            runs.len(),
            failures.len()
        );

        Ok(AssemblyReport {
            rows,
            runs,
            failures,
            from_cache: false,
        })
    }
}

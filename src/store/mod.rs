//! Artifact storage.
//!
//! Raw inputs, cached derived tables, and trace files all live behind
//! [`ArtifactStore`]. Keys are derived from run identities, never the other
//! way round, so a store can be a directory tree, a SQLite file, or a map in
//! memory.

mod file;
mod memory;
mod sqlite;

use std::fmt;

use anyhow::Result;

use crate::models::{PayloadMode, RunId, TraceKind, TransmitterPair};

pub use file::FileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub const RAW_RECEPTION_FILE: &str = "prr.csv";
pub const RAW_SIGNAL_FILE: &str = "rssi.csv";
pub const MEDIAN_RSSI_FILE: &str = "medianRSSI.csv";
pub const CLEAN_RECEPTION_FILE: &str = "cleanPRR.csv";
pub const ENRICHED_FILE: &str = "prr.csv";
pub const SNAPSHOT_FILE: &str = "all_runs.csv";
pub const TRACE_MANIFEST_FILE: &str = "trace_manifest.json";

/// Ordered path-like key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactKey {
    segments: Vec<String>,
}

impl ArtifactKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    pub fn for_run(run: &RunId, file: &str) -> Self {
        let mut key = Self::new(run.segments());
        key.segments.push(file.to_string());
        key
    }

    pub fn for_trace(kind: TraceKind, pair: TransmitterPair, payload: PayloadMode, held: i64) -> Self {
        Self::new([
            pair.folder().to_string(),
            payload.folder().to_string(),
            kind.file_name(pair, payload, held),
        ])
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut key = self.clone();
        key.segments.push(segment.into());
        key
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn starts_with(&self, prefix: &ArtifactKey) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

pub trait ArtifactStore {
    /// `Ok(None)` when nothing is stored under `key`.
    fn read(&self, key: &ArtifactKey) -> Result<Option<String>>;

    /// Replaces whatever was stored under `key`.
    fn write(&self, key: &ArtifactKey, contents: &str) -> Result<()>;

    /// Returns whether something was removed.
    fn remove(&self, key: &ArtifactKey) -> Result<bool>;

    /// Sorted names of the entries directly below `prefix`.
    fn children(&self, prefix: &ArtifactKey) -> Result<Vec<String>>;

    fn contains(&self, key: &ArtifactKey) -> Result<bool> {
        Ok(self.read(key)?.is_some())
    }
}

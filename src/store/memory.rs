use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;

use super::{ArtifactKey, ArtifactStore};

#[derive(Default)]
struct MemoryInner {
    entries: BTreeMap<ArtifactKey, String>,
    writes: HashMap<ArtifactKey, usize>,
}

/// In-memory store. Counts writes per key so tests can tell a reused cache
/// entry from a recomputed one.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn write_count(&self, key: &ArtifactKey) -> usize {
        self.lock().writes.get(key).copied().unwrap_or(0)
    }
}

impl ArtifactStore for MemoryStore {
    fn read(&self, key: &ArtifactKey) -> Result<Option<String>> {
        Ok(self.lock().entries.get(key).cloned())
    }

    fn write(&self, key: &ArtifactKey, contents: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.entries.insert(key.clone(), contents.to_string());
        *inner.writes.entry(key.clone()).or_insert(0) += 1;
        Ok(())
    }

    fn remove(&self, key: &ArtifactKey) -> Result<bool> {
        Ok(self.lock().entries.remove(key).is_some())
    }

    fn children(&self, prefix: &ArtifactKey) -> Result<Vec<String>> {
        let depth = prefix.segments().len();
        let names: BTreeSet<String> = self
            .lock()
            .entries
            .keys()
            .filter(|key| key.segments().len() > depth && key.starts_with(prefix))
            .map(|key| key.segments()[depth].clone())
            .collect();
        Ok(names.into_iter().collect())
    }
}

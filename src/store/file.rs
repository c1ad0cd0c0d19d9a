use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};

use super::{ArtifactKey, ArtifactStore};

/// Store rooted at a directory; each key segment is a path component.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        key.segments()
            .iter()
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

impl ArtifactStore for FileStore {
    fn read(&self, key: &ArtifactKey) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn write(&self, key: &ArtifactKey, contents: &str) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))
    }

    fn remove(&self, key: &ArtifactKey) -> Result<bool> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
        }
    }

    fn children(&self, prefix: &ArtifactKey) -> Result<Vec<String>> {
        let dir = self.path_for(prefix);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to list {}", dir.display()))
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_create_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let key = ArtifactKey::new(["transmitter_pair_a", "same_data", "medianRSSI.csv"]);

        assert_eq!(store.read(&key).unwrap(), None);
        store.write(&key, "Mode\n0\n").unwrap();
        assert!(dir
            .path()
            .join("transmitter_pair_a/same_data/medianRSSI.csv")
            .is_file());
        assert_eq!(store.read(&key).unwrap().as_deref(), Some("Mode\n0\n"));
        assert_eq!(
            store.children(&ArtifactKey::new(["transmitter_pair_a"])).unwrap(),
            vec!["same_data"]
        );
        assert!(store.remove(&key).unwrap());
        assert!(!store.remove(&key).unwrap());
    }

    #[test]
    fn listing_a_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("absent"));
        assert!(store.children(&ArtifactKey::root()).unwrap().is_empty());
    }
}

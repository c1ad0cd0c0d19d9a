use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use super::{ArtifactKey, ArtifactStore};

const CURRENT_SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS artifacts (
    key TEXT PRIMARY KEY NOT NULL,
    contents TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// Keeps every artifact as a row of one SQLite file, keyed by the
/// `/`-joined artifact key.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let mut conn = Connection::open(&db_path).context("failed to open SQLite database")?;
        run_migrations(&mut conn).context("failed to run artifact store migrations")?;

        info!("Artifact store initialized at {}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().context("failed to open SQLite database")?;
        run_migrations(&mut conn).context("failed to run artifact store migrations")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn run_migrations(conn: &mut Connection) -> Result<()> {
    let mut version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if version > CURRENT_SCHEMA_VERSION {
        bail!(
            "artifact store version ({}) is newer than supported schema ({})",
            version,
            CURRENT_SCHEMA_VERSION
        );
    }

    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;

    while version < CURRENT_SCHEMA_VERSION {
        let next_version = version + 1;
        apply_migration(&tx, next_version)
            .with_context(|| format!("migration to version {next_version} failed"))?;
        version = next_version;
    }

    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    Ok(())
}

fn apply_migration(tx: &Transaction<'_>, version: i32) -> Result<()> {
    match version {
        1 => {
            tx.execute_batch(SCHEMA_V1)
                .context("failed to create artifacts table")?;
            Ok(())
        }
        other => bail!("no migration defined for version {other}"),
    }
}

impl ArtifactStore for SqliteStore {
    fn read(&self, key: &ArtifactKey) -> Result<Option<String>> {
        self.lock()
            .query_row(
                "SELECT contents FROM artifacts WHERE key = ?1",
                params![key.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("failed to read artifact {key}"))
    }

    fn write(&self, key: &ArtifactKey, contents: &str) -> Result<()> {
        self.lock()
            .execute(
                "INSERT INTO artifacts (key, contents, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     contents = excluded.contents,
                     updated_at = excluded.updated_at",
                params![key.to_string(), contents, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to write artifact {key}"))?;
        Ok(())
    }

    fn remove(&self, key: &ArtifactKey) -> Result<bool> {
        let removed = self
            .lock()
            .execute("DELETE FROM artifacts WHERE key = ?1", params![key.to_string()])
            .with_context(|| format!("failed to remove artifact {key}"))?;
        Ok(removed > 0)
    }

    fn children(&self, prefix: &ArtifactKey) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT key FROM artifacts ORDER BY key ASC")?;
        let mut rows = stmt.query([])?;

        let depth = prefix.segments().len();
        let mut names: Vec<String> = Vec::new();
        while let Some(row) = rows.next()? {
            let stored: String = row.get(0)?;
            let key = ArtifactKey::new(stored.split('/'));
            if key.segments().len() > depth && key.starts_with(prefix) {
                let name = &key.segments()[depth];
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upserts_and_lists_artifacts() {
        let store = SqliteStore::in_memory().unwrap();
        let key = ArtifactKey::new(["transmitter_pair_b", "same_data", "TimeDeltaTraces_B_1_(0).csv"]);

        store.write(&key, "TimeDelta\n0\n").unwrap();
        store.write(&key, "TimeDelta\n5\n").unwrap();
        assert_eq!(store.read(&key).unwrap().as_deref(), Some("TimeDelta\n5\n"));
        assert_eq!(
            store.children(&ArtifactKey::new(["transmitter_pair_b"])).unwrap(),
            vec!["same_data"]
        );
        assert!(store.remove(&key).unwrap());
        assert_eq!(store.read(&key).unwrap(), None);
    }

    #[test]
    fn reopening_keeps_schema_version() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("artifacts.sqlite3");
        {
            let store = SqliteStore::open(path.clone()).unwrap();
            store.write(&ArtifactKey::new(["k"]), "v").unwrap();
        }
        let store = SqliteStore::open(path).unwrap();
        assert_eq!(store.read(&ArtifactKey::new(["k"])).unwrap().as_deref(), Some("v"));
    }
}

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

/// A fixed grid of integer points, `min..=max` every `step`, minus
/// `excluded`.
///
/// Exclusions come only from the config file. The defaults exclude nothing;
/// untested points of a campaign are listed there, and a bin with no samples
/// is written as an empty row either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSpec {
    pub min: i64,
    pub max: i64,
    pub step: i64,
    /// Grid points never exercised by the experiments.
    #[serde(default)]
    pub excluded: Vec<i64>,
}

impl GridSpec {
    pub fn points(&self) -> Vec<i64> {
        if self.step <= 0 || self.min > self.max {
            return Vec::new();
        }
        (self.min..=self.max)
            .step_by(self.step as usize)
            .filter(|point| !self.excluded.contains(point))
            .collect()
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.min
            && value <= self.max
            && self.step > 0
            && (value - self.min) % self.step == 0
            && !self.excluded.contains(&value)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.step <= 0 {
            bail!("{name}: step must be positive, got {}", self.step);
        }
        if self.min > self.max {
            bail!("{name}: min {} exceeds max {}", self.min, self.max);
        }
        Ok(())
    }
}

/// Known data-entry fault: a `-misrecorded` time delta logged as
/// `+misrecorded` on the row right after a `preceding` time delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeDeltaFix {
    pub preceding: i64,
    pub misrecorded: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreBackend {
    /// Plain files mirroring the raw directory layout.
    Files,
    /// Derived artifacts and traces in one SQLite file.
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub raw_root: PathBuf,
    pub derived_root: PathBuf,
    pub trace_root: PathBuf,
    pub store_backend: StoreBackend,
    pub sqlite_path: PathBuf,
    pub ci_percentile: f64,
    pub ci_confidence: f64,
    pub time_delta_grid: GridSpec,
    pub power_delta_grid: GridSpec,
    pub time_delta_fix: Option<TimeDeltaFix>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_root: PathBuf::from("data_raw"),
            derived_root: PathBuf::from("data_preprocessed"),
            trace_root: PathBuf::from("data_preprocessed"),
            store_backend: StoreBackend::Files,
            sqlite_path: PathBuf::from("data_preprocessed/artifacts.sqlite3"),
            ci_percentile: 50.0,
            ci_confidence: 75.0,
            time_delta_grid: GridSpec {
                min: -140,
                max: 140,
                step: 5,
                excluded: Vec::new(),
            },
            power_delta_grid: GridSpec {
                min: -16,
                max: 16,
                step: 1,
                excluded: Vec::new(),
            },
            time_delta_fix: Some(TimeDeltaFix {
                preceding: -10,
                misrecorded: 5,
            }),
        }
    }
}

impl PipelineConfig {
    /// Reads `path` when it exists, otherwise falls back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        } else {
            PipelineConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        self.time_delta_grid.validate("timeDeltaGrid")?;
        self.power_delta_grid.validate("powerDeltaGrid")?;
        if !(self.ci_percentile > 0.0 && self.ci_percentile < 100.0) {
            bail!("ciPercentile must lie strictly between 0 and 100, got {}", self.ci_percentile);
        }
        if !(self.ci_confidence > 0.0 && self.ci_confidence < 100.0) {
            bail!("ciConfidence must lie strictly between 0 and 100, got {}", self.ci_confidence);
        }
        if self.store_backend == StoreBackend::Files {
            // Run folders share file names with derived tables, and trace
            // folders would be mistaken for runs during discovery.
            if self.derived_root == self.raw_root || self.trace_root == self.raw_root {
                bail!(
                    "derivedRoot and traceRoot must differ from rawRoot ({})",
                    self.raw_root.display()
                );
            }
        }
        Ok(())
    }
}

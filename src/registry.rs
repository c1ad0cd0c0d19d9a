//! Immutable lookup tables for the experiment.
//!
//! Built once at start-up and handed to whatever needs them; nothing here is
//! global state.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhyMode {
    /// Column suffix in trace files, e.g. `median_BLE_1M`.
    pub name: String,
    /// Identifier recorded in the raw logs.
    pub id: i64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeRegistry {
    modes: Vec<PhyMode>,
}

impl ModeRegistry {
    pub fn new(modes: Vec<PhyMode>) -> Self {
        Self { modes }
    }

    /// The five radio modes exercised by the experiments, in trace column order.
    pub fn standard() -> Self {
        let mode = |name: &str, id: i64, label: &str| PhyMode {
            name: name.into(),
            id,
            label: label.into(),
        };
        Self::new(vec![
            mode("ZigBee", 0, "IEEE 802.15.4"),
            mode("BLE_2M", 2, "BLE 2 Mbit"),
            mode("BLE_1M", 1, "BLE 1 Mbit"),
            mode("BLE_500K", 4, "BLE 500 Kbit"),
            mode("BLE_125K", 3, "BLE 125 Kbit"),
        ])
    }

    pub fn modes(&self) -> &[PhyMode] {
        &self.modes
    }

    pub fn get(&self, id: i64) -> Option<&PhyMode> {
        self.modes.iter().find(|mode| mode.id == id)
    }

    pub fn require(&self, id: i64) -> Result<&PhyMode, PipelineError> {
        self.get(id).ok_or(PipelineError::UnknownMode(id))
    }

    pub fn by_name(&self, name: &str) -> Option<&PhyMode> {
        self.modes.iter().find(|mode| mode.name == name)
    }
}

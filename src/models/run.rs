//! Run identity.
//!
//! A run is one raw experiment session. Its identity is a value, not a path:
//! storage keys are derived from it by the store layer.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
/// How run timestamps are written into derived tables.
pub const DATETIME_COLUMN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransmitterPair {
    A,
    B,
}

impl TransmitterPair {
    pub const ALL: [TransmitterPair; 2] = [TransmitterPair::A, TransmitterPair::B];

    pub fn folder(&self) -> &'static str {
        match self {
            TransmitterPair::A => "transmitter_pair_a",
            TransmitterPair::B => "transmitter_pair_b",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransmitterPair::A => "A",
            TransmitterPair::B => "B",
        }
    }

    pub fn from_folder(value: &str) -> Result<Self, PipelineError> {
        match value {
            "transmitter_pair_a" => Ok(TransmitterPair::A),
            "transmitter_pair_b" => Ok(TransmitterPair::B),
            other => Err(invalid(other, "expected transmitter_pair_a or transmitter_pair_b")),
        }
    }

    pub fn from_label(value: &str) -> Result<Self, PipelineError> {
        match value {
            "A" => Ok(TransmitterPair::A),
            "B" => Ok(TransmitterPair::B),
            other => Err(invalid(other, "expected transmitter pair label A or B")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PayloadMode {
    Same,
    Different,
}

impl PayloadMode {
    pub const ALL: [PayloadMode; 2] = [PayloadMode::Same, PayloadMode::Different];

    pub fn folder(&self) -> &'static str {
        match self {
            PayloadMode::Same => "same_data",
            PayloadMode::Different => "different_data",
        }
    }

    /// Numeric label stored in the `SamePayload` column.
    pub fn label(&self) -> u8 {
        match self {
            PayloadMode::Same => 1,
            PayloadMode::Different => 0,
        }
    }

    pub fn from_folder(value: &str) -> Result<Self, PipelineError> {
        match value {
            "same_data" => Ok(PayloadMode::Same),
            "different_data" => Ok(PayloadMode::Different),
            other => Err(invalid(other, "expected same_data or different_data")),
        }
    }

    pub fn from_label(value: &str) -> Result<Self, PipelineError> {
        match value {
            "1" => Ok(PayloadMode::Same),
            "0" => Ok(PayloadMode::Different),
            other => Err(invalid(other, "expected payload label 1 or 0")),
        }
    }
}

fn invalid(segment: &str, reason: &str) -> PipelineError {
    PipelineError::InvalidRunIdentity {
        segment: segment.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct RunId {
    pub pair: TransmitterPair,
    pub payload: PayloadMode,
    pub timestamp: NaiveDateTime,
}

impl RunId {
    pub fn new(pair: TransmitterPair, payload: PayloadMode, timestamp: NaiveDateTime) -> Self {
        Self {
            pair,
            payload,
            timestamp,
        }
    }

    /// Parse the three folder names of a raw run directory.
    pub fn from_segments(pair: &str, payload: &str, timestamp: &str) -> Result<Self, PipelineError> {
        let pair = TransmitterPair::from_folder(pair)?;
        let payload = PayloadMode::from_folder(payload)?;
        let timestamp = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
            .map_err(|err| invalid(timestamp, &format!("timestamp not in {TIMESTAMP_FORMAT}: {err}")))?;
        Ok(Self::new(pair, payload, timestamp))
    }

    pub fn timestamp_folder(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn segments(&self) -> [String; 3] {
        [
            self.pair.folder().to_string(),
            self.payload.folder().to_string(),
            self.timestamp_folder(),
        ]
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.pair.folder(),
            self.payload.folder(),
            self.timestamp_folder()
        )
    }
}

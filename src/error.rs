//! Typed errors for the pipeline.
//!
//! Plumbing failures travel as `anyhow::Error` with context attached. The
//! variants here are the ones callers match on: the assembler downcasts a
//! run's failure to decide how to report it.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    #[error("invalid percentile {0}: provide a real number strictly between 0 and 100")]
    InvalidPercentile(f64),

    #[error("invalid confidence {0}: provide a real number strictly between 0 and 100")]
    InvalidConfidence(f64),

    #[error("binomial distribution unavailable: {0}")]
    Distribution(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid run identity segment '{segment}': {reason}")]
    InvalidRunIdentity { segment: String, reason: String },

    #[error("missing raw input {file} for run {run}")]
    MissingRawInput { run: String, file: String },

    #[error("malformed table {artifact}: {reason}")]
    MalformedTable { artifact: String, reason: String },

    #[error("unknown physical-layer mode id {0}")]
    UnknownMode(i64),
}

impl PipelineError {
    pub fn malformed(artifact: impl ToString, reason: impl ToString) -> Self {
        PipelineError::MalformedTable {
            artifact: artifact.to_string(),
            reason: reason.to_string(),
        }
    }
}

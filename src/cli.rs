use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

use crate::models::{PayloadMode, TraceKind, TransmitterPair};
use crate::pipeline::Recompute;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// Path to the pipeline config JSON (defaults are used if it is missing)
    #[arg(long, default_value = "pipeline.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build (or reuse) the global table from every run under the raw root
    Assemble(RecomputeArgs),

    /// Assemble, then write the time-delta and power-delta trace files
    Traces(RecomputeArgs),

    /// Print one trace file
    ShowTrace {
        #[arg(value_enum)]
        kind: TraceKindArg,
        #[arg(value_enum)]
        pair: PairArg,
        #[arg(value_enum)]
        payload: PayloadArg,
        /// Value of the held variable (power delta for time-delta traces)
        #[arg(allow_negative_numbers = true)]
        held: i64,
    },

    /// Print rows of the assembled table
    Query {
        #[arg(long, value_enum)]
        pair: Option<PairArg>,
        #[arg(long, value_enum)]
        payload: Option<PayloadArg>,
        /// Physical-layer mode, by id (e.g. 4) or name (e.g. BLE_500K)
        #[arg(long)]
        mode: Option<String>,
        #[arg(long, allow_negative_numbers = true)]
        time_delta: Option<i64>,
        #[arg(long, allow_negative_numbers = true)]
        power_delta: Option<i64>,
    },

    /// List the physical-layer modes in trace column order
    Modes,

    /// Write the effective config to the --config path
    WriteConfig,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RecomputeArgs {
    /// How much cached work to discard
    #[arg(long, value_enum, default_value_t = RecomputeArg::None)]
    pub recompute: RecomputeArg,

    /// Restrict --recompute to these runs (pair/payload/timestamp folders)
    #[arg(long = "run", value_name = "RUN")]
    pub runs: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeArg {
    None,
    DerivedOnly,
    FromRaw,
}

impl From<RecomputeArg> for Recompute {
    fn from(arg: RecomputeArg) -> Self {
        match arg {
            RecomputeArg::None => Recompute::None,
            RecomputeArg::DerivedOnly => Recompute::DerivedOnly,
            RecomputeArg::FromRaw => Recompute::FromRaw,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKindArg {
    TimeDelta,
    PowerDelta,
}

impl From<TraceKindArg> for TraceKind {
    fn from(arg: TraceKindArg) -> Self {
        match arg {
            TraceKindArg::TimeDelta => TraceKind::TimeDelta,
            TraceKindArg::PowerDelta => TraceKind::PowerDelta,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairArg {
    A,
    B,
}

impl From<PairArg> for TransmitterPair {
    fn from(arg: PairArg) -> Self {
        match arg {
            PairArg::A => TransmitterPair::A,
            PairArg::B => TransmitterPair::B,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadArg {
    Same,
    Different,
}

impl From<PayloadArg> for PayloadMode {
    fn from(arg: PayloadArg) -> Self {
        match arg {
            PayloadArg::Same => PayloadMode::Same,
            PayloadArg::Different => PayloadMode::Different,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recompute_for_selected_runs() {
        let args = Args::try_parse_from([
            "prr-traces",
            "traces",
            "--recompute",
            "from-raw",
            "--run",
            "transmitter_pair_a/same_data/20200101_000000",
        ])
        .unwrap();
        match args.command {
            Command::Traces(recompute) => {
                assert_eq!(Recompute::from(recompute.recompute), Recompute::FromRaw);
                assert_eq!(recompute.runs.len(), 1);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn query_mode_is_taken_verbatim() {
        let args = Args::try_parse_from(["prr-traces", "query", "--mode", "BLE_1M", "--time-delta", "-5"]).unwrap();
        match args.command {
            Command::Query { mode, time_delta, .. } => {
                assert_eq!(mode.as_deref(), Some("BLE_1M"));
                assert_eq!(time_delta, Some(-5));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn negative_held_values_parse() {
        let args = Args::try_parse_from(["prr-traces", "show-trace", "time-delta", "a", "same", "-4"]).unwrap();
        assert!(matches!(args.command, Command::ShowTrace { held: -4, .. }));
    }
}

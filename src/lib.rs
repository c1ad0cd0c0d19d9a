pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod reader;
pub mod registry;
pub mod stats;
pub mod store;
pub mod table;
mod utils;

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use log::{info, warn};

use cli::{Args, Command, RecomputeArgs};
use config::PipelineConfig;
use models::{GlobalRow, RunId, TraceKind};
use pipeline::{Pipeline, Recompute, RecomputePlan};
use reader::{RowFilter, TraceLookup};
use registry::{ModeRegistry, PhyMode};

fn recompute_plan(args: &RecomputeArgs) -> Result<RecomputePlan> {
    let level = Recompute::from(args.recompute);
    if args.runs.is_empty() {
        return Ok(RecomputePlan::uniform(level));
    }

    let mut plan = RecomputePlan::default();
    for run in &args.runs {
        let segments: Vec<&str> = run.trim_matches('/').split('/').collect();
        let [pair, payload, timestamp] = segments.as_slice() else {
            bail!("run '{run}' must look like pair/payload/timestamp");
        };
        plan = plan.with_run(RunId::from_segments(pair, payload, timestamp)?, level);
    }
    Ok(plan)
}

/// Accepts a numeric mode id or a registry name.
fn resolve_mode<'r>(registry: &'r ModeRegistry, value: &str) -> Result<&'r PhyMode> {
    match value.parse::<i64>() {
        Ok(id) => Ok(registry.require(id)?),
        Err(_) => registry
            .by_name(value)
            .ok_or_else(|| anyhow!("unknown mode '{value}'")),
    }
}

fn print_rows(rows: &[GlobalRow]) {
    print!("{}", table::encode(rows));
}

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();
    let config = PipelineConfig::load(&args.config)?;
    let pipeline = Pipeline::from_config(config, ModeRegistry::standard())?;

    match args.command {
        Command::Assemble(recompute) => {
            let report = pipeline.assemble(&recompute_plan(&recompute)?)?;
            info!(
                "global table: {} row(s) from {} run(s){}",
                report.rows.len(),
                report.runs.len(),
                if report.from_cache { " (cached)" } else { "" }
            );
            for failure in &report.failures {
                warn!("{} [{:?}]: {}", failure.location, failure.kind, failure.message);
            }
        }
        Command::Traces(recompute) => {
            let (assembly, traces) = pipeline.build_traces(&recompute_plan(&recompute)?)?;
            for failure in &assembly.failures {
                warn!("{} [{:?}]: {}", failure.location, failure.kind, failure.message);
            }
            for (kind, report) in TraceKind::ALL.iter().zip(&traces) {
                info!(
                    "{:?} traces: {} written, {} reused, {} removed",
                    kind,
                    report.written.len(),
                    report.reused.len(),
                    report.removed.len()
                );
            }
        }
        Command::ShowTrace {
            kind,
            pair,
            payload,
            held,
        } => match pipeline
            .reader()
            .trace(kind.into(), pair.into(), payload.into(), held)?
        {
            TraceLookup::Available(table) => print!("{}", table.to_csv_string()),
            TraceLookup::NotAvailable { key } => {
                bail!("trace {key} is not available; run `traces` first")
            }
        },
        Command::Query {
            pair,
            payload,
            mode,
            time_delta,
            power_delta,
        } => {
            let mode = match mode.as_deref() {
                Some(value) => Some(resolve_mode(pipeline.registry(), value)?.id),
                None => None,
            };
            let filter = RowFilter {
                pair: pair.map(Into::into),
                payload: payload.map(Into::into),
                mode,
                time_delta,
                power_delta,
            };
            match pipeline.reader().global_table(&filter)? {
                Some(rows) => print_rows(&rows),
                None => bail!("no global table has been assembled; run `assemble` first"),
            }
        }
        Command::Modes => {
            println!("id,name,label");
            for mode in pipeline.registry().modes() {
                println!("{},{},{}", mode.id, mode.name, mode.label);
            }
        }
        Command::WriteConfig => {
            pipeline.config().save(&args.config)?;
            info!("config written to {}", args.config.display());
        }
    }

    Ok(())
}

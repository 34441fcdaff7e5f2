// src/lib.rs

pub mod catalog;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod model;
pub mod processing;
pub mod processor;
pub mod store;
pub mod types;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::ConfigFile;
use crate::config::loader::load_and_validate;
use crate::dag::StepGraph;
use crate::engine::{Engine, ExecutionOptions};
use crate::processing::{Processing, ProcessingStatus};
use crate::processor::ProcessorRegistry;

pub use engine::{ExecutionHandle, ExecutionSummary};
pub use errors::{KbflowError, Result as KbflowResult};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - pipeline file loading and validation
/// - the engine over the configured storage
/// - step registration and one project execution
/// - the run summary on stdout
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading pipeline file {:?}", config_path))?;

    if args.dry_run {
        print_dry_run(&cfg)?;
        return Ok(());
    }

    let engine = Engine::open(cfg.store.mode, &cfg.store.path, ProcessorRegistry::with_builtins())?;
    let report = engine.sync_steps(&cfg)?;
    info!(
        created = report.created.len(),
        unchanged = report.unchanged.len(),
        replaced = report.replaced.len(),
        removed = report.removed.len(),
        "synchronised steps"
    );

    let mut resume_from = args.resume.clone();
    for step in &args.resume_latest {
        let processing = engine
            .latest_succeeded(step)?
            .with_context(|| format!("step '{step}' has no successful processing to resume from"))?;
        resume_from.push(processing.id);
    }

    let options = ExecutionOptions {
        wait: true,
        upstream_timeout: cfg.upstream_timeout,
    };
    let handle = engine
        .execute_project(&cfg.project.name, &resume_from, options)
        .await?;

    let mut failed = 0;
    println!("project {}", cfg.project.name);
    for id in handle.processings() {
        let processing = engine.get_processing(*id)?;
        if processing.status == ProcessingStatus::Failed {
            failed += 1;
        }
        println!("{}", summary_line(&processing));
    }

    let unrecorded = handle.summary().map_or(0, |s| s.unrecorded);
    if unrecorded > 0 {
        bail!("{unrecorded} processing(s) could not be recorded in the catalog");
    }
    if failed > 0 {
        bail!("{failed} processing(s) failed");
    }
    Ok(())
}

fn summary_line(p: &Processing) -> String {
    let outcome = match (&p.result_hash, &p.error) {
        (Some(hash), _) => hash.to_string(),
        (None, Some(error)) => format!("{error:#}"),
        (None, None) => String::new(),
    };
    format!("  {:<20} {} {:<11} {}", p.step, p.id, p.status.to_string(), outcome)
}

/// Simple dry-run output: print steps in execution order.
fn print_dry_run(cfg: &ConfigFile) -> Result<()> {
    println!("kbflow dry-run");
    println!("  project = {}", cfg.project.name);
    println!("  store   = {:?} at {:?}", cfg.store.mode, cfg.store.path);
    if let Some(timeout) = cfg.upstream_timeout {
        println!("  upstream_timeout = {timeout:?}");
    }
    println!();

    let project = cfg.project.name.as_str();
    let graph = StepGraph::new(cfg.step_definitions().into_iter().map(|d| d.into_step(project)));
    let order = graph.topological_order()?;

    println!("steps ({}):", order.len());
    for id in &order {
        let Some(step) = graph.step(id) else { continue };
        println!("  - {id} [{}] {}", step.role, step.processor);
        if let Some(ref dataset) = step.dataset {
            println!("      dataset: {dataset}");
        }
        if !step.inputs.is_empty() {
            println!("      inputs: {:?}", step.inputs);
            println!("      lineage: {:?}", graph.dataset_lineage(id));
        }
        if !step.parameters.is_null() {
            println!("      parameters: {}", step.parameters);
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}

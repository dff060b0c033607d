use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;

use labflow::cli::{Cli, Command, RootArgs};
use labflow::store::StoreError;
use labflow::ui::{self, RunProgress};
use labflow::{
    BatchRunner, LabflowConfig, MemoryStore, RollupOptions, RootSelection, RunRecord, UnitId,
    UnitKind,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    let config = match &cli.config {
        Some(path) => LabflowConfig::load_from(path),
        None => LabflowConfig::load(),
    }
    .context("failed to load labflow configuration")?;
    let runner = BatchRunner::new(config);

    let records = match cli.command {
        Command::Rollup { dry_run } => {
            let mut store = load_store(&cli.store)?;
            let record = run(cli.json, "Evaluating billing candidates...", || {
                runner.rollup(&mut store, RollupOptions { dry_run })
            })?;
            if record.is_success() && record.promoted > 0 && !dry_run {
                store
                    .save(&cli.store)
                    .with_context(|| format!("failed to save {}", cli.store.display()))?;
            }
            vec![record]
        }
        Command::Export { roots, out } => {
            let store = load_store(&cli.store)?;
            let (kind, ids) = root_ids(&roots);
            let selection = RootSelection::fetch(&store, kind, &ids)?;
            vec![run(cli.json, "Exporting results...", || {
                runner.export_to_dir(&store, selection, out.as_deref())
            })?]
        }
        Command::Status => {
            let store = load_store(&cli.store)?;
            let status = runner.status(&store)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                ui::print_status(&status, &runner.config().pending_status);
            }
            return Ok(());
        }
        Command::Demo => run_demo(&runner, cli.json)?,
    };

    if records.iter().any(|r| !r.is_success()) {
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(quiet: bool, verbose: bool) -> Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("LABFLOW_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

fn load_store(path: &Path) -> Result<MemoryStore> {
    MemoryStore::load(path).with_context(|| format!("failed to load store {}", path.display()))
}

fn root_ids(roots: &RootArgs) -> (UnitKind, Vec<UnitId>) {
    let (kind, ids) = if !roots.jobs.is_empty() {
        (UnitKind::Job, &roots.jobs)
    } else if !roots.samples.is_empty() {
        (UnitKind::Sample, &roots.samples)
    } else {
        (UnitKind::Test, &roots.tests)
    };
    (kind, ids.iter().map(|id| UnitId::from(id.as_str())).collect())
}

/// Runs one pipeline behind a spinner (or silently with `--json`) and prints its summary.
fn run(json: bool, message: &str, f: impl FnOnce() -> RunRecord) -> Result<RunRecord> {
    if json {
        let record = f();
        ui::print_json(&record).context("failed to serialize run record")?;
        return Ok(record);
    }

    let progress = RunProgress::start(message);
    let record = f();
    progress.complete(&record);
    progress.print_candidates(&record);
    progress.print_skipped_rows(&record);
    Ok(record)
}

// Hierarquia de exemplo: J1 com um teste ainda pendente, J2 com um único resultado.
fn demo_store() -> Result<MemoryStore, StoreError> {
    let mut store = MemoryStore::new();
    store.add_phrase("BILLING_STATUS", "BILLED", "Billed");
    store.add_phrase("BILLING_STATUS", "PENDING", "Pending re-evaluation");
    store.add_phrase("BILLING_STATUS", "RESOLVED", "Resolved");

    store.add_job("J1", Some("PENDING"))?;
    store.add_sample("J1", "S1")?;
    store.add_sample("J1", "S2")?;
    store.add_test("S1", "T1", "PH", Some("BILLED"))?;
    store.add_test("S2", "T2", "CONDUCTIVITY", Some("PENDING"))?;
    store.add_result("T1", "R1", "pH", "7.2")?;
    store.add_result("T2", "R2", "conductivity", "412")?;

    store.add_job("J2", Some("RESOLVED"))?;
    store.add_sample("J2", "S3")?;
    store.add_test("S3", "T3", "PH", Some("BILLED"))?;
    store.add_result("T3", "R3", "pH", "7.0")?;
    Ok(store)
}

fn run_demo(runner: &BatchRunner, json: bool) -> Result<Vec<RunRecord>> {
    let mut store = demo_store()?;
    let mut records = Vec::new();

    records.push(run(json, "Rollup with T2 still pending...", || {
        runner.rollup(&mut store, RollupOptions::default())
    })?);

    store.set_state(UnitKind::Test, &UnitId::from("T2"), "BILLED")?;
    records.push(run(json, "Rollup after billing T2...", || {
        runner.rollup(&mut store, RollupOptions::default())
    })?);

    let out_dir = std::env::temp_dir().join("labflow-demo");
    let selection = RootSelection::fetch(&store, UnitKind::Job, &[UnitId::from("J2")])?;
    records.push(run(json, "Exporting J2...", || {
        runner.export_to_dir(&store, selection, Some(&out_dir))
    })?);

    Ok(records)
}

//! plugdex - crash-safe audio plug-in catalog
//!
//! Main command-line entry point.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plugdex_core::{PluginRecord, PluginType, model, paths};
use plugdex_probe::IgnoreSet;
use plugdex_scan::{Orchestrator, PoolConfig, ScanConfig, ScanSummary, resolve_worker_bin};
use plugdex_store::{Catalog, ScanJournal, ScanStatus, journal};

/// Crash-safe audio plug-in scanner and catalog
#[derive(Parser, Debug)]
#[command(name = "plugdex", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan installed plug-ins into the catalog (resumes automatically
    /// after an interrupted run)
    Scan {
        /// Clear catalog and journal, then scan everything from scratch
        #[arg(long)]
        rescan: bool,

        /// Additional VST3 folders to search
        #[arg(long = "extra-folders", value_name = "DIR", num_args = 1..)]
        extra_folders: Vec<PathBuf>,

        /// Worker pool size (default: CPU count, capped at 8)
        #[arg(long, value_name = "N")]
        workers: Option<usize>,

        /// Per-plug-in deadline in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// List cataloged plug-ins
    List {
        /// Only plug-ins whose name contains this string
        #[arg(long)]
        name: Option<String>,

        /// Only plug-ins whose manufacturer contains this string
        #[arg(long)]
        vendor: Option<String>,

        /// Only plug-ins of this type
        #[arg(long = "type", value_name = "TYPE")]
        plugin_type: Option<PluginType>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Ranked search over names and manufacturers
    Search {
        query: String,

        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Show catalog statistics and storage locations
    Info,

    /// Export the full catalog as JSON
    Json {
        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Export the full catalog as YAML
    Yaml {
        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Delete every record from the catalog
    Clear,

    /// Maintain the ignore set
    Ignore {
        #[command(subcommand)]
        action: IgnoreAction,
    },

    /// Scan a single plug-in file through an isolated worker (debugging)
    ScanOne {
        path: PathBuf,

        /// Deadline in seconds
        #[arg(long, value_name = "SECS", default_value_t = 30)]
        timeout: u64,
    },
}

#[derive(Subcommand, Debug)]
enum IgnoreAction {
    /// Print all ignored plug-in ids
    List,
    /// Add a `<type>/<stem>` id to the ignore set
    Add { id: String },
    /// Remove an id from the ignore set
    Remove { id: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Yaml,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is reserved for command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plugdex=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Scan {
            rescan,
            extra_folders,
            workers,
            timeout,
        } => run_scan(rescan, extra_folders, workers, timeout),
        Command::List {
            name,
            vendor,
            plugin_type,
            format,
        } => run_list(name.as_deref(), vendor.as_deref(), plugin_type, format),
        Command::Search { query, limit } => run_search(&query, limit),
        Command::Info => run_info(),
        Command::Json { output } => run_export(OutputFormat::Json, output.as_deref()),
        Command::Yaml { output } => run_export(OutputFormat::Yaml, output.as_deref()),
        Command::Clear => run_clear(),
        Command::Ignore { action } => run_ignore(&action),
        Command::ScanOne { path, timeout } => run_scan_one(&path, timeout),
    }
}

fn open_catalog() -> Result<Catalog> {
    let data_dir = paths::data_dir()?;
    let catalog_path = paths::catalog_path(&data_dir);
    Catalog::open(&catalog_path)
        .with_context(|| format!("cannot open catalog at {}", catalog_path.display()))
}

fn run_scan(
    rescan: bool,
    extra_folders: Vec<PathBuf>,
    workers: Option<usize>,
    timeout: Option<u64>,
) -> Result<()> {
    let mut config = ScanConfig::new(paths::data_dir()?);
    config.rescan = rescan;
    config.extra_folders = extra_folders;
    if let Some(workers) = workers {
        config.workers = workers.max(1);
    }
    if let Some(secs) = timeout {
        config.timeout = Duration::from_secs(secs.max(1));
    }

    let orchestrator = Orchestrator::new(config);

    // First Ctrl-C quiesces the pool and preserves the journal; a second
    // one aborts outright (the journal survives that too).
    let cancel = orchestrator.cancel_flag();
    ctrlc::set_handler(move || {
        if cancel.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        eprintln!("\nstopping: waiting for running workers (Ctrl-C again to abort)");
    })
    .context("cannot install Ctrl-C handler")?;

    let summary = orchestrator.scan()?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &ScanSummary) {
    let count = |status: ScanStatus| summary.counts.get(&status).copied().unwrap_or(0);
    if summary.cancelled {
        println!("Scan cancelled.");
    } else {
        println!(
            "Scan complete: {} succeeded, {} failed, {} timed out",
            count(ScanStatus::Success),
            count(ScanStatus::Failed),
            count(ScanStatus::Timeout),
        );
    }
    println!(
        "Committed {} records to {}",
        summary.committed,
        summary.catalog_path.display()
    );
    if let Some(journal) = &summary.journal_preserved {
        println!(
            "Journal preserved at {}; run `plugdex scan` to resume",
            journal.display()
        );
    }
}

fn run_list(
    name: Option<&str>,
    vendor: Option<&str>,
    plugin_type: Option<PluginType>,
    format: OutputFormat,
) -> Result<()> {
    let catalog = open_catalog()?;
    let records: Vec<PluginRecord> = match plugin_type {
        Some(plugin_type) => catalog.filter_by_type(plugin_type)?,
        None => catalog.load_all()?.into_values().collect(),
    };

    let name = name.map(str::to_lowercase);
    let vendor = vendor.map(str::to_lowercase);
    let records: Vec<PluginRecord> = records
        .into_iter()
        .filter(|r| {
            name.as_ref()
                .is_none_or(|n| r.name.to_lowercase().contains(n))
        })
        .filter(|r| {
            vendor.as_ref().is_none_or(|v| {
                r.manufacturer
                    .as_ref()
                    .is_some_and(|m| m.to_lowercase().contains(v))
            })
        })
        .collect();

    match format {
        OutputFormat::Table => print_table(&records),
        OutputFormat::Json => {
            let map: std::collections::BTreeMap<&str, &PluginRecord> =
                records.iter().map(|r| (r.id.as_str(), r)).collect();
            println!("{}", serde_json::to_string_pretty(&map)?);
        }
        OutputFormat::Yaml => {
            let map: std::collections::BTreeMap<&str, &PluginRecord> =
                records.iter().map(|r| (r.id.as_str(), r)).collect();
            print!("{}", serde_yml::to_string(&map)?);
        }
    }
    Ok(())
}

fn print_table(records: &[PluginRecord]) {
    if records.is_empty() {
        println!("No plug-ins cataloged. Run `plugdex scan` first.");
        return;
    }
    println!(
        "{:<36} {:<28} {:<22} {:>7}",
        "ID", "NAME", "VENDOR", "PARAMS"
    );
    for record in records {
        println!(
            "{:<36} {:<28} {:<22} {:>7}",
            clip(&record.id, 36),
            clip(&record.name, 28),
            clip(record.manufacturer.as_deref().unwrap_or("-"), 22),
            record.parameters.len(),
        );
    }
    println!("\n{} plug-ins", records.len());
}

fn clip(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

fn run_search(query: &str, limit: usize) -> Result<()> {
    let catalog = open_catalog()?;
    let hits = catalog.search(query, limit)?;
    print_table(&hits);
    Ok(())
}

fn run_info() -> Result<()> {
    let data_dir = paths::data_dir()?;
    let catalog = open_catalog()?;
    let stats = catalog.stats()?;

    println!("Catalog:        {}", paths::catalog_path(&data_dir).display());
    println!("Total plug-ins: {}", stats.total);
    for (plugin_type, count) in &stats.by_type {
        println!("  {plugin_type:<13} {count}");
    }
    println!("With vendor:    {}", stats.with_manufacturer);
    println!("Storage size:   {} bytes", stats.db_size_bytes);

    let ignores = IgnoreSet::load_or_seed(&paths::ignores_path(&data_dir))?;
    println!("Ignored ids:    {}", ignores.len());

    let journal_path = paths::journal_path(&data_dir);
    if journal_path.exists() {
        println!();
        println!(
            "An interrupted scan left a journal at {}; run `plugdex scan` to resume it.",
            journal_path.display()
        );
    }
    Ok(())
}

fn run_export(format: OutputFormat, output: Option<&Path>) -> Result<()> {
    let catalog = open_catalog()?;
    let records = catalog.load_all()?;
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&records)?,
        OutputFormat::Yaml => serde_yml::to_string(&records)?,
        OutputFormat::Table => unreachable!("export is json or yaml"),
    };
    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("cannot write {}", path.display()))?;
            eprintln!("Wrote {} records to {}", records.len(), path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn run_clear() -> Result<()> {
    let catalog = open_catalog()?;
    let total = catalog.stats()?.total;
    catalog.clear()?;
    println!("Removed {total} records");
    Ok(())
}

fn run_ignore(action: &IgnoreAction) -> Result<()> {
    let data_dir = paths::data_dir()?;
    let mut ignores = IgnoreSet::load_or_seed(&paths::ignores_path(&data_dir))?;
    match action {
        IgnoreAction::List => {
            for id in ignores.iter() {
                println!("{id}");
            }
        }
        IgnoreAction::Add { id } => {
            if ignores.insert(id) {
                ignores.save()?;
                println!("Added {id}");
            } else {
                println!("{id} is already ignored");
            }
        }
        IgnoreAction::Remove { id } => {
            if ignores.remove(id) {
                ignores.save()?;
                println!("Removed {id}");
            } else {
                println!("{id} was not ignored");
            }
        }
    }
    Ok(())
}

/// Scan exactly one file through an isolated worker and print the raw
/// outcome. Uses a throwaway journal; the catalog is not touched.
fn run_scan_one(path: &Path, timeout: u64) -> Result<()> {
    let plugin_type = match path.extension().and_then(|e| e.to_str()) {
        Some("vst3") => PluginType::Vst3,
        Some("component") => PluginType::Aufx,
        _ => bail!("unsupported plug-in extension: {}", path.display()),
    };
    if !path.exists() {
        bail!("no such plug-in: {}", path.display());
    }

    let data_dir = paths::data_dir()?;
    paths::ensure_dir(&data_dir)?;
    let journal_path = data_dir.join("scan_one_journal.db");
    journal::remove_journal_files(&journal_path)?;

    let plugin_id = path.display().to_string();
    let mut scratch = ScanJournal::open(&journal_path)?;
    scratch.add_pending([plugin_id.clone()])?;

    let pool_config = PoolConfig {
        worker_bin: resolve_worker_bin(None)?,
        journal_path: journal_path.clone(),
        timeout: Duration::from_secs(timeout.max(1)),
        workers: 1,
        loader_override: None,
    };
    let task = plugdex_core::CandidatePlugin {
        path: path.to_path_buf(),
        name: model::file_stem(path),
        plugin_type,
    };
    plugdex_scan::run_pool(
        &pool_config,
        vec![task],
        &std::sync::Arc::new(AtomicBool::new(false)),
    )?;

    let entry = scratch.entry(&plugin_id)?;
    match entry {
        Some(entry) if entry.status == ScanStatus::Success => {
            let record: PluginRecord =
                serde_json::from_str(entry.result.as_deref().unwrap_or_default())?;
            println!("OK: {}", record.name);
            if let Some(manufacturer) = &record.manufacturer {
                println!("Vendor: {manufacturer}");
            }
            println!("Parameters: {}", record.parameters.len());
            for parameter in record.parameters.values() {
                println!("  {:<24} {:?}", parameter.name, parameter.value);
            }
        }
        Some(entry) => {
            println!(
                "{}: {}",
                entry.status,
                entry.result.as_deref().unwrap_or("no details")
            );
        }
        None => println!("worker wrote no journal row"),
    }
    scratch.drop_journal()?;
    Ok(())
}

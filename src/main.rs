use clap::{Parser, Subcommand};
use gal_deploy::invalidate::{CdnInvalidator, NoopInvalidator};
use gal_deploy::output::DeployReport;
use gal_deploy::sync::SyncEvent;
use gal_deploy::{config, fs_store, output};
use std::path::PathBuf;

/// Shared flags for commands that run a sync.
#[derive(clap::Args, Clone)]
struct SyncArgs {
    /// Target bucket (overrides `bucket` in deploy.toml)
    #[arg(long)]
    bucket: Option<String>,

    /// Write a JSON deploy report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Parser)]
#[command(name = "gal-deploy")]
#[command(about = "Deploy a static photo site to an object store")]
#[command(long_about = "\
Deploy a static photo site to an object store

Diffs the build output directory against the bucket by content hash:
new and changed files are uploaded in parallel, remote objects with no
local counterpart are pruned, and the keys that changed are handed to
the CDN layer for cache invalidation.

Configuration lives in deploy.toml next to your project:

  source = \"dist\"           # directory to deploy
  bucket = \"my-photo-site\"  # target bucket

  [store]
  root = \"deploy\"           # directory-store root

  [cdn]
  distribution = \"E2ABC...\" # omit to skip invalidation

Run 'gal-deploy gen-config' for a fully documented deploy.toml.")]
#[command(version)]
struct Cli {
    /// Project directory (where deploy.toml lives; source and store
    /// paths resolve relative to it)
    #[arg(long, default_value = ".", global = true)]
    project: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sync the build output to the bucket and invalidate changed keys
    Deploy(SyncArgs),
    /// Compute and print the deploy plan without changing anything
    Plan(SyncArgs),
    /// Print a stock deploy.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Deploy(args) => run_sync(&cli.project, args, false),
        Command::Plan(args) => run_sync(&cli.project, args, true),
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(())
        }
    }
}

fn run_sync(
    project: &std::path::Path,
    args: SyncArgs,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::DeployConfig::load_dir(project)?;

    let bucket = args.bucket.unwrap_or_else(|| cfg.bucket.clone());
    if bucket.is_empty() {
        return Err(
            "bucket not set: add `bucket = \"...\"` to deploy.toml or pass --bucket".into(),
        );
    }

    let source = project.join(&cfg.source);
    let store = fs_store::FsStore::new(project.join(&cfg.store.root));
    let manager = cfg.to_manager(dry_run);

    println!(
        "==> Syncing {} → {} ({} workers)",
        source.display(),
        bucket,
        manager.effective_parallelism()
    );

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        let mut events: Vec<SyncEvent> = Vec::new();
        for event in rx {
            println!("{}", output::format_sync_event(&event));
            events.push(event);
        }
        events
    });

    let result = manager.sync_directory(&store, &source, &bucket, Some(tx));
    let events = printer.join().unwrap();
    let invalidated = result?;

    let report = DeployReport::from_events(&bucket, dry_run, &events, &invalidated);
    println!("==> {}", report.summary());

    if !cfg.cdn.is_zero() && !invalidated.is_empty() {
        if dry_run {
            println!(
                "==> (dry run) would invalidate {} paths on {}",
                invalidated.len(),
                cfg.cdn.distribution
            );
        } else {
            println!(
                "==> Invalidating {} paths on {}",
                invalidated.len(),
                cfg.cdn.distribution
            );
            // Directory targets have no CDN in front; a cloud store build
            // wires its own invalidator here.
            NoopInvalidator.invalidate(&cfg.cdn.distribution, &invalidated)?;
        }
    }

    if let Some(path) = args.report {
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        println!("==> Report written to {}", path.display());
    }

    println!("==> Complete");
    Ok(())
}

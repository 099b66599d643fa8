//! tiler — terrain tile pyramid writer
//!
//! Usage:
//!   tiler build  --config tiler.toml [--threads 8] [--resume]
//!   tiler status --config tiler.toml

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tiler::config::{Config, OutputFormat};
use tiler::job::BuildJob;
use tiler::storage::TileStore;

#[derive(Parser)]
#[command(name = "tiler", about = "Terrain tile pyramid writer", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate every tile of the configured pyramid.
    Build {
        /// Path to the TOML configuration file.
        #[arg(short, long, default_value = "tiler.toml")]
        config: PathBuf,
        /// Override the worker thread count (0 = number of CPUs).
        #[arg(short = 't', long)]
        threads: Option<usize>,
        /// Skip tiles already present in the output.
        #[arg(long)]
        resume: bool,
    },
    /// Print the tile count and metadata of an MBTiles output.
    Status {
        #[arg(short, long, default_value = "tiler.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Build { config, threads, resume } => {
            run_build(config, threads, resume).await;
        }
        Command::Status { config } => {
            run_status(config);
        }
    }
}

fn load_config(config_path: &Path) -> Config {
    match Config::from_file(config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to load config");
            std::process::exit(1);
        }
    }
}

async fn run_build(config_path: PathBuf, threads: Option<usize>, resume: bool) {
    let mut cfg = load_config(&config_path);
    if let Some(threads) = threads {
        cfg.workers.threads = threads;
    }
    cfg.output.resume |= resume;

    let job = match BuildJob::open(cfg) {
        Ok(j) => j,
        Err(e) => {
            error!(error = %e, "Failed to open output");
            std::process::exit(1);
        }
    };
    let manager = job.manager();
    let cancel = manager.cancel_handle();

    let mut task = tokio::task::spawn_blocking(move || {
        let result = job.run(&manager);
        (job, result)
    });

    let joined = tokio::select! {
        res = &mut task => res,
        _ = tokio::signal::ctrl_c() => {
            info!("Received CTRL+C, stopping workers…");
            cancel.cancel();
            task.await
        }
    };

    let (job, result) = match joined {
        Ok(pair) => pair,
        Err(e) => {
            error!(error = %e, "Build task failed");
            std::process::exit(1);
        }
    };

    let failed = match result {
        Ok(report) => {
            if report.cancelled {
                warn!("Build interrupted; rerun with --resume to continue");
            }
            println!(
                "Wrote {} tiles, skipped {}, failed {} with {} threads in {:.1}s",
                report.stats.written,
                report.stats.skipped,
                report.stats.failed,
                report.threads,
                report.elapsed.as_secs_f64()
            );
            report.stats.failed > 0
        }
        Err(e) => {
            error!(error = %e, "Build failed");
            true
        }
    };

    if let Err(e) = job.finish() {
        error!(error = %e, "Failed to close output");
        std::process::exit(1);
    }
    if failed {
        std::process::exit(1);
    }
}

fn run_status(config_path: PathBuf) {
    let cfg = load_config(&config_path);

    if cfg.output.format != OutputFormat::Mbtiles {
        println!("Output {:?} is a directory tree; status reads MBTiles only.", cfg.output.path);
        return;
    }

    let store = match TileStore::open_existing(&cfg.output.path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    println!("=== Tile Store Status ===");
    println!("Path        : {}", store.path().display());
    println!("Tiles       : {}", store.tile_count());
    match store.metadata_entries() {
        Ok(entries) => {
            for (name, value) in entries {
                println!("  {name:<12}: {value}");
            }
        }
        Err(e) => eprintln!("Error reading metadata: {e}"),
    }
    if let Err(e) = store.close() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

//! PipeKV Server Binary
//!
//! Runs every job file in a directory and serves client sessions over
//! named pipes.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use pipekv::jobs::JobRunner;
use pipekv::session::Server;
use pipekv::{Config, Engine};
use tracing_subscriber::{fmt, EnvFilter};

/// PipeKV Server
#[derive(Parser, Debug)]
#[command(name = "pipekv-server")]
#[command(about = "In-memory key-value store served over named pipes")]
#[command(version)]
struct Args {
    /// Directory holding the .job files
    jobs_dir: PathBuf,

    /// Number of job-runner threads
    max_threads: usize,

    /// Maximum number of backups written at the same time
    max_backups: usize,

    /// Path of the registration FIFO
    register_pipe: PathBuf,

    /// Maximum concurrent client sessions
    #[arg(short = 's', long, default_value = "8")]
    max_sessions: usize,

    /// Stop accepting clients once every job has run, and exit when the
    /// open sessions end
    #[arg(long)]
    exit_after_jobs: bool,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pipekv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("PipeKV Server v{}", pipekv::VERSION);
    tracing::info!("Jobs directory: {}", args.jobs_dir.display());
    tracing::info!("Registration FIFO: {}", args.register_pipe.display());

    let config = Config::builder()
        .jobs_dir(&args.jobs_dir)
        .max_threads(args.max_threads)
        .max_backups(args.max_backups)
        .register_pipe(&args.register_pipe)
        .max_sessions(args.max_sessions)
        .build();

    let engine = match Engine::open(config.clone()) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to initialize KVS: {}", e);
            process::exit(1);
        }
    };

    let server = Arc::new(Server::new(config, Arc::clone(&engine)));
    let handle = match server.start() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("Failed to start session server: {}", e);
            process::exit(1);
        }
    };

    match JobRunner::new(Arc::clone(&engine)).run() {
        Ok(count) => tracing::info!("Finished {} job file(s)", count),
        Err(e) => tracing::error!("Job runner failed: {}", e),
    }

    if let Err(e) = engine.wait_for_backups() {
        tracing::warn!("Backup error: {}", e);
    }

    let result = if args.exit_after_jobs {
        handle.wait()
    } else {
        handle.join()
    };

    if let Err(e) = result.and_then(|_| engine.close()) {
        tracing::error!("Server error: {}", e);
        process::exit(1);
    }

    tracing::info!("Server stopped");
}

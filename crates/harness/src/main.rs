//! Driver for running a single Method × Operation cell by hand.
//!
//! The test suite runs the whole matrix; this binary exists for poking at
//! one cell against a real cluster while debugging.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use telepresence_harness::{Method, Operation, Probe, ProbeError};

/// Run one telepresence probe cell against the current cluster context.
#[derive(Parser)]
#[command(name = "tp-e2e", version, about = "Telepresence end-to-end probe runner")]
struct Cli {
    /// Interception method: container, inject-tcp, or vpn-tcp.
    #[arg(long)]
    method: Method,

    /// Deployment operation: existing, swap, or new.
    #[arg(long)]
    operation: Operation,

    /// Path to the probe script to run inside the execution context.
    #[arg(long, default_value = "tests/probe_endtoend.py")]
    probe_script: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut probe = Probe::new(cli.method, cli.operation, cli.probe_script);
    let outcome = probe.result().map(|r| (r.webserver_name.clone(), r.result.clone()));
    probe.cleanup();

    match outcome {
        Ok((webserver_name, result)) => {
            println!("webserver: {webserver_name}");
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(ProbeError::Unsupported(reason)) => {
            warn!("Skipping: {reason}");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => Err(e.into()),
    }
}

//! Ripcord harness binary
//!
//! Arms the configured trigger classes on a queue-backed loop runtime,
//! then either produces a report immediately (`trigger`) or parks on
//! the loop (`idle`) so the signal path can be exercised by hand:
//!
//!   ripcord --events signal idle &
//!   kill -USR2 <pid>

use anyhow::Result;
use clap::{Parser, Subcommand};
use ripcord::runtime::ThreadLoopRuntime;
use ripcord::{lifecycle, runtime, trigger};
use std::path::PathBuf;
use std::sync::Arc;

/// Ripcord - on-demand diagnostic reports for a managed runtime
#[derive(Parser)]
#[command(name = "ripcord", version, about = "Diagnostic report trigger harness")]
struct Cli {
    /// Enabled trigger classes, comma-separated
    /// (apicall, fatalerror, exception, signal)
    #[arg(long, default_value = "apicall", env = "RIPCORD_EVENTS")]
    events: String,

    /// Trigger signal, by name or number (default SIGUSR2)
    #[arg(long, env = "RIPCORD_SIGNAL")]
    signal: Option<String>,

    /// Report filename override
    #[arg(long, env = "RIPCORD_FILENAME")]
    filename: Option<String>,

    /// Directory to write reports into
    #[arg(long, env = "RIPCORD_DIRECTORY")]
    directory: Option<PathBuf>,

    /// Verbose diagnostics to stderr
    #[arg(long, short = 'v', env = "RIPCORD_VERBOSE")]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Produce one report now and print its path (default)
    Trigger,
    /// Arm the triggers and park on the event loop
    Idle,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let rt = Arc::new(ThreadLoopRuntime::new());
    runtime::set_runtime(rt.clone());

    lifecycle::set_verbose(cli.verbose);
    lifecycle::set_events(&cli.events)?;
    if let Some(signal) = &cli.signal {
        lifecycle::set_signal(signal)?;
    }
    if let Some(filename) = &cli.filename {
        lifecycle::set_filename(filename)?;
    }
    if let Some(directory) = &cli.directory {
        lifecycle::set_directory(directory);
    }

    match cli.command.unwrap_or(Commands::Trigger) {
        Commands::Trigger => match trigger::trigger_report(None, None)? {
            trigger::TriggerOutcome::Written(path) => {
                println!("{}", path.display());
            }
            trigger::TriggerOutcome::NotTriggered => {
                eprintln!("[ripcord] report not triggered");
            }
        },
        Commands::Idle => {
            eprintln!(
                "[ripcord] armed ({}), pid {}; waiting on the loop",
                cli.events,
                std::process::id()
            );
            rt.run();
        }
    }
    Ok(())
}

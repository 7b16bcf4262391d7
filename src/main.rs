use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use watcheth_core::DEFAULT_FETCH_TIMEOUT;
use watcheth_types::NodeKind;

use watcheth::config::Settings;
use watcheth::monitor::Monitor;
use watcheth::{logging, report};

#[derive(Parser, Debug)]
#[command(name = "watcheth", version)]
#[command(about = "Monitor Ethereum consensus, execution and validator clients")]
struct Args {
    /// Path to the config file (default: ./watcheth.yml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll all clients continuously and print a report after each cycle
    Monitor {
        /// Leave log files alone
        #[arg(long)]
        no_logs: bool,
    },
    /// Poll all clients once, print the report and exit
    List {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check each API endpoint of one client and show the raw responses
    Debug {
        /// Base URL of the client
        endpoint: String,

        /// Client type (consensus, execution or vouch)
        #[arg(short = 't', long = "type", default_value = "consensus")]
        kind: NodeKind,

        /// Also write the results to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.debug)?;

    let config = args.config.as_deref();
    match args.command.unwrap_or(Command::Monitor { no_logs: false }) {
        Command::Monitor { no_logs } => run_monitor(&Settings::load(config)?, !no_logs).await,
        Command::List { json } => run_list(&Settings::load(config)?, json).await,
        Command::Debug {
            endpoint,
            kind,
            output,
        } => run_debug(&endpoint, kind, output.as_deref()).await,
    }
}

/// Check one endpoint without loading any config.
async fn run_debug(endpoint: &str, kind: NodeKind, output: Option<&Path>) -> Result<()> {
    let checks = watcheth_adapters::diagnose(kind, endpoint, DEFAULT_FETCH_TIMEOUT).await?;
    let text = report::render_checks(kind, endpoint, &checks);
    print!("{text}");
    if let Some(path) = output {
        std::fs::write(path, &text)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

/// Poll once and print.
async fn run_list(settings: &Settings, json: bool) -> Result<()> {
    let monitor = Monitor::from_settings(settings, false)?;
    let snapshot = monitor.poll_once().await;

    let output = if json {
        report::render_json(&snapshot)?
    } else {
        report::render_text(&snapshot, &Default::default(), SystemTime::now())
    };
    println!("{output}");
    Ok(())
}

/// Poll until Ctrl-C, printing a report for each published snapshot.
async fn run_monitor(settings: &Settings, watch_logs: bool) -> Result<()> {
    let monitor = Monitor::from_settings(settings, watch_logs)?;
    let mut running = monitor.start(CancellationToken::new());
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                }
                break;
            }
            notice = running.updates().recv() => {
                let Some(notice) = notice else { break };
                tracing::debug!(cycle = notice.cycle, "Snapshot published");
                let text = report::render_text(
                    &running.snapshot(),
                    &running.log_windows(),
                    SystemTime::now(),
                );
                writeln!(stdout, "{text}")?;
                stdout.flush()?;
            }
        }
    }

    running.shutdown().await;
    Ok(())
}

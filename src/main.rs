//! devconsole
//!
//! Demo driver for the capture library.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────────────── host ────────────────────────┐
//!   │  console bindings   error channels   fetch / transport│
//!   └───────┬──────────────────┬──────────────────┬────────┘
//!           ▼                  ▼                  ▼
//!     ConsoleCapture ◀── listeners          NetworkCapture
//!           │                                     │
//!           ▼                                     ▼
//!   BoundedEventStore<LogRecord>     BoundedEventStore<NetworkRecord>
//!           │                                     │
//!           └──────────── StoreHandle ────────────┘
//!                            │
//!                            ▼
//!                    repl / fetch output
//! ```

use clap::{Parser, Subcommand};
use futures_util::future::join_all;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;

use devconsole::capture::{Capture, LogRecord, NetworkRecord, ScopeEvaluator};
use devconsole::config::{load_config, CaptureConfig};
use devconsole::host::console::render_args;
use devconsole::host::{FetchRequest, Host, TransportPhase, TransportState};
use devconsole::observability::logging::init_logging;
use devconsole::util::{format_duration, format_size, format_time};

#[derive(Parser)]
#[command(name = "devconsole")]
#[command(about = "Capture console output and network traffic", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate expressions read from stdin
    Repl,
    /// Issue requests through the captured primitives and dump the records
    Fetch {
        #[arg(required = true)]
        urls: Vec<String>,

        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Use the callback-style transport instead of fetch
        #[arg(long)]
        callback: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => CaptureConfig::default(),
    };
    init_logging(&config.observability);

    tracing::info!(
        max_log_number = config.max_log_number,
        max_network_number = config.max_network_number,
        "Configuration loaded"
    );

    match cli.command {
        Commands::Repl => repl(config).await,
        Commands::Fetch {
            urls,
            method,
            callback,
        } => fetch(config, urls, method, callback).await,
    }
}

async fn repl(config: CaptureConfig) -> Result<(), Box<dyn std::error::Error>> {
    let host = Host::global().clone();
    let capture = Capture::new(host, config).with_evaluator(Arc::new(ScopeEvaluator::default()));
    capture.install();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => continue,
            ":quit" | ":q" => break,
            ":logs" => capture.logs().snapshot().iter().for_each(print_log),
            ":network" => capture.network().snapshot().iter().for_each(print_request),
            ":clear" => {
                capture.logs().clear();
                capture.network().clear();
            }
            expression => match capture.execute(expression) {
                Ok(value) => println!("{}", value),
                Err(e) => println!("{}", e),
            },
        }
    }

    capture.uninstall();
    Ok(())
}

async fn fetch(
    config: CaptureConfig,
    urls: Vec<String>,
    method: String,
    callback: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let host = Host::with_http()?;
    let capture = Capture::new(host.clone(), config);
    capture.install();

    if callback {
        for url in &urls {
            let mut transport = host
                .new_transport()
                .ok_or("callback transport is not available")?;
            let (done_tx, done_rx) = oneshot::channel();
            let done_tx = Mutex::new(Some(done_tx));
            transport.set_on_ready_state_change(Some(Arc::new(move |state: &TransportState| {
                if state.phase == TransportPhase::Done {
                    let tx = done_tx.lock().unwrap_or_else(PoisonError::into_inner).take();
                    if let Some(tx) = tx {
                        let _ = tx.send(state.status);
                    }
                }
            })));
            transport.open(&method, url);
            transport.send(None);
            let status = done_rx.await?;
            tracing::info!(url = %url, status, "Transport request finished");
        }
    } else {
        let requests = urls
            .iter()
            .map(|url| host.fetch(FetchRequest::new(url.as_str()).method(method.as_str())));
        for (url, result) in urls.iter().zip(join_all(requests).await) {
            match result {
                Ok(response) => tracing::info!(url = %url, status = response.status(), "Fetch finished"),
                Err(e) => tracing::warn!(url = %url, error = %e, "Fetch failed"),
            }
        }
    }

    let records = capture.network().snapshot();
    records.iter().for_each(print_request);
    println!("{}", serde_json::to_string_pretty(&records.to_vec())?);

    capture.uninstall();
    Ok(())
}

fn print_log(record: &LogRecord) {
    let repeat = if record.repeated > 1 {
        format!(" (x{})", record.repeated)
    } else {
        String::new()
    };
    println!(
        "{} [{}] {}{}",
        format_time(record.time),
        record.level,
        render_args(&record.content),
        repeat
    );
}

fn print_request(record: &NetworkRecord) {
    let status = record
        .status
        .map_or_else(|| "-".to_string(), |s| s.to_string());
    let duration = record
        .duration
        .map_or_else(|| "pending".to_string(), format_duration);
    let size = record
        .response_data
        .as_ref()
        .map_or_else(|| "-".to_string(), |data| format_size(data.to_bytes().len() as u64));
    println!(
        "{} {} {} {} {} {}",
        format_time(record.request_time),
        record.method,
        record.url,
        status,
        duration,
        size
    );
}

//! Synapse application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Install the tracing subscriber
//! 3. Build the configured transport and the session controller
//! 4. Run the requested command (chat, ask, health, graph)

mod cli;
mod view;

use std::io::Stdout;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use synapse_client::{GraphClient, HealthMonitor};
use synapse_core::config::SynapseConfig;
use synapse_core::error::SynapseError;
use synapse_core::types::{SessionState, UiDelta};
use synapse_session::{SessionController, SessionHandle};

use crate::cli::{CliArgs, Command};
use crate::view::{TerminalView, ViewMode};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
/// Logs go to stderr so stdout carries only session output.
fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Forward deltas to the view until the session ends. Ctrl-C cancels.
async fn render_session(
    controller: &SessionController,
    mut handle: SessionHandle,
    view: &mut TerminalView<Stdout>,
) -> AppResult<UiDelta> {
    let mut last = handle.latest();
    loop {
        tokio::select! {
            delta = handle.next_delta() => match delta {
                Some(delta) => {
                    view.render(&delta)?;
                    last = delta;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!(session_id = %handle.id(), "Interrupt received");
                controller.cancel(&handle).await;
            }
        }
    }
    controller.acknowledge(&handle).await;
    Ok(last)
}

async fn build_controller(config: &SynapseConfig) -> AppResult<SessionController> {
    let transport = synapse_session::transport_from_config(config).await?;
    tracing::info!(transport = %transport.kind(), "Transport ready");
    Ok(SessionController::new(transport, &config.session))
}

async fn ask(config: &SynapseConfig, text: &str, mode: ViewMode) -> AppResult<ExitCode> {
    let controller = build_controller(config).await?;
    let mut view = TerminalView::new(std::io::stdout(), mode);

    let handle = controller.submit(text).await?;
    let last = render_session(&controller, handle, &mut view).await?;

    Ok(if last.state == SessionState::Done {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn chat(config: &SynapseConfig, mode: ViewMode) -> AppResult<ExitCode> {
    let controller = build_controller(config).await?;
    let mut view = TerminalView::new(std::io::stdout(), mode);

    let monitor = Arc::new(HealthMonitor::from_config(config)?);
    let online = monitor.online_flag();
    let health_task = {
        let monitor = Arc::clone(&monitor);
        tokio::spawn(async move { monitor.run().await })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let prompt = if online.load(Ordering::SeqCst) {
            "you> "
        } else {
            "you (offline)> "
        };
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "/quit" || input == "/exit" {
            break;
        }

        match controller.submit(input).await {
            Ok(handle) => {
                view.reset();
                render_session(&controller, handle, &mut view).await?;
            }
            Err(e) => eprintln!("error: {}", e),
        }
    }

    monitor.shutdown();
    let _ = health_task.await;
    Ok(ExitCode::SUCCESS)
}

async fn health(config: &SynapseConfig, mode: ViewMode) -> AppResult<ExitCode> {
    let monitor = HealthMonitor::from_config(config)?;
    let report = monitor.probe().await;

    match mode {
        ViewMode::Json => println!("{}", serde_json::to_string(&report)?),
        ViewMode::Text if report.online => {
            println!("{}: online ({} ms)", monitor.url(), report.latency_ms)
        }
        ViewMode::Text => println!(
            "{}: offline ({})",
            monitor.url(),
            report.error.as_deref().unwrap_or("unknown error")
        ),
    }

    Ok(if report.online {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn graph(config: &SynapseConfig, mode: ViewMode) -> AppResult<ExitCode> {
    let client = GraphClient::from_config(config)?;
    let graph = client.fetch().await?;

    match mode {
        ViewMode::Json => println!("{}", serde_json::to_string_pretty(&graph)?),
        ViewMode::Text => {
            println!("{} nodes, {} links", graph.nodes.len(), graph.links.len());
            for node in &graph.nodes {
                let kind = node.kind.as_deref().unwrap_or("-");
                println!("  {} [{}] degree {}", node.label, kind, graph.degree(&node.id));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> AppResult<ExitCode> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let (mut config, load_error) = match SynapseConfig::load(&config_file) {
        Ok(config) => (config, None),
        Err(e) => (SynapseConfig::default(), Some(e)),
    };
    args.apply(&mut config)?;

    // Tracing.
    init_tracing(&config.general.log_level);
    tracing::debug!("Starting Synapse v{}", env!("CARGO_PKG_VERSION"));

    match load_error {
        None => tracing::debug!(path = %config_file.display(), "Configuration loaded"),
        Some(SynapseError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %config_file.display(), "No config file, using defaults")
        }
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config, using defaults"
        ),
    }

    let mode = if args.json {
        ViewMode::Json
    } else {
        ViewMode::Text
    };

    match args.command {
        Command::Chat => chat(&config, mode).await,
        Command::Ask { ref text } => ask(&config, &text.join(" "), mode).await,
        Command::Health => health(&config, mode).await,
        Command::Graph => graph(&config, mode).await,
    }
}

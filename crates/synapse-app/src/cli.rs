//! CLI argument definitions for the Synapse client.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use synapse_core::config::{SynapseConfig, TransportKind};
use synapse_core::error::SynapseError;
use url::Url;

/// Synapse: a terminal client for a streaming knowledge assistant.
#[derive(Parser, Debug)]
#[command(name = "synapse", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Base URL of the assistant backend.
    #[arg(short = 's', long = "server")]
    pub server: Option<String>,

    /// Response transport (pull or push).
    #[arg(short = 't', long = "transport")]
    pub transport: Option<TransportKind>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Print session updates and results as JSON lines.
    #[arg(long = "json")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Interactive chat; Ctrl-C cancels the running response.
    Chat,
    /// Ask a single question and print the answer.
    Ask {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Probe the backend once.
    Health,
    /// Fetch and print the knowledge graph.
    Graph,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SYNAPSE_CONFIG env var > ~/.synapse/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("SYNAPSE_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the backend URL.
    ///
    /// Priority: --server flag > SYNAPSE_SERVER env var.
    /// Returns `None` if not overridden.
    pub fn resolve_server(&self) -> Option<String> {
        if let Some(ref s) = self.server {
            return Some(s.clone());
        }
        std::env::var("SYNAPSE_SERVER").ok().filter(|s| !s.is_empty())
    }

    /// Apply every override to a loaded configuration.
    ///
    /// Fails if the server override or the configured socket URL is malformed.
    pub fn apply(&self, config: &mut SynapseConfig) -> Result<(), SynapseError> {
        if let Some(server) = self.resolve_server() {
            config.server.base_url = server;
            config.transport.socket_url = rebase_socket_url(config)?.into();
        }
        if let Some(kind) = self.transport {
            config.transport.kind = kind;
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
        Ok(())
    }
}

/// Move the socket URL onto the server's host and port, keeping its own path.
///
/// `https` servers get a `wss` socket.
fn rebase_socket_url(config: &SynapseConfig) -> Result<Url, SynapseError> {
    let base = config.base_url()?;
    let mut socket = config.socket_url()?;
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };

    let invalid = || SynapseError::Config(format!("cannot rebase socket url onto {}", base));
    socket.set_scheme(scheme).map_err(|()| invalid())?;
    socket
        .set_host(base.host_str())
        .map_err(|e| SynapseError::Config(e.to_string()))?;
    socket.set_port(base.port()).map_err(|()| invalid())?;
    Ok(socket)
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".synapse").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".synapse").join("config.toml");
    }
    PathBuf::from("config.toml")
}

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::error::{Result, SynapseError};

/// Top-level configuration for the Synapse client.
///
/// Loaded from `~/.synapse/config.toml` by default. Every section falls back
/// to its defaults when absent, so a partial file is always valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynapseConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

impl SynapseConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SynapseConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SynapseError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Parsed server base URL. Only `http` and `https` are accepted.
    pub fn base_url(&self) -> Result<Url> {
        let url = parse_url(&self.server.base_url)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(SynapseError::Config(format!(
                "unsupported server url scheme: {}",
                scheme
            ))),
        }
    }

    /// Absolute URL for a server path such as `/health`.
    ///
    /// The path is resolved below any path already on the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let mut base = self.base_url()?;
        if !base.path().ends_with('/') {
            let dir = format!("{}/", base.path());
            base.set_path(&dir);
        }
        base.join(path.trim_start_matches('/'))
            .map_err(|e| SynapseError::Config(format!("invalid endpoint path {:?}: {}", path, e)))
    }

    /// Parsed push socket URL. Only `ws` and `wss` are accepted.
    pub fn socket_url(&self) -> Result<Url> {
        let url = parse_url(&self.transport.socket_url)?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            scheme => Err(SynapseError::Config(format!(
                "unsupported socket url scheme: {}",
                scheme
            ))),
        }
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| SynapseError::Config(format!("invalid url {:?}: {}", raw, e)))
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Assistant backend location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base HTTP URL of the assistant backend.
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
        }
    }
}

/// Which wire shape carries assistant responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// One request per submission, response read as a chunked line stream.
    Pull,
    /// Persistent socket receiving status messages; submissions sent separately.
    Push,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Pull => write!(f, "pull"),
            TransportKind::Push => write!(f, "push"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = SynapseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pull" | "stream" => Ok(TransportKind::Pull),
            "push" | "socket" | "ws" => Ok(TransportKind::Push),
            other => Err(SynapseError::Config(format!(
                "unknown transport kind: {}",
                other
            ))),
        }
    }
}

/// Transport endpoints and submission metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Transport used for new sessions.
    pub kind: TransportKind,
    /// Path of the streaming chat endpoint (pull transport).
    pub stream_path: String,
    /// Path of the submission endpoint (push transport side channel).
    pub submit_path: String,
    /// WebSocket URL for status messages (push transport).
    pub socket_url: String,
    /// Value sent as `source` with every submission.
    pub source: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Pull,
            stream_path: "/chat/stream".to_string(),
            submit_path: "/ingest/web".to_string(),
            socket_url: "ws://127.0.0.1:8000/ws".to_string(),
            source: "web".to_string(),
        }
    }
}

/// Session lifecycle limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds without a terminal event before the session fails with "timeout".
    pub watchdog_secs: u64,
    /// Maximum submission length in characters.
    pub max_message_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            watchdog_secs: 120,
            max_message_length: 4000,
        }
    }
}

/// Liveness probing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Probe path on the backend.
    pub path: String,
    /// Seconds between probes.
    pub interval_secs: u64,
    /// Per-probe request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            interval_secs: 10,
            timeout_secs: 5,
        }
    }
}

/// Knowledge graph endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Path returning `{nodes, links}`.
    pub path: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            path: "/graph".to_string(),
        }
    }
}

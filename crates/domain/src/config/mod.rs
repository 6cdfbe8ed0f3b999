mod exec;
mod server;
mod session;

pub use exec::*;
pub use server::*;
pub use session::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything the agent needs to run, built once at startup and handed to
/// the session manager by value.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    /// Bearer token sent in the `Authorization` header on connect.
    #[serde(default)]
    pub token: String,
    /// Tunnel this agent subscribes to.
    #[serde(default)]
    pub tunnel_id: String,
    /// Development mode: local server, shorter intervals, verbose heartbeat
    /// logging.  See [`AgentConfig::resolve`].
    #[serde(default)]
    pub dev_mode: bool,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub exec: ExecConfig,
}

impl AgentConfig {
    /// Parse a TOML document.  Missing keys take their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Read and parse a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Apply the development preset when `dev_mode` is set.
    ///
    /// The preset replaces the server endpoint and the session intervals
    /// wholesale; anything else in the file is kept.
    pub fn resolve(mut self) -> Self {
        if self.dev_mode {
            self.server = ServerConfig::development();
            self.session = SessionConfig::development();
        }
        self
    }

    /// Full WebSocket endpoint, e.g. `wss://www.birdcmd.com/cable`.
    pub fn endpoint_url(&self) -> String {
        self.server.endpoint_url()
    }

    /// Check the config for problems.  An empty vec means everything is fine.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.token.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "token".into(),
                message: "bearer token must not be empty".into(),
            });
        }
        if self.tunnel_id.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "tunnel_id".into(),
                message: "tunnel id must not be empty".into(),
            });
        }

        if !matches!(self.server.scheme.as_str(), "ws" | "wss") {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.scheme".into(),
                message: format!("expected \"ws\" or \"wss\", got {:?}", self.server.scheme),
            });
        } else if self.server.scheme == "ws" && !self.dev_mode {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.scheme".into(),
                message: "plain ws sends the bearer token unencrypted".into(),
            });
        }

        if self.session.heartbeat_interval_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "session.heartbeat_interval_secs".into(),
                message: "heartbeat interval must be positive".into(),
            });
        }
        if self.session.heartbeat_jitter_secs.saturating_mul(2)
            > self.session.heartbeat_interval_secs
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "session.heartbeat_jitter_secs".into(),
                message: "jitter exceeds half the interval and will be clamped".into(),
            });
        }
        if self.session.reconnect_jitter_min_secs > self.session.reconnect_jitter_max_secs {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "session.reconnect_jitter_min_secs".into(),
                message: "reconnect jitter min is greater than max".into(),
            });
        }

        if self.exec.max_concurrent == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "exec.max_concurrent".into(),
                message: "at least one concurrent command is required".into(),
            });
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Credentials
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Split a `token:tunnelId` pair on the first colon.
///
/// The tunnel id may itself contain colons; the token may not.
pub fn parse_credentials(raw: &str) -> Result<(String, String)> {
    match raw.split_once(':') {
        Some((token, tunnel)) if !token.is_empty() && !tunnel.is_empty() => {
            Ok((token.to_owned(), tunnel.to_owned()))
        }
        _ => Err(Error::Config(
            "credentials must be in the format token:tunnelId".into(),
        )),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

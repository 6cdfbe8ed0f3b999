//! Core types shared by the session workers: lifecycle actions, command
//! context, and errors.

use bc_protocol::TunnelIdentity;

/// What a worker asks the session manager to do with the current epoch.
///
/// `None` means "keep going" and never crosses the worker boundary; only
/// `Reconnect` and `Disconnect` are ever sent to the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    None,
    /// Tear the connection down and start a new epoch after a short jitter.
    Reconnect,
    /// Tear the connection down and stop the agent.
    Disconnect,
}

/// Context provided to every command handler invocation.
#[derive(Clone, Debug)]
pub struct CommandContext {
    /// Identity decoded from the frame that carried the command.
    pub identity: TunnelIdentity,
}

/// Top-level SDK error.
#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    #[error("config: {0}")]
    Config(String),
    #[error("websocket: {0}")]
    WebSocket(String),
    #[error("subscription failed: {0}")]
    Subscribe(String),
    #[error("shutdown")]
    Shutdown,
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for AgentError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        AgentError::WebSocket(e.to_string())
    }
}

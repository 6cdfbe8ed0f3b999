//! Builder pattern for constructing an [`AgentClient`].

use std::time::Duration;

use bc_domain::config::AgentConfig;
use bc_protocol::TunnelIdentity;

use crate::client::AgentClient;
use crate::heartbeat::HeartbeatSchedule;
use crate::reconnect::ReconnectPolicy;
use crate::transport;
use crate::types::AgentError;

/// Fluent builder for [`AgentClient`].
///
/// # Example
///
/// ```rust,no_run
/// # use bc_agent_sdk::AgentClientBuilder;
/// let client = AgentClientBuilder::new()
///     .endpoint_url("wss://www.birdcmd.com/cable")
///     .token("secret")
///     .tunnel_id("tunnel-42")
///     .heartbeat_interval(std::time::Duration::from_secs(45))
///     .max_concurrent_commands(16)
///     .build()
///     .unwrap();
/// ```
pub struct AgentClientBuilder {
    pub(crate) endpoint_url: String,
    pub(crate) token: String,
    pub(crate) tunnel_id: String,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) heartbeat_jitter: Duration,
    pub(crate) reconnect: ReconnectPolicy,
    pub(crate) connect_timeout: Duration,
    pub(crate) max_concurrent_commands: usize,
    pub(crate) verbose: bool,
}

impl AgentClientBuilder {
    pub fn new() -> Self {
        Self {
            endpoint_url: "wss://www.birdcmd.com/cable".into(),
            token: String::new(),
            tunnel_id: String::new(),
            heartbeat_interval: Duration::from_secs(45),
            heartbeat_jitter: Duration::from_secs(5),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(45),
            max_concurrent_commands: 16,
            verbose: false,
        }
    }

    /// Take every setting from a resolved [`AgentConfig`].
    pub fn config(mut self, cfg: &AgentConfig) -> Self {
        let (jitter_min, jitter_max) = cfg.session.reconnect_jitter();
        self.endpoint_url = cfg.endpoint_url();
        self.token = cfg.token.clone();
        self.tunnel_id = cfg.tunnel_id.clone();
        self.heartbeat_interval = cfg.session.heartbeat_interval();
        self.heartbeat_jitter = cfg.session.heartbeat_jitter();
        self.reconnect = ReconnectPolicy {
            retry_interval: cfg.session.reconnect_interval(),
            jitter_min,
            jitter_max,
        };
        self.max_concurrent_commands = cfg.exec.max_concurrent;
        self.verbose = cfg.dev_mode;
        self
    }

    // ── Required ─────────────────────────────────────────────────────

    /// Control-channel URL (e.g. `wss://www.birdcmd.com/cable`).
    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = url.into();
        self
    }

    /// Bearer token sent in the `Authorization` header.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Tunnel to subscribe to.
    pub fn tunnel_id(mut self, id: impl Into<String>) -> Self {
        self.tunnel_id = id.into();
        self
    }

    // ── Behavior ─────────────────────────────────────────────────────

    /// Override the heartbeat interval (default 45s).
    pub fn heartbeat_interval(mut self, d: Duration) -> Self {
        self.heartbeat_interval = d;
        self
    }

    /// Override the heartbeat jitter (default ±5s).
    pub fn heartbeat_jitter(mut self, d: Duration) -> Self {
        self.heartbeat_jitter = d;
        self
    }

    /// Override the reconnect policy.
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Give up on a connect attempt after this long (default 45s).
    pub fn connect_timeout(mut self, d: Duration) -> Self {
        self.connect_timeout = d;
        self
    }

    /// Maximum concurrent command executions (default 16).
    pub fn max_concurrent_commands(mut self, n: usize) -> Self {
        self.max_concurrent_commands = n;
        self
    }

    /// Log every heartbeat at info level.
    pub fn verbose(mut self, on: bool) -> Self {
        self.verbose = on;
        self
    }

    /// Build the [`AgentClient`].
    pub fn build(self) -> Result<AgentClient, AgentError> {
        if self.endpoint_url.is_empty() {
            return Err(AgentError::Config("endpoint_url is required".into()));
        }
        if self.token.is_empty() {
            return Err(AgentError::Config("token is required".into()));
        }
        if self.tunnel_id.is_empty() {
            return Err(AgentError::Config("tunnel_id is required".into()));
        }
        // A request that cannot be built now would fail on every attempt.
        transport::connect_request(&self.endpoint_url, &self.token)?;
        if self.heartbeat_interval.is_zero() {
            return Err(AgentError::Config("heartbeat_interval must be > 0".into()));
        }
        if self.reconnect.jitter_min > self.reconnect.jitter_max {
            return Err(AgentError::Config(
                "reconnect jitter minimum exceeds maximum".into(),
            ));
        }
        if self.max_concurrent_commands == 0 {
            return Err(AgentError::Config(
                "max_concurrent_commands must be > 0".into(),
            ));
        }

        Ok(AgentClient {
            endpoint_url: self.endpoint_url,
            token: self.token,
            identity: TunnelIdentity::command_channel(self.tunnel_id),
            heartbeat: HeartbeatSchedule::new(self.heartbeat_interval, self.heartbeat_jitter),
            reconnect: self.reconnect,
            connect_timeout: self.connect_timeout,
            max_concurrent_commands: self.max_concurrent_commands,
            verbose: self.verbose,
        })
    }
}

impl Default for AgentClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AgentClientBuilder {
        AgentClientBuilder::new().token("tok").tunnel_id("T1")
    }

    #[test]
    fn builds_with_required_fields() {
        let client = base().build().unwrap();
        assert_eq!(client.endpoint_url(), "wss://www.birdcmd.com/cable");
        assert_eq!(client.identity(), &TunnelIdentity::command_channel("T1"));
        assert_eq!(client.heartbeat.interval(), Duration::from_secs(45));
    }

    #[test]
    fn missing_credentials_are_rejected() {
        assert!(matches!(
            AgentClientBuilder::new().tunnel_id("T1").build(),
            Err(AgentError::Config(_))
        ));
        assert!(matches!(
            AgentClientBuilder::new().token("tok").build(),
            Err(AgentError::Config(_))
        ));
    }

    #[test]
    fn unusable_endpoint_is_rejected() {
        let r = base().endpoint_url("not a url").build();
        assert!(matches!(r, Err(AgentError::Config(_))));
    }

    #[test]
    fn token_that_cannot_be_a_header_is_rejected() {
        let r = base().token("bad\ntoken").build();
        assert!(matches!(r, Err(AgentError::Config(_))));
    }

    #[test]
    fn zero_heartbeat_is_rejected() {
        let r = base().heartbeat_interval(Duration::ZERO).build();
        assert!(matches!(r, Err(AgentError::Config(_))));
    }

    #[test]
    fn inverted_jitter_is_rejected() {
        let r = base()
            .reconnect_policy(ReconnectPolicy {
                jitter_min: Duration::from_secs(5),
                jitter_max: Duration::from_secs(1),
                ..Default::default()
            })
            .build();
        assert!(matches!(r, Err(AgentError::Config(_))));
    }

    #[test]
    fn dev_config_flows_through() {
        let cfg = AgentConfig {
            token: "tok".into(),
            tunnel_id: "T9".into(),
            dev_mode: true,
            ..Default::default()
        }
        .resolve();
        let client = AgentClientBuilder::new().config(&cfg).build().unwrap();
        assert_eq!(client.endpoint_url(), "ws://localhost:3000/cable");
        assert_eq!(client.heartbeat.interval(), Duration::from_secs(25));
        assert_eq!(client.reconnect.retry_interval, Duration::from_secs(2));
        assert!(client.verbose);
        assert_eq!(client.identity().tunnel, "T9");
    }
}

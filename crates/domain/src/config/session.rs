use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session timing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Heartbeat and reconnect timing for the control channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Base interval between heartbeat pings.
    #[serde(default = "d_45")]
    pub heartbeat_interval_secs: u64,
    /// Heartbeats fire at `interval ± jitter`.  Clamped to half the interval.
    #[serde(default = "d_5")]
    pub heartbeat_jitter_secs: u64,
    /// Fixed delay between connect attempts when the server is unreachable.
    #[serde(default = "d_10")]
    pub reconnect_interval_secs: u64,
    /// Random delay window applied after a live session drops.
    #[serde(default = "d_1")]
    pub reconnect_jitter_min_secs: u64,
    #[serde(default = "d_10")]
    pub reconnect_jitter_max_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 45,
            heartbeat_jitter_secs: 5,
            reconnect_interval_secs: 10,
            reconnect_jitter_min_secs: 1,
            reconnect_jitter_max_secs: 10,
        }
    }
}

impl SessionConfig {
    /// Timing used against a local development server.
    pub fn development() -> Self {
        Self {
            heartbeat_interval_secs: 25,
            reconnect_interval_secs: 2,
            ..Default::default()
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_jitter(&self) -> Duration {
        Duration::from_secs(self.heartbeat_jitter_secs)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn reconnect_jitter(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.reconnect_jitter_min_secs),
            Duration::from_secs(self.reconnect_jitter_max_secs),
        )
    }
}

fn d_45() -> u64 {
    45
}
fn d_10() -> u64 {
    10
}
fn d_5() -> u64 {
    5
}
fn d_1() -> u64 {
    1
}

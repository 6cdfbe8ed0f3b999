//! Reconnect policy: fixed retry for failed connects, random jitter after a
//! dropped session.

use std::time::Duration;

use rand::Rng;

/// Controls how the session manager waits between epochs.
///
/// There is no attempt limit: the agent keeps trying until it is told to
/// stop.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Fixed delay after a connection attempt fails.
    pub retry_interval: Duration,
    /// Lower bound of the random pause after a session ends with reconnect.
    pub jitter_min: Duration,
    /// Upper bound of the same pause.
    pub jitter_max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(10),
            jitter_min: Duration::from_secs(1),
            jitter_max: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retrying a connect that failed.  Never grows.
    pub fn connect_retry_delay(&self) -> Duration {
        self.retry_interval
    }

    /// Random pause in `[jitter_min, jitter_max]` before reconnecting after a
    /// session ended.  Spreads agents out when a server restart drops them
    /// all at once.
    pub fn reconnect_delay(&self) -> Duration {
        if self.jitter_min >= self.jitter_max {
            return self.jitter_min;
        }
        rand::thread_rng().gen_range(self.jitter_min..=self.jitter_max)
    }
}

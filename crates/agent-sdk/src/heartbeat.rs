//! Heartbeat emitter: periodic `heartbeat_ping` on the control channel.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use bc_protocol::{OutboundMessage, TunnelIdentity};

use crate::transport::{Link, TransportSender};

/// Interval plus symmetric random jitter between pings.
#[derive(Debug, Clone)]
pub struct HeartbeatSchedule {
    interval: Duration,
    jitter: Duration,
}

impl HeartbeatSchedule {
    /// Jitter is clamped to half the interval so the delay stays positive.
    pub fn new(interval: Duration, jitter: Duration) -> Self {
        Self {
            interval,
            jitter: jitter.min(interval / 2),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn jitter(&self) -> Duration {
        self.jitter
    }

    /// Delay before the next ping: `interval ± jitter`, at least 1 ms.
    pub fn next_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.interval;
        }
        let j = self.jitter.as_millis() as i64;
        let offset = rand::thread_rng().gen_range(-j..=j);
        let ms = (self.interval.as_millis() as i64 + offset).max(1);
        Duration::from_millis(ms as u64)
    }
}

/// Send a heartbeat after every scheduled delay until `shutdown` fires or a
/// send fails.
///
/// The sleep is raced against `shutdown`, and the final check happens under
/// the write lock, so no ping goes out on a connection that is being closed.
/// A failed send only stops the heartbeat: detecting the dead connection is
/// the listener's job.
pub async fn beat<S: Link>(
    sender: TransportSender<S>,
    identity: TunnelIdentity,
    shutdown: CancellationToken,
    schedule: HeartbeatSchedule,
    verbose: bool,
) {
    let frame = match bc_protocol::encode(&OutboundMessage::heartbeat(&identity)) {
        Ok(f) => f,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode heartbeat");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!("exiting heartbeat from stale connection");
                return;
            }
            _ = tokio::time::sleep(schedule.next_delay()) => {}
        }

        match sender.send_unless_cancelled(frame.clone(), &shutdown).await {
            Ok(true) => {
                if verbose {
                    tracing::info!("sent heartbeat ping");
                } else {
                    tracing::trace!("sent heartbeat ping");
                }
            }
            Ok(false) => {
                tracing::debug!("exiting heartbeat from stale connection");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "heartbeat send failed, stopping heartbeats");
                return;
            }
        }
    }
}

//! Session manager: owns the connect, subscribe, run, tear down loop.
//!
//! Each pass through the loop is one epoch: one connection, one listener,
//! one heartbeat, one shutdown token and one result channel.  Nothing from
//! an epoch outlives it except the dispatcher and the command tasks it
//! already started.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use bc_protocol::TunnelIdentity;

use crate::dispatch::{self, Dispatcher};
use crate::handler::CommandHandler;
use crate::heartbeat::{self, HeartbeatSchedule};
use crate::reconnect::ReconnectPolicy;
use crate::transport::{Link, Transport};
use crate::types::{AgentError, ControlAction};

/// A fully-configured agent client ready to connect.
///
/// Create via [`AgentClientBuilder`](crate::builder::AgentClientBuilder).
pub struct AgentClient {
    pub(crate) endpoint_url: String,
    pub(crate) token: String,
    pub(crate) identity: TunnelIdentity,
    pub(crate) heartbeat: HeartbeatSchedule,
    pub(crate) reconnect: ReconnectPolicy,
    pub(crate) connect_timeout: Duration,
    pub(crate) max_concurrent_commands: usize,
    pub(crate) verbose: bool,
}

impl AgentClient {
    /// Start a new builder.
    pub fn builder() -> crate::builder::AgentClientBuilder {
        crate::builder::AgentClientBuilder::new()
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    pub fn identity(&self) -> &TunnelIdentity {
        &self.identity
    }

    /// Run the agent until the server tells it to stop, the subscription
    /// cannot be sent, or `shutdown` is cancelled.
    ///
    /// * `Ok(())`: the server rejected the subscription or disconnected
    ///   without asking for a reconnect.
    /// * `Err(AgentError::Subscribe)`: the subscription request could not
    ///   be written.  Never retried.
    /// * `Err(AgentError::Config)`: the endpoint or token cannot form a
    ///   request.  Never retried.
    /// * `Err(AgentError::Shutdown)`: `shutdown` was cancelled.
    ///
    /// Other connect failures are retried forever at a fixed interval.
    pub async fn run(
        self,
        handler: Arc<dyn CommandHandler>,
        shutdown: CancellationToken,
    ) -> Result<(), AgentError> {
        self.run_with(|| self.connect(), handler, shutdown).await
    }

    /// The session loop over any connector.  Each call to `connect` opens
    /// one epoch's transport.
    async fn run_with<S, C, F>(
        &self,
        connect: C,
        handler: Arc<dyn CommandHandler>,
        shutdown: CancellationToken,
    ) -> Result<(), AgentError>
    where
        S: Link,
        C: Fn() -> F,
        F: Future<Output = Result<Transport<S>, AgentError>>,
    {
        let dispatcher = Arc::new(Dispatcher::new(handler, self.max_concurrent_commands));
        let mut attempt: u64 = 0;

        loop {
            if shutdown.is_cancelled() {
                return Err(AgentError::Shutdown);
            }
            attempt += 1;

            tracing::info!(url = %self.endpoint_url, tunnel = %self.identity.tunnel, attempt, "connecting");
            let connected = tokio::select! {
                r = connect() => r,
                _ = shutdown.cancelled() => return Err(AgentError::Shutdown),
            };
            let mut transport = match connected {
                Ok(t) => t,
                Err(e @ AgentError::Config(_)) => {
                    tracing::error!(error = %e, "cannot build connect request");
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.reconnect.connect_retry_delay();
                    tracing::warn!(
                        attempt,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "connection error"
                    );
                    pause(delay, &shutdown).await?;
                    continue;
                }
            };

            if let Err(e) = transport.subscribe(&self.identity).await {
                tracing::error!(error = %e, "subscription error");
                transport.close().await;
                return Err(AgentError::Subscribe(e.to_string()));
            }
            tracing::debug!(tunnel = %self.identity.tunnel, "subscription sent");

            match self.run_epoch(transport, &dispatcher, &shutdown).await {
                ControlAction::Disconnect => {
                    tracing::info!("disconnecting");
                    return Ok(());
                }
                ControlAction::Reconnect | ControlAction::None => {
                    if shutdown.is_cancelled() {
                        return Err(AgentError::Shutdown);
                    }
                    let delay = self.reconnect.reconnect_delay();
                    tracing::info!(delay_ms = delay.as_millis() as u64, "reconnecting");
                    pause(delay, &shutdown).await?;
                }
            }
        }
    }

    /// Same as [`run`](Self::run), but returns a `JoinHandle` for embedding.
    pub fn spawn(
        self,
        handler: Arc<dyn CommandHandler>,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<Result<(), AgentError>> {
        tokio::spawn(async move { self.run(handler, shutdown).await })
    }

    async fn connect(&self) -> Result<Transport, AgentError> {
        tokio::time::timeout(
            self.connect_timeout,
            Transport::connect(&self.endpoint_url, &self.token),
        )
        .await
        .map_err(|_| AgentError::WebSocket("connect timed out".into()))?
    }

    /// Start the listener and the heartbeat on a subscribed transport, wait
    /// for the first lifecycle action, then tear the epoch down.
    async fn run_epoch<S: Link>(
        &self,
        transport: Transport<S>,
        dispatcher: &Arc<Dispatcher>,
        shutdown: &CancellationToken,
    ) -> ControlAction {
        // Process shutdown cascades into the epoch; the epoch never cancels
        // the process.
        let epoch = shutdown.child_token();
        let (results_tx, mut results_rx) = mpsc::channel(1);
        let (sender, receiver) = transport.split();

        let mut listener = tokio::spawn(dispatch::listen(
            receiver,
            dispatcher.clone(),
            epoch.clone(),
            results_tx,
        ));
        let mut pinger = tokio::spawn(heartbeat::beat(
            sender.clone(),
            self.identity.clone(),
            epoch.clone(),
            self.heartbeat.clone(),
            self.verbose,
        ));

        // The listener holds the only sender; if it ends without a result
        // the channel closes and we reconnect.
        let action = results_rx.recv().await.unwrap_or(ControlAction::Reconnect);
        tracing::debug!(?action, "epoch ended");

        epoch.cancel();
        sender.close().await;
        for task in [&mut listener, &mut pinger] {
            task.abort();
            let _ = task.await;
        }
        action
    }
}

async fn pause(delay: Duration, shutdown: &CancellationToken) -> Result<(), AgentError> {
    tokio::select! {
        _ = tokio::time::sleep(delay) => Ok(()),
        _ = shutdown.cancelled() => Err(AgentError::Shutdown),
    }
}

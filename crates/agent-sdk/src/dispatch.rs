//! Message dispatcher and listener.
//!
//! The listener owns the read half of the connection.  Every text frame goes
//! through [`Dispatcher::handle_text`], which logs it, hands commands to the
//! handler, and tells the listener whether the epoch should end.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use bc_protocol::{ChannelPayload, DisconnectReason, InboundFrame, TunnelIdentity};

use crate::handler::CommandHandler;
use crate::transport::{Link, TransportReceiver};
use crate::types::{CommandContext, ControlAction};

/// Routes decoded frames.  Shared across epochs.
pub struct Dispatcher {
    handler: Arc<dyn CommandHandler>,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    /// `max_concurrent` caps how many commands run at once; extra commands
    /// wait for a slot without blocking the listener.
    pub fn new(handler: Arc<dyn CommandHandler>, max_concurrent: usize) -> Self {
        Self {
            handler,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Process one text frame.  Malformed or unexpected frames are logged and
    /// yield [`ControlAction::None`]: they never end the session.
    pub fn handle_text(&self, text: &str) -> ControlAction {
        let frame = match InboundFrame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, frame = %text, "failed to parse message");
                return ControlAction::None;
            }
        };
        tracing::trace!(kind = frame.kind(), "frame received");

        match frame {
            InboundFrame::Ping => {
                tracing::trace!("server ping");
                ControlAction::None
            }
            InboundFrame::Welcome => {
                tracing::debug!("server welcome");
                ControlAction::None
            }
            InboundFrame::ConfirmSubscription { identifier } => {
                match identifier.as_deref().map(TunnelIdentity::from_identifier) {
                    Some(Ok(identity)) => {
                        tracing::info!(tunnel = %identity.tunnel, "connected to tunnel");
                    }
                    _ => tracing::info!("subscription confirmed"),
                }
                ControlAction::None
            }
            InboundFrame::RejectSubscription => {
                tracing::error!("connection to tunnel refused, check the token and tunnel id");
                ControlAction::Disconnect
            }
            InboundFrame::Disconnect { reason, reconnect } => on_disconnect(reason, reconnect),
            InboundFrame::Unknown { kind } => {
                tracing::warn!(%kind, frame = %text, "unknown message type");
                ControlAction::None
            }
            InboundFrame::ChannelData(data) => {
                match data.payload() {
                    Ok(ChannelPayload::Command { identity, command }) => {
                        self.dispatch(identity, command);
                    }
                    Ok(ChannelPayload::Info { info, .. }) => match info.as_str() {
                        Some(info) => tracing::info!("server info: {info}"),
                        None => tracing::info!("server info: {info}"),
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, frame = %text, "ignoring channel data");
                    }
                }
                ControlAction::None
            }
        }
    }

    /// Run the handler on its own task so the listener keeps reading.
    fn dispatch(&self, identity: TunnelIdentity, command: String) {
        let handler = self.handler.clone();
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let ctx = CommandContext { identity };
            let outcome = AssertUnwindSafe(handler.handle(ctx, command.clone()))
                .catch_unwind()
                .await;
            if outcome.is_err() {
                tracing::error!(%command, "command handler panicked");
            }
        });
    }
}

fn on_disconnect(reason: Option<DisconnectReason>, reconnect: Option<bool>) -> ControlAction {
    match &reason {
        Some(DisconnectReason::Other(raw)) => {
            tracing::warn!(reason = %raw, "server disconnected with unknown reason");
        }
        Some(reason) => tracing::info!(reason = reason.describe(), "server disconnected"),
        None => tracing::info!("server disconnected"),
    }
    if reconnect == Some(true) {
        ControlAction::Reconnect
    } else {
        tracing::info!("server asked us not to reconnect");
        ControlAction::Disconnect
    }
}

/// Read frames until the epoch ends, then report why.
///
/// On a read error or a terminal frame the listener cancels `shutdown` first
/// and then offers the action on `results`.  The send never blocks: if a
/// value is already queued, this one is dropped.  When `shutdown` fires from
/// elsewhere the listener simply returns.
pub async fn listen<S: Link>(
    mut receiver: TransportReceiver<S>,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
    results: mpsc::Sender<ControlAction>,
) {
    loop {
        let text = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                tracing::debug!("listener stopping");
                return;
            }
            r = receiver.recv() => match r {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "message read error");
                    finish(&shutdown, &results, ControlAction::Reconnect);
                    return;
                }
            },
        };

        match dispatcher.handle_text(&text) {
            ControlAction::None => {}
            action => {
                finish(&shutdown, &results, action);
                return;
            }
        }
    }
}

fn finish(shutdown: &CancellationToken, results: &mpsc::Sender<ControlAction>, action: ControlAction) {
    shutdown.cancel();
    if results.try_send(action).is_err() {
        tracing::debug!(?action, "session manager already has a result, dropping");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    struct Recorder(mpsc::UnboundedSender<(String, String)>);

    #[async_trait::async_trait]
    impl CommandHandler for Recorder {
        async fn handle(&self, ctx: CommandContext, command: String) {
            let _ = self.0.send((ctx.identity.tunnel, command));
        }
    }

    struct Panicker;

    #[async_trait::async_trait]
    impl CommandHandler for Panicker {
        async fn handle(&self, _ctx: CommandContext, _command: String) {
            panic!("boom");
        }
    }

    fn recorder() -> (Dispatcher, mpsc::UnboundedReceiver<(String, String)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Dispatcher::new(Arc::new(Recorder(tx)), 4), rx)
    }

    fn command_frame(channel: &str, tunnel: &str, command: &str) -> String {
        let identifier = serde_json::json!({ "channel": channel, "tunnel": tunnel }).to_string();
        serde_json::json!({ "identifier": identifier, "message": { "command": command } }).to_string()
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<(String, String)>) -> (String, String) {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("handler was not invoked")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn control_frames_keep_the_session() {
        let (d, _rx) = recorder();
        assert_eq!(d.handle_text(r#"{"type":"ping","message":1700000000}"#), ControlAction::None);
        assert_eq!(d.handle_text(r#"{"type":"welcome"}"#), ControlAction::None);
        assert_eq!(
            d.handle_text(r#"{"type":"confirm_subscription","identifier":"{\"channel\":\"CommandChannel\",\"tunnel\":\"T1\"}"}"#),
            ControlAction::None
        );
        assert_eq!(d.handle_text(r#"{"type":"something_new"}"#), ControlAction::None);
    }

    #[tokio::test]
    async fn reject_subscription_disconnects() {
        let (d, _rx) = recorder();
        assert_eq!(d.handle_text(r#"{"type":"reject_subscription"}"#), ControlAction::Disconnect);
    }

    #[tokio::test]
    async fn disconnect_honours_reconnect_flag() {
        let (d, _rx) = recorder();
        assert_eq!(
            d.handle_text(r#"{"type":"disconnect","reason":"server_restart","reconnect":true}"#),
            ControlAction::Reconnect
        );
        assert_eq!(
            d.handle_text(r#"{"type":"disconnect","reason":"unauthorized","reconnect":false}"#),
            ControlAction::Disconnect
        );
        assert_eq!(d.handle_text(r#"{"type":"disconnect"}"#), ControlAction::Disconnect);
        assert_eq!(
            d.handle_text(r#"{"type":"disconnect","reason":"weird","reconnect":true}"#),
            ControlAction::Reconnect
        );
    }

    #[tokio::test]
    async fn malformed_frames_are_ignored() {
        let (d, _rx) = recorder();
        assert_eq!(d.handle_text("not json"), ControlAction::None);
        assert_eq!(d.handle_text("[1,2,3]"), ControlAction::None);
        assert_eq!(d.handle_text(r#"{"message":{"command":"ls"}}"#), ControlAction::None);
        assert_eq!(d.handle_text(r#"{"identifier":"nope","message":{"command":"ls"}}"#), ControlAction::None);
    }

    #[tokio::test]
    async fn command_reaches_the_handler() {
        let (d, mut rx) = recorder();
        let action = d.handle_text(&command_frame("CommandChannel", "T1", "echo hi"));
        assert_eq!(action, ControlAction::None);
        assert_eq!(next(&mut rx).await, ("T1".into(), "echo hi".into()));
    }

    #[tokio::test]
    async fn other_channels_never_run_commands() {
        let (d, mut rx) = recorder();
        d.handle_text(&command_frame("Other", "T1", "rm -rf /tmp/x"));
        d.handle_text(&command_frame("CommandChannel", "T1", "echo ok"));
        assert_eq!(next(&mut rx).await.1, "echo ok");
    }

    #[tokio::test]
    async fn info_only_is_not_executed() {
        let (d, mut rx) = recorder();
        let identifier = r#"{\"channel\":\"CommandChannel\",\"tunnel\":\"T1\"}"#;
        let frame = format!(r#"{{"identifier":"{identifier}","message":{{"info":"maintenance at 5"}}}}"#);
        assert_eq!(d.handle_text(&frame), ControlAction::None);
        d.handle_text(&command_frame("CommandChannel", "T1", "after"));
        assert_eq!(next(&mut rx).await.1, "after");
    }

    #[tokio::test]
    async fn panicking_handler_is_contained() {
        let d = Dispatcher::new(Arc::new(Panicker), 1);
        d.handle_text(&command_frame("CommandChannel", "T1", "x"));
        // The permit is released even though the handler panicked.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let permit = tokio::time::timeout(Duration::from_secs(1), d.permits.clone().acquire_owned())
            .await
            .expect("permit leaked");
        assert!(permit.is_ok());
    }

    #[tokio::test]
    async fn finish_cancels_then_reports_once() {
        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(1);
        finish(&token, &tx, ControlAction::Reconnect);
        finish(&token, &tx, ControlAction::Disconnect);
        assert!(token.is_cancelled());
        assert_eq!(rx.recv().await, Some(ControlAction::Reconnect));
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }
}

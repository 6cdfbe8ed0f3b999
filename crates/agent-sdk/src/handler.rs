//! Command handlers: what the agent does with a command received on the
//! control channel.

use tracing::Instrument;

use bc_tools::ShellExecutor;

use crate::types::CommandContext;

/// Implement this trait to handle commands pushed by the server.
///
/// The dispatcher runs each command on its own task, so a slow handler never
/// blocks the listener or the heartbeat.  Handlers report through logs; the
/// protocol has no result frame.
///
/// # Example
///
/// ```rust,no_run
/// use bc_agent_sdk::{CommandContext, CommandHandler};
///
/// struct EchoHandler;
///
/// #[async_trait::async_trait]
/// impl CommandHandler for EchoHandler {
///     async fn handle(&self, ctx: CommandContext, command: String) {
///         tracing::info!(tunnel = %ctx.identity.tunnel, %command, "got command");
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    /// Handle one command.
    ///
    /// * `ctx`: identity of the frame that carried the command
    /// * `command`: raw command text, exactly as received
    async fn handle(&self, ctx: CommandContext, command: String);
}

/// Shell commands: the agent's production handler.
#[async_trait::async_trait]
impl CommandHandler for ShellExecutor {
    async fn handle(&self, ctx: CommandContext, command: String) {
        let span = tracing::info_span!("command", tunnel = %ctx.identity.tunnel);
        tracing::info!(parent: &span, %command, "received command");
        self.execute(&command).instrument(span).await;
    }
}

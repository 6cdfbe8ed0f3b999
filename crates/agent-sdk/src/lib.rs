//! `bc-agent-sdk`: persistent control-channel client for birdcmd agents.
//!
//! An agent keeps one authenticated WebSocket open to the birdcmd server,
//! subscribes to the command channel of its tunnel, and hands every command
//! it receives to a [`CommandHandler`].  This crate owns connection
//! management, the subscription, the heartbeat, and reconnects, so the
//! binary only decides what a command does.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  birdcmd (CLI)                                            │
//! │                                                           │
//! │   let exec = ShellExecutor::new(&cfg.exec);               │
//! │                                                           │
//! │   AgentClientBuilder::new()                               │
//! │       .config(&cfg)                                       │
//! │       .build()?                                           │
//! │       .run(Arc::new(exec), shutdown)                      │
//! │       .await;                                             │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Connection flow
//!
//! 1. Connect WS with `Authorization: Bearer <token>`; on failure wait the
//!    fixed retry interval and try again.
//! 2. Send `subscribe` for `{"channel":"CommandChannel","tunnel":<id>}`;
//!    if that write fails the agent stops.
//! 3. Start the listener (reads and dispatches frames) and the heartbeat
//!    (`heartbeat_ping` every interval ± jitter).
//! 4. Wait for the first lifecycle action:
//!    - `Reconnect` (read error, `disconnect` with `reconnect: true`):
//!      tear down, sleep a random jitter, go to 1.
//!    - `Disconnect` (`reject_subscription`, other `disconnect`): tear down
//!      and return.
//!
//! Commands run on their own tasks and never block the listener.

pub mod builder;
pub mod client;
pub mod dispatch;
pub mod handler;
pub mod heartbeat;
pub mod reconnect;
pub mod transport;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::AgentClientBuilder;
pub use client::AgentClient;
pub use dispatch::Dispatcher;
pub use handler::CommandHandler;
pub use heartbeat::HeartbeatSchedule;
pub use reconnect::ReconnectPolicy;
pub use types::{AgentError, CommandContext, ControlAction};

pub use bc_protocol::TunnelIdentity;

//! Local command execution for birdcmd.
//!
//! - `exec`: run one shell command under a hard deadline, killing its whole
//!   process group on timeout
//! - `output`: the capped buffer stdout and stderr are merged into

pub mod exec;
pub mod output;

pub use exec::{ExecOutcome, ExecStatus, ShellExecutor};
pub use output::OutputBuffer;

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Command execution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Deadline for a command when `long_running` is off.
pub const SHORT_TIMEOUT_SECS: u64 = 10;
/// Deadline for a command when `long_running` is on.
pub const LONG_TIMEOUT_SECS: u64 = 600;

/// Configuration for the shell command executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Allow commands to run for up to ten minutes instead of ten seconds.
    #[serde(default)]
    pub long_running: bool,
    /// Max output chars kept per command.
    #[serde(default = "d_1000000")]
    pub max_output_chars: usize,
    /// Max commands running at once; further commands wait for a slot.
    #[serde(default = "d_16")]
    pub max_concurrent: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            long_running: false,
            max_output_chars: 1_000_000,
            max_concurrent: 16,
        }
    }
}

impl ExecConfig {
    /// Hard deadline applied to every command.
    pub fn timeout(&self) -> Duration {
        if self.long_running {
            Duration::from_secs(LONG_TIMEOUT_SECS)
        } else {
            Duration::from_secs(SHORT_TIMEOUT_SECS)
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_1000000() -> usize {
    1_000_000
}
fn d_16() -> usize {
    16
}

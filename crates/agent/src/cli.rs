use anyhow::Context;
use clap::Parser;

use bc_domain::config::{parse_credentials, AgentConfig, ConfigSeverity, Region};

/// Keeps this machine reachable from your birdcmd tunnel.
#[derive(Debug, Parser)]
#[command(name = "birdcmd", version, about, disable_version_flag = true)]
pub struct Cli {
    /// Credentials in the format token:tunnelId, e.g. `-c 12a7W55y:ffe9-eew3`.
    #[arg(short = 'c', long = "credentials", value_name = "TOKEN:TUNNEL_ID")]
    pub credentials: Option<String>,

    /// Development mode: local server, short intervals, verbose logs.
    #[arg(short = 'd', long = "dev")]
    pub dev: bool,

    /// Use the China mainland server.
    #[arg(long)]
    pub cn: bool,

    /// Allow commands to run for up to ten minutes instead of ten seconds.
    #[arg(long)]
    pub long_running: bool,

    /// Optional TOML config file (falls back to `BIRDCMD_CONFIG`).
    #[arg(long, value_name = "FILE")]
    pub config: Option<String>,

    /// Print version information.
    #[arg(short = 'v', long = "version")]
    pub version: bool,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the config file named by `--config` or `BIRDCMD_CONFIG`, if any.
/// Returns the parsed [`AgentConfig`] and the path that was used.
///
/// A path that was asked for but cannot be read is an error; with no path
/// at all the defaults are used.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<(AgentConfig, Option<String>)> {
    let config_path = explicit
        .map(str::to_owned)
        .or_else(|| std::env::var("BIRDCMD_CONFIG").ok());

    let config = match &config_path {
        Some(path) => AgentConfig::load(path).with_context(|| format!("loading {path}"))?,
        None => AgentConfig::default(),
    };

    Ok((config, config_path))
}

/// Layer the command-line flags over the file config, then apply the
/// development preset.
pub fn apply_flags(mut config: AgentConfig, cli: &Cli) -> anyhow::Result<AgentConfig> {
    if let Some(raw) = &cli.credentials {
        let (token, tunnel_id) = parse_credentials(raw)?;
        config.token = token;
        config.tunnel_id = tunnel_id;
    }
    if cli.dev {
        config.dev_mode = true;
    }
    if cli.cn {
        config.server.region = Region::Cn;
    }
    if cli.long_running {
        config.exec.long_running = true;
    }
    Ok(config.resolve())
}

/// Print every validation issue.  Returns `false` when any is an error.
pub fn report_issues(config: &AgentConfig) -> bool {
    let issues = config.validate();
    let mut ok = true;
    for issue in &issues {
        eprintln!("{issue}");
        if issue.severity == ConfigSeverity::Error {
            ok = false;
        }
    }
    ok
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("birdcmd").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn credentials_flag_fills_identity() {
        let cli = parse(&["-c", "12a7W55y:ffe9-eew3"]);
        let cfg = apply_flags(AgentConfig::default(), &cli).unwrap();
        assert_eq!(cfg.token, "12a7W55y");
        assert_eq!(cfg.tunnel_id, "ffe9-eew3");
        assert_eq!(cfg.endpoint_url(), "wss://www.birdcmd.com/cable");
        assert!(report_issues(&cfg));
    }

    #[test]
    fn malformed_credentials_are_rejected() {
        let cli = parse(&["-c", "no-colon-here"]);
        assert!(apply_flags(AgentConfig::default(), &cli).is_err());
    }

    #[test]
    fn missing_credentials_fail_validation() {
        let cli = parse(&[]);
        let cfg = apply_flags(AgentConfig::default(), &cli).unwrap();
        assert!(!report_issues(&cfg));
    }

    #[test]
    fn dev_flag_selects_local_server() {
        let cli = parse(&["-c", "t:u", "-d"]);
        let cfg = apply_flags(AgentConfig::default(), &cli).unwrap();
        assert_eq!(cfg.endpoint_url(), "ws://localhost:3000/cable");
        assert_eq!(cfg.session.heartbeat_interval(), Duration::from_secs(25));
        assert_eq!(cfg.session.reconnect_interval(), Duration::from_secs(2));
    }

    #[test]
    fn cn_flag_selects_mainland_server() {
        let cli = parse(&["-c", "t:u", "--cn"]);
        let cfg = apply_flags(AgentConfig::default(), &cli).unwrap();
        assert_eq!(cfg.endpoint_url(), "wss://bird.gfgf.work/cable");
    }

    #[test]
    fn long_running_flag_extends_deadline() {
        let cli = parse(&["-c", "t:u", "--long-running"]);
        let cfg = apply_flags(AgentConfig::default(), &cli).unwrap();
        assert_eq!(cfg.exec.timeout(), Duration::from_secs(600));
    }

    #[test]
    fn flags_override_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("birdcmd.toml");
        std::fs::write(
            &path,
            "token = \"from-file\"\ntunnel_id = \"file-tunnel\"\n[exec]\nmax_concurrent = 2\n",
        )
        .unwrap();

        let (file_cfg, used) = load_config(path.to_str()).unwrap();
        assert_eq!(used.as_deref(), path.to_str());

        let cli = parse(&["-c", "cli-token:cli-tunnel"]);
        let cfg = apply_flags(file_cfg, &cli).unwrap();
        assert_eq!(cfg.token, "cli-token");
        assert_eq!(cfg.tunnel_id, "cli-tunnel");
        assert_eq!(cfg.exec.max_concurrent, 2);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(load_config(Some("/definitely/not/here.toml")).is_err());
    }

    #[test]
    fn version_flag_needs_no_credentials() {
        let cli = parse(&["-v"]);
        assert!(cli.version);
        assert!(cli.credentials.is_none());
    }
}

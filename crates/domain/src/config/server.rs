use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server endpoint
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which hosted server to talk to when no explicit `host` is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    #[default]
    Global,
    /// Mainland China mirror.
    Cn,
}

impl Region {
    pub fn host(self) -> &'static str {
        match self {
            Region::Global => "www.birdcmd.com",
            Region::Cn => "bird.gfgf.work",
        }
    }
}

/// Where the control channel lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub region: Region,
    /// `ws` or `wss`.
    #[serde(default = "d_scheme")]
    pub scheme: String,
    /// Explicit `host[:port]`.  Overrides `region` when set.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "d_path")]
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            region: Region::Global,
            scheme: d_scheme(),
            host: None,
            path: d_path(),
        }
    }
}

impl ServerConfig {
    /// Local development server.
    pub fn development() -> Self {
        Self {
            region: Region::Global,
            scheme: "ws".into(),
            host: Some("localhost:3000".into()),
            path: d_path(),
        }
    }

    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or_else(|| self.region.host())
    }

    pub fn endpoint_url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host(), self.path)
    }
}

fn d_scheme() -> String {
    "wss".into()
}

fn d_path() -> String {
    "/cable".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint_is_global_wss() {
        assert_eq!(
            ServerConfig::default().endpoint_url(),
            "wss://www.birdcmd.com/cable"
        );
    }

    #[test]
    fn region_selects_host() {
        let cfg = ServerConfig {
            region: Region::Cn,
            ..Default::default()
        };
        assert_eq!(cfg.endpoint_url(), "wss://bird.gfgf.work/cable");
    }

    #[test]
    fn explicit_host_wins_over_region() {
        let cfg = ServerConfig {
            region: Region::Cn,
            host: Some("127.0.0.1:9000".into()),
            scheme: "ws".into(),
            ..Default::default()
        };
        assert_eq!(cfg.endpoint_url(), "ws://127.0.0.1:9000/cable");
    }
}

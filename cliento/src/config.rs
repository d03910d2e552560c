use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

/// Server used when no config file names one.
/// Override at build time: CLIENTO_SERVER_URL=ws://10.0.0.2:8000/ws cargo build
pub const DEFAULT_SERVER_URL: &str = match option_env!("CLIENTO_SERVER_URL") {
    Some(url) => url,
    None => "ws://127.0.0.1:8000/ws",
};

pub const CONFIG_FILE: &str = "configs/el_cliento_config.json";
const FALLBACK_CONFIG_FILE: &str = "el_cliento_config.json";

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(alias = "ip")]
    ip_destination: Option<String>,
    port: Option<Value>,
    #[serde(default)]
    dev_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub server_url: String,
    /// Sync every target even when versions match.
    pub dev_mode: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            dev_mode: false,
        }
    }
}

impl ClientConfig {
    pub fn load(root: &Path) -> Self {
        let Some(path) = Self::locate(root) else {
            log::warn!("Config file not found under {}. Using defaults.", root.display());
            return Self::default();
        };
        let raw = match std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str::<RawConfig>(&s).map_err(|e| e.to_string()))
        {
            Ok(raw) => raw,
            Err(e) => {
                log::error!("Failed to load config {}: {}", path.display(), e);
                return Self::default();
            }
        };
        let config = Self::from_raw(raw);
        log::info!(
            "Server URL set to: {}, Dev Mode: {}",
            config.server_url,
            config.dev_mode
        );
        config
    }

    fn locate(root: &Path) -> Option<PathBuf> {
        [root.join(CONFIG_FILE), root.join(FALLBACK_CONFIG_FILE)]
            .into_iter()
            .find(|p| p.is_file())
    }

    fn from_raw(raw: RawConfig) -> Self {
        let ip = raw
            .ip_destination
            .filter(|ip| !ip.trim().is_empty());
        let port = match raw.port {
            Some(Value::Number(n)) => n.as_u64().map(|n| n.to_string()),
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        };
        let server_url = match ip {
            Some(ip) => format!("ws://{}:{}/ws", ip.trim(), port.as_deref().unwrap_or("8000")),
            None => DEFAULT_SERVER_URL.to_string(),
        };
        Self {
            server_url,
            dev_mode: raw.dev_mode,
        }
    }
}

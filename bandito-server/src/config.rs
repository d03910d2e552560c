use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::store::json_file::{load_json, save_json, SaveOutcome};
use crate::store::secret::{decrypt_password, encrypt_password};

pub const SETTINGS_FILE: &str = "configs/el_bandito_config.json";
pub const DEFAULT_PORT: u16 = 8000;

/// Process configuration, read once at startup.
pub struct ServerConfig {
    /// Project root containing `cliento/`, `plugins/` and `configs/`.
    pub root: PathBuf,
    pub listen_addr: String,
    /// Where local editors reach the administrative endpoint.
    pub admin_url: String,
    /// Command that injects key chords for `shortcut` button actions.
    pub shortcut_helper: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let root = PathBuf::from(std::env::var("BANDITO_ROOT").unwrap_or_else(|_| ".".to_string()));
        let settings = ServerSettings::load(&root);
        let port = settings.port.unwrap_or(DEFAULT_PORT);
        Self {
            listen_addr: std::env::var("LISTEN_ADDR")
                .unwrap_or_else(|_| format!("0.0.0.0:{}", port)),
            admin_url: std::env::var("BANDITO_ADMIN_URL")
                .unwrap_or_else(|_| format!("http://127.0.0.1:{}", port)),
            shortcut_helper: std::env::var("BANDITO_SHORTCUT_HELPER")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            root,
        }
    }
}

/// Operator settings stored in `configs/el_bandito_config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default, alias = "last_ip_source")]
    pub ip_source: String,
    #[serde(default)]
    pub ip_destination: String,
    #[serde(
        default,
        deserialize_with = "lenient_port",
        serialize_with = "port_as_string"
    )]
    pub port: Option<u16>,
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    password_encrypted: String,
}

impl ServerSettings {
    pub fn load(root: &Path) -> Self {
        load_json(&root.join(SETTINGS_FILE))
    }

    pub fn save(&self, root: &Path) -> SaveOutcome {
        save_json(&root.join(SETTINGS_FILE), self)
    }

    pub fn password(&self) -> String {
        decrypt_password(&self.password_encrypted)
    }

    pub fn set_password(&mut self, password: &str) {
        self.password_encrypted = encrypt_password(password);
    }
}

// The port has been stored both as a number and as a string.
fn lenient_port<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u16>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn port_as_string<S: serde::Serializer>(port: &Option<u16>, serializer: S) -> Result<S::Ok, S::Error> {
    match port {
        Some(p) => serializer.serialize_str(&p.to_string()),
        None => serializer.serialize_str(""),
    }
}

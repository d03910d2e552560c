use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ── Command tags ────────────────────────────────────────────────────────────

pub const UPDATE_GET_VER: &str = "UPDATE_GET_VER";
pub const UPDATE_GET_MANIFEST: &str = "UPDATE_GET_MANIFEST";
pub const UPDATE_DOWNLOAD_FILE: &str = "UPDATE_DOWNLOAD_FILE";
pub const PLUGIN_LIST_ALL: &str = "PLUGIN_LIST_ALL";
pub const PLUGIN_UPDATE_GET_VER: &str = "PLUGIN_UPDATE_GET_VER";
pub const PLUGIN_UPDATE_GET_MANIFEST: &str = "PLUGIN_UPDATE_GET_MANIFEST";
pub const GET_PLUGIN_SLOTS: &str = "GET_PLUGIN_SLOTS";
pub const CLIENT_SET_ACTIVE_SLOT: &str = "CLIENT_SET_ACTIVE_SLOT";
pub const PLUGIN_BUTTON_PRESS: &str = "PLUGIN_BUTTON_PRESS";

pub const UPDATE_RESPONSE_VER: &str = "UPDATE_RESPONSE_VER";
pub const UPDATE_RESPONSE_MANIFEST: &str = "UPDATE_RESPONSE_MANIFEST";
pub const UPDATE_RESPONSE_FILE: &str = "UPDATE_RESPONSE_FILE";
pub const PLUGIN_LIST_RESPONSE: &str = "PLUGIN_LIST_RESPONSE";
pub const ERROR: &str = "error";

pub const UPDATE_PLUGIN_SLOTS: &str = "UPDATE_PLUGIN_SLOTS";
pub const SET_ACTIVE_SLOT: &str = "SET_ACTIVE_SLOT";

// ── Client → server ─────────────────────────────────────────────────────────

/// An outgoing command. Every request carries a fresh `id` that the server
/// echoes on its direct reply.
#[derive(Debug, Clone)]
pub struct Request {
    id: String,
    body: Map<String, Value>,
}

impl Request {
    pub fn new(command: &str) -> Self {
        let id = Uuid::new_v4().to_string();
        let mut body = Map::new();
        body.insert("command".into(), Value::String(command.to_string()));
        body.insert("id".into(), Value::String(id.clone()));
        Self { id, body }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.body.insert(key.to_string(), value.into());
        self
    }

    pub fn payload(self, payload: Value) -> Self {
        self.with("payload", payload)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn command(&self) -> &str {
        self.body
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.body.clone()).to_string()
    }
}

// ── Server → client ─────────────────────────────────────────────────────────

/// A server message sorted by envelope: direct replies carry `type`, state
/// pushes carry `command` and `data`.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Reply {
        kind: String,
        id: Option<String>,
        body: Value,
    },
    Push {
        command: String,
        data: Value,
    },
    Unknown(Value),
}

impl Inbound {
    pub fn classify(message: Value) -> Self {
        if let Some(command) = message.get("command").and_then(Value::as_str) {
            let command = command.to_string();
            let data = message.get("data").cloned().unwrap_or(Value::Null);
            return Inbound::Push { command, data };
        }
        if let Some(kind) = message.get("type").and_then(Value::as_str) {
            return Inbound::Reply {
                kind: kind.to_string(),
                id: message.get("id").and_then(Value::as_str).map(str::to_string),
                body: message,
            };
        }
        Inbound::Unknown(message)
    }
}

/// Error text of a failed reply, if it is one.
pub fn reply_error(body: &Value) -> Option<String> {
    let failed = body.get("type").and_then(Value::as_str) == Some(ERROR)
        || body.get("status").and_then(Value::as_str) == Some(ERROR);
    failed.then(|| {
        body.get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string()
    })
}

// ── Shared documents (mirror the server's models) ───────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub remote_path: String,
    pub local_dir: String,
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub is_directory: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    #[serde(default)]
    pub directories_to_ensure: Vec<String>,
    #[serde(default)]
    pub files_map: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon_path: Option<String>,
    #[serde(default)]
    pub action: Option<ButtonAction>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_carries_id() {
        let req = Request::new(PLUGIN_UPDATE_GET_VER).with("plugin_id", "a");
        let wire: Value = serde_json::from_str(&req.to_json()).unwrap();
        assert_eq!(wire["command"], PLUGIN_UPDATE_GET_VER);
        assert_eq!(wire["plugin_id"], "a");
        assert_eq!(wire["id"], req.id());
        assert_ne!(req.id(), Request::new(PLUGIN_UPDATE_GET_VER).id());
    }

    #[test]
    fn test_classify_envelopes() {
        let push = Inbound::classify(json!({"command": SET_ACTIVE_SLOT, "data": {"index": 2}}));
        assert_eq!(
            push,
            Inbound::Push {
                command: SET_ACTIVE_SLOT.into(),
                data: json!({"index": 2})
            }
        );

        let reply = Inbound::classify(json!({"type": UPDATE_RESPONSE_VER, "version": "1", "id": "x"}));
        assert!(matches!(reply, Inbound::Reply { ref kind, id: Some(ref id), .. } if kind == UPDATE_RESPONSE_VER && id == "x"));

        assert!(matches!(Inbound::classify(json!([1, 2])), Inbound::Unknown(_)));
    }

    #[test]
    fn test_reply_error() {
        assert_eq!(
            reply_error(&json!({"type": "error", "status": "error", "message": "bad"})),
            Some("bad".into())
        );
        assert_eq!(
            reply_error(&json!({"type": UPDATE_RESPONSE_VER, "status": "error", "message": "Plugin not found"})),
            Some("Plugin not found".into())
        );
        assert_eq!(reply_error(&json!({"type": UPDATE_RESPONSE_VER, "version": "1"})), None);
    }
}

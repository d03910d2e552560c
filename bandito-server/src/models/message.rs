use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::manifest::FileManifest;

// ── Client → server ──────────────────────────────────────────────────────────

/// Inbound requests, tagged by `command`.
///
/// Tags that are not listed here deserialize as [`Request::Other`] and are
/// forwarded to the local observer untouched.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command")]
pub enum Request {
    #[serde(rename = "UPDATE_GET_VER")]
    UpdateGetVer,
    #[serde(rename = "UPDATE_GET_MANIFEST")]
    UpdateGetManifest,
    #[serde(rename = "PLUGIN_LIST_ALL")]
    PluginListAll,
    #[serde(rename = "PLUGIN_UPDATE_GET_VER")]
    PluginUpdateGetVer { plugin_id: String },
    #[serde(rename = "PLUGIN_UPDATE_GET_MANIFEST")]
    PluginUpdateGetManifest { plugin_id: String },
    #[serde(rename = "GET_PLUGIN_SLOTS")]
    GetPluginSlots,
    #[serde(rename = "UPDATE_DOWNLOAD_FILE")]
    UpdateDownloadFile { path: String },
    #[serde(rename = "CLIENT_SET_ACTIVE_SLOT")]
    ClientSetActiveSlot {
        #[serde(default)]
        payload: ActiveSlotPayload,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActiveSlotPayload {
    pub index: Option<u8>,
}

// ── Server → client: direct replies (`type` envelope) ────────────────────────

const STATUS_ERROR: &str = "error";

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Reply {
    #[serde(rename = "UPDATE_RESPONSE_VER")]
    Version {
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<&'static str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(rename = "UPDATE_RESPONSE_MANIFEST")]
    Manifest {
        manifest: FileManifest,
        #[serde(skip_serializing_if = "Option::is_none")]
        plugin_id: Option<String>,
    },
    #[serde(rename = "UPDATE_RESPONSE_FILE")]
    File { path: String, data: String },
    #[serde(rename = "PLUGIN_LIST_RESPONSE")]
    PluginList { plugins: Vec<String> },
    #[serde(rename = "error")]
    Error {
        status: &'static str,
        message: String,
    },
}

impl Reply {
    pub fn version(version: String) -> Self {
        Reply::Version {
            version: Some(version),
            status: None,
            message: None,
        }
    }

    /// Version lookup failure, kept under the version tag so plugin updaters
    /// can tell "plugin missing on server" apart from a protocol error.
    pub fn version_error(message: impl Into<String>) -> Self {
        Reply::Version {
            version: None,
            status: Some(STATUS_ERROR),
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error {
            status: STATUS_ERROR,
            message: message.into(),
        }
    }

    /// Wire form of the reply, echoing the request id when there was one.
    pub fn into_message(self, id: Option<&str>) -> Value {
        let mut value = serde_json::to_value(&self).unwrap_or(Value::Null);
        if let (Some(id), Value::Object(map)) = (id, &mut value) {
            map.insert("id".to_string(), Value::String(id.to_string()));
        }
        value
    }
}

// ── Server → client: pushes (`command` + `data` envelope) ────────────────────

pub const UPDATE_PLUGIN_SLOTS: &str = "UPDATE_PLUGIN_SLOTS";
pub const SET_ACTIVE_SLOT: &str = "SET_ACTIVE_SLOT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Push {
    pub command: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Value,
}

impl Push {
    pub fn new(command: impl Into<String>, data: Value) -> Self {
        Self {
            command: command.into(),
            data,
        }
    }

    pub fn plugin_slots(slots: serde_json::Map<String, Value>) -> Self {
        Self::new(UPDATE_PLUGIN_SLOTS, Value::Object(slots))
    }

    pub fn active_slot(index: Option<u8>) -> Self {
        Self::new(SET_ACTIVE_SLOT, serde_json::json!({ "index": index }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_command_is_other() {
        let req: Request =
            serde_json::from_value(json!({"command": "PLUGIN_BUTTON_PRESS", "payload": {"id": "1:x"}}))
                .unwrap();
        assert!(matches!(req, Request::Other));
    }

    #[test]
    fn test_unit_request_ignores_extra_fields() {
        let req: Request =
            serde_json::from_value(json!({"command": "GET_PLUGIN_SLOTS", "payload": {}, "id": "r1"}))
                .unwrap();
        assert!(matches!(req, Request::GetPluginSlots));
    }

    #[test]
    fn test_active_slot_payload() {
        let req: Request = serde_json::from_value(
            json!({"command": "CLIENT_SET_ACTIVE_SLOT", "payload": {"index": 3}}),
        )
        .unwrap();
        match req {
            Request::ClientSetActiveSlot { payload } => assert_eq!(payload.index, Some(3)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_reply_envelopes() {
        let ok = Reply::version("1.2".into()).into_message(Some("abc"));
        assert_eq!(ok, json!({"type": "UPDATE_RESPONSE_VER", "version": "1.2", "id": "abc"}));

        let failed = Reply::version_error("Plugin not found").into_message(None);
        assert_eq!(
            failed,
            json!({"type": "UPDATE_RESPONSE_VER", "status": "error", "message": "Plugin not found"})
        );

        let err = serde_json::to_value(Reply::error("bad")).unwrap();
        assert_eq!(err, json!({"type": "error", "status": "error", "message": "bad"}));
    }

    #[test]
    fn test_push_envelope() {
        let push = serde_json::to_value(Push::active_slot(Some(3))).unwrap();
        assert_eq!(push, json!({"command": "SET_ACTIVE_SLOT", "data": {"index": 3}}));
    }
}

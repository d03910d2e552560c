//! Inbound command dispatch.
//!
//! Every text frame from a client passes through [`dispatch`]. Each command
//! is answered directly, broadcast, forwarded to the event sink, or some
//! combination, and control always returns to the connection's receive loop.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use serde_json::Value;

use crate::distribution::paths::is_safe_plugin_id;
use crate::distribution::Distribution;
use crate::error::{DistributionError, RouterError};
use crate::hub::ConnectionId;
use crate::models::layout::is_valid_slot;
use crate::models::message::{Push, Reply, Request};
use crate::AppState;

const PREVIEW_CHARS: usize = 100;

pub async fn dispatch(state: &AppState, conn: ConnectionId, text: &str) {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            let preview: String = text.chars().take(PREVIEW_CHARS).collect();
            state
                .events
                .on_error(&format!("Invalid JSON received: {} ({})", e, preview));
            return;
        }
    };
    let id = value.get("id").and_then(Value::as_str).map(str::to_string);

    let request = match Request::deserialize(&value) {
        Ok(r) => r,
        Err(e) => {
            let message = format!("Invalid message: {}", e);
            state.events.on_error(&message);
            reply(state, conn, id.as_deref(), Reply::error(message)).await;
            return;
        }
    };

    match handle(state, conn, request, &value).await {
        Ok(Some(response)) => reply(state, conn, id.as_deref(), response).await,
        Ok(None) => {}
        Err(e) => {
            tracing::warn!("Command failed for {}: {}", conn, e);
            reply(state, conn, id.as_deref(), Reply::error(e.to_string())).await;
        }
    }
}

async fn reply(state: &AppState, conn: ConnectionId, id: Option<&str>, response: Reply) {
    if !state.hub.unicast(conn, &response.into_message(id)).await {
        tracing::debug!("Reply dropped, connection {} is gone", conn);
    }
}

/// Runs filesystem work off the async executor.
async fn blocking<T, F>(state: &AppState, f: F) -> Result<T, RouterError>
where
    T: Send + 'static,
    F: FnOnce(&Distribution) -> Result<T, DistributionError> + Send + 'static,
{
    let distribution = state.distribution.clone();
    Ok(tokio::task::spawn_blocking(move || f(&*distribution)).await??)
}

async fn handle(
    state: &AppState,
    conn: ConnectionId,
    request: Request,
    raw: &Value,
) -> Result<Option<Reply>, RouterError> {
    match request {
        Request::UpdateGetVer => {
            let version = blocking(state, |d| d.core_version()).await?;
            Ok(Some(Reply::version(version)))
        }

        Request::UpdateGetManifest => {
            let manifest = blocking(state, |d| d.core_manifest()).await?;
            Ok(Some(Reply::Manifest {
                manifest,
                plugin_id: None,
            }))
        }

        Request::PluginListAll => {
            let plugins = blocking(state, |d| Ok(d.list_plugins())).await?;
            Ok(Some(Reply::PluginList { plugins }))
        }

        Request::PluginUpdateGetVer { plugin_id } => {
            if !is_safe_plugin_id(&plugin_id) {
                return Ok(Some(Reply::version_error(format!(
                    "Invalid plugin id: {}",
                    plugin_id
                ))));
            }
            let lookup = plugin_id.clone();
            match blocking(state, move |d| d.plugin_version(&lookup)).await {
                Ok(version) => Ok(Some(Reply::version(version))),
                Err(e) => Ok(Some(Reply::version_error(e.to_string()))),
            }
        }

        Request::PluginUpdateGetManifest { plugin_id } => {
            if !is_safe_plugin_id(&plugin_id) {
                return Err(DistributionError::InvalidPluginId(plugin_id).into());
            }
            let lookup = plugin_id.clone();
            let manifest = blocking(state, move |d| d.plugin_manifest(&lookup)).await?;
            Ok(Some(Reply::Manifest {
                manifest,
                plugin_id: Some(plugin_id),
            }))
        }

        Request::GetPluginSlots => {
            let slots = state.slots.read_populated();
            if !state.hub.unicast(conn, &Push::plugin_slots(slots)).await {
                tracing::debug!("Slot list dropped, connection {} is gone", conn);
            }
            Ok(None)
        }

        Request::UpdateDownloadFile { path } => {
            let lookup = path.clone();
            let bytes = blocking(state, move |d| d.read_file(&lookup)).await?;
            tracing::debug!("Sending {} ({} bytes) to {}", path, bytes.len(), conn);
            Ok(Some(Reply::File {
                path,
                data: BASE64.encode(bytes),
            }))
        }

        Request::ClientSetActiveSlot { payload } => {
            if let Some(index) = payload.index.filter(|i| !is_valid_slot(*i)) {
                return Err(RouterError::InvalidSlot(index));
            }
            state.events.on_command(raw);
            state.slots.set_active(payload.index);
            let delivered = state.hub.broadcast(&Push::active_slot(payload.index)).await;
            tracing::debug!("SET_ACTIVE_SLOT {:?} sent to {} clients", payload.index, delivered);
            Ok(None)
        }

        Request::Other => {
            state.events.on_command(raw);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::events::{ChannelSink, ServerEvent};
    use crate::hub::OUTBOX_CAPACITY;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        state: AppState,
        events: mpsc::UnboundedReceiver<(chrono::DateTime<chrono::Utc>, ServerEvent)>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "cliento/ver", "1.0.0");
        write(
            dir.path(),
            "cliento/cliento_manifest.json",
            r#"{"files_map": [{"remote_path": "cliento/app.py", "local_dir": "cliento"}]}"#,
        );
        write(dir.path(), "cliento/app.py", "print(1)");
        write(dir.path(), "plugins/a/ver_a", "1");
        write(dir.path(), "plugins/a/a_manifest.json", r#"{"files_map": []}"#);
        write(
            dir.path(),
            "configs/plugin_slots.json",
            r#"{"slot_1": {"id": "a", "name": "A", "version": "1", "path": "a"}, "slot_2": null}"#,
        );

        let (sink, events) = ChannelSink::channel();
        let state = AppState::new(dir.path().to_path_buf(), Arc::new(sink));
        Fixture {
            _dir: dir,
            state,
            events,
        }
    }

    fn connect(state: &AppState) -> (ConnectionId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        (state.hub.register(tx), rx)
    }

    async fn next_json(rx: &mut mpsc::Receiver<String>) -> Value {
        serde_json::from_str(&rx.recv().await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_version_reply_echoes_id() {
        let fx = fixture();
        let (conn, mut rx) = connect(&fx.state);

        dispatch(&fx.state, conn, r#"{"command": "UPDATE_GET_VER", "id": "r1"}"#).await;
        assert_eq!(
            next_json(&mut rx).await,
            json!({"type": "UPDATE_RESPONSE_VER", "version": "1.0.0", "id": "r1"})
        );
    }

    #[tokio::test]
    async fn test_core_manifest_has_digests() {
        let fx = fixture();
        let (conn, mut rx) = connect(&fx.state);

        dispatch(&fx.state, conn, r#"{"command": "UPDATE_GET_MANIFEST"}"#).await;
        let reply = next_json(&mut rx).await;
        assert_eq!(reply["type"], "UPDATE_RESPONSE_MANIFEST");
        assert_eq!(
            reply["manifest"]["files_map"][0]["md5"],
            crate::distribution::digest::md5_hex(b"print(1)")
        );
    }

    #[tokio::test]
    async fn test_plugin_version_errors_keep_version_tag() {
        let fx = fixture();
        let (conn, mut rx) = connect(&fx.state);

        dispatch(&fx.state, conn, r#"{"command": "PLUGIN_UPDATE_GET_VER", "plugin_id": "../a"}"#).await;
        let reply = next_json(&mut rx).await;
        assert_eq!(reply["type"], "UPDATE_RESPONSE_VER");
        assert_eq!(reply["status"], "error");

        dispatch(&fx.state, conn, r#"{"command": "PLUGIN_UPDATE_GET_VER", "plugin_id": "zzz"}"#).await;
        assert_eq!(next_json(&mut rx).await["status"], "error");

        dispatch(&fx.state, conn, r#"{"command": "PLUGIN_UPDATE_GET_VER", "plugin_id": "a"}"#).await;
        assert_eq!(next_json(&mut rx).await["version"], "1");
    }

    #[tokio::test]
    async fn test_download_rejects_escape() {
        let fx = fixture();
        let (conn, mut rx) = connect(&fx.state);

        dispatch(&fx.state, conn, r#"{"command": "UPDATE_DOWNLOAD_FILE", "path": "../etc/passwd"}"#).await;
        let reply = next_json(&mut rx).await;
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["status"], "error");

        dispatch(&fx.state, conn, r#"{"command": "UPDATE_DOWNLOAD_FILE", "path": "cliento/app.py"}"#).await;
        let reply = next_json(&mut rx).await;
        assert_eq!(reply["type"], "UPDATE_RESPONSE_FILE");
        assert_eq!(reply["data"], BASE64.encode("print(1)"));
    }

    #[tokio::test]
    async fn test_get_plugin_slots_drops_empty() {
        let fx = fixture();
        let (conn, mut rx) = connect(&fx.state);

        dispatch(&fx.state, conn, r#"{"command": "GET_PLUGIN_SLOTS"}"#).await;
        let push = next_json(&mut rx).await;
        assert_eq!(push["command"], "UPDATE_PLUGIN_SLOTS");
        assert_eq!(push["data"].as_object().unwrap().len(), 1);
        assert_eq!(push["data"]["slot_1"]["id"], "a");
    }

    #[tokio::test]
    async fn test_slot_request_from_departed_connection_is_dropped() {
        let mut fx = fixture();
        let (conn, rx) = connect(&fx.state);
        fx.state.hub.unregister(conn);
        drop(rx);

        dispatch(&fx.state, conn, r#"{"command": "GET_PLUGIN_SLOTS"}"#).await;
        assert!(fx.events.try_recv().is_err());
        assert!(fx.state.hub.is_empty());
    }

    #[tokio::test]
    async fn test_set_active_slot_reaches_everyone() {
        let mut fx = fixture();
        let (sender, mut rx_sender) = connect(&fx.state);
        let (_other, mut rx_other) = connect(&fx.state);

        dispatch(
            &fx.state,
            sender,
            r#"{"command": "CLIENT_SET_ACTIVE_SLOT", "payload": {"index": 3}}"#,
        )
        .await;

        let expected = json!({"command": "SET_ACTIVE_SLOT", "data": {"index": 3}});
        assert_eq!(next_json(&mut rx_sender).await, expected);
        assert_eq!(next_json(&mut rx_other).await, expected);

        let (_, event) = fx.events.recv().await.unwrap();
        assert!(matches!(event, ServerEvent::Command(v) if v["command"] == "CLIENT_SET_ACTIVE_SLOT"));
    }

    #[tokio::test]
    async fn test_unknown_command_goes_to_observer_only() {
        let mut fx = fixture();
        let (conn, mut rx) = connect(&fx.state);

        dispatch(&fx.state, conn, r#"{"command": "PLUGIN_BUTTON_PRESS", "payload": {"id": "1:butt_toolB_01"}}"#).await;

        let (_, event) = fx.events.recv().await.unwrap();
        assert!(matches!(event, ServerEvent::Command(v) if v["payload"]["id"] == "1:butt_toolB_01"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_json_is_dropped() {
        let mut fx = fixture();
        let (conn, mut rx) = connect(&fx.state);

        dispatch(&fx.state, conn, "{not json").await;

        let (_, event) = fx.events.recv().await.unwrap();
        assert!(matches!(event, ServerEvent::Error(m) if m.starts_with("Invalid JSON received")));
        assert!(rx.try_recv().is_err());

        // The connection keeps working afterwards.
        dispatch(&fx.state, conn, r#"{"command": "PLUGIN_LIST_ALL"}"#).await;
        assert_eq!(next_json(&mut rx).await, json!({"type": "PLUGIN_LIST_RESPONSE", "plugins": ["a"]}));
    }
}

//! Local editing of slots and button layouts.
//!
//! Every change is saved first and then published to connected clients
//! through the administrative endpoint. Publishing is best effort; the
//! saved change stands even when no server is reachable.

use std::path::PathBuf;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::json;

use crate::admin_client::AdminClient;
use crate::distribution::paths::is_safe_relative;
use crate::distribution::plugins::PluginCatalogue;
use crate::error::{DistributionError, StoreError};
use crate::models::layout::{ButtonConfig, PluginInfo};
use crate::models::message::Push;
use crate::store::{LayoutStore, SaveOutcome, SlotStore};

pub fn config_update_command(plugin_id: &str) -> String {
    format!("{}_CONFIG_UPDATE", plugin_id.to_uppercase())
}

pub fn icon_update_command(plugin_id: &str) -> String {
    format!("{}_ICON_UPDATE", plugin_id.to_uppercase())
}

pub struct LayoutEditor {
    plugin_id: String,
    plugin_dir: PathBuf,
    store: LayoutStore,
    admin: AdminClient,
}

impl LayoutEditor {
    pub fn open(
        catalogue: &PluginCatalogue,
        plugin_id: &str,
        admin: AdminClient,
    ) -> Result<Self, DistributionError> {
        let plugin_dir = catalogue.plugin_dir(plugin_id)?;
        Ok(Self {
            plugin_id: plugin_id.to_string(),
            store: LayoutStore::open(&plugin_dir),
            plugin_dir,
            admin,
        })
    }

    pub fn store(&self) -> &LayoutStore {
        &self.store
    }

    /// Saves the layout and pushes it to every client.
    async fn commit(&self) -> SaveOutcome {
        let outcome = self.store.save();
        if !outcome.success {
            return outcome;
        }
        let data = serde_json::to_value(self.store.layout()).unwrap_or_default();
        self.admin
            .publish(&Push::new(config_update_command(&self.plugin_id), data))
            .await;
        outcome
    }

    async fn publish_icon(&self, icon_path: &str) {
        if !is_safe_relative(icon_path) {
            tracing::warn!("Not publishing icon with unsafe path {}", icon_path);
            return;
        }
        let content = match tokio::fs::read(self.plugin_dir.join(icon_path)).await {
            Ok(bytes) => BASE64.encode(bytes),
            Err(e) => {
                tracing::warn!("Icon file not found for broadcast {}: {}", icon_path, e);
                return;
            }
        };
        let push = Push::new(
            icon_update_command(&self.plugin_id),
            json!({ "path": icon_path, "content": content }),
        );
        self.admin.publish(&push).await;
    }

    pub async fn add_page(&mut self) -> (u32, SaveOutcome) {
        let index = self.store.add_page();
        (index, self.commit().await)
    }

    pub async fn remove_page(&mut self, current: u32) -> Result<(u32, SaveOutcome), StoreError> {
        let next = self.store.remove_page(current)?;
        Ok((next, self.commit().await))
    }

    /// Writes a button. A new icon is sent to clients ahead of the layout so
    /// it is on disk by the time they render it.
    pub async fn update_button(
        &mut self,
        page: u32,
        button: &str,
        config: ButtonConfig,
    ) -> Result<SaveOutcome, StoreError> {
        let previous_icon = self
            .store
            .layout()
            .button(page, button)
            .and_then(|b| b.icon_path.clone());
        let new_icon = config.icon_path.clone();

        self.store.update_button(page, button, config)?;

        if let Some(icon) = new_icon.filter(|icon| previous_icon.as_ref() != Some(icon)) {
            self.publish_icon(&icon).await;
        }
        Ok(self.commit().await)
    }

    pub async fn delete_button(&mut self, page: u32, button: &str) -> Result<SaveOutcome, StoreError> {
        self.store.delete_button(page, button)?;
        Ok(self.commit().await)
    }

    pub async fn apply_prefab(
        &mut self,
        page: u32,
        button: &str,
        name: &str,
    ) -> Result<SaveOutcome, StoreError> {
        let config = self
            .store
            .prefabs()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::PrefabNotFound(name.to_string()))?;
        self.update_button(page, button, config).await
    }

    // Prefabs stay on this machine; clients only ever see placed copies.

    pub fn save_prefab(&mut self, name: &str, config: ButtonConfig) -> SaveOutcome {
        self.store.save_prefab(name, config);
        self.store.save_prefabs()
    }

    pub fn delete_prefab(&mut self, name: &str) -> Result<SaveOutcome, StoreError> {
        self.store.delete_prefab(name)?;
        Ok(self.store.save_prefabs())
    }

    pub fn rename_prefab(&mut self, old: &str, new: &str) -> Result<SaveOutcome, StoreError> {
        self.store.rename_prefab(old, new)?;
        Ok(self.store.save_prefabs())
    }
}

/// Slot assignment with client notification.
pub struct SlotEditor {
    slots: Arc<SlotStore>,
    admin: AdminClient,
}

impl SlotEditor {
    pub fn new(slots: Arc<SlotStore>, admin: AdminClient) -> Self {
        Self { slots, admin }
    }

    async fn publish_slots(&self) {
        let doc = self.slots.snapshot().to_document();
        self.admin.publish(&Push::plugin_slots(doc)).await;
    }

    pub async fn assign(&self, index: u8, info: PluginInfo) -> Result<SaveOutcome, StoreError> {
        let outcome = self.slots.assign(index, info)?;
        self.publish_slots().await;
        Ok(outcome)
    }

    pub async fn assign_plugin(&self, index: u8, plugin_id: &str) -> Result<SaveOutcome, StoreError> {
        let outcome = self.slots.assign_plugin(index, plugin_id)?;
        self.publish_slots().await;
        Ok(outcome)
    }

    pub async fn reload(&self, index: u8) -> Result<SaveOutcome, StoreError> {
        let outcome = self.slots.reload(index)?;
        self.publish_slots().await;
        Ok(outcome)
    }

    /// Empties a slot. Clients drop the slot and, if it was showing,
    /// deactivate.
    pub async fn remove(&self, index: u8) -> Result<SaveOutcome, StoreError> {
        let was_active = self.slots.snapshot().active() == Some(index);
        let outcome = self.slots.remove(index)?;
        self.publish_slots().await;
        if was_active {
            self.admin.publish(&Push::active_slot(None)).await;
        }
        Ok(outcome)
    }

    pub async fn toggle_active(&self, index: u8) -> Result<Option<u8>, StoreError> {
        let active = self.slots.toggle_active(index)?;
        self.admin.publish(&Push::active_slot(active)).await;
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::net::SocketAddr;

    use serde_json::Value;
    use tokio::sync::mpsc;

    use crate::events::TracingSink;
    use crate::hub::OUTBOX_CAPACITY;
    use crate::models::layout::{ActionKind, ButtonAction, DEFAULT_ICON_SIZE};
    use crate::AppState;

    async fn start_server(root: &std::path::Path) -> (AppState, AdminClient) {
        let state = AppState::new(root.to_path_buf(), Arc::new(TracingSink));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let serve_state = state.clone();
        tokio::spawn(async move {
            let _ = crate::serve(listener, serve_state, std::future::pending()).await;
        });
        (state, AdminClient::new(&format!("http://{}", addr)))
    }

    async fn next_json(rx: &mut mpsc::Receiver<String>) -> Value {
        serde_json::from_str(&rx.recv().await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_button_update_publishes_icon_then_layout() {
        let dir = tempfile::tempdir().unwrap();
        let plugin_dir = dir.path().join("plugins/shortcut");
        fs::create_dir_all(plugin_dir.join("resources/ico")).unwrap();
        fs::write(plugin_dir.join("resources/ico/calc.png"), b"PNG").unwrap();

        let (state, admin) = start_server(dir.path()).await;
        let (tx, mut rx) = mpsc::channel(OUTBOX_CAPACITY);
        state.hub.register(tx);

        let catalogue = PluginCatalogue::new(dir.path());
        let mut editor = LayoutEditor::open(&catalogue, "shortcut", admin).unwrap();
        let config = ButtonConfig {
            name: "Calc".into(),
            icon_path: Some("resources/ico/calc.png".into()),
            icon_size: DEFAULT_ICON_SIZE,
            action: Some(ButtonAction {
                kind: ActionKind::Program,
                value: "calc".into(),
            }),
        };
        let outcome = editor.update_button(1, "butt_toolB_01", config).await.unwrap();
        assert!(outcome.success);

        let icon = next_json(&mut rx).await;
        assert_eq!(icon["command"], "SHORTCUT_ICON_UPDATE");
        assert_eq!(icon["data"]["path"], "resources/ico/calc.png");
        assert_eq!(icon["data"]["content"], BASE64.encode(b"PNG"));

        let layout = next_json(&mut rx).await;
        assert_eq!(layout["command"], "SHORTCUT_CONFIG_UPDATE");
        assert_eq!(layout["data"]["page_1"]["butt_toolB_01"]["name"], "Calc");
    }

    #[tokio::test]
    async fn test_edits_survive_unreachable_server() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("plugins/shortcut")).unwrap();

        let catalogue = PluginCatalogue::new(dir.path());
        let admin = AdminClient::new("http://127.0.0.1:9");
        let mut editor = LayoutEditor::open(&catalogue, "shortcut", admin).unwrap();

        let (page, outcome) = editor.add_page().await;
        assert_eq!(page, 2);
        assert!(outcome.success);

        let reopened = LayoutStore::open(&dir.path().join("plugins/shortcut"));
        assert_eq!(reopened.layout().page_count(), 2);
    }

    #[tokio::test]
    async fn test_removing_active_slot_deactivates_clients() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("plugins/shortcut")).unwrap();
        let (state, admin) = start_server(dir.path()).await;
        let (tx, mut rx) = mpsc::channel(OUTBOX_CAPACITY);
        state.hub.register(tx);

        let editor = SlotEditor::new(state.slots.clone(), admin);
        editor.assign_plugin(2, "shortcut").await.unwrap();
        assert_eq!(next_json(&mut rx).await["data"]["slot_2"]["id"], "shortcut");

        assert_eq!(editor.toggle_active(2).await.unwrap(), Some(2));
        assert_eq!(next_json(&mut rx).await["data"]["index"], 2);

        editor.remove(2).await.unwrap();
        assert!(next_json(&mut rx).await["data"]["slot_2"].is_null());
        assert!(next_json(&mut rx).await["data"]["index"].is_null());
        assert_eq!(state.slots.snapshot().active(), None);
    }
}

//! Client-side plugin handlers.
//!
//! A plugin's manifest names its handler through the `entry` field; handlers
//! are registered under that key and receive the pushes they claim.

pub mod shortcut;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::storage::LocalStore;
use crate::sync::types::ButtonConfig;

/// What a handled push changed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginEffect {
    ConfigChanged,
    AssetWritten(PathBuf),
}

pub trait PluginHandler: Send + Sync {
    /// Push tags this handler owns.
    fn commands(&self) -> Vec<String>;

    fn handle(&self, command: &str, data: &Value) -> Result<PluginEffect, String>;

    fn page_count(&self) -> u32 {
        1
    }

    fn button(&self, _page: u32, _name: &str) -> Option<ButtonConfig> {
        None
    }
}

#[derive(Deserialize, Default)]
struct ManifestEntryPoint {
    entry: Option<String>,
}

pub struct PluginRegistry {
    store: LocalStore,
    handlers: HashMap<String, Arc<dyn PluginHandler>>,
}

impl PluginRegistry {
    pub fn new(store: LocalStore) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    /// Registry with the built-in handlers.
    pub fn with_defaults(store: LocalStore) -> Self {
        let mut registry = Self::new(store.clone());
        registry.register(
            shortcut::ENTRY,
            Arc::new(shortcut::LayoutPlugin::open(store, shortcut::PLUGIN_ID)),
        );
        registry
    }

    pub fn register(&mut self, entry: &str, handler: Arc<dyn PluginHandler>) {
        self.handlers.insert(entry.to_string(), handler);
    }

    /// Handler claiming a push tag.
    pub fn for_command(&self, command: &str) -> Option<Arc<dyn PluginHandler>> {
        self.handlers
            .values()
            .find(|h| h.commands().iter().any(|c| c == command))
            .cloned()
    }

    /// Handler for an installed plugin, found through its manifest `entry`
    /// or, without one, its id.
    pub fn for_plugin(&self, plugin_id: &str) -> Option<Arc<dyn PluginHandler>> {
        let entry = self.entry_point(plugin_id);
        self.handlers
            .get(entry.as_deref().unwrap_or(plugin_id))
            .cloned()
    }

    fn entry_point(&self, plugin_id: &str) -> Option<String> {
        let path = self
            .store
            .plugin_dir(plugin_id)
            .join(format!("{}_manifest.json", plugin_id));
        let manifest: ManifestEntryPoint = self.store.load_json(&path);
        manifest.entry.filter(|e| !e.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_lookup_by_command_and_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let registry = PluginRegistry::with_defaults(store.clone());

        assert!(registry.for_command("SHORTCUT_CONFIG_UPDATE").is_some());
        assert!(registry.for_command("OTHER_CONFIG_UPDATE").is_none());
        assert!(registry.for_plugin("shortcut").is_some());
        assert!(registry.for_plugin("macro_pad").is_none());

        fs::create_dir_all(store.plugin_dir("macro_pad")).unwrap();
        fs::write(
            store.plugin_dir("macro_pad").join("macro_pad_manifest.json"),
            r#"{"entry": "shortcut", "files_map": []}"#,
        )
        .unwrap();
        assert!(registry.for_plugin("macro_pad").is_some());
    }
}

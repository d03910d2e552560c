//! Button-grid plugin: mirrors the server's layout document and icons.

use std::path::PathBuf;
use std::sync::Mutex;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{Map, Value};

use super::{PluginEffect, PluginHandler};
use crate::storage::{is_safe_relative, LocalStore};
use crate::sync::types::ButtonConfig;

pub const PLUGIN_ID: &str = "shortcut";
pub const ENTRY: &str = "shortcut";
pub const LAYOUT_FILE: &str = "config/button_shortcut.json";

pub struct LayoutPlugin {
    store: LocalStore,
    plugin_id: String,
    layout: Mutex<Map<String, Value>>,
}

impl LayoutPlugin {
    pub fn open(store: LocalStore, plugin_id: &str) -> Self {
        let path = store.plugin_dir(plugin_id).join(LAYOUT_FILE);
        let layout = store.load_json(&path);
        Self {
            store,
            plugin_id: plugin_id.to_string(),
            layout: Mutex::new(layout),
        }
    }

    fn config_command(&self) -> String {
        format!("{}_CONFIG_UPDATE", self.plugin_id.to_uppercase())
    }

    fn icon_command(&self) -> String {
        format!("{}_ICON_UPDATE", self.plugin_id.to_uppercase())
    }

    fn layout_path(&self) -> PathBuf {
        self.store.plugin_dir(&self.plugin_id).join(LAYOUT_FILE)
    }

    fn replace_layout(&self, data: &Value) -> Result<PluginEffect, String> {
        let layout = data
            .as_object()
            .cloned()
            .ok_or_else(|| "Layout update is not an object".to_string())?;
        let outcome = self.store.save_json(&self.layout_path(), &layout);
        if !outcome.success {
            return Err(outcome.message);
        }
        if let Ok(mut guard) = self.layout.lock() {
            *guard = layout;
        }
        Ok(PluginEffect::ConfigChanged)
    }

    fn write_icon(&self, data: &Value) -> Result<PluginEffect, String> {
        let path = data
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| "Icon update without path".to_string())?;
        if !is_safe_relative(path) {
            return Err(format!("Rejected icon path {}", path));
        }
        let content = data.get("content").and_then(Value::as_str).unwrap_or_default();
        let bytes = BASE64
            .decode(content)
            .map_err(|e| format!("Icon {} is not valid base64: {}", path, e))?;

        let target = self.store.plugin_dir(&self.plugin_id).join(path);
        self.store
            .write_atomic(&target, &bytes)
            .map_err(|e| format!("Failed to write icon {}: {}", path, e))?;
        Ok(PluginEffect::AssetWritten(target))
    }
}

impl PluginHandler for LayoutPlugin {
    fn commands(&self) -> Vec<String> {
        vec![self.config_command(), self.icon_command()]
    }

    fn handle(&self, command: &str, data: &Value) -> Result<PluginEffect, String> {
        if command == self.config_command() {
            self.replace_layout(data)
        } else if command == self.icon_command() {
            self.write_icon(data)
        } else {
            Err(format!("{} does not handle {}", self.plugin_id, command))
        }
    }

    fn page_count(&self) -> u32 {
        let Ok(layout) = self.layout.lock() else {
            return 1;
        };
        let pages = layout
            .keys()
            .filter_map(|k| k.strip_prefix("page_")?.parse::<u32>().ok())
            .max()
            .unwrap_or(1);
        pages.max(1)
    }

    fn button(&self, page: u32, name: &str) -> Option<ButtonConfig> {
        let layout = self.layout.lock().ok()?;
        let value = layout.get(&format!("page_{}", page))?.get(name)?;
        serde_json::from_value(value.clone()).ok()
    }
}

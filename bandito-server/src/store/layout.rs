use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::models::layout::{is_button_name, ButtonConfig, ButtonLayout, PrefabDocument};

use super::json_file::{load_json, save_json, SaveOutcome};

pub const LAYOUT_FILE: &str = "config/button_shortcut.json";
pub const PREFAB_FILE: &str = "config/prefab_but_shortcut.json";

/// A plugin's button pages and prefab library.
///
/// Mutations apply in memory; `save` and `save_prefabs` write the two
/// documents back.
#[derive(Debug, Clone)]
pub struct LayoutStore {
    layout_path: PathBuf,
    prefab_path: PathBuf,
    layout: ButtonLayout,
    prefabs: PrefabDocument,
}

impl LayoutStore {
    pub fn open(plugin_dir: &Path) -> Self {
        let layout_path = plugin_dir.join(LAYOUT_FILE);
        let prefab_path = plugin_dir.join(PREFAB_FILE);
        Self {
            layout: load_json(&layout_path),
            prefabs: load_json(&prefab_path),
            layout_path,
            prefab_path,
        }
    }

    pub fn layout(&self) -> &ButtonLayout {
        &self.layout
    }

    pub fn prefabs(&self) -> &BTreeMap<String, ButtonConfig> {
        &self.prefabs.prefabs
    }

    pub fn save(&self) -> SaveOutcome {
        save_json(&self.layout_path, &self.layout)
    }

    pub fn save_prefabs(&self) -> SaveOutcome {
        save_json(&self.prefab_path, &self.prefabs)
    }

    /// Appends an empty page and returns its number.
    pub fn add_page(&mut self) -> u32 {
        let index = self.layout.push_page();
        tracing::debug!("Added page {}", index);
        index
    }

    /// Removes page `current` and returns the page to show next: the page
    /// that slid into its place, or the new last page.
    pub fn remove_page(&mut self, current: u32) -> Result<u32, StoreError> {
        if self.layout.page_count() <= 1 {
            return Err(StoreError::LastPage);
        }
        self.layout
            .remove_page(current)
            .ok_or(StoreError::PageNotFound(current))?;
        Ok(current.min(self.layout.page_count()).max(1))
    }

    /// Writes a button. Targeting the page just past the end creates it.
    pub fn update_button(
        &mut self,
        page: u32,
        button: &str,
        config: ButtonConfig,
    ) -> Result<(), StoreError> {
        if !is_button_name(button) {
            return Err(StoreError::InvalidButton(button.to_string()));
        }
        if page == self.layout.page_count() + 1 {
            self.layout.push_page();
        }
        self.layout
            .page_mut(page)
            .ok_or(StoreError::PageNotFound(page))?
            .insert(button.to_string(), config);
        Ok(())
    }

    pub fn delete_button(&mut self, page: u32, button: &str) -> Result<Option<ButtonConfig>, StoreError> {
        let removed = self
            .layout
            .page_mut(page)
            .ok_or(StoreError::PageNotFound(page))?
            .remove(button);
        Ok(removed)
    }

    pub fn save_prefab(&mut self, name: &str, config: ButtonConfig) {
        self.prefabs.prefabs.insert(name.to_string(), config);
    }

    pub fn delete_prefab(&mut self, name: &str) -> Result<ButtonConfig, StoreError> {
        self.prefabs
            .prefabs
            .remove(name)
            .ok_or_else(|| StoreError::PrefabNotFound(name.to_string()))
    }

    pub fn rename_prefab(&mut self, old: &str, new: &str) -> Result<(), StoreError> {
        let config = self.delete_prefab(old)?;
        self.prefabs.prefabs.insert(new.to_string(), config);
        Ok(())
    }

    /// Copies a prefab onto a button. Later prefab edits do not touch it.
    pub fn apply_prefab(&mut self, page: u32, button: &str, name: &str) -> Result<ButtonConfig, StoreError> {
        let config = self
            .prefabs
            .prefabs
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::PrefabNotFound(name.to_string()))?;
        self.update_button(page, button, config.clone())?;
        Ok(config)
    }
}

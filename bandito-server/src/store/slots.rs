use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde_json::{Map, Value};

use crate::distribution::plugins::PluginCatalogue;
use crate::error::StoreError;
use crate::models::layout::{is_valid_slot, slot_key, PluginInfo, SLOT_COUNT};

use super::json_file::{load_json, save_json, SaveOutcome};

pub const SLOTS_FILE: &str = "configs/plugin_slots.json";

/// The five plugin slots and the active-slot pointer.
///
/// The active pointer only ever references a populated slot: emptying the
/// active slot clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotTable {
    slots: [Option<PluginInfo>; SLOT_COUNT as usize],
    active: Option<u8>,
}

impl SlotTable {
    /// Builds the table from a `slot_1..slot_5` document. Entries that are
    /// not complete plugin records are treated as empty.
    pub fn from_document(doc: &Map<String, Value>) -> Self {
        let mut table = Self::default();
        for index in 1..=SLOT_COUNT {
            let info = doc
                .get(&slot_key(index))
                .filter(|v| !v.is_null())
                .and_then(|v| serde_json::from_value::<PluginInfo>(v.clone()).ok());
            table.slots[index as usize - 1] = info;
        }
        table
    }

    /// All five keys, `null` for empty slots.
    pub fn to_document(&self) -> Map<String, Value> {
        let mut doc = Map::new();
        for (i, slot) in self.slots.iter().enumerate() {
            let value = match slot {
                Some(info) => serde_json::to_value(info).unwrap_or(Value::Null),
                None => Value::Null,
            };
            doc.insert(slot_key(i as u8 + 1), value);
        }
        doc
    }

    /// Only the populated slots.
    pub fn populated(&self) -> Map<String, Value> {
        let mut doc = self.to_document();
        doc.retain(|_, v| !v.is_null());
        doc
    }

    pub fn get(&self, index: u8) -> Option<&PluginInfo> {
        if !is_valid_slot(index) {
            return None;
        }
        self.slots[index as usize - 1].as_ref()
    }

    pub fn active(&self) -> Option<u8> {
        self.active
    }

    fn slot_mut(&mut self, index: u8) -> Result<&mut Option<PluginInfo>, StoreError> {
        if !is_valid_slot(index) {
            return Err(StoreError::InvalidSlot(index));
        }
        Ok(&mut self.slots[index as usize - 1])
    }

    pub fn assign(&mut self, index: u8, info: PluginInfo) -> Result<(), StoreError> {
        *self.slot_mut(index)? = Some(info);
        Ok(())
    }

    /// Refreshes name and version from `fresh`; id and path are kept.
    pub fn refresh(&mut self, index: u8, fresh: &PluginInfo) -> Result<(), StoreError> {
        let slot = self
            .slot_mut(index)?
            .as_mut()
            .ok_or(StoreError::EmptySlot(index))?;
        slot.name = fresh.name.clone();
        slot.version = fresh.version.clone();
        Ok(())
    }

    pub fn remove(&mut self, index: u8) -> Result<Option<PluginInfo>, StoreError> {
        let removed = self.slot_mut(index)?.take();
        if self.active == Some(index) {
            self.active = None;
        }
        Ok(removed)
    }

    /// Activates `index`, or clears the pointer if it is already active.
    pub fn toggle_active(&mut self, index: u8) -> Result<Option<u8>, StoreError> {
        if self.active == Some(index) {
            self.active = None;
            return Ok(None);
        }
        if self.slot_mut(index)?.is_none() {
            return Err(StoreError::EmptySlot(index));
        }
        self.active = Some(index);
        Ok(self.active)
    }

    /// Applies a remote active-slot decision. An empty or invalid slot
    /// deactivates.
    pub fn set_active(&mut self, index: Option<u8>) -> Option<u8> {
        let next = index.filter(|i| self.get(*i).is_some());
        self.active = next;
        next
    }
}

/// Slot table shared by the router and local editors, written through to
/// `configs/plugin_slots.json` on every mutation.
#[derive(Debug)]
pub struct SlotStore {
    path: PathBuf,
    catalogue: PluginCatalogue,
    table: Mutex<SlotTable>,
}

impl SlotStore {
    pub fn open(root: &Path, catalogue: PluginCatalogue) -> Self {
        let path = root.join(SLOTS_FILE);
        let doc: Map<String, Value> = load_json(&path);
        Self {
            table: Mutex::new(SlotTable::from_document(&doc)),
            path,
            catalogue,
        }
    }

    /// Reads the populated slots straight from disk.
    pub fn read_populated(&self) -> Map<String, Value> {
        let doc: Map<String, Value> = load_json(&self.path);
        SlotTable::from_document(&doc).populated()
    }

    fn lock(&self) -> MutexGuard<'_, SlotTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> SlotTable {
        self.lock().clone()
    }

    fn persist(&self, table: &SlotTable) -> SaveOutcome {
        save_json(&self.path, &table.to_document())
    }

    pub fn assign(&self, index: u8, info: PluginInfo) -> Result<SaveOutcome, StoreError> {
        let mut table = self.lock();
        table.assign(index, info)?;
        Ok(self.persist(&table))
    }

    /// Fills a slot from the plugin catalogue.
    pub fn assign_plugin(&self, index: u8, plugin_id: &str) -> Result<SaveOutcome, StoreError> {
        let info = self
            .catalogue
            .describe(plugin_id)
            .map_err(|_| StoreError::PluginNotFound(plugin_id.to_string()))?;
        self.assign(index, info)
    }

    pub fn reload(&self, index: u8) -> Result<SaveOutcome, StoreError> {
        if !is_valid_slot(index) {
            return Err(StoreError::InvalidSlot(index));
        }
        let mut table = self.lock();
        let path = table
            .get(index)
            .map(|info| info.path.clone())
            .ok_or(StoreError::EmptySlot(index))?;
        let fresh = self
            .catalogue
            .describe(&path)
            .map_err(|_| StoreError::PluginNotFound(path.clone()))?;
        table.refresh(index, &fresh)?;
        Ok(self.persist(&table))
    }

    pub fn remove(&self, index: u8) -> Result<SaveOutcome, StoreError> {
        let mut table = self.lock();
        if let Some(info) = table.remove(index)? {
            tracing::info!("Removed plugin {} from slot {}", info.id, index);
        }
        Ok(self.persist(&table))
    }

    pub fn toggle_active(&self, index: u8) -> Result<Option<u8>, StoreError> {
        self.lock().toggle_active(index)
    }

    pub fn set_active(&self, index: Option<u8>) -> Option<u8> {
        self.lock().set_active(index)
    }
}

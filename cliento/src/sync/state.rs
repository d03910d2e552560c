use serde_json::{Map, Value};

use super::types::PluginInfo;

pub const SLOT_COUNT: u8 = 5;

pub fn slot_key(index: u8) -> String {
    format!("slot_{}", index)
}

/// What the agent knows about the control surface.
///
/// `active` is the server-confirmed pointer. `displayed` may run ahead of it
/// after a local selection and is brought back in line by the next
/// `SET_ACTIVE_SLOT`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientState {
    slots: [Option<PluginInfo>; SLOT_COUNT as usize],
    active: Option<u8>,
    displayed: Option<u8>,
    page: u32,
}

impl ClientState {
    pub fn new() -> Self {
        Self {
            page: 1,
            ..Default::default()
        }
    }

    pub fn slot(&self, index: u8) -> Option<&PluginInfo> {
        let i = usize::from(index.checked_sub(1)?);
        self.slots.get(i)?.as_ref()
    }

    pub fn is_populated(&self, index: u8) -> bool {
        self.slot(index).is_some()
    }

    pub fn populated(&self) -> Vec<(u8, &PluginInfo)> {
        (1..=SLOT_COUNT)
            .filter_map(|i| self.slot(i).map(|info| (i, info)))
            .collect()
    }

    pub fn active(&self) -> Option<u8> {
        self.active
    }

    pub fn displayed(&self) -> Option<u8> {
        self.displayed
    }

    pub fn displayed_plugin(&self) -> Option<&PluginInfo> {
        self.slot(self.displayed?)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    /// Slot document as stored on disk, every key present.
    pub fn to_document(&self) -> Map<String, Value> {
        (1..=SLOT_COUNT)
            .map(|i| {
                let value = self
                    .slot(i)
                    .and_then(|info| serde_json::to_value(info).ok())
                    .unwrap_or(Value::Null);
                (slot_key(i), value)
            })
            .collect()
    }

    /// Replaces every slot from an `UPDATE_PLUGIN_SLOTS` document. Missing
    /// keys and unreadable entries count as empty.
    ///
    /// Returns true when the active slot changed as a consequence: an active
    /// slot that became empty is dropped, and with nothing active the lowest
    /// populated slot is activated.
    pub fn replace_slots(&mut self, data: &Value) -> bool {
        for i in 1..=SLOT_COUNT {
            self.slots[usize::from(i - 1)] = data
                .get(slot_key(i))
                .filter(|v| !v.is_null())
                .and_then(|v| serde_json::from_value(v.clone()).ok());
        }
        if self.displayed.is_some_and(|d| !self.is_populated(d)) {
            self.displayed = self.active;
        }

        let before = self.active;
        if self.active.is_some_and(|a| !self.is_populated(a)) {
            self.deactivate();
        }
        if self.active.is_none() {
            if let Some(first) = (1..=SLOT_COUNT).find(|&i| self.is_populated(i)) {
                self.activate(first);
            }
        }
        before != self.active
    }

    /// Applies a server-confirmed `SET_ACTIVE_SLOT`. An index this client has
    /// no plugin for deactivates, as does `None`.
    pub fn apply_active(&mut self, index: Option<u8>) -> bool {
        let before = (self.active, self.displayed);
        match index {
            Some(i) if self.is_populated(i) => self.activate(i),
            _ => self.deactivate(),
        }
        before != (self.active, self.displayed)
    }

    /// Shows a slot ahead of confirmation.
    pub fn show(&mut self, index: u8) -> bool {
        if !self.is_populated(index) {
            return false;
        }
        if self.displayed != Some(index) {
            self.displayed = Some(index);
            self.page = 1;
        }
        true
    }

    /// Moves the page cursor by `delta`, clamped to `1..=page_count`.
    pub fn step_page(&mut self, delta: i64, page_count: u32) -> u32 {
        let last = i64::from(page_count.max(1));
        let next = (i64::from(self.page) + delta).clamp(1, last);
        self.page = u32::try_from(next).unwrap_or(1);
        self.page
    }

    fn activate(&mut self, index: u8) {
        if self.displayed != Some(index) {
            self.page = 1;
        }
        self.active = Some(index);
        self.displayed = Some(index);
    }

    fn deactivate(&mut self) {
        self.active = None;
        self.displayed = None;
        self.page = 1;
    }
}

use std::collections::BTreeMap;

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Number of fixed plugin slots.
pub const SLOT_COUNT: u8 = 5;

/// Number of buttons on one page (`butt_toolB_01`..`butt_toolB_12`).
pub const BUTTONS_PER_PAGE: u8 = 12;

pub const DEFAULT_ICON_SIZE: u32 = 70;

// ── Plugin slots ─────────────────────────────────────────────────────────────

/// A plugin occupying a slot. All four fields are always present; an
/// unassigned slot is represented by `None`, never by a partial value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    /// Installation directory name under `plugins/`.
    pub path: String,
}

pub fn slot_key(index: u8) -> String {
    format!("slot_{}", index)
}

pub fn is_valid_slot(index: u8) -> bool {
    (1..=SLOT_COUNT).contains(&index)
}

// ── Buttons ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Program,
    Shortcut,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonConfig {
    pub name: String,
    /// Path relative to the plugin directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_path: Option<String>,
    #[serde(default = "default_icon_size")]
    pub icon_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ButtonAction>,
}

fn default_icon_size() -> u32 {
    DEFAULT_ICON_SIZE
}

/// Name of the n-th button on a page (1-based).
pub fn button_name(n: u8) -> String {
    format!("butt_toolB_{:02}", n)
}

pub fn is_button_name(name: &str) -> bool {
    name.strip_prefix("butt_toolB_")
        .filter(|n| n.len() == 2)
        .and_then(|n| n.parse::<u8>().ok())
        .map_or(false, |n| (1..=BUTTONS_PER_PAGE).contains(&n))
}

pub type ButtonPage = BTreeMap<String, ButtonConfig>;

/// Ordered pages of a plugin's button grid.
///
/// On disk this is a map keyed `page_1..page_N`. Pages are held in a vector so
/// numbering is contiguous by construction; loading a document with gaps
/// renumbers it, and an empty document yields a single empty page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonLayout {
    pages: Vec<ButtonPage>,
}

impl Default for ButtonLayout {
    fn default() -> Self {
        Self {
            pages: vec![ButtonPage::new()],
        }
    }
}

impl ButtonLayout {
    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn page(&self, index: u32) -> Option<&ButtonPage> {
        let i = index.checked_sub(1)?;
        self.pages.get(i as usize)
    }

    pub fn page_mut(&mut self, index: u32) -> Option<&mut ButtonPage> {
        let i = index.checked_sub(1)?;
        self.pages.get_mut(i as usize)
    }

    pub fn button(&self, page: u32, name: &str) -> Option<&ButtonConfig> {
        self.page(page).and_then(|p| p.get(name))
    }

    /// Appends an empty page and returns its number.
    pub fn push_page(&mut self) -> u32 {
        self.pages.push(ButtonPage::new());
        self.page_count()
    }

    /// Removes page `index`, shifting every higher page down by one.
    /// Returns `None` if the page does not exist or it is the only page.
    pub fn remove_page(&mut self, index: u32) -> Option<ButtonPage> {
        if self.pages.len() <= 1 || index == 0 || index > self.page_count() {
            return None;
        }
        Some(self.pages.remove(index as usize - 1))
    }
}

impl Serialize for ButtonLayout {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.pages.len()))?;
        for (i, page) in self.pages.iter().enumerate() {
            map.serialize_entry(&format!("page_{}", i + 1), page)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ButtonLayout {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;

        let mut numbered: Vec<(u32, ButtonPage)> = Vec::new();
        for (key, value) in raw {
            let Some(n) = key.strip_prefix("page_").and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            let page = ButtonPage::deserialize(value).map_err(serde::de::Error::custom)?;
            numbered.push((n, page));
        }
        numbered.sort_by_key(|(n, _)| *n);

        let mut pages: Vec<ButtonPage> = numbered.into_iter().map(|(_, p)| p).collect();
        if pages.is_empty() {
            pages.push(ButtonPage::new());
        }
        Ok(Self { pages })
    }
}

// ── Prefabs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefabDocument {
    #[serde(default)]
    pub prefabs: BTreeMap<String, ButtonConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_renumbers_gaps_on_load() {
        let json = r#"{
            "page_1": {"butt_toolB_01": {"name": "A", "action": {"type": "program", "value": "a"}}},
            "page_4": {"butt_toolB_02": {"name": "B"}},
            "notes": "ignored"
        }"#;
        let layout: ButtonLayout = serde_json::from_str(json).unwrap();

        assert_eq!(layout.page_count(), 2);
        assert_eq!(layout.button(2, "butt_toolB_02").unwrap().name, "B");
        assert_eq!(layout.button(2, "butt_toolB_02").unwrap().icon_size, 70);

        let out = serde_json::to_value(&layout).unwrap();
        assert!(out.get("page_2").is_some());
        assert!(out.get("page_4").is_none());
    }

    #[test]
    fn test_empty_layout_has_one_page() {
        let layout: ButtonLayout = serde_json::from_str("{}").unwrap();
        assert_eq!(layout.page_count(), 1);
    }

    #[test]
    fn test_button_names() {
        assert_eq!(button_name(1), "butt_toolB_01");
        assert!(is_button_name("butt_toolB_12"));
        assert!(!is_button_name("butt_toolB_13"));
        assert!(!is_button_name("butt_toolB_1"));
        assert!(!is_button_name("page_prev"));
    }
}

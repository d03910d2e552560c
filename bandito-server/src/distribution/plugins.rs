use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DistributionError;
use crate::models::layout::PluginInfo;
use crate::models::manifest::PluginManifest;

use super::paths::{is_safe_plugin_id, is_safe_relative};

const MANIFEST_SUFFIX: &str = "_manifest.json";
const UNKNOWN_VERSION: &str = "?";

/// Installed plugins under `<root>/plugins`.
#[derive(Debug, Clone)]
pub struct PluginCatalogue {
    root: PathBuf,
}

impl PluginCatalogue {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join("plugins")
    }

    pub fn plugin_dir(&self, plugin_id: &str) -> Result<PathBuf, DistributionError> {
        if !is_safe_plugin_id(plugin_id) {
            return Err(DistributionError::InvalidPluginId(plugin_id.to_string()));
        }
        let dir = self.plugins_dir().join(plugin_id);
        if !dir.is_dir() {
            return Err(DistributionError::PluginNotFound(plugin_id.to_string()));
        }
        Ok(dir)
    }

    /// Directory names under `plugins/`, sorted. Hidden and `__`-prefixed
    /// entries are not plugins.
    pub fn list_plugins(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.plugins_dir()) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|name| !name.starts_with("__") && !name.starts_with('.'))
            .collect();
        ids.sort();
        ids
    }

    /// `<id>_manifest.json`, or the first `*_manifest.json` in the directory.
    pub fn manifest_path(&self, plugin_id: &str) -> Result<PathBuf, DistributionError> {
        let dir = self.plugin_dir(plugin_id)?;
        let preferred = dir.join(format!("{}{}", plugin_id, MANIFEST_SUFFIX));
        if preferred.is_file() {
            return Ok(preferred);
        }

        let mut candidates: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .map_or(false, |n| n.ends_with(MANIFEST_SUFFIX))
            })
            .collect();
        candidates.sort();
        candidates
            .into_iter()
            .next()
            .ok_or_else(|| DistributionError::ManifestNotFound(plugin_id.to_string()))
    }

    pub fn load_manifest(&self, plugin_id: &str) -> Result<PluginManifest, DistributionError> {
        let path = self.manifest_path(plugin_id)?;
        read_manifest(&path)
    }

    /// Version tag of an installed plugin.
    ///
    /// Looks at the manifest's `version_file`, then `ver_<id>`, then `ver`.
    pub fn version(&self, plugin_id: &str) -> Result<String, DistributionError> {
        let dir = self.plugin_dir(plugin_id)?;

        let declared = self
            .load_manifest(plugin_id)
            .ok()
            .and_then(|m| m.version_file)
            .filter(|f| is_safe_relative(f))
            .map(|f| self.root.join(f));

        let candidates = declared
            .into_iter()
            .chain([dir.join(format!("ver_{}", plugin_id)), dir.join("ver")]);

        for path in candidates {
            if let Some(version) = read_version_file(&path) {
                return Ok(version);
            }
        }
        Err(DistributionError::VersionNotFound(plugin_id.to_string()))
    }

    /// Catalogue entry used to fill a slot. Missing metadata falls back to
    /// the directory name, and a missing version displays as `?`.
    pub fn describe(&self, plugin_id: &str) -> Result<PluginInfo, DistributionError> {
        self.plugin_dir(plugin_id)?;
        let manifest = self.load_manifest(plugin_id).unwrap_or_default();
        let version = self
            .version(plugin_id)
            .unwrap_or_else(|_| UNKNOWN_VERSION.to_string());

        Ok(PluginInfo {
            id: manifest.id.unwrap_or_else(|| plugin_id.to_string()),
            name: manifest.name.unwrap_or_else(|| plugin_id.to_string()),
            version,
            path: plugin_id.to_string(),
        })
    }
}

pub(crate) fn read_manifest(path: &Path) -> Result<PluginManifest, DistributionError> {
    let raw = fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| DistributionError::InvalidManifest {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// First line of a version file, trimmed. Empty files count as missing.
pub(crate) fn read_version_file(path: &Path) -> Option<String> {
    let raw = fs::read_to_string(path).ok()?;
    let version = raw.lines().next().unwrap_or("").trim();
    (!version.is_empty()).then(|| version.to_string())
}

//! The client's view of the project tree: mirrored files, version tags
//! and locally persisted documents.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const CORE_VERSION_FILE: &str = "cliento/ver";
pub const SLOTS_FILE: &str = "configs/plugin_slots.json";
pub const UNKNOWN_VERSION: &str = "0.0.0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub success: bool,
    pub message: String,
}

/// Relative paths received from the server must stay inside the root.
pub fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && !path.contains("..")
        && !path.starts_with('/')
        && !path.starts_with('\\')
        && !path.contains(':')
        && !Path::new(path).is_absolute()
}

pub fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join(rel)
    }

    pub fn plugin_dir(&self, plugin_id: &str) -> PathBuf {
        self.root.join("plugins").join(plugin_id)
    }

    pub fn md5_file(&self, path: &Path) -> Option<String> {
        let mut file = File::open(path).ok()?;
        let mut hasher = Md5::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = file.read(&mut buf).ok()?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Some(format!("{:x}", hasher.finalize()))
    }

    /// Writes `bytes` next to `path` and renames it into place, so readers
    /// never see a half-written file.
    pub fn write_atomic(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".part");
        let tmp = PathBuf::from(tmp_name);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)
    }

    /// First line of a version file, or `0.0.0` when there is none.
    pub fn read_version(&self, candidates: &[PathBuf]) -> String {
        candidates
            .iter()
            .filter_map(|p| fs::read_to_string(p).ok())
            .map(|s| s.lines().next().unwrap_or("").trim().to_string())
            .find(|v| !v.is_empty())
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
    }

    pub fn write_version(&self, path: &Path, version: &str) -> std::io::Result<()> {
        self.write_atomic(path, version.as_bytes())
    }

    pub fn core_version_path(&self) -> PathBuf {
        self.path(CORE_VERSION_FILE)
    }

    /// `ver_<id>` first, then the legacy `ver`.
    pub fn plugin_version_paths(&self, plugin_id: &str) -> Vec<PathBuf> {
        let dir = self.plugin_dir(plugin_id);
        vec![dir.join(format!("ver_{}", plugin_id)), dir.join("ver")]
    }

    pub fn load_json<T: DeserializeOwned + Default>(&self, path: &Path) -> T {
        let result = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_str(&raw).map_err(|e| e.to_string()));
        match result {
            Ok(value) => value,
            Err(e) => {
                if path.exists() {
                    log::warn!("Error loading {}: {}", path.display(), e);
                }
                T::default()
            }
        }
    }

    /// Pretty-printed with four-space indentation.
    pub fn save_json<T: Serialize>(&self, path: &Path, value: &T) -> SaveOutcome {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        let result = value
            .serialize(&mut ser)
            .map_err(std::io::Error::from)
            .and_then(|_| self.write_atomic(path, &buf));
        match result {
            Ok(()) => SaveOutcome {
                success: true,
                message: "Config saved successfully".to_string(),
            },
            Err(e) => {
                log::error!("Error saving {}: {}", path.display(), e);
                SaveOutcome {
                    success: false,
                    message: format!("Error saving config: {}", e),
                }
            }
        }
    }
}

//! Server side of the file sync protocol: version tags, manifests with
//! per-file digests, and raw file reads for clients mirroring the project.

pub mod digest;
pub mod paths;
pub mod plugins;

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::DistributionError;
use crate::models::manifest::{FileManifest, ManifestEntry};

use self::paths::{is_safe_relative, to_wire_path};
use self::plugins::{read_version_file, PluginCatalogue};

pub const CORE_VERSION_FILE: &str = "cliento/ver";
pub const CORE_MANIFEST_FILE: &str = "cliento/cliento_manifest.json";

#[derive(Debug, Clone)]
pub struct Distribution {
    root: PathBuf,
    catalogue: PluginCatalogue,
}

impl Distribution {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            catalogue: PluginCatalogue::new(root.clone()),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalogue(&self) -> &PluginCatalogue {
        &self.catalogue
    }

    pub fn core_version(&self) -> Result<String, DistributionError> {
        read_version_file(&self.root.join(CORE_VERSION_FILE))
            .ok_or_else(|| DistributionError::VersionNotFound(CORE_VERSION_FILE.to_string()))
    }

    pub fn core_manifest(&self) -> Result<FileManifest, DistributionError> {
        let path = self.root.join(CORE_MANIFEST_FILE);
        if !path.is_file() {
            return Err(DistributionError::ManifestNotFound(CORE_MANIFEST_FILE.to_string()));
        }
        let raw = fs::read_to_string(&path)?;
        let manifest: FileManifest =
            serde_json::from_str(&raw).map_err(|e| DistributionError::InvalidManifest {
                path: CORE_MANIFEST_FILE.to_string(),
                message: e.to_string(),
            })?;
        Ok(self.resolve(manifest))
    }

    pub fn plugin_version(&self, plugin_id: &str) -> Result<String, DistributionError> {
        self.catalogue.version(plugin_id)
    }

    pub fn plugin_manifest(&self, plugin_id: &str) -> Result<FileManifest, DistributionError> {
        let manifest = self.catalogue.load_manifest(plugin_id)?;
        Ok(self.resolve(manifest.files))
    }

    pub fn list_plugins(&self) -> Vec<String> {
        self.catalogue.list_plugins()
    }

    /// Reads a project file requested by a client.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>, DistributionError> {
        if !is_safe_relative(path) {
            return Err(DistributionError::UnsafePath(path.to_string()));
        }
        let full = self.root.join(path);
        if !full.is_file() {
            return Err(DistributionError::FileNotFound(path.to_string()));
        }
        Ok(fs::read(full)?)
    }

    /// Expands directory entries into one entry per contained file and
    /// fills in every file's digest. The output never contains directory
    /// entries, and the walk order is sorted so repeated calls agree.
    pub fn resolve(&self, manifest: FileManifest) -> FileManifest {
        let mut out = FileManifest {
            directories_to_ensure: Vec::new(),
            files_map: Vec::new(),
        };
        for dir in manifest.directories_to_ensure {
            push_unique(&mut out.directories_to_ensure, dir);
        }

        for entry in manifest.files_map {
            if !is_safe_relative(&entry.remote_path) {
                tracing::warn!("Skipping unsafe manifest path: {}", entry.remote_path);
                continue;
            }
            let full = self.root.join(&entry.remote_path);

            if entry.is_directory || full.is_dir() {
                self.expand_directory(&entry, &full, &mut out);
                continue;
            }

            let md5 = match digest::md5_file(&full) {
                Ok(sum) => Some(sum),
                Err(e) => {
                    tracing::warn!("Cannot hash {}: {}", entry.remote_path, e);
                    None
                }
            };
            out.files_map.push(ManifestEntry {
                md5,
                is_directory: false,
                ..entry
            });
        }
        out
    }

    fn expand_directory(&self, entry: &ManifestEntry, full: &Path, out: &mut FileManifest) {
        let remote_base = entry.remote_path.trim_end_matches(is_separator);
        let local_base = entry.local_dir.trim_end_matches(is_separator);

        let walker = WalkDir::new(full)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter();

        for item in walker {
            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!("Skipping entry under {}: {}", entry.remote_path, e);
                    continue;
                }
            };
            let Ok(rel) = item.path().strip_prefix(full) else {
                continue;
            };
            if rel.as_os_str().is_empty() {
                continue;
            }

            if item.file_type().is_dir() {
                push_unique(
                    &mut out.directories_to_ensure,
                    join_wire(local_base, &to_wire_path(rel)),
                );
                continue;
            }

            let md5 = match digest::md5_file(item.path()) {
                Ok(sum) => sum,
                Err(e) => {
                    tracing::warn!("Cannot hash {}: {}", item.path().display(), e);
                    continue;
                }
            };
            let parent = rel.parent().map(to_wire_path).unwrap_or_default();
            out.files_map.push(ManifestEntry {
                remote_path: join_wire(remote_base, &to_wire_path(rel)),
                local_dir: join_wire(local_base, &parent),
                md5: Some(md5),
                is_directory: false,
            });
        }
    }
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

fn join_wire(base: &str, rel: &str) -> String {
    match (base.is_empty(), rel.is_empty()) {
        (_, true) => base.to_string(),
        (true, false) => rel.to_string(),
        (false, false) => format!("{}/{}", base, rel),
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, body: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn plugin_fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "plugins/demo/ver_demo", b"7");
        write(dir.path(), "plugins/demo/demo_cliento.py", b"print('hi')");
        write(dir.path(), "plugins/demo/icons/a.png", b"A");
        write(dir.path(), "plugins/demo/icons/sub/b.png", b"BB");
        write(
            dir.path(),
            "plugins/demo/demo_manifest.json",
            br#"{
                "name": "Demo",
                "directories_to_ensure": ["plugins/demo"],
                "files_map": [
                    {"remote_path": "plugins/demo/demo_cliento.py", "local_dir": "plugins/demo"},
                    {"remote_path": "plugins/demo/icons", "local_dir": "plugins/demo/icons", "is_directory": true},
                    {"remote_path": "../secret", "local_dir": "x"}
                ]
            }"#,
        );
        dir
    }

    #[test]
    fn test_directory_expansion_yields_leaf_files() {
        let dir = plugin_fixture();
        let dist = Distribution::new(dir.path());

        let manifest = dist.plugin_manifest("demo").unwrap();
        let remote: Vec<&str> = manifest.files_map.iter().map(|e| e.remote_path.as_str()).collect();
        assert_eq!(
            remote,
            vec![
                "plugins/demo/demo_cliento.py",
                "plugins/demo/icons/a.png",
                "plugins/demo/icons/sub/b.png",
            ]
        );
        assert!(manifest.files_map.iter().all(|e| !e.is_directory && e.md5.is_some()));

        let nested = &manifest.files_map[2];
        assert_eq!(nested.local_dir, "plugins/demo/icons/sub");
        assert_eq!(nested.md5.as_deref(), Some(digest::md5_hex(b"BB").as_str()));
        assert!(manifest
            .directories_to_ensure
            .contains(&"plugins/demo/icons/sub".to_string()));
    }

    #[test]
    fn test_expansion_is_stable_across_calls() {
        let dir = plugin_fixture();
        let dist = Distribution::new(dir.path());
        assert_eq!(
            dist.plugin_manifest("demo").unwrap(),
            dist.plugin_manifest("demo").unwrap()
        );
    }

    #[test]
    fn test_missing_file_has_no_digest() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "cliento/ver", b"1.0.0\n");
        write(
            dir.path(),
            CORE_MANIFEST_FILE,
            br#"{"files_map": [{"remote_path": "cliento/gone.py", "local_dir": "cliento"}]}"#,
        );
        let dist = Distribution::new(dir.path());

        assert_eq!(dist.core_version().unwrap(), "1.0.0");
        let manifest = dist.core_manifest().unwrap();
        assert_eq!(manifest.files_map.len(), 1);
        assert!(manifest.files_map[0].md5.is_none());
    }

    #[test]
    fn test_read_file_guards_path() {
        let dir = plugin_fixture();
        let dist = Distribution::new(dir.path());

        assert_eq!(dist.read_file("plugins/demo/icons/a.png").unwrap(), b"A");
        assert!(matches!(
            dist.read_file("../etc/passwd"),
            Err(DistributionError::UnsafePath(_))
        ));
        assert!(matches!(
            dist.read_file("plugins/demo/nope"),
            Err(DistributionError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_missing_core_version() {
        let dir = tempfile::tempdir().unwrap();
        let dist = Distribution::new(dir.path());
        assert!(matches!(
            dist.core_version(),
            Err(DistributionError::VersionNotFound(_))
        ));
    }
}

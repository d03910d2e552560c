use serde::{Deserialize, Serialize};

/// One file (or, before expansion, one directory) a client must mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the project root on the server.
    pub remote_path: String,
    /// Directory relative to the project root on the client.
    pub local_dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_directory: bool,
}

fn is_false(v: &bool) -> bool {
    !*v
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    #[serde(default)]
    pub directories_to_ensure: Vec<String>,
    #[serde(default)]
    pub files_map: Vec<ManifestEntry>,
}

/// `<id>_manifest.json` inside a plugin directory: catalogue metadata plus the
/// file list the client needs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginManifest {
    pub id: Option<String>,
    pub name: Option<String>,
    /// Project-relative path of the plugin's version file.
    pub version_file: Option<String>,
    pub icon: Option<String>,
    /// Key the client uses to pick the handler for this plugin's pushes.
    pub entry: Option<String>,
    #[serde(flatten)]
    pub files: FileManifest,
}

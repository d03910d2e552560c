use std::fs;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Result of persisting a document, reported to the caller rather than
/// raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub success: bool,
    pub message: String,
}

impl SaveOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: "Config saved successfully".to_string(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Loads a JSON document. A missing or unreadable file yields the default.
pub fn load_json<T: DeserializeOwned + Default>(path: &Path) -> T {
    if !path.exists() {
        return T::default();
    }
    let result = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|raw| serde_json::from_str(&raw).map_err(|e| e.to_string()));
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Error loading config {}: {}", path.display(), e);
            T::default()
        }
    }
}

/// Four-space indented JSON.
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

/// Replaces `path` with `value`, creating parent directories. The document
/// is written to a sibling temp file first and renamed into place.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> SaveOutcome {
    match write_atomic(path, value) {
        Ok(()) => SaveOutcome::ok(),
        Err(e) => {
            tracing::error!("Error saving config {}: {}", path.display(), e);
            SaveOutcome::failed(format!("Error saving config: {}", e))
        }
    }
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let bytes = to_pretty_json(value)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = Path::new(&tmp_name);
    {
        let mut file = fs::File::create(tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(tmp, path)
}

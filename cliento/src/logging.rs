use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;

static LOG_FILE: Mutex<Option<File>> = Mutex::new(None);
static LOG_PATH: Mutex<Option<PathBuf>> = Mutex::new(None);

const MAX_LOG_BYTES: u64 = 2 * 1024 * 1024;
pub const MAX_LINE_CHARS: usize = 500;

/// Starts `env_logger` and mirrors every line into `<data_dir>/cliento.log`.
pub fn init(data_dir: &Path) {
    let _ = fs::create_dir_all(data_dir);
    let log_path = data_dir.join("cliento.log");
    rotate(&log_path, &data_dir.join("cliento.old.log"));

    if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
        if let Ok(mut guard) = LOG_FILE.lock() {
            *guard = Some(file);
        }
        if let Ok(mut guard) = LOG_PATH.lock() {
            *guard = Some(log_path.clone());
        }
    }

    let installed = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("cliento=info"),
    )
    .format(|buf, record| {
        let line = format!(
            "[{}] {:<5} {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            record.args()
        );
        tee(&line);
        writeln!(buf, "{}", line)
    })
    .try_init();

    if installed.is_ok() {
        log::info!("=== cliento v{} started ===", env!("CARGO_PKG_VERSION"));
        log::info!("OS: {}", std::env::consts::OS);
        log::info!("Arch: {}", std::env::consts::ARCH);
        log::info!("Log file: {}", log_path.display());
    }
}

// Past 2 MiB the log is moved aside and a fresh one started
fn rotate(log_path: &Path, old_path: &Path) {
    if let Ok(meta) = fs::metadata(log_path) {
        if meta.len() > MAX_LOG_BYTES {
            let _ = fs::rename(log_path, old_path);
        }
    }
}

fn tee(line: &str) {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(ref mut file) = *guard {
            let _ = writeln!(file, "{}", line);
            let _ = file.flush();
        }
    }
}

pub fn log_path() -> Option<String> {
    LOG_PATH
        .lock()
        .ok()
        .and_then(|g| g.as_ref().map(|p| p.display().to_string()))
}

pub fn truncate_for_log(message: &str) -> String {
    if message.chars().count() <= MAX_LINE_CHARS {
        return message.to_string();
    }
    let head: String = message.chars().take(MAX_LINE_CHARS).collect();
    format!("{}...", head)
}

/// Loggable form of a wire message with base64 payloads replaced.
pub fn describe_message(message: &Value) -> String {
    let mut shown = message.clone();
    if let Some(obj) = shown.as_object_mut() {
        // File replies carry the payload in `data`
        if obj.get("type").and_then(Value::as_str) == Some("UPDATE_RESPONSE_FILE") {
            let path = obj.get("path").and_then(Value::as_str).unwrap_or("?").to_string();
            obj.insert("data".into(), Value::String(format!("<binary data for {}>", path)));
        }
        // Asset pushes carry it in `data.content`
        if let Some(data) = obj.get_mut("data").and_then(Value::as_object_mut) {
            if data.contains_key("content") {
                let path = data.get("path").and_then(Value::as_str).unwrap_or("?").to_string();
                data.insert("content".into(), Value::String(format!("<binary data for {}>", path)));
            }
        }
    }
    truncate_for_log(&shown.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate_long_lines() {
        let long = "x".repeat(MAX_LINE_CHARS + 20);
        let shown = truncate_for_log(&long);
        assert_eq!(shown.chars().count(), MAX_LINE_CHARS + 3);
        assert!(shown.ends_with("..."));
        assert_eq!(truncate_for_log("short"), "short");
    }

    #[test]
    fn test_binary_payloads_are_redacted() {
        let push = json!({
            "command": "SHORTCUT_ICON_UPDATE",
            "data": {"path": "resources/ico/a.png", "content": "iVBORw0KGgo="}
        });
        let shown = describe_message(&push);
        assert!(shown.contains("<binary data for resources/ico/a.png>"));
        assert!(!shown.contains("iVBORw0KGgo="));

        let reply = json!({"type": "UPDATE_RESPONSE_FILE", "path": "cliento/app.py", "data": "cHJpbnQ="});
        assert!(describe_message(&reply).contains("<binary data for cliento/app.py>"));
    }

    #[test]
    fn test_rotation_moves_large_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("cliento.log");
        let old = dir.path().join("cliento.old.log");

        fs::write(&log, vec![b'a'; 16]).unwrap();
        rotate(&log, &old);
        assert!(log.exists());

        fs::write(&log, vec![b'a'; MAX_LOG_BYTES as usize + 1]).unwrap();
        rotate(&log, &old);
        assert!(!log.exists());
        assert!(old.exists());
    }
}

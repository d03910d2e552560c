//! Guards for client-supplied paths and plugin ids.
//!
//! Every file operation driven by a value that came over the wire must pass
//! one of these checks before the filesystem is touched.

use std::path::Path;

/// A project-relative path that cannot escape the project root.
pub fn is_safe_relative(path: &str) -> bool {
    if path.is_empty() || path.contains("..") {
        return false;
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return false;
    }
    // Drive letters and UNC prefixes
    if path.contains(':') || Path::new(path).is_absolute() {
        return false;
    }
    true
}

pub fn is_safe_plugin_id(id: &str) -> bool {
    !id.is_empty() && !id.contains("..") && !id.contains('/') && !id.contains('\\')
}

/// Joins relative components with `/` regardless of platform.
pub fn to_wire_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_escapes() {
        assert!(!is_safe_relative("../etc/passwd"));
        assert!(!is_safe_relative("plugins/../../x"));
        assert!(!is_safe_relative("/etc/passwd"));
        assert!(!is_safe_relative("\\windows\\system32"));
        assert!(!is_safe_relative("C:\\boot.ini"));
        assert!(!is_safe_relative(""));
    }

    #[test]
    fn test_accepts_project_paths() {
        assert!(is_safe_relative("cliento/main.py"));
        assert!(is_safe_relative("plugins/shortcut/icons/a.png"));
    }

    #[test]
    fn test_plugin_ids() {
        assert!(is_safe_plugin_id("shortcut"));
        assert!(!is_safe_plugin_id("a/b"));
        assert!(!is_safe_plugin_id("a\\b"));
        assert!(!is_safe_plugin_id(".."));
        assert!(!is_safe_plugin_id(""));
    }

    #[test]
    fn test_wire_path() {
        let p = Path::new("plugins").join("a").join("b.txt");
        assert_eq!(to_wire_path(&p), "plugins/a/b.txt");
    }
}

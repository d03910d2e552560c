//! Executes button presses reported by clients.

use std::path::PathBuf;

use serde_json::Value;
use tokio::process::Command;

use crate::distribution::plugins::PluginCatalogue;
use crate::error::ActionError;
use crate::events::EventSink;
use crate::models::layout::{ActionKind, ButtonAction};
use crate::store::LayoutStore;

pub const BUTTON_PRESS: &str = "PLUGIN_BUTTON_PRESS";
pub const DEFAULT_PLUGIN: &str = "shortcut";

/// Handled by the client itself and never executed here.
const CLIENT_NAVIGATION: [&str; 2] = ["page_prev", "page_next"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPlan {
    pub program: String,
    pub args: Vec<String>,
}

/// Event sink that runs the action bound to a pressed button.
pub struct ActionRunner {
    catalogue: PluginCatalogue,
    shortcut_helper: Option<String>,
}

impl ActionRunner {
    pub fn new(root: PathBuf, shortcut_helper: Option<String>) -> Self {
        Self {
            catalogue: PluginCatalogue::new(root),
            shortcut_helper,
        }
    }

    /// Finds the action bound to the button named in a press command.
    pub fn resolve(&self, command: &Value) -> Result<ButtonAction, ActionError> {
        let payload = command.get("payload").unwrap_or(&Value::Null);
        let id = payload.get("id").and_then(Value::as_str).unwrap_or_default();
        let plugin_id = payload
            .get("plugin_id")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PLUGIN);

        let (page, button) = id
            .split_once(':')
            .and_then(|(p, b)| Some((p.trim().parse::<u32>().ok()?, b.trim())))
            .ok_or_else(|| ActionError::MalformedId(id.to_string()))?;

        let plugin_dir = self.catalogue.plugin_dir(plugin_id)?;
        let store = LayoutStore::open(&plugin_dir);
        store
            .layout()
            .button(page, button)
            .and_then(|b| b.action.clone())
            .ok_or_else(|| ActionError::NoAction(id.to_string()))
    }

    /// Turns an action into a process invocation. `None` means there is
    /// nothing to run on this machine.
    pub fn plan(&self, action: &ButtonAction) -> Result<Option<ActionPlan>, ActionError> {
        let value = action.value.trim();
        if value.is_empty() {
            return Ok(None);
        }
        match action.kind {
            ActionKind::System if CLIENT_NAVIGATION.contains(&value) => Ok(None),
            ActionKind::Program | ActionKind::System => Ok(Some(shell(value))),
            ActionKind::Shortcut => {
                let helper = self
                    .shortcut_helper
                    .as_deref()
                    .ok_or(ActionError::ShortcutUnsupported)?;
                let mut parts = helper.split_whitespace().map(str::to_string);
                let program = parts.next().ok_or(ActionError::ShortcutUnsupported)?;
                let mut args: Vec<String> = parts.collect();
                args.push(value.to_string());
                Ok(Some(ActionPlan { program, args }))
            }
        }
    }

    fn run(&self, command: &Value) -> Result<(), ActionError> {
        let action = self.resolve(command)?;
        let Some(plan) = self.plan(&action)? else {
            return Ok(());
        };
        tracing::info!("Running {:?} action: {}", action.kind, action.value);

        let mut child = Command::new(&plan.program).args(&plan.args).spawn()?;
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    tracing::warn!("Action {} exited with {}", plan.program, status)
                }
                Err(e) => tracing::warn!("Action {} failed: {}", plan.program, e),
                _ => {}
            }
        });
        Ok(())
    }
}

fn shell(line: &str) -> ActionPlan {
    if cfg!(windows) {
        ActionPlan {
            program: "cmd".to_string(),
            args: vec!["/C".to_string(), line.to_string()],
        }
    } else {
        ActionPlan {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), line.to_string()],
        }
    }
}

impl EventSink for ActionRunner {
    fn on_command(&self, command: &Value) {
        if command.get("command").and_then(Value::as_str) != Some(BUTTON_PRESS) {
            return;
        }
        if let Err(e) = self.run(command) {
            tracing::warn!("Button press not executed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use serde_json::json;

    fn runner_with_layout(helper: Option<&str>) -> (tempfile::TempDir, ActionRunner) {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("plugins/shortcut/config");
        fs::create_dir_all(&config).unwrap();
        fs::write(
            config.join("button_shortcut.json"),
            r#"{
                "page_1": {
                    "butt_toolB_01": {"name": "Term", "action": {"type": "program", "value": "xterm"}},
                    "butt_toolB_02": {"name": "Copy", "action": {"type": "shortcut", "value": "ctrl+c"}},
                    "butt_toolB_03": {"name": "Next", "action": {"type": "system", "value": "page_next"}},
                    "butt_toolB_04": {"name": "Label only"}
                }
            }"#,
        )
        .unwrap();
        let runner = ActionRunner::new(dir.path().to_path_buf(), helper.map(str::to_string));
        (dir, runner)
    }

    fn press(id: &str) -> Value {
        json!({"command": BUTTON_PRESS, "payload": {"id": id}})
    }

    #[test]
    fn test_resolve_program_button() {
        let (_dir, runner) = runner_with_layout(None);
        let action = runner.resolve(&press("1:butt_toolB_01")).unwrap();
        assert_eq!(action.kind, ActionKind::Program);

        let plan = runner.plan(&action).unwrap().unwrap();
        assert!(plan.args.contains(&"xterm".to_string()));
    }

    #[test]
    fn test_resolve_errors() {
        let (_dir, runner) = runner_with_layout(None);
        assert!(matches!(
            runner.resolve(&press("nonsense")),
            Err(ActionError::MalformedId(_))
        ));
        assert!(matches!(
            runner.resolve(&press("1:butt_toolB_04")),
            Err(ActionError::NoAction(_))
        ));
        assert!(matches!(
            runner.resolve(&json!({"command": BUTTON_PRESS, "payload": {"id": "1:x", "plugin_id": "../etc"}})),
            Err(ActionError::Distribution(_))
        ));
    }

    #[test]
    fn test_shortcut_needs_helper() {
        let (_dir, runner) = runner_with_layout(None);
        let action = runner.resolve(&press("1:butt_toolB_02")).unwrap();
        assert!(matches!(runner.plan(&action), Err(ActionError::ShortcutUnsupported)));

        let (_dir, runner) = runner_with_layout(Some("xdotool key"));
        let plan = runner.plan(&action).unwrap().unwrap();
        assert_eq!(plan.program, "xdotool");
        assert_eq!(plan.args, vec!["key", "ctrl+c"]);
    }

    #[test]
    fn test_page_navigation_is_not_executed() {
        let (_dir, runner) = runner_with_layout(None);
        let action = runner.resolve(&press("1:butt_toolB_03")).unwrap();
        assert_eq!(runner.plan(&action).unwrap(), None);
    }
}

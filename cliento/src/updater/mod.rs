//! Client side of the file sync protocol.
//!
//! Each target (the core bundle or one plugin) is brought up to date by a
//! version check, a manifest fetch and one download per changed file. A
//! target's version tag is written only after every file verified.

pub mod exchange;

use std::fmt;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::Value;

use crate::error::UpdateError;
use crate::storage::{is_safe_relative, md5_hex, LocalStore};
use crate::sync::types::*;

pub use exchange::{Exchange, WsExchange};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Core,
    Plugin(String),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Core => write!(f, "core"),
            Target::Plugin(id) => write!(f, "plugin {}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub target: Target,
    pub local_version: String,
    pub remote_version: String,
    pub downloaded: usize,
    pub unchanged: usize,
    pub restart_required: bool,
}

pub struct Updater<E> {
    exchange: E,
    store: LocalStore,
    always_check: bool,
}

impl<E: Exchange> Updater<E> {
    /// `always_check` fetches the manifest even when versions agree.
    pub fn new(exchange: E, store: LocalStore, always_check: bool) -> Self {
        Self {
            exchange,
            store,
            always_check,
        }
    }

    pub fn into_exchange(self) -> E {
        self.exchange
    }

    /// Updates the core bundle. Any failure means nothing to restart for.
    pub async fn check_and_update(&mut self) -> bool {
        match self.sync_target(&Target::Core).await {
            Ok(report) => report.restart_required,
            Err(e) => {
                log::error!("Core update failed: {}", e);
                false
            }
        }
    }

    /// Updates every plugin the server offers, each independently.
    pub async fn check_and_update_plugins(&mut self) -> bool {
        let plugins = match self.list_plugins().await {
            Ok(plugins) => plugins,
            Err(e) => {
                log::error!("Could not list plugins: {}", e);
                return false;
            }
        };
        log::info!("Server offers {} plugin(s)", plugins.len());

        let mut restart = false;
        for plugin_id in plugins {
            match self.sync_target(&Target::Plugin(plugin_id.clone())).await {
                Ok(report) => restart |= report.restart_required,
                Err(e) => log::error!("Update of plugin {} failed: {}", plugin_id, e),
            }
        }
        restart
    }

    pub async fn list_plugins(&mut self) -> Result<Vec<String>, UpdateError> {
        let reply = self.request(Request::new(PLUGIN_LIST_ALL), PLUGIN_LIST_RESPONSE).await?;
        let plugins: Vec<String> = reply
            .get("plugins")
            .cloned()
            .map(serde_json::from_value::<Vec<String>>)
            .transpose()
            .map_err(|e| UpdateError::Protocol(format!("Bad plugin list: {}", e)))?
            .unwrap_or_default();
        Ok(plugins
            .into_iter()
            .filter(|id| {
                let safe = is_safe_relative(id) && !id.contains('/') && !id.contains('\\');
                if !safe {
                    log::warn!("Ignoring plugin with unsafe id {:?}", id);
                }
                safe
            })
            .collect())
    }

    pub async fn sync_target(&mut self, target: &Target) -> Result<SyncReport, UpdateError> {
        let remote_version = self.remote_version(target).await?;
        let local_version = self.store.read_version(&self.version_paths(target));
        log::info!("{}: local {}, server {}", target, local_version, remote_version);

        let mut report = SyncReport {
            target: target.clone(),
            local_version,
            remote_version,
            downloaded: 0,
            unchanged: 0,
            restart_required: false,
        };
        if report.local_version == report.remote_version && !self.always_check {
            return Ok(report);
        }

        let manifest = self.manifest(target).await?;
        for dir in &manifest.directories_to_ensure {
            if !is_safe_relative(dir) {
                return Err(UpdateError::UnsafePath(dir.clone()));
            }
            std::fs::create_dir_all(self.store.path(dir))?;
        }

        for entry in &manifest.files_map {
            if entry.is_directory {
                log::warn!("Unexpanded directory entry {}", entry.remote_path);
                continue;
            }
            let local_path = self.local_path(entry)?;
            let current = self.store.md5_file(&local_path);
            if entry.md5.is_some() && current == entry.md5 {
                report.unchanged += 1;
                continue;
            }
            self.download(entry, &local_path).await?;
            report.downloaded += 1;
        }

        let version_path = self.version_paths(target).remove(0);
        self.store
            .write_version(&version_path, &report.remote_version)?;

        report.restart_required =
            report.local_version != report.remote_version || report.downloaded > 0;
        log::info!(
            "{}: {} downloaded, {} unchanged, restart required: {}",
            target,
            report.downloaded,
            report.unchanged,
            report.restart_required
        );
        Ok(report)
    }

    async fn request(&mut self, request: Request, expected: &str) -> Result<Value, UpdateError> {
        let reply = self.exchange.round_trip(request).await?;
        if let Some(error) = reply_error(&reply) {
            return Err(UpdateError::Server(error));
        }
        let kind = reply.get("type").and_then(Value::as_str).unwrap_or_default();
        if kind != expected {
            return Err(UpdateError::Protocol(format!(
                "expected {}, got {}",
                expected, kind
            )));
        }
        Ok(reply)
    }

    async fn remote_version(&mut self, target: &Target) -> Result<String, UpdateError> {
        let request = match target {
            Target::Core => Request::new(UPDATE_GET_VER),
            Target::Plugin(id) => Request::new(PLUGIN_UPDATE_GET_VER).with("plugin_id", id.as_str()),
        };
        let reply = self.request(request, UPDATE_RESPONSE_VER).await?;
        reply
            .get("version")
            .and_then(Value::as_str)
            .map(|v| v.trim().to_string())
            .ok_or_else(|| UpdateError::Protocol("version reply without version".to_string()))
    }

    async fn manifest(&mut self, target: &Target) -> Result<FileManifest, UpdateError> {
        let request = match target {
            Target::Core => Request::new(UPDATE_GET_MANIFEST),
            Target::Plugin(id) => {
                Request::new(PLUGIN_UPDATE_GET_MANIFEST).with("plugin_id", id.as_str())
            }
        };
        let mut reply = self.request(request, UPDATE_RESPONSE_MANIFEST).await?;
        let manifest = reply.get_mut("manifest").map(Value::take).unwrap_or_default();
        serde_json::from_value(manifest)
            .map_err(|e| UpdateError::Protocol(format!("Bad manifest: {}", e)))
    }

    async fn download(&mut self, entry: &ManifestEntry, local_path: &Path) -> Result<(), UpdateError> {
        log::info!("Downloading {}", entry.remote_path);
        let request = Request::new(UPDATE_DOWNLOAD_FILE).with("path", entry.remote_path.as_str());
        let reply = self.request(request, UPDATE_RESPONSE_FILE).await?;
        let data = reply.get("data").and_then(Value::as_str).unwrap_or_default();
        let bytes = BASE64
            .decode(data)
            .map_err(|e| UpdateError::Protocol(format!("{} is not valid base64: {}", entry.remote_path, e)))?;

        if let Some(expected) = &entry.md5 {
            let actual = md5_hex(&bytes);
            if &actual != expected {
                return Err(UpdateError::Integrity {
                    path: entry.remote_path.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        self.store.write_atomic(local_path, &bytes)?;
        Ok(())
    }

    /// Files land in `local_dir` under their remote file name.
    fn local_path(&self, entry: &ManifestEntry) -> Result<PathBuf, UpdateError> {
        if !is_safe_relative(&entry.remote_path) {
            return Err(UpdateError::UnsafePath(entry.remote_path.clone()));
        }
        if !entry.local_dir.is_empty() && !is_safe_relative(&entry.local_dir) {
            return Err(UpdateError::UnsafePath(entry.local_dir.clone()));
        }
        let name = entry
            .remote_path
            .rsplit(|c| c == '/' || c == '\\')
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| UpdateError::UnsafePath(entry.remote_path.clone()))?;
        Ok(self.store.path(&entry.local_dir).join(name))
    }

    fn version_paths(&self, target: &Target) -> Vec<PathBuf> {
        match target {
            Target::Core => vec![self.store.core_version_path()],
            Target::Plugin(id) => self.store.plugin_version_paths(id),
        }
    }
}

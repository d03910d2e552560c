//! Error types for the bandito server.

use thiserror::Error;

/// Failures while serving versions, manifests and files to clients.
#[derive(Error, Debug)]
pub enum DistributionError {
    #[error("Unsafe path rejected: {0}")]
    UnsafePath(String),

    #[error("Invalid plugin id: {0}")]
    InvalidPluginId(String),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Version file not found: {0}")]
    VersionNotFound(String),

    #[error("Manifest not found: {0}")]
    ManifestNotFound(String),

    #[error("Invalid manifest {path}: {message}")]
    InvalidManifest { path: String, message: String },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Validation failures on the slot and button-layout documents.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    #[error("Invalid slot index {0} (1-5)")]
    InvalidSlot(u8),

    #[error("Slot {0} is empty")]
    EmptySlot(u8),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Page {0} does not exist")]
    PageNotFound(u32),

    #[error("Cannot remove the last page")]
    LastPage,

    #[error("Invalid button slot: {0}")]
    InvalidButton(String),

    #[error("Prefab not found: {0}")]
    PrefabNotFound(String),
}

/// Failure while executing a button press.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Malformed button id: {0}")]
    MalformedId(String),

    #[error("No action configured for {0}")]
    NoAction(String),

    #[error("Shortcut actions need BANDITO_SHORTCUT_HELPER to be set")]
    ShortcutUnsupported,

    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error("Failed to spawn action: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Failure while answering a recognised command. Reported to the sender as
/// an `error` reply.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error("Invalid slot index {0} (1-5)")]
    InvalidSlot(u8),

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

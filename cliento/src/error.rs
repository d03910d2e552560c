use thiserror::Error;

/// Why a sync target was not brought up to date.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Connection error: {0}")]
    Transport(String),

    #[error("Unexpected reply: {0}")]
    Protocol(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("MD5 mismatch for {path}: expected {expected}, got {actual}")]
    Integrity {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Unsafe path in manifest: {0}")]
    UnsafePath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Not connected to server")]
    NotConnected,

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Invalid slot index {0} (1-5)")]
    InvalidSlot(u8),

    #[error("Slot {0} is empty")]
    EmptySlot(u8),

    #[error("No plugin is displayed")]
    NoActivePlugin,
}

//! Observer interface for things that happen on client connections.
//!
//! The router reports connections, pass-through commands and protocol errors
//! to an [`EventSink`] handed to it at construction time.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;

pub trait EventSink: Send + Sync {
    fn on_client_connected(&self, _peer: SocketAddr) {}
    fn on_client_disconnected(&self, _peer: SocketAddr) {}
    /// A command the router does not answer itself, or one it also wants
    /// the local side to see.
    fn on_command(&self, _command: &Value) {}
    fn on_error(&self, _message: &str) {}
}

/// Logs every event.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_client_connected(&self, peer: SocketAddr) {
        tracing::info!("Client connected: {}", peer);
    }

    fn on_client_disconnected(&self, peer: SocketAddr) {
        tracing::info!("Client disconnected: {}", peer);
    }

    fn on_command(&self, command: &Value) {
        let tag = command.get("command").and_then(Value::as_str).unwrap_or("?");
        tracing::debug!("Command event: {}", tag);
    }

    fn on_error(&self, message: &str) {
        tracing::warn!("{}", message);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Connected(SocketAddr),
    Disconnected(SocketAddr),
    Command(Value),
    Error(String),
}

/// Forwards events into a channel with the time they happened.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(DateTime<Utc>, ServerEvent)>,
}

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<(DateTime<Utc>, ServerEvent)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: ServerEvent) {
        let _ = self.tx.send((Utc::now(), event));
    }
}

impl EventSink for ChannelSink {
    fn on_client_connected(&self, peer: SocketAddr) {
        self.emit(ServerEvent::Connected(peer));
    }

    fn on_client_disconnected(&self, peer: SocketAddr) {
        self.emit(ServerEvent::Disconnected(peer));
    }

    fn on_command(&self, command: &Value) {
        self.emit(ServerEvent::Command(command.clone()));
    }

    fn on_error(&self, message: &str) {
        self.emit(ServerEvent::Error(message.to_string()));
    }
}

/// Delivers each event to several sinks in order.
pub struct FanoutSink(pub Vec<Arc<dyn EventSink>>);

impl EventSink for FanoutSink {
    fn on_client_connected(&self, peer: SocketAddr) {
        self.0.iter().for_each(|s| s.on_client_connected(peer));
    }

    fn on_client_disconnected(&self, peer: SocketAddr) {
        self.0.iter().for_each(|s| s.on_client_disconnected(peer));
    }

    fn on_command(&self, command: &Value) {
        self.0.iter().for_each(|s| s.on_command(command));
    }

    fn on_error(&self, message: &str) {
        self.0.iter().for_each(|s| s.on_error(message));
    }
}

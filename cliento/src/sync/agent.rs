use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;

use super::state::{ClientState, SLOT_COUNT};
use super::types::*;
use super::ws_client::WsClient;
use crate::error::AgentError;
use crate::logging::describe_message;
use crate::plugins::{PluginEffect, PluginRegistry};
use crate::storage::{LocalStore, SLOTS_FILE};

pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(3);

const PAGE_PREV: &str = "page_prev";
const PAGE_NEXT: &str = "page_next";

/// State changes reported to whoever renders the surface.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Connected,
    Disconnected,
    SlotsChanged,
    /// `confirmed` is false for a local selection still awaiting the server.
    ActiveSlot { index: Option<u8>, confirmed: bool },
    PageChanged(u32),
    PluginUpdated { command: String, effect: PluginEffect },
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonOutcome {
    Paged(u32),
    Sent,
}

struct Inner {
    server_url: String,
    store: LocalStore,
    plugins: PluginRegistry,
    state: RwLock<ClientState>,
    ws: RwLock<Option<WsClient>>,
    events: mpsc::UnboundedSender<AgentEvent>,
    shutdown: watch::Sender<bool>,
    reconnect_interval: Duration,
}

/// Keeps one session open to the server, mirrors slot and plugin state
/// locally, and forwards user interaction.
#[derive(Clone)]
pub struct SyncAgent {
    inner: Arc<Inner>,
}

impl SyncAgent {
    pub fn new(
        server_url: &str,
        store: LocalStore,
        plugins: PluginRegistry,
    ) -> (Self, mpsc::UnboundedReceiver<AgentEvent>) {
        Self::with_reconnect_interval(server_url, store, plugins, RECONNECT_INTERVAL)
    }

    pub fn with_reconnect_interval(
        server_url: &str,
        store: LocalStore,
        plugins: PluginRegistry,
        reconnect_interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<AgentEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        let agent = Self {
            inner: Arc::new(Inner {
                server_url: server_url.to_string(),
                store,
                plugins,
                state: RwLock::new(ClientState::new()),
                ws: RwLock::new(None),
                events,
                shutdown,
                reconnect_interval,
            }),
        };
        (agent, rx)
    }

    /// Spawns the connection loop. It runs until [`SyncAgent::shutdown`].
    pub fn start(&self) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.run().await })
    }

    pub async fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        if let Some(ws) = self.inner.ws.write().await.take() {
            ws.disconnect().await;
        }
    }

    pub async fn state(&self) -> ClientState {
        self.inner.state.read().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.ws.read().await.is_some()
    }

    /// Switches to a slot locally and asks the server to make it active for
    /// every client.
    pub async fn select_slot(&self, index: u8) -> Result<(), AgentError> {
        if !(1..=SLOT_COUNT).contains(&index) {
            return Err(AgentError::InvalidSlot(index));
        }
        let ws = self.inner.ws.read().await;
        let client = ws.as_ref().ok_or(AgentError::NotConnected)?;

        if !self.inner.state.write().await.show(index) {
            return Err(AgentError::EmptySlot(index));
        }
        self.inner.emit(AgentEvent::ActiveSlot {
            index: Some(index),
            confirmed: false,
        });

        let request = Request::new(CLIENT_SET_ACTIVE_SLOT).payload(json!({ "index": index }));
        client.send(&request).await.map_err(AgentError::Send)
    }

    /// Presses a button of the displayed plugin. Page navigation stays on
    /// this machine; everything else is executed by the server.
    pub async fn press_button(&self, page: u32, button: &str) -> Result<ButtonOutcome, AgentError> {
        let plugin_id = self
            .inner
            .state
            .read()
            .await
            .displayed_plugin()
            .map(|p| p.id.clone())
            .ok_or(AgentError::NoActivePlugin)?;

        if let Some(handler) = self.inner.plugins.for_plugin(&plugin_id) {
            let action = handler.button(page, button).and_then(|b| b.action);
            if let Some(action) = action.filter(|a| a.kind == "system") {
                let delta = match action.value.trim() {
                    PAGE_PREV => Some(-1),
                    PAGE_NEXT => Some(1),
                    _ => None,
                };
                if let Some(delta) = delta {
                    let page = self
                        .inner
                        .state
                        .write()
                        .await
                        .step_page(delta, handler.page_count());
                    self.inner.emit(AgentEvent::PageChanged(page));
                    return Ok(ButtonOutcome::Paged(page));
                }
            }
        }

        let ws = self.inner.ws.read().await;
        let client = ws.as_ref().ok_or(AgentError::NotConnected)?;
        let request = Request::new(PLUGIN_BUTTON_PRESS).payload(json!({
            "id": format!("{}:{}", page, button),
            "plugin_id": plugin_id,
        }));
        client.send(&request).await.map_err(AgentError::Send)?;
        Ok(ButtonOutcome::Sent)
    }
}

impl Inner {
    fn emit(&self, event: AgentEvent) {
        let _ = self.events.send(event);
    }

    async fn run(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            if *shutdown.borrow() {
                break;
            }

            match WsClient::connect(&self.server_url).await {
                Ok((client, incoming)) => {
                    if self.session(client, incoming, &mut shutdown).await {
                        break;
                    }
                }
                Err(e) => log::warn!("{}", e),
            }

            log::info!("Reconnecting in {:?}", self.reconnect_interval);
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
        log::info!("Sync agent stopped");
    }

    /// Runs one connected session. Returns true if it ended because of
    /// shutdown.
    async fn session(
        &self,
        client: WsClient,
        mut incoming: mpsc::Receiver<Value>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        if let Err(e) = client.send(&Request::new(GET_PLUGIN_SLOTS)).await {
            log::warn!("Handshake failed: {}", e);
            return false;
        }
        *self.ws.write().await = Some(client);
        self.emit(AgentEvent::Connected);

        let stopped = loop {
            tokio::select! {
                message = incoming.recv() => match message {
                    Some(message) => self.handle(message).await,
                    None => break false,
                },
                _ = shutdown.changed() => break true,
            }
        };

        if let Some(ws) = self.ws.write().await.take() {
            ws.disconnect().await;
        }
        self.emit(AgentEvent::Disconnected);
        log::info!("Disconnected from {}", self.server_url);
        stopped
    }

    async fn handle(&self, message: Value) {
        log::debug!("<- {}", describe_message(&message));
        match Inbound::classify(message) {
            Inbound::Push { command, data } => self.handle_push(&command, &data).await,
            Inbound::Reply { kind, body, .. } => {
                if let Some(error) = reply_error(&body) {
                    log::warn!("Server error ({}): {}", kind, error);
                    self.emit(AgentEvent::Error(error));
                }
            }
            Inbound::Unknown(_) => log::warn!("Message without command or type ignored"),
        }
    }

    async fn handle_push(&self, command: &str, data: &Value) {
        match command {
            UPDATE_PLUGIN_SLOTS => {
                let (activated, document, active) = {
                    let mut state = self.state.write().await;
                    let activated = state.replace_slots(data);
                    (activated, state.to_document(), state.active())
                };
                let outcome = self.store.save_json(&self.store.path(SLOTS_FILE), &document);
                if !outcome.success {
                    self.emit(AgentEvent::Error(outcome.message));
                }
                self.emit(AgentEvent::SlotsChanged);
                if activated {
                    self.emit(AgentEvent::ActiveSlot {
                        index: active,
                        confirmed: true,
                    });
                }
            }
            SET_ACTIVE_SLOT => {
                let requested = data
                    .get("index")
                    .and_then(Value::as_u64)
                    .and_then(|i| u8::try_from(i).ok());
                let active = {
                    let mut state = self.state.write().await;
                    state.apply_active(requested);
                    state.active()
                };
                if requested.is_some() && active.is_none() {
                    log::info!("Slot {:?} is not populated here, deactivating", requested);
                }
                self.emit(AgentEvent::ActiveSlot {
                    index: active,
                    confirmed: true,
                });
            }
            _ => match self.plugins.for_command(command) {
                Some(handler) => match handler.handle(command, data) {
                    Ok(effect) => self.emit(AgentEvent::PluginUpdated {
                        command: command.to_string(),
                        effect,
                    }),
                    Err(e) => {
                        log::warn!("{} failed: {}", command, e);
                        self.emit(AgentEvent::Error(e));
                    }
                },
                None => log::debug!("No handler for {}", command),
            },
        }
    }
}

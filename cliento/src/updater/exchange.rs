use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::UpdateError;
use crate::sync::types::{Inbound, Request};
use crate::sync::ws_client::WsClient;

pub const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// One request, one reply.
pub trait Exchange {
    fn round_trip(&mut self, request: Request) -> impl Future<Output = Result<Value, UpdateError>> + Send;
}

/// Sequential request/reply over a dedicated WebSocket session. Pushes and
/// replies to other requests arriving meanwhile are skipped.
pub struct WsExchange {
    client: WsClient,
    incoming: mpsc::Receiver<Value>,
    timeout: Duration,
}

impl WsExchange {
    pub async fn connect(server_url: &str) -> Result<Self, UpdateError> {
        let (client, incoming) = WsClient::connect(server_url)
            .await
            .map_err(UpdateError::Transport)?;
        Ok(Self {
            client,
            incoming,
            timeout: REPLY_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn close(self) {
        self.client.disconnect().await;
    }
}

impl Exchange for WsExchange {
    async fn round_trip(&mut self, request: Request) -> Result<Value, UpdateError> {
        self.client
            .send(&request)
            .await
            .map_err(UpdateError::Transport)?;

        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            let message = tokio::time::timeout_at(deadline, self.incoming.recv())
                .await
                .map_err(|_| {
                    UpdateError::Transport(format!("No reply to {} in time", request.command()))
                })?
                .ok_or_else(|| UpdateError::Transport("Connection closed".to_string()))?;

            match Inbound::classify(message) {
                Inbound::Reply { id, body, .. } if id.as_deref().map_or(true, |id| id == request.id()) => {
                    return Ok(body)
                }
                Inbound::Push { command, .. } => log::debug!("Skipping push {} during update", command),
                _ => log::debug!("Skipping unrelated message during update"),
            }
        }
    }
}

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::types::Request;
use crate::logging::truncate_for_log;

const CHANNEL_CAPACITY: usize = 64;

/// One WebSocket session. Incoming JSON messages are delivered on the
/// receiver returned by [`WsClient::connect`]; it closes when the socket
/// does.
pub struct WsClient {
    outgoing_tx: mpsc::Sender<String>,
    shutdown_tx: mpsc::Sender<()>,
}

impl WsClient {
    pub async fn connect(ws_url: &str) -> Result<(Self, mpsc::Receiver<Value>), String> {
        let url = url::Url::parse(ws_url).map_err(|e| format!("Invalid WS URL: {}", e))?;

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| format!("WebSocket connect failed: {}", e))?;

        let (mut ws_sink, mut ws_stream_rx) = ws_stream.split();

        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
        let (incoming_tx, incoming_rx) = mpsc::channel::<Value>(CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        // Send task: forwards outgoing messages to the WebSocket
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(msg) = outgoing_rx.recv() => {
                        if ws_sink.send(Message::Text(msg.into())).await.is_err() {
                            break;
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = ws_sink.close().await;
                        break;
                    }
                }
            }
        });

        // Receive task: parses frames and hands them to the session owner
        tokio::spawn(async move {
            while let Some(result) = ws_stream_rx.next().await {
                match result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<Value>(&text) {
                        Ok(value) => {
                            if incoming_tx.send(value).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => log::warn!(
                            "Ignoring malformed message ({}): {}",
                            e,
                            truncate_for_log(&text)
                        ),
                    },
                    Ok(Message::Close(_)) => break,
                    Err(e) => {
                        log::debug!("WebSocket read error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            log::info!("WebSocket receive loop ended");
        });

        log::info!("WebSocket connected to {}", ws_url);

        Ok((
            Self {
                outgoing_tx,
                shutdown_tx,
            },
            incoming_rx,
        ))
    }

    pub async fn send(&self, request: &Request) -> Result<(), String> {
        log::debug!("-> {} ({})", request.command(), request.id());
        self.outgoing_tx
            .send(request.to_json())
            .await
            .map_err(|e| format!("Send failed: {}", e))
    }

    pub fn is_closed(&self) -> bool {
        self.outgoing_tx.is_closed()
    }

    pub async fn disconnect(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::hub::OUTBOX_CAPACITY;
use crate::router;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, peer))
}

async fn handle_socket(socket: WebSocket, state: AppState, peer: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();

    // Everything addressed to this client (replies and broadcasts) goes through its outbox
    let (outbox_tx, mut outbox_rx) = mpsc::channel::<String>(OUTBOX_CAPACITY);
    let conn = state.hub.register(outbox_tx);
    let mut shutdown = state.shutdown.subscribe();

    state.events.on_client_connected(peer);
    tracing::info!("WebSocket connected: peer={}, conn={}", peer, conn);

    let mut send_task = tokio::spawn(async move {
        if *shutdown.borrow() {
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
        loop {
            tokio::select! {
                Some(payload) = outbox_rx.recv() => {
                    if sender.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                _ = shutdown.changed() => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => router::dispatch(&recv_state, conn, &text).await,
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.hub.unregister(conn);
    state.events.on_client_disconnected(peer);
    tracing::info!("WebSocket disconnected: peer={}, conn={}", peer, conn);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream};

    use crate::events::TracingSink;
    use crate::AppState;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start(root: &std::path::Path) -> (String, oneshot::Sender<()>) {
        let state = AppState::new(root.to_path_buf(), Arc::new(TracingSink));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let signal = async move {
                let _ = rx.await;
            };
            crate::serve(listener, state, signal).await.unwrap();
        });
        (url, tx)
    }

    async fn send(client: &mut Client, value: Value) {
        client.send(WsMessage::Text(value.to_string())).await.unwrap();
    }

    async fn next_json(client: &mut Client) -> Value {
        loop {
            match client.next().await.unwrap().unwrap() {
                WsMessage::Text(text) => return serde_json::from_str(&text).unwrap(),
                WsMessage::Close(_) => panic!("socket closed"),
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn test_active_slot_is_broadcast_to_everyone() {
        let dir = tempfile::tempdir().unwrap();
        let (url, _stop) = start(dir.path()).await;
        let (mut first, _) = connect_async(url.as_str()).await.unwrap();
        let (mut second, _) = connect_async(url.as_str()).await.unwrap();

        // A slot push back proves each socket is registered.
        for client in [&mut first, &mut second] {
            send(client, json!({"command": "GET_PLUGIN_SLOTS"})).await;
            assert_eq!(next_json(client).await["command"], "UPDATE_PLUGIN_SLOTS");
        }

        send(&mut first, json!({"command": "CLIENT_SET_ACTIVE_SLOT", "payload": {"index": 2}})).await;
        for client in [&mut first, &mut second] {
            assert_eq!(
                next_json(client).await,
                json!({"command": "SET_ACTIVE_SLOT", "data": {"index": 2}})
            );
        }
    }

    #[tokio::test]
    async fn test_bad_frames_do_not_end_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let (url, _stop) = start(dir.path()).await;
        let (mut client, _) = connect_async(url.as_str()).await.unwrap();

        client.send(WsMessage::Text("{not json".into())).await.unwrap();
        send(&mut client, json!({"command": "UPDATE_GET_VER", "id": "r-7"})).await;

        let reply = next_json(&mut client).await;
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["id"], "r-7");
    }

    #[tokio::test]
    async fn test_shutdown_closes_sockets() {
        let dir = tempfile::tempdir().unwrap();
        let (url, stop) = start(dir.path()).await;
        let (mut client, _) = connect_async(url.as_str()).await.unwrap();
        send(&mut client, json!({"command": "GET_PLUGIN_SLOTS"})).await;
        next_json(&mut client).await;

        stop.send(()).unwrap();
        let closed = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while let Some(Ok(msg)) = client.next().await {
                if msg.is_close() {
                    return true;
                }
            }
            true
        })
        .await
        .unwrap();
        assert!(closed);
    }
}

//! Loopback-only administration.
//!
//! Local editors post `{command, data}` envelopes here to reach every
//! connected client without speaking the socket protocol themselves.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::models::message::Push;
use crate::AppState;

#[derive(Serialize, utoipa::ToSchema)]
pub(crate) struct ApiError {
    error: String,
}

fn err(status: StatusCode, msg: &str) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: msg.to_string(),
        }),
    )
}

#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BroadcastAck {
    pub status: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/broadcast", post(broadcast))
}

#[utoipa::path(
    post,
    path = "/api/broadcast",
    request_body = Push,
    responses(
        (status = 200, description = "Envelope sent to every client", body = BroadcastAck),
        (status = 403, description = "Caller is not on this machine", body = ApiError),
    ),
    tag = "Admin"
)]
pub(crate) async fn broadcast(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(push): Json<Push>,
) -> Result<Json<BroadcastAck>, (StatusCode, Json<ApiError>)> {
    if !peer.ip().is_loopback() {
        tracing::warn!("Rejected broadcast from {}", peer);
        return Err(err(StatusCode::FORBIDDEN, "Broadcast is only accepted from localhost"));
    }

    let delivered = state.hub.broadcast(&push).await;
    tracing::info!("Admin broadcast {} delivered to {} clients", push.command, delivered);

    Ok(Json(BroadcastAck {
        status: "ok".to_string(),
    }))
}

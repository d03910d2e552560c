pub mod admin;
pub mod ws;

use axum::Router;

use crate::AppState;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .merge(ws::router())
        .merge(admin::router())
        .with_state(state)
}

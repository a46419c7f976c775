//! HTTP server and routing.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, ws::WebSocketUpgrade},
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::connection::run_connection;
use crate::state::RelayState;

/// Create the router: the WebSocket endpoint at `/` and `/ws`, plus `/health`.
pub fn create_router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<RelayState>>) -> Response {
    ws.on_upgrade(move |socket| run_connection(socket, state))
}

/// Health check endpoint.
async fn health_check(State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    let status = if state.is_started() { "ok" } else { "stopping" };

    Json(serde_json::json!({
        "status": status,
        "connections": state.connection_count(),
        "handlerInstalled": state.handler_installed(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_router() {
        let state = Arc::new(RelayState::new());
        let _router = create_router(state);
    }
}

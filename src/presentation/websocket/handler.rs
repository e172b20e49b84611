//! WebSocket Connection Handler

use axum::{
    extract::{ws::WebSocket, State, WebSocketUpgrade},
    response::Response,
};
use futures::StreamExt;

use super::connection::Connection;
use crate::startup::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let max_message_size = state.gateway.settings().max_message_size;
    let max_frame_size = state.gateway.settings().max_frame_size;

    ws.max_message_size(max_message_size)
        .max_frame_size(max_frame_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    // Split socket for concurrent read/write
    let (sender, receiver) = socket.split();

    Connection::new(state.gateway.clone())
        .run(sender, receiver)
        .await;
}

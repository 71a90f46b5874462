// ============================
// crates/backend-lib/src/ws_router.rs
// ============================
//! HTTP router and WebSocket connection handling.
use crate::broadcast::Delivery;
use crate::websocket::LiveSession;
use crate::{auth, proxy, AppState};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use codemeet_common::ClientEvent;
use futures_util::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/signup", post(auth::routes::signup))
        .route("/login", post(auth::routes::login))
        .route("/api/dashboard/totalusers", get(proxy::total_users))
        .route("/health", get(proxy::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handler for WebSocket connections
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    counter!(crate::metrics::WS_CONNECTION).increment(1);
    gauge!(crate::metrics::WS_ACTIVE).increment(1.0);

    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut tx, mut rx) = socket.split();
    let conn_id = Uuid::new_v4();
    info!(conn_id = %conn_id, "user connected");

    // Outbound channel for this connection; the router fans events in.
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<Delivery>();
    state.router.register(conn_id, client_tx);

    // Writer task: serialize queued events onto the socket. A `Close`
    // delivery (forced disconnect) ends the socket from our side.
    let send_task = tokio::spawn(async move {
        while let Some(delivery) = client_rx.recv().await {
            match delivery {
                Delivery::Event(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(error = %e, "failed to serialize server event");
                            continue;
                        },
                    };
                    if tx.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                },
                Delivery::Close => {
                    let _ = tx.send(Message::Close(None)).await;
                    break;
                },
            }
        }
    });

    // Main loop: each inbound event runs to completion before the next
    // one is read. A malformed or failing event never tears down the
    // connection.
    let mut session = LiveSession::new(state.clone(), conn_id);
    while let Some(Ok(message)) = rx.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => session.handle_event(event).await,
                Err(e) => {
                    warn!(conn_id = %conn_id, error = %e, "malformed client event");
                },
            },
            Message::Close(_) => break,
            _ => {},
        }
    }

    session.disconnect();
    state.router.unregister(&conn_id);
    gauge!(crate::metrics::WS_ACTIVE).decrement(1.0);
    send_task.abort();
}

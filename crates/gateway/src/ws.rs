use {
    axum::{
        extract::{
            State, WebSocketUpgrade,
            ws::{Message, WebSocket},
        },
        response::Response,
    },
    courier_session::LifecycleEvent,
    futures::{SinkExt, StreamExt},
    tokio::sync::broadcast::{self, error::RecvError},
    tracing::{debug, info, warn},
};

use crate::server::AppState;

pub async fn ws_upgrade_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let events = state.gateway.events.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, events))
}

/// Push every lifecycle event to the client as a JSON text frame until
/// either side goes away. Client frames other than close are ignored.
async fn stream_events(socket: WebSocket, mut events: broadcast::Receiver<LifecycleEvent>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "ws: event stream opened");
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let frame = match serde_json::to_string(&event) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(conn_id = %conn_id, error = %e, "ws: failed to serialize event");
                            continue;
                        },
                    };
                    if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                        debug!(conn_id = %conn_id, "ws: write failed");
                        break;
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(conn_id = %conn_id, skipped, "ws: client lagging, events dropped");
                },
                Err(RecvError::Closed) => break,
            },
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    debug!(conn_id = %conn_id, error = %e, "ws: read error");
                    break;
                },
            },
        }
    }

    info!(conn_id = %conn_id, "ws: event stream closed");
}


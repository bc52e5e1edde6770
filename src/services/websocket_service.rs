//! Lifecycle of an individual region WebSocket connection.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        validation::validate_region_id,
        ws::{ClientMessage, ServerMessage},
    },
    services::registry,
    state::{SharedState, SocketConnection},
};

/// Handle the full lifecycle of one region-subscriber connection.
///
/// Registers the connection in the durable registry on upgrade, serves
/// subscribe messages until the peer goes away and cleans both the socket
/// table and the registry up on exit.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let connection_id = Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    if let Err(err) = registry::register(&state, &connection_id).await {
        warn!(connection_id, error = %err, "failed to register connection, closing");
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    }

    state.sockets().insert(
        connection_id.clone(),
        SocketConnection {
            id: connection_id.clone(),
            tx: outbound_tx.clone(),
        },
    );
    info!(connection_id, "websocket connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_text_frame(&state, &connection_id, &outbound_tx, text.as_str()).await;
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(connection_id, "websocket closed by peer");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    state.sockets().remove(&connection_id);
    if let Err(err) = registry::unregister(&state, &connection_id).await {
        warn!(connection_id, error = %err, "failed to unregister connection");
    }
    info!(connection_id, "websocket disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Parse one text frame and apply the requested action.
async fn handle_text_frame(
    state: &SharedState,
    connection_id: &str,
    outbound_tx: &mpsc::UnboundedSender<Message>,
    text: &str,
) {
    match ClientMessage::from_json_str(text) {
        Ok(ClientMessage::SubscribeRegion { region_id }) => {
            if let Err(err) = validate_region_id(&region_id) {
                warn!(connection_id, region_id, error = %err, "rejected region id");
                send_server_message(
                    outbound_tx,
                    &ServerMessage::Error {
                        message: format!("invalid region id `{region_id}`"),
                    },
                );
                return;
            }
            match registry::subscribe(state, connection_id, &region_id).await {
                Ok(()) => {
                    send_server_message(outbound_tx, &ServerMessage::Subscribed { region_id });
                }
                Err(err) => {
                    warn!(connection_id, error = %err, "subscription failed");
                    send_server_message(
                        outbound_tx,
                        &ServerMessage::Error {
                            message: "subscription failed, try again later".to_string(),
                        },
                    );
                }
            }
        }
        Ok(ClientMessage::Unknown) => {
            warn!(connection_id, payload = %text, "ignoring unknown action");
            send_server_message(
                outbound_tx,
                &ServerMessage::Error {
                    message: "unknown action".to_string(),
                },
            );
        }
        Err(err) => {
            warn!(connection_id, error = %err, "failed to parse client message");
            send_server_message(
                outbound_tx,
                &ServerMessage::Error {
                    message: "malformed message".to_string(),
                },
            );
        }
    }
}

/// Serialize and queue a direct server message, dropping it if the writer is
/// gone.
fn send_server_message(tx: &mpsc::UnboundedSender<Message>, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(payload) => {
            let _ = tx.send(Message::Text(payload.into()));
        }
        Err(err) => warn!(error = %err, "failed to serialize server message"),
    }
}

/// Ensure the writer task winds down before we return from the socket
/// handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

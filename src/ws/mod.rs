pub mod handlers;
mod host;
mod player;
mod spectator;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::{ConnectionId, ConnectionRole, SessionCode};

/// One socket's view of the world: who it is and what it listens to
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub role: ConnectionRole,
    pub subscription: Option<broadcast::Receiver<ServerMessage>>,
}

impl Connection {
    pub fn new() -> Self {
        Self::with_id(ulid::Ulid::new().to_string())
    }

    pub fn with_id(id: impl Into<ConnectionId>) -> Self {
        Self {
            id: id.into(),
            role: ConnectionRole::Unassigned,
            subscription: None,
        }
    }

    pub fn attach(
        &mut self,
        role: ConnectionRole,
        subscription: broadcast::Receiver<ServerMessage>,
    ) {
        self.role = role;
        self.subscription = Some(subscription);
    }

    /// Forget the current session; queued broadcasts are dropped with the receiver
    pub fn reset(&mut self) {
        self.role = ConnectionRole::Unassigned;
        self.subscription = None;
    }

    /// Messages that end this connection's membership in `code`
    fn release_if_ended(&mut self, msg: &ServerMessage) {
        let ended = match msg {
            ServerMessage::Kicked { code }
            | ServerMessage::Superseded { code }
            | ServerMessage::SessionEnded { code } => Some(*code),
            _ => None,
        };
        if let Some(code) = ended {
            if self.role.session_code() == Some(code) {
                self.reset();
            }
        }
    }

    pub fn session_code(&self) -> Option<SessionCode> {
        self.role.session_code()
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

enum Event {
    Broadcast(Result<ServerMessage, RecvError>),
    Direct(Option<ServerMessage>),
    Inbound(Option<Result<Message, axum::Error>>),
}

type Sender = SplitSink<WebSocket, Message>;

async fn send(sender: &mut Sender, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize message: {}", e);
            true
        }
    }
}

/// After a lag, keep only the newest snapshot but every other message
fn drain_to_latest(rx: &mut broadcast::Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut pending = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(ServerMessage::Snapshot { snapshot }) => {
                pending.retain(|m| !matches!(m, ServerMessage::Snapshot { .. }));
                pending.push(ServerMessage::Snapshot { snapshot });
            }
            Ok(other) => pending.push(other),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    pending
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut conn = Connection::new();
    let mut outbox = state.register_connection(&conn.id).await;

    tracing::info!("WebSocket connected: {}", conn.id);

    loop {
        let event = tokio::select! {
            msg = async {
                match conn.subscription.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            } => Event::Broadcast(msg),
            msg = outbox.recv() => Event::Direct(msg),
            msg = receiver.next() => Event::Inbound(msg),
        };

        match event {
            Event::Broadcast(Ok(msg)) | Event::Direct(Some(msg)) => {
                conn.release_if_ended(&msg);
                if !send(&mut sender, &msg).await {
                    break;
                }
            }
            Event::Broadcast(Err(RecvError::Lagged(skipped))) => {
                tracing::debug!("Connection {} lagged by {} message(s)", conn.id, skipped);
                let pending = match conn.subscription.as_mut() {
                    Some(rx) => drain_to_latest(rx),
                    None => Vec::new(),
                };
                let mut open = true;
                for msg in pending {
                    conn.release_if_ended(&msg);
                    if !send(&mut sender, &msg).await {
                        open = false;
                        break;
                    }
                }
                if !open {
                    break;
                }
            }
            Event::Broadcast(Err(RecvError::Closed)) => {
                conn.subscription = None;
            }
            Event::Direct(None) => break,
            Event::Inbound(Some(Ok(Message::Text(text)))) => {
                tracing::debug!("Received message on {}: {}", conn.id, text.as_str());

                let response = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => handlers::handle_message(client_msg, &mut conn, &state).await,
                    Err(e) => {
                        tracing::warn!("Failed to parse client message: {}", e);
                        Some(ServerMessage::Error {
                            code: "PARSE_ERROR".to_string(),
                            msg: format!("Invalid message format: {}", e),
                            hint: None,
                        })
                    }
                };

                if let Some(response) = response {
                    if !send(&mut sender, &response).await {
                        tracing::error!("Failed to send response on {}", conn.id);
                        break;
                    }
                }
            }
            Event::Inbound(Some(Ok(Message::Close(_)))) => {
                tracing::info!("WebSocket closed by client: {}", conn.id);
                break;
            }
            Event::Inbound(Some(Ok(Message::Ping(data)))) => {
                if sender.send(Message::Pong(data)).await.is_err() {
                    break;
                }
            }
            Event::Inbound(Some(Ok(_))) => {}
            Event::Inbound(Some(Err(e))) => {
                tracing::error!("WebSocket error on {}: {}", conn.id, e);
                break;
            }
            Event::Inbound(None) => break,
        }
    }

    state.disconnect(&conn.role, &conn.id).await;
    state.unregister_connection(&conn.id).await;
    tracing::info!("WebSocket connection closed: {} ({:?})", conn.id, conn.role);
}

//! Display connections: subscribed to a session, never on its roster

use super::handlers::detach;
use super::Connection;
use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::ConnectionRole;
use std::sync::Arc;

pub async fn handle_watch(
    state: &Arc<AppState>,
    conn: &mut Connection,
    code: String,
) -> Option<ServerMessage> {
    detach(conn, state, Some(&code)).await;

    match state.watch(&code).await {
        Ok(attached) => {
            tracing::info!("Connection {} watching {}", conn.id, attached.code);
            conn.attach(
                ConnectionRole::Spectator {
                    code: attached.code,
                },
                attached.subscription,
            );
            Some(ServerMessage::Watching {
                snapshot: attached.snapshot,
            })
        }
        Err(e) => Some(ServerMessage::from_error(&e, false)),
    }
}

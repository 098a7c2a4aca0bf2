//! Participant message handlers
//!
//! Joining (or resuming) a seat, answering, leaving and questions to the host.

use super::handlers::{detach, participant_of};
use super::Connection;
use crate::protocol::{AskHostRejection, ServerMessage};
use crate::state::AppState;
use crate::types::{ConnectionRole, ParticipantId};
use std::sync::Arc;

pub async fn handle_join(
    state: &Arc<AppState>,
    conn: &mut Connection,
    code: String,
    name: String,
    participant_id: Option<ParticipantId>,
) -> Option<ServerMessage> {
    tracing::info!("Join request for {} as {}", code, name);
    detach(conn, state, Some(&code)).await;

    match state
        .join(&code, &name, participant_id.as_deref(), &conn.id)
        .await
    {
        Ok(attached) => {
            let role = match (&attached.participant_id, attached.is_host) {
                (Some(id), false) => ConnectionRole::Player {
                    code: attached.code,
                    participant_id: id.clone(),
                },
                _ => ConnectionRole::Host {
                    code: attached.code,
                },
            };
            conn.attach(role, attached.subscription);
            Some(ServerMessage::Joined {
                participant_id: attached.participant_id,
                is_host: attached.is_host,
                resumed: attached.resumed,
                snapshot: attached.snapshot,
            })
        }
        Err(e) => {
            tracing::warn!("Join to {} rejected: {}", code, e);
            Some(ServerMessage::from_error(&e, false))
        }
    }
}

pub async fn handle_submit_answer(
    state: &Arc<AppState>,
    conn: &mut Connection,
    code: String,
    text: String,
) -> Option<ServerMessage> {
    let participant_id = match participant_of(conn, state, &code, "answer without a seat").await {
        Ok(id) => id,
        Err(e) => return Some(ServerMessage::from_error(&e, false)),
    };

    match state.submit_answer(&code, &participant_id, &text).await {
        Ok(receipt) => Some(ServerMessage::AnswerAccepted {
            prompt_index: receipt.prompt_index,
        }),
        Err(e) => Some(ServerMessage::from_error(&e, false)),
    }
}

pub async fn handle_ask_host(
    state: &Arc<AppState>,
    conn: &mut Connection,
    code: String,
    text: String,
    freeform: bool,
) -> Option<ServerMessage> {
    let result = match participant_of(conn, state, &code, "ask without a seat").await {
        Ok(participant_id) => {
            state
                .ask_host(&code, &participant_id, &text, freeform)
                .await
        }
        Err(_) => Err(AskHostRejection::NotInGame),
    };

    Some(match result {
        Ok(()) => ServerMessage::AskHostAck {
            ok: true,
            reason: None,
        },
        Err(reason) => {
            tracing::debug!("Question in {} not delivered: {:?}", code, reason);
            ServerMessage::AskHostAck {
                ok: false,
                reason: Some(reason),
            }
        }
    })
}

pub async fn handle_leave(
    state: &Arc<AppState>,
    conn: &mut Connection,
    code: String,
) -> Option<ServerMessage> {
    let participant_id = match participant_of(conn, state, &code, "leave without a seat").await {
        Ok(id) => id,
        Err(e) => return Some(ServerMessage::from_error(&e, false)),
    };

    match state.leave(&code, &participant_id).await {
        Ok(code) => {
            conn.reset();
            Some(ServerMessage::Left { code })
        }
        Err(e) => Some(ServerMessage::from_error(&e, false)),
    }
}

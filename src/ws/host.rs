//! Host command handlers
//!
//! Except for session creation, all handlers here require the host seat.
//! Authorization is checked in the dispatch layer before calling these.
//! Most commands answer through the session broadcast and return nothing.

use super::handlers::detach;
use super::Connection;
use crate::protocol::ServerMessage;
use crate::state::{Advance, AppState};
use crate::types::{Categorization, ConnectionRole, ParticipantId, Prompt};
use std::sync::Arc;

pub async fn handle_create_session(
    state: &Arc<AppState>,
    conn: &mut Connection,
    host_name: String,
) -> Option<ServerMessage> {
    tracing::info!("Session requested by {}", host_name);
    detach(conn, state, None).await;

    match state.create_session(&host_name, &conn.id).await {
        Ok(attached) => {
            conn.attach(
                ConnectionRole::Host {
                    code: attached.code,
                },
                attached.subscription,
            );
            Some(ServerMessage::SessionCreated {
                code: attached.code,
                snapshot: attached.snapshot,
            })
        }
        Err(e) => Some(ServerMessage::from_error(&e, false)),
    }
}

pub async fn handle_start(state: &Arc<AppState>, code: String) -> Option<ServerMessage> {
    tracing::info!("Host starting session {}", code);
    match state.start(&code).await {
        Ok(()) => None,
        Err(e) => Some(ServerMessage::from_error(&e, true)),
    }
}

pub async fn handle_end_prompt(state: &Arc<AppState>, code: String) -> Option<ServerMessage> {
    tracing::info!("Host ending prompt early in {}", code);
    match state.end_prompt_early(&code).await {
        Ok(true) => None,
        Ok(false) => {
            tracing::debug!("Prompt in {} was already closed", code);
            None
        }
        Err(e) => Some(ServerMessage::from_error(&e, true)),
    }
}

pub async fn handle_apply_grading(
    state: &Arc<AppState>,
    code: String,
    categorization: Categorization,
) -> Option<ServerMessage> {
    tracing::info!(
        "Host grading {}: {} bucket(s), {} wrong",
        code,
        categorization.buckets.len(),
        categorization.wrong.len()
    );
    match state.apply_grading(&code, categorization).await {
        Ok(groups) => Some(ServerMessage::GradingApplied { groups }),
        Err(e) => Some(ServerMessage::from_error(&e, true)),
    }
}

pub async fn handle_advance(state: &Arc<AppState>, code: String) -> Option<ServerMessage> {
    match state.advance(&code).await {
        Ok(Advance::NextPrompt) => None,
        Ok(Advance::Finished) => {
            tracing::info!("Session {} finished", code);
            None
        }
        Err(e) => Some(ServerMessage::from_error(&e, true)),
    }
}

/// The host's own connection gets the end notice directly and is released
pub async fn handle_end_session(
    state: &Arc<AppState>,
    conn: &mut Connection,
    code: String,
) -> Option<ServerMessage> {
    tracing::info!("Host ending session {}", code);
    match state.end_session(&code).await {
        Ok(()) => {
            let ended = conn.session_code();
            conn.reset();
            ended.map(|code| ServerMessage::SessionEnded { code })
        }
        Err(e) => Some(ServerMessage::from_error(&e, true)),
    }
}

pub async fn handle_update_settings(
    state: &Arc<AppState>,
    code: String,
    timer_seconds: Option<u32>,
    max_players: Option<u32>,
    round_size: Option<u32>,
) -> Option<ServerMessage> {
    match state
        .update_settings(&code, timer_seconds, max_players, round_size)
        .await
    {
        Ok(_) => None,
        Err(e) => Some(ServerMessage::from_error(&e, true)),
    }
}

pub async fn handle_kick(
    state: &Arc<AppState>,
    code: String,
    participant_id: ParticipantId,
) -> Option<ServerMessage> {
    match state.kick(&code, &participant_id).await {
        Ok(()) => None,
        Err(e) => Some(ServerMessage::from_error(&e, true)),
    }
}

pub async fn handle_reply(
    state: &Arc<AppState>,
    code: String,
    participant_id: ParticipantId,
    text: String,
) -> Option<ServerMessage> {
    match state.host_reply(&code, &participant_id, &text).await {
        Ok(()) => Some(ServerMessage::HostReplyAck { participant_id }),
        Err(e) => Some(ServerMessage::from_error(&e, true)),
    }
}

pub async fn handle_load_prompts(
    state: &Arc<AppState>,
    code: String,
    prompts: Vec<Prompt>,
) -> Option<ServerMessage> {
    match state.load_prompts(&code, prompts).await {
        Ok(count) => Some(ServerMessage::PromptsLoaded { count }),
        Err(e) => Some(ServerMessage::from_error(&e, true)),
    }
}

pub async fn handle_request_edit(
    state: &Arc<AppState>,
    code: String,
    participant_id: ParticipantId,
    reason: Option<String>,
) -> Option<ServerMessage> {
    match state
        .request_edit(&code, &participant_id, reason.as_deref())
        .await
    {
        Ok(()) => None,
        Err(e) => Some(ServerMessage::from_error(&e, true)),
    }
}

//! WebSocket message dispatch
//!
//! Every inbound message lands here. Host-only commands are authorized against
//! the connection's role before dispatch to the role-specific handler modules.

use crate::error::{SessionError, SessionResult};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::{ConnectionRole, ParticipantId, SessionCode};
use std::sync::Arc;

use super::{host, player, spectator, Connection};

/// Check that this connection holds the host seat of `code`; NotFound wins over Forbidden
macro_rules! check_host {
    ($conn:expr, $state:expr, $code:expr, $action:expr) => {
        if let Err(err) = authorize_host($conn, $state, $code, $action).await {
            tracing::warn!("Rejected {} on {}: {}", $action, $code, err);
            return Some(ServerMessage::from_error(&err, false));
        }
    };
}

/// Drop double-taps of transitions that must not run twice
macro_rules! suppress_repeat {
    ($conn:expr, $state:expr, $code:expr, $op:expr) => {
        if !$state.deduper.check(&$conn.id, $code, $op).await {
            tracing::debug!("Suppressed repeated {} on {} from {}", $op, $code, $conn.id);
            return None;
        }
    };
}

/// A rejected attempt does not count toward the repeat window
async fn settle(
    conn_id: &str,
    state: &AppState,
    code: &str,
    op: &str,
    response: Option<ServerMessage>,
) -> Option<ServerMessage> {
    if matches!(response, Some(ServerMessage::Error { .. })) {
        state.deduper.forget(conn_id, code, op).await;
    }
    response
}

async fn authorize_host(
    conn: &Connection,
    state: &AppState,
    code: &str,
    action: &str,
) -> SessionResult<()> {
    let shared = state.session(code).await?;
    let session = shared.lock().await;
    if session.closed {
        return Err(SessionError::NotFound);
    }
    match conn.role {
        ConnectionRole::Host { code } if code == session.code => {}
        _ => return Err(SessionError::Forbidden(action.to_string())),
    }
    if !session.is_host_connection(&conn.id) {
        return Err(SessionError::Forbidden(action.to_string()));
    }
    Ok(())
}

/// The seat this connection holds in `code`
///
/// The seat must still be bound to this connection; a resume elsewhere
/// leaves the old socket with nothing to act on.
pub(super) async fn participant_of(
    conn: &Connection,
    state: &AppState,
    code: &str,
    action: &str,
) -> SessionResult<ParticipantId> {
    let shared = state.session(code).await?;
    let session = shared.lock().await;
    if session.closed {
        return Err(SessionError::NotFound);
    }
    match &conn.role {
        ConnectionRole::Player {
            code: joined,
            participant_id,
        } if *joined == session.code
            && session
                .roster
                .get(participant_id)
                .is_some_and(|p| p.is_bound_to(&conn.id)) =>
        {
            Ok(participant_id.clone())
        }
        _ => Err(SessionError::Forbidden(action.to_string())),
    }
}

/// Leave whatever session this connection was attached to before a new attach
///
/// Re-attaching to the same session keeps the current role until the new
/// attach succeeds.
pub(super) async fn detach(conn: &mut Connection, state: &Arc<AppState>, next: Option<&str>) {
    let Some(current) = conn.session_code() else {
        return;
    };
    let same_session = next
        .and_then(|code| code.parse::<SessionCode>().ok())
        .is_some_and(|code| code == current);
    if same_session {
        return;
    }
    state.disconnect(&conn.role, &conn.id).await;
    conn.reset();
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    conn: &mut Connection,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    let op = msg.op_name();
    tracing::debug!("{} from {} ({:?})", op, conn.id, conn.role);

    match msg {
        // Membership
        ClientMessage::CreateSession { host_name } => {
            host::handle_create_session(state, conn, host_name).await
        }

        ClientMessage::Join {
            code,
            name,
            participant_id,
        } => player::handle_join(state, conn, code, name, participant_id).await,

        ClientMessage::Watch { code } => spectator::handle_watch(state, conn, code).await,

        ClientMessage::Heartbeat => {
            state.touch(&conn.role, &conn.id).await;
            Some(ServerMessage::HeartbeatAck {
                server_now: chrono::Utc::now().to_rfc3339(),
            })
        }

        // Participant messages
        ClientMessage::SubmitAnswer { code, text } => {
            player::handle_submit_answer(state, conn, code, text).await
        }

        ClientMessage::AskHost {
            code,
            text,
            freeform,
        } => player::handle_ask_host(state, conn, code, text, freeform).await,

        ClientMessage::Leave { code } => player::handle_leave(state, conn, code).await,

        // Host-only commands (authorization checked before dispatch)
        ClientMessage::HostStart { code } => {
            check_host!(conn, state, &code, "start the session");
            suppress_repeat!(conn, state, &code, op);
            let response = host::handle_start(state, code.clone()).await;
            settle(&conn.id, state, &code, op, response).await
        }

        ClientMessage::HostEndPrompt { code } => {
            check_host!(conn, state, &code, "end the prompt");
            suppress_repeat!(conn, state, &code, op);
            let response = host::handle_end_prompt(state, code.clone()).await;
            settle(&conn.id, state, &code, op, response).await
        }

        ClientMessage::HostApplyGrading {
            code,
            categorization,
        } => {
            check_host!(conn, state, &code, "grade answers");
            host::handle_apply_grading(state, code, categorization).await
        }

        ClientMessage::HostAdvance { code } => {
            check_host!(conn, state, &code, "advance the session");
            suppress_repeat!(conn, state, &code, op);
            let response = host::handle_advance(state, code.clone()).await;
            settle(&conn.id, state, &code, op, response).await
        }

        ClientMessage::HostEndSession { code } => {
            check_host!(conn, state, &code, "end the session");
            suppress_repeat!(conn, state, &code, op);
            let response = host::handle_end_session(state, conn, code.clone()).await;
            settle(&conn.id, state, &code, op, response).await
        }

        ClientMessage::HostUpdateSettings {
            code,
            timer_seconds,
            max_players,
            round_size,
        } => {
            check_host!(conn, state, &code, "change settings");
            host::handle_update_settings(state, code, timer_seconds, max_players, round_size)
                .await
        }

        ClientMessage::HostKick {
            code,
            participant_id,
        } => {
            check_host!(conn, state, &code, "remove participants");
            host::handle_kick(state, code, participant_id).await
        }

        ClientMessage::HostReply {
            code,
            participant_id,
            text,
        } => {
            check_host!(conn, state, &code, "reply to participants");
            host::handle_reply(state, code, participant_id, text).await
        }

        ClientMessage::HostLoadPrompts { code, prompts } => {
            check_host!(conn, state, &code, "load prompts");
            host::handle_load_prompts(state, code, prompts).await
        }

        ClientMessage::HostRequestEdit {
            code,
            participant_id,
            reason,
        } => {
            check_host!(conn, state, &code, "request answer edits");
            host::handle_request_edit(state, code, participant_id, reason).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Phase;

    fn error_code(msg: Option<ServerMessage>) -> String {
        match msg {
            Some(ServerMessage::Error { code, .. }) => code,
            other => panic!("Expected Error message, got {:?}", other),
        }
    }

    async fn hosted(state: &Arc<AppState>) -> (Connection, String) {
        let mut host = Connection::with_id("host-conn");
        let result = handle_message(
            ClientMessage::CreateSession {
                host_name: "Quizmaster".to_string(),
            },
            &mut host,
            state,
        )
        .await;
        match result {
            Some(ServerMessage::SessionCreated { code, snapshot }) => {
                assert_eq!(snapshot.phase, Phase::Waiting);
                (host, code.to_string())
            }
            other => panic!("Expected SessionCreated message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_session_makes_connection_host() {
        let state = Arc::new(AppState::new());
        let (host, code) = hosted(&state).await;

        assert!(matches!(host.role, ConnectionRole::Host { .. }));
        assert_eq!(host.session_code().map(|c| c.to_string()), Some(code));
        assert!(host.subscription.is_some());
    }

    #[tokio::test]
    async fn test_unauthorized_host_command() {
        let state = Arc::new(AppState::new());
        let (_host, code) = hosted(&state).await;
        let mut player = Connection::with_id("ada-conn");
        handle_message(
            ClientMessage::Join {
                code: code.clone(),
                name: "Ada".to_string(),
                participant_id: None,
            },
            &mut player,
            &state,
        )
        .await;

        let result = handle_message(ClientMessage::HostStart { code }, &mut player, &state).await;
        assert_eq!(error_code(result), "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_host_command_on_unknown_session() {
        let state = Arc::new(AppState::new());
        let (mut host, code) = hosted(&state).await;
        let other = if code == "9999" { "1000" } else { "9999" };

        let result = handle_message(
            ClientMessage::HostStart {
                code: other.to_string(),
            },
            &mut host,
            &state,
        )
        .await;
        assert_eq!(error_code(result), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_submit_without_seat_is_forbidden() {
        let state = Arc::new(AppState::new());
        let (_host, code) = hosted(&state).await;
        let mut stranger = Connection::with_id("stranger");

        let result = handle_message(
            ClientMessage::SubmitAnswer {
                code,
                text: "blue".to_string(),
            },
            &mut stranger,
            &state,
        )
        .await;
        assert_eq!(error_code(result), "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_repeated_start_is_suppressed() {
        let state = Arc::new(AppState::new());
        let (mut host, code) = hosted(&state).await;
        let mut player = Connection::with_id("ada-conn");
        handle_message(
            ClientMessage::Join {
                code: code.clone(),
                name: "Ada".to_string(),
                participant_id: None,
            },
            &mut player,
            &state,
        )
        .await;

        let first = handle_message(
            ClientMessage::HostStart { code: code.clone() },
            &mut host,
            &state,
        )
        .await;
        assert!(first.is_none());

        // A second tap inside the window is dropped, not reported as InvalidPhase
        let second = handle_message(
            ClientMessage::HostStart { code: code.clone() },
            &mut host,
            &state,
        )
        .await;
        assert!(second.is_none());

        let shared = state.session(&code).await.unwrap();
        assert_eq!(shared.lock().await.prompt_index, 0);
    }

    #[tokio::test]
    async fn test_heartbeat_ack() {
        let state = Arc::new(AppState::new());
        let mut conn = Connection::with_id("idle");

        let result = handle_message(ClientMessage::Heartbeat, &mut conn, &state).await;
        assert!(matches!(result, Some(ServerMessage::HeartbeatAck { .. })));
    }

    #[tokio::test]
    async fn test_end_session_resets_host_connection() {
        let state = Arc::new(AppState::new());
        let (mut host, code) = hosted(&state).await;

        let result = handle_message(
            ClientMessage::HostEndSession { code: code.clone() },
            &mut host,
            &state,
        )
        .await;
        assert!(matches!(result, Some(ServerMessage::SessionEnded { .. })));
        assert_eq!(host.role, ConnectionRole::Unassigned);
        assert_eq!(state.session_count().await, 0);
    }
}

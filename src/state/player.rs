use super::registry::Attached;
use super::roster::{Admission, Participant};
use super::AppState;
use crate::error::{SessionError, SessionResult};
use crate::protocol::{AskHostRejection, ServerMessage};
use crate::types::*;
use std::sync::Arc;
use std::time::Instant;

const MAX_MESSAGE_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerReceipt {
    pub prompt_index: usize,
    /// This answer was the last one outstanding
    pub closed_prompt: bool,
}

impl AppState {
    /// Join a waiting session or resume a known seat
    ///
    /// Only a change in roster composition is broadcast; a plain resume is
    /// answered with the snapshot on the joining connection alone.
    pub async fn join(
        &self,
        code: &str,
        name: &str,
        logical_id: Option<&str>,
        connection: &str,
    ) -> SessionResult<Attached> {
        let mut session = self.lock_session(code).await?;
        let admission = session.admit(
            name,
            logical_id,
            connection,
            Instant::now(),
            self.config.heartbeat_timeout,
        )?;

        let mut superseded = None;
        let (participant_id, is_host, resumed, roster_changed) = match admission {
            Admission::Joined(id) => {
                tracing::info!("Session {}: {} joined", session.code, name.trim());
                (Some(id), false, false, true)
            }
            Admission::Resumed {
                participant_id,
                roster_changed,
                superseded: previous,
            } => {
                tracing::info!("Session {}: {} resumed", session.code, name.trim());
                superseded = previous;
                (Some(participant_id), false, true, roster_changed)
            }
            Admission::Host => {
                tracing::info!("Session {}: host reconnected", session.code);
                (None, true, true, false)
            }
        };

        if roster_changed {
            session.publish();
        }

        let attached = Attached {
            code: session.code,
            participant_id,
            is_host,
            resumed,
            snapshot: session.snapshot(),
            subscription: session.subscribe(),
        };
        drop(session);

        // The replaced socket loses the seat and its subscription
        if let Some(previous) = superseded {
            let code = attached.code;
            self.send_to(&previous, ServerMessage::Superseded { code }).await;
        }
        Ok(attached)
    }

    /// Subscribe a display/spectator connection without taking a roster seat
    pub async fn watch(&self, code: &str) -> SessionResult<Attached> {
        let session = self.lock_session(code).await?;
        Ok(Attached {
            code: session.code,
            participant_id: None,
            is_host: false,
            resumed: false,
            snapshot: session.snapshot(),
            subscription: session.subscribe(),
        })
    }

    pub async fn submit_answer(
        self: &Arc<Self>,
        code: &str,
        participant_id: &str,
        text: &str,
    ) -> SessionResult<AnswerReceipt> {
        let mut session = self.lock_session(code).await?;
        session.submit(participant_id, text)?;
        tracing::debug!(
            "Session {}: answer from {} ({}/{})",
            session.code,
            participant_id,
            session.submissions.len(),
            session.roster.len()
        );

        let prompt_index = session.prompt_index;
        let closed_prompt = session.all_answered() && session.close_prompt();
        if closed_prompt {
            self.after_prompt_closed(&session);
        }
        session.publish();
        Ok(AnswerReceipt {
            prompt_index,
            closed_prompt,
        })
    }

    /// Drop a seat now; an open prompt may complete without it
    ///
    /// Removing the last seat disposes the session.
    async fn remove_seat(
        self: &Arc<Self>,
        code: &str,
        participant_id: &str,
    ) -> SessionResult<(SessionCode, Participant)> {
        let mut session = self.lock_session(code).await?;
        let removed = session
            .remove_participant(participant_id)
            .ok_or_else(|| SessionError::InvalidRequest("Unknown participant".to_string()))?;
        let code = session.code;

        if session.roster.is_empty() {
            // Nobody can slip in between here and disposal
            session.closed = true;
            drop(session);
            tracing::info!("Session {}: last participant gone", code);
            self.dispose(code).await;
            return Ok((code, removed));
        }

        if session.phase == Phase::Playing && session.all_answered() && session.close_prompt() {
            self.after_prompt_closed(&session);
        }
        session.publish();
        Ok((code, removed))
    }

    pub async fn leave(
        self: &Arc<Self>,
        code: &str,
        participant_id: &str,
    ) -> SessionResult<SessionCode> {
        let (code, removed) = self.remove_seat(code, participant_id).await?;
        tracing::info!("Session {}: {} left", code, removed.name);
        Ok(code)
    }

    pub async fn kick(self: &Arc<Self>, code: &str, participant_id: &str) -> SessionResult<()> {
        let (code, removed) = self.remove_seat(code, participant_id).await?;
        tracing::info!("Session {}: host removed {}", code, removed.name);
        if let Some(connection) = removed.connection {
            self.send_to(&connection, ServerMessage::Kicked { code }).await;
        }
        Ok(())
    }

    /// Forward a participant's question to the host's connection
    pub async fn ask_host(
        &self,
        code: &str,
        participant_id: &str,
        text: &str,
        freeform: bool,
    ) -> Result<(), AskHostRejection> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AskHostRejection::Empty);
        }
        if text.chars().count() > MAX_MESSAGE_CHARS {
            return Err(AskHostRejection::BadPayload);
        }

        let (host_connection, msg) = {
            let session = self
                .lock_session(code)
                .await
                .map_err(|_| AskHostRejection::NotInGame)?;
            let participant = session
                .roster
                .get(participant_id)
                .ok_or(AskHostRejection::NotInGame)?;
            let host_connection = session
                .host
                .connection
                .clone()
                .ok_or(AskHostRejection::NoHost)?;
            let msg = ServerMessage::HostQuestion {
                from_id: participant.id.clone(),
                from_name: participant.name.clone(),
                text: text.to_string(),
                freeform,
                sent_at: chrono::Utc::now().to_rfc3339(),
            };
            (host_connection, msg)
        };

        if self.send_to(&host_connection, msg).await {
            tracing::info!(
                "Session {}: question from {} delivered to host",
                code,
                participant_id
            );
            Ok(())
        } else {
            Err(AskHostRejection::NoHost)
        }
    }

    /// Deliver a host reply to one participant
    pub async fn host_reply(
        &self,
        code: &str,
        participant_id: &str,
        text: &str,
    ) -> SessionResult<()> {
        let text = text.trim();
        if text.is_empty() || text.chars().count() > MAX_MESSAGE_CHARS {
            return Err(SessionError::InvalidRequest(format!(
                "Reply must be 1-{} characters",
                MAX_MESSAGE_CHARS
            )));
        }

        let connection = {
            let session = self.lock_session(code).await?;
            let participant = session
                .roster
                .get(participant_id)
                .ok_or_else(|| SessionError::InvalidRequest("Unknown participant".to_string()))?;
            participant.connection.clone()
        };

        let msg = ServerMessage::HostReply {
            text: text.to_string(),
            sent_at: chrono::Utc::now().to_rfc3339(),
        };
        match connection {
            Some(connection) if self.send_to(&connection, msg).await => Ok(()),
            _ => Err(SessionError::InvalidRequest(
                "Participant is not connected".to_string(),
            )),
        }
    }

    /// Record liveness for whatever seat this connection holds
    pub async fn touch(&self, role: &ConnectionRole, connection: &str) {
        let Some(code) = role.session_code() else {
            return;
        };
        let Some(shared) = self.session_by_code(code).await else {
            return;
        };
        let mut session = shared.lock().await;
        let now = Instant::now();
        match role {
            ConnectionRole::Host { .. } if session.is_host_connection(connection) => {
                session.host.last_seen = now;
            }
            ConnectionRole::Player { participant_id, .. } => {
                if let Some(p) = session.roster.get_mut(participant_id) {
                    if p.connection.as_deref() == Some(connection) {
                        p.last_seen = now;
                    }
                }
            }
            _ => {}
        }
    }

    /// Transport closed: keep the seat for the grace period
    ///
    /// A dropped participant no longer counts toward "everyone answered", so
    /// this may close the open prompt.
    pub async fn disconnect(self: &Arc<Self>, role: &ConnectionRole, connection: &str) {
        let Some(code) = role.session_code() else {
            return;
        };
        let Some(shared) = self.session_by_code(code).await else {
            return;
        };
        let mut session = shared.lock().await;
        if session.closed {
            return;
        }
        let now = Instant::now();

        match role {
            ConnectionRole::Host { .. } => {
                if session.is_host_connection(connection) {
                    session.host.connection = None;
                    session.host.disconnected_at = Some(now);
                    tracing::info!("Session {}: host disconnected", code);
                }
            }
            ConnectionRole::Player { participant_id, .. } => {
                if session.roster.disconnect(participant_id, connection, now) {
                    tracing::info!("Session {}: {} disconnected", code, participant_id);
                    if session.phase == Phase::Playing
                        && session.all_answered()
                        && session.close_prompt()
                    {
                        self.after_prompt_closed(&session);
                        session.publish();
                    }
                }
            }
            ConnectionRole::Spectator { .. } | ConnectionRole::Unassigned => {}
        }
    }
}

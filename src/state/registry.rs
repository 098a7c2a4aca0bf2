use super::roster::validate_name;
use super::{AppState, Session, SharedSession};
use crate::error::{SessionError, SessionResult};
use crate::protocol::{ServerMessage, SessionSnapshot};
use crate::types::*;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};

/// Number of distinct four-digit codes
const CODE_SPACE: usize = (SessionCode::MAX - SessionCode::MIN + 1) as usize;

/// A connection's new association with a session
#[derive(Debug)]
pub struct Attached {
    pub code: SessionCode,
    pub participant_id: Option<ParticipantId>,
    pub is_host: bool,
    pub resumed: bool,
    pub snapshot: SessionSnapshot,
    pub subscription: broadcast::Receiver<ServerMessage>,
}

impl AppState {
    /// Allocate a session with a fresh, non-colliding code; the creator becomes host
    pub async fn create_session(
        &self,
        host_name: &str,
        host_connection: &str,
    ) -> SessionResult<Attached> {
        let host_name = validate_name(host_name)?;
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= CODE_SPACE {
            return Err(SessionError::InvalidRequest(
                "No free session codes".to_string(),
            ));
        }

        let code = loop {
            let code = SessionCode::random();
            if !sessions.contains_key(&code) {
                break code;
            }
        };

        let session = Session::new(
            code,
            host_name.clone(),
            host_connection,
            self.config.default_settings,
            Instant::now(),
        );
        let attached = Attached {
            code,
            participant_id: None,
            is_host: true,
            resumed: false,
            snapshot: session.snapshot(),
            subscription: session.subscribe(),
        };
        sessions.insert(code, Arc::new(Mutex::new(session)));

        tracing::info!("Session {} created by host {}", code, host_name);
        Ok(attached)
    }

    /// Look up a live session by its wire code
    pub async fn session(&self, code: &str) -> SessionResult<SharedSession> {
        let code: SessionCode = code.parse().map_err(|_| SessionError::NotFound)?;
        self.session_by_code(code)
            .await
            .ok_or(SessionError::NotFound)
    }

    /// Lock a session for one operation; a disposed session reads as NotFound
    pub(super) async fn lock_session(&self, code: &str) -> SessionResult<OwnedMutexGuard<Session>> {
        let session = self.session(code).await?.lock_owned().await;
        if session.closed {
            return Err(SessionError::NotFound);
        }
        Ok(session)
    }

    pub async fn session_by_code(&self, code: SessionCode) -> Option<SharedSession> {
        self.sessions.read().await.get(&code).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Remove a session, stop its timer and tell every channel member
    ///
    /// The code is free for reuse as soon as this returns. Operations that
    /// already hold the session see `closed` and fail with NotFound.
    pub async fn dispose(&self, code: SessionCode) -> bool {
        let Some(shared) = self.sessions.write().await.remove(&code) else {
            return false;
        };

        let mut session = shared.lock().await;
        session.end();
        session.publish();
        session.announce(ServerMessage::SessionEnded { code });
        tracing::info!("Session {} disposed", code);
        true
    }

    /// Expire dropped seats and dispose sessions that are empty or abandoned
    ///
    /// A session whose last seat expires is disposed even if the host is still
    /// connected. One that nobody has been connected to for the grace period
    /// goes too. Returns the number of sessions disposed.
    pub async fn reap(&self, now: Instant) -> usize {
        let sessions: Vec<(SessionCode, SharedSession)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(code, shared)| (*code, shared.clone()))
            .collect();
        let grace = self.config.disconnect_grace;

        let mut abandoned = Vec::new();
        for (code, shared) in sessions {
            let mut session = shared.lock().await;
            if session.closed {
                continue;
            }
            let expired = session.roster.expire(now, grace);
            if !expired.is_empty() {
                tracing::info!(
                    "Session {}: removed {} participant(s) after disconnect grace",
                    code,
                    expired.len()
                );
                if session.roster.is_empty() {
                    session.closed = true;
                    abandoned.push(code);
                    continue;
                }
                session.publish();
            }
            if session
                .abandoned_since()
                .is_some_and(|since| now.duration_since(since) >= grace)
            {
                abandoned.push(code);
            }
        }

        let mut disposed = 0;
        for code in abandoned {
            if self.dispose(code).await {
                disposed += 1;
            }
        }
        self.deduper.cleanup().await;
        disposed
    }
}

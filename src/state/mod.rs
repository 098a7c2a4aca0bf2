mod game;
mod grading;
mod player;
mod registry;
pub mod roster;
pub mod session;
pub mod timer;

use crate::config::ServerConfig;
use crate::dedup::OpDeduper;
use crate::protocol::ServerMessage;
use crate::questions::QuestionRepository;
use crate::semantic::SemanticMatcher;
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};

pub use player::AnswerReceipt;
pub use registry::Attached;
pub use session::{Advance, Session};
pub use timer::TickOutcome;

/// A session behind its own lock; operations on different sessions never contend
pub type SharedSession = Arc<Mutex<Session>>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Session registry: code -> live session
    pub sessions: Arc<RwLock<HashMap<SessionCode, SharedSession>>>,
    /// Direct (unicast) outbox per open connection
    pub connections: Arc<RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerMessage>>>>,
    pub config: Arc<ServerConfig>,
    pub questions: Option<Arc<dyn QuestionRepository>>,
    pub semantic: Option<Arc<dyn SemanticMatcher>>,
    pub deduper: OpDeduper,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let deduper = OpDeduper::new(config.dedup_window);
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            connections: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
            questions: None,
            semantic: None,
            deduper,
        }
    }

    pub fn with_question_repository(mut self, repository: Arc<dyn QuestionRepository>) -> Self {
        self.questions = Some(repository);
        self
    }

    pub fn with_semantic_matcher(mut self, matcher: Arc<dyn SemanticMatcher>) -> Self {
        self.semantic = Some(matcher);
        self
    }

    /// Register a connection's unicast outbox
    pub async fn register_connection(
        &self,
        connection: &str,
    ) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections
            .write()
            .await
            .insert(connection.to_string(), tx);
        rx
    }

    pub async fn unregister_connection(&self, connection: &str) {
        self.connections.write().await.remove(connection);
    }

    /// Deliver a message to one connection; false if it is gone
    pub async fn send_to(&self, connection: &str, msg: ServerMessage) -> bool {
        match self.connections.read().await.get(connection) {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::types::Phase;

    async fn session_with_players(
        state: &Arc<AppState>,
        names: &[&str],
    ) -> (SessionCode, Vec<ParticipantId>) {
        let code = state.create_session("Host", "host-conn").await.unwrap().code;
        let mut ids = Vec::new();
        for name in names {
            let joined = state
                .join(&code.to_string(), name, None, &format!("conn-{}", name))
                .await
                .unwrap();
            ids.push(joined.participant_id.unwrap());
        }
        (code, ids)
    }

    #[tokio::test]
    async fn test_create_and_lookup_session() {
        let state = Arc::new(AppState::new());
        let code = state.create_session("Host", "host-conn").await.unwrap().code;

        assert!(state.session(&code.to_string()).await.is_ok());
        assert_eq!(state.session_count().await, 1);
        assert_eq!(
            state.session("0000").await.err(),
            Some(SessionError::NotFound)
        );
        assert_eq!(state.session("abcd").await.err(), Some(SessionError::NotFound));
    }

    #[tokio::test]
    async fn test_codes_do_not_collide() {
        let state = Arc::new(AppState::new());
        let mut codes = std::collections::HashSet::new();
        for i in 0..200 {
            let code = state
                .create_session("Host", &format!("host-{}", i))
                .await
                .unwrap()
                .code;
            assert!(codes.insert(code));
        }
    }

    #[tokio::test]
    async fn test_start_uses_fallback_prompts() {
        let state = Arc::new(AppState::new());
        let (code, _) = session_with_players(&state, &["Ada"]).await;

        state.start(&code.to_string()).await.unwrap();

        let shared = state.session(&code.to_string()).await.unwrap();
        let session = shared.lock().await;
        assert_eq!(session.phase, Phase::Playing);
        assert_eq!(session.prompts.len(), 5);
        assert!(session.timer.is_running());
    }

    #[tokio::test]
    async fn test_start_after_end_fails_harmlessly() {
        let state = Arc::new(AppState::new());
        let (code, _) = session_with_players(&state, &["Ada"]).await;
        state.end_session(&code.to_string()).await.unwrap();

        assert_eq!(
            state.start(&code.to_string()).await,
            Err(SessionError::NotFound)
        );
        assert_eq!(state.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_end_prompt_twice_is_noop() {
        let state = Arc::new(AppState::new());
        let (code, _) = session_with_players(&state, &["Ada"]).await;
        let code = code.to_string();
        state.start(&code).await.unwrap();

        assert_eq!(state.end_prompt_early(&code).await, Ok(true));
        assert_eq!(state.end_prompt_early(&code).await, Ok(false));

        let shared = state.session(&code).await.unwrap();
        let session = shared.lock().await;
        assert_eq!(session.phase, Phase::Grading);
        assert!(!session.timer.is_running());
    }
}

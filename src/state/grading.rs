use super::{AppState, Session};
use crate::error::{SessionError, SessionResult};
use crate::protocol::ServerMessage;
use crate::semantic::{merge_matches, SemanticMatcher};
use crate::types::*;
use std::sync::Arc;

/// Everything the classifier needs, captured while the session was locked
struct RefineJob {
    code: SessionCode,
    prompt_index: usize,
    question: String,
    accepted: Vec<String>,
    responses: Vec<String>,
}

impl AppState {
    /// grading -> scoring with the host's final categorization
    pub async fn apply_grading(
        &self,
        code: &str,
        categorization: Categorization,
    ) -> SessionResult<Vec<AnswerGroup>> {
        let mut session = self.lock_session(code).await?;
        let groups = session.apply_grading(categorization)?.to_vec();
        session.publish();

        tracing::info!(
            "Session {} prompt {} graded into {} groups",
            session.code,
            session.prompt_index,
            groups.len()
        );
        Ok(groups)
    }

    /// Ask one participant to rework their answer
    ///
    /// The answer leaves the groups until it is resubmitted; the participant
    /// is told directly and everyone else sees the pending edit in the snapshot.
    pub async fn request_edit(
        &self,
        code: &str,
        participant_id: &str,
        reason: Option<&str>,
    ) -> SessionResult<()> {
        let (connection, notice) = {
            let mut session = self.lock_session(code).await?;
            let (reason, original_answer) = session.request_edit(participant_id, reason)?;
            session.publish();
            tracing::info!(
                "Session {}: host asked {} to rework \"{}\"",
                session.code,
                participant_id,
                original_answer
            );
            let connection = session
                .roster
                .get(participant_id)
                .and_then(|p| p.connection.clone());
            (
                connection,
                ServerMessage::RequireAnswerEdit {
                    reason,
                    original_answer,
                },
            )
        };

        match connection {
            Some(connection) if self.send_to(&connection, notice).await => {}
            _ => tracing::debug!(
                "{} is not connected; edit request stays in the snapshot",
                participant_id
            ),
        }
        Ok(())
    }

    /// Runs under the session lock right after playing -> grading
    pub(super) fn after_prompt_closed(self: &Arc<Self>, session: &Session) {
        tracing::info!(
            "Session {} prompt {} closed with {} answer(s)",
            session.code,
            session.prompt_index,
            session.submissions.len()
        );

        let Some(matcher) = self.semantic.clone() else {
            return;
        };
        let (Some(categorization), Some(prompt)) =
            (&session.categorization, session.current_prompt())
        else {
            return;
        };
        if categorization.uncategorized.is_empty() {
            return;
        }

        let job = RefineJob {
            code: session.code,
            prompt_index: session.prompt_index,
            question: prompt.text.clone(),
            accepted: prompt.accepted_answers.clone(),
            responses: categorization.uncategorized.clone(),
        };
        let state = self.clone();
        tokio::spawn(async move {
            state.refine_categorization(matcher, job).await;
        });
    }

    /// Upgrade the fuzzy suggestion with the semantic classifier's picks
    async fn refine_categorization(&self, matcher: Arc<dyn SemanticMatcher>, job: RefineJob) {
        let matches = match matcher
            .classify(&job.question, &job.accepted, &job.responses)
            .await
        {
            Ok(matches) => matches,
            Err(e) => {
                let err = SessionError::UpstreamUnavailable(e.to_string());
                tracing::warn!("{}; keeping fuzzy suggestions for session {}", err, job.code);
                return;
            }
        };

        let Some(shared) = self.session_by_code(job.code).await else {
            return;
        };
        let mut session = shared.lock().await;
        if session.closed
            || session.phase != Phase::Grading
            || session.prompt_index != job.prompt_index
        {
            tracing::debug!("Session {} moved on before semantic matches arrived", job.code);
            return;
        }

        let min_confidence = self.config.semantic_min_confidence;
        let moved = session
            .categorization
            .as_mut()
            .map(|c| merge_matches(c, &matches, min_confidence))
            .unwrap_or(0);
        if moved > 0 {
            tracing::info!(
                "Session {}: semantic matcher placed {} more answer(s)",
                job.code,
                moved
            );
            session.publish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::{SemanticError, SemanticMatch};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Scripted {
        fail: bool,
    }

    #[async_trait]
    impl SemanticMatcher for Scripted {
        async fn classify(
            &self,
            _question: &str,
            accepted: &[String],
            responses: &[String],
        ) -> Result<Vec<SemanticMatch>, SemanticError> {
            if self.fail {
                return Err(SemanticError::Status(500));
            }
            Ok(responses
                .iter()
                .map(|r| SemanticMatch {
                    response: r.clone(),
                    best_match: accepted.first().cloned(),
                    similarity: 0.9,
                    confidence: 90.0,
                })
                .collect())
        }
    }

    async fn playing_session(state: &Arc<AppState>) -> (String, ParticipantId) {
        let created = state.create_session("Host", "host-conn").await.unwrap();
        let code = created.code.to_string();
        let joined = state.join(&code, "Ada", None, "ada-conn").await.unwrap();
        state
            .load_prompts(
                &code,
                vec![Prompt {
                    text: "Name a pizza topping".to_string(),
                    accepted_answers: vec!["mushroom".to_string()],
                    round_number: 1,
                    order_in_round: 1,
                }],
            )
            .await
            .unwrap();
        state.start(&code).await.unwrap();
        (code, joined.participant_id.unwrap())
    }

    #[tokio::test]
    async fn test_semantic_refinement_moves_answers() {
        let state =
            Arc::new(AppState::new().with_semantic_matcher(Arc::new(Scripted { fail: false })));
        let (code, ada) = playing_session(&state).await;
        let mut rx = state.session(&code).await.unwrap().lock().await.subscribe();

        // the only participant answering closes the prompt
        assert!(
            state
                .submit_answer(&code, &ada, "champignons")
                .await
                .unwrap()
                .closed_prompt
        );

        let refined = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(ServerMessage::Snapshot { snapshot }) = rx.recv().await {
                    let cat = snapshot.categorization.clone().unwrap_or_default();
                    if cat.uncategorized.is_empty() && !cat.buckets.is_empty() {
                        return cat;
                    }
                }
            }
        })
        .await
        .expect("refined snapshot");

        assert_eq!(refined.buckets[0].answers, vec!["champignons"]);
    }

    #[tokio::test]
    async fn test_semantic_failure_keeps_fuzzy_suggestion() {
        let state =
            Arc::new(AppState::new().with_semantic_matcher(Arc::new(Scripted { fail: true })));
        let (code, ada) = playing_session(&state).await;
        state.submit_answer(&code, &ada, "champignons").await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let shared = state.session(&code).await.unwrap();
        let session = shared.lock().await;
        assert_eq!(session.phase, Phase::Grading);
        let cat = session.categorization.as_ref().unwrap();
        assert_eq!(cat.uncategorized, vec!["champignons"]);
    }

    #[tokio::test]
    async fn test_edit_request_holds_answer_out_of_grading() {
        let state = Arc::new(AppState::new());
        let (code, ada) = playing_session(&state).await;
        let mut ada_outbox = state.register_connection("ada-conn").await;

        // the only answer closes the prompt
        state.submit_answer(&code, &ada, "cheese").await.unwrap();
        state
            .request_edit(&code, &ada, Some("Which cheese?"))
            .await
            .unwrap();

        match ada_outbox.try_recv() {
            Ok(ServerMessage::RequireAnswerEdit {
                reason,
                original_answer,
            }) => {
                assert_eq!(reason, "Which cheese?");
                assert_eq!(original_answer, "cheese");
            }
            other => panic!("Expected RequireAnswerEdit message, got {:?}", other),
        }
        {
            let shared = state.session(&code).await.unwrap();
            let session = shared.lock().await;
            assert_eq!(session.phase, Phase::Grading);
            assert!(session.groups.is_empty());
            let snapshot = session.snapshot();
            assert_eq!(snapshot.pending_edits.len(), 1);
            assert_eq!(snapshot.pending_edits[0].name, "Ada");
            assert_eq!(snapshot.answers_received, 0);
        }

        let receipt = state.submit_answer(&code, &ada, "mushroom").await.unwrap();
        assert!(!receipt.closed_prompt);

        let shared = state.session(&code).await.unwrap();
        let session = shared.lock().await;
        assert!(session.pending_edits.is_empty());
        assert_eq!(session.groups.len(), 1);
        assert_eq!(session.groups[0].answer, "mushroom");
        let cat = session.categorization.as_ref().unwrap();
        assert_eq!(cat.buckets[0].answers, vec!["mushroom"]);
    }

    #[tokio::test]
    async fn test_edit_request_needs_an_answer() {
        let state = Arc::new(AppState::new());
        let (code, ada) = playing_session(&state).await;

        let err = state.request_edit(&code, &ada, None).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
        let err = state.request_edit(&code, "nobody", None).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }
}

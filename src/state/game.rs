use super::timer::{spawn_prompt_timer, TickOutcome};
use super::{Advance, AppState, Session};
use crate::error::{SessionError, SessionResult};
use crate::questions::load_prompts;
use crate::types::*;
use std::sync::Arc;

impl AppState {
    /// waiting -> playing
    ///
    /// Prompts are fetched with the session unlocked, so the session is
    /// re-validated afterwards; a concurrent end or start wins.
    pub async fn start(self: &Arc<Self>, code: &str) -> SessionResult<()> {
        let preloaded = {
            let session = self.lock_session(code).await?;
            session.check_startable()?;
            session.preloaded.clone()
        };

        let prompts = match preloaded {
            Some(prompts) => prompts,
            None => load_prompts(self.questions.as_deref()).await,
        };

        let mut session = self.lock_session(code).await?;
        session.begin(prompts)?;
        self.start_timer(&mut session);
        session.publish();

        tracing::info!(
            "Session {} started: {} prompts, {} participants",
            session.code,
            session.prompts.len(),
            session.roster.len()
        );
        Ok(())
    }

    fn start_timer(self: &Arc<Self>, session: &mut Session) {
        let handle = spawn_prompt_timer(self.clone(), session.code, session.prompt_index);
        session.timer.start(handle);
    }

    /// Host forces playing -> grading; Ok(false) if the prompt was already closed
    pub async fn end_prompt_early(self: &Arc<Self>, code: &str) -> SessionResult<bool> {
        let mut session = self.lock_session(code).await?;
        match session.phase {
            Phase::Playing => {}
            Phase::Grading => return Ok(false),
            actual => {
                return Err(SessionError::InvalidPhase {
                    expected: Phase::Playing,
                    actual,
                })
            }
        }

        let closed = session.close_prompt();
        if closed {
            self.after_prompt_closed(&session);
            session.publish();
        }
        Ok(closed)
    }

    /// scoring -> next prompt, or finished when prompts are exhausted
    pub async fn advance(self: &Arc<Self>, code: &str) -> SessionResult<Advance> {
        let mut session = self.lock_session(code).await?;
        let outcome = session.advance()?;
        if outcome == Advance::NextPrompt {
            self.start_timer(&mut session);
        }
        session.publish();

        tracing::info!(
            "Session {} advanced: {:?} (prompt {}/{})",
            session.code,
            outcome,
            session.prompt_index + 1,
            session.prompts.len()
        );
        Ok(outcome)
    }

    pub async fn end_session(&self, code: &str) -> SessionResult<()> {
        let code: SessionCode = code.parse().map_err(|_| SessionError::NotFound)?;
        if self.dispose(code).await {
            Ok(())
        } else {
            Err(SessionError::NotFound)
        }
    }

    pub async fn update_settings(
        &self,
        code: &str,
        timer_seconds: Option<u32>,
        max_players: Option<u32>,
        round_size: Option<u32>,
    ) -> SessionResult<SessionSettings> {
        let mut session = self.lock_session(code).await?;
        session.update_settings(timer_seconds, max_players, round_size)?;
        session.publish();
        tracing::info!("Session {} settings: {:?}", session.code, session.settings);
        Ok(session.settings)
    }

    /// Host-supplied prompt set, used by the next start
    pub async fn load_prompts(&self, code: &str, prompts: Vec<Prompt>) -> SessionResult<usize> {
        let mut session = self.lock_session(code).await?;
        let count = session.load_prompts(prompts)?;
        session.publish();
        tracing::info!("Session {} loaded {} host prompts", session.code, count);
        Ok(count)
    }

    /// One countdown step for the prompt at `prompt_index`
    pub async fn tick(self: &Arc<Self>, code: SessionCode, prompt_index: usize) -> TickOutcome {
        let Some(shared) = self.session_by_code(code).await else {
            return TickOutcome::Stale;
        };
        let mut session = shared.lock().await;

        let outcome = session.tick(prompt_index);
        match outcome {
            TickOutcome::Running => session.publish(),
            TickOutcome::Expired => {
                tracing::info!("Session {} prompt {} timed out", code, prompt_index);
                self.after_prompt_closed(&session);
                session.publish();
            }
            TickOutcome::Stale => {}
        }
        outcome
    }
}

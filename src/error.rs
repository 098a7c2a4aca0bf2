//! Engine error taxonomy
//!
//! Every variant is reported to the invoking connection only. The wire form is
//! `ServerMessage::Error { code, msg, hint }`, where `hint` carries host guidance.

use crate::types::Phase;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found")]
    NotFound,

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Not allowed while the session is {actual} (needs {expected})")]
    InvalidPhase { expected: Phase, actual: Phase },

    #[error("The game has already started")]
    AlreadyStarted,

    #[error("That name is already taken in this session")]
    DuplicateName,

    #[error("The session is full")]
    Full,

    #[error("{missing} answer(s) still need a bucket")]
    IncompleteCategorization { missing: usize },

    #[error("Upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl SessionError {
    /// Stable machine-readable reason code
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::NotFound => "NOT_FOUND",
            SessionError::Forbidden(_) => "FORBIDDEN",
            SessionError::InvalidPhase { .. } => "INVALID_PHASE",
            SessionError::AlreadyStarted => "ALREADY_STARTED",
            SessionError::DuplicateName => "DUPLICATE_NAME",
            SessionError::Full => "FULL",
            SessionError::IncompleteCategorization { .. } => "INCOMPLETE_CATEGORIZATION",
            SessionError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            SessionError::InvalidRequest(_) => "INVALID_REQUEST",
        }
    }

    /// Phase-specific guidance shown to the host only
    pub fn host_hint(&self) -> Option<&'static str> {
        match self {
            SessionError::InvalidPhase { actual, .. } => Some(match actual {
                Phase::Waiting => "Start the game first",
                Phase::Playing => "End the prompt or wait for the timer before grading",
                Phase::Grading => "Complete grading before advancing",
                Phase::Scoring => "Advance to the next prompt",
                Phase::Finished => "The game is over; create a new session",
            }),
            SessionError::IncompleteCategorization { .. } => {
                Some("Place every answer into a bucket or mark it wrong")
            }
            SessionError::UpstreamUnavailable(_) => Some("Built-in prompts will be used"),
            _ => None,
        }
    }

    /// Guard helper for phase-gated operations
    pub fn require_phase(expected: Phase, actual: Phase) -> SessionResult<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(SessionError::InvalidPhase { expected, actual })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_phase() {
        assert!(SessionError::require_phase(Phase::Grading, Phase::Grading).is_ok());
        let err = SessionError::require_phase(Phase::Scoring, Phase::Grading).unwrap_err();
        assert_eq!(err.code(), "INVALID_PHASE");
        assert_eq!(err.host_hint(), Some("Complete grading before advancing"));
    }

    #[test]
    fn test_messages_are_human_readable() {
        let err = SessionError::IncompleteCategorization { missing: 2 };
        assert_eq!(err.to_string(), "2 answer(s) still need a bucket");
        assert_eq!(SessionError::NotFound.host_hint(), None);
    }
}

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Opaque ID types
pub type ParticipantId = String;
pub type ConnectionId = String;
pub type BucketId = String;

/// Four-digit, human-typeable session code (1000-9999)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionCode(u16);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid session code: {0:?}")]
pub struct InvalidSessionCode(pub String);

impl SessionCode {
    pub const MIN: u16 = 1000;
    pub const MAX: u16 = 9999;

    pub fn new(value: u16) -> Option<Self> {
        (Self::MIN..=Self::MAX)
            .contains(&value)
            .then_some(Self(value))
    }

    /// Draw a random code; callers are responsible for collision checks
    pub fn random() -> Self {
        Self(rand::rng().random_range(Self::MIN..=Self::MAX))
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionCode {
    type Err = InvalidSessionCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.len() != 4 || !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(InvalidSessionCode(s.to_string()));
        }
        trimmed
            .parse::<u16>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| InvalidSessionCode(s.to_string()))
    }
}

impl Serialize for SessionCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SessionCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Waiting,
    Playing,
    Grading,
    Scoring,
    Finished,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Waiting => "waiting",
            Phase::Playing => "playing",
            Phase::Grading => "grading",
            Phase::Scoring => "scoring",
            Phase::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// One question posed to participants
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prompt {
    pub text: String,
    pub accepted_answers: Vec<String>,
    pub round_number: u32,
    pub order_in_round: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SessionSettings {
    pub timer_seconds: u32,
    /// 0 means unlimited
    pub max_players: u32,
    /// Prompts per round, used for round history boundaries
    pub round_size: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timer_seconds: 180,
            max_players: 0,
            round_size: 5,
        }
    }
}

/// A participant's answer to the current prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    pub participant_id: ParticipantId,
    pub name: String,
    pub text: String,
}

/// Host asked this participant to rework their answer; it is left out of grading until they do
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingEdit {
    pub participant_id: ParticipantId,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerCategory {
    Ungraded,
    Accepted,
    Wrong,
}

/// Submissions deemed equivalent for scoring, with the points each member earns
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerGroup {
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_id: Option<BucketId>,
    pub category: AnswerCategory,
    pub players: Vec<String>,
    pub participant_ids: Vec<ParticipantId>,
    pub count: usize,
    pub points: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerBucket {
    pub id: BucketId,
    pub label: String,
    #[serde(default)]
    pub answers: Vec<String>,
}

/// Placement of every raw answer into an accepted bucket, the wrong bucket, or nowhere yet
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Categorization {
    #[serde(default)]
    pub buckets: Vec<AnswerBucket>,
    #[serde(default)]
    pub wrong: Vec<String>,
    #[serde(default)]
    pub uncategorized: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Standing {
    pub participant_id: ParticipantId,
    pub name: String,
    pub score: u32,
    pub round_points: u32,
    pub rank: u32,
    /// Positive when the participant climbed since the previous entry
    pub rank_delta: i32,
}

/// Immutable cumulative-score snapshot taken at a round boundary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundHistoryEntry {
    pub round_number: u32,
    /// 1-based prompt numbers covered by this round
    pub first_prompt: u32,
    pub last_prompt: u32,
    pub standings: Vec<Standing>,
}

/// What a connection currently is to the engine
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionRole {
    #[default]
    Unassigned,
    Host {
        code: SessionCode,
    },
    Player {
        code: SessionCode,
        participant_id: ParticipantId,
    },
    Spectator {
        code: SessionCode,
    },
}

impl ConnectionRole {
    pub fn session_code(&self) -> Option<SessionCode> {
        match self {
            ConnectionRole::Unassigned => None,
            ConnectionRole::Host { code }
            | ConnectionRole::Player { code, .. }
            | ConnectionRole::Spectator { code } => Some(*code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_code_parse() {
        assert_eq!("4821".parse::<SessionCode>().unwrap().value(), 4821);
        assert_eq!(" 1000 ".parse::<SessionCode>().unwrap().value(), 1000);
        assert!("0999".parse::<SessionCode>().is_err());
        assert!("12a4".parse::<SessionCode>().is_err());
        assert!("12345".parse::<SessionCode>().is_err());
        assert!("".parse::<SessionCode>().is_err());
    }

    #[test]
    fn test_session_code_random_in_range() {
        for _ in 0..200 {
            let code = SessionCode::random();
            assert!((SessionCode::MIN..=SessionCode::MAX).contains(&code.value()));
            assert_eq!(code.to_string().len(), 4);
        }
    }

    #[test]
    fn test_session_code_serializes_as_string() {
        let code = SessionCode::new(2024).unwrap();
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"2024\"");
        let back: SessionCode = serde_json::from_str("\"2024\"").unwrap();
        assert_eq!(back, code);
    }

    #[test]
    fn test_phase_wire_names() {
        assert_eq!(serde_json::to_string(&Phase::Grading).unwrap(), "\"grading\"");
        assert_eq!(Phase::Finished.to_string(), "finished");
    }
}

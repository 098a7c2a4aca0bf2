use crate::error::SessionError;
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateSession {
        host_name: String,
    },
    /// Join a waiting session, or resume a seat in a running one
    Join {
        code: String,
        name: String,
        #[serde(default)]
        participant_id: Option<ParticipantId>,
    },
    Watch {
        code: String,
    },
    SubmitAnswer {
        code: String,
        text: String,
    },
    AskHost {
        code: String,
        text: String,
        #[serde(default)]
        freeform: bool,
    },
    Heartbeat,
    Leave {
        code: String,
    },
    // Host-only messages
    HostStart {
        code: String,
    },
    HostEndPrompt {
        code: String,
    },
    HostApplyGrading {
        code: String,
        categorization: Categorization,
    },
    HostAdvance {
        code: String,
    },
    HostEndSession {
        code: String,
    },
    HostUpdateSettings {
        code: String,
        #[serde(default)]
        timer_seconds: Option<u32>,
        #[serde(default)]
        max_players: Option<u32>,
        #[serde(default)]
        round_size: Option<u32>,
    },
    HostKick {
        code: String,
        participant_id: ParticipantId,
    },
    HostReply {
        code: String,
        participant_id: ParticipantId,
        text: String,
    },
    HostLoadPrompts {
        code: String,
        prompts: Vec<Prompt>,
    },
    /// Send one participant's answer back for a rewrite
    HostRequestEdit {
        code: String,
        participant_id: ParticipantId,
        #[serde(default)]
        reason: Option<String>,
    },
}

impl ClientMessage {
    /// Short operation name used for logging and duplicate suppression
    pub fn op_name(&self) -> &'static str {
        match self {
            ClientMessage::CreateSession { .. } => "create_session",
            ClientMessage::Join { .. } => "join",
            ClientMessage::Watch { .. } => "watch",
            ClientMessage::SubmitAnswer { .. } => "submit_answer",
            ClientMessage::AskHost { .. } => "ask_host",
            ClientMessage::Heartbeat => "heartbeat",
            ClientMessage::Leave { .. } => "leave",
            ClientMessage::HostStart { .. } => "host_start",
            ClientMessage::HostEndPrompt { .. } => "host_end_prompt",
            ClientMessage::HostApplyGrading { .. } => "host_apply_grading",
            ClientMessage::HostAdvance { .. } => "host_advance",
            ClientMessage::HostEndSession { .. } => "host_end_session",
            ClientMessage::HostUpdateSettings { .. } => "host_update_settings",
            ClientMessage::HostKick { .. } => "host_kick",
            ClientMessage::HostReply { .. } => "host_reply",
            ClientMessage::HostLoadPrompts { .. } => "host_load_prompts",
            ClientMessage::HostRequestEdit { .. } => "host_request_edit",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    SessionCreated {
        code: SessionCode,
        snapshot: SessionSnapshot,
    },
    Joined {
        #[serde(skip_serializing_if = "Option::is_none")]
        participant_id: Option<ParticipantId>,
        is_host: bool,
        resumed: bool,
        snapshot: SessionSnapshot,
    },
    Watching {
        snapshot: SessionSnapshot,
    },
    /// Full session state; always replaces the client's copy
    Snapshot {
        snapshot: SessionSnapshot,
    },
    AnswerAccepted {
        prompt_index: usize,
    },
    GradingApplied {
        groups: Vec<AnswerGroup>,
    },
    PromptsLoaded {
        count: usize,
    },
    AskHostAck {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<AskHostRejection>,
    },
    HostQuestion {
        from_id: ParticipantId,
        from_name: String,
        text: String,
        freeform: bool,
        sent_at: String,
    },
    HostReply {
        text: String,
        sent_at: String,
    },
    HostReplyAck {
        participant_id: ParticipantId,
    },
    RequireAnswerEdit {
        reason: String,
        original_answer: String,
    },
    HeartbeatAck {
        server_now: String,
    },
    Left {
        code: SessionCode,
    },
    Kicked {
        code: SessionCode,
    },
    /// The seat was resumed on another connection
    Superseded {
        code: SessionCode,
    },
    SessionEnded {
        code: SessionCode,
    },
    Error {
        code: String,
        msg: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },
}

impl ServerMessage {
    /// Unicast error; the host also gets phase-specific guidance
    pub fn from_error(err: &SessionError, for_host: bool) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            msg: err.to_string(),
            hint: for_host
                .then(|| err.host_hint())
                .flatten()
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AskHostRejection {
    BadPayload,
    Empty,
    NotInGame,
    NoHost,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RosterEntry {
    pub id: ParticipantId,
    pub name: String,
    pub score: u32,
    pub has_answered: bool,
    /// Points from the most recently graded prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_points: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptView {
    pub index: usize,
    pub total: usize,
    pub text: String,
    pub round_number: u32,
    /// Hidden while the prompt is open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_answers: Option<Vec<String>>,
}

/// The complete state every channel member receives
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    pub code: SessionCode,
    pub version: u64,
    pub phase: Phase,
    pub host_name: String,
    pub settings: SessionSettings,
    pub roster: Vec<RosterEntry>,
    pub prompt: Option<PromptView>,
    pub answers_received: usize,
    pub answers_expected: usize,
    pub answer_groups: Vec<AnswerGroup>,
    /// Answers sent back for a rewrite, excluded from the groups
    pub pending_edits: Vec<PendingEdit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categorization: Option<Categorization>,
    pub remaining_seconds: u32,
    pub round_history: Vec<RoundHistoryEntry>,
    pub server_now: String,
}

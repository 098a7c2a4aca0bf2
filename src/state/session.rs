//! One session's lifecycle: waiting -> playing -> grading -> scoring -> (playing | finished).
//!
//! Every method here is synchronous. Callers hold the session mutex for the
//! whole operation and call [`Session::publish`] once the mutation succeeded.

use super::roster::{Admission, Gate, HostSeat, Participant, Roster};
use super::timer::{PromptTimer, TickOutcome};
use crate::error::{SessionError, SessionResult};
use crate::matcher;
use crate::protocol::{PromptView, RosterEntry, ServerMessage, SessionSnapshot};
use crate::questions::sort_prompts;
use crate::scoring;
use crate::types::*;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;
const MAX_ANSWER_CHARS: usize = 200;
const DEFAULT_EDIT_REASON: &str = "Please be more specific";

pub const TIMER_RANGE: std::ops::RangeInclusive<u32> = 5..=3600;
pub const ROUND_SIZE_RANGE: std::ops::RangeInclusive<u32> = 1..=50;
pub const MAX_PLAYERS_LIMIT: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    NextPrompt,
    Finished,
}

#[derive(Debug)]
pub struct Session {
    pub code: SessionCode,
    pub version: u64,
    pub phase: Phase,
    pub settings: SessionSettings,
    pub host: HostSeat,
    pub roster: Roster,
    pub prompts: Vec<Prompt>,
    /// Host-supplied prompts used by `begin` instead of the repository
    pub preloaded: Option<Vec<Prompt>>,
    pub prompt_index: usize,
    /// Current prompt's answers in first-submission order
    pub submissions: Vec<Submission>,
    pub pending_edits: Vec<PendingEdit>,
    pub groups: Vec<AnswerGroup>,
    pub categorization: Option<Categorization>,
    /// Current prompt's points already credited
    scored: bool,
    pub remaining_seconds: u32,
    pub round_history: Vec<RoundHistoryEntry>,
    round_baseline: HashMap<ParticipantId, u32>,
    pub timer: PromptTimer,
    /// Set once the session has been disposed
    pub closed: bool,
    channel: broadcast::Sender<ServerMessage>,
}

impl Session {
    pub fn new(
        code: SessionCode,
        host_name: String,
        host_connection: &str,
        settings: SessionSettings,
        now: Instant,
    ) -> Self {
        let (channel, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            code,
            version: 0,
            phase: Phase::Waiting,
            settings,
            host: HostSeat::new(host_name, host_connection, now),
            roster: Roster::default(),
            prompts: Vec::new(),
            preloaded: None,
            prompt_index: 0,
            submissions: Vec::new(),
            pending_edits: Vec::new(),
            groups: Vec::new(),
            categorization: None,
            scored: false,
            remaining_seconds: 0,
            round_history: Vec::new(),
            round_baseline: HashMap::new(),
            timer: PromptTimer::default(),
            closed: false,
            channel,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.channel.subscribe()
    }

    /// Broadcast the full snapshot to every channel member
    pub fn publish(&mut self) {
        self.version += 1;
        let snapshot = self.snapshot();
        // No subscribers is fine
        let _ = self.channel.send(ServerMessage::Snapshot { snapshot });
    }

    pub fn announce(&self, msg: ServerMessage) {
        let _ = self.channel.send(msg);
    }

    pub fn current_prompt(&self) -> Option<&Prompt> {
        self.prompts.get(self.prompt_index)
    }

    pub fn is_host_connection(&self, connection: &str) -> bool {
        self.host.connection.as_deref() == Some(connection)
    }

    /// Answered and not sent back for a rewrite
    pub fn has_answered(&self, participant_id: &str) -> bool {
        self.submissions
            .iter()
            .any(|s| s.participant_id == participant_id)
            && !self.edit_pending(participant_id)
    }

    pub fn edit_pending(&self, participant_id: &str) -> bool {
        self.pending_edits
            .iter()
            .any(|e| e.participant_id == participant_id)
    }

    /// Submissions that count toward grouping and grading
    fn gradable(&self) -> Vec<Submission> {
        self.submissions
            .iter()
            .filter(|s| !self.edit_pending(&s.participant_id))
            .cloned()
            .collect()
    }

    pub fn admit(
        &mut self,
        name: &str,
        logical_id: Option<&str>,
        connection: &str,
        now: Instant,
        heartbeat_timeout: Duration,
    ) -> SessionResult<Admission> {
        let gate = Gate {
            phase: self.phase,
            max_players: self.settings.max_players,
            now,
            heartbeat_timeout,
        };
        self.roster
            .admit(&mut self.host, name, logical_id, connection, gate)
    }

    pub fn check_startable(&self) -> SessionResult<()> {
        SessionError::require_phase(Phase::Waiting, self.phase)?;
        if self.roster.is_empty() {
            return Err(SessionError::InvalidRequest(
                "At least one participant must join before starting".to_string(),
            ));
        }
        Ok(())
    }

    /// waiting -> playing with the first prompt
    pub fn begin(&mut self, prompts: Vec<Prompt>) -> SessionResult<()> {
        self.check_startable()?;
        if prompts.is_empty() {
            return Err(SessionError::InvalidRequest(
                "No prompts available".to_string(),
            ));
        }
        self.prompts = prompts;
        self.prompt_index = 0;
        self.round_baseline = self.scores();
        self.enter_playing();
        Ok(())
    }

    fn enter_playing(&mut self) {
        self.submissions.clear();
        self.pending_edits.clear();
        self.groups.clear();
        self.categorization = None;
        self.scored = false;
        self.remaining_seconds = self.settings.timer_seconds;
        self.phase = Phase::Playing;
    }

    /// Record or overwrite a participant's answer (last write wins)
    ///
    /// A participant asked to rework their answer may also resubmit while
    /// grading; that clears the request and rebuilds the groups.
    pub fn submit(&mut self, participant_id: &str, text: &str) -> SessionResult<()> {
        let editing = self.phase == Phase::Grading && self.edit_pending(participant_id);
        if !editing {
            SessionError::require_phase(Phase::Playing, self.phase)?;
        }
        let participant = self.roster.get(participant_id).ok_or_else(|| {
            SessionError::Forbidden("only joined participants can answer".to_string())
        })?;

        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::InvalidRequest(
                "Answer must not be empty".to_string(),
            ));
        }
        if text.chars().count() > MAX_ANSWER_CHARS {
            return Err(SessionError::InvalidRequest(format!(
                "Answer must be at most {} characters",
                MAX_ANSWER_CHARS
            )));
        }

        let submission = Submission {
            participant_id: participant.id.clone(),
            name: participant.name.clone(),
            text: text.to_string(),
        };
        match self
            .submissions
            .iter_mut()
            .find(|s| s.participant_id == participant_id)
        {
            Some(existing) => *existing = submission,
            None => self.submissions.push(submission),
        }
        self.pending_edits.retain(|e| e.participant_id != participant_id);
        if editing {
            self.regroup();
        }
        Ok(())
    }

    /// Send a participant's answer back; returns the reason and the answer being reworked
    pub fn request_edit(
        &mut self,
        participant_id: &str,
        reason: Option<&str>,
    ) -> SessionResult<(String, String)> {
        if !matches!(self.phase, Phase::Playing | Phase::Grading) {
            return Err(SessionError::InvalidPhase {
                expected: Phase::Grading,
                actual: self.phase,
            });
        }
        let participant = self
            .roster
            .get(participant_id)
            .ok_or_else(|| SessionError::InvalidRequest("Unknown participant".to_string()))?;
        let original = self
            .submissions
            .iter()
            .find(|s| s.participant_id == participant_id)
            .map(|s| s.text.clone())
            .ok_or_else(|| {
                SessionError::InvalidRequest(format!("{} has not answered yet", participant.name))
            })?;

        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_EDIT_REASON);
        if reason.chars().count() > MAX_ANSWER_CHARS {
            return Err(SessionError::InvalidRequest(format!(
                "Reason must be at most {} characters",
                MAX_ANSWER_CHARS
            )));
        }

        let edit = PendingEdit {
            participant_id: participant.id.clone(),
            name: participant.name.clone(),
            reason: reason.to_string(),
        };
        self.pending_edits.retain(|e| e.participant_id != participant_id);
        self.pending_edits.push(edit);
        if self.phase == Phase::Grading {
            self.regroup();
        }
        Ok((reason.to_string(), original))
    }

    /// Recompute the ungraded groups and the suggested categorization
    fn regroup(&mut self) {
        self.groups = scoring::score_ungraded(&self.gradable());
        let accepted = self
            .current_prompt()
            .map(|p| p.accepted_answers.clone())
            .unwrap_or_default();
        self.categorization = Some(matcher::auto_categorize(
            &self.distinct_answers(),
            &accepted,
        ));
    }

    /// Every connected participant has answered (dropped seats don't count)
    pub fn all_answered(&self) -> bool {
        !self.submissions.is_empty() && self.roster.connected().all(|p| self.has_answered(&p.id))
    }

    /// playing -> grading; only the first caller performs the transition
    pub fn close_prompt(&mut self) -> bool {
        if self.phase != Phase::Playing {
            return false;
        }
        self.phase = Phase::Grading;
        self.timer.stop();
        self.regroup();
        true
    }

    /// One raw representative per normalized answer, in submission order
    pub fn distinct_answers(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.submissions
            .iter()
            .filter(|s| !self.edit_pending(&s.participant_id))
            .filter(|s| seen.insert(scoring::normalize(&s.text)))
            .map(|s| s.text.clone())
            .collect()
    }

    /// grading -> scoring with the host-approved categorization
    pub fn apply_grading(&mut self, categorization: Categorization) -> SessionResult<&[AnswerGroup]> {
        SessionError::require_phase(Phase::Grading, self.phase)?;
        let groups = scoring::score_graded(&self.gradable(), &categorization)?;

        let points = scoring::points_by_participant(&groups);
        for p in self.roster.iter_mut() {
            p.last_points = Some(points.get(&p.id).copied().unwrap_or(0));
        }

        self.groups = groups;
        self.categorization = Some(categorization);
        // Outstanding rewrites score nothing for this prompt
        self.pending_edits.clear();
        self.phase = Phase::Scoring;
        Ok(&self.groups)
    }

    /// Credit the graded prompt's points exactly once
    fn apply_points(&mut self) {
        if self.scored || self.phase != Phase::Scoring {
            return;
        }
        for group in &self.groups {
            for id in &group.participant_ids {
                self.roster.add_points(id, group.points);
            }
        }
        self.scored = true;
    }

    /// scoring -> playing (next prompt) or finished
    pub fn advance(&mut self) -> SessionResult<Advance> {
        SessionError::require_phase(Phase::Scoring, self.phase)?;
        self.apply_points();

        let completed = self.prompt_index + 1;
        let round_size = self.settings.round_size.max(1) as usize;
        let at_boundary = completed % round_size == 0;
        if at_boundary {
            self.record_round(completed);
        }

        if completed < self.prompts.len() {
            self.prompt_index = completed;
            self.enter_playing();
            Ok(Advance::NextPrompt)
        } else {
            if !at_boundary {
                self.record_round(completed);
            }
            self.phase = Phase::Finished;
            Ok(Advance::Finished)
        }
    }

    fn scores(&self) -> HashMap<ParticipantId, u32> {
        self.roster.iter().map(|p| (p.id.clone(), p.score)).collect()
    }

    fn record_round(&mut self, last_prompt: usize) {
        let first_prompt = self
            .round_history
            .last()
            .map(|e| e.last_prompt + 1)
            .unwrap_or(1);
        let previous_ranks: HashMap<ParticipantId, u32> = self
            .round_history
            .last()
            .map(|e| {
                e.standings
                    .iter()
                    .map(|s| (s.participant_id.clone(), s.rank))
                    .collect()
            })
            .unwrap_or_default();

        let mut standings: Vec<Standing> = self
            .roster
            .iter()
            .map(|p| Standing {
                participant_id: p.id.clone(),
                name: p.name.clone(),
                score: p.score,
                round_points: p
                    .score
                    .saturating_sub(self.round_baseline.get(&p.id).copied().unwrap_or(0)),
                rank: 0,
                rank_delta: 0,
            })
            .collect();
        standings.sort_by(|a, b| b.score.cmp(&a.score));

        // Competition ranking: ties share a rank
        for i in 0..standings.len() {
            let rank = if i > 0 && standings[i].score == standings[i - 1].score {
                standings[i - 1].rank
            } else {
                i as u32 + 1
            };
            standings[i].rank = rank;
            standings[i].rank_delta = previous_ranks
                .get(&standings[i].participant_id)
                .map(|prev| *prev as i32 - rank as i32)
                .unwrap_or(0);
        }

        self.round_history.push(RoundHistoryEntry {
            round_number: self.round_history.len() as u32 + 1,
            first_prompt: first_prompt as u32,
            last_prompt: last_prompt as u32,
            standings,
        });
        self.round_baseline = self.scores();
    }

    /// Decrement the countdown; reaching zero closes the prompt
    pub fn tick(&mut self, prompt_index: usize) -> TickOutcome {
        if self.closed || self.phase != Phase::Playing || self.prompt_index != prompt_index {
            return TickOutcome::Stale;
        }
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 && self.close_prompt() {
            TickOutcome::Expired
        } else {
            TickOutcome::Running
        }
    }

    /// Force-terminate from any phase
    pub fn end(&mut self) {
        self.apply_points();
        self.timer.stop();
        self.phase = Phase::Finished;
        self.closed = true;
    }

    pub fn update_settings(
        &mut self,
        timer_seconds: Option<u32>,
        max_players: Option<u32>,
        round_size: Option<u32>,
    ) -> SessionResult<()> {
        if self.phase == Phase::Finished {
            return Err(SessionError::InvalidPhase {
                expected: Phase::Waiting,
                actual: self.phase,
            });
        }
        if let Some(t) = timer_seconds {
            if !TIMER_RANGE.contains(&t) {
                return Err(SessionError::InvalidRequest(format!(
                    "Timer must be between {} and {} seconds",
                    TIMER_RANGE.start(),
                    TIMER_RANGE.end()
                )));
            }
        }
        if let Some(m) = max_players {
            if m > MAX_PLAYERS_LIMIT {
                return Err(SessionError::InvalidRequest(format!(
                    "Max players must be at most {} (0 = unlimited)",
                    MAX_PLAYERS_LIMIT
                )));
            }
        }
        if let Some(r) = round_size {
            SessionError::require_phase(Phase::Waiting, self.phase)?;
            if !ROUND_SIZE_RANGE.contains(&r) {
                return Err(SessionError::InvalidRequest(format!(
                    "Round size must be between {} and {}",
                    ROUND_SIZE_RANGE.start(),
                    ROUND_SIZE_RANGE.end()
                )));
            }
        }

        // Applies from the next prompt on
        if let Some(t) = timer_seconds {
            self.settings.timer_seconds = t;
        }
        if let Some(m) = max_players {
            self.settings.max_players = m;
        }
        if let Some(r) = round_size {
            self.settings.round_size = r;
        }
        Ok(())
    }

    pub fn load_prompts(&mut self, mut prompts: Vec<Prompt>) -> SessionResult<usize> {
        SessionError::require_phase(Phase::Waiting, self.phase)?;
        if prompts.is_empty() || prompts.iter().any(|p| p.text.trim().is_empty()) {
            return Err(SessionError::InvalidRequest(
                "Prompts must be non-empty".to_string(),
            ));
        }
        sort_prompts(&mut prompts);
        let count = prompts.len();
        self.preloaded = Some(prompts);
        Ok(count)
    }

    /// Remove a participant now; an open prompt forgets their answer
    pub fn remove_participant(&mut self, participant_id: &str) -> Option<Participant> {
        let removed = self.roster.remove(participant_id)?;
        self.pending_edits.retain(|e| e.participant_id != participant_id);
        if self.phase == Phase::Playing {
            self.submissions.retain(|s| s.participant_id != participant_id);
        }
        Some(removed)
    }

    /// When nobody (host included) is connected, the latest disconnect time
    pub fn abandoned_since(&self) -> Option<Instant> {
        if self.host.connection.is_some() {
            return None;
        }
        let participants = self.roster.all_dropped_since()?;
        match (participants, self.host.disconnected_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let reveal = matches!(
            self.phase,
            Phase::Grading | Phase::Scoring | Phase::Finished
        );

        let prompt = match self.phase {
            Phase::Waiting => None,
            _ => self.current_prompt().map(|p| PromptView {
                index: self.prompt_index,
                total: self.prompts.len(),
                text: p.text.clone(),
                round_number: p.round_number,
                accepted_answers: reveal.then(|| p.accepted_answers.clone()),
            }),
        };

        let roster = self
            .roster
            .iter()
            .map(|p| RosterEntry {
                id: p.id.clone(),
                name: p.name.clone(),
                score: p.score,
                has_answered: self.has_answered(&p.id),
                last_points: p.last_points,
            })
            .collect();

        SessionSnapshot {
            code: self.code,
            version: self.version,
            phase: self.phase,
            host_name: self.host.name.clone(),
            settings: self.settings,
            roster,
            prompt,
            answers_received: self
                .submissions
                .iter()
                .filter(|s| !self.edit_pending(&s.participant_id))
                .count(),
            answers_expected: self.roster.len(),
            answer_groups: if reveal { self.groups.clone() } else { Vec::new() },
            pending_edits: self.pending_edits.clone(),
            categorization: if reveal { self.categorization.clone() } else { None },
            remaining_seconds: self.remaining_seconds,
            round_history: self.round_history.clone(),
            server_now: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEARTBEAT: Duration = Duration::from_secs(15);

    fn prompt(text: &str, answers: &[&str]) -> Prompt {
        Prompt {
            text: text.to_string(),
            accepted_answers: answers.iter().map(|a| a.to_string()).collect(),
            round_number: 1,
            order_in_round: 1,
        }
    }

    fn session_with(names: &[&str], settings: SessionSettings) -> (Session, Vec<ParticipantId>) {
        let now = Instant::now();
        let mut session = Session::new(
            SessionCode::new(4821).unwrap(),
            "Host".to_string(),
            "host-conn",
            settings,
            now,
        );
        let ids = names
            .iter()
            .map(|name| match session
                .admit(name, None, &format!("conn-{}", name), now, HEARTBEAT)
                .unwrap()
            {
                Admission::Joined(id) => id,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        (session, ids)
    }

    fn accept_all(session: &Session) -> Categorization {
        Categorization {
            buckets: vec![AnswerBucket {
                id: "b".to_string(),
                label: "all".to_string(),
                answers: session.distinct_answers(),
            }],
            wrong: vec![],
            uncategorized: vec![],
        }
    }

    #[test]
    fn test_start_requires_participants() {
        let (mut session, _) = session_with(&[], SessionSettings::default());
        let err = session.begin(vec![prompt("Q", &["a"])]).unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
        assert_eq!(session.phase, Phase::Waiting);
    }

    #[test]
    fn test_all_answered_closes_once() {
        let (mut session, ids) = session_with(&["Ada", "Bob"], SessionSettings::default());
        session.begin(vec![prompt("Q", &["a"])]).unwrap();
        assert_eq!(session.remaining_seconds, 180);

        session.submit(&ids[0], "a").unwrap();
        assert!(!session.all_answered());
        // overwrite keeps a single submission
        session.submit(&ids[0], "b").unwrap();
        assert_eq!(session.submissions.len(), 1);
        session.submit(&ids[1], "a").unwrap();
        assert!(session.all_answered());

        assert!(session.close_prompt());
        assert!(!session.close_prompt());
        assert_eq!(session.phase, Phase::Grading);
        assert_eq!(session.tick(0), TickOutcome::Stale);
    }

    #[test]
    fn test_dropped_participant_excluded_from_denominator() {
        let (mut session, ids) = session_with(&["Ada", "Bob"], SessionSettings::default());
        session.begin(vec![prompt("Q", &["a"])]).unwrap();
        session.submit(&ids[0], "a").unwrap();
        assert!(session.roster.disconnect(&ids[1], "conn-Bob", Instant::now()));
        assert!(session.all_answered());
    }

    #[test]
    fn test_edit_request_reopens_answer() {
        let (mut session, ids) = session_with(&["Ada", "Bob"], SessionSettings::default());
        session.begin(vec![prompt("Q", &["a"])]).unwrap();
        session.submit(&ids[0], "thing").unwrap();
        session.submit(&ids[1], "a").unwrap();

        let (reason, original) = session.request_edit(&ids[0], Some("  ")).unwrap();
        assert_eq!(reason, "Please be more specific");
        assert_eq!(original, "thing");
        assert!(!session.has_answered(&ids[0]));
        assert!(!session.all_answered());

        // closing now leaves the pending answer out of the groups
        assert!(session.close_prompt());
        assert_eq!(session.distinct_answers(), vec!["a"]);
        assert_eq!(session.groups.len(), 1);

        // only the participant with a pending edit may answer while grading
        assert!(session.submit(&ids[1], "b").is_err());
        session.submit(&ids[0], "apple").unwrap();
        assert!(session.pending_edits.is_empty());
        assert_eq!(session.groups.len(), 2);
    }

    #[test]
    fn test_timer_expiry() {
        let settings = SessionSettings {
            timer_seconds: 2,
            ..SessionSettings::default()
        };
        let (mut session, _) = session_with(&["Ada"], settings);
        session.begin(vec![prompt("Q", &["a"])]).unwrap();
        assert_eq!(session.tick(0), TickOutcome::Running);
        assert_eq!(session.tick(0), TickOutcome::Expired);
        assert_eq!(session.phase, Phase::Grading);
        assert!(session.groups.is_empty());
    }

    #[test]
    fn test_grading_requires_full_categorization() {
        let (mut session, ids) = session_with(&["Ada", "Bob"], SessionSettings::default());
        session.begin(vec![prompt("Q", &["pizza"])]).unwrap();
        session.submit(&ids[0], "Pizza").unwrap();
        session.submit(&ids[1], "sushi").unwrap();
        session.close_prompt();

        let suggestion = session.categorization.clone().unwrap();
        assert_eq!(suggestion.buckets[0].answers, vec!["Pizza"]);
        assert_eq!(suggestion.uncategorized, vec!["sushi"]);

        let err = session.apply_grading(suggestion.clone()).unwrap_err();
        assert_eq!(err, SessionError::IncompleteCategorization { missing: 1 });
        assert_eq!(session.phase, Phase::Grading);

        let mut complete = suggestion;
        complete.wrong = complete.uncategorized.drain(..).collect();
        session.apply_grading(complete).unwrap();
        assert_eq!(session.phase, Phase::Scoring);
        assert_eq!(session.roster.get(&ids[0]).unwrap().last_points, Some(2));
        assert_eq!(session.roster.get(&ids[1]).unwrap().last_points, Some(0));
    }

    #[test]
    fn test_advance_credits_points_once() {
        let (mut session, ids) = session_with(&["Ada", "Bob"], SessionSettings::default());
        session
            .begin(vec![prompt("Q1", &["a"]), prompt("Q2", &["b"])])
            .unwrap();
        session.submit(&ids[0], "x").unwrap();
        session.submit(&ids[1], "y").unwrap();
        session.close_prompt();
        let cat = accept_all(&session);
        session.apply_grading(cat).unwrap();

        assert_eq!(session.advance().unwrap(), Advance::NextPrompt);
        assert_eq!(session.roster.get(&ids[0]).unwrap().score, 1);

        // second advance is rejected and credits nothing
        assert!(session.advance().is_err());
        assert_eq!(session.roster.get(&ids[0]).unwrap().score, 1);
        assert_eq!(session.phase, Phase::Playing);
        assert_eq!(session.prompt_index, 1);
    }

    #[test]
    fn test_round_history_and_finish() {
        let settings = SessionSettings {
            round_size: 2,
            ..SessionSettings::default()
        };
        let (mut session, ids) = session_with(&["Ada", "Bob"], settings);
        session
            .begin(vec![prompt("Q1", &["a"]), prompt("Q2", &["a"]), prompt("Q3", &["a"])])
            .unwrap();

        // Ada answers alone each time: rarer answers score higher for her
        for expected_phase in [Advance::NextPrompt, Advance::NextPrompt, Advance::Finished] {
            session.submit(&ids[0], "rare").unwrap();
            session.close_prompt();
            let cat = accept_all(&session);
            session.apply_grading(cat).unwrap();
            assert_eq!(session.advance().unwrap(), expected_phase);
        }

        assert_eq!(session.phase, Phase::Finished);
        assert_eq!(session.round_history.len(), 2);

        let first = &session.round_history[0];
        assert_eq!((first.first_prompt, first.last_prompt), (1, 2));
        assert_eq!(first.standings[0].name, "Ada");
        assert_eq!(first.standings[0].score, 2);
        assert_eq!(first.standings[0].rank, 1);
        assert_eq!(first.standings[1].rank, 2);

        let last = &session.round_history[1];
        assert_eq!((last.first_prompt, last.last_prompt), (3, 3));
        assert_eq!(last.standings[0].round_points, 1);
        assert_eq!(last.standings[0].rank_delta, 0);
    }

    #[test]
    fn test_settings_validation() {
        let (mut session, _) = session_with(&["Ada"], SessionSettings::default());
        assert!(session.update_settings(Some(1), None, None).is_err());
        assert!(session.update_settings(None, Some(5000), None).is_err());
        session.update_settings(Some(30), Some(8), Some(3)).unwrap();
        assert_eq!(session.settings.round_size, 3);

        session.begin(vec![prompt("Q", &["a"])]).unwrap();
        let err = session.update_settings(None, None, Some(4)).unwrap_err();
        assert_eq!(err.code(), "INVALID_PHASE");
        session.update_settings(Some(60), None, None).unwrap();
        assert_eq!(session.remaining_seconds, 30);
    }

    #[test]
    fn test_snapshot_hides_answers_while_playing() {
        let (mut session, ids) = session_with(&["Ada"], SessionSettings::default());
        session.begin(vec![prompt("Q", &["secret"])]).unwrap();
        session.submit(&ids[0], "guess").unwrap();

        let snap = session.snapshot();
        assert!(snap.answer_groups.is_empty());
        assert!(snap.prompt.as_ref().unwrap().accepted_answers.is_none());
        assert!(snap.roster[0].has_answered);
        assert_eq!(snap.answers_received, 1);

        session.close_prompt();
        let snap = session.snapshot();
        assert_eq!(snap.answer_groups.len(), 1);
        assert_eq!(
            snap.prompt.unwrap().accepted_answers,
            Some(vec!["secret".to_string()])
        );
    }
}

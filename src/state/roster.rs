//! Participant identity, liveness and seat management for one session.

use crate::error::{SessionError, SessionResult};
use crate::types::{ConnectionId, ParticipantId, Phase};
use std::collections::HashMap;
use std::time::{Duration, Instant};

const MAX_NAME_CHARS: usize = 32;

#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    /// Current transport connection; None while dropped
    pub connection: Option<ConnectionId>,
    pub last_seen: Instant,
    pub disconnected_at: Option<Instant>,
    pub score: u32,
    pub last_points: Option<u32>,
}

impl Participant {
    /// Bind to `connection`, returning the connection it replaced
    fn bind(&mut self, connection: &str, now: Instant) -> Option<ConnectionId> {
        let previous = self.connection.replace(connection.to_string());
        self.last_seen = now;
        self.disconnected_at = None;
        previous.filter(|c| c != connection)
    }

    pub fn is_bound_to(&self, connection: &str) -> bool {
        self.connection.as_deref() == Some(connection)
    }

    /// Connected and heard from within the heartbeat timeout
    pub fn is_live(&self, now: Instant, heartbeat_timeout: Duration) -> bool {
        self.connection.is_some() && now.duration_since(self.last_seen) <= heartbeat_timeout
    }
}

#[derive(Debug, Clone)]
pub struct HostSeat {
    pub name: String,
    pub connection: Option<ConnectionId>,
    pub last_seen: Instant,
    pub disconnected_at: Option<Instant>,
}

impl HostSeat {
    pub fn new(name: String, connection: &str, now: Instant) -> Self {
        Self {
            name,
            connection: Some(connection.to_string()),
            last_seen: now,
            disconnected_at: None,
        }
    }

    pub fn is_live(&self, now: Instant, heartbeat_timeout: Duration) -> bool {
        self.connection.is_some() && now.duration_since(self.last_seen) <= heartbeat_timeout
    }
}

/// Result of admitting a connection under a display name
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// New roster entry
    Joined(ParticipantId),
    /// Existing seat re-bound to a new connection
    Resumed {
        participant_id: ParticipantId,
        roster_changed: bool,
        /// Connection that held the seat until now
        superseded: Option<ConnectionId>,
    },
    /// The host reclaimed their seat
    Host,
}

/// Session conditions an admission is judged against
#[derive(Debug, Clone, Copy)]
pub struct Gate {
    pub phase: Phase,
    /// 0 means unlimited
    pub max_players: u32,
    pub now: Instant,
    pub heartbeat_timeout: Duration,
}

#[derive(Debug, Default)]
pub struct Roster {
    participants: Vec<Participant>,
    /// Scores of seats removed after the grace period, restorable by id and name
    retired: HashMap<ParticipantId, (String, u32)>,
}

pub fn validate_name(name: &str) -> SessionResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SessionError::InvalidRequest(
            "Display name must not be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_NAME_CHARS {
        return Err(SessionError::InvalidRequest(format!(
            "Display name must be at most {} characters",
            MAX_NAME_CHARS
        )));
    }
    Ok(trimmed.to_string())
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

impl Roster {
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Participant> {
        self.participants.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }

    pub fn connected(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.connection.is_some())
    }

    /// Admit a connection as host or participant
    ///
    /// Waiting sessions accept new names. Running sessions only re-associate
    /// a known seat, by logical id or by a name whose connection is dead.
    pub fn admit(
        &mut self,
        host: &mut HostSeat,
        name: &str,
        logical_id: Option<&str>,
        connection: &str,
        gate: Gate,
    ) -> SessionResult<Admission> {
        let name = validate_name(name)?;
        let now = gate.now;

        if same_name(&name, &host.name) {
            let displaced = host.connection.as_deref() != Some(connection)
                && host.is_live(now, gate.heartbeat_timeout);
            if displaced {
                return Err(SessionError::DuplicateName);
            }
            host.connection = Some(connection.to_string());
            host.last_seen = now;
            host.disconnected_at = None;
            return Ok(Admission::Host);
        }

        // Same logical identity: the newest connection wins
        if let Some(id) = logical_id.filter(|id| !id.is_empty()) {
            if let Some(p) = self
                .participants
                .iter_mut()
                .find(|p| p.id == id && same_name(&p.name, &name))
            {
                let superseded = p.bind(connection, now);
                return Ok(Admission::Resumed {
                    participant_id: p.id.clone(),
                    roster_changed: false,
                    superseded,
                });
            }
        }

        // Same name: only a verified-dead connection may be replaced
        if let Some(p) = self
            .participants
            .iter_mut()
            .find(|p| same_name(&p.name, &name))
        {
            if p.connection.as_deref() != Some(connection)
                && p.is_live(now, gate.heartbeat_timeout)
            {
                return Err(SessionError::DuplicateName);
            }
            let superseded = p.bind(connection, now);
            return Ok(Admission::Resumed {
                participant_id: p.id.clone(),
                roster_changed: false,
                superseded,
            });
        }

        let capacity_reached =
            gate.max_players > 0 && self.participants.len() >= gate.max_players as usize;

        // A seat that expired during the grace period comes back with its score
        if let Some(id) = logical_id {
            if self
                .retired
                .get(id)
                .is_some_and(|(retired_name, _)| same_name(retired_name, &name))
            {
                if capacity_reached {
                    return Err(SessionError::Full);
                }
                let (_, score) = self.retired.remove(id).unwrap_or_default();
                self.participants
                    .push(new_participant(id.to_string(), name, connection, now, score));
                return Ok(Admission::Resumed {
                    participant_id: id.to_string(),
                    roster_changed: true,
                    superseded: None,
                });
            }
        }

        if gate.phase != Phase::Waiting {
            return Err(SessionError::AlreadyStarted);
        }
        if capacity_reached {
            return Err(SessionError::Full);
        }

        let id = match logical_id {
            Some(id) if !id.is_empty() && self.get(id).is_none() && !self.retired.contains_key(id) => {
                id.to_string()
            }
            _ => ulid::Ulid::new().to_string(),
        };
        self.participants
            .push(new_participant(id.clone(), name, connection, now, 0));
        Ok(Admission::Joined(id))
    }

    /// Mark a seat dropped if `connection` still owns it
    pub fn disconnect(&mut self, id: &str, connection: &str, now: Instant) -> bool {
        match self.get_mut(id) {
            Some(p) if p.is_bound_to(connection) => {
                p.connection = None;
                p.disconnected_at = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Remove a seat immediately (leave or kick); the score is not retained
    pub fn remove(&mut self, id: &str) -> Option<Participant> {
        let index = self.participants.iter().position(|p| p.id == id)?;
        Some(self.participants.remove(index))
    }

    /// Remove seats dropped for longer than `grace`, keeping their scores for a later resume
    pub fn expire(&mut self, now: Instant, grace: Duration) -> Vec<Participant> {
        let (expired, kept): (Vec<_>, Vec<_>) =
            self.participants.drain(..).partition(|p| {
                p.disconnected_at
                    .is_some_and(|t| now.duration_since(t) >= grace)
            });
        self.participants = kept;
        for p in &expired {
            self.retired.insert(p.id.clone(), (p.name.clone(), p.score));
        }
        expired
    }

    /// Credit points to a seat, including one that has already expired
    pub fn add_points(&mut self, id: &str, points: u32) {
        if let Some(p) = self.get_mut(id) {
            p.score += points;
        } else if let Some((_, score)) = self.retired.get_mut(id) {
            *score += points;
        }
    }

    /// Latest disconnect among seats when nobody is connected
    pub fn all_dropped_since(&self) -> Option<Option<Instant>> {
        if self.participants.iter().any(|p| p.connection.is_some()) {
            return None;
        }
        Some(self.participants.iter().filter_map(|p| p.disconnected_at).max())
    }
}

fn new_participant(
    id: ParticipantId,
    name: String,
    connection: &str,
    now: Instant,
    score: u32,
) -> Participant {
    Participant {
        id,
        name,
        connection: Some(connection.to_string()),
        last_seen: now,
        disconnected_at: None,
        score,
        last_points: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEARTBEAT: Duration = Duration::from_secs(15);

    fn gate(phase: Phase, max_players: u32, now: Instant) -> Gate {
        Gate {
            phase,
            max_players,
            now,
            heartbeat_timeout: HEARTBEAT,
        }
    }

    fn setup() -> (Roster, HostSeat, Instant) {
        let now = Instant::now();
        (Roster::default(), HostSeat::new("Quizmaster".into(), "host-conn", now), now)
    }

    #[test]
    fn test_join_and_duplicate_live_name() {
        let (mut roster, mut host, now) = setup();
        let joined = roster
            .admit(&mut host, "Ada", None, "c1", gate(Phase::Waiting, 0, now))
            .unwrap();
        assert!(matches!(joined, Admission::Joined(_)));

        let err = roster
            .admit(&mut host, " ada ", None, "c2", gate(Phase::Waiting, 0, now))
            .unwrap_err();
        assert_eq!(err, SessionError::DuplicateName);
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_stale_name_is_rebound() {
        let (mut roster, mut host, now) = setup();
        let Admission::Joined(id) = roster
            .admit(&mut host, "Ada", None, "c1", gate(Phase::Waiting, 0, now))
            .unwrap()
        else {
            panic!("expected join");
        };

        // silent for longer than the heartbeat timeout
        let later = now + HEARTBEAT + Duration::from_secs(1);
        let outcome = roster
            .admit(&mut host, "Ada", None, "c2", gate(Phase::Playing, 0, later))
            .unwrap();
        assert_eq!(
            outcome,
            Admission::Resumed {
                participant_id: id.clone(),
                roster_changed: false,
                superseded: Some("c1".to_string()),
            }
        );
        assert_eq!(roster.get(&id).unwrap().connection.as_deref(), Some("c2"));
    }

    #[test]
    fn test_host_is_not_added_to_roster() {
        let (mut roster, mut host, now) = setup();
        host.connection = None;
        let outcome = roster
            .admit(&mut host, "quizmaster", None, "c9", gate(Phase::Playing, 0, now))
            .unwrap();
        assert_eq!(outcome, Admission::Host);
        assert!(roster.is_empty());
        assert_eq!(host.connection.as_deref(), Some("c9"));
    }

    #[test]
    fn test_capacity_and_already_started() {
        let (mut roster, mut host, now) = setup();
        roster
            .admit(&mut host, "Ada", None, "c1", gate(Phase::Waiting, 1, now))
            .unwrap();
        let err = roster
            .admit(&mut host, "Bob", None, "c2", gate(Phase::Waiting, 1, now))
            .unwrap_err();
        assert_eq!(err, SessionError::Full);

        let err = roster
            .admit(&mut host, "Cy", None, "c3", gate(Phase::Playing, 0, now))
            .unwrap_err();
        assert_eq!(err, SessionError::AlreadyStarted);
    }

    #[test]
    fn test_expired_seat_restores_score() {
        let (mut roster, mut host, now) = setup();
        roster
            .admit(&mut host, "Ada", Some("ada-id"), "c1", gate(Phase::Waiting, 0, now))
            .unwrap();
        roster.add_points("ada-id", 7);
        assert!(roster.disconnect("ada-id", "c1", now));

        let expired = roster.expire(now + Duration::from_secs(31), Duration::from_secs(30));
        assert_eq!(expired.len(), 1);
        assert!(roster.is_empty());

        roster.add_points("ada-id", 3);
        let outcome = roster
            .admit(&mut host, "Ada", Some("ada-id"), "c2", gate(Phase::Scoring, 0, now))
            .unwrap();
        assert_eq!(
            outcome,
            Admission::Resumed {
                participant_id: "ada-id".to_string(),
                roster_changed: true,
                superseded: None,
            }
        );
        assert_eq!(roster.get("ada-id").unwrap().score, 10);
    }

    #[test]
    fn test_disconnect_ignores_old_connection() {
        let (mut roster, mut host, now) = setup();
        roster
            .admit(&mut host, "Ada", Some("ada-id"), "c1", gate(Phase::Waiting, 0, now))
            .unwrap();
        roster
            .admit(&mut host, "Ada", Some("ada-id"), "c2", gate(Phase::Waiting, 0, now))
            .unwrap();

        assert!(!roster.disconnect("ada-id", "c1", now));
        assert_eq!(roster.connected().count(), 1);
    }
}

//! Match state machine - rounds, knockouts and per-participant state
//!
//! A `BoxingMatch` holds no synchronization of its own. Callers serialize
//! access (see `registry::MatchHandle`) and pass the current time in, so
//! progression only happens when a batch is processed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, trace};
use uuid::Uuid;

use super::combat::{CombatResolver, Resolution};
use super::moves::{MoveEvent, MoveKind};
use super::snapshot::MatchSnapshot;

/// Starting and per-round health
pub const MAX_HEALTH: u32 = 100;
/// Bonus for the fighter left standing after a knockout
pub const KNOCKOUT_BONUS: u32 = 50;
/// Bonus for the top-ranked fighter at the end of a round
pub const ROUND_WIN_BONUS: u32 = 25;

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPhase {
    /// Registered, not started
    Waiting,
    /// Rounds in progress
    Playing,
    /// Temporarily halted
    Paused,
    /// Terminal
    Finished,
}

/// Defensive stance. Exactly one holds at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Posture {
    #[default]
    Neutral,
    Blocking,
    Dodging,
}

/// Participant state in a match (authoritative)
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: String,
    pub display_name: String,
    pub health: u32,
    pub score: u32,
    pub last_move: Option<MoveKind>,
    pub last_move_timestamp: Option<f64>,
    pub posture: Posture,
}

impl Participant {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            health: MAX_HEALTH,
            score: 0,
            last_move: None,
            last_move_timestamp: None,
            posture: Posture::Neutral,
        }
    }

    /// Full reset at match start
    fn reset_for_match(&mut self) {
        self.health = MAX_HEALTH;
        self.score = 0;
        self.last_move = None;
        self.last_move_timestamp = None;
        self.posture = Posture::Neutral;
    }

    /// Between rounds score and last move carry over
    fn reset_for_round(&mut self) {
        self.health = MAX_HEALTH;
        self.posture = Posture::Neutral;
    }
}

/// Round structure for a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRules {
    pub max_rounds: u32,
    pub round_duration_secs: u32,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            round_duration_secs: 180,
        }
    }
}

/// Match errors. A failed operation never changes match state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("At least one participant is required to start the match")]
    InsufficientParticipants,

    #[error("Unrecognized move: {0}")]
    UnrecognizedMove(String),

    #[error("Move event has no actor")]
    MissingActor,

    #[error("Participant already registered: {0}")]
    DuplicateParticipant(String),

    #[error("Unknown participant: {0}")]
    UnknownParticipant(String),
}

impl MatchError {
    /// Stable machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            MatchError::InsufficientParticipants => "insufficient_participants",
            MatchError::UnrecognizedMove(_) => "unrecognized_move",
            MatchError::MissingActor => "missing_actor",
            MatchError::DuplicateParticipant(_) => "duplicate_participant",
            MatchError::UnknownParticipant(_) => "unknown_participant",
        }
    }
}

/// The authoritative boxing match
#[derive(Debug, Clone)]
pub struct BoxingMatch {
    id: Uuid,
    rules: MatchRules,
    phase: MatchPhase,
    current_round: u32,
    /// Insertion order, used for display and knockout scanning
    participants: Vec<Participant>,
    /// Start of the current round
    match_start_timestamp: Option<f64>,
    last_update_timestamp: Option<f64>,
}

impl BoxingMatch {
    pub fn new(id: Uuid, rules: MatchRules) -> Self {
        Self {
            id,
            rules,
            phase: MatchPhase::Waiting,
            current_round: 1,
            participants: Vec::new(),
            match_start_timestamp: None,
            last_update_timestamp: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn rules(&self) -> MatchRules {
        self.rules
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn match_start_timestamp(&self) -> Option<f64> {
        self.match_start_timestamp
    }

    pub fn last_update_timestamp(&self) -> Option<f64> {
        self.last_update_timestamp
    }

    // ------------------------------------------------------------------------
    // Participant management
    // ------------------------------------------------------------------------

    /// Register a new participant at full health
    pub fn register(
        &mut self,
        id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Result<Participant, MatchError> {
        let id = id.into();
        if self.participant(&id).is_some() {
            return Err(MatchError::DuplicateParticipant(id));
        }

        let participant = Participant::new(id, display_name);
        info!(
            match_id = %self.id,
            participant_id = %participant.id,
            name = %participant.display_name,
            "Participant registered"
        );
        self.participants.push(participant.clone());
        Ok(participant)
    }

    /// Remove a participant, false if unknown
    pub fn deregister(&mut self, id: &str) -> bool {
        let Some(pos) = self.participants.iter().position(|p| p.id == id) else {
            return false;
        };

        let removed = self.participants.remove(pos);
        info!(
            match_id = %self.id,
            participant_id = %removed.id,
            "Participant removed"
        );
        true
    }

    // ------------------------------------------------------------------------
    // Phase transitions
    // ------------------------------------------------------------------------

    /// Start (or restart) the match from round 1
    pub fn start(&mut self, now: f64) -> Result<MatchSnapshot, MatchError> {
        if self.participants.is_empty() {
            return Err(MatchError::InsufficientParticipants);
        }

        for participant in &mut self.participants {
            participant.reset_for_match();
        }
        self.current_round = 1;
        self.match_start_timestamp = Some(now);
        self.phase = MatchPhase::Playing;

        info!(
            match_id = %self.id,
            participants = self.participants.len(),
            "Match started"
        );
        Ok(self.snapshot())
    }

    /// Halt a match in progress; no-op from any other phase
    pub fn pause(&mut self) -> MatchSnapshot {
        if self.phase == MatchPhase::Playing {
            self.phase = MatchPhase::Paused;
            info!(match_id = %self.id, "Match paused");
        }
        self.snapshot()
    }

    /// Continue a paused match; no-op from any other phase
    pub fn resume(&mut self) -> MatchSnapshot {
        if self.phase == MatchPhase::Paused {
            self.phase = MatchPhase::Playing;
            info!(match_id = %self.id, "Match resumed");
        }
        self.snapshot()
    }

    /// Force the match to its terminal phase
    pub fn finish(&mut self) -> MatchSnapshot {
        self.phase = MatchPhase::Finished;
        info!(match_id = %self.id, round = self.current_round, "Match finished");
        self.snapshot()
    }

    /// Back to a fresh, empty waiting match
    pub fn reset(&mut self) -> MatchSnapshot {
        self.phase = MatchPhase::Waiting;
        self.participants.clear();
        self.current_round = 1;
        self.match_start_timestamp = None;
        self.last_update_timestamp = None;
        info!(match_id = %self.id, "Match reset");
        self.snapshot()
    }

    // ------------------------------------------------------------------------
    // Tick processing
    // ------------------------------------------------------------------------

    /// Apply a batch of move events in order, then run the knockout and round
    /// timer checks. Outside `Playing` nothing changes.
    pub fn process_batch(&mut self, events: &[MoveEvent], now: f64) -> MatchSnapshot {
        if self.phase != MatchPhase::Playing {
            return self.snapshot();
        }

        self.last_update_timestamp = Some(now);

        for event in events {
            let resolution = self.apply_event(event);
            trace!(match_id = %self.id, actor_id = %event.actor_id, %resolution, "Event applied");
        }

        if !self.check_knockout() {
            self.check_round_timer(now);
        }

        self.snapshot()
    }

    /// Resolve a single event against the participants
    pub fn apply_event(&mut self, event: &MoveEvent) -> Resolution {
        CombatResolver::resolve(&mut self.participants, event)
    }

    /// Finish the match if anyone is down. Returns true on knockout.
    fn check_knockout(&mut self) -> bool {
        let Some(down_index) = self.participants.iter().position(|p| p.health == 0) else {
            return false;
        };

        let down_id = self.participants[down_index].id.clone();
        info!(match_id = %self.id, participant_id = %down_id, "Knockout");

        // Winner is the first other participant in registration order
        if let Some(winner) = self.participants.iter_mut().find(|p| p.id != down_id) {
            winner.score = winner.score.saturating_add(KNOCKOUT_BONUS);
            info!(match_id = %self.id, participant_id = %winner.id, "Win by knockout");
        }

        self.phase = MatchPhase::Finished;
        true
    }

    /// End the round once its duration has elapsed
    fn check_round_timer(&mut self, now: f64) {
        let Some(round_start) = self.match_start_timestamp else {
            return;
        };

        if now - round_start >= self.rules.round_duration_secs as f64 {
            self.end_round(now);
        }
    }

    fn end_round(&mut self, now: f64) {
        if self.participants.len() >= 2 {
            // Stable: ties on both keys keep insertion order
            let mut ranking: Vec<usize> = (0..self.participants.len()).collect();
            ranking.sort_by(|&a, &b| {
                let (pa, pb) = (&self.participants[a], &self.participants[b]);
                pb.health.cmp(&pa.health).then(pb.score.cmp(&pa.score))
            });

            let winner = &mut self.participants[ranking[0]];
            winner.score = winner.score.saturating_add(ROUND_WIN_BONUS);
            info!(
                match_id = %self.id,
                round = self.current_round,
                participant_id = %winner.id,
                "Round won"
            );
        }

        self.current_round += 1;

        if self.current_round > self.rules.max_rounds {
            self.phase = MatchPhase::Finished;
            info!(match_id = %self.id, "All rounds completed");
            return;
        }

        for participant in &mut self.participants {
            participant.reset_for_round();
        }
        self.match_start_timestamp = Some(now);
        info!(match_id = %self.id, round = self.current_round, "Round started");
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Immutable copy of the full match state
    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot::from_match(self)
    }

    /// Participant id -> score
    pub fn scores(&self) -> BTreeMap<String, u32> {
        self.participants
            .iter()
            .map(|p| (p.id.clone(), p.score))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_fighters() -> BoxingMatch {
        let mut m = BoxingMatch::new(Uuid::nil(), MatchRules::default());
        m.register("P1", "Player One").unwrap();
        m.register("P2", "Player Two").unwrap();
        m
    }

    fn started() -> BoxingMatch {
        let mut m = two_fighters();
        m.start(0.0).unwrap();
        m
    }

    fn hit(actor: &str, kind: MoveKind, confidence: f64) -> MoveEvent {
        MoveEvent::new(actor, kind, confidence, 1.0)
    }

    fn health(m: &BoxingMatch, id: &str) -> u32 {
        m.participant(id).unwrap().health
    }

    fn score(m: &BoxingMatch, id: &str) -> u32 {
        m.participant(id).unwrap().score
    }

    #[test]
    fn test_register_then_snapshot() {
        let mut m = BoxingMatch::new(Uuid::nil(), MatchRules::default());
        let p = m.register("P1", "Player One").unwrap();
        assert_eq!(p.health, MAX_HEALTH);

        let snap = m.snapshot();
        assert_eq!(snap.phase, MatchPhase::Waiting);
        assert_eq!(snap.participants.len(), 1);
        let p = &snap.participants[0];
        assert_eq!((p.health, p.score, p.is_blocking, p.is_dodging), (100, 0, false, false));
        assert_eq!(p.name, "Player One");
    }

    #[test]
    fn test_register_duplicate_rejected() {
        let mut m = two_fighters();
        assert_eq!(
            m.register("P1", "Again"),
            Err(MatchError::DuplicateParticipant("P1".to_string()))
        );
        assert_eq!(m.participants().len(), 2);
    }

    #[test]
    fn test_deregister() {
        let mut m = two_fighters();
        assert!(m.deregister("P1"));
        assert!(!m.deregister("P1"));
        assert_eq!(m.participants().len(), 1);
    }

    #[test]
    fn test_start_requires_participants() {
        let mut m = BoxingMatch::new(Uuid::nil(), MatchRules::default());
        assert_eq!(m.start(0.0), Err(MatchError::InsufficientParticipants));
        assert_eq!(m.phase(), MatchPhase::Waiting);
        assert_eq!(m.match_start_timestamp(), None);
    }

    #[test]
    fn test_scenario_a_start() {
        let mut m = two_fighters();
        let snap = m.start(10.0).unwrap();

        assert_eq!(snap.phase, MatchPhase::Playing);
        assert_eq!(snap.current_round, 1);
        assert_eq!(snap.match_start_timestamp, Some(10.0));
        for p in &snap.participants {
            assert_eq!((p.health, p.score), (100, 0));
        }
    }

    #[test]
    fn test_start_resets_participants() {
        let mut m = started();
        m.process_batch(&[hit("P1", MoveKind::Jab, 0.9), hit("P2", MoveKind::Block, 0.9)], 1.0);
        m.finish();

        m.start(50.0).unwrap();
        for p in m.participants() {
            assert_eq!(p.health, MAX_HEALTH);
            assert_eq!(p.score, 0);
            assert_eq!(p.posture, Posture::Neutral);
            assert_eq!(p.last_move, None);
            assert_eq!(p.last_move_timestamp, None);
        }
    }

    #[test]
    fn test_scenario_b_jab() {
        let mut m = started();
        m.process_batch(&[hit("P1", MoveKind::Jab, 0.9)], 1.0);

        assert_eq!(health(&m, "P2"), 91);
        assert_eq!(score(&m, "P1"), 9);
    }

    #[test]
    fn test_scenario_c_blocked_hook() {
        let mut m = started();
        m.process_batch(
            &[hit("P2", MoveKind::Block, 0.9), hit("P1", MoveKind::Hook, 1.0)],
            1.0,
        );

        assert_eq!(health(&m, "P2"), 86);
        assert_eq!(score(&m, "P1"), 14);
        let snap = m.snapshot();
        assert!(snap.participants[1].is_blocking);
    }

    #[test]
    fn test_scenario_d_knockout() {
        let mut m = started();
        m.process_batch(&[hit("P2", MoveKind::Jab, 0.5)], 1.0);
        let p2_before = score(&m, "P2");

        // 4 uppercuts at full confidence = 100 damage
        let combo = vec![hit("P2", MoveKind::Uppercut, 1.0); 4];
        let snap = m.process_batch(&combo, 2.0);

        assert_eq!(health(&m, "P1"), 0);
        assert_eq!(snap.phase, MatchPhase::Finished);
        assert_eq!(score(&m, "P2"), p2_before + 100 + KNOCKOUT_BONUS);
    }

    #[test]
    fn test_knockout_short_circuits_round_timer() {
        let mut m = started();
        let combo = vec![hit("P1", MoveKind::Uppercut, 1.0); 4];
        let snap = m.process_batch(&combo, 500.0);

        assert_eq!(snap.phase, MatchPhase::Finished);
        assert_eq!(snap.current_round, 1);
        assert_eq!(health(&m, "P2"), 0);
        // No round bonus on top of damage and knockout
        assert_eq!(score(&m, "P1"), 100 + KNOCKOUT_BONUS);
    }

    #[test]
    fn test_scenario_e_round_end() {
        let mut m = started();
        {
            let p1 = &mut m.participants[0];
            p1.health = 80;
            p1.score = 50;
            p1.posture = Posture::Blocking;
            let p2 = &mut m.participants[1];
            p2.health = 80;
            p2.score = 40;
        }

        let snap = m.process_batch(&[], 180.0);

        assert_eq!(snap.phase, MatchPhase::Playing);
        assert_eq!(snap.current_round, 2);
        assert_eq!(score(&m, "P1"), 75);
        assert_eq!(score(&m, "P2"), 40);
        assert_eq!(health(&m, "P1"), 100);
        assert_eq!(health(&m, "P2"), 100);
        assert_eq!(m.participants[0].posture, Posture::Neutral);
        assert_eq!(m.match_start_timestamp(), Some(180.0));
    }

    #[test]
    fn test_round_ranking_prefers_health() {
        let mut m = started();
        m.participants[0].health = 60;
        m.participants[0].score = 90;
        m.participants[1].health = 70;
        m.participants[1].score = 10;

        m.process_batch(&[], 200.0);
        assert_eq!(score(&m, "P2"), 35);
        assert_eq!(score(&m, "P1"), 90);
    }

    #[test]
    fn test_round_not_over_before_duration() {
        let mut m = started();
        let snap = m.process_batch(&[], 179.9);
        assert_eq!(snap.current_round, 1);
        assert_eq!(snap.last_update_timestamp, Some(179.9));
    }

    #[test]
    fn test_final_round_finishes_match() {
        let mut m = started();
        m.process_batch(&[], 180.0);
        m.process_batch(&[], 360.0);
        let snap = m.process_batch(&[], 540.0);

        assert_eq!(snap.phase, MatchPhase::Finished);
        assert_eq!(snap.current_round, m.rules().max_rounds + 1);
    }

    #[test]
    fn test_late_tick_still_ends_round() {
        let mut m = started();
        let snap = m.process_batch(&[], 1_000.0);
        // Only one round ends per tick
        assert_eq!(snap.current_round, 2);
        assert_eq!(snap.match_start_timestamp, Some(1_000.0));
    }

    #[test]
    fn test_batch_ignored_unless_playing() {
        let mut m = two_fighters();
        let snap = m.process_batch(&[hit("P1", MoveKind::Cross, 1.0)], 1.0);
        assert_eq!(health(&m, "P2"), 100);
        assert_eq!(snap.last_update_timestamp, None);

        m.start(0.0).unwrap();
        m.pause();
        m.process_batch(&[hit("P1", MoveKind::Cross, 1.0)], 2.0);
        assert_eq!(health(&m, "P2"), 100);

        m.resume();
        m.process_batch(&[hit("P1", MoveKind::Cross, 1.0)], 3.0);
        assert_eq!(health(&m, "P2"), 85);
    }

    #[test]
    fn test_phase_transitions() {
        let mut m = two_fighters();
        assert_eq!(m.resume().phase, MatchPhase::Waiting);

        m.start(0.0).unwrap();
        assert_eq!(m.pause().phase, MatchPhase::Paused);
        assert_eq!(m.resume().phase, MatchPhase::Playing);
        assert_eq!(m.resume().phase, MatchPhase::Playing);

        assert_eq!(m.finish().phase, MatchPhase::Finished);
        assert_eq!(m.pause().phase, MatchPhase::Finished);
        assert_eq!(m.resume().phase, MatchPhase::Finished);
    }

    #[test]
    fn test_pause_before_start_is_noop() {
        let mut m = BoxingMatch::new(Uuid::nil(), MatchRules::default());
        assert_eq!(m.pause().phase, MatchPhase::Waiting);
        assert_eq!(m.resume().phase, MatchPhase::Waiting);

        m.register("P1", "Player One").unwrap();
        m.register("P2", "Player Two").unwrap();
        let snap = m.process_batch(&[], 10_000.0);
        assert_eq!(snap.phase, MatchPhase::Waiting);
        assert_eq!(snap.match_start_timestamp, None);
    }

    #[test]
    fn test_reset() {
        let mut m = started();
        m.process_batch(&[hit("P1", MoveKind::Jab, 1.0)], 5.0);

        let snap = m.reset();
        assert_eq!(snap.phase, MatchPhase::Waiting);
        assert!(snap.participants.is_empty());
        assert_eq!(snap.current_round, 1);
        assert_eq!(snap.match_start_timestamp, None);
        assert_eq!(snap.last_update_timestamp, None);
    }

    #[test]
    fn test_events_apply_left_to_right() {
        let mut m = started();
        // Hook lands before the dodge, jab is dodged
        m.process_batch(
            &[
                hit("P1", MoveKind::Hook, 1.0),
                hit("P2", MoveKind::Dodge, 0.7),
                hit("P1", MoveKind::Jab, 1.0),
            ],
            1.0,
        );
        assert_eq!(health(&m, "P2"), 80);
        assert_eq!(score(&m, "P1"), 20);
    }

    #[test]
    fn test_single_participant_punches_are_noops() {
        let mut m = BoxingMatch::new(Uuid::nil(), MatchRules::default());
        m.register("solo", "Solo").unwrap();
        m.start(0.0).unwrap();

        let snap = m.process_batch(&[hit("solo", MoveKind::Uppercut, 1.0)], 1.0);
        assert_eq!(snap.participants[0].score, 0);
        assert_eq!(snap.participants[0].health, 100);
        assert_eq!(snap.participants[0].last_move, Some(MoveKind::Uppercut));

        // Round end without a contest awards nothing
        let snap = m.process_batch(&[], 180.0);
        assert_eq!(snap.current_round, 2);
        assert_eq!(snap.participants[0].score, 0);
    }

    #[test]
    fn test_unknown_actor_dropped() {
        let mut m = started();
        let snap = m.process_batch(&[hit("ghost", MoveKind::Uppercut, 1.0)], 1.0);
        assert!(snap.participants.iter().all(|p| p.health == 100 && p.score == 0));
    }

    #[test]
    fn test_three_fighters_deterministic_opponent() {
        let mut m = BoxingMatch::new(Uuid::nil(), MatchRules::default());
        m.register("c", "C").unwrap();
        m.register("b", "B").unwrap();
        m.register("a", "A").unwrap();
        m.start(0.0).unwrap();

        m.process_batch(&[hit("c", MoveKind::Jab, 1.0), hit("a", MoveKind::Jab, 1.0)], 1.0);
        assert_eq!(health(&m, "a"), 90);
        assert_eq!(health(&m, "b"), 90);
        assert_eq!(health(&m, "c"), 100);
    }

    #[test]
    fn test_scores_table() {
        let mut m = started();
        m.process_batch(&[hit("P1", MoveKind::Cross, 1.0)], 1.0);
        let scores = m.scores();
        assert_eq!(scores.get("P1"), Some(&15));
        assert_eq!(scores.get("P2"), Some(&0));
    }

    #[test]
    fn test_custom_rules() {
        let rules = MatchRules {
            max_rounds: 1,
            round_duration_secs: 60,
        };
        let mut m = BoxingMatch::new(Uuid::nil(), rules);
        m.register("P1", "One").unwrap();
        m.register("P2", "Two").unwrap();
        m.start(0.0).unwrap();

        let snap = m.process_batch(&[], 60.0);
        assert_eq!(snap.phase, MatchPhase::Finished);
        assert_eq!(snap.round_duration_seconds, 60);
    }
}

//! Snapshot types - immutable match state for transport

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::moves::MoveKind;
use super::r#match::{BoxingMatch, MatchPhase, Participant, Posture};

/// Participant state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSnapshot {
    pub id: String,
    pub name: String,
    /// Health (0-100)
    pub health: u32,
    pub score: u32,
    pub last_move: Option<MoveKind>,
    pub last_move_timestamp: Option<f64>,
    /// Both false means neutral posture
    pub is_blocking: bool,
    pub is_dodging: bool,
}

impl From<&Participant> for ParticipantSnapshot {
    fn from(p: &Participant) -> Self {
        Self {
            id: p.id.clone(),
            name: p.display_name.clone(),
            health: p.health,
            score: p.score,
            last_move: p.last_move,
            last_move_timestamp: p.last_move_timestamp,
            is_blocking: p.posture == Posture::Blocking,
            is_dodging: p.posture == Posture::Dodging,
        }
    }
}

/// Full match state at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshot {
    pub match_id: Uuid,
    pub phase: MatchPhase,
    pub current_round: u32,
    pub max_rounds: u32,
    pub round_duration_seconds: u32,
    /// Registration order
    pub participants: Vec<ParticipantSnapshot>,
    pub match_start_timestamp: Option<f64>,
    pub last_update_timestamp: Option<f64>,
}

impl MatchSnapshot {
    pub fn from_match(game: &BoxingMatch) -> Self {
        let rules = game.rules();
        Self {
            match_id: game.id(),
            phase: game.phase(),
            current_round: game.current_round(),
            max_rounds: rules.max_rounds,
            round_duration_seconds: rules.round_duration_secs,
            participants: game.participants().iter().map(ParticipantSnapshot::from).collect(),
            match_start_timestamp: game.match_start_timestamp(),
            last_update_timestamp: game.last_update_timestamp(),
        }
    }
}

#[cfg(test)]
impl MatchSnapshot {
    pub fn participant(&self, id: &str) -> Option<&ParticipantSnapshot> {
        self.participants.iter().find(|p| p.id == id)
    }
}

//! Move vocabulary - the closed set of boxing moves and their combat tables

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::r#match::MatchError;

/// Every move the classifier can emit and the resolver can apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveKind {
    /// Straight punch with the lead hand
    Jab,
    /// Straight punch with the rear hand
    Cross,
    /// Horizontal punch
    Hook,
    /// Rising punch
    Uppercut,
    /// Raise the gloves
    Block,
    /// Lateral evasion
    Dodge,
    /// Return to a neutral guard
    Guard,
}

impl MoveKind {
    /// All kinds, in classifier evaluation order
    pub const ALL: [MoveKind; 7] = [
        MoveKind::Jab,
        MoveKind::Cross,
        MoveKind::Hook,
        MoveKind::Uppercut,
        MoveKind::Block,
        MoveKind::Dodge,
        MoveKind::Guard,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MoveKind::Jab => "jab",
            MoveKind::Cross => "cross",
            MoveKind::Hook => "hook",
            MoveKind::Uppercut => "uppercut",
            MoveKind::Block => "block",
            MoveKind::Dodge => "dodge",
            MoveKind::Guard => "guard",
        }
    }

    /// Defensive moves change posture and never deal damage
    pub fn is_defensive(self) -> bool {
        matches!(self, MoveKind::Block | MoveKind::Dodge | MoveKind::Guard)
    }

    /// Damage before confidence scaling
    pub fn base_damage(self) -> u32 {
        match self {
            MoveKind::Jab => 10,
            MoveKind::Cross => 15,
            MoveKind::Hook => 20,
            MoveKind::Uppercut => 25,
            MoveKind::Block | MoveKind::Dodge | MoveKind::Guard => 0,
        }
    }

    /// Fraction of damage that still lands against a blocking target
    pub fn block_effectiveness(self) -> f64 {
        match self {
            MoveKind::Jab => 0.3,
            MoveKind::Cross => 0.5,
            MoveKind::Hook => 0.7,
            MoveKind::Uppercut => 0.8,
            MoveKind::Block | MoveKind::Dodge | MoveKind::Guard => 0.0,
        }
    }
}

impl fmt::Display for MoveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MoveKind {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        MoveKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| MatchError::UnrecognizedMove(s.to_string()))
    }
}

/// A resolved move event, ready for the combat resolver
#[derive(Debug, Clone, PartialEq)]
pub struct MoveEvent {
    pub actor_id: String,
    pub kind: MoveKind,
    /// Detection confidence in `[0, 1]`
    pub confidence: f64,
    pub timestamp: f64,
}

impl MoveEvent {
    pub fn new(actor_id: impl Into<String>, kind: MoveKind, confidence: f64, timestamp: f64) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };

        Self {
            actor_id: actor_id.into(),
            kind,
            confidence,
            timestamp,
        }
    }
}

/// Move event as supplied by an external caller, with the kind still a string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMoveEvent {
    /// Acting participant; connections bound to a participant may omit it
    #[serde(default, alias = "playerId", alias = "player_id", alias = "actor_id")]
    pub actor_id: Option<String>,
    #[serde(alias = "move", alias = "move_kind")]
    pub move_kind: String,
    pub confidence: f64,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

impl RawMoveEvent {
    /// Resolve into a typed event. `default_actor` fills a missing actor id and
    /// `now` a missing timestamp.
    pub fn resolve(&self, default_actor: Option<&str>, now: f64) -> Result<MoveEvent, MatchError> {
        let kind: MoveKind = self.move_kind.parse()?;
        let actor = self
            .actor_id
            .as_deref()
            .or(default_actor)
            .ok_or(MatchError::MissingActor)?;

        Ok(MoveEvent::new(
            actor,
            kind,
            self.confidence,
            self.timestamp.unwrap_or(now),
        ))
    }
}

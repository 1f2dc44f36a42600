//! Combat resolution - damage, defensive posture, opponent selection

use std::fmt;

use tracing::{debug, warn};

use super::moves::{MoveEvent, MoveKind};
use super::r#match::{Participant, Posture, MAX_HEALTH};

/// What applying one move event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Actor is not registered; the event was dropped
    UnknownActor,
    /// Defensive move switched the actor's posture
    PostureChanged { posture: Posture },
    /// Offensive move with nobody to hit
    NoOpponent,
    /// Offensive move landed (possibly for 0 damage)
    Hit {
        target_id: String,
        damage: u32,
        target_health: u32,
    },
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::UnknownActor => f.write_str("unknown actor"),
            Resolution::PostureChanged { posture } => write!(f, "posture {:?}", posture),
            Resolution::NoOpponent => f.write_str("no opponent"),
            Resolution::Hit {
                target_id,
                damage,
                target_health,
            } => write!(f, "hit {} for {} ({} left)", target_id, damage, target_health),
        }
    }
}

/// Combat rules for turning move events into damage and posture
pub struct CombatResolver;

impl CombatResolver {
    /// Damage a move deals against a target in `target_posture`.
    ///
    /// `floor(base * confidence)`, floored again after the block factor.
    /// A dodging target takes nothing.
    pub fn calculate_damage(kind: MoveKind, confidence: f64, target_posture: Posture) -> u32 {
        let mut damage = (kind.base_damage() as f64 * confidence).floor().max(0.0);

        match target_posture {
            Posture::Blocking => {
                damage = (damage * kind.block_effectiveness()).floor();
            }
            Posture::Dodging => {
                damage = 0.0;
            }
            Posture::Neutral => {}
        }

        damage.max(0.0) as u32
    }

    /// Apply damage to health, returns (new_health, knocked_out)
    pub fn apply_damage(current_health: u32, damage: u32) -> (u32, bool) {
        let new_health = current_health.saturating_sub(damage).min(MAX_HEALTH);
        (new_health, new_health == 0)
    }

    /// Pick the opponent for `actor_index`: the other fighter in a two-person
    /// bout, otherwise the first other participant by id. `None` when the actor
    /// is alone.
    pub fn opponent_index(participants: &[Participant], actor_index: usize) -> Option<usize> {
        let actor_id = &participants.get(actor_index)?.id;
        participants
            .iter()
            .enumerate()
            .filter(|(_, p)| &p.id != actor_id)
            .min_by(|(_, a), (_, b)| a.id.cmp(&b.id))
            .map(|(idx, _)| idx)
    }

    /// Apply a single move event to the participant list
    pub fn resolve(participants: &mut [Participant], event: &MoveEvent) -> Resolution {
        let Some(actor_index) = participants.iter().position(|p| p.id == event.actor_id) else {
            warn!(actor_id = %event.actor_id, "Move event from unknown participant");
            return Resolution::UnknownActor;
        };

        {
            let actor = &mut participants[actor_index];
            actor.last_move = Some(event.kind);
            actor.last_move_timestamp = Some(event.timestamp);
        }

        if event.kind.is_defensive() {
            let posture = match event.kind {
                MoveKind::Block => Posture::Blocking,
                MoveKind::Dodge => Posture::Dodging,
                _ => Posture::Neutral,
            };
            participants[actor_index].posture = posture;
            debug!(actor_id = %event.actor_id, ?posture, "Posture changed");
            return Resolution::PostureChanged { posture };
        }

        let Some(target_index) = Self::opponent_index(participants, actor_index) else {
            return Resolution::NoOpponent;
        };

        let target = &mut participants[target_index];
        let damage = Self::calculate_damage(event.kind, event.confidence, target.posture);
        let (new_health, knocked_out) = Self::apply_damage(target.health, damage);
        target.health = new_health;
        let target_id = target.id.clone();

        let actor = &mut participants[actor_index];
        actor.score = actor.score.saturating_add(damage);

        debug!(
            actor_id = %event.actor_id,
            target_id = %target_id,
            kind = %event.kind,
            damage,
            target_health = new_health,
            knocked_out,
            "Punch resolved"
        );

        Resolution::Hit {
            target_id,
            damage,
            target_health: new_health,
        }
    }
}

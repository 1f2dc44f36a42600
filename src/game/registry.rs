//! Match registry - live matches and serialized access to each one
//!
//! Each `MatchHandle` owns its `BoxingMatch` behind a mutex, so every
//! mutation of one match runs to completion before the next begins. The
//! fresh snapshot is broadcast before the lock is released, so subscribers
//! see snapshots in mutation order.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::pose::{normalize_keypoints, DetectedMove, MoveClassifier, RawKeypoint};
use crate::util::time::unix_secs;

use super::moves::{MoveEvent, RawMoveEvent};
use super::r#match::{BoxingMatch, MatchError, MatchPhase, MatchRules, Participant};
use super::snapshot::MatchSnapshot;

/// Snapshot broadcast buffer per match
const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Handle to a live match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    game: Arc<Mutex<BoxingMatch>>,
    updates_tx: broadcast::Sender<MatchSnapshot>,
    classifier: Arc<MoveClassifier>,
}

/// Short listing entry for a match
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub phase: MatchPhase,
    pub current_round: u32,
    pub participant_count: usize,
}

impl MatchHandle {
    pub fn new(id: Uuid, rules: MatchRules, classifier: Arc<MoveClassifier>) -> Self {
        let (updates_tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            id,
            created_at: Utc::now(),
            game: Arc::new(Mutex::new(BoxingMatch::new(id, rules))),
            updates_tx,
            classifier,
        }
    }

    /// Receive a snapshot after every mutation of this match
    pub fn subscribe(&self) -> broadcast::Receiver<MatchSnapshot> {
        self.updates_tx.subscribe()
    }

    /// Call with the match lock held
    fn publish(&self, snapshot: &MatchSnapshot) {
        // No subscribers is fine
        let _ = self.updates_tx.send(snapshot.clone());
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        self.game.lock().snapshot()
    }

    pub fn scores(&self) -> BTreeMap<String, u32> {
        self.game.lock().scores()
    }

    pub fn participant_count(&self) -> usize {
        self.game.lock().participants().len()
    }

    pub fn has_participant(&self, id: &str) -> bool {
        self.game.lock().participant(id).is_some()
    }

    pub fn summary(&self) -> MatchSummary {
        let game = self.game.lock();
        MatchSummary {
            id: self.id,
            created_at: self.created_at,
            phase: game.phase(),
            current_round: game.current_round(),
            participant_count: game.participants().len(),
        }
    }

    pub fn register(&self, id: &str, name: &str) -> Result<Participant, MatchError> {
        let mut game = self.game.lock();
        let participant = game.register(id, name)?;
        self.publish(&game.snapshot());
        Ok(participant)
    }

    pub fn deregister(&self, id: &str) -> bool {
        let mut game = self.game.lock();
        let removed = game.deregister(id);
        if removed {
            self.publish(&game.snapshot());
        }
        removed
    }

    pub fn start(&self) -> Result<MatchSnapshot, MatchError> {
        let mut game = self.game.lock();
        let snapshot = game.start(unix_secs())?;
        self.publish(&snapshot);
        Ok(snapshot)
    }

    pub fn pause(&self) -> MatchSnapshot {
        self.mutate(BoxingMatch::pause)
    }

    pub fn resume(&self) -> MatchSnapshot {
        self.mutate(BoxingMatch::resume)
    }

    pub fn finish(&self) -> MatchSnapshot {
        self.mutate(BoxingMatch::finish)
    }

    pub fn reset(&self) -> MatchSnapshot {
        self.mutate(BoxingMatch::reset)
    }

    fn mutate(&self, op: impl FnOnce(&mut BoxingMatch) -> MatchSnapshot) -> MatchSnapshot {
        let mut game = self.game.lock();
        let snapshot = op(&mut *game);
        self.publish(&snapshot);
        snapshot
    }

    /// Classify one telemetry frame for `actor_id` and feed the detected
    /// moves through the match as a single batch.
    pub fn submit_pose(
        &self,
        actor_id: &str,
        keypoints: &[RawKeypoint],
    ) -> (Vec<DetectedMove>, MatchSnapshot) {
        let now = unix_secs();
        let frame = normalize_keypoints(keypoints);
        let detected = self.classifier.classify(&frame, now);

        let events: Vec<MoveEvent> = detected
            .iter()
            .map(|d| MoveEvent::new(actor_id, d.kind, d.confidence, d.timestamp))
            .collect();

        debug!(
            match_id = %self.id,
            actor_id,
            detected = events.len(),
            "Pose classified"
        );

        let mut game = self.game.lock();
        let snapshot = game.process_batch(&events, now);
        self.publish(&snapshot);
        (detected, snapshot)
    }

    /// Apply externally supplied move events. The whole batch is validated
    /// first; any unrecognized move rejects it without touching the match.
    pub fn submit_actions(
        &self,
        default_actor: Option<&str>,
        actions: &[RawMoveEvent],
    ) -> Result<MatchSnapshot, MatchError> {
        let now = unix_secs();
        let events = actions
            .iter()
            .map(|raw| raw.resolve(default_actor, now))
            .collect::<Result<Vec<_>, _>>()?;

        let mut game = self.game.lock();
        let snapshot = game.process_batch(&events, now);
        self.publish(&snapshot);
        Ok(snapshot)
    }
}

/// Registry of all live matches
pub struct MatchRegistry {
    matches: DashMap<Uuid, MatchHandle>,
    rules: MatchRules,
    classifier: Arc<MoveClassifier>,
}

impl MatchRegistry {
    pub fn new(rules: MatchRules, classifier: MoveClassifier) -> Self {
        Self {
            matches: DashMap::new(),
            rules,
            classifier: Arc::new(classifier),
        }
    }

    /// Create and register a new waiting match
    pub fn create(&self) -> MatchHandle {
        let handle = MatchHandle::new(Uuid::new_v4(), self.rules, self.classifier.clone());
        self.matches.insert(handle.id, handle.clone());
        info!(match_id = %handle.id, "Created new match");
        handle
    }

    pub fn get(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    pub fn remove(&self, id: &Uuid) -> Option<MatchHandle> {
        let removed = self.matches.remove(id).map(|(_, h)| h);
        if removed.is_some() {
            info!(match_id = %id, "Match removed from registry");
        }
        removed
    }

    /// Summaries, oldest first
    pub fn list(&self) -> Vec<MatchSummary> {
        let mut summaries: Vec<MatchSummary> =
            self.matches.iter().map(|m| m.value().summary()).collect();
        summaries.sort_by_key(|s| s.created_at);
        summaries
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn total_participants(&self) -> usize {
        self.matches
            .iter()
            .map(|m| m.value().participant_count())
            .sum()
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new(MatchRules::default(), MoveClassifier::default())
    }
}

//! Move classifier - geometric boxing-move detection over a pose frame
//!
//! Coordinates are normalized image space: +x is forward/lateral and smaller
//! y is higher in frame. Each detector returns either one of its fixed
//! confidence constants or 0; only the straight punches scale with the arm
//! extension ratio.

use serde::{Deserialize, Serialize};

use crate::game::MoveKind;

use super::normalize::{
    Landmark, PoseFrame, LEFT_ELBOW, LEFT_HIP, LEFT_SHOULDER, LEFT_WRIST, RIGHT_ELBOW, RIGHT_HIP,
    RIGHT_SHOULDER, RIGHT_WRIST,
};

/// Extension ratio a straight punch must exceed
const STRAIGHT_PUNCH_EXTENSION: f64 = 0.8;
/// Minimum wrist/shoulder horizontal offset for a hook
const HOOK_REACH: f64 = 0.3;
/// How far behind the shoulder an uppercut wrist may sit
const UPPERCUT_SLACK: f64 = 0.2;
/// Maximum wrist/shoulder horizontal offset for a blocking glove
const BLOCK_WIDTH: f64 = 0.3;
/// Shoulder or hip spread that reads as a lateral dodge
const DODGE_SPREAD: f64 = 0.4;
/// Band below the elbow a guarding wrist must stay within
const GUARD_BAND: f64 = 0.3;

const HOOK_CONFIDENCE: f64 = 0.8;
const UPPERCUT_CONFIDENCE: f64 = 0.8;
const BLOCK_BOTH_CONFIDENCE: f64 = 0.9;
const BLOCK_ONE_CONFIDENCE: f64 = 0.6;
const DODGE_CONFIDENCE: f64 = 0.7;
const GUARD_CONFIDENCE: f64 = 0.8;

/// Default confidence a detection must exceed to be reported
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// A move detected in one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedMove {
    #[serde(rename = "move")]
    pub kind: MoveKind,
    pub confidence: f64,
    pub timestamp: f64,
}

/// Per-kind reporting thresholds (strictly-greater comparison)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveThresholds {
    pub jab: f64,
    pub cross: f64,
    pub hook: f64,
    pub uppercut: f64,
    pub block: f64,
    pub dodge: f64,
    pub guard: f64,
}

impl MoveThresholds {
    /// Same threshold for every kind
    pub fn uniform(threshold: f64) -> Self {
        Self {
            jab: threshold,
            cross: threshold,
            hook: threshold,
            uppercut: threshold,
            block: threshold,
            dodge: threshold,
            guard: threshold,
        }
    }

    /// Thresholds used by the camera capture client, tighter on punches
    pub fn strict() -> Self {
        Self {
            jab: 0.7,
            cross: 0.7,
            hook: 0.6,
            uppercut: 0.6,
            ..Self::uniform(DEFAULT_THRESHOLD)
        }
    }

    pub fn for_kind(&self, kind: MoveKind) -> f64 {
        match kind {
            MoveKind::Jab => self.jab,
            MoveKind::Cross => self.cross,
            MoveKind::Hook => self.hook,
            MoveKind::Uppercut => self.uppercut,
            MoveKind::Block => self.block,
            MoveKind::Dodge => self.dodge,
            MoveKind::Guard => self.guard,
        }
    }
}

impl Default for MoveThresholds {
    fn default() -> Self {
        Self::uniform(DEFAULT_THRESHOLD)
    }
}

/// How straight a limb is: 1.0 when wrist, elbow and shoulder are collinear
/// with the elbow between them, 0 when the limb has no length.
pub fn arm_extension_ratio(wrist: &Landmark, elbow: &Landmark, shoulder: &Landmark) -> f64 {
    let forearm = wrist.distance(elbow);
    let upper_arm = elbow.distance(shoulder);
    let total = forearm + upper_arm;

    if total <= 0.0 || !total.is_finite() {
        return 0.0;
    }

    (wrist.distance(shoulder) / total).clamp(0.0, 1.0)
}

/// Stateless move classifier
#[derive(Debug, Clone, Default)]
pub struct MoveClassifier {
    thresholds: MoveThresholds,
}

impl MoveClassifier {
    pub fn new(thresholds: MoveThresholds) -> Self {
        Self { thresholds }
    }

    /// Run every detector and keep the ones above threshold, in `MoveKind::ALL`
    /// order. Co-occurring moves are all reported.
    pub fn classify(&self, frame: &PoseFrame, timestamp: f64) -> Vec<DetectedMove> {
        MoveKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let confidence = Self::detect(kind, frame);
                (confidence > self.thresholds.for_kind(kind)).then_some(DetectedMove {
                    kind,
                    confidence,
                    timestamp,
                })
            })
            .collect()
    }

    /// Raw detector confidence for a single kind
    pub fn detect(kind: MoveKind, frame: &PoseFrame) -> f64 {
        match kind {
            MoveKind::Jab => straight_punch(frame, LEFT_WRIST, LEFT_ELBOW, LEFT_SHOULDER),
            MoveKind::Cross => straight_punch(frame, RIGHT_WRIST, RIGHT_ELBOW, RIGHT_SHOULDER),
            MoveKind::Hook => detect_hook(frame),
            MoveKind::Uppercut => detect_uppercut(frame),
            MoveKind::Block => detect_block(frame),
            MoveKind::Dodge => detect_dodge(frame),
            MoveKind::Guard => detect_guard(frame),
        }
    }
}

/// Both sides as (wrist, shoulder) pairs
fn wrist_shoulder_pairs(frame: &PoseFrame) -> [(Landmark, Landmark); 2] {
    [
        (frame.get(LEFT_WRIST), frame.get(LEFT_SHOULDER)),
        (frame.get(RIGHT_WRIST), frame.get(RIGHT_SHOULDER)),
    ]
}

fn straight_punch(frame: &PoseFrame, wrist: usize, elbow: usize, shoulder: usize) -> f64 {
    let (wrist, elbow, shoulder) = (frame.get(wrist), frame.get(elbow), frame.get(shoulder));
    let extension = arm_extension_ratio(&wrist, &elbow, &shoulder);

    if extension > STRAIGHT_PUNCH_EXTENSION && wrist.x > shoulder.x {
        extension.min(1.0)
    } else {
        0.0
    }
}

fn detect_hook(frame: &PoseFrame) -> f64 {
    let hooked = wrist_shoulder_pairs(frame)
        .iter()
        .any(|(wrist, shoulder)| wrist.y > shoulder.y && (wrist.x - shoulder.x).abs() > HOOK_REACH);

    if hooked {
        HOOK_CONFIDENCE
    } else {
        0.0
    }
}

fn detect_uppercut(frame: &PoseFrame) -> f64 {
    let rising = wrist_shoulder_pairs(frame)
        .iter()
        .any(|(wrist, shoulder)| wrist.y < shoulder.y && wrist.x - shoulder.x >= -UPPERCUT_SLACK);

    if rising {
        UPPERCUT_CONFIDENCE
    } else {
        0.0
    }
}

fn detect_block(frame: &PoseFrame) -> f64 {
    let raised = wrist_shoulder_pairs(frame)
        .iter()
        .filter(|(wrist, shoulder)| {
            wrist.y < shoulder.y && (wrist.x - shoulder.x).abs() < BLOCK_WIDTH
        })
        .count();

    match raised {
        2 => BLOCK_BOTH_CONFIDENCE,
        1 => BLOCK_ONE_CONFIDENCE,
        _ => 0.0,
    }
}

fn detect_dodge(frame: &PoseFrame) -> f64 {
    let shoulder_spread = (frame.get(LEFT_SHOULDER).x - frame.get(RIGHT_SHOULDER).x).abs();
    let hip_spread = (frame.get(LEFT_HIP).x - frame.get(RIGHT_HIP).x).abs();

    if shoulder_spread > DODGE_SPREAD || hip_spread > DODGE_SPREAD {
        DODGE_CONFIDENCE
    } else {
        0.0
    }
}

fn detect_guard(frame: &PoseFrame) -> f64 {
    let guarding = [(LEFT_WRIST, LEFT_ELBOW), (RIGHT_WRIST, RIGHT_ELBOW)]
        .iter()
        .all(|&(wrist, elbow)| {
            let (wrist, elbow) = (frame.get(wrist), frame.get(elbow));
            wrist.y > elbow.y && elbow.y > wrist.y - GUARD_BAND
        });

    if guarding {
        GUARD_CONFIDENCE
    } else {
        0.0
    }
}

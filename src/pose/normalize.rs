//! Keypoint normalization - labeled telemetry into a fixed pose frame

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ============================================================================
// LANDMARK INDICES (33-slot full-body layout)
// ============================================================================

/// Number of landmark slots in a pose frame
pub const LANDMARK_COUNT: usize = 33;

pub const LEFT_SHOULDER: usize = 11;
pub const RIGHT_SHOULDER: usize = 12;
pub const LEFT_ELBOW: usize = 13;
pub const RIGHT_ELBOW: usize = 14;
pub const LEFT_WRIST: usize = 15;
pub const RIGHT_WRIST: usize = 16;
pub const LEFT_HIP: usize = 23;
pub const RIGHT_HIP: usize = 24;

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// A single landmark in normalized image coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
}

impl Landmark {
    pub const fn new(x: f64, y: f64, confidence: f64) -> Self {
        Self { x, y, confidence }
    }

    /// Planar distance to another landmark
    pub fn distance(&self, other: &Landmark) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Fixed 33-slot pose frame. Absent slots hold the zero landmark.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseFrame {
    landmarks: [Landmark; LANDMARK_COUNT],
}

impl PoseFrame {
    /// Frame with every slot zeroed
    pub fn empty() -> Self {
        Self {
            landmarks: [Landmark::default(); LANDMARK_COUNT],
        }
    }

    /// Landmark at `index`. Panics on an index outside the layout, which only
    /// the named constants above are used for.
    #[inline]
    pub fn get(&self, index: usize) -> Landmark {
        self.landmarks[index]
    }

    pub fn set(&mut self, index: usize, landmark: Landmark) {
        if index < LANDMARK_COUNT {
            self.landmarks[index] = landmark;
        }
    }
}

impl Default for PoseFrame {
    fn default() -> Self {
        Self::empty()
    }
}

/// Keypoint entry as received from the tracking client.
///
/// Every field is optional and non-numeric values read as missing, so one bad
/// entry never rejects a whole telemetry message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawKeypoint {
    #[serde(default, deserialize_with = "lenient_index")]
    pub index: Option<i64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub x: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub y: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub confidence: Option<f64>,
}

impl RawKeypoint {
    pub fn new(index: i64, x: f64, y: f64, confidence: f64) -> Self {
        Self {
            index: Some(index),
            x: Some(x),
            y: Some(y),
            confidence: Some(confidence),
        }
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_f64()).filter(|v| v.is_finite()))
}

fn lenient_index<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v.as_i64() {
        Some(i) => Some(i),
        // Float-typed clients send whole numbers as 11.0
        None => v.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64),
    }))
}

// ============================================================================
// NORMALIZER
// ============================================================================

/// Build a pose frame from labeled keypoints.
///
/// Entries missing `x`, `y` or `confidence` are skipped, a missing `index`
/// addresses slot 0, indices outside `[0, 32]` are ignored, and later
/// duplicates overwrite earlier ones.
pub fn normalize_keypoints(keypoints: &[RawKeypoint]) -> PoseFrame {
    let mut frame = PoseFrame::empty();

    for kp in keypoints {
        let (Some(x), Some(y), Some(confidence)) = (kp.x, kp.y, kp.confidence) else {
            continue;
        };

        let index = kp.index.unwrap_or(0);
        if !(0..LANDMARK_COUNT as i64).contains(&index) {
            continue;
        }

        frame.set(index as usize, Landmark::new(x, y, confidence));
    }

    frame
}

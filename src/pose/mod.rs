//! Pose processing - keypoint normalization and move classification

pub mod classifier;
pub mod normalize;

pub use classifier::{DetectedMove, MoveClassifier, MoveThresholds};
pub use normalize::{normalize_keypoints, RawKeypoint};

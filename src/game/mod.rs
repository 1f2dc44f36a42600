//! Game simulation modules

pub mod combat;
pub mod r#match;
pub mod moves;
pub mod registry;
pub mod snapshot;

pub use moves::{MoveKind, RawMoveEvent};
pub use r#match::{MatchError, MatchRules};
pub use registry::{MatchHandle, MatchRegistry};
pub use snapshot::{MatchSnapshot, ParticipantSnapshot};

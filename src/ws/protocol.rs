//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::{MatchSnapshot, RawMoveEvent};
use crate::pose::{DetectedMove, RawKeypoint};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// One frame of body-tracking telemetry for the connection's participant
    PoseData {
        keypoints: Vec<RawKeypoint>,
        /// Client capture time, echoed back
        #[serde(default)]
        timestamp: Option<f64>,
    },

    /// Move events supplied directly, bypassing the classifier
    GameAction {
        actions: Vec<RawMoveEvent>,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        #[serde(default)]
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        match_id: Uuid,
        participant_id: String,
        server_time: u64,
    },

    /// Reply to a telemetry or action message
    GameUpdate {
        /// Moves detected in the submitted frame (empty for direct actions)
        actions: Vec<DetectedMove>,
        #[serde(rename = "gameState")]
        game_state: MatchSnapshot,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },

    /// Match state changed (sent to every connection on the match, the
    /// sender of the change included)
    Snapshot {
        #[serde(rename = "gameState")]
        game_state: MatchSnapshot,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

impl ServerMsg {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMsg::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_data_message() {
        let json = r#"{
            "type": "pose_data",
            "keypoints": [{"index": 15, "x": 0.5, "y": 0.4, "confidence": 0.9}],
            "timestamp": 1700000000.5
        }"#;

        match serde_json::from_str::<ClientMsg>(json).unwrap() {
            ClientMsg::PoseData { keypoints, timestamp } => {
                assert_eq!(keypoints.len(), 1);
                assert_eq!(keypoints[0].index, Some(15));
                assert_eq!(timestamp, Some(1700000000.5));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_game_action_message() {
        let json = r#"{"type": "game_action", "actions": [{"move": "JAB", "confidence": 0.9}]}"#;

        match serde_json::from_str::<ClientMsg>(json).unwrap() {
            ClientMsg::GameAction { actions } => {
                assert_eq!(actions[0].move_kind, "JAB");
                assert_eq!(actions[0].actor_id, None);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type": "teleport"}"#).is_err());
    }

    #[test]
    fn test_server_error_shape() {
        let json = serde_json::to_value(ServerMsg::error("unrecognized_move", "Unrecognized move: x")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "unrecognized_move");
    }

    #[test]
    fn test_pong_shape() {
        let json = serde_json::to_value(ServerMsg::Pong { t: 42 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "pong", "t": 42}));
    }
}

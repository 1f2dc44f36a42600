//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{MatchError, MatchHandle};
use crate::http::routes::AppError;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Outgoing replies buffered per connection
const REPLY_CHANNEL_CAPACITY: usize = 64;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    /// Participant this connection streams telemetry for
    #[serde(alias = "participant_id")]
    pub participant_id: String,
    /// Display name; registers the participant if not yet known
    #[serde(default)]
    pub name: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(match_id): Path<Uuid>,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let handle = state
        .match_registry
        .get(&match_id)
        .ok_or_else(|| AppError::NotFound(format!("Match not found: {}", match_id)))?;

    let participant_id = query.participant_id;
    bind_participant(&handle, &participant_id, query.name.as_deref())?;

    info!(match_id = %match_id, participant_id = %participant_id, "WebSocket upgrade");
    let rate_limit = state.config.input_rate_limit;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, handle, participant_id, rate_limit)))
}

/// Resolve the participant a connection streams for. A known id binds as is,
/// an unknown one is registered when a name is supplied.
fn bind_participant(
    handle: &MatchHandle,
    participant_id: &str,
    name: Option<&str>,
) -> Result<(), MatchError> {
    match name {
        Some(name) => match handle.register(participant_id, name) {
            Ok(_) | Err(MatchError::DuplicateParticipant(_)) => Ok(()),
            Err(e) => Err(e),
        },
        None if handle.has_participant(participant_id) => Ok(()),
        None => Err(MatchError::UnknownParticipant(participant_id.to_string())),
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    handle: MatchHandle,
    participant_id: String,
    rate_limit: u32,
) {
    let match_id = handle.id;
    info!(match_id = %match_id, participant_id = %participant_id, "New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        match_id,
        participant_id: participant_id.clone(),
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(participant_id = %participant_id, error = %e, "Failed to send welcome");
        return;
    }

    let (reply_tx, mut reply_rx) = mpsc::channel::<ServerMsg>(REPLY_CHANNEL_CAPACITY);
    let mut updates_rx = handle.subscribe();

    // Writer task: replies and match broadcasts -> WebSocket.
    // The sender of a change gets both its game_update reply and the snapshot.
    let writer_participant = participant_id.clone();
    let writer_handle = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                reply = reply_rx.recv() => match reply {
                    Some(msg) => msg,
                    None => break,
                },
                update = updates_rx.recv() => match update {
                    Ok(game_state) => ServerMsg::Snapshot { game_state },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(
                            participant_id = %writer_participant,
                            lagged_count = n,
                            "Client lagged, skipping {} snapshots", n
                        );
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };

            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(participant_id = %writer_participant, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    let rate_limiter = ConnectionRateLimiter::new(rate_limit);

    // Reader loop: WebSocket -> match
    while let Some(result) = ws_stream.next().await {
        let reply = match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(participant_id = %participant_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => dispatch(&handle, &participant_id, msg),
                    Err(e) => {
                        warn!(participant_id = %participant_id, error = %e, "Failed to parse client message");
                        ServerMsg::error("invalid_message", e.to_string())
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(participant_id = %participant_id, "Received binary message, ignoring");
                continue;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => {
                info!(participant_id = %participant_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(participant_id = %participant_id, error = %e, "WebSocket error");
                break;
            }
        };

        if reply_tx.send(reply).await.is_err() {
            debug!(participant_id = %participant_id, "Reply channel closed");
            break;
        }
    }

    drop(reply_tx);
    writer_handle.abort();

    info!(match_id = %match_id, participant_id = %participant_id, "WebSocket connection closed");
}

/// Apply one client message to the match and build the reply
fn dispatch(handle: &MatchHandle, participant_id: &str, msg: ClientMsg) -> ServerMsg {
    match msg {
        ClientMsg::PoseData { keypoints, timestamp } => {
            let (actions, game_state) = handle.submit_pose(participant_id, &keypoints);
            ServerMsg::GameUpdate {
                actions,
                game_state,
                timestamp,
            }
        }
        ClientMsg::GameAction { actions } => {
            match handle.submit_actions(Some(participant_id), &actions) {
                Ok(game_state) => ServerMsg::GameUpdate {
                    actions: Vec::new(),
                    game_state,
                    timestamp: None,
                },
                Err(e) => ServerMsg::error(e.code(), e.to_string()),
            }
        }
        ClientMsg::Ping { t } => ServerMsg::Pong { t },
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

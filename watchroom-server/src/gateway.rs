use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use watchroom_collab::{
    CommandReply, Delivery, RoomCommand, RoomConnectionHandle, RoomError, Subscription, SyncEvent,
};
use watchroom_core::PlaybackCommand;

use crate::{
    auth::Session,
    context::ServerContext,
    errors::{ServerError, ServerResult},
    serialized::{Room, RoomMember, RoomMessage, ToSerialized},
};

/// Commands a client sends over the gateway. Identity comes from the session, never from here.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Join,
    Leave,
    Control {
        /// One of PLAY, PAUSE, or SEEK
        action: String,
        /// Required when seeking, in seconds
        position: Option<f64>,
    },
    Chat {
        content: String,
    },
}

/// Messages the gateway sends to a client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Someone joined or left
    #[serde(rename_all = "camelCase")]
    Presence {
        room_id: i32,
        participants: Vec<RoomMember>,
        owner_id: Option<i32>,
        head_count: usize,
        room_deleted: bool,
        server_timestamp: DateTime<Utc>,
    },
    /// A playback command was applied
    #[serde(rename_all = "camelCase")]
    Playback {
        room_id: i32,
        issued_by: i32,
        action: String,
        is_playing: bool,
        current_position: f64,
        server_timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Chat { room_id: i32, message: RoomMessage },
    /// The full room state, only sent to the connection that joined
    #[serde(rename = "snapshot")]
    Snapshot { room: Room },
    /// The last command from this connection was refused
    #[serde(rename = "rejected")]
    Rejected { reason: String, message: String },
    /// Events were missed, the client should fetch the room again
    #[serde(rename = "resync")]
    Resync { missed: u64 },
}

impl ClientMessage {
    fn into_command(self) -> Result<RoomCommand, RoomError> {
        Ok(match self {
            Self::Join => RoomCommand::Join,
            Self::Leave => RoomCommand::Leave,
            Self::Control { action, position } => {
                RoomCommand::Control(PlaybackCommand::parse(&action, position)?)
            }
            Self::Chat { content } => RoomCommand::Chat(content),
        })
    }
}

impl From<SyncEvent> for ServerMessage {
    fn from(value: SyncEvent) -> Self {
        match value {
            SyncEvent::Presence {
                room_id,
                members,
                owner_id,
                room_deleted,
                server_timestamp,
            } => Self::Presence {
                room_id,
                head_count: members.len(),
                participants: members.to_serialized(),
                owner_id,
                room_deleted,
                server_timestamp,
            },
            SyncEvent::Playback {
                room_id,
                issued_by,
                snapshot,
            } => Self::Playback {
                room_id,
                issued_by,
                action: snapshot.action.to_string(),
                is_playing: snapshot.is_playing,
                current_position: snapshot.current_position,
                server_timestamp: snapshot.server_timestamp,
            },
            SyncEvent::Chat { room_id, message } => Self::Chat {
                room_id,
                message: message.to_serialized(),
            },
        }
    }
}

impl From<RoomError> for ServerMessage {
    fn from(value: RoomError) -> Self {
        Self::Rejected {
            reason: value.reason().to_string(),
            message: value.to_string(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}/gateway",
    tag = "gateway",
    params(
        ("id" = i32, Path, description = "The id of the room"),
        ("token" = Option<String>, Query, description = "Session token, for clients that can't set headers")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 101, description = "Switched to a WebSocket carrying room events and commands"),
        (status = 401, description = "Missing, unknown, or expired session"),
        (status = 404, description = "The room doesn't exist")
    )
)]
pub async fn gateway(
    session: Result<Session, ServerError>,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
    ws: WebSocketUpgrade,
) -> ServerResult<Response> {
    let session = session.map_err(|e| {
        warn!("Rejected gateway handshake for room {}: {}", room_id, e);
        e
    })?;

    let (handle, subscription) = context
        .collab
        .rooms
        .connect(room_id, session.user)
        .map_err(|e| {
            warn!("Rejected gateway handshake for room {}: {}", room_id, e);
            e
        })?;

    Ok(ws.on_upgrade(move |socket| run_connection(socket, handle, subscription)))
}

async fn run_connection(
    socket: WebSocket,
    handle: RoomConnectionHandle,
    mut subscription: Subscription,
) {
    let (mut sender, mut receiver) = socket.split();
    let (replies, mut outgoing) = mpsc::unbounded_channel::<ServerMessage>();

    // Room events and direct replies share the socket, so one task does all the writing
    let mut send_task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                delivery = subscription.recv() => match delivery {
                    Some(Delivery::Event(event)) => ServerMessage::from(event),
                    Some(Delivery::Lagged(missed)) => ServerMessage::Resync { missed },
                    // The room is gone
                    None => break,
                },
                reply = outgoing.recv() => match reply {
                    Some(reply) => reply,
                    None => break,
                },
            };

            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Could not serialize gateway message: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }

        let _ = sender.close().await;
    });

    loop {
        tokio::select! {
            _ = &mut send_task => break,
            message = receiver.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };

                if let Some(reply) = handle_text(&handle, &text).await {
                    if replies.send(reply).is_err() {
                        break;
                    }
                }
            }
        }
    }

    send_task.abort();
    handle.close().await;
}

/// Runs a single command, returning what should be sent back to only this connection
async fn handle_text(handle: &RoomConnectionHandle, text: &str) -> Option<ServerMessage> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            return Some(ServerMessage::Rejected {
                reason: "INVALID_COMMAND".to_string(),
                message: e.to_string(),
            })
        }
    };

    let result = match message.into_command() {
        Ok(command) => handle.handle(command).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(CommandReply::Snapshot(snapshot)) => Some(ServerMessage::Snapshot {
            room: snapshot.to_serialized(),
        }),
        Ok(_) => None,
        Err(e) => {
            debug!(
                "Rejected command from {} in room {}: {}",
                handle.user().display_name,
                handle.room_id(),
                e
            );

            Some(e.into())
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use serde_json::json;
    use watchroom_core::{PlaybackAction, PlaybackError, PlaybackSnapshot};

    use super::*;

    #[test]
    fn test_client_messages() {
        let control: ClientMessage =
            serde_json::from_value(json!({ "type": "control", "action": "seek", "position": 42.0 }))
                .unwrap();

        assert_eq!(
            control.into_command().unwrap(),
            RoomCommand::Control(PlaybackCommand::Seek(42.))
        );

        let join: ClientMessage = serde_json::from_value(json!({ "type": "join" })).unwrap();
        assert_eq!(join.into_command().unwrap(), RoomCommand::Join);

        let missing_position: ClientMessage =
            serde_json::from_value(json!({ "type": "control", "action": "SEEK" })).unwrap();

        assert!(matches!(
            missing_position.into_command(),
            Err(RoomError::InvalidPlaybackCommand(
                PlaybackError::MissingPosition
            ))
        ));

        let unknown: ClientMessage =
            serde_json::from_value(json!({ "type": "control", "action": "REWIND" })).unwrap();

        assert!(matches!(
            unknown.into_command(),
            Err(RoomError::InvalidPlaybackCommand(
                PlaybackError::UnknownAction(_)
            ))
        ));
    }

    #[test]
    fn test_playback_event_shape() {
        let now = Utc::now();

        let message = ServerMessage::from(SyncEvent::Playback {
            room_id: 7,
            issued_by: 2,
            snapshot: PlaybackSnapshot {
                action: PlaybackAction::Play,
                is_playing: true,
                current_position: 0.,
                server_timestamp: now,
            },
        });

        let value = serde_json::to_value(message).unwrap();

        assert_eq!(value["type"], "PLAYBACK");
        assert_eq!(value["roomId"], 7);
        assert_eq!(value["action"], "PLAY");
        assert_eq!(value["isPlaying"], true);
        assert_eq!(value["currentPosition"], 0.0);
    }

    #[test]
    fn test_presence_event_shape() {
        let message = ServerMessage::from(SyncEvent::Presence {
            room_id: 7,
            members: vec![],
            owner_id: None,
            room_deleted: true,
            server_timestamp: Utc::now(),
        });

        let value = serde_json::to_value(message).unwrap();

        assert_eq!(value["type"], "PRESENCE");
        assert_eq!(value["headCount"], 0);
        assert_eq!(value["roomDeleted"], true);
        assert!(value["ownerId"].is_null());
    }

    #[test]
    fn test_rejection_shape() {
        let value = serde_json::to_value(ServerMessage::from(RoomError::UserNotInRoom)).unwrap();

        assert_eq!(value["type"], "rejected");
        assert_eq!(value["reason"], "USER_NOT_IN_ROOM");
    }
}

use watchroom_core::{PlaybackSnapshot, PrimaryKey, Timestamp};

use crate::{RoomId, RoomMember, RoomMessageData};

/// Events published to every subscriber of a room's topic
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Someone joined or left a room
    Presence {
        room_id: RoomId,
        members: Vec<RoomMember>,
        owner_id: Option<PrimaryKey>,
        /// True if the last participant left, and the room is gone
        room_deleted: bool,
        server_timestamp: Timestamp,
    },
    /// A playback command was applied
    Playback {
        room_id: RoomId,
        /// The user that issued the command
        issued_by: PrimaryKey,
        snapshot: PlaybackSnapshot,
    },
    /// A chat message was posted
    Chat {
        room_id: RoomId,
        message: RoomMessageData,
    },
}

impl SyncEvent {
    pub fn room_id(&self) -> RoomId {
        match self {
            Self::Presence { room_id, .. } => *room_id,
            Self::Playback { room_id, .. } => *room_id,
            Self::Chat { room_id, .. } => *room_id,
        }
    }
}

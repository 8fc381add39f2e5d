//! All schemas that are exposed from endpoints are defined here
//! along with the From<T> impls

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use watchroom_collab::{
    RoomMember as CollabRoomMember, RoomMessageData, RoomPage, RoomSnapshot, UserData,
};
use watchroom_core::PlaybackSnapshot;

use crate::schemas::encode_cursor;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    id: i32,
    username: String,
    display_name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    id: i32,
    title: String,
    /// Length in seconds, if known
    duration: Option<f64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    id: i32,
    title: String,
    content: Content,
    owner_id: i32,
    created_at: DateTime<Utc>,
    participants: Vec<RoomMember>,
    playback: Playback,
}

/// A room as it appears in listings
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomListing {
    room: Room,
    content_title: String,
    head_count: usize,
}

/// A page of room listings
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomListingPage {
    data: Vec<RoomListing>,
    /// Pass this as `cursor` to get the next page
    next_cursor: Option<String>,
    size: usize,
    total_elements: usize,
    has_next: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomMember {
    user: User,
    joined_at: DateTime<Utc>,
    owner: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Playback {
    /// The last applied action, one of PLAY, PAUSE, or SEEK
    action: String,
    is_playing: bool,
    /// Position in seconds at `serverTimestamp`
    current_position: f64,
    server_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessage {
    id: i32,
    room_id: i32,
    sender_id: i32,
    sender_name: String,
    content: String,
    created_at: DateTime<Utc>,
}

/// Why a request or command was refused
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Rejection {
    pub reason: String,
    pub message: String,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<User> for UserData {
    fn to_serialized(&self) -> User {
        User {
            id: self.id,
            username: self.username.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

impl ToSerialized<RoomMember> for CollabRoomMember {
    fn to_serialized(&self) -> RoomMember {
        RoomMember {
            user: self.user.to_serialized(),
            joined_at: self.joined_at,
            owner: self.owner,
        }
    }
}

impl ToSerialized<Playback> for PlaybackSnapshot {
    fn to_serialized(&self) -> Playback {
        Playback {
            action: self.action.to_string(),
            is_playing: self.is_playing,
            current_position: self.current_position,
            server_timestamp: self.server_timestamp,
        }
    }
}

impl ToSerialized<Room> for RoomSnapshot {
    fn to_serialized(&self) -> Room {
        Room {
            id: self.id,
            title: self.title.clone(),
            content: Content {
                id: self.content.id,
                title: self.content.title.clone(),
                duration: self.content.duration,
            },
            owner_id: self.owner_id,
            created_at: self.created_at,
            participants: self.members.to_serialized(),
            playback: self.playback.to_serialized(),
        }
    }
}

impl ToSerialized<RoomListing> for RoomSnapshot {
    fn to_serialized(&self) -> RoomListing {
        RoomListing {
            room: self.to_serialized(),
            content_title: self.content.title.clone(),
            head_count: self.head_count(),
        }
    }
}

impl ToSerialized<RoomListingPage> for RoomPage {
    fn to_serialized(&self) -> RoomListingPage {
        RoomListingPage {
            data: self.rooms.to_serialized(),
            next_cursor: self.next_cursor.as_ref().map(encode_cursor),
            size: self.rooms.len(),
            total_elements: self.total,
            has_next: self.has_next,
        }
    }
}

impl ToSerialized<RoomMessage> for RoomMessageData {
    fn to_serialized(&self) -> RoomMessage {
        RoomMessage {
            id: self.id,
            room_id: self.room_id,
            sender_id: self.sender.id,
            sender_name: self.sender.display_name.clone(),
            content: self.content.clone(),
            created_at: self.created_at,
        }
    }
}

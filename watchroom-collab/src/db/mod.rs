use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;
pub type SharedDatabase = Arc<dyn Database>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

impl DatabaseError {
    pub fn not_found(resource: &'static str, identifier: &'static str) -> Self {
        Self::NotFound {
            resource,
            identifier,
        }
    }

    /// Returns true if this is a [DatabaseError::NotFound] for the given resource
    pub fn is_not_found(&self, of: &str) -> bool {
        matches!(self, Self::NotFound { resource, .. } if *resource == of)
    }
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Represents the durable store the watch room system reads from and persists to.
///
/// Users, sessions, and content are owned by other systems and are only looked up here.
/// Rooms, their participants, and their messages are written by the room system.
/// Deleting a room deletes its participants and messages with it.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData>;
    async fn session_by_token(&self, token: &str) -> Result<SessionData>;
    async fn content_by_id(&self, content_id: PrimaryKey) -> Result<ContentData>;

    /// Creates a room along with its first participant, who is also the owner.
    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData>;
    /// Persists the mutable parts of a room, its owner and playback state.
    async fn save_room(&self, room: &RoomData) -> Result<()>;
    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData>;
    async fn list_rooms(&self) -> Result<Vec<RoomData>>;
    async fn delete_room(&self, room_id: PrimaryKey) -> Result<()>;

    async fn save_participant(&self, participant: &ParticipantData) -> Result<()>;
    async fn participants_by_room(&self, room_id: PrimaryKey) -> Result<Vec<ParticipantData>>;
    async fn delete_participant(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<()>;

    async fn create_message(&self, new_message: NewRoomMessage) -> Result<RoomMessageData>;
    async fn messages_by_room(&self, room_id: PrimaryKey) -> Result<Vec<RoomMessageData>>;
}

#[derive(Debug)]
pub struct NewRoom {
    pub content_id: PrimaryKey,
    pub title: String,
    /// The owner and first participant of the new room
    pub owner_id: PrimaryKey,
    pub created_at: DateTime<Utc>,
    pub playback: PlaybackData,
}

#[derive(Debug)]
pub struct NewRoomMessage {
    pub room_id: PrimaryKey,
    pub sender_id: PrimaryKey,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

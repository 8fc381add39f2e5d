mod connection;
mod room;

use std::{cmp::Reverse, sync::Arc};

use log::{info, warn};
use watchroom_core::{PlaybackClock, PlaybackCommand, PlaybackError, Timestamp};

use crate::{
    AuthError, CollabContext, DatabaseError, NewRoom, PrimaryKey, RoomMessageData, Subscription,
    SyncEvent, UserData,
};

pub use connection::*;
pub use room::*;

use thiserror::Error;

pub struct RoomManager {
    context: CollabContext,
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Room does not exist")]
    RoomNotFound,
    #[error("User does not exist")]
    UserNotFound,
    #[error("Content does not exist")]
    ContentNotFound,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid playback command: {0}")]
    InvalidPlaybackCommand(#[from] PlaybackError),
    #[error("Persistence is unavailable: {0}")]
    PersistenceUnavailable(String),
    #[error("User is not a member of this room")]
    UserNotInRoom,
    #[error("Only the owner of this room may control playback")]
    ControlNotPermitted,
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// What a new room should be
#[derive(Debug, Clone)]
pub struct CreateRoom {
    pub content_id: PrimaryKey,
    /// The user creating the room, who becomes its owner
    pub user_id: PrimaryKey,
    /// Defaults to the title of the content
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RoomQuery {
    /// Case-insensitive filter over the room and content titles
    pub search: Option<String>,
    pub sort: RoomSort,
    /// The most rooms a page should have. No limit if unset.
    pub limit: Option<usize>,
    /// Only rooms listed after this position
    pub cursor: Option<RoomCursor>,
}

/// A position in a room listing, taken from the last room of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomCursor {
    pub head_count: usize,
    pub created_at: Timestamp,
    pub id: RoomId,
}

/// One page of a room listing
#[derive(Debug, Clone)]
pub struct RoomPage {
    pub rooms: Vec<RoomSnapshot>,
    /// Where the next page starts, if there is one
    pub next_cursor: Option<RoomCursor>,
    pub has_next: bool,
    /// How many rooms match the query across all pages
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoomSort {
    /// Newest rooms first
    #[default]
    CreatedAt,
    /// Busiest rooms first
    HeadCount,
}

impl RoomCursor {
    pub fn of(room: &RoomSnapshot) -> Self {
        Self {
            head_count: room.head_count(),
            created_at: room.created_at,
            id: room.id,
        }
    }

    /// Orders rooms as they are listed, with ties broken by the newest id
    fn key(&self, sort: RoomSort) -> (Reverse<usize>, Reverse<Timestamp>, Reverse<RoomId>) {
        let head_count = match sort {
            RoomSort::CreatedAt => 0,
            RoomSort::HeadCount => self.head_count,
        };

        (
            Reverse(head_count),
            Reverse(self.created_at),
            Reverse(self.id),
        )
    }
}

impl RoomError {
    /// The reason code sent to clients when a command is rejected
    pub fn reason(&self) -> &'static str {
        match self {
            Self::RoomNotFound => "ROOM_NOT_FOUND",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::ContentNotFound => "CONTENT_NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InvalidPlaybackCommand(_) => "INVALID_PLAYBACK_COMMAND",
            Self::PersistenceUnavailable(_) => "PERSISTENCE_UNAVAILABLE",
            Self::UserNotInRoom => "USER_NOT_IN_ROOM",
            Self::ControlNotPermitted => "CONTROL_NOT_PERMITTED",
            Self::InvalidMessage(_) => "INVALID_MESSAGE",
        }
    }
}

impl From<DatabaseError> for RoomError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound { resource, .. } => match resource {
                "user" => Self::UserNotFound,
                "content" => Self::ContentNotFound,
                "session" => Self::Unauthorized,
                _ => Self::RoomNotFound,
            },
            e => Self::PersistenceUnavailable(e.to_string()),
        }
    }
}

impl From<AuthError> for RoomError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::Db(e) => e.into(),
            _ => Self::Unauthorized,
        }
    }
}

impl RoomManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Restores the rooms from the database on init. Returns how many were restored.
    pub async fn restore(&self) -> Result<usize, RoomError> {
        let db = &self.context.database;
        let rooms = db.list_rooms().await?;

        for data in rooms {
            let content = db.content_by_id(data.content_id).await?;
            let participants = db.participants_by_room(data.id).await?;

            let mut members = Vec::with_capacity(participants.len());

            for participant in participants {
                match db.user_by_id(participant.user_id).await {
                    Ok(user) => members.push((participant, user)),
                    Err(e) if e.is_not_found("user") => {
                        warn!(
                            "Dropping participant {} of room {}, the user no longer exists",
                            participant.user_id, data.id
                        );
                        db.delete_participant(data.id, participant.user_id).await?;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            // A room only exists while someone is in it
            if members.is_empty() {
                info!("Deleting empty room {}", data.title);
                db.delete_room(data.id).await?;
                continue;
            }

            let room = Room::new(&self.context, data.clone(), content, members);

            if room.data().owner_id != data.owner_id {
                db.save_room(&room.data()).await?;
            }

            self.insert(Arc::new(room));
        }

        let count = self.context.rooms.len();
        info!("Restored {} room(s)", count);

        Ok(count)
    }

    /// Creates a new room, with the creator as the first participant and owner
    pub async fn create_room(&self, new_room: CreateRoom) -> Result<RoomSnapshot, RoomError> {
        let db = &self.context.database;

        let user = db.user_by_id(new_room.user_id).await?;
        let content = db.content_by_id(new_room.content_id).await?;

        let title = new_room
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| content.title.clone());

        let now = self.context.time.now();
        let clock = PlaybackClock::new(now).with_duration(content.duration);

        let data = db
            .create_room(NewRoom {
                content_id: content.id,
                title,
                owner_id: user.id,
                created_at: now,
                playback: (&clock).into(),
            })
            .await
            .map_err(|e| {
                warn!("Could not create room: {}", e);
                RoomError::from(e)
            })?;

        let owner = crate::ParticipantData {
            room_id: data.id,
            user_id: user.id,
            joined_at: now,
        };

        info!("{} created room {}", user.display_name, data.title);

        let room = Arc::new(Room::new(&self.context, data, content, vec![(owner, user)]));
        self.insert(room.clone());

        room.snapshot()
    }

    pub fn room_by_id(&self, room_id: RoomId) -> Result<Arc<Room>, RoomError> {
        self.context
            .rooms
            .get(&room_id)
            .map(|r| r.clone())
            .filter(|r| !r.is_deleted())
            .ok_or(RoomError::RoomNotFound)
    }

    /// Returns the current state of a room
    pub fn snapshot(&self, room_id: RoomId) -> Result<RoomSnapshot, RoomError> {
        self.room_by_id(room_id)?.snapshot()
    }

    /// Joins a room, returning its metadata and everyone in it
    pub async fn join_and_describe(
        &self,
        room_id: RoomId,
        user_id: PrimaryKey,
    ) -> Result<RoomSnapshot, RoomError> {
        let room = self.room_by_id(room_id)?;
        let user = self.user(user_id).await?;

        room.join(user).await
    }

    /// Leaves a room. Leaving a room you're not in does nothing.
    pub async fn leave(&self, room_id: RoomId, user_id: PrimaryKey) -> Result<(), RoomError> {
        let room = self.room_by_id(room_id)?;

        if room.leave(user_id).await? == LeaveResult::Deleted {
            self.remove(room_id);
        }

        Ok(())
    }

    pub async fn control_playback(
        &self,
        room_id: RoomId,
        user_id: PrimaryKey,
        command: PlaybackCommand,
    ) -> Result<SyncEvent, RoomError> {
        let room = self.room_by_id(room_id)?;
        self.user(user_id).await?;

        room.control(user_id, command).await
    }

    pub async fn send_message(
        &self,
        room_id: RoomId,
        user_id: PrimaryKey,
        content: &str,
    ) -> Result<RoomMessageData, RoomError> {
        self.room_by_id(room_id)?
            .send_message(user_id, content)
            .await
    }

    pub async fn messages(
        &self,
        room_id: RoomId,
        user_id: PrimaryKey,
    ) -> Result<Vec<RoomMessageData>, RoomError> {
        self.room_by_id(room_id)?.messages(user_id).await
    }

    /// Returns every live room matching the query, ignoring its limit and cursor
    pub fn list_all(&self, query: &RoomQuery) -> Vec<RoomSnapshot> {
        let search = query
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let mut rooms: Vec<_> = self
            .context
            .rooms
            .iter()
            .filter_map(|r| r.snapshot().ok())
            .filter(|r| match &search {
                Some(search) => {
                    r.title.to_lowercase().contains(search)
                        || r.content.title.to_lowercase().contains(search)
                }
                None => true,
            })
            .collect();

        rooms.sort_by_key(|r| RoomCursor::of(r).key(query.sort));
        rooms
    }

    /// Returns a page of the live rooms matching the query, starting after its cursor
    pub fn list_page(&self, query: &RoomQuery) -> RoomPage {
        let matching = self.list_all(query);
        let total = matching.len();

        let mut rooms: Vec<_> = match query.cursor {
            Some(cursor) => {
                let after = cursor.key(query.sort);

                matching
                    .into_iter()
                    .filter(|r| RoomCursor::of(r).key(query.sort) > after)
                    .collect()
            }
            None => matching,
        };

        let has_next = query.limit.is_some_and(|limit| rooms.len() > limit);

        if let Some(limit) = query.limit {
            rooms.truncate(limit);
        }

        RoomPage {
            next_cursor: rooms.last().filter(|_| has_next).map(RoomCursor::of),
            has_next,
            total,
            rooms,
        }
    }

    pub fn head_count(&self, room_id: RoomId) -> Result<usize, RoomError> {
        self.room_by_id(room_id).map(|r| r.head_count())
    }

    /// Subscribes to the events of a room
    pub fn subscribe(&self, room_id: RoomId) -> Result<Subscription, RoomError> {
        self.room_by_id(room_id)?;

        self.context
            .broadcaster
            .subscribe(room_id)
            .ok_or(RoomError::RoomNotFound)
    }

    /// Opens a live connection to a room for an authenticated user.
    /// Dropping the returned handle counts as a disconnect.
    pub fn connect(
        &self,
        room_id: RoomId,
        user: UserData,
    ) -> Result<(RoomConnectionHandle, Subscription), RoomError> {
        let subscription = self.subscribe(room_id)?;
        let handle = RoomConnectionHandle::new(&self.context, room_id, user);

        Ok((handle, subscription))
    }

    async fn user(&self, user_id: PrimaryKey) -> Result<UserData, RoomError> {
        Ok(self.context.database.user_by_id(user_id).await?)
    }

    fn insert(&self, room: Arc<Room>) {
        self.context.broadcaster.open(room.id());
        self.context.rooms.insert(room.id(), room);
    }

    pub(crate) fn remove(&self, room_id: RoomId) {
        self.context.rooms.remove(&room_id);
        self.context.broadcaster.close(room_id);
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crossbeam::atomic::AtomicCell;
use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;

use crate::{
    ContentData, Database, DatabaseError, NewRoom, NewRoomMessage, ParticipantData, PrimaryKey,
    Result, RoomData, RoomMessageData, SessionData, UserData,
};

/// An in-memory database, used when no database url is configured, and in tests.
///
/// Users, sessions, and content can be seeded with the `insert_*` methods,
/// since they are normally owned by other systems.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    users: DashMap<PrimaryKey, UserData>,
    sessions: DashMap<String, SessionData>,
    contents: DashMap<PrimaryKey, ContentData>,
    rooms: DashMap<PrimaryKey, RoomData>,
    participants: DashMap<(PrimaryKey, PrimaryKey), ParticipantData>,
    messages: Mutex<Vec<RoomMessageData>>,
    last_id: AtomicCell<PrimaryKey>,
    /// If true, every write fails as if the database went away
    failing: AtomicCell<bool>,
}

#[derive(Debug, Error)]
#[error("The in-memory database is set to fail")]
struct Unavailable;

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, username: &str, display_name: &str) -> UserData {
        let user = UserData {
            id: self.next_id(),
            username: username.to_string(),
            display_name: display_name.to_string(),
        };

        self.users.insert(user.id, user.clone());
        user
    }

    pub fn insert_content(&self, title: &str, duration: Option<f64>) -> ContentData {
        let content = ContentData {
            id: self.next_id(),
            title: title.to_string(),
            duration,
        };

        self.contents.insert(content.id, content.clone());
        content
    }

    pub fn insert_session(
        &self,
        user_id: PrimaryKey,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionData> {
        let user = self
            .users
            .get(&user_id)
            .map(|u| u.clone())
            .ok_or(DatabaseError::not_found("user", "id"))?;

        if self.sessions.contains_key(token) {
            return Err(DatabaseError::Conflict {
                resource: "session",
                field: "token",
                value: token.to_string(),
            });
        }

        let session = SessionData {
            id: self.next_id(),
            token: token.to_string(),
            expires_at,
            user,
        };

        self.sessions.insert(session.token.clone(), session.clone());
        Ok(session)
    }

    /// Makes every following write fail, or succeed again
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing);
    }

    fn next_id(&self) -> PrimaryKey {
        self.last_id.fetch_add(1) + 1
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.failing.load() {
            return Err(DatabaseError::Internal(Box::new(Unavailable)));
        }

        Ok(())
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.users
            .get(&user_id)
            .map(|u| u.clone())
            .ok_or(DatabaseError::not_found("user", "id"))
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        self.sessions
            .get(token)
            .map(|s| s.clone())
            .ok_or(DatabaseError::not_found("session", "token"))
    }

    async fn content_by_id(&self, content_id: PrimaryKey) -> Result<ContentData> {
        self.contents
            .get(&content_id)
            .map(|c| c.clone())
            .ok_or(DatabaseError::not_found("content", "id"))
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        self.ensure_writable()?;

        let room = RoomData {
            id: self.next_id(),
            content_id: new_room.content_id,
            title: new_room.title,
            owner_id: new_room.owner_id,
            created_at: new_room.created_at,
            playback: new_room.playback,
        };

        let owner = ParticipantData {
            room_id: room.id,
            user_id: new_room.owner_id,
            joined_at: new_room.created_at,
        };

        self.rooms.insert(room.id, room.clone());
        self.participants.insert((room.id, owner.user_id), owner);

        Ok(room)
    }

    async fn save_room(&self, room: &RoomData) -> Result<()> {
        self.ensure_writable()?;

        let mut existing = self
            .rooms
            .get_mut(&room.id)
            .ok_or(DatabaseError::not_found("room", "id"))?;

        *existing = room.clone();
        Ok(())
    }

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData> {
        self.rooms
            .get(&room_id)
            .map(|r| r.clone())
            .ok_or(DatabaseError::not_found("room", "id"))
    }

    async fn list_rooms(&self) -> Result<Vec<RoomData>> {
        let mut rooms: Vec<_> = self.rooms.iter().map(|r| r.clone()).collect();
        rooms.sort_by_key(|r| r.id);

        Ok(rooms)
    }

    async fn delete_room(&self, room_id: PrimaryKey) -> Result<()> {
        self.ensure_writable()?;

        self.rooms
            .remove(&room_id)
            .ok_or(DatabaseError::not_found("room", "id"))?;

        self.participants.retain(|(room, _), _| *room != room_id);
        self.messages.lock().retain(|m| m.room_id != room_id);

        Ok(())
    }

    async fn save_participant(&self, participant: &ParticipantData) -> Result<()> {
        self.ensure_writable()?;

        if !self.rooms.contains_key(&participant.room_id) {
            return Err(DatabaseError::not_found("room", "id"));
        }

        self.participants
            .insert((participant.room_id, participant.user_id), participant.clone());

        Ok(())
    }

    async fn participants_by_room(&self, room_id: PrimaryKey) -> Result<Vec<ParticipantData>> {
        let mut participants: Vec<_> = self
            .participants
            .iter()
            .filter(|p| p.room_id == room_id)
            .map(|p| p.clone())
            .collect();

        participants.sort_by_key(|p| (p.joined_at, p.user_id));
        Ok(participants)
    }

    async fn delete_participant(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        self.ensure_writable()?;

        self.participants.remove(&(room_id, user_id));
        Ok(())
    }

    async fn create_message(&self, new_message: NewRoomMessage) -> Result<RoomMessageData> {
        self.ensure_writable()?;

        if !self.rooms.contains_key(&new_message.room_id) {
            return Err(DatabaseError::not_found("room", "id"));
        }

        let sender = self.user_by_id(new_message.sender_id).await?;

        let message = RoomMessageData {
            id: self.next_id(),
            room_id: new_message.room_id,
            sender,
            content: new_message.content,
            created_at: new_message.created_at,
        };

        self.messages.lock().push(message.clone());
        Ok(message)
    }

    async fn messages_by_room(&self, room_id: PrimaryKey) -> Result<Vec<RoomMessageData>> {
        let messages = self
            .messages
            .lock()
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect();

        Ok(messages)
    }
}

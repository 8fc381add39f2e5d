use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, query, query_as, Error as SqlxError, FromRow, PgPool};
use watchroom_core::PlaybackAction;

use crate::{
    ContentData, Database, DatabaseError, IntoDatabaseError, NewRoom, NewRoomMessage,
    ParticipantData, PlaybackData, PrimaryKey, Result, RoomData, RoomMessageData, SessionData,
    UserData,
};

/// A postgres database implementation for watch rooms
pub struct PgDatabase {
    pool: PgPool,
}

#[derive(FromRow)]
struct UserRow {
    id: PrimaryKey,
    username: String,
    display_name: String,
}

#[derive(FromRow)]
struct SessionRow {
    id: PrimaryKey,
    token: String,
    expires_at: DateTime<Utc>,
    user_id: PrimaryKey,
    username: String,
    display_name: String,
}

#[derive(FromRow)]
struct ContentRow {
    id: PrimaryKey,
    title: String,
    duration_seconds: Option<f64>,
}

#[derive(FromRow)]
struct RoomRow {
    id: PrimaryKey,
    content_id: PrimaryKey,
    title: String,
    owner_id: PrimaryKey,
    created_at: DateTime<Utc>,
    is_playing: bool,
    play_position: f64,
    playback_updated_at: DateTime<Utc>,
    last_action: String,
}

#[derive(FromRow)]
struct ParticipantRow {
    room_id: PrimaryKey,
    user_id: PrimaryKey,
    joined_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct MessageRow {
    id: PrimaryKey,
    room_id: PrimaryKey,
    content: String,
    created_at: DateTime<Utc>,
    sender_id: PrimaryKey,
    username: String,
    display_name: String,
}

const ROOM_COLUMNS: &str = "id, content_id, title, owner_id, created_at, is_playing, play_position, playback_updated_at, last_action";

const MESSAGE_SELECT: &str = "
    SELECT
        messages.id,
        messages.room_id,
        messages.content,
        messages.created_at,
        messages.sender_id,
        users.username,
        users.display_name
    FROM watch_room_messages AS messages
        INNER JOIN users ON messages.sender_id = users.id";

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| e.any())?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }

    async fn message_by_id(&self, message_id: PrimaryKey) -> Result<RoomMessageData> {
        let sql = format!("{MESSAGE_SELECT} WHERE messages.id = $1");

        query_as::<_, MessageRow>(&sql)
            .bind(message_id)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("message", "id"))
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        query_as::<_, UserRow>("SELECT id, username, display_name FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("user", "id"))
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        query_as::<_, SessionRow>(
            "SELECT
                sessions.id,
                sessions.token,
                sessions.expires_at,
                sessions.user_id,
                users.username,
                users.display_name
            FROM sessions
                INNER JOIN users ON sessions.user_id = users.id
            WHERE token = $1",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.not_found_or("session", "token"))
    }

    async fn content_by_id(&self, content_id: PrimaryKey) -> Result<ContentData> {
        query_as::<_, ContentRow>("SELECT id, title, duration_seconds FROM contents WHERE id = $1")
            .bind(content_id)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("content", "id"))
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        let mut transaction = self.pool.begin().await.map_err(|e| e.any())?;

        let sql = format!(
            "INSERT INTO watch_rooms (content_id, title, owner_id, created_at, is_playing, play_position, playback_updated_at, last_action)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ROOM_COLUMNS}"
        );

        let row = query_as::<_, RoomRow>(&sql)
            .bind(new_room.content_id)
            .bind(&new_room.title)
            .bind(new_room.owner_id)
            .bind(new_room.created_at)
            .bind(new_room.playback.is_playing)
            .bind(new_room.playback.position)
            .bind(new_room.playback.updated_at)
            .bind(new_room.playback.last_action.to_string())
            .fetch_one(&mut *transaction)
            .await
            .map_err(|e| e.any())?;

        query("INSERT INTO watch_room_participants (room_id, user_id, joined_at) VALUES ($1, $2, $3)")
            .bind(row.id)
            .bind(new_room.owner_id)
            .bind(new_room.created_at)
            .execute(&mut *transaction)
            .await
            .map_err(|e| e.any())?;

        transaction.commit().await.map_err(|e| e.any())?;

        row.try_into()
    }

    async fn save_room(&self, room: &RoomData) -> Result<()> {
        let result = query(
            "UPDATE watch_rooms
            SET title = $1, owner_id = $2, is_playing = $3, play_position = $4, playback_updated_at = $5, last_action = $6
            WHERE id = $7",
        )
        .bind(&room.title)
        .bind(room.owner_id)
        .bind(room.playback.is_playing)
        .bind(room.playback.position)
        .bind(room.playback.updated_at)
        .bind(room.playback.last_action.to_string())
        .bind(room.id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("room", "id"));
        }

        Ok(())
    }

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM watch_rooms WHERE id = $1");

        query_as::<_, RoomRow>(&sql)
            .bind(room_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("room", "id"))?
            .try_into()
    }

    async fn list_rooms(&self) -> Result<Vec<RoomData>> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM watch_rooms ORDER BY id");

        query_as::<_, RoomRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?
            .into_iter()
            .map(TryInto::try_into)
            .collect()
    }

    async fn delete_room(&self, room_id: PrimaryKey) -> Result<()> {
        // Participants and messages are removed by the cascade
        let result = query("DELETE FROM watch_rooms WHERE id = $1")
            .bind(room_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("room", "id"));
        }

        Ok(())
    }

    async fn save_participant(&self, participant: &ParticipantData) -> Result<()> {
        query(
            "INSERT INTO watch_room_participants (room_id, user_id, joined_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (room_id, user_id) DO UPDATE SET joined_at = EXCLUDED.joined_at",
        )
        .bind(participant.room_id)
        .bind(participant.user_id)
        .bind(participant.joined_at)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())
        .map(|_| ())
    }

    async fn participants_by_room(&self, room_id: PrimaryKey) -> Result<Vec<ParticipantData>> {
        let rows = query_as::<_, ParticipantRow>(
            "SELECT room_id, user_id, joined_at FROM watch_room_participants
            WHERE room_id = $1
            ORDER BY joined_at, user_id",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_participant(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        query("DELETE FROM watch_room_participants WHERE room_id = $1 AND user_id = $2")
            .bind(room_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn create_message(&self, new_message: NewRoomMessage) -> Result<RoomMessageData> {
        let (id,): (PrimaryKey,) = query_as(
            "INSERT INTO watch_room_messages (room_id, sender_id, content, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id",
        )
        .bind(new_message.room_id)
        .bind(new_message.sender_id)
        .bind(&new_message.content)
        .bind(new_message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.message_by_id(id).await
    }

    async fn messages_by_room(&self, room_id: PrimaryKey) -> Result<Vec<RoomMessageData>> {
        let sql = format!(
            "{MESSAGE_SELECT} WHERE messages.room_id = $1 ORDER BY messages.created_at, messages.id"
        );

        let rows = query_as::<_, MessageRow>(&sql)
            .bind(room_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

impl From<UserRow> for UserData {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            display_name: row.display_name,
        }
    }
}

impl From<SessionRow> for SessionData {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            token: row.token,
            expires_at: row.expires_at,
            user: UserData {
                id: row.user_id,
                username: row.username,
                display_name: row.display_name,
            },
        }
    }
}

impl From<ContentRow> for ContentData {
    fn from(row: ContentRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            duration: row.duration_seconds,
        }
    }
}

impl From<ParticipantRow> for ParticipantData {
    fn from(row: ParticipantRow) -> Self {
        Self {
            room_id: row.room_id,
            user_id: row.user_id,
            joined_at: row.joined_at,
        }
    }
}

impl From<MessageRow> for RoomMessageData {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            room_id: row.room_id,
            content: row.content,
            created_at: row.created_at,
            sender: UserData {
                id: row.sender_id,
                username: row.username,
                display_name: row.display_name,
            },
        }
    }
}

impl TryFrom<RoomRow> for RoomData {
    type Error = DatabaseError;

    fn try_from(row: RoomRow) -> Result<Self> {
        let last_action: PlaybackAction = row
            .last_action
            .parse()
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self {
            id: row.id,
            content_id: row.content_id,
            title: row.title,
            owner_id: row.owner_id,
            created_at: row.created_at,
            playback: PlaybackData {
                is_playing: row.is_playing,
                position: row.play_position,
                updated_at: row.playback_updated_at,
                last_action,
            },
        })
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}

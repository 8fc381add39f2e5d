use chrono::{DateTime, Utc};
use watchroom_core::{PlaybackAction, PlaybackClock};

pub use watchroom_core::PrimaryKey;

/// A user account, owned by the account system
#[derive(Debug, Clone, PartialEq)]
pub struct UserData {
    pub id: PrimaryKey,
    pub username: String,
    pub display_name: String,
}

/// Login session data for authentication
#[derive(Debug, Clone)]
pub struct SessionData {
    pub id: PrimaryKey,
    /// The session token, or key if you will
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// The user that is logged in
    pub user: UserData,
}

/// A piece of content that can be watched, owned by the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct ContentData {
    pub id: PrimaryKey,
    pub title: String,
    /// Length in seconds, if the catalog knows it
    pub duration: Option<f64>,
}

/// A persisted watch room
#[derive(Debug, Clone, PartialEq)]
pub struct RoomData {
    pub id: PrimaryKey,
    pub content_id: PrimaryKey,
    pub title: String,
    pub owner_id: PrimaryKey,
    pub created_at: DateTime<Utc>,
    pub playback: PlaybackData,
}

/// The persisted form of a [PlaybackClock]
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackData {
    pub is_playing: bool,
    /// Position in seconds at `updated_at`
    pub position: f64,
    pub updated_at: DateTime<Utc>,
    pub last_action: PlaybackAction,
}

/// A user present in a room
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantData {
    pub room_id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub joined_at: DateTime<Utc>,
}

/// A chat message posted in a room
#[derive(Debug, Clone, PartialEq)]
pub struct RoomMessageData {
    pub id: PrimaryKey,
    pub room_id: PrimaryKey,
    pub sender: UserData,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<&PlaybackClock> for PlaybackData {
    fn from(clock: &PlaybackClock) -> Self {
        Self {
            is_playing: clock.is_playing(),
            position: clock.position_at_reference(),
            updated_at: clock.reference_timestamp(),
            last_action: clock.last_action(),
        }
    }
}

impl PlaybackData {
    pub fn to_clock(&self, duration: Option<f64>) -> PlaybackClock {
        PlaybackClock::restore(
            self.is_playing,
            self.position,
            self.updated_at,
            self.last_action,
        )
        .with_duration(duration)
    }
}

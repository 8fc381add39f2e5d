use crate::PrimaryKey;

/// The configuration of the watch room system
#[derive(Debug, Clone)]
pub struct Config {
    /// If true, only the owner of a room may play, pause, or seek.
    /// Otherwise any participant may control playback.
    pub owner_only_control: bool,
    /// How many events a room topic holds for subscribers that fall behind
    pub broadcast_capacity: usize,
    /// The maximum length of a chat message, in characters
    pub max_message_length: usize,
}

impl Config {
    /// Returns true if the given user may control playback in a room owned by `owner`.
    pub fn may_control(&self, owner: Option<PrimaryKey>, user_id: PrimaryKey) -> bool {
        !self.owner_only_control || owner == Some(user_id)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            owner_only_control: false,
            // A few seconds worth of busy room traffic
            broadcast_capacity: 64,
            max_message_length: 1000,
        }
    }
}

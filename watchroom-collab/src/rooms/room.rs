use std::collections::HashMap;

use log::{debug, info, warn};
use parking_lot::Mutex;
use watchroom_core::{
    LeaveOutcome, Participant, PlaybackClock, PlaybackCommand, PlaybackSnapshot, PresenceTracker,
    Timestamp,
};

use crate::{
    CollabContext, ContentData, NewRoomMessage, ParticipantData, PrimaryKey, RoomData,
    RoomMessageData, SyncEvent, UserData,
};

use super::RoomError;

pub type RoomId = PrimaryKey;

/// A watch room, with a shared playback timeline and the users present in it.
///
/// Every mutation happens while holding `state`, including the write to the database
/// and the broadcast of the resulting event, so events go out in the order they were applied.
/// Reads go through `view`, which is replaced after each committed mutation.
pub struct Room {
    id: RoomId,
    context: CollabContext,
    state: tokio::sync::Mutex<RoomState>,
    view: Mutex<RoomView>,
}

struct RoomState {
    data: RoomData,
    content: ContentData,
    clock: PlaybackClock,
    presence: PresenceTracker,
    users: HashMap<PrimaryKey, UserData>,
    /// Set once the last participant leaves. A deleted room accepts nothing.
    deleted: bool,
}

/// The last committed state of a room
#[derive(Debug, Clone)]
struct RoomView {
    data: RoomData,
    content: ContentData,
    clock: PlaybackClock,
    members: Vec<RoomMember>,
    deleted: bool,
}

/// A user present in a room
#[derive(Debug, Clone, PartialEq)]
pub struct RoomMember {
    pub user: UserData,
    pub joined_at: Timestamp,
    /// True if this member currently owns the room
    pub owner: bool,
}

/// Everything there is to know about a room at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSnapshot {
    pub id: RoomId,
    pub title: String,
    pub content: ContentData,
    pub owner_id: PrimaryKey,
    pub created_at: Timestamp,
    /// Sorted by when they joined
    pub members: Vec<RoomMember>,
    pub playback: PlaybackSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveResult {
    /// The user wasn't in the room
    NotMember,
    Left {
        new_owner: Option<PrimaryKey>,
    },
    /// The user was the last one, so the room is gone
    Deleted,
}

impl Room {
    /// Creates the in-memory room for persisted data. Members should be sorted by join time.
    pub fn new(
        context: &CollabContext,
        data: RoomData,
        content: ContentData,
        members: Vec<(ParticipantData, UserData)>,
    ) -> Self {
        let clock = data.playback.to_clock(content.duration);

        let presence = PresenceTracker::restore(
            members.iter().map(|(p, _)| Participant {
                user_id: p.user_id,
                joined_at: p.joined_at,
            }),
            data.owner_id,
        );

        let users = members.into_iter().map(|(_, u)| (u.id, u)).collect();

        let mut data = data;
        data.owner_id = presence.owner().unwrap_or(data.owner_id);

        let state = RoomState {
            data,
            content,
            clock,
            presence,
            users,
            deleted: false,
        };

        Self {
            id: state.data.id,
            context: context.clone(),
            view: state.view().into(),
            state: state.into(),
        }
    }

    /// Adds a user to the room. Joining a room you're already in just describes it.
    pub async fn join(&self, user: UserData) -> Result<RoomSnapshot, RoomError> {
        let mut state = self.state.lock().await;
        state.ensure_exists()?;

        let now = self.now(&state);
        let mut presence = state.presence.clone();
        let outcome = presence.join(user.id, now);

        if outcome.already_member {
            return Ok(state.snapshot(now));
        }

        let participant = ParticipantData {
            room_id: self.id,
            user_id: user.id,
            joined_at: now,
        };

        self.persist(self.context.database.save_participant(&participant).await)?;

        let mut data = state.data.clone();

        if outcome.is_new_owner {
            data.owner_id = user.id;

            if let Err(e) = self.context.database.save_room(&data).await {
                self.undo_participant(user.id).await;
                return Err(self.persistence_failed(e));
            }
        }

        info!("{} joined room {}", user.display_name, data.title);

        state.presence = presence;
        state.users.insert(user.id, user);
        state.data = data;

        self.commit(&state);
        self.context
            .broadcaster
            .publish(state.presence_event(self.id, now));

        Ok(state.snapshot(now))
    }

    /// Removes a user from the room, handing off ownership or deleting the room as needed.
    pub async fn leave(&self, user_id: PrimaryKey) -> Result<LeaveResult, RoomError> {
        let mut state = self.state.lock().await;
        state.ensure_exists()?;

        let now = self.now(&state);
        let mut presence = state.presence.clone();

        let result = match presence.leave(user_id) {
            LeaveOutcome::NotMember => return Ok(LeaveResult::NotMember),
            LeaveOutcome::Emptied => {
                self.persist(self.context.database.delete_room(self.id).await)?;

                info!("Room {} is empty and was deleted", state.data.title);

                state.deleted = true;
                LeaveResult::Deleted
            }
            LeaveOutcome::Left { new_owner, .. } => {
                let mut data = state.data.clone();

                if let Some(owner) = new_owner {
                    data.owner_id = owner;
                    self.persist(self.context.database.save_room(&data).await)?;
                }

                if let Err(e) = self
                    .context
                    .database
                    .delete_participant(self.id, user_id)
                    .await
                {
                    if new_owner.is_some() {
                        self.undo_owner(&state.data).await;
                    }

                    return Err(self.persistence_failed(e));
                }

                if let Some(owner) = new_owner {
                    let name = state
                        .users
                        .get(&owner)
                        .map(|u| u.display_name.as_str())
                        .unwrap_or("Unknown");

                    info!("{} is now the owner of room {}", name, data.title);
                }

                state.data = data;
                LeaveResult::Left { new_owner }
            }
        };

        if let Some(user) = state.users.remove(&user_id) {
            info!("{} left room {}", user.display_name, state.data.title);
        }

        state.presence = presence;

        self.commit(&state);
        self.context
            .broadcaster
            .publish(state.presence_event(self.id, now));

        Ok(result)
    }

    /// Applies a playback command and broadcasts the result to everyone in the room.
    pub async fn control(
        &self,
        user_id: PrimaryKey,
        command: PlaybackCommand,
    ) -> Result<SyncEvent, RoomError> {
        let mut state = self.state.lock().await;
        state.ensure_exists()?;

        if !state.presence.contains(user_id) {
            return Err(RoomError::UserNotInRoom);
        }

        if !self
            .context
            .config
            .may_control(state.presence.owner(), user_id)
        {
            return Err(RoomError::ControlNotPermitted);
        }

        let now = self.now(&state);
        let clock = state.clock.apply(command, now);

        // Repeated play or pause changes nothing, but everyone still gets the current state
        if clock != state.clock {
            let mut data = state.data.clone();
            data.playback = (&clock).into();

            self.persist(self.context.database.save_room(&data).await)?;

            state.data = data;
            state.clock = clock;
            self.commit(&state);
        }

        let event = SyncEvent::Playback {
            room_id: self.id,
            issued_by: user_id,
            snapshot: state.clock.snapshot(command.action(), now),
        };

        debug!(
            "Applied {} in room {} at {:.3}s",
            command.action(),
            state.data.title,
            state.clock.current_position(now)
        );

        self.context.broadcaster.publish(event.clone());
        Ok(event)
    }

    /// Posts a chat message to the room
    pub async fn send_message(
        &self,
        user_id: PrimaryKey,
        content: &str,
    ) -> Result<RoomMessageData, RoomError> {
        let content = content.trim();
        let max_length = self.context.config.max_message_length;

        if content.is_empty() {
            return Err(RoomError::InvalidMessage("Message is empty".to_string()));
        }

        if content.chars().count() > max_length {
            return Err(RoomError::InvalidMessage(format!(
                "Message is longer than {} characters",
                max_length
            )));
        }

        let state = self.state.lock().await;
        state.ensure_exists()?;

        if !state.presence.contains(user_id) {
            return Err(RoomError::UserNotInRoom);
        }

        let new_message = NewRoomMessage {
            room_id: self.id,
            sender_id: user_id,
            content: content.to_string(),
            created_at: self.now(&state),
        };

        let message = self.persist(self.context.database.create_message(new_message).await)?;

        self.context.broadcaster.publish(SyncEvent::Chat {
            room_id: self.id,
            message: message.clone(),
        });

        Ok(message)
    }

    /// Returns the chat history, oldest first. Only members may read it.
    pub async fn messages(&self, user_id: PrimaryKey) -> Result<Vec<RoomMessageData>, RoomError> {
        {
            let view = self.view.lock();

            if view.deleted {
                return Err(RoomError::RoomNotFound);
            }

            if !view.members.iter().any(|m| m.user.id == user_id) {
                return Err(RoomError::UserNotInRoom);
            }
        }

        self.persist(self.context.database.messages_by_room(self.id).await)
    }

    /// Returns the last committed state of the room, without waiting for commands in flight.
    pub fn snapshot(&self) -> Result<RoomSnapshot, RoomError> {
        let view = self.view.lock();

        if view.deleted {
            return Err(RoomError::RoomNotFound);
        }

        Ok(view.snapshot(self.context.time.now()))
    }

    pub fn head_count(&self) -> usize {
        self.view.lock().members.len()
    }

    pub fn is_deleted(&self) -> bool {
        self.view.lock().deleted
    }

    pub fn data(&self) -> RoomData {
        self.view.lock().data.clone()
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    /// Server time, never earlier than the last playback change
    fn now(&self, state: &RoomState) -> Timestamp {
        self.context
            .time
            .now()
            .max(state.clock.reference_timestamp())
    }

    fn commit(&self, state: &RoomState) {
        *self.view.lock() = state.view();
    }

    fn persist<T>(&self, result: crate::Result<T>) -> Result<T, RoomError> {
        result.map_err(|e| self.persistence_failed(e))
    }

    fn persistence_failed(&self, error: crate::DatabaseError) -> RoomError {
        if error.is_not_found("room") {
            return RoomError::RoomNotFound;
        }

        warn!("Could not persist room {}: {}", self.id, error);
        RoomError::PersistenceUnavailable(error.to_string())
    }

    async fn undo_participant(&self, user_id: PrimaryKey) {
        if let Err(e) = self
            .context
            .database
            .delete_participant(self.id, user_id)
            .await
        {
            warn!("Could not undo join of {} in room {}: {}", user_id, self.id, e);
        }
    }

    async fn undo_owner(&self, previous: &RoomData) {
        if let Err(e) = self.context.database.save_room(previous).await {
            warn!("Could not restore owner of room {}: {}", self.id, e);
        }
    }
}

impl RoomState {
    fn ensure_exists(&self) -> Result<(), RoomError> {
        if self.deleted {
            return Err(RoomError::RoomNotFound);
        }

        Ok(())
    }

    fn members(&self) -> Vec<RoomMember> {
        let owner = self.presence.owner();

        self.presence
            .participants()
            .into_iter()
            .filter_map(|p| {
                self.users.get(&p.user_id).map(|user| RoomMember {
                    user: user.clone(),
                    joined_at: p.joined_at,
                    owner: owner == Some(p.user_id),
                })
            })
            .collect()
    }

    fn view(&self) -> RoomView {
        RoomView {
            data: self.data.clone(),
            content: self.content.clone(),
            clock: self.clock.clone(),
            members: self.members(),
            deleted: self.deleted,
        }
    }

    fn snapshot(&self, now: Timestamp) -> RoomSnapshot {
        self.view().snapshot(now)
    }

    fn presence_event(&self, room_id: RoomId, now: Timestamp) -> SyncEvent {
        SyncEvent::Presence {
            room_id,
            members: self.members(),
            owner_id: self.presence.owner(),
            room_deleted: self.deleted,
            server_timestamp: now,
        }
    }
}

impl RoomView {
    fn snapshot(&self, now: Timestamp) -> RoomSnapshot {
        let now = now.max(self.clock.reference_timestamp());

        RoomSnapshot {
            id: self.data.id,
            title: self.data.title.clone(),
            content: self.content.clone(),
            owner_id: self.data.owner_id,
            created_at: self.data.created_at,
            members: self.members.clone(),
            playback: self.clock.snapshot(self.clock.last_action(), now),
        }
    }
}

impl RoomSnapshot {
    pub fn head_count(&self) -> usize {
        self.members.len()
    }
}

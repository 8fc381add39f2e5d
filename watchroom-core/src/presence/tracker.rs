use std::collections::BTreeMap;

use crate::{PrimaryKey, Timestamp};

/// A user currently present in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub user_id: PrimaryKey,
    pub joined_at: Timestamp,
}

/// Keeps track of who is in a single room, and who owns it.
///
/// The owner is always one of the participants, unless the tracker is empty.
/// When the owner leaves, ownership goes to the participant that joined earliest,
/// with ties broken by the lowest user id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceTracker {
    participants: BTreeMap<PrimaryKey, Participant>,
    owner: Option<PrimaryKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    /// True if the user was already a participant and nothing changed
    pub already_member: bool,
    /// True if the user became the owner by joining an empty room
    pub is_new_owner: bool,
    pub participants: Vec<Participant>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LeaveOutcome {
    /// The user was not a participant, so nothing changed
    NotMember,
    /// The user left and others remain
    Left {
        remaining: Vec<Participant>,
        /// Set if the leaver was the owner and ownership was handed off
        new_owner: Option<PrimaryKey>,
    },
    /// The last participant left, so the room should be deleted
    Emptied,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a tracker from persisted participants.
    /// If the persisted owner is no longer present, the successor becomes owner.
    pub fn restore<P>(participants: P, owner: PrimaryKey) -> Self
    where
        P: IntoIterator<Item = Participant>,
    {
        let mut tracker = Self {
            participants: participants
                .into_iter()
                .map(|p| (p.user_id, p))
                .collect(),
            owner: None,
        };

        tracker.owner = if tracker.contains(owner) {
            Some(owner)
        } else {
            tracker.successor()
        };

        tracker
    }

    /// Adds a participant. Joining twice is not an error, it just returns the current state.
    pub fn join(&mut self, user_id: PrimaryKey, now: Timestamp) -> JoinOutcome {
        if self.contains(user_id) {
            return JoinOutcome {
                already_member: true,
                is_new_owner: false,
                participants: self.participants(),
            };
        }

        let is_new_owner = self.participants.is_empty();

        self.participants.insert(
            user_id,
            Participant {
                user_id,
                joined_at: now,
            },
        );

        if is_new_owner {
            self.owner = Some(user_id);
        }

        JoinOutcome {
            already_member: false,
            is_new_owner,
            participants: self.participants(),
        }
    }

    /// Removes a participant, handing off ownership if needed.
    pub fn leave(&mut self, user_id: PrimaryKey) -> LeaveOutcome {
        if self.participants.remove(&user_id).is_none() {
            return LeaveOutcome::NotMember;
        }

        if self.participants.is_empty() {
            self.owner = None;
            return LeaveOutcome::Emptied;
        }

        let mut new_owner = None;

        if self.owner == Some(user_id) {
            self.owner = self.successor();
            new_owner = self.owner;
        }

        LeaveOutcome::Left {
            remaining: self.participants(),
            new_owner,
        }
    }

    /// The number of participants
    pub fn head_count(&self) -> usize {
        self.participants.len()
    }

    pub fn owner(&self) -> Option<PrimaryKey> {
        self.owner
    }

    pub fn contains(&self, user_id: PrimaryKey) -> bool {
        self.participants.contains_key(&user_id)
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn get(&self, user_id: PrimaryKey) -> Option<&Participant> {
        self.participants.get(&user_id)
    }

    /// Returns the participants, ordered by when they joined.
    pub fn participants(&self) -> Vec<Participant> {
        let mut participants: Vec<_> = self.participants.values().cloned().collect();
        participants.sort_by_key(|p| (p.joined_at, p.user_id));
        participants
    }

    /// The participant that would receive ownership next
    fn successor(&self) -> Option<PrimaryKey> {
        self.participants
            .values()
            .min_by_key(|p| (p.joined_at, p.user_id))
            .map(|p| p.user_id)
    }
}

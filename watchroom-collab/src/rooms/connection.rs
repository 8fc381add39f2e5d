use log::{info, warn};
use watchroom_core::{Id, PlaybackCommand, Timestamp};

use crate::{CollabContext, PrimaryKey, RoomMessageData, SyncEvent, UserData};

use super::{RoomError, RoomId, RoomManager, RoomSnapshot};

pub type RoomConnectionId = Id<RoomConnection>;

/// A live connection from a user to a room. A user can have several.
#[derive(Debug, Clone)]
pub struct RoomConnection {
    pub id: RoomConnectionId,
    pub room_id: RoomId,
    pub user_id: PrimaryKey,
    pub connected_at: Timestamp,
}

/// A command sent by a client over a live connection
#[derive(Debug, Clone, PartialEq)]
pub enum RoomCommand {
    Join,
    Leave,
    Control(PlaybackCommand),
    Chat(String),
}

/// What the issuing connection gets back, besides the broadcast
#[derive(Debug, Clone)]
pub enum CommandReply {
    /// The full room state, sent after joining
    Snapshot(RoomSnapshot),
    Applied(SyncEvent),
    Posted(RoomMessageData),
    Left,
}

/// A handle to a live connection, which when dropped removes the [RoomConnection],
/// and makes the user leave the room if it was their last connection to it.
///
/// The leave applies to whoever is still a participant when the last connection goes away,
/// no matter which connection they joined through, or if they became one by creating the room.
pub struct RoomConnectionHandle {
    connection_id: RoomConnectionId,
    room_id: RoomId,
    user: UserData,
    context: CollabContext,
    closed: bool,
}

impl RoomConnectionHandle {
    pub(super) fn new(context: &CollabContext, room_id: RoomId, user: UserData) -> Self {
        let connection = RoomConnection {
            id: RoomConnectionId::new(),
            room_id,
            user_id: user.id,
            connected_at: context.time.now(),
        };

        let connection_id = connection.id;
        context.connections.insert(connection_id, connection);

        info!("{} connected to room {}", user.display_name, room_id);

        Self {
            connection_id,
            room_id,
            user,
            context: context.clone(),
            closed: false,
        }
    }

    pub fn id(&self) -> RoomConnectionId {
        self.connection_id
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn user(&self) -> &UserData {
        &self.user
    }

    /// Runs a command on behalf of the connected user
    pub async fn handle(&self, command: RoomCommand) -> Result<CommandReply, RoomError> {
        let rooms = RoomManager::new(&self.context);
        let user_id = self.user.id;

        match command {
            RoomCommand::Join => rooms
                .join_and_describe(self.room_id, user_id)
                .await
                .map(CommandReply::Snapshot),
            RoomCommand::Leave => {
                rooms.leave(self.room_id, user_id).await?;
                Ok(CommandReply::Left)
            }
            RoomCommand::Control(command) => rooms
                .control_playback(self.room_id, user_id, command)
                .await
                .map(CommandReply::Applied),
            RoomCommand::Chat(content) => rooms
                .send_message(self.room_id, user_id, &content)
                .await
                .map(CommandReply::Posted),
        }
    }

    /// Closes the connection, leaving the room if this was the user's last connection to it
    pub async fn close(mut self) {
        self.closed = true;

        if self.unregister() {
            leave(&self.context, self.room_id, &self.user).await
        }
    }

    /// Removes the connection. Returns true if it was the user's last one to the room.
    fn unregister(&self) -> bool {
        if self.context.connections.remove(&self.connection_id).is_none() {
            return false;
        }

        info!(
            "{} disconnected from room {}",
            self.user.display_name, self.room_id
        );

        let remaining = self
            .context
            .connections
            .iter()
            .any(|c| c.room_id == self.room_id && c.user_id == self.user.id);

        !remaining
    }
}

/// Makes a disconnected user leave, if they're still in the room
async fn leave(context: &CollabContext, room_id: RoomId, user: &UserData) {
    let rooms = RoomManager::new(context);

    match rooms.leave(room_id, user.id).await {
        Ok(()) | Err(RoomError::RoomNotFound) => {}
        Err(e) => warn!(
            "{} could not leave room {} after disconnecting: {}",
            user.display_name, room_id, e
        ),
    }
}

impl Drop for RoomConnectionHandle {
    fn drop(&mut self) {
        if self.closed || !self.unregister() {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                "{} disconnected from room {} outside of a runtime, and stays in it",
                self.user.display_name, self.room_id
            );
            return;
        };

        let context = self.context.clone();
        let room_id = self.room_id;
        let user = self.user.clone();

        runtime.spawn(async move { leave(&context, room_id, &user).await });
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use watchroom_core::Config;

    use crate::{Collab, MemoryDatabase};

    use super::*;

    #[tokio::test]
    async fn test_dropping_last_connection_leaves() {
        let db = Arc::new(MemoryDatabase::new());
        let collab = Collab::new(Config::default(), db.clone());

        let ada = db.insert_user("ada", "Ada");
        let bob = db.insert_user("bob", "Bob");
        let content = db.insert_content("Big Buck Bunny", Some(596.));

        let room = collab
            .rooms
            .create_room(crate::CreateRoom {
                content_id: content.id,
                user_id: ada.id,
                title: None,
            })
            .await
            .unwrap();

        let (first, _events) = collab.rooms.connect(room.id, bob.clone()).unwrap();
        let (second, _more_events) = collab.rooms.connect(room.id, bob.clone()).unwrap();

        first.handle(RoomCommand::Join).await.unwrap();
        assert_eq!(collab.rooms.head_count(room.id).unwrap(), 2);

        // Another connection is still open
        first.close().await;
        assert_eq!(collab.rooms.head_count(room.id).unwrap(), 2);

        drop(second);

        for _ in 0..50 {
            if collab.rooms.head_count(room.id).unwrap() == 1 {
                break;
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(collab.rooms.head_count(room.id).unwrap(), 1);
        assert!(collab.context().connections.is_empty());
    }

    #[tokio::test]
    async fn test_connection_opened_after_join_leaves() {
        let db = Arc::new(MemoryDatabase::new());
        let collab = Collab::new(Config::default(), db.clone());

        let ada = db.insert_user("ada", "Ada");
        let bob = db.insert_user("bob", "Bob");
        let content = db.insert_content("Cosmos Laundromat", Some(730.));

        let room = collab
            .rooms
            .create_room(crate::CreateRoom {
                content_id: content.id,
                user_id: ada.id,
                title: None,
            })
            .await
            .unwrap();

        let (first, _events) = collab.rooms.connect(room.id, bob.clone()).unwrap();
        first.handle(RoomCommand::Join).await.unwrap();

        // A second tab, opened after joining on the first
        let (second, _more_events) = collab.rooms.connect(room.id, bob.clone()).unwrap();

        first.close().await;
        assert_eq!(collab.rooms.head_count(room.id).unwrap(), 2);

        second.close().await;
        assert_eq!(collab.rooms.head_count(room.id).unwrap(), 1);
        assert!(collab.context().connections.is_empty());
    }

    #[tokio::test]
    async fn test_creator_disconnecting_deletes_room() {
        let db = Arc::new(MemoryDatabase::new());
        let collab = Collab::new(Config::default(), db.clone());

        let ada = db.insert_user("ada", "Ada");
        let content = db.insert_content("Sintel", None);

        let room = collab
            .rooms
            .create_room(crate::CreateRoom {
                content_id: content.id,
                user_id: ada.id,
                title: Some("Movie night".to_string()),
            })
            .await
            .unwrap();

        // The creator is a participant without ever sending a join
        let (handle, _events) = collab.rooms.connect(room.id, ada).unwrap();
        handle.close().await;

        assert!(matches!(
            collab.rooms.snapshot(room.id),
            Err(RoomError::RoomNotFound)
        ));
    }

    #[tokio::test]
    async fn test_spectator_disconnecting_changes_nothing() {
        let db = Arc::new(MemoryDatabase::new());
        let collab = Collab::new(Config::default(), db.clone());

        let ada = db.insert_user("ada", "Ada");
        let bob = db.insert_user("bob", "Bob");
        let content = db.insert_content("Sintel", Some(888.));

        let room = collab
            .rooms
            .create_room(crate::CreateRoom {
                content_id: content.id,
                user_id: ada.id,
                title: None,
            })
            .await
            .unwrap();

        let (handle, mut events) = collab.rooms.connect(room.id, bob).unwrap();
        handle.close().await;

        assert_eq!(collab.rooms.head_count(room.id).unwrap(), 1);
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_commands_through_connection() {
        let db = Arc::new(MemoryDatabase::new());
        let collab = Collab::new(Config::default(), db.clone());

        let ada = db.insert_user("ada", "Ada");
        let content = db.insert_content("Tears of Steel", Some(734.));

        let room = collab
            .rooms
            .create_room(crate::CreateRoom {
                content_id: content.id,
                user_id: ada.id,
                title: None,
            })
            .await
            .unwrap();

        let (handle, mut events) = collab.rooms.connect(room.id, ada).unwrap();

        let reply = handle
            .handle(RoomCommand::Control(PlaybackCommand::Seek(30.)))
            .await
            .unwrap();

        let applied = match reply {
            CommandReply::Applied(event) => event,
            other => panic!("expected an applied event, got {:?}", other),
        };

        assert!(matches!(
            events.recv().await,
            Some(crate::Delivery::Event(event)) if event == applied
        ));

        let reply = handle.handle(RoomCommand::Chat("  ".to_string())).await;
        assert!(matches!(reply, Err(RoomError::InvalidMessage(_))));

        handle.handle(RoomCommand::Leave).await.unwrap();
        assert!(matches!(
            collab.rooms.snapshot(room.id),
            Err(RoomError::RoomNotFound)
        ));
    }
}

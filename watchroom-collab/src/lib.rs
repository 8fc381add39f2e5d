mod auth;
mod broadcast;
mod db;
mod events;
mod rooms;
mod util;

use std::sync::Arc;

pub use auth::*;
pub use broadcast::*;
pub use db::*;
pub use events::*;
pub use rooms::*;
pub use util::*;

use dashmap::DashMap;
use watchroom_core::{Config, SystemTime, TimeSource};

type ArcedStore<K, V> = Arc<DashMap<K, Arc<V>>>;

/// The watchroom collab system, facilitating rooms, synchronized playback, authentication, and more.
pub struct Collab {
    context: CollabContext,

    pub auth: Auth,
    pub rooms: RoomManager,
}

/// A type passed to various components of the collab system, to access state and publish events.
#[derive(Clone)]
pub struct CollabContext {
    pub config: Config,
    pub database: SharedDatabase,
    pub time: Arc<dyn TimeSource>,
    pub broadcaster: Arc<SyncBroadcaster>,

    pub rooms: ArcedStore<RoomId, Room>,
    pub connections: Arc<DashMap<RoomConnectionId, RoomConnection>>,
}

impl Collab {
    pub fn new(config: Config, database: SharedDatabase) -> Self {
        Self::with_time(config, database, Arc::new(SystemTime))
    }

    /// Creates the collab system with a custom source of time
    pub fn with_time(config: Config, database: SharedDatabase, time: Arc<dyn TimeSource>) -> Self {
        let context = CollabContext {
            broadcaster: Arc::new(SyncBroadcaster::new(config.broadcast_capacity)),
            config,
            database,
            time,

            rooms: Default::default(),
            connections: Default::default(),
        };

        Self {
            auth: Auth::new(&context),
            rooms: RoomManager::new(&context),
            context,
        }
    }

    pub fn context(&self) -> &CollabContext {
        &self.context
    }
}

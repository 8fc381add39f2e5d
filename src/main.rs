use std::{env, str::FromStr, sync::Arc};

use chrono::{Duration, Utc};
use colored::{Color, Colorize};
use log::{error, info, warn};
use thiserror::Error;
use tokio::runtime::{self, Runtime};
use watchroom_collab::{
    random_string, Collab, DatabaseError, MemoryDatabase, PgDatabase, RoomError, SharedDatabase,
};
use watchroom_core::Config;
use watchroom_server::{run_server, DEFAULT_PORT};

mod logging;

pub struct Watchroom {
    collab: Collab,
    port: u16,
    runtime: Runtime,
}

#[derive(Debug, Error)]
enum WatchroomError {
    #[error("Could not initialize database: {0}")]
    Database(#[from] DatabaseError),

    #[error("Could not restore rooms: {0}")]
    Restore(#[from] RoomError),

    #[error("Invalid value for {name}: {value}")]
    Config { name: &'static str, value: String },

    #[error("Server stopped: {0}")]
    Server(#[from] std::io::Error),

    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl Watchroom {
    fn new() -> Result<Self, WatchroomError> {
        let port = env_var("WATCHROOM_SERVER_PORT", DEFAULT_PORT)?;
        let defaults = Config::default();

        let config = Config {
            owner_only_control: env_var("WATCHROOM_OWNER_ONLY_CONTROL", false)?,
            broadcast_capacity: env_var(
                "WATCHROOM_BROADCAST_CAPACITY",
                defaults.broadcast_capacity,
            )?,
            ..defaults
        };

        info!("Building async runtime...");
        let main_runtime = runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("watchroom-async")
            .build()
            .map_err(|e| WatchroomError::Fatal(e.to_string()))?;

        let database: SharedDatabase = match env::var("WATCHROOM_DATABASE_URL") {
            Ok(url) => {
                info!("Connecting to database...");
                Arc::new(main_runtime.block_on(PgDatabase::new(&url))?)
            }
            Err(_) => {
                warn!("WATCHROOM_DATABASE_URL is not set, rooms will only be kept in memory");
                Arc::new(demo_database()?)
            }
        };

        if config.owner_only_control {
            info!("Only room owners may control playback");
        }

        let collab = Collab::new(config, database);
        main_runtime.block_on(collab.rooms.restore())?;

        Ok(Self {
            collab,
            port,
            runtime: main_runtime,
        })
    }

    fn run(self) -> Result<(), WatchroomError> {
        self.runtime.block_on(run_server(self.collab, self.port))?;

        Ok(())
    }
}

impl WatchroomError {
    fn hint(&self) -> String {
        match self {
            WatchroomError::Database(_) => "This is a database error. Make sure WATCHROOM_DATABASE_URL points to a running Postgres instance, then try again.".to_string(),
            WatchroomError::Restore(_) => "Rooms could not be loaded from the database. Make sure the users and contents tables are intact.".to_string(),
            WatchroomError::Config { name, .. } => format!("Check the value of {} in your environment or .env file.", name),
            WatchroomError::Server(_) => "The server could not listen. Make sure the port is free, or set WATCHROOM_SERVER_PORT.".to_string(),
            WatchroomError::Fatal(_) => "This error is fatal, and should not happen.".to_string(),
        }
    }
}

/// Reads and parses an environment variable, falling back to a default if it isn't set
fn env_var<T: FromStr>(name: &'static str, default: T) -> Result<T, WatchroomError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| WatchroomError::Config { name, value }),
        Err(_) => Ok(default),
    }
}

/// An in-memory database with a user and some content, so the server can be tried out
fn demo_database() -> Result<MemoryDatabase, WatchroomError> {
    let db = MemoryDatabase::new();

    let user = db.insert_user("demo", "Demo");
    db.insert_content("Big Buck Bunny", Some(596.));
    db.insert_content("Sintel", Some(888.));

    let token = random_string(32);
    db.insert_session(user.id, &token, Utc::now() + Duration::days(30))?;

    info!("Demo session token: {}", token);

    Ok(db)
}

fn start() -> Result<(), WatchroomError> {
    let watchroom = Watchroom::new()?;
    info!("Initialized successfully.");

    watchroom.run()
}

fn main() {
    dotenv::dotenv().ok();
    logging::init_logger();

    if let Err(error) = start() {
        error!("{} Read the error below to troubleshoot the issue. If you think this might be a bug, please report it by making a GitHub issue.", "Watchroom failed to start!".bold().color(Color::Red));
        error!("{}", error);
        error!(
            "{}",
            format!("Hint: {}", error.hint())
                .color(Color::BrightBlack)
                .italic()
        );
    }
}

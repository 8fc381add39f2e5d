use std::sync::Arc;

use log::warn;
use thiserror::Error;
use watchroom_core::TimeSource;

use crate::{CollabContext, DatabaseError, SessionData, SharedDatabase, UserData};

/// Resolves identity tokens into users.
///
/// Tokens are issued by the account system, this only checks them.
pub struct Auth {
    db: SharedDatabase,
    time: Arc<dyn TimeSource>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authorization")]
    MissingToken,
    #[error("Session does not exist")]
    InvalidSession,
    #[error("Session has expired")]
    SessionExpired,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
}

impl Auth {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            db: context.database.clone(),
            time: context.time.clone(),
        }
    }

    /// Returns the session of a token, if it exists and hasn't expired
    pub async fn session(&self, token: &str) -> Result<SessionData, AuthError> {
        let token = token.trim();

        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let session = self.db.session_by_token(token).await.map_err(|e| {
            if e.is_not_found("session") {
                AuthError::InvalidSession
            } else {
                warn!("Could not look up session: {}", e);
                AuthError::Db(e)
            }
        })?;

        if session.expires_at <= self.time.now() {
            return Err(AuthError::SessionExpired);
        }

        Ok(session)
    }

    /// Returns the user behind an identity token
    pub async fn identify(&self, token: &str) -> Result<UserData, AuthError> {
        self.session(token).await.map(|s| s.user)
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    let mut parts = header.split_ascii_whitespace();

    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Some(token),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use chrono::Duration;
    use watchroom_core::{Config, ManualTime, TimeSource};

    use crate::{Collab, MemoryDatabase};

    use super::*;

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(bearer_token("Basic abc123"), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Bearer a b"), None);
    }

    #[tokio::test]
    async fn test_identify() {
        let db = Arc::new(MemoryDatabase::new());
        let time = Arc::new(ManualTime::default());
        let collab = Collab::with_time(Config::default(), db.clone(), time.clone());

        let user = db.insert_user("ada", "Ada");
        db.insert_session(user.id, "secret", time.now() + Duration::hours(1))
            .unwrap();

        assert_eq!(collab.auth.identify("secret").await.unwrap(), user);
        assert!(matches!(
            collab.auth.identify("nope").await,
            Err(AuthError::InvalidSession)
        ));
        assert!(matches!(
            collab.auth.identify("  ").await,
            Err(AuthError::MissingToken)
        ));

        time.advance(60. * 60. * 2.);

        assert!(matches!(
            collab.auth.identify("secret").await,
            Err(AuthError::SessionExpired)
        ));
    }
}

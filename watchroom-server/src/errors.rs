use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use watchroom_collab::{AuthError, RoomError};

use crate::serialized::Rejection;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Room(#[from] RoomError),
    #[error("Authorization must be Bearer")]
    MalformedAuthorization,
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::MalformedAuthorization => StatusCode::UNAUTHORIZED,
            Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::Room(e) => match e {
                RoomError::RoomNotFound | RoomError::UserNotFound | RoomError::ContentNotFound => {
                    StatusCode::NOT_FOUND
                }
                RoomError::Unauthorized => StatusCode::UNAUTHORIZED,
                RoomError::InvalidPlaybackCommand(_) | RoomError::InvalidMessage(_) => {
                    StatusCode::BAD_REQUEST
                }
                RoomError::UserNotInRoom | RoomError::ControlNotPermitted => StatusCode::FORBIDDEN,
                RoomError::PersistenceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::MalformedAuthorization => "UNAUTHORIZED",
            Self::InvalidQuery(_) => "INVALID_QUERY",
            Self::Room(e) => e.reason(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = Rejection {
            reason: self.reason().to_string(),
            message: self.to_string(),
        };

        (self.as_status_code(), Json(body)).into_response()
    }
}

impl From<AuthError> for ServerError {
    fn from(value: AuthError) -> Self {
        Self::Room(value.into())
    }
}

#[cfg(test)]
mod test {
    use watchroom_core::PlaybackError;

    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (RoomError::RoomNotFound, StatusCode::NOT_FOUND),
            (RoomError::Unauthorized, StatusCode::UNAUTHORIZED),
            (
                RoomError::InvalidPlaybackCommand(PlaybackError::MissingPosition),
                StatusCode::BAD_REQUEST,
            ),
            (RoomError::ControlNotPermitted, StatusCode::FORBIDDEN),
            (
                RoomError::PersistenceUnavailable("gone".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(ServerError::from(error).into_response().status(), status);
        }

        assert_eq!(
            ServerError::from(AuthError::SessionExpired).reason(),
            "UNAUTHORIZED"
        );
    }

    #[test]
    fn test_malformed_authorization_is_unauthorized() {
        let response = ServerError::MalformedAuthorization.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ServerError::MalformedAuthorization.reason(), "UNAUTHORIZED");
    }
}

use axum::{
    async_trait, debug_handler,
    extract::{FromRef, FromRequestParts, Query},
    http::{header, request::Parts},
    routing::get,
    Json,
};
use serde::Deserialize;
use watchroom_collab::{bearer_token, AuthError, UserData};

use crate::{
    errors::{ServerError, ServerResult},
    serialized::{ToSerialized, User},
    Router, ServerContext,
};

/// The user behind the session token of a request
pub struct Session {
    pub user: UserData,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Reads the token from the Authorization header, or the `token` query parameter
/// for clients that can't set headers, like browser WebSockets.
fn request_token(parts: &Parts) -> ServerResult<String> {
    if let Some(header) = parts.headers.get(header::AUTHORIZATION) {
        let header = header
            .to_str()
            .map_err(|_| ServerError::MalformedAuthorization)?;

        return bearer_token(header)
            .map(ToString::to_string)
            .ok_or(ServerError::MalformedAuthorization);
    }

    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|q| q.0.token)
        .ok_or(AuthError::MissingToken.into())
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    ServerContext: FromRef<S>,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let context = ServerContext::from_ref(state);
        let token = request_token(parts)?;
        let user = context.collab.auth.identify(&token).await?;

        Ok(Self { user })
    }
}

#[utoipa::path(
    get,
    path = "/v1/user",
    tag = "auth",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = User),
        (status = 401, description = "Missing, unknown, or expired session")
    )
)]
#[debug_handler(state = ServerContext)]
async fn user(session: Session) -> Json<User> {
    Json(session.user.to_serialized())
}

pub fn router() -> Router {
    Router::new().route("/user", get(user))
}

#[cfg(test)]
mod test {
    use axum::http::Request;

    use super::*;

    fn parts(uri: &str, authorization: Option<&str>) -> Parts {
        let mut request = Request::builder().uri(uri);

        if let Some(value) = authorization {
            request = request.header(header::AUTHORIZATION, value);
        }

        request.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_request_token() {
        assert_eq!(
            request_token(&parts("/v1/user", Some("Bearer abc"))).unwrap(),
            "abc"
        );
        assert_eq!(
            request_token(&parts("/v1/rooms/1/gateway?token=xyz", None)).unwrap(),
            "xyz"
        );
        assert!(matches!(
            request_token(&parts("/v1/user", Some("Basic abc"))),
            Err(ServerError::MalformedAuthorization)
        ));
        assert_eq!(
            request_token(&parts("/v1/user", None)).unwrap_err().reason(),
            "UNAUTHORIZED"
        );
    }
}

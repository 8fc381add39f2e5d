use std::borrow::BorrowMut;

use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::{schemas, serialized};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::auth::user,
        crate::rooms::list_rooms,
        crate::rooms::room,
        crate::rooms::create_room,
        crate::rooms::messages,
        crate::gateway::gateway,
    ),
    components(schemas(
        serialized::User,
        serialized::Content,
        serialized::Room,
        serialized::RoomListing,
        serialized::RoomListingPage,
        serialized::RoomMember,
        serialized::Playback,
        serialized::RoomMessage,
        serialized::Rejection,
        schemas::NewRoomSchema,
        schemas::RoomSortSchema,
    )),
    modifiers(&Security),
    info(
        description = "watchroom-server exposes endpoints to create, list, and synchronize watch rooms"
    ))
]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.borrow_mut() {
            let scheme = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("Bearer <token>")
                .build();

            components.add_security_scheme("BearerAuth", SecurityScheme::Http(scheme))
        }
    }
}

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_documents_every_route() {
        let api = ApiDoc::openapi();
        let paths: Vec<_> = api.paths.paths.keys().cloned().collect();

        for path in [
            "/v1/user",
            "/v1/rooms",
            "/v1/rooms/{id}",
            "/v1/rooms/{id}/messages",
            "/v1/rooms/{id}/gateway",
        ] {
            assert!(paths.iter().any(|p| p == path), "{} is missing", path);
        }
    }
}

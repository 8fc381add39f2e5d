use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json,
};
use watchroom_collab::CreateRoom;

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    gateway,
    schemas::{NewRoomSchema, RoomListQuery, ValidatedJson},
    serialized::{Rejection, RoomListing, RoomListingPage, RoomMessage, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/rooms",
    tag = "rooms",
    params(RoomListQuery),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = RoomListingPage),
        (status = 400, body = Rejection, description = "The page size or cursor is invalid")
    )
)]
async fn list_rooms(
    _session: Session,
    State(context): State<ServerContext>,
    Query(query): Query<RoomListQuery>,
) -> ServerResult<Json<RoomListingPage>> {
    let page = context.collab.rooms.list_page(&query.try_into()?);

    Ok(Json(page.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}",
    tag = "rooms",
    params(
        ("id" = i32, Path, description = "The id of the room")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = RoomListing),
        (status = 404, body = Rejection, description = "The room doesn't exist")
    )
)]
async fn room(
    _session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
) -> ServerResult<Json<RoomListing>> {
    let room = context.collab.rooms.snapshot(room_id)?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/rooms",
    tag = "rooms",
    request_body = NewRoomSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = RoomListing, description = "The room was created, with the caller as owner"),
        (status = 404, body = Rejection, description = "The content doesn't exist")
    )
)]
async fn create_room(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewRoomSchema>,
) -> ServerResult<Json<RoomListing>> {
    let room = context
        .collab
        .rooms
        .create_room(CreateRoom {
            content_id: body.content_id,
            user_id: session.user.id,
            title: body.title,
        })
        .await?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}/messages",
    tag = "rooms",
    params(
        ("id" = i32, Path, description = "The id of the room")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<RoomMessage>, description = "The chat history, oldest first"),
        (status = 403, body = Rejection, description = "The caller is not in the room")
    )
)]
async fn messages(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
) -> ServerResult<Json<Vec<RoomMessage>>> {
    let messages = context
        .collab
        .rooms
        .messages(room_id, session.user.id)
        .await?;

    Ok(Json(messages.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_rooms).post(create_room))
        .route("/:id", get(room))
        .route("/:id/messages", get(messages))
        .route("/:id/gateway", get(gateway::gateway))
}

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use chrono::DateTime;
use serde::{de::DeserializeOwned, Deserialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;
use watchroom_collab::{RoomCursor, RoomQuery, RoomSort};

use crate::errors::ServerError;

/// How many rooms a page has when the client doesn't say
pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewRoomSchema {
    pub content_id: i32,
    /// Defaults to the title of the content
    #[validate(length(min = 1, max = 128))]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, ToSchema, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoomSortSchema {
    /// Newest first
    #[default]
    CreatedAt,
    /// Most participants first
    HeadCount,
}

#[derive(Debug, Default, IntoParams, Validate, Deserialize)]
#[into_params(parameter_in = Query)]
pub struct RoomListQuery {
    /// Only rooms whose title or content title contains this, ignoring case
    pub q: Option<String>,
    #[param(inline)]
    pub sort: Option<RoomSortSchema>,
    /// How many rooms to return, 20 if not set
    #[validate(range(min = 1, max = 100))]
    pub size: Option<usize>,
    /// The `nextCursor` of the previous page
    pub cursor: Option<String>,
}

impl TryFrom<RoomListQuery> for RoomQuery {
    type Error = ServerError;

    fn try_from(value: RoomListQuery) -> Result<Self, Self::Error> {
        value
            .validate()
            .map_err(|e| ServerError::InvalidQuery(e.to_string()))?;

        let cursor = match value.cursor.as_deref().filter(|c| !c.is_empty()) {
            Some(cursor) => Some(
                decode_cursor(cursor)
                    .ok_or_else(|| ServerError::InvalidQuery("Malformed cursor".to_string()))?,
            ),
            None => None,
        };

        Ok(Self {
            search: value.q,
            sort: match value.sort.unwrap_or_default() {
                RoomSortSchema::CreatedAt => RoomSort::CreatedAt,
                RoomSortSchema::HeadCount => RoomSort::HeadCount,
            },
            limit: Some(value.size.unwrap_or(DEFAULT_PAGE_SIZE)),
            cursor,
        })
    }
}

/// Cursors are opaque to clients, but are just the sort position of a room
pub fn encode_cursor(cursor: &RoomCursor) -> String {
    format!(
        "{}.{}.{}",
        cursor.head_count,
        cursor.created_at.timestamp_millis(),
        cursor.id
    )
}

pub fn decode_cursor(value: &str) -> Option<RoomCursor> {
    let mut parts = value.split('.');

    let head_count = parts.next()?.parse().ok()?;
    let created_at = DateTime::from_timestamp_millis(parts.next()?.parse().ok()?)?;
    let id = parts.next()?.parse().ok()?;

    if parts.next().is_some() {
        return None;
    }

    Some(RoomCursor {
        head_count,
        created_at,
        id,
    })
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = (axum::http::StatusCode, &'static str);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        use axum::http::StatusCode;

        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "JSON parse failed"))?;

        extracted_json
            .0
            .validate()
            .map_err(|_| (StatusCode::BAD_REQUEST, "Request body is invalid"))?;

        Ok(Self(extracted_json.0))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_new_room_validation() {
        let valid: NewRoomSchema =
            serde_json::from_str(r#"{ "contentId": 3, "title": "Movie night" }"#).unwrap();
        let untitled: NewRoomSchema = serde_json::from_str(r#"{ "contentId": 3 }"#).unwrap();
        let empty: NewRoomSchema =
            serde_json::from_str(r#"{ "contentId": 3, "title": "" }"#).unwrap();

        assert!(valid.validate().is_ok());
        assert!(untitled.validate().is_ok());
        assert!(empty.validate().is_err());
        assert!(serde_json::from_str::<NewRoomSchema>(r#"{ "contentId": 3, "slug": "x" }"#).is_err());
    }

    #[test]
    fn test_list_query() {
        let query = RoomQuery::try_from(RoomListQuery {
            q: Some("night".to_string()),
            sort: Some(RoomSortSchema::HeadCount),
            size: Some(5),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(query.sort, RoomSort::HeadCount);
        assert_eq!(query.limit, Some(5));

        let defaults = RoomQuery::try_from(RoomListQuery::default()).unwrap();
        assert_eq!(defaults.sort, RoomSort::CreatedAt);
        assert_eq!(defaults.limit, Some(DEFAULT_PAGE_SIZE));

        let too_big = RoomQuery::try_from(RoomListQuery {
            size: Some(500),
            ..Default::default()
        });

        assert!(matches!(too_big, Err(ServerError::InvalidQuery(_))));
    }

    #[test]
    fn test_cursors() {
        let cursor = RoomCursor {
            head_count: 3,
            created_at: DateTime::from_timestamp_millis(1_717_200_000_123).unwrap(),
            id: 42,
        };

        let encoded = encode_cursor(&cursor);
        assert_eq!(encoded, "3.1717200000123.42");
        assert_eq!(decode_cursor(&encoded), Some(cursor));

        assert_eq!(decode_cursor("3.1717200000123"), None);
        assert_eq!(decode_cursor("3.1717200000123.42.1"), None);
        assert_eq!(decode_cursor("abc"), None);

        let query = RoomQuery::try_from(RoomListQuery {
            cursor: Some("not a cursor".to_string()),
            ..Default::default()
        });

        assert!(matches!(query, Err(ServerError::InvalidQuery(_))));
    }
}

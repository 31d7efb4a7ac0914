use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::repo::{Favorite, List, ListItem};
use crate::media::MediaType;

pub const MAX_LIST_NAME_CHARS: usize = 100;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSummary {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<List> for ListSummary {
    fn from(l: List) -> Self {
        Self {
            id: l.id,
            user_id: l.user_id,
            name: l.name,
            description: l.description,
            image: l.image,
            created_at: l.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDetails {
    #[serde(flatten)]
    pub list: ListSummary,
    pub items: Vec<ListItemDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItemDto {
    pub id: i64,
    pub media_id: i64,
    pub media_type: Option<MediaType>,
    #[serde(with = "time::serde::rfc3339")]
    pub added_at: OffsetDateTime,
}

impl From<ListItem> for ListItemDto {
    fn from(i: ListItem) -> Self {
        Self {
            id: i.id,
            media_id: i.media_id,
            media_type: MediaType::parse(&i.media_type),
            added_at: i.added_at,
        }
    }
}

/// Body of list item and favorite additions.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    pub media_id: i64,
    pub media_type: MediaType,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteDto {
    pub media_id: i64,
    pub media_type: Option<MediaType>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Favorite> for FavoriteDto {
    fn from(f: Favorite) -> Self {
        Self {
            media_id: f.media_id,
            media_type: MediaType::parse(&f.media_type),
            created_at: f.created_at,
        }
    }
}

/// Text fields of the multipart list form.
#[derive(Debug, Default)]
pub struct NewListForm {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl NewListForm {
    pub fn validated(self) -> Result<(String, Option<String>), String> {
        let name = self.name.map(|n| n.trim().to_string()).unwrap_or_default();
        if name.is_empty() {
            return Err("List name is required".into());
        }
        if name.chars().count() > MAX_LIST_NAME_CHARS {
            return Err("List name too long".into());
        }
        let description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        Ok((name, description))
    }
}

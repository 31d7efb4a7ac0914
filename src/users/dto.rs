use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::repo::{ProfileChanges, User};
use crate::{auth::validation::is_valid_email, error::AppError, locale::Locale};

pub const MAX_DISPLAY_NAME_CHARS: usize = 50;
pub const MAX_BIO_CHARS: usize = 500;

/// The signed-in user's own profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub language: Locale,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for ProfileResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            display_name: u.display_name,
            email: u.email,
            bio: u.bio,
            avatar: u.avatar,
            language: Locale::from_tag(&u.language),
            created_at: u.created_at,
        }
    }
}

/// What anyone may see of another user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for PublicProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            display_name: u.display_name,
            bio: u.bio,
            avatar: u.avatar,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Locale>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UpdateProfileRequest {
    /// Normalizes and checks the request. A blank bio clears it to `NULL`.
    pub fn into_changes(self) -> Result<ProfileChanges, AppError> {
        let display_name = match self.display_name.map(|n| n.trim().to_string()) {
            Some(n) if n.is_empty() => {
                return Err(AppError::validation("Display name cannot be empty"))
            }
            Some(n) if n.chars().count() > MAX_DISPLAY_NAME_CHARS => {
                return Err(AppError::validation("Display name too long"))
            }
            other => other,
        };

        let bio = self.bio.map(|b| b.trim().to_string());
        let clear_bio = bio.as_deref().is_some_and(str::is_empty);
        let bio = bio.filter(|b| !b.is_empty());
        if bio.as_ref().is_some_and(|b| b.chars().count() > MAX_BIO_CHARS) {
            return Err(AppError::validation("Bio too long"));
        }

        let email = self.email.map(|e| e.trim().to_lowercase());
        if email.as_deref().is_some_and(|e| !is_valid_email(e)) {
            return Err(AppError::validation("Invalid email"));
        }

        let changes = ProfileChanges {
            display_name,
            bio,
            clear_bio,
            language: self.language.map(|l| l.tag().to_string()),
            email,
        };
        if changes.display_name.is_none()
            && changes.bio.is_none()
            && !changes.clear_bio
            && changes.language.is_none()
            && changes.email.is_none()
        {
            return Err(AppError::validation("Nothing to update"));
        }
        Ok(changes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarResponse {
    pub avatar: String,
}

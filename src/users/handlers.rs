use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{delete, get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use super::{
    dto::{AvatarResponse, ProfileResponse, PublicProfile, UpdateProfileRequest},
    repo::User,
};
use crate::{
    auth::extractors::{cleared_cookie, AuthUser},
    error::{is_unique_violation, AppError},
    extract::{JsonBody, PathParam},
    images::{
        rules::MAX_IMAGE_BYTES,
        services::{multipart_error, read_image_field, remove_stored_image, store_image},
    },
    lists::repo as lists_repo,
    state::AppState,
};

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/users/:identifier", get(get_user))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/user/profile",
            get(get_profile).put(update_profile).post(update_profile),
        )
        .route(
            "/user/avatar",
            post(upload_avatar).layer(DefaultBodyLimit::max(2 * MAX_IMAGE_BYTES)),
        )
        .route("/user/delete", delete(delete_account))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    PathParam(identifier): PathParam<String>,
) -> Result<Json<PublicProfile>, AppError> {
    let user = User::find_by_identifier(&state.db, &identifier)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = User::find_by_id(&state.db, user.id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(payload): JsonBody<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    let changes = payload.into_changes()?;

    User::update_profile(&state.db, user.id, &changes)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                warn!(user_id = user.id, "email already in use");
                AppError::conflict("Email already registered")
            } else {
                e.into()
            }
        })?;

    let updated = User::find_by_id(&state.db, user.id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    info!(user_id = user.id, "profile updated");
    Ok(Json(updated.into()))
}

/// POST /user/avatar (multipart, field `avatar`)
#[instrument(skip(state, mp))]
pub async fn upload_avatar(
    State(state): State<AppState>,
    user: AuthUser,
    mut mp: Multipart,
) -> Result<Json<AvatarResponse>, AppError> {
    let mut upload = None;
    while let Some(field) = mp.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("avatar") {
            upload = Some(read_image_field(field).await?);
            break;
        }
    }
    let upload = upload.ok_or_else(|| AppError::validation("avatar file is required"))?;

    let previous = User::find_by_id(&state.db, user.id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?
        .avatar;

    let url = store_image(&state, &format!("avatars/{}", user.id), upload).await?;
    if let Err(e) = User::set_avatar(&state.db, user.id, &url).await {
        remove_stored_image(&state, &url).await;
        return Err(e.into());
    }
    if let Some(old) = previous.filter(|old| old != &url) {
        remove_stored_image(&state, &old).await;
    }

    info!(user_id = user.id, "avatar updated");
    Ok(Json(AvatarResponse { avatar: url }))
}

#[instrument(skip(state, jar))]
pub async fn delete_account(
    State(state): State<AppState>,
    jar: CookieJar,
    user: AuthUser,
) -> Result<(CookieJar, Json<Value>), AppError> {
    let existing = User::find_by_id(&state.db, user.id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    let list_images = lists_repo::image_urls_for_user(&state.db, user.id).await?;

    User::delete(&state.db, user.id).await?;

    for url in existing.avatar.iter().chain(list_images.iter()) {
        remove_stored_image(&state, url).await;
    }

    info!(user_id = user.id, username = %existing.username, "account deleted");
    Ok((
        jar.remove(cleared_cookie()),
        Json(json!({ "message": "Account deleted" })),
    ))
}

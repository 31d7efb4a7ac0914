use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    dto::{FavoriteDto, ListDetails, ListItemDto, ListSummary, MediaRef, NewListForm},
    repo,
};
use crate::{
    auth::extractors::AuthUser,
    error::{is_unique_violation, AppError},
    extract::{JsonBody, PathParam},
    images::{
        rules::MAX_IMAGE_BYTES,
        services::{multipart_error, read_image_field, remove_stored_image, store_image},
    },
    media::MediaType,
    state::AppState,
};

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/lists/:id", get(get_list))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/lists",
            get(my_lists)
                .post(create_list)
                .layer(DefaultBodyLimit::max(2 * MAX_IMAGE_BYTES)),
        )
        .route("/lists/:id", delete(delete_list))
        .route("/lists/:id/items", post(add_item))
        .route("/lists/:id/items/:item_id", delete(remove_item))
        .route("/favorites", get(list_favorites).post(add_favorite))
        .route("/favorites/:media_type/:media_id", delete(remove_favorite))
}

#[instrument(skip(state))]
pub async fn my_lists(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<ListSummary>>, AppError> {
    let lists = repo::list_by_user(&state.db, user.id).await?;
    Ok(Json(lists.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state))]
pub async fn get_list(
    State(state): State<AppState>,
    PathParam(id): PathParam<i64>,
) -> Result<Json<ListDetails>, AppError> {
    let list = repo::find(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("List not found"))?;
    let items = repo::items(&state.db, id).await?;
    Ok(Json(ListDetails {
        list: list.into(),
        items: items.into_iter().map(Into::into).collect(),
    }))
}

/// POST /lists (multipart: name, description?, image?)
#[instrument(skip(state, mp))]
pub async fn create_list(
    State(state): State<AppState>,
    user: AuthUser,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<ListSummary>), AppError> {
    let mut form = NewListForm::default();
    let mut image = None;
    while let Some(field) = mp.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        let has_file = field.file_name().is_some_and(|f| !f.is_empty());
        match name.as_deref() {
            Some("name") => form.name = Some(field.text().await.map_err(multipart_error)?),
            Some("description") => {
                form.description = Some(field.text().await.map_err(multipart_error)?)
            }
            Some("image") if has_file => image = Some(read_image_field(field).await?),
            _ => {}
        }
    }
    let (name, description) = form.validated().map_err(AppError::Validation)?;

    let image_url = match image {
        Some(img) => Some(store_image(&state, &format!("lists/{}", user.id), img).await?),
        None => None,
    };

    let created = repo::create(
        &state.db,
        user.id,
        &name,
        description.as_deref(),
        image_url.as_deref(),
    )
    .await;
    let list = match created {
        Ok(list) => list,
        Err(e) => {
            if let Some(url) = &image_url {
                remove_stored_image(&state, url).await;
            }
            return Err(e.into());
        }
    };
    info!(user_id = user.id, list_id = list.id, "list created");
    Ok((StatusCode::CREATED, Json(list.into())))
}

#[instrument(skip(state))]
pub async fn delete_list(
    State(state): State<AppState>,
    user: AuthUser,
    PathParam(id): PathParam<i64>,
) -> Result<StatusCode, AppError> {
    let list = repo::find_owned(&state.db, id, user.id)
        .await?
        .ok_or_else(|| AppError::not_found("List not found"))?;
    if !repo::delete_owned(&state.db, id, user.id).await? {
        return Err(AppError::not_found("List not found"));
    }
    if let Some(url) = list.image {
        remove_stored_image(&state, &url).await;
    }
    info!(user_id = user.id, list_id = id, "list deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn add_item(
    State(state): State<AppState>,
    user: AuthUser,
    PathParam(id): PathParam<i64>,
    JsonBody(body): JsonBody<MediaRef>,
) -> Result<(StatusCode, Json<ListItemDto>), AppError> {
    repo::find_owned(&state.db, id, user.id)
        .await?
        .ok_or_else(|| AppError::not_found("List not found"))?;

    let item = repo::add_item(&state.db, id, body.media_id, body.media_type)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::conflict("Already in list")
            } else {
                e.into()
            }
        })?;
    Ok((StatusCode::CREATED, Json(item.into())))
}

#[instrument(skip(state))]
pub async fn remove_item(
    State(state): State<AppState>,
    user: AuthUser,
    PathParam((id, item_id)): PathParam<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    repo::find_owned(&state.db, id, user.id)
        .await?
        .ok_or_else(|| AppError::not_found("List not found"))?;
    if !repo::remove_item(&state.db, id, item_id).await? {
        return Err(AppError::not_found("Item not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn list_favorites(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<FavoriteDto>>, AppError> {
    let favs = repo::favorites(&state.db, user.id).await?;
    Ok(Json(favs.into_iter().map(Into::into).collect()))
}

#[instrument(skip(state))]
pub async fn add_favorite(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(body): JsonBody<MediaRef>,
) -> Result<StatusCode, AppError> {
    repo::add_favorite(&state.db, user.id, body.media_id, body.media_type).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn remove_favorite(
    State(state): State<AppState>,
    user: AuthUser,
    PathParam((media_type, media_id)): PathParam<(String, i64)>,
) -> Result<StatusCode, AppError> {
    let media_type = MediaType::parse(&media_type)
        .ok_or_else(|| AppError::validation("mediaType must be movie or tv"))?;
    if !repo::remove_favorite(&state.db, user.id, media_id, media_type).await? {
        return Err(AppError::not_found("Favorite not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use tracing::{debug, instrument, warn};

use super::{
    catalog::CatalogItem,
    dto::{SearchQuery, SearchResponse, SearchResult},
};
use crate::{
    error::AppError, extract::QueryParams, locale::Locale, media::MediaType, state::AppState,
    users::repo::User,
};

/// Shorter queries are answered with an empty result set.
pub const MIN_QUERY_CHARS: usize = 2;
pub const MAX_USER_RESULTS: i64 = 5;
pub const MAX_RESULTS: usize = 20;

pub fn routes() -> Router<AppState> {
    Router::new().route("/search", get(search))
}

#[instrument(skip(state))]
pub async fn search(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    let query = params.q.trim();
    let locale = params
        .language
        .as_deref()
        .map(Locale::from_tag)
        .unwrap_or_default();

    if query.chars().count() < MIN_QUERY_CHARS {
        return Ok(Json(SearchResponse::default()));
    }

    let (users, media) = tokio::join!(
        User::search(&state.db, query, MAX_USER_RESULTS),
        state.catalog.search(query, locale),
    );
    let users = users?;
    let media = media.unwrap_or_else(|e| {
        warn!(error = %format!("{e:#}"), "catalog search failed; returning local users only");
        Vec::new()
    });

    let results = merge_results(users, media, locale);
    debug!(count = results.len(), "search merged");
    Ok(Json(SearchResponse { results }))
}

/// Local users first, then catalog hits in catalog order.
pub fn merge_results(users: Vec<User>, media: Vec<CatalogItem>, locale: Locale) -> Vec<SearchResult> {
    let users = users.into_iter().map(|u| SearchResult {
        id: u.id.to_string(),
        kind: "user".into(),
        media_type: None,
        link: locale.user_link(&u.username),
        title: u.display_name,
        image: u.avatar,
        year: None,
        username: Some(u.username),
        rating: None,
    });

    let media = media.into_iter().map(|m| {
        let id = m.id.to_string();
        let link = match m.media_type {
            MediaType::Movie => locale.movie_link(&id),
            MediaType::Tv => locale.tv_link(&id),
        };
        SearchResult {
            id,
            kind: m.media_type.as_str().into(),
            media_type: Some(m.media_type.as_str().into()),
            title: m.title,
            image: m.image,
            link,
            year: m.year,
            username: None,
            rating: m.rating,
        }
    });

    users.chain(media).take(MAX_RESULTS).collect()
}

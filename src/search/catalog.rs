//! External media catalog (TMDB `search/multi`).

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::{config::CatalogConfig, locale::Locale, media::MediaType};

/// A movie or TV show returned by the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem {
    pub id: i64,
    pub media_type: MediaType,
    pub title: String,
    pub image: Option<String>,
    pub year: Option<String>,
    pub rating: Option<f32>,
}

#[async_trait]
pub trait MediaCatalog: Send + Sync {
    async fn search(&self, query: &str, locale: Locale) -> anyhow::Result<Vec<CatalogItem>>;
}

pub struct TmdbCatalog {
    http: reqwest::Client,
    cfg: CatalogConfig,
}

impl TmdbCatalog {
    pub fn new(cfg: CatalogConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("build catalog http client")?;
        Ok(Self { http, cfg })
    }
}

#[derive(Debug, Deserialize)]
struct TmdbPage {
    #[serde(default)]
    results: Vec<TmdbHit>,
}

#[derive(Debug, Deserialize)]
struct TmdbHit {
    id: i64,
    #[serde(default)]
    media_type: String,
    title: Option<String>,
    name: Option<String>,
    poster_path: Option<String>,
    release_date: Option<String>,
    first_air_date: Option<String>,
    vote_average: Option<f32>,
}

fn year_of(date: Option<&str>) -> Option<String> {
    date.and_then(|d| d.get(..4))
        .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

impl TmdbHit {
    /// People and unknown kinds are dropped.
    fn into_item(self, image_base: &str) -> Option<CatalogItem> {
        let media_type = MediaType::parse(&self.media_type)?;
        let (title, date) = match media_type {
            MediaType::Movie => (self.title.or(self.name), self.release_date),
            MediaType::Tv => (self.name.or(self.title), self.first_air_date),
        };
        Some(CatalogItem {
            id: self.id,
            media_type,
            title: title.unwrap_or_default(),
            image: self
                .poster_path
                .map(|p| format!("{}{}", image_base.trim_end_matches('/'), p)),
            year: year_of(date.as_deref()),
            rating: self.vote_average,
        })
    }
}

fn parse_page(page: TmdbPage, image_base: &str) -> Vec<CatalogItem> {
    page.results
        .into_iter()
        .filter_map(|hit| hit.into_item(image_base))
        .collect()
}

#[async_trait]
impl MediaCatalog for TmdbCatalog {
    async fn search(&self, query: &str, locale: Locale) -> anyhow::Result<Vec<CatalogItem>> {
        let url = format!("{}/search/multi", self.cfg.base_url.trim_end_matches('/'));
        let page = self
            .http
            .get(&url)
            .query(&[
                ("api_key", self.cfg.api_key.as_str()),
                ("query", query),
                ("language", locale.catalog_language()),
                ("include_adult", "false"),
                ("page", "1"),
            ])
            .send()
            .await
            .context("catalog request")?
            .error_for_status()
            .context("catalog status")?
            .json::<TmdbPage>()
            .await
            .context("catalog body")?;
        let items = parse_page(page, &self.cfg.image_base_url);
        debug!(query, count = items.len(), "catalog search");
        Ok(items)
    }
}

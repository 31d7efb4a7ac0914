//! Typed HTTP client for the REST API, used by Rust front ends.

use async_trait::async_trait;
use reqwest::{multipart, RequestBuilder, Response};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::aggregator::SearchSource;
use crate::{
    auth::dto::{AuthResponse, LoginRequest},
    images::rules::{self, ImageRejection, MAX_IMAGE_MB},
    locale::Locale,
    search::dto::{SearchResponse, SearchResult},
    users::dto::{AvatarResponse, ProfileResponse, PublicProfile, UpdateProfileRequest},
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("upload rejected: {0}")]
    Rejected(#[from] ImageRejection),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{status}: {message}")]
    Api { status: u16, message: String },
}

impl ClientError {
    /// Text for the transient notification shown to the user.
    pub fn notice(&self, locale: Locale) -> String {
        match self {
            ClientError::Rejected(ImageRejection::TooLarge { .. }) => {
                locale.file_too_large_notice(MAX_IMAGE_MB)
            }
            ClientError::Rejected(ImageRejection::UnsupportedType(_)) => {
                locale.unsupported_type_notice().to_string()
            }
            ClientError::Api { status, message } if *status < 500 => message.clone(),
            _ => locale.generic_error_notice().to_string(),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    async fn check(res: Response) -> Result<Response, ClientError> {
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let message = res
            .json::<ErrorBody>()
            .await
            .map(|b| b.message)
            .unwrap_or_else(|_| status.to_string());
        warn!(status = status.as_u16(), %message, "api error");
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Logs in and keeps the returned token for later calls.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<ProfileResponse, ClientError> {
        let res = self
            .http
            .post(self.url("/login"))
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let auth: AuthResponse = Self::check(res).await?.json().await?;
        self.token = Some(auth.token);
        Ok(auth.user)
    }

    /// Forgets the token locally; the server only clears its cookie.
    pub async fn logout(&mut self) -> Result<(), ClientError> {
        let res = self.http.post(self.url("/logout")).send().await;
        self.token = None;
        Self::check(res?).await?;
        Ok(())
    }

    pub async fn profile(&self) -> Result<ProfileResponse, ClientError> {
        let res = self.authed(self.http.get(self.url("/user/profile"))).send().await?;
        Ok(Self::check(res).await?.json().await?)
    }

    pub async fn update_profile(
        &self,
        update: &UpdateProfileRequest,
    ) -> Result<ProfileResponse, ClientError> {
        let res = self
            .authed(self.http.put(self.url("/user/profile")))
            .json(update)
            .send()
            .await?;
        Ok(Self::check(res).await?.json().await?)
    }

    pub async fn user(&self, identifier: &str) -> Result<Option<PublicProfile>, ClientError> {
        let res = self
            .http
            .get(self.url(&format!("/users/{identifier}")))
            .send()
            .await?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::check(res).await?.json().await?))
    }

    /// Uploads a new avatar. Oversized or non-image files are refused locally
    /// and never sent.
    pub async fn upload_avatar(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        file_name: &str,
    ) -> Result<String, ClientError> {
        rules::check_image(bytes.len(), content_type)?;

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)?;
        let form = multipart::Form::new().part("avatar", part);
        let res = self
            .authed(self.http.post(self.url("/user/avatar")))
            .multipart(form)
            .send()
            .await?;
        let body: AvatarResponse = Self::check(res).await?.json().await?;
        Ok(body.avatar)
    }

    pub async fn search(&self, query: &str, locale: Locale) -> Result<Vec<SearchResult>, ClientError> {
        let res = self
            .http
            .get(self.url("/search"))
            .query(&[("q", query), ("language", locale.tag())])
            .send()
            .await?;
        let body: SearchResponse = Self::check(res).await?.json().await?;
        debug!(query, count = body.results.len(), "search response");
        Ok(body.results)
    }
}

#[async_trait]
impl SearchSource for ApiClient {
    async fn search(&self, query: &str, locale: Locale) -> anyhow::Result<Vec<SearchResult>> {
        Ok(ApiClient::search(self, query, locale).await?)
    }
}

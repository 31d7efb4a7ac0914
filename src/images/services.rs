use anyhow::Context;
use axum::extract::multipart::{Field, MultipartError};
use axum::http::StatusCode;
use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};
use uuid::Uuid;

use super::rules::{self, ImageRejection, MAX_IMAGE_MB};
use crate::{error::AppError, state::AppState};

pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

impl From<ImageRejection> for AppError {
    fn from(r: ImageRejection) -> Self {
        match r {
            ImageRejection::TooLarge { .. } => {
                AppError::PayloadTooLarge(format!("Image exceeds the {MAX_IMAGE_MB}MB limit"))
            }
            ImageRejection::UnsupportedType(_) => {
                AppError::validation("Only JPEG, PNG, WEBP or GIF images are allowed")
            }
        }
    }
}

pub fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(format!("Image exceeds the {MAX_IMAGE_MB}MB limit"))
    } else {
        AppError::validation(e.body_text())
    }
}

/// Reads an image field, stopping as soon as it grows past the size limit.
pub async fn read_image_field(mut field: Field<'_>) -> Result<UploadItem, AppError> {
    let content_type = field
        .content_type()
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_else(|| "application/octet-stream".into());
    rules::check_content_type(&content_type)?;

    let mut buf = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        rules::check_size(buf.len() + chunk.len())?;
        buf.extend_from_slice(&chunk);
    }
    if buf.is_empty() {
        return Err(AppError::validation("Image file is empty"));
    }

    Ok(UploadItem {
        body: buf.freeze(),
        content_type,
    })
}

/// Stores the image under `<prefix>/<uuid>.<ext>` and returns its public URL.
pub async fn store_image(st: &AppState, prefix: &str, image: UploadItem) -> anyhow::Result<String> {
    let ext = rules::ext_from_mime(&image.content_type).unwrap_or("bin");
    let key = format!("{}/{}.{}", prefix, Uuid::new_v4(), ext);
    st.storage
        .put_object(&key, image.body, &image.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    debug!(key, "image stored");
    Ok(st.storage.public_url(&key))
}

/// Best-effort removal of a previously stored image; foreign URLs are left alone.
pub async fn remove_stored_image(st: &AppState, url: &str) {
    let Some(key) = st.storage.key_for_url(url) else {
        return;
    };
    if let Err(e) = st.storage.delete_object(key).await {
        warn!(error = %e, key, "delete stored image failed");
    }
}

//! Limits on uploaded images, shared by the upload handlers and the API client.

use thiserror::Error;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const MAX_IMAGE_MB: usize = MAX_IMAGE_BYTES / (1024 * 1024);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageRejection {
    #[error("image is {size} bytes, limit is {MAX_IMAGE_BYTES}")]
    TooLarge { size: usize },
    #[error("unsupported image type {0:?}")]
    UnsupportedType(String),
}

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

pub fn check_content_type(content_type: &str) -> Result<(), ImageRejection> {
    match ext_from_mime(content_type) {
        Some(_) => Ok(()),
        None => Err(ImageRejection::UnsupportedType(content_type.to_string())),
    }
}

pub fn check_size(size: usize) -> Result<(), ImageRejection> {
    if size > MAX_IMAGE_BYTES {
        return Err(ImageRejection::TooLarge { size });
    }
    Ok(())
}

pub fn check_image(size: usize, content_type: &str) -> Result<(), ImageRejection> {
    check_content_type(content_type)?;
    check_size(size)
}

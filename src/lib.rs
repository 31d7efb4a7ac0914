//! ReelReview: backend and client-side plumbing for a bilingual movie/TV review platform.

pub mod app;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod images;
pub mod lists;
pub mod locale;
pub mod media;
pub mod search;
pub mod state;
pub mod storage;
pub mod users;

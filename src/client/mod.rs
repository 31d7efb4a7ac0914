//! Client-side pieces: the typed API client and the debounced search aggregator.

pub mod aggregator;
pub mod api;

//! Utility modules shared across the crate
//!
//! - `url` for URL checks, resolution and log-safe obfuscation
//! - `hash` for deterministic cache keys
//! - `http_client` for the playlist fetcher abstraction

pub mod hash;
pub mod http_client;
pub mod url;

pub use http_client::{FetchedText, PlaylistFetcher, ReqwestPlaylistFetcher};
pub use url::UrlUtils;

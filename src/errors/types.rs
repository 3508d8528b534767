//! Error type definitions for the playback resilience core
//!
//! This module defines all error types used throughout the crate, providing a
//! hierarchical error system. Best-effort paths (playlist filtering, resume
//! saves) convert these into log lines; the core playback path turns them into
//! explicit session transitions.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Playlist fetch / parse errors
    #[error("Playlist error: {0}")]
    Playlist(#[from] PlaylistError),

    /// Catalog collaborator errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Persisted storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while fetching or rewriting HLS playlists
#[derive(Error, Debug)]
pub enum PlaylistError {
    /// The URL is not an HTTP(S) `.m3u8` reference
    #[error("Unsupported playlist URL: {url}")]
    UnsupportedUrl { url: String },

    /// Transport level failure
    #[error("HTTP request failed: {message}")]
    Http { message: String },

    /// Upstream answered with a non-success status
    #[error("HTTP status {status} for {url}")]
    Status { status: u16, url: String },

    /// The fetch did not finish within the configured timeout
    #[error("Timeout while fetching playlist: {url}")]
    Timeout { url: String },

    /// Body was not a usable playlist
    #[error("Unexpected playlist content: {message}")]
    Parse { message: String },

    /// Body exceeded the configured size limit
    #[error("Playlist larger than {limit} bytes: {url}")]
    TooLarge { limit: usize, url: String },

    /// Filtered output no longer references any segment
    #[error("Filtered playlist has no segments")]
    NoSegments,

    /// The unit the work was started for is no longer active
    #[error("Superseded before completion")]
    Superseded,

    /// Cache directory read/write failure
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by the catalog collaborator
#[derive(Error, Debug)]
pub enum CatalogError {
    /// No detail could be produced for the requested title
    #[error("No episodes for '{title}' from source {source_key}")]
    NoEpisodes { title: String, source_key: String },

    /// Unknown source key
    #[error("Unknown source: {source_key}")]
    UnknownSource { source_key: String },

    /// Backend request failed
    #[error("Catalog request failed: {message}")]
    Request { message: String },
}

/// Errors raised by persisted key-value storage
#[derive(Error, Debug)]
pub enum StorageError {
    /// Underlying file could not be read or written
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Data serialization/deserialization failures
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl PlaylistError {
    /// Create an HTTP transport error
    pub fn http<S: Into<String>>(message: S) -> Self {
        Self::Http {
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<U: Into<String>>(url: U) -> Self {
        Self::Timeout { url: url.into() }
    }
}

impl CatalogError {
    /// Create a request failure
    pub fn request<S: Into<String>>(message: S) -> Self {
        Self::Request {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playlist_errors_convert_into_app_error() {
        let err: AppError = PlaylistError::timeout("http://example.com/a.m3u8").into();
        assert!(matches!(err, AppError::Playlist(PlaylistError::Timeout { .. })));
        assert_eq!(
            err.to_string(),
            "Playlist error: Timeout while fetching playlist: http://example.com/a.m3u8"
        );
    }

    #[test]
    fn catalog_error_messages_name_the_source() {
        let err = CatalogError::NoEpisodes {
            title: "Show".into(),
            source_key: "alpha".into(),
        };
        assert_eq!(err.to_string(), "No episodes for 'Show' from source alpha");
    }
}

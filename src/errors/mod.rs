//! Centralized error handling for the playback resilience core
//!
//! # Error Categories
//!
//! - **Playlist Errors**: fetch, parse and cache failures in the filter engine
//! - **Catalog Errors**: detail/source lookups against the remote catalog
//! - **Storage Errors**: persisted resume records, settings and favorites
//! - **Validation / Configuration Errors**: bad input or config files
//!
//! # Usage
//!
//! ```rust
//! use playback_resilience::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for playlist engine Results
pub type PlaylistResult<T> = Result<T, PlaylistError>;

/// Convenience type alias for catalog Results
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Convenience type alias for storage Results
pub type StorageResult<T> = Result<T, StorageError>;

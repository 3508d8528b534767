//! Playlist Filter Engine
//!
//! Turns a remote HLS playlist into a locally cached copy with ad-insertion
//! markers removed and every URI made absolute, so the render engine can play
//! it straight from disk.
//!
//! - `parser`: pure, line-oriented helpers (ad-marker set, variant parsing, rewrite)
//! - `engine`: fetch, master→media resolution, cache management

pub mod engine;
pub mod parser;

pub use engine::{FilteredPlaylist, PlaylistFilterEngine};
pub use parser::{filter_and_normalize_media_playlist, AD_MARKER_TAGS};

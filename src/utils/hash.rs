//! Deterministic cache keys
//!
//! The same input always produces the same key, so rewritten playlists land at a
//! stable path and concurrent writers for one URL target the same file.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Hash a string to a fixed-width lowercase hex key (16 digits).
///
/// ```rust
/// use playback_resilience::utils::hash::stable_hash_hex;
///
/// let a = stable_hash_hex("https://cdn.example.com/a.m3u8");
/// assert_eq!(a, stable_hash_hex("https://cdn.example.com/a.m3u8"));
/// assert_eq!(a.len(), 16);
/// ```
pub fn stable_hash_hex(input: &str) -> String {
    let mut hasher = DefaultHasher::new();
    input.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

//! Feature implementations for rallysync.
//!
//! - Offline sync: write queue, cache, connectivity
//! - Match statistics export

pub mod export;
pub mod sync;

//! Output formatting for rallysync.
//!
//! Pretty and JSON renderings of queue, cache, and export results.

mod json;
mod pretty;

use crate::cli::args::OutputFormat;
use crate::error::RallyError;
use crate::features::sync::{CacheEntry, PendingOperation};

pub use json::*;
pub use pretty::*;

/// Format pending operations based on output format
///
/// # Errors
///
/// Returns `RallyError::Parse` if JSON serialization fails.
pub fn format_pending(ops: &[PendingOperation], format: OutputFormat) -> Result<String, RallyError> {
    match format {
        OutputFormat::Pretty => Ok(format_pending_pretty(ops)),
        OutputFormat::Json => format_pending_json(ops),
    }
}

/// Format a cached snapshot based on output format
///
/// # Errors
///
/// Returns `RallyError::Parse` if JSON serialization fails.
pub fn format_cache_entry(entry: &CacheEntry, format: OutputFormat) -> Result<String, RallyError> {
    match format {
        OutputFormat::Pretty => Ok(format_cache_entry_pretty(entry)),
        OutputFormat::Json => format_cache_entry_json(entry),
    }
}

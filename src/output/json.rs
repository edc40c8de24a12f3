//! JSON output formatting for rallysync.

use serde::Serialize;
use serde_json::json;

use crate::error::RallyError;
use crate::features::sync::{CacheEntry, PendingOperation};

/// Format pending operations as JSON
///
/// # Errors
///
/// Returns `RallyError::Parse` if JSON serialization fails.
pub fn format_pending_json(ops: &[PendingOperation]) -> Result<String, RallyError> {
    let output = json!({
        "count": ops.len(),
        "items": ops
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format a cached snapshot as JSON
///
/// # Errors
///
/// Returns `RallyError::Parse` if JSON serialization fails.
pub fn format_cache_entry_json(entry: &CacheEntry) -> Result<String, RallyError> {
    Ok(serde_json::to_string_pretty(entry)?)
}

/// Generic JSON formatter for any serializable type
///
/// # Errors
///
/// Returns `RallyError::Parse` if JSON serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, RallyError> {
    Ok(serde_json::to_string_pretty(value)?)
}

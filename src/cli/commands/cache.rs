//! Cache command implementation.

use crate::cli::args::{CacheCommands, OutputFormat};
use crate::error::RallyError;
use crate::features::sync::{Collection, FetchQuery, OfflineSync};
use crate::output::{format_cache_entry, format_cached_collections_pretty, to_json};

/// Execute cache subcommands.
///
/// # Errors
///
/// Returns an error if the table is not cached, the fetch fails with nothing
/// to fall back to, or the cache cannot be read or cleared.
pub async fn cache(
    sync: &OfflineSync,
    cmd: CacheCommands,
    format: OutputFormat,
) -> Result<String, RallyError> {
    match cmd {
        CacheCommands::Get { collection: None } => {
            let collections = sync.cached_collections()?;
            match format {
                OutputFormat::Json => to_json(&serde_json::json!({
                    "collections": collections,
                    "last_sync": sync.last_sync_time(),
                })),
                OutputFormat::Pretty => Ok(format_cached_collections_pretty(
                    &collections,
                    sync.last_sync_time(),
                )),
            }
        }
        CacheCommands::Get {
            collection: Some(name),
        } => {
            let collection = Collection::new(&name)?;
            let entry = sync
                .cache_get(&collection)
                .ok_or_else(|| RallyError::NotFound(format!("No cached data for {collection}")))?;
            format_cache_entry(&entry, format)
        }
        CacheCommands::Fetch {
            collection,
            select,
            filters,
            order,
            desc,
            limit,
        } => {
            let collection = Collection::new(&collection)?;
            let query = build_query(select, &filters, order, desc, limit)?;

            sync.probe().await;
            let entry = sync.refresh(&collection, &query).await?;
            format_cache_entry(&entry, format)
        }
        CacheCommands::Clear => {
            let count = sync.clear_cache()?;
            match format {
                OutputFormat::Json => to_json(&serde_json::json!({"cleared": count})),
                OutputFormat::Pretty => Ok(format!("Cleared {count} cached table(s)")),
            }
        }
    }
}

/// Turn `--select`, `--eq COLUMN=VALUE`, `--order`/`--desc` and `--limit` into a query.
fn build_query(
    select: Option<String>,
    filters: &[String],
    order: Option<String>,
    desc: bool,
    limit: Option<usize>,
) -> Result<FetchQuery, RallyError> {
    let mut query = FetchQuery::all();
    if let Some(columns) = select {
        query = query.select(columns);
    }

    for filter in filters {
        let (column, value) = filter
            .split_once('=')
            .filter(|(column, _)| !column.trim().is_empty())
            .ok_or_else(|| {
                RallyError::InvalidOperation(format!("Expected COLUMN=VALUE, got '{filter}'"))
            })?;
        query = query.eq(column.trim(), value);
    }

    if let Some(column) = order {
        query = query.order(column);
        if desc {
            query = query.descending();
        }
    }
    if let Some(rows) = limit {
        query = query.limit(rows);
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_query() {
        let query = build_query(
            Some("id,title".to_string()),
            &["team_id=t1".to_string()],
            Some("date".to_string()),
            true,
            Some(5),
        )
        .unwrap();

        assert_eq!(query.select.as_deref(), Some("id,title"));
        assert_eq!(query.eq, vec![("team_id".to_string(), "t1".to_string())]);
        assert_eq!(query.order.as_deref(), Some("date"));
        assert!(query.descending);
        assert_eq!(query.limit, Some(5));
    }

    #[test]
    fn test_build_query_rejects_bad_filter() {
        assert!(build_query(None, &["team_id".to_string()], None, false, None).is_err());
        assert!(build_query(None, &["=t1".to_string()], None, false, None).is_err());
    }
}

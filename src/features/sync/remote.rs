//! Remote store interface and its REST implementation.
//!
//! The backend speaks PostgREST conventions: one route per table under
//! `/rest/v1/`, row filters as `column=op.value` query parameters.

use std::cmp::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;

use super::operation::{Collection, Payload, PendingOperation, Record};
use crate::config::RemoteConfig;
use crate::error::RallyError;

/// Row filter for [`RemoteStore::fetch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchQuery {
    /// Column list in PostgREST `select` syntax; `*` when empty.
    pub select: Option<String>,
    /// Equality filters.
    pub eq: Vec<(String, String)>,
    /// Inclusive lower bounds.
    pub gte: Vec<(String, String)>,
    /// Inclusive upper bounds.
    pub lte: Vec<(String, String)>,
    /// Sort column, ascending unless `descending` is set.
    pub order: Option<String>,
    /// Sort direction for `order`.
    pub descending: bool,
    /// Maximum number of rows.
    pub limit: Option<usize>,
}

impl FetchQuery {
    /// Query returning every row.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Set the `select` clause.
    #[must_use]
    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.select = Some(columns.into());
        self
    }

    /// Add an equality filter.
    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.eq.push((column.into(), value.into()));
        self
    }

    /// Add an inclusive lower bound.
    #[must_use]
    pub fn gte(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.gte.push((column.into(), value.into()));
        self
    }

    /// Add an inclusive upper bound.
    #[must_use]
    pub fn lte(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.lte.push((column.into(), value.into()));
        self
    }

    /// Sort ascending by a column.
    #[must_use]
    pub fn order(mut self, column: impl Into<String>) -> Self {
        self.order = Some(column.into());
        self
    }

    /// Sort descending instead.
    #[must_use]
    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    /// Cap the number of rows.
    #[must_use]
    pub fn limit(mut self, rows: usize) -> Self {
        self.limit = Some(rows);
        self
    }

    /// Whether the query can leave rows out, so its result is not a full
    /// snapshot of the table.
    #[must_use]
    pub fn narrows_rows(&self) -> bool {
        !self.eq.is_empty() || !self.gte.is_empty() || !self.lte.is_empty() || self.limit.is_some()
    }

    /// Apply the row filters, ordering and limit to already fetched rows.
    ///
    /// Columns may name a field of an embedded object (`matches.date`). A row
    /// missing a filtered column is dropped. Values compare as numbers when
    /// both sides parse as numbers, as text otherwise. Anything that is not an
    /// array is returned unchanged.
    #[must_use]
    pub fn filter_rows(&self, data: &Value) -> Value {
        let Some(rows) = data.as_array() else {
            return data.clone();
        };

        let keep = |row: &Value| {
            self.eq
                .iter()
                .all(|(column, value)| compare(row, column, value) == Some(Ordering::Equal))
                && self.gte.iter().all(|(column, value)| {
                    compare(row, column, value).is_some_and(Ordering::is_ge)
                })
                && self.lte.iter().all(|(column, value)| {
                    compare(row, column, value).is_some_and(Ordering::is_le)
                })
        };

        let mut kept: Vec<Value> = rows.iter().filter(|row| keep(row)).cloned().collect();

        if let Some(column) = &self.order {
            kept.sort_by(|a, b| {
                let ordering = match (cell(a, column), cell(b, column)) {
                    (Some(a), Some(b)) => compare_text(&a, &b),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                if self.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }
        if let Some(limit) = self.limit {
            kept.truncate(limit);
        }

        Value::Array(kept)
    }

    /// Render as PostgREST query parameters.
    #[must_use]
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![(
            "select".to_string(),
            self.select.clone().unwrap_or_else(|| "*".to_string()),
        )];

        for (column, value) in &self.eq {
            params.push((column.clone(), format!("eq.{value}")));
        }
        for (column, value) in &self.gte {
            params.push((column.clone(), format!("gte.{value}")));
        }
        for (column, value) in &self.lte {
            params.push((column.clone(), format!("lte.{value}")));
        }
        if let Some(column) = &self.order {
            let direction = if self.descending { "desc" } else { "asc" };
            params.push(("order".to_string(), format!("{column}.{direction}")));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        params
    }
}

/// Text of the field at `path` (dot separated) in `row`; `None` when absent,
/// null, or not a scalar.
fn cell(row: &Value, path: &str) -> Option<String> {
    let value = path
        .split('.')
        .try_fold(row, |value, key| value.get(key))?;
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn compare(row: &Value, column: &str, value: &str) -> Option<Ordering> {
    cell(row, column).map(|found| compare_text(&found, value))
}

fn compare_text(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

/// The hosted data store the queue replays writes against.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create a record.
    async fn insert(&self, collection: &Collection, record: &Record) -> Result<(), RallyError>;

    /// Overwrite the given fields of record `id`.
    async fn update(
        &self,
        collection: &Collection,
        id: &str,
        record: &Record,
    ) -> Result<(), RallyError>;

    /// Remove record `id`.
    async fn delete(&self, collection: &Collection, id: &str) -> Result<(), RallyError>;

    /// Read rows matching `query`.
    async fn fetch(&self, collection: &Collection, query: &FetchQuery) -> Result<Value, RallyError>;

    /// Whether the store is reachable right now.
    async fn ping(&self) -> bool;
}

/// Replay one queued operation against the remote store.
///
/// # Errors
///
/// Returns whatever error the remote store reports.
pub async fn apply(remote: &dyn RemoteStore, op: &PendingOperation) -> Result<(), RallyError> {
    match &op.payload {
        Payload::Insert { record } => remote.insert(&op.collection, record).await,
        Payload::Update { id, record } => remote.update(&op.collection, id, record).await,
        Payload::Delete { id } => remote.delete(&op.collection, id).await,
    }
}

/// [`RemoteStore`] over HTTP.
pub struct RestRemoteStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestRemoteStore {
    /// Create a client for the backend at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RallyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RallyError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Create a client from the `remote` config section.
    ///
    /// # Errors
    ///
    /// Returns an error if no URL is configured or the client cannot be built.
    pub fn from_config(config: &RemoteConfig) -> Result<Self, RallyError> {
        let url = config
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| RallyError::Config("remote.url is not set".to_string()))?;

        Self::new(url, config.api_key.clone(), config.timeout())
    }

    fn table_url(&self, collection: &Collection) -> String {
        format!("{}/rest/v1/{}", self.base_url, collection.as_str())
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder.header("apikey", key).bearer_auth(key);
        }
        builder
    }

    async fn send(builder: RequestBuilder) -> Result<Response, RallyError> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(RallyError::Remote {
            status: Some(status.as_u16()),
            message: if message.is_empty() {
                status.to_string()
            } else {
                message
            },
        })
    }
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn insert(&self, collection: &Collection, record: &Record) -> Result<(), RallyError> {
        let builder = self
            .request(Method::POST, &self.table_url(collection))
            .header("Prefer", "return=minimal")
            .json(record);

        Self::send(builder).await.map(drop)
    }

    async fn update(
        &self,
        collection: &Collection,
        id: &str,
        record: &Record,
    ) -> Result<(), RallyError> {
        let builder = self
            .request(Method::PATCH, &self.table_url(collection))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal")
            .json(record);

        Self::send(builder).await.map(drop)
    }

    async fn delete(&self, collection: &Collection, id: &str) -> Result<(), RallyError> {
        let builder = self
            .request(Method::DELETE, &self.table_url(collection))
            .query(&[("id", format!("eq.{id}"))]);

        Self::send(builder).await.map(drop)
    }

    async fn fetch(&self, collection: &Collection, query: &FetchQuery) -> Result<Value, RallyError> {
        let builder = self
            .request(Method::GET, &self.table_url(collection))
            .query(&query.to_params());

        let response = Self::send(builder).await?;
        Ok(response.json::<Value>().await?)
    }

    async fn ping(&self) -> bool {
        let url = format!("{}/rest/v1/", self.base_url);
        match self.request(Method::GET, &url).send().await {
            Ok(response) => !response.status().is_server_error(),
            Err(e) => {
                tracing::debug!("Remote ping failed: {e}");
                false
            }
        }
    }
}

/// [`RemoteStore`] used when no backend is configured: always offline.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unconfigured;

#[async_trait]
impl RemoteStore for Unconfigured {
    async fn insert(&self, _: &Collection, _: &Record) -> Result<(), RallyError> {
        Err(not_configured())
    }

    async fn update(&self, _: &Collection, _: &str, _: &Record) -> Result<(), RallyError> {
        Err(not_configured())
    }

    async fn delete(&self, _: &Collection, _: &str) -> Result<(), RallyError> {
        Err(not_configured())
    }

    async fn fetch(&self, _: &Collection, _: &FetchQuery) -> Result<Value, RallyError> {
        Err(not_configured())
    }

    async fn ping(&self) -> bool {
        false
    }
}

fn not_configured() -> RallyError {
    RallyError::transport("No remote store configured (set remote.url)")
}

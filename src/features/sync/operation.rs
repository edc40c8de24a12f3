//! Operation types for the sync queue.
//!
//! Defines the deferred writes that can be queued and their payloads.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RallyError;

/// A record body: the column/value object sent to the remote store.
pub type Record = Map<String, Value>;

/// Tables known to the team backend.
pub mod collections {
    pub const USERS: &str = "users";
    pub const TEAMS: &str = "teams";
    pub const EVENTS: &str = "events";
    pub const ATTENDANCE: &str = "attendance";
    pub const PERFORMANCE_STATS: &str = "performance_stats";
    pub const MESSAGES: &str = "messages";
    pub const RESOURCES: &str = "resources";
    pub const FORMATIONS: &str = "formations";
    pub const PLAYS: &str = "plays";
    pub const ROTATIONS: &str = "rotations";
    pub const MATCH_STATS: &str = "match_stats";

    /// Every known table, in schema order.
    pub const ALL: &[&str] = &[
        USERS,
        TEAMS,
        EVENTS,
        ATTENDANCE,
        PERFORMANCE_STATS,
        MESSAGES,
        RESOURCES,
        FORMATIONS,
        PLAYS,
        ROTATIONS,
        MATCH_STATS,
    ];
}

/// Name of a remote table. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Collection(String);

impl Collection {
    /// Create a collection name, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `RallyError::InvalidOperation` if the name is empty.
    pub fn new(name: impl AsRef<str>) -> Result<Self, RallyError> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(RallyError::InvalidOperation(
                "Collection name must not be empty".to_string(),
            ));
        }
        Ok(Self(name.to_string()))
    }

    /// The collection name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is one of the tables in [`collections::ALL`].
    #[must_use]
    pub fn is_known(&self) -> bool {
        collections::ALL.contains(&self.0.as_str())
    }
}

impl TryFrom<String> for Collection {
    type Error = RallyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Collection> for String {
    fn from(value: Collection) -> Self {
        value.0
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of deferred write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Create a record
    Insert,
    /// Modify a record by id
    Update,
    /// Remove a record by id
    Delete,
}

impl OperationKind {
    /// Get the display name for this kind.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Insert => "Insert",
            Self::Update => "Update",
            Self::Delete => "Delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for OperationKind {
    type Err = RallyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "insert" | "add" | "create" => Ok(Self::Insert),
            "update" | "edit" => Ok(Self::Update),
            "delete" | "remove" => Ok(Self::Delete),
            _ => Err(RallyError::InvalidOperation(format!(
                "Unknown operation kind: {s}"
            ))),
        }
    }
}

/// Body of a deferred write, shaped per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// Fields of the record to create.
    Insert { record: Record },
    /// Target id and the fields to write.
    Update { id: String, record: Record },
    /// Target id.
    Delete { id: String },
}

impl Payload {
    /// Build a payload from a loosely shaped JSON value.
    ///
    /// Insert and Update need a JSON object; Update and Delete need an `id`
    /// field holding a non-empty string or a number.
    ///
    /// # Errors
    ///
    /// Returns `RallyError::InvalidOperation` if the value has the wrong shape.
    pub fn from_record(kind: OperationKind, value: Value) -> Result<Self, RallyError> {
        let Value::Object(record) = value else {
            return Err(RallyError::InvalidOperation(format!(
                "{kind} payload must be a JSON object"
            )));
        };

        match kind {
            OperationKind::Insert => Ok(Self::Insert { record }),
            OperationKind::Update => {
                let id = record_id(&record, kind)?;
                Ok(Self::Update { id, record })
            }
            OperationKind::Delete => {
                let id = record_id(&record, kind)?;
                Ok(Self::Delete { id })
            }
        }
    }

    /// The kind of write this payload describes.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Insert { .. } => OperationKind::Insert,
            Self::Update { .. } => OperationKind::Update,
            Self::Delete { .. } => OperationKind::Delete,
        }
    }

    /// Target record id, if the kind carries one.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Insert { .. } => None,
            Self::Update { id, .. } | Self::Delete { id } => Some(id),
        }
    }
}

fn record_id(record: &Record, kind: OperationKind) -> Result<String, RallyError> {
    match record.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(RallyError::InvalidOperation(format!(
            "{kind} payload requires an `id` field"
        ))),
    }
}

/// A write waiting to be replayed against the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Target table
    pub collection: Collection,
    /// What to write
    #[serde(flatten)]
    pub payload: Payload,
    /// When the operation was queued; ordering and debugging only
    pub enqueued_at: DateTime<Utc>,
}

impl PendingOperation {
    /// Create an operation stamped with the current time.
    #[must_use]
    pub fn new(collection: Collection, payload: Payload) -> Self {
        Self {
            collection,
            payload,
            enqueued_at: Utc::now(),
        }
    }

    /// The kind of write.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.payload.kind()
    }

    /// Short human-readable description, e.g. `Update events#42`.
    #[must_use]
    pub fn describe(&self) -> String {
        match self.payload.id() {
            Some(id) => format!("{} {}#{id}", self.kind(), self.collection),
            None => format!("{} {}", self.kind(), self.collection),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_rejects_empty() {
        assert!(Collection::new("").is_err());
        assert!(Collection::new("   ").is_err());
        assert_eq!(Collection::new(" events ").unwrap().as_str(), "events");
    }

    #[test]
    fn test_collection_is_known() {
        assert!(Collection::new(collections::EVENTS).unwrap().is_known());
        assert!(!Collection::new("scratch").unwrap().is_known());
    }

    #[test]
    fn test_collection_deserialize_rejects_empty() {
        let parsed: Result<Collection, _> = serde_json::from_str("\"\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_operation_kind_from_str() {
        assert_eq!("insert".parse::<OperationKind>().unwrap(), OperationKind::Insert);
        assert_eq!("UPDATE".parse::<OperationKind>().unwrap(), OperationKind::Update);
        assert_eq!("remove".parse::<OperationKind>().unwrap(), OperationKind::Delete);
        assert!("upsert".parse::<OperationKind>().is_err());
    }

    #[test]
    fn test_payload_insert() {
        let payload =
            Payload::from_record(OperationKind::Insert, json!({"title": "Practice"})).unwrap();
        assert_eq!(payload.kind(), OperationKind::Insert);
        assert_eq!(payload.id(), None);
    }

    #[test]
    fn test_payload_update_requires_id() {
        let err = Payload::from_record(OperationKind::Update, json!({"title": "Practice"}));
        assert!(matches!(err, Err(RallyError::InvalidOperation(_))));

        let payload =
            Payload::from_record(OperationKind::Update, json!({"id": 42, "title": "Match"}))
                .unwrap();
        assert_eq!(payload.id(), Some("42"));
    }

    #[test]
    fn test_payload_delete_rejects_blank_id() {
        assert!(Payload::from_record(OperationKind::Delete, json!({"id": ""})).is_err());
        let payload =
            Payload::from_record(OperationKind::Delete, json!({"id": "evt-1"})).unwrap();
        assert_eq!(payload, Payload::Delete { id: "evt-1".to_string() });
    }

    #[test]
    fn test_payload_rejects_non_object() {
        assert!(Payload::from_record(OperationKind::Insert, json!(["a", "b"])).is_err());
        assert!(Payload::from_record(OperationKind::Insert, json!("title")).is_err());
    }

    #[test]
    fn test_persisted_shape() {
        let op = PendingOperation::new(
            Collection::new("events").unwrap(),
            Payload::Delete { id: "7".to_string() },
        );
        let value = serde_json::to_value(&op).unwrap();

        assert_eq!(value["collection"], "events");
        assert_eq!(value["kind"], "delete");
        assert_eq!(value["id"], "7");

        let back: PendingOperation = serde_json::from_value(value).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn test_describe() {
        let op = PendingOperation::new(
            Collection::new("events").unwrap(),
            Payload::Update {
                id: "42".to_string(),
                record: Record::new(),
            },
        );
        assert_eq!(op.describe(), "Update events#42");
    }
}

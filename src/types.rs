//! Core types for documents, queries and timestamps.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;

/// Collection holding code snippets.
pub const SNIPPETS: &str = "snippets";

/// Collection holding scraping snippets.
pub const SCRAPING_SNIPPETS: &str = "scraping_snippets";

/// Collection holding the visitor counter document.
pub const VISITORS: &str = "visitors";

/// Collection of registered users (only counted).
pub const USERS: &str = "users";

/// Id of the singleton visitor counter document.
pub const TOTAL_VISITORS: &str = "total_visitors";

/// Length of a generated document id, in hex characters.
const GENERATED_ID_LEN: usize = 20;

/// Field map of a document.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Store-assigned document identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        DocumentId(id.into())
    }

    /// Derive a fresh id from the collection, a per-store counter and the clock.
    pub fn generate(collection: &str, counter: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(collection.as_bytes());
        hasher.update(counter.to_le_bytes());
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        hasher.update(nanos.to_le_bytes());
        let digest = hex::encode(hasher.finalize());
        DocumentId(digest[..GENERATED_ID_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        DocumentId(s.to_string())
    }
}

/// A UTC instant, stored as an ISO 8601 string with millisecond precision.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// Current time, truncated to milliseconds.
    pub fn now() -> Self {
        Timestamp::from_millis(Utc::now().timestamp_millis())
    }

    pub fn from_millis(millis: i64) -> Self {
        Timestamp(DateTime::from_timestamp_millis(millis).unwrap_or_default())
    }

    pub fn millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Parse an RFC 3339 / ISO 8601 string.
    pub fn parse(s: &str) -> Result<Self, chrono::ParseError> {
        Ok(Timestamp(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc)))
    }

    /// Format as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
    pub fn to_iso(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.to_iso())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso())
    }
}

impl TryFrom<String> for Timestamp {
    type Error = chrono::ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Timestamp::parse(&s)
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        ts.to_iso()
    }
}

/// A document as held by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Store-assigned id.
    pub id: DocumentId,

    /// Insertion order within the collection (assigned by store).
    pub sequence: u64,

    pub fields: Fields,
}

impl Document {
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }
}

/// Sort direction for ordered queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Ascending,
    Descending,
}

/// Ordering clause of a query.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Descending,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Ascending,
        }
    }
}

/// A query over one collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QuerySpec {
    pub collection: String,
    pub order_by: Option<OrderBy>,
}

impl QuerySpec {
    /// Every document of the collection in insertion order.
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            order_by: None,
        }
    }

    pub fn ordered(collection: impl Into<String>, order_by: OrderBy) -> Self {
        Self {
            collection: collection.into(),
            order_by: Some(order_by),
        }
    }

    /// Run the query against an unordered set of documents.
    ///
    /// Documents lacking the order field are excluded. Ties fall back to
    /// insertion order.
    pub fn apply<'a>(&self, documents: impl Iterator<Item = &'a Document>) -> Vec<Document> {
        let mut selected: Vec<Document> = match &self.order_by {
            Some(order) => documents
                .filter(|d| d.fields.contains_key(&order.field))
                .cloned()
                .collect(),
            None => documents.cloned().collect(),
        };

        match &self.order_by {
            Some(order) => selected.sort_by(|a, b| {
                let by_field = compare_values(a.field(&order.field), b.field(&order.field));
                let by_field = match order.direction {
                    Direction::Ascending => by_field,
                    Direction::Descending => by_field.reverse(),
                };
                by_field.then(a.sequence.cmp(&b.sequence))
            }),
            None => selected.sort_by_key(|d| d.sequence),
        }

        selected
    }
}

/// Total order over JSON values used for sorting: null < bool < number < string.
fn compare_values(a: Option<&serde_json::Value>, b: Option<&serde_json::Value>) -> Ordering {
    use serde_json::Value;

    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            (Value::Number(x), Value::Number(y)) => {
                let x = x.as_f64().unwrap_or_default();
                let y = y.as_f64().unwrap_or_default();
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (Value::String(x), Value::String(y)) => x.cmp(y),
            _ => rank(a).cmp(&rank(b)),
        },
    }
}

/// Store statistics.
#[derive(Clone, Debug, Default)]
pub struct StoreStats {
    pub collection_count: usize,
    pub document_count: usize,
    pub subscription_count: usize,
    pub journal_entries: u64,
}

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::{AppError, AppResult};

/// Body of a stored document.
pub type Document = Map<String, Value>;

/// Collection names shared by the routers.
pub mod collections {
    pub const USERS: &str = "users";
    pub const PROJECTS: &str = "projects";
    pub const STATUSES: &str = "statuses";
    pub const SECTIONS: &str = "sections";
    pub const ASSIGNMENTS: &str = "assignments";
    pub const REQUESTS: &str = "requests";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const ACCOUNTS: &str = "accounts";
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Document,
}

impl StoredDocument {
    /// Document body with the identifier merged in as `id`.
    pub fn into_value(self) -> Value {
        let mut data = self.data;
        data.insert("id".to_string(), Value::String(self.id));
        Value::Object(data)
    }

    pub fn decode<T: DeserializeOwned>(self) -> AppResult<T> {
        crate::utils::decode_json(self.into_value())
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }
}

/// Serializes a model into a document body, dropping `id` (the key lives outside the body).
pub fn to_document<T: Serialize>(value: &T) -> AppResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(mut map) => {
            map.remove("id");
            Ok(map)
        }
        other => Err(AppError::internal(format!("expected a JSON object, got {other}"))),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field == value`; a `null` value also matches a missing field.
    Eq(String, Value),
    /// `field` is one of the values.
    In(String, Vec<Value>),
    /// `field` is an array containing the value.
    ArrayContains(String, Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<String>,
    pub limit: Option<u32>,
}

impl Query {
    pub fn collection(name: &str) -> Self {
        Self {
            collection: name.to_string(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.to_string(), value.into()));
        self
    }

    pub fn where_in(mut self, field: &str, values: Vec<Value>) -> Self {
        self.filters.push(Filter::In(field.to_string(), values));
        self
    }

    pub fn array_contains(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::ArrayContains(field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str) -> Self {
        self.order_by = Some(field.to_string());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The store answers at most one array-membership predicate per query.
    pub fn validate(&self) -> AppResult<()> {
        let array_filters = self
            .filters
            .iter()
            .filter(|filter| matches!(filter, Filter::ArrayContains(..)))
            .count();

        if array_filters > 1 {
            return Err(AppError::internal(format!(
                "query on `{}` uses {array_filters} array-contains filters, at most one is supported",
                self.collection
            )));
        }

        Ok(())
    }
}

/// One write of an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or fully replace.
    Set { collection: String, id: String, data: Document },
    /// Create only; an existing document with this key fails the batch.
    Create { collection: String, id: String, data: Document },
    /// Create only when no document with this key exists; otherwise skipped.
    CreateIfAbsent { collection: String, id: String, data: Document },
    /// Merge top-level fields into an existing document; fails the batch when absent.
    Update { collection: String, id: String, patch: Document },
    Delete { collection: String, id: String },
}

/// Collection/document store: the persistence boundary every router goes through.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<StoredDocument>>;

    async fn query(&self, query: &Query) -> AppResult<Vec<StoredDocument>>;

    async fn set(&self, collection: &str, id: &str, data: Document) -> AppResult<()>;

    /// Stores under a freshly generated key and returns it.
    async fn add(&self, collection: &str, data: Document) -> AppResult<String>;

    /// Merges `patch` into the document. Returns `false` when it does not exist.
    async fn update(&self, collection: &str, id: &str, patch: Document) -> AppResult<bool>;

    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, collection: &str, id: &str) -> AppResult<bool>;

    /// Applies all operations or none. Returns the number of documents written.
    async fn commit(&self, ops: Vec<WriteOp>) -> AppResult<usize>;

    async fn ping(&self) -> AppResult<()>;

    async fn first(&self, query: Query) -> AppResult<Option<StoredDocument>> {
        Ok(self.query(&query.limit(1)).await?.into_iter().next())
    }
}

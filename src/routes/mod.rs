use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::db::{to_document, Document, DocumentStore};
use crate::errors::{AppError, AppResult};
use crate::utils::utc_now;

pub mod assignments;
pub mod auth;
pub mod files;
pub mod health;
pub mod projects;
pub mod reports;
pub mod requests;
pub mod sections;
pub mod statuses;
pub mod users;
pub mod workers;

/// Loads and decodes one document, mapping absence to 404 with `what` in the message.
pub(crate) async fn fetch<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
    what: &str,
) -> AppResult<T> {
    store
        .get(collection, id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("{what} not found")))?
        .decode()
}

/// Update body with `updatedAt` stamped in.
pub(crate) fn stamped<T: Serialize>(payload: &T) -> AppResult<Document> {
    let mut patch = to_document(payload)?;
    stamp(&mut patch);
    Ok(patch)
}

pub(crate) fn stamp(patch: &mut Document) {
    patch.insert("updatedAt".into(), json!(utc_now()));
}

/// Applies a merge patch, 404 when the document is gone.
pub(crate) async fn apply_patch(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
    patch: Document,
    what: &str,
) -> AppResult<()> {
    if store.update(collection, id, patch).await? {
        Ok(())
    } else {
        Err(AppError::not_found(format!("{what} not found")))
    }
}

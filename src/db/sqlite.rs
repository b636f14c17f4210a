use async_trait::async_trait;
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::store::{Document, DocumentStore, Filter, Query, StoredDocument, WriteOp};
use crate::errors::{AppError, AppResult};
use crate::utils::utc_now;

/// Document store over a single `documents` table. Bodies are JSON text; predicates go through
/// `json_extract` / `json_each`.
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', ""))
}

fn push_extract(qb: &mut QueryBuilder<'_, Sqlite>, field: &str) {
    qb.push("json_extract(data, ");
    qb.push_bind(json_path(field));
    qb.push(")");
}

fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: &Value) {
    match value {
        Value::String(s) => {
            qb.push_bind(s.clone());
        }
        Value::Bool(b) => {
            qb.push_bind(i64::from(*b));
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                qb.push_bind(i);
            } else {
                qb.push_bind(n.as_f64().unwrap_or_default());
            }
        }
        Value::Null => {
            qb.push("NULL");
        }
        Value::Array(_) | Value::Object(_) => {
            qb.push("json(");
            qb.push_bind(value.to_string());
            qb.push(")");
        }
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &Filter) {
    match filter {
        Filter::Eq(field, Value::Null) => {
            push_extract(qb, field);
            qb.push(" IS NULL");
        }
        Filter::Eq(field, value) => {
            push_extract(qb, field);
            qb.push(" = ");
            push_value(qb, value);
        }
        Filter::In(_, values) if values.is_empty() => {
            qb.push("0");
        }
        Filter::In(field, values) => {
            push_extract(qb, field);
            qb.push(" IN (");
            for (idx, value) in values.iter().enumerate() {
                if idx > 0 {
                    qb.push(", ");
                }
                push_value(qb, value);
            }
            qb.push(")");
        }
        Filter::ArrayContains(field, value) => {
            qb.push("EXISTS (SELECT 1 FROM json_each(documents.data, ");
            qb.push_bind(json_path(field));
            qb.push(") AS elem WHERE elem.value = ");
            push_value(qb, value);
            qb.push(")");
        }
    }
}

pub(crate) fn build_select(query: &Query) -> QueryBuilder<'static, Sqlite> {
    let mut qb = QueryBuilder::new("SELECT id, data FROM documents WHERE collection = ");
    qb.push_bind(query.collection.clone());

    for filter in &query.filters {
        qb.push(" AND ");
        push_filter(&mut qb, filter);
    }

    match &query.order_by {
        Some(field) => {
            qb.push(" ORDER BY ");
            push_extract(&mut qb, field);
            qb.push(", id");
        }
        None => {
            qb.push(" ORDER BY created_at, id");
        }
    }

    if let Some(limit) = query.limit {
        qb.push(" LIMIT ");
        qb.push_bind(i64::from(limit));
    }

    qb
}

fn parse_row((id, data): (String, String)) -> AppResult<StoredDocument> {
    let data: Document = serde_json::from_str(&data)?;
    Ok(StoredDocument { id, data })
}

async fn upsert(conn: &mut SqliteConnection, collection: &str, id: &str, data: &Document) -> AppResult<u64> {
    let now = utc_now().to_rfc3339();
    let result = sqlx::query(
        "INSERT INTO documents (collection, id, data, created_at, updated_at) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT (collection, id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
    )
    .bind(collection)
    .bind(id)
    .bind(serde_json::to_string(data)?)
    .bind(&now)
    .bind(&now)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

async fn insert_if_absent(conn: &mut SqliteConnection, collection: &str, id: &str, data: &Document) -> AppResult<u64> {
    let now = utc_now().to_rfc3339();
    let result = sqlx::query(
        "INSERT INTO documents (collection, id, data, created_at, updated_at) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT (collection, id) DO NOTHING",
    )
    .bind(collection)
    .bind(id)
    .bind(serde_json::to_string(data)?)
    .bind(&now)
    .bind(&now)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Top-level merge via `json_patch`: provided keys replace, `null` removes the key.
async fn merge(conn: &mut SqliteConnection, collection: &str, id: &str, patch: &Document) -> AppResult<u64> {
    let result = sqlx::query(
        "UPDATE documents SET data = json_patch(data, ?), updated_at = ? WHERE collection = ? AND id = ?",
    )
    .bind(serde_json::to_string(patch)?)
    .bind(utc_now().to_rfc3339())
    .bind(collection)
    .bind(id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

async fn remove(conn: &mut SqliteConnection, collection: &str, id: &str) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
        .bind(collection)
        .bind(id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> AppResult<Option<StoredDocument>> {
        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT id, data FROM documents WHERE collection = ? AND id = ?",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(parse_row).transpose()
    }

    async fn query(&self, query: &Query) -> AppResult<Vec<StoredDocument>> {
        query.validate()?;

        let mut qb = build_select(query);
        let rows = qb
            .build_query_as::<(String, String)>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(parse_row).collect()
    }

    async fn set(&self, collection: &str, id: &str, data: Document) -> AppResult<()> {
        let mut conn = self.pool.acquire().await?;
        upsert(&mut conn, collection, id, &data).await?;
        Ok(())
    }

    async fn add(&self, collection: &str, data: Document) -> AppResult<String> {
        let id = Uuid::new_v4().simple().to_string();
        let mut conn = self.pool.acquire().await?;
        insert_if_absent(&mut conn, collection, &id, &data).await?;
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, patch: Document) -> AppResult<bool> {
        let mut conn = self.pool.acquire().await?;
        Ok(merge(&mut conn, collection, id, &patch).await? > 0)
    }

    async fn delete(&self, collection: &str, id: &str) -> AppResult<bool> {
        let mut conn = self.pool.acquire().await?;
        Ok(remove(&mut conn, collection, id).await? > 0)
    }

    async fn commit(&self, ops: Vec<WriteOp>) -> AppResult<usize> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for op in &ops {
            written += match op {
                WriteOp::Set { collection, id, data } => upsert(&mut tx, collection, id, data).await?,
                WriteOp::Create { collection, id, data } => {
                    let affected = insert_if_absent(&mut tx, collection, id, data).await?;
                    if affected == 0 {
                        return Err(AppError::conflict(format!("{collection}/{id} already exists")));
                    }
                    affected
                }
                WriteOp::CreateIfAbsent { collection, id, data } => {
                    insert_if_absent(&mut tx, collection, id, data).await?
                }
                WriteOp::Update { collection, id, patch } => {
                    let affected = merge(&mut tx, collection, id, patch).await?;
                    if affected == 0 {
                        // dropping `tx` rolls the batch back
                        return Err(AppError::not_found(format!("{collection}/{id} not found")));
                    }
                    affected
                }
                WriteOp::Delete { collection, id } => remove(&mut tx, collection, id).await?,
            };
        }

        tx.commit().await?;
        tracing::debug!(ops = ops.len(), written, "batch committed");

        Ok(written as usize)
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn select_pushes_every_predicate() {
        let query = Query::collection("assignments")
            .where_eq("projectId", "p1")
            .where_eq("sectionId", Value::Null)
            .array_contains("workerIds", "a@example.com")
            .order_by("day")
            .limit(1);

        let sql = build_select(&query).sql().to_string();

        assert!(sql.starts_with("SELECT id, data FROM documents WHERE collection = ?"));
        assert!(sql.contains("json_extract(data, ?) = ?"));
        assert!(sql.contains("json_extract(data, ?) IS NULL"));
        assert!(sql.contains("EXISTS (SELECT 1 FROM json_each(documents.data, ?) AS elem WHERE elem.value = ?)"));
        assert!(sql.contains("ORDER BY json_extract(data, ?), id"));
        assert!(sql.ends_with("LIMIT ?"));
    }

    #[test]
    fn empty_in_filter_matches_nothing() {
        let query = Query::collection("users").where_in("role", vec![]);
        assert!(build_select(&query).sql().to_string().contains("AND 0"));
    }

    #[test]
    fn in_filter_binds_each_value() {
        let query = Query::collection("users").where_in("role", vec![json!("worker"), json!("installer")]);
        assert!(build_select(&query).sql().to_string().contains("IN (?, ?)"));
    }

    #[tokio::test]
    async fn create_on_taken_key_rolls_back_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("store.db").display());
        let store = SqliteDocumentStore::new(crate::db::init(&url).await.unwrap());

        let body = |name: &str| json!({"name": name}).as_object().cloned().unwrap();
        store.set("sections", "a", body("first")).await.unwrap();
        store.set("sections", "b", body("second")).await.unwrap();

        let err = store
            .commit(vec![
                WriteOp::Delete { collection: "sections".into(), id: "a".into() },
                WriteOp::Create { collection: "sections".into(), id: "b".into(), data: body("clash") },
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        assert!(store.get("sections", "a").await.unwrap().is_some());
        let b = store.get("sections", "b").await.unwrap().unwrap();
        assert_eq!(b.get_str("name"), Some("second"));
    }

    #[test]
    fn json_path_quotes_field() {
        assert_eq!(json_path("workerIds"), "$.\"workerIds\"");
    }
}

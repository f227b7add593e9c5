//! Postgres-backed entity store.
//!
//! Entities are persisted as JSONB documents in a single `documents` table
//! keyed by `(collection, id)`. List queries load the collection and are
//! evaluated in process with the same document semantics as the in-memory
//! store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | EntityStore error |
//! |------------|-------------------|
//! | Database / Io / Tls / PoolTimedOut / PoolClosed | `Unavailable` |
//! | ColumnDecode / Decode / RowNotFound | `Corrupt` |
//!
//! ## Write Serialization
//!
//! Every write takes a transaction-scoped advisory lock on the collection so
//! the uniqueness check and the write are atomic with respect to other
//! writers.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use tourbook_core::Resource;
use tourbook_query::{Filter, QueryHandle};

use super::{
    DocumentQuery, EntityStore, StoreError, admit, decode_input, decode_stored, ensure_unique, merge_patch,
    to_document, visible,
};

const SCHEMA: &str = include_str!("../../migrations/0001_documents.sql");

/// Create the `documents` table when it does not exist.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    Ok(())
}

#[derive(Debug)]
struct StoredRow<T> {
    version: u64,
    entity: T,
}

/// Postgres-backed store for one entity type.
#[derive(Debug)]
pub struct PostgresEntityStore<T> {
    pool: PgPool,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for PostgresEntityStore<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Resource> PostgresEntityStore<T> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }

    async fn load_all<'e, E>(&self, executor: E) -> Result<Vec<StoredRow<T>>, StoreError>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query(
            r#"
            SELECT version, body
            FROM documents
            WHERE collection = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(T::COLLECTION)
        .fetch_all(executor)
        .await
        .map_err(|e| map_sqlx_error("load_all", e))?;

        rows.into_iter().map(decode_row::<T>).collect()
    }

    async fn lock_collection(&self, tx: &mut Transaction<'_, Postgres>) -> Result<(), StoreError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(T::COLLECTION)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("lock_collection", e))?;
        Ok(())
    }

    async fn write(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entity: &T,
        version: u64,
    ) -> Result<(), StoreError> {
        let mut body = to_document(entity, version)?;
        if let Value::Object(fields) = &mut body {
            fields.remove(tourbook_core::VERSION_FIELD);
        }
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, version, body)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (collection, id)
            DO UPDATE SET
                version = EXCLUDED.version,
                body = EXCLUDED.body,
                updated_at = NOW()
            "#,
        )
        .bind(T::COLLECTION)
        .bind(entity.id().to_string())
        .bind(i64::try_from(version).unwrap_or(i64::MAX))
        .bind(Json(body))
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("write", e))?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;
        self.lock_collection(&mut tx).await?;
        Ok(tx)
    }

    /// Locked read of every record, plus the visible record with `id`.
    async fn load_for_write(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: &T::Id,
    ) -> Result<(Vec<StoredRow<T>>, Option<usize>), StoreError> {
        let rows = self.load_all(&mut **tx).await?;
        let mut position = None;
        for (index, row) in rows.iter().enumerate() {
            if row.entity.id() == *id && visible(&row.entity)? {
                position = Some(index);
            }
        }
        Ok((rows, position))
    }
}

fn decode_row<T: Resource>(row: sqlx::postgres::PgRow) -> Result<StoredRow<T>, StoreError> {
    let version: i64 = row.try_get("version").map_err(|e| map_sqlx_error("decode", e))?;
    let Json(body): Json<Value> = row.try_get("body").map_err(|e| map_sqlx_error("decode", e))?;
    Ok(StoredRow {
        version: u64::try_from(version).unwrap_or(0),
        entity: decode_stored(body)?,
    })
}

#[async_trait]
impl<T: Resource> EntityStore<T> for PostgresEntityStore<T> {
    #[instrument(skip_all, fields(collection = T::COLLECTION), err)]
    async fn find(&self, query: DocumentQuery) -> Result<Vec<Value>, StoreError> {
        let query = query.filter(T::base_filter());
        let docs = self
            .load_all(&self.pool)
            .await?
            .iter()
            .map(|row| to_document(&row.entity, row.version))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(query.evaluate(docs))
    }

    #[instrument(skip_all, fields(collection = T::COLLECTION), err)]
    async fn find_entities(&self, filter: Filter) -> Result<Vec<T>, StoreError> {
        let filter = T::base_filter().merge(filter);
        let mut out = Vec::new();
        for row in self.load_all(&self.pool).await? {
            if filter.matches(&to_document(&row.entity, row.version)?) {
                out.push(row.entity);
            }
        }
        Ok(out)
    }

    #[instrument(skip_all, fields(collection = T::COLLECTION, id = %id), err)]
    async fn find_by_id(&self, id: T::Id) -> Result<Option<T>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT version, body
            FROM documents
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(T::COLLECTION)
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_id", e))?;

        match row {
            Some(row) => {
                let row = decode_row::<T>(row)?;
                Ok(visible(&row.entity)?.then_some(row.entity))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip_all, fields(collection = T::COLLECTION), err)]
    async fn insert(&self, entity: T) -> Result<T, StoreError> {
        let entity = admit(entity)?;
        let mut tx = self.begin().await?;
        let rows = self.load_all(&mut *tx).await?;
        if rows.iter().any(|row| row.entity.id() == entity.id()) {
            return Err(StoreError::Corrupt(format!(
                "{} id {} already exists",
                T::COLLECTION,
                entity.id()
            )));
        }
        ensure_unique(&entity, rows.iter().map(|row| &row.entity))?;
        self.write(&mut tx, &entity, 0).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(entity)
    }

    #[instrument(skip_all, fields(collection = T::COLLECTION), err)]
    async fn save(&self, entity: T) -> Result<Option<T>, StoreError> {
        let entity = admit(entity)?;
        let mut tx = self.begin().await?;
        let (rows, position) = self.load_for_write(&mut tx, &entity.id()).await?;
        let Some(position) = position else {
            return Ok(None);
        };
        ensure_unique(&entity, rows.iter().map(|row| &row.entity))?;
        self.write(&mut tx, &entity, rows[position].version + 1).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(Some(entity))
    }

    #[instrument(skip_all, fields(collection = T::COLLECTION, id = %id), err)]
    async fn update_by_id(&self, id: T::Id, patch: Value) -> Result<Option<T>, StoreError> {
        let mut tx = self.begin().await?;
        let (rows, position) = self.load_for_write(&mut tx, &id).await?;
        let Some(position) = position else {
            return Ok(None);
        };
        let current = &rows[position];

        let merged = merge_patch(to_document(&current.entity, current.version)?, patch)?;
        let updated = admit(decode_input::<T>(merged)?)?;
        ensure_unique(&updated, rows.iter().map(|row| &row.entity))?;

        self.write(&mut tx, &updated, current.version + 1).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(Some(updated))
    }

    #[instrument(skip_all, fields(collection = T::COLLECTION, id = %id), err)]
    async fn delete_by_id(&self, id: T::Id) -> Result<Option<T>, StoreError> {
        let mut tx = self.begin().await?;
        let (mut rows, position) = self.load_for_write(&mut tx, &id).await?;
        let Some(position) = position else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(T::COLLECTION)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_by_id", e))?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(Some(rows.swap_remove(position).entity))
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::RowNotFound => {
            StoreError::Corrupt(format!("{operation}: {err}"))
        }
        other => StoreError::Unavailable(format!("{operation}: {other}")),
    }
}

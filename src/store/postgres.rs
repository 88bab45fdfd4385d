//! PostgreSQL store: one JSONB table keyed by `(entity_type, identifier)`,
//! living in the schema named by `RESOURCE_STORE_SCHEMA` (default `public`).

use crate::error::StoreError;
use crate::query::Query;
use crate::sql::{self, QueryBuf};
use crate::store::ResourceStore;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{ConnectOptions, PgPool};
use std::str::FromStr;

pub const DOCUMENT_TABLE: &str = "resource_documents";

pub fn store_schema() -> String {
    std::env::var("RESOURCE_STORE_SCHEMA").unwrap_or_else(|_| "public".into())
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    schema: String,
    table: String,
}

impl PgStore {
    /// Store in the schema from `RESOURCE_STORE_SCHEMA`.
    pub fn new(pool: PgPool) -> Self {
        Self::with_schema(pool, store_schema())
    }

    pub fn with_schema(pool: PgPool, schema: impl Into<String>) -> Self {
        let schema = schema.into();
        let table = sql::qualified_table(&schema, DOCUMENT_TABLE);
        PgStore { pool, schema, table }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the schema, document table and index if missing.
    pub async fn ensure_document_table(&self) -> Result<(), StoreError> {
        for ddl in sql::create_document_table(&self.schema, DOCUMENT_TABLE) {
            sqlx::query(&ddl).execute(&self.pool).await?;
        }
        tracing::info!(table = %self.table, "document table ready");
        Ok(())
    }

    async fn fetch_documents(&self, q: &QueryBuf) -> Result<Vec<Value>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, Value>(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn execute(&self, q: &QueryBuf) -> Result<u64, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        Ok(query.execute(&self.pool).await?.rows_affected())
    }
}

#[async_trait]
impl ResourceStore for PgStore {
    async fn query(&self, entity_type: &str, query: &Query) -> Result<Vec<Value>, StoreError> {
        let q = sql::select_documents(&self.table, entity_type, query);
        self.fetch_documents(&q).await
    }

    async fn find(&self, entity_type: &str, identifier: &str) -> Result<Option<Value>, StoreError> {
        let q = sql::select_by_identifier(&self.table, entity_type, identifier);
        Ok(self.fetch_documents(&q).await?.into_iter().next())
    }

    async fn add(&self, entity_type: &str, identifier: &str, document: Value) -> Result<(), StoreError> {
        let q = sql::insert(&self.table, entity_type, identifier, &document);
        if self.execute(&q).await? == 0 {
            return Err(StoreError::Conflict {
                identifier: identifier.to_string(),
            });
        }
        Ok(())
    }

    async fn add_all(&self, entity_type: &str, documents: Vec<(String, Value)>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for (identifier, document) in &documents {
            let q = sql::insert(&self.table, entity_type, identifier, document);
            tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
            let mut query = sqlx::query(&q.sql);
            for p in &q.params {
                query = query.bind(p.clone());
            }
            if query.execute(&mut *tx).await?.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(StoreError::Conflict {
                    identifier: identifier.clone(),
                });
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, entity_type: &str, identifier: &str, document: Value) -> Result<bool, StoreError> {
        let q = sql::update(&self.table, entity_type, identifier, &document);
        Ok(self.execute(&q).await? > 0)
    }

    async fn remove(&self, entity_type: &str, identifier: &str) -> Result<bool, StoreError> {
        let q = sql::delete(&self.table, entity_type, identifier);
        Ok(self.execute(&q).await? > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), StoreError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", sql::quoted(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), StoreError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| sqlx::Error::Configuration("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_name_is_split_from_url() {
        let (admin, db) = parse_db_name_from_url("postgres://u:p@localhost:5432/resources?sslmode=disable").unwrap();
        assert_eq!(admin, "postgres://u:p@localhost:5432/postgres");
        assert_eq!(db, "resources");
    }

    #[test]
    fn url_without_path_is_rejected() {
        assert!(parse_db_name_from_url("localhost").is_err());
    }
}

//! PostgreSQL-compatible store
//!
//! Each write runs in its own transaction and is retried on serialization
//! conflicts (SQLSTATE 40001/40P01), which makes the store usable against
//! CockroachDB as well as Postgres.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Connection, Postgres};
use std::time::Duration;
use tracing::debug;

use super::{MetadataStore, RetryPolicy, StoreConnector};
use crate::error::StoreError;
use crate::models::{LicenseSummary, PackageRecord};

const SELECT_VERSION: &str = "SELECT version FROM packages WHERE path = $1";

const UPSERT_PACKAGE: &str = r#"
    INSERT INTO packages (path, version, readme, docs, time)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (path) DO UPDATE
    SET version = EXCLUDED.version,
        readme = EXCLUDED.readme,
        docs = EXCLUDED.docs,
        time = EXCLUDED.time
    RETURNING id
"#;

const UPSERT_PACKAGE_META: &str = r#"
    INSERT INTO package_meta (id, license, license_set)
    VALUES ($1, $2, $3)
    ON CONFLICT (id) DO UPDATE
    SET license = EXCLUDED.license,
        license_set = EXCLUDED.license_set
"#;

const SELECT_CHECKPOINT: &str = "SELECT value FROM checkpoint WHERE key = $1";

const UPSERT_CHECKPOINT: &str = r#"
    INSERT INTO checkpoint (key, value)
    VALUES ($1, $2)
    ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
"#;

/// Pool from which each worker checks out a dedicated connection
#[derive(Clone)]
pub struct PgConnector {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgConnector {
    pub fn new(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    /// Open a pool sized for one connection per worker
    pub async fn connect_url(
        url: &str,
        max_connections: u32,
        retry: RetryPolicy,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(url)
            .await
            .map_err(StoreError::Connect)?;

        Ok(Self::new(pool, retry))
    }
}

#[async_trait]
impl StoreConnector for PgConnector {
    async fn connect(&self) -> Result<Box<dyn MetadataStore>, StoreError> {
        let conn = self.pool.acquire().await.map_err(StoreError::Connect)?;
        Ok(Box::new(PgStore {
            conn,
            retry: self.retry,
        }))
    }
}

/// Store handle owning one connection for the lifetime of a worker
pub struct PgStore {
    conn: PoolConnection<Postgres>,
    retry: RetryPolicy,
}

impl PgStore {
    async fn try_upsert_package(&mut self, record: &PackageRecord) -> Result<i64, sqlx::Error> {
        let mut tx = Connection::begin(&mut *self.conn).await?;

        let id: i64 = sqlx::query_scalar(UPSERT_PACKAGE)
            .bind(&record.path)
            .bind(&record.version)
            .bind(&record.readme)
            .bind(&record.docs)
            .bind(record.time)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(id)
    }

    async fn try_upsert_licenses(
        &mut self,
        id: i64,
        licenses: &LicenseSummary,
    ) -> Result<(), sqlx::Error> {
        let mut tx = Connection::begin(&mut *self.conn).await?;

        sqlx::query(UPSERT_PACKAGE_META)
            .bind(id)
            .bind(&licenses.primary)
            .bind(&licenses.licenses)
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }
}

#[async_trait]
impl MetadataStore for PgStore {
    async fn stored_version(&mut self, path: &str) -> Result<Option<String>, StoreError> {
        sqlx::query_scalar(SELECT_VERSION)
            .bind(path)
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(|e| StoreError::from_sqlx("read stored version", e))
    }

    async fn upsert_package(&mut self, record: &PackageRecord) -> Result<i64, StoreError> {
        let mut attempt = 1;
        loop {
            match self.try_upsert_package(record).await {
                Ok(id) => {
                    debug!(path = %record.path, id, attempt, "Package upserted");
                    return Ok(id);
                }
                Err(e) => {
                    attempt = self.retry.next_attempt("upsert package", attempt, e).await?;
                }
            }
        }
    }

    async fn upsert_licenses(
        &mut self,
        id: i64,
        licenses: &LicenseSummary,
    ) -> Result<(), StoreError> {
        let mut attempt = 1;
        loop {
            match self.try_upsert_licenses(id, licenses).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    attempt = self
                        .retry
                        .next_attempt("upsert package metadata", attempt, e)
                        .await?;
                }
            }
        }
    }

    async fn read_checkpoint(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        sqlx::query_scalar(SELECT_CHECKPOINT)
            .bind(key)
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(|e| StoreError::from_sqlx("read checkpoint", e))
    }

    async fn write_checkpoint(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(UPSERT_CHECKPOINT)
            .bind(key)
            .bind(value)
            .execute(&mut *self.conn)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::from_sqlx("write checkpoint", e))
    }
}

//! Host repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::HostDbModel;
use crate::domain::Host;
use crate::{Error, Result};

/// Host repository trait.
#[async_trait]
pub trait HostRepository: Send + Sync {
    /// The full host registry.
    async fn list_hosts(&self) -> Result<Vec<Host>>;
    async fn create_host(&self, host: &HostDbModel) -> Result<()>;
    async fn delete_host(&self, url: &str) -> Result<()>;
}

/// SQLx implementation of HostRepository.
pub struct SqlxHostRepository {
    pool: SqlitePool,
}

impl SqlxHostRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HostRepository for SqlxHostRepository {
    async fn list_hosts(&self) -> Result<Vec<Host>> {
        let hosts = sqlx::query_as::<_, HostDbModel>("SELECT * FROM hosts ORDER BY url")
            .fetch_all(&self.pool)
            .await?;
        Ok(hosts.into_iter().map(HostDbModel::into_host).collect())
    }

    async fn create_host(&self, host: &HostDbModel) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO hosts (url, poll_interval_secs, auth_token, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&host.url)
        .bind(host.poll_interval_secs)
        .bind(&host.auth_token)
        .bind(host.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                Error::validation(format!("Host already exists: {}", host.url)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_host(&self, url: &str) -> Result<()> {
        sqlx::query("DELETE FROM hosts WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

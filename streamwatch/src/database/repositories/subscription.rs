//! Subscription repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::SubscriptionDbModel;
use crate::domain::Subscription;
use crate::Result;

/// Subscription repository trait.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn list_subscriptions(&self, host_url: &str) -> Result<Vec<Subscription>>;
    async fn create_subscription(&self, subscription: &SubscriptionDbModel) -> Result<()>;
}

/// SQLx implementation of SubscriptionRepository.
pub struct SqlxSubscriptionRepository {
    pool: SqlitePool,
}

impl SqlxSubscriptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for SqlxSubscriptionRepository {
    async fn list_subscriptions(&self, host_url: &str) -> Result<Vec<Subscription>> {
        let subscriptions = sqlx::query_as::<_, SubscriptionDbModel>(
            "SELECT * FROM subscriptions WHERE host_url = ? ORDER BY created_at, id",
        )
        .bind(host_url)
        .fetch_all(&self.pool)
        .await?;
        Ok(subscriptions
            .into_iter()
            .map(SubscriptionDbModel::into_subscription)
            .collect())
    }

    async fn create_subscription(&self, subscription: &SubscriptionDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (id, host_url, stream_key, channel_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&subscription.id)
        .bind(&subscription.host_url)
        .bind(&subscription.stream_key)
        .bind(&subscription.channel_id)
        .bind(subscription.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::HostDbModel;
    use crate::database::repositories::{HostRepository, SqlxHostRepository};
    use crate::database::{init_memory_pool, run_migrations};

    #[tokio::test]
    async fn test_list_by_host() {
        let pool = init_memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let hosts = SqlxHostRepository::new(pool.clone());
        hosts
            .create_host(&HostDbModel::new("https://a.example.com", 30, None))
            .await
            .unwrap();
        hosts
            .create_host(&HostDbModel::new("https://b.example.com", 30, None))
            .await
            .unwrap();

        let repo = SqlxSubscriptionRepository::new(pool);
        for (id, host, key) in [
            ("s1", "https://a.example.com", "abc"),
            ("s2", "https://a.example.com", "def"),
            ("s3", "https://b.example.com", "abc"),
        ] {
            repo.create_subscription(&SubscriptionDbModel::new(id, host, key, "chan"))
                .await
                .unwrap();
        }

        let subs = repo
            .list_subscriptions("https://a.example.com")
            .await
            .unwrap();
        let ids: Vec<&str> = subs.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(subs.len(), 2);
        assert!(ids.contains(&"s1") && ids.contains(&"s2"));
        assert!(subs.iter().all(|s| s.host_url.as_str() == "https://a.example.com"));

        assert!(repo
            .list_subscriptions("https://missing.example.com")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_subscription_requires_host() {
        let pool = init_memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let repo = SqlxSubscriptionRepository::new(pool);
        let result = repo
            .create_subscription(&SubscriptionDbModel::new(
                "s1",
                "https://nowhere.example.com",
                "abc",
                "chan",
            ))
            .await;
        assert!(result.is_err());
    }
}

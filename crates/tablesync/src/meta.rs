//! Engine-reserved metadata persistence.
//!
//! The structure version and required application version live in a small
//! key/value table so they survive process restarts and can be read before
//! any table-level synchronization begins. The table itself is excluded
//! from diffing (see `crate::diff`).

use sqlx::sqlite::SqlitePool;

use crate::error::Result;

/// Name of the engine's metadata table.
pub const META_TABLE: &str = "tablesync_meta";

/// SQL to create the metadata table.
pub const CREATE_META_TABLE_SQL: &str =
    "CREATE TABLE IF NOT EXISTS tablesync_meta (key TEXT PRIMARY KEY, value INTEGER NOT NULL)";

const STRUCTURE_VERSION_KEY: &str = "structure_version";
const REQUIRED_APPLICATION_VERSION_KEY: &str = "required_application_version";

/// Manages the persisted version state of the store.
pub struct MetaStore {
    pool: SqlitePool,
}

impl MetaStore {
    /// Creates a new metadata store manager.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns whether the metadata table exists, i.e. whether this store
    /// has been synchronized before.
    pub async fn is_deployed(&self) -> Result<bool> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(META_TABLE)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Ensures the metadata table exists.
    pub async fn ensure_table(&self) -> Result<()> {
        sqlx::query(CREATE_META_TABLE_SQL)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns the stored structure version (0 when never written).
    pub async fn structure_version(&self) -> Result<i64> {
        self.get(STRUCTURE_VERSION_KEY).await
    }

    /// Persists the structure version.
    pub async fn set_structure_version(&self, version: i64) -> Result<()> {
        self.set(STRUCTURE_VERSION_KEY, version).await
    }

    /// Returns the stored required application version (0 when never written).
    pub async fn required_application_version(&self) -> Result<i64> {
        self.get(REQUIRED_APPLICATION_VERSION_KEY).await
    }

    /// Persists the required application version.
    pub async fn set_required_application_version(&self, version: i64) -> Result<()> {
        self.set(REQUIRED_APPLICATION_VERSION_KEY, version).await
    }

    async fn get(&self, key: &str) -> Result<i64> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT value FROM tablesync_meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map_or(0, |(value,)| value))
    }

    async fn set(&self, key: &str, value: i64) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO tablesync_meta (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    #[tokio::test]
    async fn test_is_deployed() {
        let pool = create_test_pool().await;
        let meta = MetaStore::new(pool);

        assert!(!meta.is_deployed().await.unwrap());
        meta.ensure_table().await.unwrap();
        assert!(meta.is_deployed().await.unwrap());
        // Idempotent
        meta.ensure_table().await.unwrap();
    }

    #[tokio::test]
    async fn test_versions_default_to_zero() {
        let pool = create_test_pool().await;
        let meta = MetaStore::new(pool);
        meta.ensure_table().await.unwrap();

        assert_eq!(meta.structure_version().await.unwrap(), 0);
        assert_eq!(meta.required_application_version().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_versions_round_trip() {
        let pool = create_test_pool().await;
        let meta = MetaStore::new(pool);
        meta.ensure_table().await.unwrap();

        meta.set_structure_version(4).await.unwrap();
        meta.set_required_application_version(2).await.unwrap();
        assert_eq!(meta.structure_version().await.unwrap(), 4);
        assert_eq!(meta.required_application_version().await.unwrap(), 2);

        // Overwrites, not duplicates
        meta.set_structure_version(5).await.unwrap();
        assert_eq!(meta.structure_version().await.unwrap(), 5);
    }
}

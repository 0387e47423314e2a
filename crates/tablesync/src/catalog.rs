//! Catalog reader.
//!
//! Reads the store's built-in schema table (`sqlite_master`) and per-table
//! column metadata (`PRAGMA table_info`). Read-only; any query failure
//! surfaces as [`SyncError::CatalogUnavailable`] and aborts the pass, since
//! diffing against a partially readable catalog is unsafe.

use sqlx::sqlite::SqlitePool;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::schema::quote_identifier;

/// One row of the schema table: an existing table and its creation text.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Object name.
    pub name: String,
    /// Object type as reported by the catalog (always `table` here).
    pub entry_type: String,
    /// Raw creation SQL text, verbatim as the table was created.
    pub sql: String,
    /// Root page of the table's b-tree.
    pub root_page: i64,
}

/// One row of `PRAGMA table_info`.
#[derive(Debug, Clone)]
pub struct ColumnMetadata {
    /// Column position.
    pub cid: i64,
    /// Column name.
    pub name: String,
    /// Declared type keyword.
    pub decl_type: String,
    /// Whether the column is `NOT NULL`.
    pub not_null: bool,
    /// Default value text, if any.
    pub default_value: Option<String>,
    /// 1-based position within the primary key, or 0.
    pub pk: i64,
}

/// Reads the current catalog of the store.
pub struct CatalogReader {
    pool: SqlitePool,
}

impl CatalogReader {
    /// Creates a new catalog reader.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Lists every table in the store.
    pub async fn list_tables(&self) -> Result<Vec<CatalogEntry>> {
        let rows: Vec<(String, String, Option<String>, i64)> = sqlx::query_as(
            "SELECT name, type, sql, rootpage FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(SyncError::CatalogUnavailable)?;

        debug!(tables = rows.len(), "read catalog");

        Ok(rows
            .into_iter()
            .map(|(name, entry_type, sql, root_page)| CatalogEntry {
                name,
                entry_type,
                sql: sql.unwrap_or_default(),
                root_page,
            })
            .collect())
    }

    /// Returns the column metadata of one table.
    pub async fn columns_of(&self, table: &str) -> Result<Vec<ColumnMetadata>> {
        let rows: Vec<(i64, String, String, i64, Option<String>, i64)> =
            sqlx::query_as(&format!("PRAGMA table_info({})", quote_identifier(table)))
                .fetch_all(&self.pool)
                .await
                .map_err(SyncError::CatalogUnavailable)?;

        Ok(rows
            .into_iter()
            .map(
                |(cid, name, decl_type, not_null, default_value, pk)| ColumnMetadata {
                    cid,
                    name,
                    decl_type,
                    not_null: not_null != 0,
                    default_value,
                    pk,
                },
            )
            .collect())
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
    async fn test_list_tables() {
        let pool = create_test_pool().await;
        sqlx::query("CREATE TABLE \"accounts\" (\"id\" INTEGER PRIMARY KEY, \"name\" TEXT)")
            .execute(&pool)
            .await
            .unwrap();

        let reader = CatalogReader::new(pool);
        let entries = reader.list_tables().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "accounts");
        assert_eq!(entries[0].entry_type, "table");
        // The catalog stores the creation text verbatim
        assert_eq!(
            entries[0].sql,
            "CREATE TABLE \"accounts\" (\"id\" INTEGER PRIMARY KEY, \"name\" TEXT)"
        );
    }

    #[tokio::test]
    async fn test_columns_of() {
        let pool = create_test_pool().await;
        sqlx::query(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score REAL DEFAULT 0)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let reader = CatalogReader::new(pool);
        let columns = reader.columns_of("t").await.unwrap();
        assert_eq!(columns.len(), 3);

        assert_eq!(columns[0].name, "id");
        assert_eq!(columns[0].pk, 1);

        assert_eq!(columns[1].name, "name");
        assert!(columns[1].not_null);

        assert_eq!(columns[2].name, "score");
        assert_eq!(columns[2].default_value.as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn test_columns_of_missing_table_is_empty() {
        let pool = create_test_pool().await;
        let reader = CatalogReader::new(pool);
        let columns = reader.columns_of("nope").await.unwrap();
        assert!(columns.is_empty());
    }
}

//! Redefinition executor.
//!
//! SQLite's ALTER TABLE cannot retype, constrain or remove columns, so a
//! non-additive change rebuilds the table: rename the existing table aside,
//! create the declared shape under the original name, copy the data across
//! and drop the renamed original. Steps 3 to 9 run in one transaction; on
//! any failure the rollback also undoes the rename, leaving the original
//! table exactly as it was.
//!
//! Foreign-key enforcement and legacy alteration mode are session-global
//! flags, not scoped to the transaction. Toggling enforcement is disallowed
//! mid-transaction, so both flags are suspended before the transaction
//! begins and restored after it ends, on every exit path, and every
//! statement runs on the one acquired connection that owns those flags.

use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::Connection;
use tracing::{debug, info};

use crate::diff::EntityDiff;
use crate::error::{Result, SyncError};
use crate::schema::{quote_identifier, TableDefinition};

/// Session-global flags suspended for the duration of a redefinition.
///
/// `suspend` records the prior foreign-key-enforcement state, disables
/// enforcement if it was on and enables legacy alteration mode (so the
/// rename step leaves dependent objects pointing at the original name).
/// `restore` is the single point every exit path funnels through.
#[derive(Debug)]
pub struct SessionFlags {
    foreign_keys_were_on: bool,
}

impl SessionFlags {
    /// Suspends enforcement on the given connection, outside any transaction.
    pub async fn suspend(conn: &mut SqliteConnection) -> sqlx::Result<Self> {
        let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&mut *conn)
            .await?;
        if enabled != 0 {
            sqlx::query("PRAGMA foreign_keys = OFF")
                .execute(&mut *conn)
                .await?;
        }
        sqlx::query("PRAGMA legacy_alter_table = ON")
            .execute(&mut *conn)
            .await?;
        Ok(Self {
            foreign_keys_were_on: enabled != 0,
        })
    }

    /// Restores the prior enforcement state and leaves legacy mode off.
    pub async fn restore(self, conn: &mut SqliteConnection) -> sqlx::Result<()> {
        if self.foreign_keys_were_on {
            sqlx::query("PRAGMA foreign_keys = ON")
                .execute(&mut *conn)
                .await?;
        }
        sqlx::query("PRAGMA legacy_alter_table = OFF")
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

/// Performs transactional table redefinitions.
pub struct RedefinitionExecutor {
    pool: SqlitePool,
}

impl RedefinitionExecutor {
    /// Creates a new executor.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Rebuilds `table` to its declared shape, preserving existing data.
    ///
    /// The copy maps every column in `diff.columns_to_check` onto itself,
    /// then appends the explicit `(old, new)` rename pairs. Any failure is
    /// rolled back and surfaced as [`SyncError::RedefinitionFailed`]; the
    /// session flags are restored regardless of the outcome.
    pub async fn redefine(
        &self,
        table: &TableDefinition,
        diff: &EntityDiff,
        renames: &[(String, String)],
    ) -> Result<()> {
        info!(table = %table.name, "Redefining table");

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|source| Self::failed(&table.name, source))?;

        let flags = SessionFlags::suspend(&mut conn)
            .await
            .map_err(|source| Self::failed(&table.name, source))?;

        let outcome = Self::rebuild(&mut conn, table, diff, renames).await;
        let restored = flags.restore(&mut conn).await;

        match (outcome, restored) {
            (Ok(()), Ok(())) => {
                info!(table = %table.name, "Table redefined");
                Ok(())
            }
            (Err(source), _) | (Ok(()), Err(source)) => Err(Self::failed(&table.name, source)),
        }
    }

    fn failed(table: &str, source: sqlx::Error) -> SyncError {
        SyncError::RedefinitionFailed {
            table: table.to_string(),
            source,
        }
    }

    async fn rebuild(
        conn: &mut SqliteConnection,
        table: &TableDefinition,
        diff: &EntityDiff,
        renames: &[(String, String)],
    ) -> sqlx::Result<()> {
        let mut tx = conn.begin().await?;
        match Self::rebuild_steps(&mut tx, table, diff, renames).await {
            Ok(()) => tx.commit().await,
            Err(err) => {
                // Explicit rollback; the rename is undone with it.
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }

    async fn rebuild_steps(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        table: &TableDefinition,
        diff: &EntityDiff,
        renames: &[(String, String)],
    ) -> sqlx::Result<()> {
        // The synthetic name is never externally declared, so the later
        // drop intentionally bypasses the drop whitelist.
        let temp = format!("{}Old", table.name);

        let rename = format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_identifier(&table.name),
            quote_identifier(&temp)
        );
        debug!(sql = %rename, "Executing SQL");
        sqlx::query(&rename).execute(&mut **tx).await?;

        debug!(sql = %table.creation_sql, "Executing SQL");
        sqlx::query(&table.creation_sql).execute(&mut **tx).await?;

        let (source_columns, target_columns) = copy_mapping(diff, renames);
        if !source_columns.is_empty() {
            let copy = format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                quote_identifier(&table.name),
                quoted_list(&target_columns),
                quoted_list(&source_columns),
                quote_identifier(&temp)
            );
            debug!(sql = %copy, "Executing SQL");
            sqlx::query(&copy).execute(&mut **tx).await?;
        }

        let drop = format!("DROP TABLE {}", quote_identifier(&temp));
        debug!(sql = %drop, "Executing SQL");
        sqlx::query(&drop).execute(&mut **tx).await?;

        Ok(())
    }
}

/// Builds the (source, target) column lists for the data copy: identity
/// over the columns present on both sides, then the explicit renames.
fn copy_mapping(diff: &EntityDiff, renames: &[(String, String)]) -> (Vec<String>, Vec<String>) {
    let mut source: Vec<String> = diff.columns_to_check.iter().cloned().collect();
    let mut target = source.clone();
    for (old, new) in renames {
        source.push(old.clone());
        target.push(new.clone());
    }
    (source, target)
}

fn quoted_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnDefinition;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    fn diff_with(checks: &[&str], deletes: &[&str], creates: &[&str]) -> EntityDiff {
        EntityDiff {
            columns_to_check: checks.iter().map(ToString::to_string).collect(),
            columns_to_delete: deletes.iter().map(ToString::to_string).collect(),
            columns_to_create: creates.iter().map(ToString::to_string).collect(),
        }
    }

    async fn seed_accounts(pool: &SqlitePool) {
        sqlx::query("CREATE TABLE \"accounts\" (\"id\" INTEGER PRIMARY KEY, \"name\" TEXT, \"email\" TEXT)")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO accounts (id, name, email) VALUES (1, 'ada', 'ada@example.com'), (2, 'bob', 'bob@example.com')")
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_copy_mapping_appends_renames() {
        let diff = diff_with(&["a", "b"], &["old"], &["new"]);
        let renames = vec![("old".to_string(), "new".to_string())];
        let (source, target) = copy_mapping(&diff, &renames);
        assert_eq!(source, vec!["a", "b", "old"]);
        assert_eq!(target, vec!["a", "b", "new"]);
    }

    #[tokio::test]
    async fn test_redefine_preserves_data() {
        let pool = create_test_pool().await;
        seed_accounts(&pool).await;

        // email is dropped from the declaration
        let declared = TableDefinition::new("accounts")
            .column(ColumnDefinition::new("id", "INTEGER").primary_key())
            .column(ColumnDefinition::new("name", "TEXT"));

        let executor = RedefinitionExecutor::new(pool.clone());
        executor
            .redefine(&declared, &diff_with(&["id", "name"], &["email"], &[]), &[])
            .await
            .unwrap();

        let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM accounts ORDER BY id")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(
            rows,
            vec![(1, "ada".to_string()), (2, "bob".to_string())]
        );

        // The catalog now stores the declared creation text
        let (sql,): (String,) =
            sqlx::query_as("SELECT sql FROM sqlite_master WHERE name = 'accounts'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(sql, declared.creation_sql);

        // No temporary table left behind
        let leftover: Option<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE name = 'accountsOld'")
                .fetch_optional(&pool)
                .await
                .unwrap();
        assert!(leftover.is_none());
    }

    #[tokio::test]
    async fn test_redefine_carries_renamed_column_values() {
        let pool = create_test_pool().await;
        seed_accounts(&pool).await;

        let declared = TableDefinition::new("accounts")
            .column(ColumnDefinition::new("id", "INTEGER").primary_key())
            .column(ColumnDefinition::new("full_name", "TEXT"))
            .column(ColumnDefinition::new("email", "TEXT"));

        let executor = RedefinitionExecutor::new(pool.clone());
        executor
            .redefine(
                &declared,
                &diff_with(&["id", "email"], &["name"], &["full_name"]),
                &[("name".to_string(), "full_name".to_string())],
            )
            .await
            .unwrap();

        let rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT id, full_name, email FROM accounts ORDER BY id")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(rows[0], (1, "ada".to_string(), "ada@example.com".to_string()));
        assert_eq!(rows[1], (2, "bob".to_string(), "bob@example.com".to_string()));
    }

    #[tokio::test]
    async fn test_failed_copy_rolls_back_completely() {
        let pool = create_test_pool().await;
        sqlx::query("CREATE TABLE \"accounts\" (\"id\" INTEGER PRIMARY KEY, \"email\" TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO accounts (id, email) VALUES (1, 'dup'), (2, 'dup')")
            .execute(&pool)
            .await
            .unwrap();

        // The new shape makes email UNIQUE, so the data copy must fail.
        let declared = TableDefinition::new("accounts")
            .column(ColumnDefinition::new("id", "INTEGER").primary_key())
            .column(ColumnDefinition::new("email", "TEXT").unique());

        let executor = RedefinitionExecutor::new(pool.clone());
        let result = executor
            .redefine(&declared, &diff_with(&["id", "email"], &[], &[]), &[])
            .await;
        assert!(matches!(
            result,
            Err(SyncError::RedefinitionFailed { ref table, .. }) if table == "accounts"
        ));

        // Original table intact: same creation text, same rows
        let (sql,): (String,) =
            sqlx::query_as("SELECT sql FROM sqlite_master WHERE name = 'accounts'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE \"accounts\" (\"id\" INTEGER PRIMARY KEY, \"email\" TEXT)"
        );
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM accounts")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);

        // No temporary table remains
        let leftover: Option<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE name = 'accountsOld'")
                .fetch_optional(&pool)
                .await
                .unwrap();
        assert!(leftover.is_none());
    }

    #[tokio::test]
    async fn test_session_flags_restored_after_success_and_failure() {
        let pool = create_test_pool().await;
        seed_accounts(&pool).await;
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .unwrap();

        let declared = TableDefinition::new("accounts")
            .column(ColumnDefinition::new("id", "INTEGER").primary_key())
            .column(ColumnDefinition::new("name", "TEXT"));

        let executor = RedefinitionExecutor::new(pool.clone());
        executor
            .redefine(&declared, &diff_with(&["id", "name"], &["email"], &[]), &[])
            .await
            .unwrap();

        let fk: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(fk, 1);
        let legacy: i64 = sqlx::query_scalar("PRAGMA legacy_alter_table")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(legacy, 0);

        // Failure path: copying into a missing column errors out
        let broken = TableDefinition::new("accounts")
            .column(ColumnDefinition::new("id", "INTEGER").primary_key());
        let result = executor
            .redefine(&broken, &diff_with(&["id", "name"], &[], &[]), &[])
            .await;
        assert!(result.is_err());

        let fk: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[tokio::test]
    async fn test_disabled_foreign_keys_stay_disabled() {
        let pool = create_test_pool().await;
        seed_accounts(&pool).await;
        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&pool)
            .await
            .unwrap();

        let declared = TableDefinition::new("accounts")
            .column(ColumnDefinition::new("id", "INTEGER").primary_key())
            .column(ColumnDefinition::new("name", "TEXT"));

        let executor = RedefinitionExecutor::new(pool.clone());
        executor
            .redefine(&declared, &diff_with(&["id", "name"], &["email"], &[]), &[])
            .await
            .unwrap();

        let fk: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(fk, 0);
    }
}

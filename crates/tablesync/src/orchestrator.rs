//! Synchronization orchestrator.
//!
//! Drives a full pass: version gate, per-table classification, additive
//! changes, redefinitions, the drop pass and version bookkeeping. Per-table
//! failures are caught here, logged and reported; they never abort the
//! synchronization of other tables. Only [`SyncError::OutOfDateApplication`]
//! and [`SyncError::CatalogUnavailable`] propagate to the caller.

use sqlx::sqlite::SqlitePool;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogEntry, CatalogReader};
use crate::classifier::{classify, SyncAction};
use crate::diff::{diff_columns, diff_tables, SchemaDiff};
use crate::error::{Result, SyncError};
use crate::identity::AppIdentity;
use crate::meta::MetaStore;
use crate::redefine::RedefinitionExecutor;
use crate::schema::{quote_identifier, DeclaredSchema, TableDefinition};

/// What happened to one table during a synchronization run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    /// The table was created.
    Created,
    /// The listed columns were added.
    Altered(Vec<String>),
    /// The table was rebuilt through the redefinition executor.
    Redefined,
    /// The stored table already matched the declaration.
    UpToDate,
    /// The undeclared table was dropped.
    Dropped,
    /// The table was eligible for deletion but policy or the whitelist
    /// refused the drop. Not an error.
    DropRefused,
    /// A pending change was skipped because policy disables it.
    Skipped,
    /// The table's synchronization failed; other tables continued.
    Failed(String),
}

/// Per-table outcomes of one synchronization run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Outcomes in the order the tables were processed.
    pub outcomes: Vec<(String, TableOutcome)>,
}

impl SyncReport {
    fn record(&mut self, table: &str, outcome: TableOutcome) {
        self.outcomes.push((table.to_string(), outcome));
    }

    /// Returns the outcome recorded for a table.
    #[must_use]
    pub fn outcome_for(&self, table: &str) -> Option<&TableOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, outcome)| outcome)
    }

    /// Returns whether any table failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.outcomes
            .iter()
            .any(|(_, outcome)| matches!(outcome, TableOutcome::Failed(_)))
    }
}

/// Top-level schema synchronization driver.
///
/// The single entry point is [`Synchronizer::auto_sync_schema`]; no other
/// part of the engine is meant to be called by application code. Runs are
/// not designed for concurrent invocation; callers serialize them.
pub struct Synchronizer {
    pool: SqlitePool,
    declared: DeclaredSchema,
    identity: AppIdentity,
    catalog: CatalogReader,
    meta: MetaStore,
    executor: RedefinitionExecutor,
}

impl Synchronizer {
    /// Creates a synchronizer for the given store, declared schema and
    /// application identity.
    #[must_use]
    pub fn new(pool: SqlitePool, declared: DeclaredSchema, identity: AppIdentity) -> Self {
        let catalog = CatalogReader::new(pool.clone());
        let meta = MetaStore::new(pool.clone());
        let executor = RedefinitionExecutor::new(pool.clone());
        Self {
            pool,
            declared,
            identity,
            catalog,
            meta,
            executor,
        }
    }

    /// Synchronizes the store with the declared schema.
    ///
    /// Returns a report enumerating every table's outcome so operators can
    /// diagnose partial runs. A run with per-table failures advances no
    /// stored versions; the next run re-enters the upgrade path and retries.
    pub async fn auto_sync_schema(&self) -> Result<SyncReport> {
        if !self.meta.is_deployed().await? {
            let catalog = self.catalog.list_tables().await?;
            let adopted = self
                .declared
                .tables
                .iter()
                .any(|t| catalog.iter().any(|e| e.name == t.name));
            if !adopted {
                return self.deploy_fresh().await;
            }
            // Pre-existing store without metadata: adopt it at version zero.
            self.meta.ensure_table().await?;
        }

        let stored_required = self.meta.required_application_version().await?;
        if self.identity.application_version < stored_required {
            return Err(SyncError::OutOfDateApplication {
                current: self.identity.application_version,
                required: stored_required,
            });
        }

        let stored_structure = self.meta.structure_version().await?;
        let upgrading = self.identity.structure_version > stored_structure;
        if upgrading {
            info!(
                from = stored_structure,
                to = self.identity.structure_version,
                "Structure upgrade"
            );
            self.identity.hooks.before_upgrade(stored_structure);
        }

        let catalog = self.catalog.list_tables().await?;
        let diff = diff_tables(&self.declared.tables, &catalog);
        let mut report = SyncReport::default();

        self.create_pass(&diff, &mut report).await;
        self.check_pass(&diff, &catalog, &mut report).await?;
        self.drop_pass(&diff, &mut report).await;

        if report.has_failures() {
            // The stored versions stay where they are so the next run
            // re-enters the upgrade path, hooks included.
            warn!("Pass had failures; version bookkeeping deferred");
            return Ok(report);
        }

        if upgrading {
            self.identity.hooks.after_upgrade(stored_structure);
            self.meta
                .set_structure_version(self.identity.structure_version)
                .await?;
        }
        if self.identity.required_application_version > stored_required {
            self.meta
                .set_required_application_version(self.identity.required_application_version)
                .await?;
        }

        Ok(report)
    }

    /// First-ever synchronization: create every declared table fresh.
    async fn deploy_fresh(&self) -> Result<SyncReport> {
        info!(tables = self.declared.tables.len(), "Deploying fresh store");
        self.meta.ensure_table().await?;

        let mut report = SyncReport::default();
        for table in &self.declared.tables {
            self.create_table(table, &mut report).await;
        }

        if report.has_failures() {
            warn!("Fresh deploy had failures; version bookkeeping deferred");
            return Ok(report);
        }
        self.meta
            .set_structure_version(self.identity.structure_version)
            .await?;
        self.meta
            .set_required_application_version(self.identity.required_application_version)
            .await?;
        Ok(report)
    }

    async fn create_pass(&self, diff: &SchemaDiff, report: &mut SyncReport) {
        for name in &diff.to_create {
            if !self.declared.policy_for(name).deploy_new_tables {
                warn!(table = %name, "New table pending but deploy_new_tables is disabled");
                report.record(name, TableOutcome::Skipped);
                continue;
            }
            let Some(table) = self.declared.get_table(name) else {
                continue;
            };
            self.create_table(table, report).await;
        }
    }

    async fn create_table(&self, table: &TableDefinition, report: &mut SyncReport) {
        debug!(sql = %table.creation_sql, "Executing SQL");
        match sqlx::query(&table.creation_sql).execute(&self.pool).await {
            Ok(_) => {
                info!(table = %table.name, "Table created");
                report.record(&table.name, TableOutcome::Created);
            }
            Err(err) => {
                warn!(table = %table.name, error = %err, "Table creation failed");
                report.record(&table.name, TableOutcome::Failed(err.to_string()));
            }
        }
    }

    async fn check_pass(
        &self,
        diff: &SchemaDiff,
        catalog: &[CatalogEntry],
        report: &mut SyncReport,
    ) -> Result<()> {
        for name in &diff.to_check {
            let Some(table) = self.declared.get_table(name) else {
                continue;
            };
            let Some(entry) = catalog.iter().find(|e| &e.name == name) else {
                continue;
            };
            let columns = self.catalog.columns_of(name).await?;
            let entity_diff = diff_columns(table, &columns);
            let policy = self.declared.policy_for(name);

            match classify(table, entry, &entity_diff) {
                SyncAction::UpToDate => report.record(name, TableOutcome::UpToDate),
                SyncAction::Additive(columns) if columns.is_empty() => {
                    report.record(name, TableOutcome::UpToDate);
                }
                SyncAction::Additive(columns) => {
                    if !policy.deploy_new_columns {
                        warn!(table = %name, "New columns pending but deploy_new_columns is disabled");
                        report.record(name, TableOutcome::Skipped);
                        continue;
                    }
                    match self.add_columns(table, &columns).await {
                        Ok(()) => {
                            info!(table = %name, columns = columns.len(), "Columns added");
                            report.record(name, TableOutcome::Altered(columns));
                        }
                        Err(err) => {
                            warn!(table = %name, error = %err, "Additive change failed");
                            report.record(name, TableOutcome::Failed(err.to_string()));
                        }
                    }
                }
                SyncAction::Redefine => {
                    if !policy.redefine_tables {
                        warn!(table = %name, "Redefinition needed but redefine_tables is disabled");
                        report.record(name, TableOutcome::Skipped);
                        continue;
                    }
                    let renames = self.declared.renames_for(name);
                    match self.executor.redefine(table, &entity_diff, renames).await {
                        Ok(()) => report.record(name, TableOutcome::Redefined),
                        Err(err) => {
                            warn!(table = %name, error = %err, "Redefinition failed");
                            report.record(name, TableOutcome::Failed(err.to_string()));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn add_columns(&self, table: &TableDefinition, columns: &[String]) -> Result<()> {
        for name in columns {
            let Some(column) = table.get_column(name) else {
                continue;
            };
            let sql = format!(
                "ALTER TABLE {} ADD COLUMN {}",
                quote_identifier(&table.name),
                column.raw
            );
            debug!(sql = %sql, "Executing SQL");
            sqlx::query(&sql).execute(&self.pool).await.map_err(|source| {
                SyncError::AdditiveChangeFailed {
                    table: table.name.clone(),
                    column: name.clone(),
                    source,
                }
            })?;
        }
        Ok(())
    }

    async fn drop_pass(&self, diff: &SchemaDiff, report: &mut SyncReport) {
        for name in &diff.to_delete {
            let policy = self.declared.policy_for(name);
            if !policy.drop_tables || !self.identity.drop_whitelist.contains(name) {
                info!(table = %name, "Drop refused by policy or whitelist");
                report.record(name, TableOutcome::DropRefused);
                continue;
            }
            let sql = format!("DROP TABLE {}", quote_identifier(name));
            debug!(sql = %sql, "Executing SQL");
            match sqlx::query(&sql).execute(&self.pool).await {
                Ok(_) => {
                    info!(table = %name, "Table dropped");
                    report.record(name, TableOutcome::Dropped);
                }
                Err(err) => {
                    warn!(table = %name, error = %err, "Drop failed");
                    report.record(name, TableOutcome::Failed(err.to_string()));
                }
            }
        }
    }
}

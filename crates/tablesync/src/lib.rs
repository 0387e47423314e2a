//! Declarative schema synchronization for embedded SQLite stores.
//!
//! `tablesync` reconciles a schema declared in code with whatever a store
//! currently contains, without migration scripts:
//! - Missing tables and columns are created in place
//! - Tables whose stored shape diverged beyond what `ALTER TABLE` can
//!   express are rebuilt transactionally, preserving their data
//! - Undeclared tables are dropped only when policy and an explicit
//!   whitelist both allow it
//!
//! # Architecture
//!
//! A synchronization run flows through several components:
//!
//! - **Catalog** - Reads `sqlite_master` and `PRAGMA table_info` state
//! - **Diff** - Partitions tables and columns into create/check/delete sets
//! - **Classifier** - Decides per table between additive `ALTER TABLE` and
//!   full redefinition
//! - **Redefine** - Rebuilds a table (rename, create, copy, drop) inside
//!   one transaction with foreign keys suspended
//! - **Orchestrator** - Drives the passes, gates on versions, runs upgrade
//!   hooks and records per-table outcomes
//!
//! # Example
//!
//! ```rust,ignore
//! use tablesync::prelude::*;
//!
//! let declared = DeclaredSchema::new().table(
//!     TableDefinition::new("accounts")
//!         .column(ColumnDefinition::new("id", "INTEGER").primary_key())
//!         .column(ColumnDefinition::new("name", "TEXT").not_null())
//!         .column(ColumnDefinition::new("bic", "TEXT")),
//! );
//!
//! let identity = AppIdentity::new(12).structure_version(3);
//! let report = Synchronizer::new(pool, declared, identity)
//!     .auto_sync_schema()
//!     .await?;
//! assert!(!report.has_failures());
//! ```

pub mod catalog;
pub mod classifier;
pub mod diff;
pub mod error;
pub mod identity;
pub mod meta;
pub mod orchestrator;
pub mod parser;
pub mod policy;
pub mod redefine;
pub mod schema;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::catalog::{CatalogEntry, CatalogReader, ColumnMetadata};
    pub use crate::classifier::SyncAction;
    pub use crate::diff::{EntityDiff, SchemaDiff};
    pub use crate::error::{Result, SyncError};
    pub use crate::identity::{AppIdentity, NoopHooks, UpgradeHooks};
    pub use crate::meta::MetaStore;
    pub use crate::orchestrator::{SyncReport, Synchronizer, TableOutcome};
    pub use crate::policy::{DropWhitelist, SyncPolicy};
    pub use crate::redefine::RedefinitionExecutor;
    pub use crate::schema::{
        ColumnDefinition, Constraint, ConstraintKind, DeclaredSchema, StorageClass,
        TableDefinition,
    };
}

//! Schema diff engine.
//!
//! Computes name-only set differences between the declared schema and the
//! catalog. Type drift on a column that exists on both sides is deliberately
//! not surfaced here; the classifier catches it with a structural comparison,
//! which is why fast name-only diffing suffices at this layer.

use std::collections::BTreeSet;

use crate::catalog::{CatalogEntry, ColumnMetadata};
use crate::meta::META_TABLE;
use crate::schema::TableDefinition;

/// Prefix of the engine's internal catalog tables.
const RESERVED_PREFIX: &str = "sqlite_";

/// Returns whether a table name is reserved and excluded from diffing.
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX) || name == META_TABLE
}

/// Table-level difference between the declared schema and the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    /// Declared but absent from the store.
    pub to_create: BTreeSet<String>,
    /// Present on both sides; needs per-column inspection.
    pub to_check: BTreeSet<String>,
    /// Present in the store but no longer declared.
    pub to_delete: BTreeSet<String>,
}

/// Column-level difference for one checked table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityDiff {
    /// Declared but absent from the table.
    pub columns_to_create: BTreeSet<String>,
    /// Present on both sides.
    pub columns_to_check: BTreeSet<String>,
    /// Present in the table but no longer declared.
    pub columns_to_delete: BTreeSet<String>,
}

/// Partitions table names into create/check/delete sets.
///
/// Reserved names (internal catalog tables and the engine's own metadata
/// table) never appear in any of the three sets.
#[must_use]
pub fn diff_tables(declared: &[TableDefinition], catalog: &[CatalogEntry]) -> SchemaDiff {
    let declared_names: BTreeSet<&str> = declared
        .iter()
        .map(|t| t.name.as_str())
        .filter(|name| !is_reserved(name))
        .collect();
    let catalog_names: BTreeSet<&str> = catalog
        .iter()
        .map(|e| e.name.as_str())
        .filter(|name| !is_reserved(name))
        .collect();

    SchemaDiff {
        to_create: declared_names
            .difference(&catalog_names)
            .map(ToString::to_string)
            .collect(),
        to_check: declared_names
            .intersection(&catalog_names)
            .map(ToString::to_string)
            .collect(),
        to_delete: catalog_names
            .difference(&declared_names)
            .map(ToString::to_string)
            .collect(),
    }
}

/// Partitions the column names of one table into create/check/delete sets.
#[must_use]
pub fn diff_columns(declared: &TableDefinition, catalog_columns: &[ColumnMetadata]) -> EntityDiff {
    let declared_names: BTreeSet<&str> = declared.column_names().collect();
    let catalog_names: BTreeSet<&str> = catalog_columns.iter().map(|c| c.name.as_str()).collect();

    EntityDiff {
        columns_to_create: declared_names
            .difference(&catalog_names)
            .map(ToString::to_string)
            .collect(),
        columns_to_check: declared_names
            .intersection(&catalog_names)
            .map(ToString::to_string)
            .collect(),
        columns_to_delete: catalog_names
            .difference(&declared_names)
            .map(ToString::to_string)
            .collect(),
    }
}

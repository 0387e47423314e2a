//! Redefinition need classifier.
//!
//! Decides, per table, whether the difference between the declared
//! definition and the catalog is expressible as pure column addition or
//! requires a full redefinition. The layered rule set is evaluated in order
//! and short-circuits on the first conclusive condition.

use crate::catalog::CatalogEntry;
use crate::diff::EntityDiff;
use crate::parser;
use crate::schema::TableDefinition;

/// What a synchronization pass must do with one checked table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// The stored table already matches the declaration.
    UpToDate,
    /// The declared columns listed can simply be added.
    Additive(Vec<String>),
    /// The table must be rebuilt through the redefinition executor.
    Redefine,
}

/// Classifies one checked table.
///
/// Rules, in order:
/// 1. creation-text fast path, 2. storage-mode mismatch, 3. column
/// structural mismatch, 4. constraint set mismatch, 5. pending column
/// deletion, 6. additive. A catalog column or constraint the parser could
/// not recover counts as a mismatch, so a parse miss forces redefinition
/// instead of being skipped.
#[must_use]
pub fn classify(declared: &TableDefinition, entry: &CatalogEntry, diff: &EntityDiff) -> SyncAction {
    // 1. Fast path: identical creation-statement bodies.
    if let (Some(declared_body), Some(catalog_body)) = (
        parser::creation_body(&declared.creation_sql),
        parser::creation_body(&entry.sql),
    ) {
        if declared_body == catalog_body {
            return SyncAction::UpToDate;
        }
    }

    // 2. Storage mode: WITHOUT ROWID on exactly one side.
    if declared.without_rowid != parser::is_without_rowid(&entry.sql) {
        return SyncAction::Redefine;
    }

    // 3. Structural comparison of the columns present on both sides.
    let catalog_columns = parser::parse_columns(&entry.sql);
    for name in &diff.columns_to_check {
        let Some(declared_column) = declared.get_column(name) else {
            return SyncAction::Redefine;
        };
        match catalog_columns.iter().find(|c| &c.name == name) {
            Some(catalog_column) if declared_column.structurally_equal(catalog_column) => {}
            _ => return SyncAction::Redefine,
        }
    }

    // 4. Constraint sets must match structurally.
    let catalog_constraints = parser::parse_constraints(&entry.sql);
    if catalog_constraints.len() != declared.constraints.len() {
        return SyncAction::Redefine;
    }
    for constraint in &declared.constraints {
        if !catalog_constraints.iter().any(|c| c == constraint) {
            return SyncAction::Redefine;
        }
    }

    // 5. Additive ALTER cannot remove a column.
    if !diff.columns_to_delete.is_empty() {
        return SyncAction::Redefine;
    }

    SyncAction::Additive(diff.columns_to_create.iter().cloned().collect())
}

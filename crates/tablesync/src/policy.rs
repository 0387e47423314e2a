//! Synchronization policy and drop whitelist.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Controls which kinds of changes a synchronization pass may apply.
///
/// Resolved once per table (global default plus optional per-table override)
/// and read-only during the pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPolicy {
    /// Create tables that are declared but absent from the store.
    pub deploy_new_tables: bool,
    /// Add declared columns missing from an existing table.
    pub deploy_new_columns: bool,
    /// Drop tables present in the store but no longer declared.
    /// Dropping additionally requires a [`DropWhitelist`] entry.
    pub drop_tables: bool,
    /// Allow full table redefinition when a change is not additive.
    pub redefine_tables: bool,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            deploy_new_tables: true,
            deploy_new_columns: true,
            drop_tables: false,
            redefine_tables: true,
        }
    }
}

impl SyncPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether new tables are created.
    #[must_use]
    pub fn deploy_new_tables(mut self, enabled: bool) -> Self {
        self.deploy_new_tables = enabled;
        self
    }

    /// Sets whether missing columns are added.
    #[must_use]
    pub fn deploy_new_columns(mut self, enabled: bool) -> Self {
        self.deploy_new_columns = enabled;
        self
    }

    /// Sets whether undeclared tables may be dropped.
    #[must_use]
    pub fn drop_tables(mut self, enabled: bool) -> Self {
        self.drop_tables = enabled;
        self
    }

    /// Sets whether full redefinition is allowed.
    #[must_use]
    pub fn redefine_tables(mut self, enabled: bool) -> Self {
        self.redefine_tables = enabled;
        self
    }
}

/// Tables the application has explicitly declared droppable.
///
/// A table outside the whitelist is never dropped, even when it is
/// undeclared and the policy enables drops. The whitelist holds for the
/// whole lifetime of a synchronization run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DropWhitelist {
    tables: HashSet<String>,
}

impl DropWhitelist {
    /// Creates an empty whitelist.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table to the whitelist.
    #[must_use]
    pub fn allow(mut self, table: impl Into<String>) -> Self {
        self.tables.insert(table.into());
        self
    }

    /// Returns whether the table may be dropped.
    #[must_use]
    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains(table)
    }
}

impl<S: Into<String>> FromIterator<S> for DropWhitelist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            tables: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_conservative_about_drops() {
        let policy = SyncPolicy::default();
        assert!(policy.deploy_new_tables);
        assert!(policy.deploy_new_columns);
        assert!(policy.redefine_tables);
        assert!(!policy.drop_tables);
    }

    #[test]
    fn test_whitelist_membership() {
        let whitelist = DropWhitelist::new().allow("legacy_sessions");
        assert!(whitelist.contains("legacy_sessions"));
        assert!(!whitelist.contains("accounts"));
    }

    #[test]
    fn test_whitelist_from_iterator() {
        let whitelist: DropWhitelist = ["a", "b"].into_iter().collect();
        assert!(whitelist.contains("a"));
        assert!(whitelist.contains("b"));
    }
}

//! Declared schema representation.
//!
//! These types describe the structure the application expects each table to
//! have. They are produced once per process by the mapping layer (code
//! generation, builders, manual registration) and treated as read-only for
//! the duration of a synchronization pass. The catalog side is parsed into
//! the same shapes so that comparison is structural.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::policy::SyncPolicy;

/// Quotes an identifier for use in SQL statements.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Collapses runs of whitespace into single spaces.
pub(crate) fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SQLite storage class of a column, derived from the declared type keyword
/// via the engine's affinity rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageClass {
    /// INTEGER affinity.
    Integer,
    /// REAL affinity.
    Real,
    /// TEXT affinity.
    Text,
    /// BLOB affinity.
    Blob,
}

impl StorageClass {
    /// Derives the storage class from a declared type keyword.
    ///
    /// Follows SQLite's affinity rules: `INT` wins first, then
    /// `CHAR`/`CLOB`/`TEXT`, then `BLOB` (or no type at all), then
    /// `REAL`/`FLOA`/`DOUB`. Anything else falls back to INTEGER so that
    /// both the declared and the parsed side map identically.
    #[must_use]
    pub fn from_type_name(type_name: &str) -> Self {
        let upper = type_name.to_uppercase();
        if upper.contains("INT") {
            Self::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Self::Text
        } else if upper.is_empty() || upper.contains("BLOB") {
            Self::Blob
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Self::Real
        } else {
            Self::Integer
        }
    }
}

/// Definition of a single column.
///
/// Immutable once constructed; the builder methods consume and return the
/// value. `raw` holds the textual fragment the column renders to (or was
/// parsed from) and is what `ALTER TABLE ... ADD COLUMN` executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,
    /// Declared type keyword (e.g. `INTEGER`, `VARCHAR(30)`).
    pub type_name: String,
    /// Storage class derived from `type_name`.
    pub storage_class: StorageClass,
    /// Whether the column is declared `PRIMARY KEY`.
    pub primary_key: bool,
    /// Whether the column is declared `AUTOINCREMENT`.
    pub autoincrement: bool,
    /// Whether the column carries an inline `UNIQUE` constraint.
    pub unique: bool,
    /// Whether the column is declared `NOT NULL`.
    pub not_null: bool,
    /// Default value as SQL literal text, if any.
    pub default_value: Option<String>,
    /// Textual form of the column definition.
    pub raw: String,
}

impl ColumnDefinition {
    /// Creates a new column definition.
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let name = name.into();
        let type_name = type_name.into();
        let mut column = Self {
            storage_class: StorageClass::from_type_name(&type_name),
            name,
            type_name,
            primary_key: false,
            autoincrement: false,
            unique: false,
            not_null: false,
            default_value: None,
            raw: String::new(),
        };
        column.raw = column.render();
        column
    }

    /// Marks the column as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.raw = self.render();
        self
    }

    /// Marks the column as auto-incrementing.
    #[must_use]
    pub fn autoincrement(mut self) -> Self {
        self.autoincrement = true;
        self.raw = self.render();
        self
    }

    /// Adds an inline `UNIQUE` constraint.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self.raw = self.render();
        self
    }

    /// Marks the column as `NOT NULL`.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self.raw = self.render();
        self
    }

    /// Sets the default value (SQL literal text, e.g. `0` or `'pending'`).
    #[must_use]
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self.raw = self.render();
        self
    }

    /// Compares two columns structurally: storage class, primary-key flag,
    /// uniqueness and default value. Raw text, nullability and
    /// auto-increment participate in the creation-text fast path instead.
    #[must_use]
    pub fn structurally_equal(&self, other: &Self) -> bool {
        self.storage_class == other.storage_class
            && self.primary_key == other.primary_key
            && self.unique == other.unique
            && self.default_value == other.default_value
    }

    /// Renders the column definition fragment.
    fn render(&self) -> String {
        let mut parts = vec![quote_identifier(&self.name)];
        if !self.type_name.is_empty() {
            parts.push(self.type_name.clone());
        }
        if self.primary_key {
            parts.push("PRIMARY KEY".to_string());
            if self.autoincrement {
                parts.push("AUTOINCREMENT".to_string());
            }
        }
        if self.not_null && !self.primary_key {
            parts.push("NOT NULL".to_string());
        }
        if self.unique && !self.primary_key {
            parts.push("UNIQUE".to_string());
        }
        if let Some(ref default) = self.default_value {
            parts.push(format!("DEFAULT {}", default));
        }
        parts.join(" ")
    }
}

/// Kind of a table-level constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// Table-level `PRIMARY KEY (...)`.
    PrimaryKey,
    /// `FOREIGN KEY (...) REFERENCES ...`.
    ForeignKey,
    /// Table-level `UNIQUE (...)`.
    Unique,
    /// `CHECK (...)`.
    Check,
}

/// A table-level constraint.
///
/// Equality is structural (kind, columns and reference), never textual;
/// `CHECK` expressions are stored whitespace-collapsed so the declared and
/// parsed sides compare cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    /// Constraint kind.
    pub kind: ConstraintKind,
    /// Ordered column list the constraint applies to.
    pub columns: Vec<String>,
    /// Referenced table, for foreign keys.
    pub referenced_table: Option<String>,
    /// Referenced column, for foreign keys.
    pub referenced_column: Option<String>,
    /// Check expression, for check constraints.
    pub expression: Option<String>,
}

impl Constraint {
    /// Creates a table-level primary key constraint.
    #[must_use]
    pub fn primary_key(columns: Vec<String>) -> Self {
        Self {
            kind: ConstraintKind::PrimaryKey,
            columns,
            referenced_table: None,
            referenced_column: None,
            expression: None,
        }
    }

    /// Creates a table-level unique constraint.
    #[must_use]
    pub fn unique(columns: Vec<String>) -> Self {
        Self {
            kind: ConstraintKind::Unique,
            columns,
            referenced_table: None,
            referenced_column: None,
            expression: None,
        }
    }

    /// Creates a foreign key constraint.
    #[must_use]
    pub fn foreign_key(
        column: impl Into<String>,
        referenced_table: impl Into<String>,
        referenced_column: impl Into<String>,
    ) -> Self {
        Self {
            kind: ConstraintKind::ForeignKey,
            columns: vec![column.into()],
            referenced_table: Some(referenced_table.into()),
            referenced_column: Some(referenced_column.into()),
            expression: None,
        }
    }

    /// Creates a check constraint.
    #[must_use]
    pub fn check(expression: impl Into<String>) -> Self {
        Self {
            kind: ConstraintKind::Check,
            columns: Vec::new(),
            referenced_table: None,
            referenced_column: None,
            expression: Some(collapse_ws(&expression.into())),
        }
    }

    /// Renders the constraint as a `CREATE TABLE` body fragment.
    #[must_use]
    pub fn render(&self) -> String {
        let quoted: Vec<String> = self.columns.iter().map(|c| quote_identifier(c)).collect();
        match self.kind {
            ConstraintKind::PrimaryKey => format!("PRIMARY KEY ({})", quoted.join(", ")),
            ConstraintKind::Unique => format!("UNIQUE ({})", quoted.join(", ")),
            ConstraintKind::ForeignKey => format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                quoted.join(", "),
                quote_identifier(self.referenced_table.as_deref().unwrap_or_default()),
                quote_identifier(self.referenced_column.as_deref().unwrap_or_default()),
            ),
            ConstraintKind::Check => format!(
                "CHECK ({})",
                self.expression.as_deref().unwrap_or_default()
            ),
        }
    }
}

/// Complete declared definition of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Table name.
    pub name: String,
    /// Ordered column definitions.
    pub columns: Vec<ColumnDefinition>,
    /// Table-level constraints.
    pub constraints: Vec<Constraint>,
    /// Whether the table uses `WITHOUT ROWID` storage.
    pub without_rowid: bool,
    /// The exact creation statement used to (re)create the table.
    pub creation_sql: String,
}

impl TableDefinition {
    /// Creates a new table definition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut table = Self {
            name: name.into(),
            columns: Vec::new(),
            constraints: Vec::new(),
            without_rowid: false,
            creation_sql: String::new(),
        };
        table.creation_sql = table.render();
        table
    }

    /// Appends a column.
    #[must_use]
    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self.creation_sql = self.render();
        self
    }

    /// Appends a table-level constraint.
    #[must_use]
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self.creation_sql = self.render();
        self
    }

    /// Switches the table to `WITHOUT ROWID` storage.
    #[must_use]
    pub fn without_rowid(mut self) -> Self {
        self.without_rowid = true;
        self.creation_sql = self.render();
        self
    }

    /// Overrides the creation statement with externally supplied text.
    ///
    /// Mapping layers that carry their own DDL text use this; the default
    /// is the deterministic rendering of columns and constraints.
    #[must_use]
    pub fn creation_sql(mut self, sql: impl Into<String>) -> Self {
        self.creation_sql = sql.into();
        self
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns the column names in declaration order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Renders the full `CREATE TABLE` statement.
    fn render(&self) -> String {
        let mut items: Vec<String> = self.columns.iter().map(|c| c.raw.clone()).collect();
        items.extend(self.constraints.iter().map(Constraint::render));
        let mut sql = format!(
            "CREATE TABLE {} ({})",
            quote_identifier(&self.name),
            items.join(", ")
        );
        if self.without_rowid {
            sql.push_str(" WITHOUT ROWID");
        }
        sql
    }
}

/// The full set of declared tables together with the synchronization policy,
/// per-table overrides and explicit column renames.
///
/// Supplied by the mapping collaborator once per process; read-only during a
/// synchronization pass.
#[derive(Debug, Clone, Default)]
pub struct DeclaredSchema {
    /// Declared table definitions.
    pub tables: Vec<TableDefinition>,
    policy: SyncPolicy,
    overrides: HashMap<String, SyncPolicy>,
    renames: HashMap<String, Vec<(String, String)>>,
}

impl DeclaredSchema {
    /// Creates an empty declared schema with the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a declared table.
    #[must_use]
    pub fn table(mut self, table: TableDefinition) -> Self {
        self.tables.push(table);
        self
    }

    /// Sets the global synchronization policy.
    #[must_use]
    pub fn policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Overrides the policy for a single table.
    #[must_use]
    pub fn policy_override(mut self, table: impl Into<String>, policy: SyncPolicy) -> Self {
        self.overrides.insert(table.into(), policy);
        self
    }

    /// Declares that `old` was renamed to `new` in `table`, so redefinition
    /// carries the old values under the new name.
    #[must_use]
    pub fn rename_column(
        mut self,
        table: impl Into<String>,
        old: impl Into<String>,
        new: impl Into<String>,
    ) -> Self {
        self.renames
            .entry(table.into())
            .or_default()
            .push((old.into(), new.into()));
        self
    }

    /// Resolves the effective policy for a table.
    #[must_use]
    pub fn policy_for(&self, table: &str) -> SyncPolicy {
        self.overrides.get(table).copied().unwrap_or(self.policy)
    }

    /// Returns the declared renames for a table.
    #[must_use]
    pub fn renames_for(&self, table: &str) -> &[(String, String)] {
        self.renames.get(table).map_or(&[], Vec::as_slice)
    }

    /// Gets a declared table by name.
    #[must_use]
    pub fn get_table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_class_affinity() {
        assert_eq!(StorageClass::from_type_name("INTEGER"), StorageClass::Integer);
        assert_eq!(StorageClass::from_type_name("BIGINT"), StorageClass::Integer);
        assert_eq!(StorageClass::from_type_name("VARCHAR(30)"), StorageClass::Text);
        assert_eq!(StorageClass::from_type_name("text"), StorageClass::Text);
        assert_eq!(StorageClass::from_type_name("BLOB"), StorageClass::Blob);
        assert_eq!(StorageClass::from_type_name(""), StorageClass::Blob);
        assert_eq!(StorageClass::from_type_name("DOUBLE"), StorageClass::Real);
        // INT wins over anything else, per the affinity ordering
        assert_eq!(StorageClass::from_type_name("POINT"), StorageClass::Integer);
    }

    #[test]
    fn test_column_rendering() {
        let col = ColumnDefinition::new("id", "INTEGER")
            .primary_key()
            .autoincrement();
        assert_eq!(col.raw, "\"id\" INTEGER PRIMARY KEY AUTOINCREMENT");

        let col = ColumnDefinition::new("state", "TEXT")
            .not_null()
            .default_value("'pending'");
        assert_eq!(col.raw, "\"state\" TEXT NOT NULL DEFAULT 'pending'");
    }

    #[test]
    fn test_structural_equality_ignores_raw_text() {
        let a = ColumnDefinition::new("n", "INTEGER");
        let b = ColumnDefinition::new("n", "BIGINT");
        // Different type keywords, same storage class
        assert!(a.structurally_equal(&b));

        let c = ColumnDefinition::new("n", "TEXT");
        assert!(!a.structurally_equal(&c));

        let d = ColumnDefinition::new("n", "INTEGER").default_value("0");
        assert!(!a.structurally_equal(&d));
    }

    #[test]
    fn test_constraint_equality_is_structural() {
        let a = Constraint::foreign_key("owner_id", "users", "id");
        let b = Constraint::foreign_key("owner_id", "users", "id");
        assert_eq!(a, b);

        let c = Constraint::foreign_key("owner_id", "accounts", "id");
        assert_ne!(a, c);

        // Check expressions compare whitespace-insensitively
        assert_eq!(
            Constraint::check("amount  >\n 0"),
            Constraint::check("amount > 0")
        );
    }

    #[test]
    fn test_table_rendering() {
        let table = TableDefinition::new("accounts")
            .column(ColumnDefinition::new("id", "INTEGER").primary_key())
            .column(ColumnDefinition::new("name", "TEXT").not_null())
            .constraint(Constraint::unique(vec!["name".to_string()]));

        assert_eq!(
            table.creation_sql,
            "CREATE TABLE \"accounts\" (\"id\" INTEGER PRIMARY KEY, \"name\" TEXT NOT NULL, UNIQUE (\"name\"))"
        );
    }

    #[test]
    fn test_without_rowid_suffix() {
        let table = TableDefinition::new("kv")
            .column(ColumnDefinition::new("key", "TEXT").primary_key())
            .column(ColumnDefinition::new("value", "BLOB"))
            .without_rowid();
        assert!(table.creation_sql.ends_with(" WITHOUT ROWID"));
    }

    #[test]
    fn test_policy_resolution() {
        use crate::policy::SyncPolicy;

        let declared = DeclaredSchema::new()
            .policy(SyncPolicy::default().drop_tables(true))
            .policy_override("audit_log", SyncPolicy::default());

        assert!(declared.policy_for("accounts").drop_tables);
        assert!(!declared.policy_for("audit_log").drop_tables);
    }

    #[test]
    fn test_renames_for() {
        let declared = DeclaredSchema::new().rename_column("accounts", "name", "full_name");
        assert_eq!(
            declared.renames_for("accounts"),
            &[("name".to_string(), "full_name".to_string())]
        );
        assert!(declared.renames_for("other").is_empty());
    }
}

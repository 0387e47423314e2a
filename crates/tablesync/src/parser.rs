//! Parser for the creation text stored in the catalog.
//!
//! SQLite keeps the original `CREATE TABLE` statement verbatim in
//! `sqlite_master`. This module splits that text back into
//! [`ColumnDefinition`]s and [`Constraint`]s so the catalog side can be
//! compared structurally against a declared [`TableDefinition`]
//! (see `crate::schema`).
//!
//! The parser tolerates the formatting variance SQLite itself produces:
//! double-quote, backtick and bracket identifier quoting, arbitrary
//! whitespace and keyword casing. A fragment it cannot confidently classify
//! is dropped from the result; the classifier treats the resulting gap as a
//! structural mismatch and forces redefinition rather than skipping it.

use crate::schema::{collapse_ws, ColumnDefinition, Constraint, ConstraintKind, StorageClass};

/// Keywords that terminate the type portion of a column definition.
const COLUMN_KEYWORDS: &[&str] = &[
    "PRIMARY",
    "NOT",
    "NULL",
    "UNIQUE",
    "DEFAULT",
    "CHECK",
    "REFERENCES",
    "COLLATE",
    "GENERATED",
    "AS",
    "CONSTRAINT",
    "AUTOINCREMENT",
];

/// Leading keywords that mark a body item as a table-level constraint.
const CONSTRAINT_KEYWORDS: &[&str] = &["CONSTRAINT", "PRIMARY", "FOREIGN", "UNIQUE", "CHECK"];

/// Returns the creation-statement body: everything after the opening
/// parenthesis, trimmed. This is the text the classifier's fast path
/// compares.
#[must_use]
pub fn creation_body(sql: &str) -> Option<&str> {
    sql.split_once('(').map(|(_, body)| body.trim())
}

/// Parses the column definitions out of a raw `CREATE TABLE` statement.
///
/// Fragments that cannot be parsed are omitted.
#[must_use]
pub fn parse_columns(sql: &str) -> Vec<ColumnDefinition> {
    let Some((body, _)) = extract_body(sql) else {
        return Vec::new();
    };
    split_top_level(body)
        .into_iter()
        .filter(|item| !is_constraint_item(item))
        .filter_map(parse_column)
        .collect()
}

/// Parses the table-level constraints out of a raw `CREATE TABLE` statement.
///
/// Fragments that cannot be parsed are omitted.
#[must_use]
pub fn parse_constraints(sql: &str) -> Vec<Constraint> {
    let Some((body, _)) = extract_body(sql) else {
        return Vec::new();
    };
    split_top_level(body)
        .into_iter()
        .filter(|item| is_constraint_item(item))
        .filter_map(parse_constraint)
        .collect()
}

/// Returns whether the statement declares `WITHOUT ROWID` storage.
#[must_use]
pub fn is_without_rowid(sql: &str) -> bool {
    extract_body(sql)
        .map(|(_, tail)| collapse_ws(tail).to_uppercase().contains("WITHOUT ROWID"))
        .unwrap_or(false)
}

/// Extracts the parenthesized body of the statement and the text after it.
fn extract_body(sql: &str) -> Option<(&str, &str)> {
    let open = sql.find('(')?;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (offset, c) in sql[open..].char_indices() {
        let i = open + offset;
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '[' => quote = Some(']'),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some((&sql[open + 1..i], &sql[i + 1..]));
                    }
                }
                _ => {}
            },
        }
    }
    None
}

/// Splits a statement body on commas that sit outside parentheses, quotes
/// and brackets.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    for (i, c) in body.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '[' => quote = Some(']'),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    let item = body[start..i].trim();
                    if !item.is_empty() {
                        items.push(item);
                    }
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    let last = body[start..].trim();
    if !last.is_empty() {
        items.push(last);
    }
    items
}

/// Blanks out quoted spans (string literals, quoted identifiers) so keyword
/// scans cannot match inside them. Byte offsets are preserved, so positions
/// found in the masked text index into the original.
fn mask_quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    for c in text.chars() {
        let inside = match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                true
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    true
                }
                '[' => {
                    quote = Some(']');
                    true
                }
                _ => false,
            },
        };
        if inside {
            for _ in 0..c.len_utf8() {
                out.push(' ');
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Takes a (possibly quoted) identifier off the front of the text.
fn take_identifier(text: &str) -> Option<(String, &str)> {
    let text = text.trim_start();
    let first = text.chars().next()?;
    match first {
        '"' | '`' | '\'' => {
            let end = text[1..].find(first)? + 1;
            Some((text[1..end].to_string(), &text[end + 1..]))
        }
        '[' => {
            let end = text.find(']')?;
            Some((text[1..end].to_string(), &text[end + 1..]))
        }
        c if c.is_alphanumeric() || c == '_' || c == '$' => {
            let end = text
                .find(|ch: char| !(ch.is_alphanumeric() || ch == '_' || ch == '$'))
                .unwrap_or(text.len());
            Some((text[..end].to_string(), &text[end..]))
        }
        _ => None,
    }
}

/// Takes a balanced parenthesized group off the front of the text,
/// returning the inner text and the remainder after the closing paren.
fn balanced(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if !text.starts_with('(') {
        return None;
    }
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '[' => quote = Some(']'),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some((&text[1..i], &text[i + 1..]));
                    }
                }
                _ => {}
            },
        }
    }
    None
}

/// Returns whether a body item is a table-level constraint rather than a
/// column definition. Quoted leading identifiers are always column names.
fn is_constraint_item(item: &str) -> bool {
    let trimmed = item.trim_start();
    if trimmed.starts_with(['"', '`', '[', '\'']) {
        return false;
    }
    take_identifier(trimmed)
        .map(|(word, _)| CONSTRAINT_KEYWORDS.contains(&word.to_uppercase().as_str()))
        .unwrap_or(false)
}

fn parse_column(fragment: &str) -> Option<ColumnDefinition> {
    let (name, rest) = take_identifier(fragment)?;
    if name.is_empty() {
        return None;
    }

    // Type keyword: bare words (with an optional parenthesized size suffix)
    // up to the first constraint keyword.
    let mut type_parts: Vec<String> = Vec::new();
    let mut rest = rest.trim_start();
    loop {
        if rest.is_empty() || rest.starts_with(['"', '`', '[', '\'', '(', ',']) {
            break;
        }
        let Some((word, after)) = take_identifier(rest) else {
            break;
        };
        if COLUMN_KEYWORDS.contains(&word.to_uppercase().as_str()) {
            break;
        }
        let mut part = word;
        let mut after = after;
        if after.trim_start().starts_with('(') {
            let (inner, remainder) = balanced(after)?;
            part = format!("{}({})", part, collapse_ws(inner));
            after = remainder;
        }
        type_parts.push(part);
        rest = after.trim_start();
    }
    let type_name = type_parts.join(" ");

    // Flags are matched against the masked tail so a keyword inside a
    // literal (e.g. DEFAULT 'UNIQUE') does not count.
    let tail_upper = collapse_ws(&mask_quoted(rest)).to_uppercase();
    Some(ColumnDefinition {
        storage_class: StorageClass::from_type_name(&type_name),
        name,
        type_name,
        primary_key: tail_upper.contains("PRIMARY KEY"),
        autoincrement: tail_upper.contains("AUTOINCREMENT"),
        unique: tail_upper.contains("UNIQUE"),
        not_null: tail_upper.contains("NOT NULL"),
        default_value: default_value_of(rest),
        raw: collapse_ws(fragment),
    })
}

/// Finds a standalone `DEFAULT` keyword and extracts the literal after it.
/// The keyword search runs over the masked text; the literal itself is
/// taken from the original.
fn default_value_of(rest: &str) -> Option<String> {
    let upper = mask_quoted(rest).to_uppercase();
    let bytes = upper.as_bytes();
    let mut search = 0usize;
    while let Some(pos) = upper[search..].find("DEFAULT") {
        let at = search + pos;
        let end = at + "DEFAULT".len();
        let boundary_before =
            at == 0 || !(bytes[at - 1].is_ascii_alphanumeric() || bytes[at - 1] == b'_');
        let boundary_after =
            end >= bytes.len() || !(bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_');
        if boundary_before && boundary_after {
            return parse_default_literal(rest[end..].trim_start());
        }
        search = end;
    }
    None
}

fn parse_default_literal(text: &str) -> Option<String> {
    let first = text.chars().next()?;
    if first == '(' {
        let (inner, _) = balanced(text)?;
        return Some(format!("({})", inner.trim()));
    }
    if first == '\'' {
        // Scan for the closing quote, skipping doubled-quote escapes.
        let bytes = text.as_bytes();
        let mut i = 1usize;
        while i < bytes.len() {
            if bytes[i] == b'\'' {
                if i + 1 < bytes.len() && bytes[i + 1] == b'\'' {
                    i += 2;
                    continue;
                }
                return Some(text[..=i].to_string());
            }
            i += 1;
        }
        return None;
    }
    let end = text
        .find(|c: char| c.is_whitespace() || c == ',')
        .unwrap_or(text.len());
    Some(text[..end].to_string())
}

fn parse_constraint(fragment: &str) -> Option<Constraint> {
    let mut rest = fragment.trim();

    // Optional "CONSTRAINT <name>" prefix.
    if let Some((word, after)) = take_identifier(rest) {
        if word.eq_ignore_ascii_case("CONSTRAINT") {
            let (_, after_name) = take_identifier(after)?;
            rest = after_name.trim_start();
        }
    }

    let upper = collapse_ws(rest).to_uppercase();
    if upper.starts_with("PRIMARY KEY") {
        return Some(Constraint::primary_key(idents_in_parens(rest)?));
    }
    if upper.starts_with("UNIQUE") {
        return Some(Constraint::unique(idents_in_parens(rest)?));
    }
    if upper.starts_with("FOREIGN KEY") {
        let open = rest.find('(')?;
        let (inner, tail) = balanced(&rest[open..])?;
        let columns = split_idents(inner);
        let refs = tail.to_uppercase().find("REFERENCES")?;
        let after_keyword = &tail[refs + "REFERENCES".len()..];
        let (table, after_table) = take_identifier(after_keyword)?;
        let referenced_column = balanced(after_table)
            .map(|(cols, _)| split_idents(cols))
            .and_then(|cols| cols.into_iter().next());
        return Some(Constraint {
            kind: ConstraintKind::ForeignKey,
            columns,
            referenced_table: Some(table),
            referenced_column,
            expression: None,
        });
    }
    if upper.starts_with("CHECK") {
        let open = rest.find('(')?;
        let (inner, _) = balanced(&rest[open..])?;
        return Some(Constraint::check(inner));
    }
    None
}

fn idents_in_parens(text: &str) -> Option<Vec<String>> {
    let open = text.find('(')?;
    let (inner, _) = balanced(&text[open..])?;
    Some(split_idents(inner))
}

fn split_idents(inner: &str) -> Vec<String> {
    split_top_level(inner)
        .into_iter()
        .filter_map(|item| take_identifier(item).map(|(name, _)| name))
        .collect()
}

//! SQL statement admission for read-only enforcement.
//!
//! This module provides the coarse textual filter applied to every statement
//! before it reaches a connection: it rejects empty input, multi-statement
//! batches, and (in read-only mode) write or administrative keywords.
//!
//! It is a heuristic, not a parser. Parameterized execution is the actual
//! injection boundary; this filter only decides which statements are admitted
//! at all.

use crate::error::{DbError, DbResult};
use regex::Regex;
use std::sync::LazyLock;

/// Maximum length accepted for a table or procedure identifier.
pub const MAX_IDENTIFIER_LEN: usize = 256;

/// Rejection reasons surfaced to callers.
mod reasons {
    pub const EMPTY: &str = "Query cannot be empty";
    pub const MULTIPLE_STATEMENTS: &str = "Multiple statements are not allowed";
    pub const WRITE_IN_READ_ONLY: &str =
        "Write operations (INSERT, UPDATE) are not allowed in read-only mode";
    pub const DANGEROUS_PROCEDURE: &str = "Dangerous stored procedure execution is not allowed";
}

static WRITE_KEYWORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:INSERT|UPDATE)\b").expect("valid write keyword regex"));

/// Keywords refused outside of SELECT/WITH statements in read-only mode.
/// Order matters: the first match decides the rejection reason.
static DENIED_KEYWORDS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        "DROP",
        "DELETE",
        "TRUNCATE",
        "ALTER",
        "CREATE",
        "GRANT",
        "REVOKE",
        "EXEC",
        "EXECUTE",
        "xp_cmdshell",
        "sp_configure",
    ]
    .into_iter()
    .map(|keyword| {
        let pattern = format!(r"(?i)\b{keyword}\b");
        (
            keyword,
            Regex::new(&pattern).expect("valid deny keyword regex"),
        )
    })
    .collect()
});

/// Validate a statement for execution.
///
/// With `allow_write` false, only single SELECT/WITH statements free of
/// dangerous keywords are admitted. With `allow_write` true, only the empty
/// and multi-statement checks apply; the write path does its own leading
/// keyword check on top of this.
pub fn validate_query(query: &str, allow_write: bool) -> DbResult<()> {
    if query.trim().is_empty() {
        return Err(DbError::validation(reasons::EMPTY));
    }

    if has_unquoted_semicolon(query) {
        return Err(DbError::validation(reasons::MULTIPLE_STATEMENTS));
    }

    if !allow_write {
        if !is_select_statement(query) {
            if WRITE_KEYWORDS.is_match(query) {
                return Err(DbError::validation(reasons::WRITE_IN_READ_ONLY));
            }
            for (keyword, pattern) in DENIED_KEYWORDS.iter() {
                if pattern.is_match(query) {
                    return Err(DbError::validation(format!(
                        "Operation not allowed: {keyword}"
                    )));
                }
            }
        }

        // Applies to SELECT statements too; a read-only SELECT can still try
        // to smuggle a shell call through OPENQUERY or similar.
        if query.to_lowercase().contains("xp_cmdshell") {
            return Err(DbError::validation(reasons::DANGEROUS_PROCEDURE));
        }
    }

    Ok(())
}

/// True iff the trimmed, upper-cased statement starts with SELECT or WITH.
///
/// Callers use this to branch between the streaming result path and the
/// affected-row-count path; the validator itself uses it to scope the
/// read-only keyword checks.
pub fn is_select_statement(query: &str) -> bool {
    let normalized = query.trim().to_uppercase();
    normalized.starts_with("SELECT") || normalized.starts_with("WITH")
}

/// Validate a table or procedure identifier before it is interpolated into
/// SQL text.
///
/// Accepts `name` or `schema.name`, each part optionally wrapped in one pair
/// of square brackets. Parts must be non-empty and purely alphanumeric or
/// underscore after the brackets are stripped.
pub fn is_valid_identifier(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_IDENTIFIER_LEN {
        return false;
    }

    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        return false;
    }

    parts.iter().all(|part| {
        let stripped = strip_brackets(part);
        !stripped.is_empty() && stripped.chars().all(|c| c.is_alphanumeric() || c == '_')
    })
}

/// Remove exactly one pair of surrounding square brackets, if present.
fn strip_brackets(part: &str) -> &str {
    part.strip_prefix('[')
        .and_then(|p| p.strip_suffix(']'))
        .unwrap_or(part)
}

/// Detect a batch separator outside of single-quoted string literals.
///
/// Walks the text tracking quote state; a doubled quote (`''`) toggles out
/// and straight back in, which is exactly the escape semantics T-SQL uses.
fn has_unquoted_semicolon(query: &str) -> bool {
    let mut in_string = false;
    for c in query.chars() {
        match c {
            '\'' => in_string = !in_string,
            ';' if !in_string => return true,
            _ => {}
        }
    }
    false
}

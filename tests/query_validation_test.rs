//! Integration tests for statement admission.
//!
//! These tests verify that read-only mode rejects write and administrative
//! statements, that multi-statement batches are always rejected, and that
//! identifier validation blocks malformed procedure and database names.

use mssql_mcp_server::db::validator::{
    is_select_statement, is_valid_identifier, validate_query,
};
use mssql_mcp_server::error::DbError;

fn rejection(query: &str, allow_write: bool) -> String {
    validate_query(query, allow_write)
        .expect_err("statement should be rejected")
        .to_string()
}

/// Test that admission failures surface as Validation errors, which the MCP
/// layer maps to invalid_params rather than internal errors.
#[test]
fn test_rejections_are_validation_errors() {
    let err = validate_query("DROP TABLE users", false).unwrap_err();
    assert!(
        matches!(err, DbError::Validation { .. }),
        "Should be Validation error, got: {:?}",
        err
    );

    let err = validate_query("", true).unwrap_err();
    assert!(matches!(err, DbError::Validation { .. }));
}

/// Test that empty and whitespace-only statements are rejected in both modes.
#[test]
fn test_empty_statement_rejected() {
    assert!(rejection("", false).contains("Query cannot be empty"));
    assert!(rejection("   \n\t ", false).contains("Query cannot be empty"));
    assert!(rejection("", true).contains("Query cannot be empty"));
}

/// Test that semicolons are rejected even when write operations are enabled.
#[test]
fn test_multi_statement_rejected_in_both_modes() {
    let batch = "SELECT 1; DROP TABLE users";
    assert!(rejection(batch, false).contains("Multiple statements are not allowed"));
    assert!(rejection(batch, true).contains("Multiple statements are not allowed"));

    // A trailing semicolon counts as a batch separator too
    assert!(rejection("SELECT 1;", true).contains("Multiple statements are not allowed"));
}

/// Test that semicolons inside string literals do not count as separators.
#[test]
fn test_semicolon_inside_literal_allowed() {
    assert!(validate_query("SELECT 'a;b' AS v", false).is_ok());
    assert!(validate_query("SELECT * FROM t WHERE note = ';'", false).is_ok());

    // Once the literal closes, a semicolon is a separator again
    assert!(rejection("SELECT 'a;b'; DELETE FROM t", false)
        .contains("Multiple statements are not allowed"));
}

/// Test that plain SELECT and CTE statements pass read-only validation.
#[test]
fn test_read_only_allows_select_and_cte() {
    assert!(validate_query("SELECT * FROM users WHERE id = 1", false).is_ok());
    assert!(validate_query("  select name from sys.tables  ", false).is_ok());
    assert!(validate_query(
        "WITH recent AS (SELECT TOP 10 * FROM orders ORDER BY id DESC) SELECT * FROM recent",
        false
    )
    .is_ok());
}

/// Test that INSERT and UPDATE get the dedicated write-operation message.
#[test]
fn test_read_only_rejects_insert_and_update() {
    let message = rejection("INSERT INTO users (name) VALUES ('x')", false);
    assert!(message.contains("Write operations (INSERT, UPDATE) are not allowed in read-only mode"));

    let message = rejection("UPDATE users SET name = 'y' WHERE id = 1", false);
    assert!(message.contains("not allowed in read-only mode"));
}

/// Test that denied keywords are reported by name.
#[test]
fn test_read_only_rejects_denied_keywords() {
    assert!(rejection("DROP TABLE users", false).contains("Operation not allowed: DROP"));
    assert!(rejection("DELETE FROM users", false).contains("Operation not allowed: DELETE"));
    assert!(rejection("TRUNCATE TABLE users", false).contains("Operation not allowed: TRUNCATE"));
    assert!(rejection("ALTER TABLE users ADD x INT", false).contains("Operation not allowed: ALTER"));
    assert!(rejection("CREATE TABLE t (id INT)", false).contains("Operation not allowed: CREATE"));
    assert!(rejection("GRANT SELECT ON t TO u", false).contains("Operation not allowed: GRANT"));
    assert!(rejection("EXEC sp_who", false).contains("Operation not allowed: EXEC"));
    assert!(rejection("EXECUTE sp_who", false).contains("Operation not allowed: EXECUTE"));
}

/// Test that the first keyword in the deny list decides the message.
#[test]
fn test_deny_list_order_decides_reported_keyword() {
    // DELETE appears first in the text, but DROP is checked first
    let message = rejection("DELETE FROM t WHERE EXISTS (x) DROP TABLE t", false);
    assert!(message.contains("Operation not allowed: DROP"));
}

/// Test that keyword matching respects word boundaries.
#[test]
fn test_keywords_inside_identifiers_allowed() {
    // "created_at" contains CREATE, "dropped" contains DROP
    assert!(validate_query("SELECT created_at FROM audit", false).is_ok());
    // Non-select statements with keyword-like substrings still pass the scan
    assert!(validate_query("PRINT 'dropped_items'", false).is_ok());
}

/// Test that xp_cmdshell is blocked even inside a SELECT.
#[test]
fn test_xp_cmdshell_blocked_in_select() {
    let message = rejection(
        "SELECT * FROM OPENQUERY(srv, 'xp_cmdshell ''dir''')",
        false,
    );
    assert!(message.contains("Dangerous stored procedure execution is not allowed"));

    // Case-insensitive
    let message = rejection("SELECT 1 WHERE 'XP_CMDSHELL' = 'x'", false);
    assert!(message.contains("Dangerous stored procedure execution"));
}

/// Test that write mode only applies the structural checks.
#[test]
fn test_write_mode_admits_dml_and_ddl() {
    assert!(validate_query("INSERT INTO t (a) VALUES (1)", true).is_ok());
    assert!(validate_query("UPDATE t SET a = 2", true).is_ok());
    assert!(validate_query("DELETE FROM t WHERE a = 1", true).is_ok());
    assert!(validate_query("DROP TABLE t", true).is_ok());
    assert!(validate_query("SELECT xp_cmdshell_audit FROM t", true).is_ok());
}

/// Test SELECT/WITH detection used to branch execution paths.
#[test]
fn test_select_statement_detection() {
    assert!(is_select_statement("SELECT 1"));
    assert!(is_select_statement("  select * from t"));
    assert!(is_select_statement("WITH c AS (SELECT 1 AS v) SELECT * FROM c"));
    assert!(is_select_statement("\n\twith c as (select 1 as v) select * from c"));
    assert!(!is_select_statement("INSERT INTO t VALUES (1)"));
    assert!(!is_select_statement("EXEC dbo.proc"));
    assert!(!is_select_statement(""));
}

/// Test accepted identifier shapes.
#[test]
fn test_valid_identifiers() {
    assert!(is_valid_identifier("GetOrders"));
    assert!(is_valid_identifier("dbo.GetOrders"));
    assert!(is_valid_identifier("[dbo].[GetOrders]"));
    assert!(is_valid_identifier("dbo.[Get_Orders_2024]"));
    assert!(is_valid_identifier("schema_1.proc_name"));
}

/// Test rejected identifier shapes.
#[test]
fn test_invalid_identifiers() {
    assert!(!is_valid_identifier(""));
    assert!(!is_valid_identifier("a.b.c"));
    assert!(!is_valid_identifier("dbo."));
    assert!(!is_valid_identifier(".proc"));
    assert!(!is_valid_identifier("dbo.Get Orders"));
    assert!(!is_valid_identifier("dbo.Get-Orders"));
    assert!(!is_valid_identifier("proc; DROP TABLE t"));
    assert!(!is_valid_identifier("[]"));
    assert!(!is_valid_identifier("[x]y"));
    assert!(!is_valid_identifier(&"a".repeat(257)));
}

/// Test that the identifier length limit sits at the boundary.
#[test]
fn test_identifier_length_boundary() {
    assert!(is_valid_identifier(&"a".repeat(256)));
    assert!(!is_valid_identifier(&"a".repeat(257)));
}

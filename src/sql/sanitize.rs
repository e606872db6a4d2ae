//! SQL identifier sanitization
//!
//! Quoting, table-name validation and the expression shape checks used when
//! assembling projections and predicates.

use std::sync::OnceLock;

use regex::Regex;

/// PostgreSQL reserved keywords that cannot be used as unquoted identifiers
pub const POSTGRES_RESERVED_WORDS: &[&str] = &[
    "ALL",
    "ANALYSE",
    "ANALYZE",
    "AND",
    "ANY",
    "ARRAY",
    "AS",
    "ASC",
    "ASYMMETRIC",
    "BOTH",
    "CASE",
    "CAST",
    "CHECK",
    "COLLATE",
    "COLUMN",
    "CONSTRAINT",
    "CREATE",
    "CURRENT_CATALOG",
    "CURRENT_DATE",
    "CURRENT_ROLE",
    "CURRENT_TIME",
    "CURRENT_TIMESTAMP",
    "CURRENT_USER",
    "DEFAULT",
    "DEFERRABLE",
    "DESC",
    "DISTINCT",
    "DO",
    "ELSE",
    "END",
    "EXCEPT",
    "FALSE",
    "FETCH",
    "FOR",
    "FOREIGN",
    "FROM",
    "GRANT",
    "GROUP",
    "HAVING",
    "IN",
    "INITIALLY",
    "INTERSECT",
    "INTO",
    "LATERAL",
    "LEADING",
    "LIMIT",
    "LOCALTIME",
    "LOCALTIMESTAMP",
    "NOT",
    "NULL",
    "OFFSET",
    "ON",
    "ONLY",
    "OR",
    "ORDER",
    "PLACING",
    "PRIMARY",
    "REFERENCES",
    "RETURNING",
    "SELECT",
    "SESSION_USER",
    "SOME",
    "SYMMETRIC",
    "TABLE",
    "THEN",
    "TO",
    "TRAILING",
    "TRUE",
    "UNION",
    "UNIQUE",
    "USER",
    "USING",
    "VARIADIC",
    "WHEN",
    "WHERE",
    "WINDOW",
    "WITH",
];

fn identifier_regex() -> &'static Regex {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"))
}

/// Quote a SQL identifier, doubling embedded quotes
///
/// # Example
/// ```
/// use grid_builder::sql::quote_identifier;
///
/// assert_eq!(quote_identifier("my_table"), "\"my_table\"");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    let escaped = identifier.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Whether the text is a single unqualified identifier
pub fn is_bare_identifier(text: &str) -> bool {
    identifier_regex().is_match(text)
}

/// Whether an expression contains no qualifier, whitespace or call
///
/// Such expressions get the base table prepended when projected.
pub fn is_plain_column(expression: &str) -> bool {
    !expression.contains(['.', ' ', '\t', '(', ')'])
}

/// Whether an expression is computed (contains a call or parenthesis)
pub fn is_computed(expression: &str) -> bool {
    expression.contains(['(', ')'])
}

/// Table prefix of a qualified column reference, `None` for computed or bare
pub fn table_of(expression: &str) -> Option<&str> {
    if is_computed(expression) {
        return None;
    }
    expression
        .split_once('.')
        .map(|(table, _)| table.trim())
        .filter(|table| !table.is_empty())
}

/// Validate a table name
///
/// Accepts `name` or `schema.name`, each part an identifier that is not a
/// reserved keyword.
///
/// # Example
/// ```
/// use grid_builder::sql::validate_identifier;
///
/// assert!(validate_identifier("products").is_ok());
/// assert!(validate_identifier("public.products").is_ok());
/// assert!(validate_identifier("select").is_err());
/// ```
pub fn validate_identifier(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Identifier cannot be empty".to_string());
    }

    for part in name.split('.') {
        if !is_bare_identifier(part) {
            return Err(format!(
                "Identifier '{}' is invalid. Each part must start with a letter or underscore and contain only letters, numbers, and underscores.",
                name
            ));
        }
        if POSTGRES_RESERVED_WORDS.contains(&part.to_uppercase().as_str()) {
            return Err(format!(
                "Identifier '{}' is a PostgreSQL reserved keyword and cannot be used.",
                part
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // quote_identifier Tests
    // =========================================================================

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("price"), "\"price\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_identifier(""), "\"\"");
    }

    // =========================================================================
    // Expression Shape Tests
    // =========================================================================

    #[test]
    fn test_is_bare_identifier() {
        assert!(is_bare_identifier("price"));
        assert!(is_bare_identifier("_tmp1"));
        assert!(!is_bare_identifier("t.price"));
        assert!(!is_bare_identifier("1abc"));
        assert!(!is_bare_identifier("SUM(x)"));
    }

    #[test]
    fn test_is_plain_column() {
        assert!(is_plain_column("price"));
        assert!(!is_plain_column("t.price"));
        assert!(!is_plain_column("a b"));
        assert!(!is_plain_column("COUNT(*)"));
    }

    #[test]
    fn test_table_of() {
        assert_eq!(table_of("categories.name"), Some("categories"));
        assert_eq!(table_of("name"), None);
        assert_eq!(table_of("SUM(t.price)"), None);
    }

    // =========================================================================
    // validate_identifier Tests
    // =========================================================================

    #[test]
    fn test_validate_identifier_valid() {
        assert!(validate_identifier("products").is_ok());
        assert!(validate_identifier("Products_2").is_ok());
        assert!(validate_identifier("public.products").is_ok());
    }

    #[test]
    fn test_validate_identifier_invalid() {
        assert!(validate_identifier("").unwrap_err().contains("cannot be empty"));
        assert!(validate_identifier("1table").is_err());
        assert!(validate_identifier("my-table").is_err());
        assert!(validate_identifier("products; DROP").is_err());
        assert!(validate_identifier("public.").is_err());
    }

    #[test]
    fn test_validate_identifier_reserved() {
        let err = validate_identifier("select").unwrap_err();
        assert!(err.contains("reserved keyword"));
        assert!(validate_identifier("public.table").is_err());
    }
}

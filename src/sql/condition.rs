//! Condition building for SQL WHERE/HAVING and ORDER BY clauses
//!
//! Emits predicate lists as text with positional `?` placeholders. Array
//! arguments stay whole; the store expands them when binding.

use crate::plan::Predicate;
use crate::sql::sanitize::{is_bare_identifier, quote_identifier};
use crate::types::SortDirection;

/// Render a predicate target
///
/// Bare identifiers are quoted; qualified names and expressions pass through.
pub fn column_sql(column: &str) -> String {
    let column = column.trim();
    if is_bare_identifier(column) {
        quote_identifier(column)
    } else {
        column.to_string()
    }
}

/// Build a condition clause from predicates
///
/// Returns (clause, params) where `clause` joins every fragment with `AND`
/// (empty when there is nothing to emit) and `params` holds one value per
/// placeholder, in order.
pub fn build_predicate_clause(predicates: &[Predicate]) -> (String, Vec<serde_json::Value>) {
    let mut fragments = Vec::new();
    let mut params = Vec::new();

    for predicate in predicates {
        match predicate {
            Predicate::Raw(sql) => {
                if !sql.trim().is_empty() {
                    fragments.push(sql.trim().to_string());
                }
            }
            Predicate::Equals { column, value } => {
                fragments.push(format!("{} = ?", column_sql(column)));
                params.push(value.clone());
            }
            Predicate::Compare { column, op, value } => {
                fragments.push(format!("{} {} ?", column_sql(column), op.as_str()));
                params.push(value.clone());
            }
            Predicate::Like { column, pattern } => {
                fragments.push(format!("{} LIKE ?", column_sql(column)));
                params.push(serde_json::Value::String(pattern.clone()));
            }
            Predicate::Contains {
                column,
                pattern,
                cast,
            } => {
                let target = if *cast {
                    format!("CAST({} AS TEXT)", column_sql(column))
                } else {
                    column_sql(column)
                };
                fragments.push(format!("{} ILIKE ?", target));
                params.push(serde_json::Value::String(pattern.clone()));
            }
            Predicate::In { column, values } if values.is_empty() => {
                fragments.push(format!("{} IS NULL", column_sql(column)));
            }
            Predicate::In { column, values } => {
                fragments.push(format!("{} IN (?)", column_sql(column)));
                params.push(serde_json::Value::Array(values.clone()));
            }
            // NOT IN over nothing excludes nothing
            Predicate::NotIn { values, .. } if values.is_empty() => {}
            Predicate::NotIn { column, values } => {
                fragments.push(format!("{} NOT IN (?)", column_sql(column)));
                params.push(serde_json::Value::Array(values.clone()));
            }
            Predicate::IsNull { column } => {
                fragments.push(format!("{} IS NULL", column_sql(column)));
            }
        }
    }

    (fragments.join(" AND "), params)
}

/// Build an ORDER BY list (without the keyword)
pub fn build_order_by_clause(sort: &[(String, SortDirection)]) -> String {
    sort.iter()
        .map(|(column, direction)| format!("{} {}", column_sql(column), direction.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::CompareOp;
    use serde_json::json;

    // =========================================================================
    // column_sql Tests
    // =========================================================================

    #[test]
    fn test_column_sql_quotes_bare_names() {
        assert_eq!(column_sql("price"), "\"price\"");
        assert_eq!(column_sql("products.price"), "products.price");
        assert_eq!(column_sql("SUM(price)"), "SUM(price)");
    }

    // =========================================================================
    // Predicate Emission Tests
    // =========================================================================

    #[test]
    fn test_equality_and_compare() {
        let (clause, params) = build_predicate_clause(&[
            Predicate::equals("products.id", 1),
            Predicate::Compare {
                column: "products.price".into(),
                op: CompareOp::Gte,
                value: json!(100),
            },
        ]);
        assert_eq!(clause, "products.id = ? AND products.price >= ?");
        assert_eq!(params, vec![json!(1), json!(100)]);
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let (clause, params) = build_predicate_clause(&[Predicate::contains("users.name", "john")]);
        assert_eq!(clause, "users.name ILIKE ?");
        assert_eq!(params, vec![json!("%john%")]);
    }

    #[test]
    fn test_contains_casts_non_text_targets() {
        let (clause, params) = build_predicate_clause(&[
            Predicate::contains_as_text("products.price", "abc"),
            Predicate::Like {
                column: "products.name".into(),
                pattern: "a%".into(),
            },
        ]);
        assert_eq!(
            clause,
            "CAST(products.price AS TEXT) ILIKE ? AND products.name LIKE ?"
        );
        assert_eq!(params, vec![json!("%abc%"), json!("a%")]);
    }

    #[test]
    fn test_arrays() {
        let (clause, params) = build_predicate_clause(&[
            Predicate::In {
                column: "t.state".into(),
                values: vec![json!("a"), json!("b")],
            },
            Predicate::In {
                column: "t.other".into(),
                values: vec![],
            },
            Predicate::NotIn {
                column: "t.kind".into(),
                values: vec![json!(1)],
            },
        ]);
        assert_eq!(clause, "t.state IN (?) AND t.other IS NULL AND t.kind NOT IN (?)");
        assert_eq!(params, vec![json!(["a", "b"]), json!([1])]);
    }

    #[test]
    fn test_empty_not_in_is_skipped() {
        let (clause, params) = build_predicate_clause(&[Predicate::NotIn {
            column: "t.kind".into(),
            values: vec![],
        }]);
        assert!(clause.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_raw_fragment_verbatim() {
        let (clause, params) = build_predicate_clause(&[
            Predicate::Raw(" t.deleted IS NULL ".into()),
            Predicate::equals("t.id", 5),
        ]);
        assert_eq!(clause, "t.deleted IS NULL AND t.id = ?");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_empty_predicates() {
        let (clause, params) = build_predicate_clause(&[]);
        assert!(clause.is_empty());
        assert!(params.is_empty());
    }

    // =========================================================================
    // ORDER BY Tests
    // =========================================================================

    #[test]
    fn test_order_by() {
        let sort = vec![
            ("name".to_string(), SortDirection::Desc),
            ("products.id".to_string(), SortDirection::Asc),
        ];
        assert_eq!(build_order_by_clause(&sort), "\"name\" DESC, products.id ASC");
        assert_eq!(build_order_by_clause(&[]), "");
    }
}

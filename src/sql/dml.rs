//! Row-level statement generation
//!
//! Produces INSERT/UPDATE/DELETE/SELECT texts for a single table with `?`
//! placeholders. Table names are validated at attach and emitted as given.

use crate::plan::Predicate;
use crate::sql::condition::build_predicate_clause;
use crate::sql::sanitize::quote_identifier;
use crate::types::{PrimaryKeySet, Row};

type Statement = (String, Vec<serde_json::Value>);

fn key_predicates(keys: &PrimaryKeySet) -> Vec<Predicate> {
    keys.iter()
        .map(|(column, value)| Predicate::equals(column.as_str(), value.clone()))
        .collect()
}

fn with_where(mut sql: String, predicates: &[Predicate]) -> Statement {
    let (clause, params) = build_predicate_clause(predicates);
    if !clause.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clause);
    }
    (sql, params)
}

/// `INSERT ... RETURNING *`
pub fn insert_returning(table: &str, row: &Row) -> Statement {
    if row.is_empty() {
        return (format!("INSERT INTO {} DEFAULT VALUES RETURNING *", table), Vec::new());
    }
    let columns: Vec<String> = row.keys().map(|column| quote_identifier(column)).collect();
    let placeholders = vec!["?"; row.len()].join(", ");
    (
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            table,
            columns.join(", "),
            placeholders
        ),
        row.values().cloned().collect(),
    )
}

/// Plain INSERT, for log records
pub fn insert(table: &str, row: &Row) -> Statement {
    let (sql, params) = insert_returning(table, row);
    (sql.trim_end_matches(" RETURNING *").to_string(), params)
}

/// `UPDATE ... SET ... WHERE <every key>`, `None` when there is nothing to set
pub fn update(table: &str, row: &Row, keys: &PrimaryKeySet) -> Option<Statement> {
    if row.is_empty() {
        return None;
    }
    let assignments: Vec<String> = row
        .keys()
        .map(|column| format!("{} = ?", quote_identifier(column)))
        .collect();
    let (sql, key_params) = with_where(
        format!("UPDATE {} SET {}", table, assignments.join(", ")),
        &key_predicates(keys),
    );
    let mut params: Vec<serde_json::Value> = row.values().cloned().collect();
    params.extend(key_params);
    Some((sql, params))
}

/// `DELETE ... WHERE <every key>`
pub fn delete(table: &str, keys: &PrimaryKeySet) -> Statement {
    with_where(format!("DELETE FROM {}", table), &key_predicates(keys))
}

/// `SELECT * ... WHERE ... LIMIT 1`
pub fn select_one(table: &str, predicates: &[Predicate]) -> Statement {
    let (mut sql, params) = with_where(format!("SELECT * FROM {}", table), predicates);
    sql.push_str(" LIMIT 1");
    (sql, params)
}

/// `SELECT 1 ... WHERE ... LIMIT 1`
pub fn exists(table: &str, predicates: &[Predicate]) -> Statement {
    let (mut sql, params) = with_where(format!("SELECT 1 FROM {}", table), predicates);
    sql.push_str(" LIMIT 1");
    (sql, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn keys() -> PrimaryKeySet {
        [("id".to_string(), json!(4)), ("lang".to_string(), json!("cs"))]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_insert_returning() {
        let (sql, params) = insert_returning("products", &row(json!({"name": "a", "price": 2})));
        assert_eq!(
            sql,
            "INSERT INTO products (\"name\", \"price\") VALUES (?, ?) RETURNING *"
        );
        assert_eq!(params, vec![json!("a"), json!(2)]);
    }

    #[test]
    fn test_insert_without_returning() {
        let (sql, _) = insert("log", &row(json!({"handle": "x"})));
        assert_eq!(sql, "INSERT INTO log (\"handle\") VALUES (?)");
    }

    #[test]
    fn test_update_scopes_every_key() {
        let (sql, params) = update("products", &row(json!({"name": "b"})), &keys()).unwrap();
        assert_eq!(
            sql,
            "UPDATE products SET \"name\" = ? WHERE \"id\" = ? AND \"lang\" = ?"
        );
        assert_eq!(params, vec![json!("b"), json!(4), json!("cs")]);
        assert!(update("products", &Row::new(), &keys()).is_none());
    }

    #[test]
    fn test_delete_scopes_every_key() {
        let (sql, params) = delete("products", &keys());
        assert_eq!(sql, "DELETE FROM products WHERE \"id\" = ? AND \"lang\" = ?");
        assert_eq!(params, vec![json!(4), json!("cs")]);
    }

    #[test]
    fn test_select_one_and_exists() {
        let predicates = vec![Predicate::equals("type", "import")];
        assert_eq!(
            select_one("feeds", &predicates).0,
            "SELECT * FROM feeds WHERE \"type\" = ? LIMIT 1"
        );
        assert_eq!(exists("feeds", &[]).0, "SELECT 1 FROM feeds LIMIT 1");
    }
}

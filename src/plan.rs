//! Query plan model
//!
//! `QueryPlan` is the mutable accumulator threaded through the prepare stages;
//! `finalize` turns it into an immutable `PreparedQuery`.

use serde::{Deserialize, Serialize};

use crate::sql::condition::{build_order_by_clause, build_predicate_clause};
use crate::types::SortDirection;

// ============================================================================
// Predicates
// ============================================================================

/// Comparison operator of an inequality predicate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CompareOp {
    Gte,
    Lte,
    Gt,
    Lt,
    Ne,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Gte => ">=",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ne => "!=",
        }
    }

    /// Split an operator suffix off a filter key, e.g. `price >=`
    pub fn split_suffix(key: &str) -> Option<(&str, CompareOp)> {
        let key = key.trim_end();
        [
            (" >=", CompareOp::Gte),
            (" <=", CompareOp::Lte),
            (" !=", CompareOp::Ne),
            (" <>", CompareOp::Ne),
            (" >", CompareOp::Gt),
            (" <", CompareOp::Lt),
        ]
        .into_iter()
        .find_map(|(suffix, op)| key.strip_suffix(suffix).map(|column| (column.trim(), op)))
    }
}

/// One normalized WHERE/HAVING condition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "args", rename_all = "snake_case")]
pub enum Predicate {
    /// Fragment appended verbatim
    Raw(String),
    Equals {
        column: String,
        value: serde_json::Value,
    },
    Compare {
        column: String,
        op: CompareOp,
        value: serde_json::Value,
    },
    Like {
        column: String,
        pattern: String,
    },
    /// Case-insensitive `%value%` match; `cast` reads the target as text first
    Contains {
        column: String,
        pattern: String,
        cast: bool,
    },
    In {
        column: String,
        values: Vec<serde_json::Value>,
    },
    NotIn {
        column: String,
        values: Vec<serde_json::Value>,
    },
    IsNull {
        column: String,
    },
}

impl Predicate {
    pub fn equals(column: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Predicate::Equals {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Case-insensitive substring match on a text column
    pub fn contains(column: impl Into<String>, value: &str) -> Self {
        Predicate::Contains {
            column: column.into(),
            pattern: format!("%{}%", value),
            cast: false,
        }
    }

    /// Case-insensitive substring match on the text form of any column
    pub fn contains_as_text(column: impl Into<String>, value: &str) -> Self {
        Predicate::Contains {
            column: column.into(),
            pattern: format!("%{}%", value),
            cast: true,
        }
    }

    /// Target column or expression, `None` for raw fragments
    pub fn column(&self) -> Option<&str> {
        match self {
            Predicate::Raw(_) => None,
            Predicate::Equals { column, .. }
            | Predicate::Compare { column, .. }
            | Predicate::Like { column, .. }
            | Predicate::Contains { column, .. }
            | Predicate::In { column, .. }
            | Predicate::NotIn { column, .. }
            | Predicate::IsNull { column } => Some(column),
        }
    }

    /// Resolve a keyed condition where the key may carry an operator
    ///
    /// Recognised suffixes: `>=`, `<=`, `!=`, `<>`, `>`, `<`, `=`, `LIKE`,
    /// `NOT IN`, `IN`, `IS NULL`. Without a suffix, arrays become `IN`
    /// (`IS NULL` when empty) and scalars become equality.
    pub fn from_key(key: &str, value: serde_json::Value) -> Self {
        let key = key.trim();
        let upper = key.to_ascii_uppercase();
        let column = |suffix: &str| key[..key.len() - suffix.len()].trim().to_string();

        if upper.ends_with(" IS NULL") {
            return Predicate::IsNull {
                column: column(" IS NULL"),
            };
        }
        if upper.ends_with(" NOT IN") || upper.ends_with(" NOT") {
            let suffix = if upper.ends_with(" NOT IN") { " NOT IN" } else { " NOT" };
            return Predicate::NotIn {
                column: column(suffix),
                values: into_values(value),
            };
        }
        if upper.ends_with(" IN") {
            return Predicate::In {
                column: column(" IN"),
                values: into_values(value),
            };
        }
        if upper.ends_with(" LIKE") {
            return Predicate::Like {
                column: column(" LIKE"),
                pattern: crate::format::scalar_text(&value),
            };
        }
        if let Some((name, op)) = CompareOp::split_suffix(key) {
            return Predicate::Compare {
                column: name.to_string(),
                op,
                value,
            };
        }
        if let Some(name) = key.strip_suffix(" =") {
            return Predicate::equals(name.trim(), value);
        }
        match value {
            serde_json::Value::Array(values) if values.is_empty() => Predicate::IsNull {
                column: key.to_string(),
            },
            serde_json::Value::Array(values) => Predicate::In {
                column: key.to_string(),
                values,
            },
            value => Predicate::equals(key, value),
        }
    }
}

fn into_values(value: serde_json::Value) -> Vec<serde_json::Value> {
    match value {
        serde_json::Value::Array(values) => values,
        serde_json::Value::Null => Vec::new(),
        scalar => vec![scalar],
    }
}

// ============================================================================
// Base Query
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Join,
    Left,
    Inner,
}

impl JoinKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Join => "JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Inner => "INNER JOIN",
        }
    }
}

/// Free-form join fragment, e.g. `categories ON categories.id = products.category_id`
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub fragment: String,
}

/// Projection and FROM clause assembled at attach
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BaseQuery {
    /// `expr AS "alias", ...`
    pub projection: String,
    /// Bare `expr, ...` list of the projected expressions
    pub columns: String,
    /// ` FROM table JOIN ...`
    pub from: String,
}

impl BaseQuery {
    /// Row-fetch SELECT without conditions
    pub fn select(&self) -> String {
        format!("SELECT {}{}", self.projection, self.from)
    }

    /// `COUNT(*) AS sum` SELECT without conditions
    pub fn count(&self) -> String {
        format!("SELECT COUNT(*) AS sum{}", self.from)
    }
}

// ============================================================================
// Plan / Prepared Query
// ============================================================================

/// Accumulator threaded through the prepare stages
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub base: BaseQuery,
    pub predicates: Vec<Predicate>,
    /// Configured HAVING fragment
    pub having_raw: Option<String>,
    /// Compiled HAVING conditions on computed columns
    pub having: Vec<Predicate>,
    pub group: Option<String>,
    pub sort: Vec<(String, SortDirection)>,
    pub limit: i64,
    pub offset: i64,
}

impl QueryPlan {
    pub fn new(base: BaseQuery) -> Self {
        Self {
            base,
            predicates: Vec::new(),
            having_raw: None,
            having: Vec::new(),
            group: None,
            sort: Vec::new(),
            limit: 0,
            offset: 0,
        }
    }

    /// Emit every query text with its argument list
    pub fn finalize(self) -> PreparedQuery {
        let (where_clause, mut arguments) = build_predicate_clause(&self.predicates);
        let (having_clause, having_arguments) = build_predicate_clause(&self.having);
        arguments.extend(having_arguments);

        let mut conditions = String::new();
        if !where_clause.is_empty() {
            conditions.push_str(" WHERE ");
            conditions.push_str(&where_clause);
        }
        if let Some(group) = &self.group {
            conditions.push_str(" GROUP BY ");
            conditions.push_str(group);
        }
        let having = [self.having_raw.clone().unwrap_or_default(), having_clause]
            .into_iter()
            .filter(|fragment| !fragment.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" AND ");
        if !having.is_empty() {
            conditions.push_str(" HAVING ");
            conditions.push_str(&having);
        }

        let sort = build_order_by_clause(&self.sort);
        let mut query = format!("{}{}", self.base.select(), conditions);
        if !sort.is_empty() {
            query.push_str(" ORDER BY ");
            query.push_str(&sort);
        }

        PreparedQuery {
            sum: format!("{}{}", self.base.count(), conditions),
            query,
            from: self.base.from,
            conditions,
            arguments,
            limit: self.limit,
            offset: self.offset,
            sort,
            grouped: self.group.is_some(),
            filtered: !self.predicates.is_empty() || !having.is_empty(),
            predicates: self.predicates,
        }
    }
}

/// Immutable output of `prepare`
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuery {
    /// Row-fetch SELECT with WHERE, GROUP BY, HAVING and ORDER BY
    pub query: String,
    /// `COUNT(*) AS sum` SELECT with WHERE, GROUP BY and HAVING
    pub sum: String,
    /// Shared FROM clause
    pub from: String,
    /// Shared WHERE/GROUP BY/HAVING tail
    pub conditions: String,
    /// Positional arguments, one per `?` in `conditions`
    pub arguments: Vec<serde_json::Value>,
    pub limit: i64,
    pub offset: i64,
    /// ORDER BY list without the keyword
    pub sort: String,
    pub grouped: bool,
    /// Whether any WHERE or HAVING condition is active
    pub filtered: bool,
    /// Final WHERE predicates
    pub predicates: Vec<Predicate>,
}

impl PreparedQuery {
    /// Page query: row-fetch text with trailing `LIMIT ? OFFSET ?`
    pub fn page(&self) -> (String, Vec<serde_json::Value>) {
        self.window(self.limit, self.offset)
    }

    /// Row-fetch text limited to `limit` rows from `offset`
    pub fn window(&self, limit: i64, offset: i64) -> (String, Vec<serde_json::Value>) {
        let mut arguments = self.arguments.clone();
        arguments.push(limit.into());
        arguments.push(offset.into());
        (format!("{} LIMIT ? OFFSET ?", self.query), arguments)
    }

    /// Aggregate SELECT projecting `expression AS sum`
    pub fn aggregate(&self, expression: &str) -> String {
        format!("SELECT {} AS sum{}{}", expression, self.from, self.conditions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> BaseQuery {
        BaseQuery {
            projection: "products.name AS \"name\"".to_string(),
            from: " FROM products".to_string(),
            ..Default::default()
        }
    }

    // =========================================================================
    // Predicate::from_key Tests
    // =========================================================================

    #[test]
    fn test_from_key_operators() {
        assert_eq!(
            Predicate::from_key("price >=", json!(5)),
            Predicate::Compare {
                column: "price".into(),
                op: CompareOp::Gte,
                value: json!(5)
            }
        );
        assert_eq!(
            Predicate::from_key("id !=", json!(1)),
            Predicate::Compare {
                column: "id".into(),
                op: CompareOp::Ne,
                value: json!(1)
            }
        );
        assert_eq!(
            Predicate::from_key("name LIKE", json!("%a%")),
            Predicate::Like {
                column: "name".into(),
                pattern: "%a%".into()
            }
        );
        assert_eq!(
            Predicate::from_key("state NOT IN", json!(["x"])),
            Predicate::NotIn {
                column: "state".into(),
                values: vec![json!("x")]
            }
        );
        assert_eq!(
            Predicate::from_key("deleted IS NULL", json!(null)),
            Predicate::IsNull {
                column: "deleted".into()
            }
        );
    }

    #[test]
    fn test_from_key_by_value_shape() {
        assert_eq!(
            Predicate::from_key("state", json!(["a", "b"])),
            Predicate::In {
                column: "state".into(),
                values: vec![json!("a"), json!("b")]
            }
        );
        assert_eq!(
            Predicate::from_key("state", json!([])),
            Predicate::IsNull {
                column: "state".into()
            }
        );
        assert_eq!(
            Predicate::from_key("state", json!("a")),
            Predicate::equals("state", "a")
        );
    }

    #[test]
    fn test_split_suffix_prefers_longest() {
        assert_eq!(CompareOp::split_suffix("a >="), Some(("a", CompareOp::Gte)));
        assert_eq!(CompareOp::split_suffix("a <"), Some(("a", CompareOp::Lt)));
        assert_eq!(CompareOp::split_suffix("a"), None);
    }

    // =========================================================================
    // Finalize Tests
    // =========================================================================

    #[test]
    fn test_finalize_without_conditions() {
        let prepared = QueryPlan::new(base()).finalize();
        assert_eq!(prepared.query, "SELECT products.name AS \"name\" FROM products");
        assert_eq!(prepared.sum, "SELECT COUNT(*) AS sum FROM products");
        assert!(prepared.arguments.is_empty());
        assert!(!prepared.filtered);
    }

    #[test]
    fn test_finalize_orders_only_row_query() {
        let mut plan = QueryPlan::new(base());
        plan.predicates.push(Predicate::equals("products.id", 3));
        plan.group = Some("products.category".into());
        plan.having.push(Predicate::equals("SUM(products.price)", 10));
        plan.sort.push(("name".into(), SortDirection::Desc));
        let prepared = plan.finalize();

        assert_eq!(
            prepared.query,
            "SELECT products.name AS \"name\" FROM products WHERE products.id = ? \
             GROUP BY products.category HAVING SUM(products.price) = ? ORDER BY \"name\" DESC"
        );
        assert_eq!(
            prepared.sum,
            "SELECT COUNT(*) AS sum FROM products WHERE products.id = ? \
             GROUP BY products.category HAVING SUM(products.price) = ?"
        );
        assert_eq!(prepared.arguments, vec![json!(3), json!(10)]);
        assert!(prepared.grouped);
        assert!(prepared.filtered);
    }

    #[test]
    fn test_having_raw_joins_compiled() {
        let mut plan = QueryPlan::new(base());
        plan.having_raw = Some("COUNT(*) > 1".into());
        plan.having.push(Predicate::contains("MAX(x)", "a"));
        let prepared = plan.finalize();
        assert!(prepared.sum.ends_with(" HAVING COUNT(*) > 1 AND MAX(x) ILIKE ?"));
        assert_eq!(prepared.arguments, vec![json!("%a%")]);
    }

    #[test]
    fn test_page_appends_limit_offset() {
        let mut plan = QueryPlan::new(base());
        plan.predicates.push(Predicate::equals("products.id", 1));
        plan.limit = 20;
        plan.offset = 40;
        let (sql, arguments) = plan.finalize().page();
        assert!(sql.ends_with(" LIMIT ? OFFSET ?"));
        assert_eq!(arguments, vec![json!(1), json!(20), json!(40)]);
    }

    #[test]
    fn test_aggregate_reuses_tail() {
        let mut plan = QueryPlan::new(base());
        plan.predicates.push(Predicate::equals("products.id", 1));
        let prepared = plan.finalize();
        assert_eq!(
            prepared.aggregate("SUM(products.price)"),
            "SELECT SUM(products.price) AS sum FROM products WHERE products.id = ?"
        );
    }
}

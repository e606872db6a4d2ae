//! Row coercion and validation
//!
//! Submitted rows arrive as loosely typed JSON, possibly wrapped by form
//! widgets. Coercion maps them to the typed payload written to the store;
//! validation reports user-facing problems without failing the request.

use std::collections::BTreeMap;

use crate::builder::Builder;
use crate::error::Result;
use crate::format::{is_blank, is_email, is_numeric, parse_date, scalar_text, strip_escape, ucfirst};
use crate::plan::{CompareOp, Predicate};
use crate::request::GridRequest;
use crate::sql::dml;
use crate::types::{PrimaryKeySet, Row};

/// Column → message
pub type ValidationErrors = BTreeMap<String, String>;

/// Annotations whose columns are dropped when submitted empty
const TYPED_ANNOTATIONS: &[&str] = &["date", "datetime", "decimal", "float", "int", "tinyint"];
const FLOAT_ANNOTATIONS: &[&str] = &["decimal", "float", "double"];
const INT_ANNOTATIONS: &[&str] = &["int", "tinyint"];
const NUMBER_ANNOTATIONS: &[&str] = &["int", "decimal", "double", "float"];

/// Result of coercing one submitted row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoercedRow {
    /// Typed values to write, without primary keys
    pub payload: Row,
    /// Primary keys present in the submission
    pub primary: PrimaryKeySet,
    /// Typed columns dropped because they were submitted empty
    pub emptied: Vec<String>,
}

impl Builder {
    /// Map a submitted row onto typed column values
    pub fn coerce(&self, raw: &Row) -> CoercedRow {
        let mut coerced = CoercedRow::default();

        for (column, value) in raw {
            if column.starts_with('_') {
                continue;
            }
            match self.columns.get(column) {
                Some(expression) if !expression.trim().is_empty() => {}
                _ => continue,
            }

            let value = self.unwrap_widget(column, value);

            if self.annotations.has(column, "pri") {
                // null and blank keys are not yet assigned
                if !strip_escape(scalar_text(&value).trim()).is_empty() {
                    coerced.primary.insert(column.as_str(), value);
                }
                continue;
            }
            if self.annotations.has(column, "unedit") {
                continue;
            }

            let text = scalar_text(&value);
            if self.annotations.has_any(column, TYPED_ANNOTATIONS)
                && !value.is_boolean()
                && strip_escape(text.trim()).is_empty()
            {
                coerced.emptied.push(column.clone());
                continue;
            }

            let typed = if value.is_f64() || self.annotations.has_any(column, FLOAT_ANNOTATIONS) {
                strip_escape(text.trim())
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(serde_json::Value::Number)
                    .unwrap_or(value)
            } else if self.annotations.has_any(column, INT_ANNOTATIONS) {
                match &value {
                    serde_json::Value::Bool(b) => serde_json::Value::from(i64::from(*b)),
                    _ => strip_escape(text.trim())
                        .parse::<i64>()
                        .map(serde_json::Value::from)
                        .unwrap_or(value),
                }
            } else if let serde_json::Value::String(s) = &value {
                match parse_date(s) {
                    Some(date) if !self.is_textual(column) => serde_json::Value::String(
                        date.format(&self.config.format.date.query).to_string(),
                    ),
                    _ => serde_json::Value::String(strip_escape(s).to_string()),
                }
            } else {
                value
            };
            coerced.payload.insert(column.clone(), typed);
        }
        coerced
    }

    /// Scalar inside a `Label` or `Attributes.value` widget wrapper
    fn unwrap_widget(&self, column: &str, value: &serde_json::Value) -> serde_json::Value {
        let serde_json::Value::Object(widget) = value else {
            return value.clone();
        };
        if let Some(label) = widget.get("Label") {
            return label.clone();
        }
        let Some(inner) = widget
            .get("Attributes")
            .and_then(|attributes| attributes.get("value"))
        else {
            return value.clone();
        };
        let text = scalar_text(inner);
        if self.annotations.has_any(column, INT_ANNOTATIONS) {
            text.trim()
                .parse::<i64>()
                .map(serde_json::Value::from)
                .unwrap_or(serde_json::Value::from(0))
        } else if self.annotations.has_any(column, &["decimal", "float"]) {
            text.trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::from(0))
        } else {
            inner.clone()
        }
    }

    /// Check a submitted row against the column constraints
    ///
    /// Store failures while probing uniqueness propagate; user-input problems
    /// are returned as messages.
    pub async fn validate(&self, request: &GridRequest) -> Result<ValidationErrors> {
        let coerced = self.coerce(&request.row);
        let mut errors = ValidationErrors::new();

        for (column, value) in &coerced.payload {
            if self.annotations.has(column, "unedit") {
                continue;
            }
            if self.annotations.has(column, "required") && is_blank(value) {
                errors.insert(column.clone(), self.required_message(column));
            } else if self.annotations.has(column, "uni") {
                if self.is_taken(column, value, &coerced.primary).await? {
                    errors.insert(
                        column.clone(),
                        format!(
                            "{} {} {}",
                            ucfirst(&self.translate("unique item")),
                            self.translate(column),
                            self.translate("already defined in source table.")
                        ),
                    );
                }
            } else if self.annotations.has(column, "email") && !is_email(&scalar_text(value)) {
                errors.insert(
                    column.clone(),
                    format!(
                        "{} {}",
                        self.translate(column),
                        self.translate("is not valid email.")
                    ),
                );
            } else if self.annotations.has_any(column, NUMBER_ANNOTATIONS)
                && !value.is_number()
                && !is_numeric(&scalar_text(value))
            {
                errors.insert(
                    column.clone(),
                    format!(
                        "{} {}",
                        self.translate(column),
                        self.translate("is not valid number.")
                    ),
                );
            }
        }

        for column in &coerced.emptied {
            if self.annotations.has(column, "required") {
                errors.insert(column.clone(), self.required_message(column));
            }
        }

        if !errors.is_empty() {
            tracing::debug!(errors = errors.len(), "Row failed validation");
        }
        Ok(errors)
    }

    fn required_message(&self, column: &str) -> String {
        format!(
            "{} {}",
            ucfirst(&self.translate(column)),
            self.translate("is required.")
        )
    }

    /// Whether another row already holds `value` in a unique column
    async fn is_taken(
        &self,
        column: &str,
        value: &serde_json::Value,
        primary: &PrimaryKeySet,
    ) -> Result<bool> {
        let mut predicates: Vec<Predicate> = primary
            .iter()
            .map(|(key, id)| Predicate::Compare {
                column: key.clone(),
                op: CompareOp::Ne,
                value: id.clone(),
            })
            .collect();
        predicates.push(Predicate::equals(column, value.clone()));
        let (sql, arguments) = dml::exists(&self.table, &predicates);
        Ok(self.store.query_one(&sql, &arguments).await?.is_some())
    }

    /// Translate a message or column label
    ///
    /// Column names are looked up as `view:action:name`, then `view:name`,
    /// then bare.
    pub fn translate(&self, name: &str) -> String {
        let scoped = [
            format!("{}:{}", self.view.source(), name),
            format!("{}:{}", self.view.presenter, name),
        ];
        for key in scoped {
            let label = self.translator.translate(&key);
            if label != key {
                return label;
            }
        }
        self.translator.translate(name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::config::GridConfig;
    use crate::store::RowStore;
    use crate::strategy::Translator;
    use crate::types::DriverColumn;

    struct NoStore;

    #[async_trait]
    impl RowStore for NoStore {
        async fn columns(&self, _table: &str) -> Result<Vec<DriverColumn>> {
            Ok(Vec::new())
        }

        async fn query(&self, _sql: &str, _arguments: &[serde_json::Value]) -> Result<Vec<Row>> {
            Ok(Vec::new())
        }

        async fn execute(&self, _sql: &str, _arguments: &[serde_json::Value]) -> Result<u64> {
            Ok(0)
        }

        async fn row_count(&self, _table: &str) -> Result<i64> {
            Ok(0)
        }
    }

    fn builder(columns: &[(&str, &str)]) -> Builder {
        let mut builder = Builder::new(GridConfig::default(), Arc::new(NoStore)).table("people");
        for (alias, descriptor) in columns {
            let parsed = crate::annotation::parse(alias, descriptor, None).unwrap();
            builder.annotations.merge(alias, parsed.annotations);
            builder.columns.set(*alias, parsed.expression);
        }
        builder
    }

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    // =========================================================================
    // Coercion Tests
    // =========================================================================

    #[test]
    fn test_coerce_empty_typed_dropped() {
        let grid = builder(&[("age", "people.age@int"), ("price", "people.price@decimal")]);
        let coerced = grid.coerce(&row(json!({"age": "_", "price": "10.5"})));

        assert!(!coerced.payload.contains_key("age"));
        assert_eq!(coerced.payload["price"], json!(10.5));
        assert_eq!(coerced.emptied, vec!["age".to_string()]);
    }

    #[test]
    fn test_coerce_drops_unknown_escaped_and_unedit() {
        let grid = builder(&[("name", "people.name"), ("created", "people.created@unedit")]);
        let coerced = grid.coerce(&row(json!({
            "name": "_Ann",
            "created": "2020-01-01",
            "_token": "x",
            "missing": 1
        })));

        assert_eq!(coerced.payload, row(json!({"name": "Ann"})));
    }

    #[test]
    fn test_coerce_extracts_primary() {
        let grid = builder(&[("id", "people.id@pri"), ("name", "people.name")]);
        let coerced = grid.coerce(&row(json!({"id": 7, "name": "a"})));
        assert_eq!(coerced.primary.get("id"), Some(&json!(7)));
        assert!(!coerced.payload.contains_key("id"));

        let unassigned = grid.coerce(&row(json!({"id": null})));
        assert!(unassigned.primary.is_empty());

        let blank = grid.coerce(&row(json!({"id": "", "name": "a"})));
        assert!(blank.primary.is_empty());
        assert!(!blank.payload.contains_key("id"));

        let zero = grid.coerce(&row(json!({"id": 0})));
        assert_eq!(zero.primary.get("id"), Some(&json!(0)));
    }

    #[test]
    fn test_coerce_unwraps_widgets() {
        let grid = builder(&[
            ("state", "people.state"),
            ("age", "people.age@int"),
            ("city", "people.city"),
        ]);
        let coerced = grid.coerce(&row(json!({
            "state": {"Label": "active"},
            "age": {"Attributes": {"value": "42"}},
            "city": {"Attributes": {"value": "Brno"}}
        })));

        assert_eq!(coerced.payload["state"], json!("active"));
        assert_eq!(coerced.payload["age"], json!(42));
        assert_eq!(coerced.payload["city"], json!("Brno"));
    }

    #[test]
    fn test_coerce_dates_and_booleans() {
        let grid = builder(&[
            ("born", "people.born@date"),
            ("active", "people.active@tinyint"),
            ("code", "people.code@varchar"),
        ]);
        let coerced = grid.coerce(&row(json!({
            "born": "24.12.1990",
            "active": true,
            "code": "2020-01-01"
        })));

        assert_eq!(coerced.payload["born"], json!("1990-12-24 00:00:00"));
        assert_eq!(coerced.payload["active"], json!(1));
        assert_eq!(coerced.payload["code"], json!("2020-01-01"));
    }

    // =========================================================================
    // Validation Tests
    // =========================================================================

    #[tokio::test]
    async fn test_validate_required_and_email() {
        let grid = builder(&[
            ("name", "people.name@required"),
            ("mail", "people.mail@email"),
            ("note", "people.note"),
        ]);
        let request = GridRequest::new().row(row(json!({
            "name": "",
            "mail": "not-an-email",
            "note": "ok"
        })));
        let errors = grid.validate(&request).await.unwrap();

        assert_eq!(errors["name"], "Name is required.");
        assert_eq!(errors["mail"], "mail is not valid email.");
        assert!(!errors.contains_key("note"));
    }

    #[tokio::test]
    async fn test_validate_number_and_emptied_required() {
        let grid = builder(&[("qty", "people.qty@float"), ("age", "people.age@int@required")]);
        let request = GridRequest::new().row(row(json!({"qty": "abc", "age": ""})));
        let errors = grid.validate(&request).await.unwrap();

        assert_eq!(errors["qty"], "qty is not valid number.");
        assert_eq!(errors["age"], "Age is required.");
    }

    #[tokio::test]
    async fn test_validate_unique_without_conflict() {
        let grid = builder(&[("code", "people.code@uni")]);
        let request = GridRequest::new().row(row(json!({"code": "A1"})));
        assert!(grid.validate(&request).await.unwrap().is_empty());
    }

    // =========================================================================
    // Translation Tests
    // =========================================================================

    struct Catalog;

    impl Translator for Catalog {
        fn translate(&self, message: &str) -> String {
            match message {
                "Users:edit:name" => "Full name".to_string(),
                "is required." => "je povinné.".to_string(),
                other => other.to_string(),
            }
        }
    }

    #[test]
    fn test_translate_prefers_view_scope() {
        let grid = builder(&[])
            .translator(Arc::new(Catalog))
            .view(crate::request::ViewContext::new("grid", "Users", "edit"));
        assert_eq!(grid.translate("name"), "Full name");
        assert_eq!(grid.translate("is required."), "je povinné.");
        assert_eq!(grid.translate("other"), "other");
    }
}

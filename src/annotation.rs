//! Column annotation parsing
//!
//! A column descriptor is an `@`-delimited string. The first segment is the
//! column's SQL expression, each following token is one annotation:
//!
//! ```text
//! products.price@decimal@required@style{"width":"10%"}@enum('a','b')
//! ```
//!
//! Token grammar, checked in this order:
//! - `enum` alone is ignored (driver-typed enums carry their options)
//! - the owning view name, or `view:action`, marks the column `hidden`
//! - `name(a,b,c)` is an option list
//! - `name{...}` is a JSON object
//! - anything else is a flag

use std::collections::{BTreeMap, HashMap};

use crate::error::{GridError, Result};
use crate::request::ViewContext;
use crate::types::Row;

/// Value of a single annotation
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    /// Bare `@name`
    Flag,
    /// `@name(a,b,c)`, each option maps to itself
    Options(Vec<String>),
    /// `@name{...}`
    Structured(Row),
}

impl AnnotationValue {
    pub fn options(&self) -> Option<&[String]> {
        match self {
            AnnotationValue::Options(options) => Some(options),
            _ => None,
        }
    }
}

/// Annotations carried by one column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnAnnotations(BTreeMap<String, AnnotationValue>);

impl ColumnAnnotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Whether any of the given annotations is present
    pub fn has_any(&self, names: &[&str]) -> bool {
        names.iter().any(|name| self.has(name))
    }

    pub fn get(&self, name: &str) -> Option<&AnnotationValue> {
        self.0.get(name)
    }

    pub fn options(&self, name: &str) -> Option<&[String]> {
        self.get(name).and_then(AnnotationValue::options)
    }

    pub fn structured(&self, name: &str) -> Option<&Row> {
        match self.get(name) {
            Some(AnnotationValue::Structured(map)) => Some(map),
            _ => None,
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: AnnotationValue) {
        self.0.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<AnnotationValue> {
        self.0.remove(name)
    }

    pub fn is_hidden(&self) -> bool {
        self.has("hidden")
    }

    /// Overlay `other` on top of these annotations
    pub fn merge(&mut self, other: ColumnAnnotations) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnnotationValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of parsing one descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDescriptor {
    /// Trimmed text before the first `@`
    pub expression: String,
    pub annotations: ColumnAnnotations,
}

/// Parse a column descriptor
///
/// `column` only labels errors. Hidden-by-view tokens are recognised only
/// when a view context is given.
pub fn parse(
    column: &str,
    descriptor: &str,
    view: Option<&ViewContext>,
) -> Result<ParsedDescriptor> {
    let mut segments = descriptor.split('@');
    let expression = segments.next().unwrap_or_default().trim().to_string();
    let mut annotations = ColumnAnnotations::new();

    for token in segments {
        let token = token.trim();
        if token.is_empty() || token == "enum" {
            continue;
        }
        if view.is_some_and(|view| hides(view, token)) {
            annotations.insert("hidden", AnnotationValue::Flag);
        } else if let Some(open) = token.find('(') {
            let name = token[..open].trim();
            let options = token[open + 1..]
                .split(',')
                .map(|option| option.replace(['\'', '"', ')'], "").trim().to_string())
                .filter(|option| !option.is_empty())
                .collect();
            annotations.insert(name, AnnotationValue::Options(options));
        } else if let (Some(open), true) = (token.find('{'), token.ends_with('}')) {
            let name = token[..open].trim();
            let object: Row = serde_json::from_str(&token[open..]).map_err(|e| {
                GridError::annotation(column, format!("invalid JSON in '{}': {}", name, e))
            })?;
            annotations.insert(name, AnnotationValue::Structured(object));
        } else {
            annotations.insert(token, AnnotationValue::Flag);
        }
    }

    Ok(ParsedDescriptor {
        expression,
        annotations,
    })
}

fn hides(view: &ViewContext, token: &str) -> bool {
    !view.presenter.is_empty() && (token == view.presenter || token == view.source())
}

/// Annotation sets of every column of a grid
#[derive(Debug, Clone, Default)]
pub struct Annotations(HashMap<String, ColumnAnnotations>);

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(&self, alias: &str) -> Option<&ColumnAnnotations> {
        self.0.get(alias)
    }

    pub fn has(&self, alias: &str, name: &str) -> bool {
        self.column(alias).is_some_and(|set| set.has(name))
    }

    pub fn has_any(&self, alias: &str, names: &[&str]) -> bool {
        self.column(alias).is_some_and(|set| set.has_any(names))
    }

    pub fn options(&self, alias: &str, name: &str) -> Option<&[String]> {
        self.column(alias).and_then(|set| set.options(name))
    }

    /// Merge freshly parsed annotations into a column's set
    pub fn merge(&mut self, alias: &str, annotations: ColumnAnnotations) {
        self.0.entry(alias.to_string()).or_default().merge(annotations);
    }

    pub fn set(&mut self, alias: &str, name: &str, value: AnnotationValue) {
        self.0.entry(alias.to_string()).or_default().insert(name, value);
    }

    pub fn remove(&mut self, alias: &str, name: &str) -> Option<AnnotationValue> {
        self.0.get_mut(alias).and_then(|set| set.remove(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> ViewContext {
        ViewContext::new("grid", "Products", "default")
    }

    // =========================================================================
    // Grammar Tests
    // =========================================================================

    #[test]
    fn test_parse_expression_and_flags() {
        let parsed = parse("price", " products.price @decimal@required", None).unwrap();
        assert_eq!(parsed.expression, "products.price");
        assert!(parsed.annotations.has("decimal"));
        assert!(parsed.annotations.has("required"));
        assert_eq!(
            parsed.annotations.get("required"),
            Some(&AnnotationValue::Flag)
        );
    }

    #[test]
    fn test_parse_option_list_strips_quotes() {
        let parsed = parse("state", "state@enum('new','done')", None).unwrap();
        assert_eq!(
            parsed.annotations.options("enum"),
            Some(&["new".to_string(), "done".to_string()][..])
        );
    }

    #[test]
    fn test_parse_vendor_precision() {
        let parsed = parse("price", "@decimal(10,2)", None).unwrap();
        assert_eq!(
            parsed.annotations.options("decimal"),
            Some(&["10".to_string(), "2".to_string()][..])
        );
    }

    #[test]
    fn test_parse_structured() {
        let parsed = parse("name", r#"name@style{"width":"10%"}"#, None).unwrap();
        let style = parsed.annotations.structured("style").unwrap();
        assert_eq!(style["width"], "10%");
    }

    #[test]
    fn test_parse_invalid_json_is_error() {
        let err = parse("name", "name@style{width}", None).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_bare_enum_and_empty_tokens_ignored() {
        let parsed = parse("state", "state@enum@@ @required", None).unwrap();
        assert!(!parsed.annotations.has("enum"));
        assert!(!parsed.annotations.has(""));
        assert!(parsed.annotations.has("required"));
    }

    #[test]
    fn test_parse_is_idempotent() {
        let descriptor = r#"t.c@int@uni@filter(a.x,b.y)@style{"k":1}@Products"#;
        let first = parse("c", descriptor, Some(&view())).unwrap();
        let second = parse("c", descriptor, Some(&view())).unwrap();
        assert_eq!(first, second);
    }

    // =========================================================================
    // View Scope Tests
    // =========================================================================

    #[test]
    fn test_view_name_hides_column() {
        let parsed = parse("secret", "t.secret@Products", Some(&view())).unwrap();
        assert!(parsed.annotations.is_hidden());
    }

    #[test]
    fn test_view_action_hides_column() {
        let parsed = parse("secret", "t.secret@Products:default", Some(&view())).unwrap();
        assert!(parsed.annotations.is_hidden());
        let other = parse("secret", "t.secret@Orders:default", Some(&view())).unwrap();
        assert!(!other.annotations.is_hidden());
        assert!(other.annotations.has("Orders:default"));
    }

    #[test]
    fn test_view_token_without_context_is_flag() {
        let parsed = parse("secret", "t.secret@Products", None).unwrap();
        assert!(!parsed.annotations.is_hidden());
        assert!(parsed.annotations.has("Products"));
    }

    // =========================================================================
    // Store Tests
    // =========================================================================

    #[test]
    fn test_annotations_merge_overlays() {
        let mut store = Annotations::new();
        store.set("state", "enum", AnnotationValue::Options(vec!["a".into()]));
        let parsed = parse("state", "state@required", None).unwrap();
        store.merge("state", parsed.annotations);

        assert!(store.has("state", "required"));
        assert_eq!(store.options("state", "enum"), Some(&["a".to_string()][..]));
        assert!(store.has_any("state", &["int", "required"]));
        assert!(!store.has_any("missing", &["required"]));
    }
}

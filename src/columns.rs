//! Column specification and driver metadata
//!
//! `ColumnSpec` keeps the grid's alias → expression pairs in declaration
//! order. Driver metadata is read through the metadata cache.

use crate::cache::{MetadataCache, cache_key};
use crate::error::Result;
use crate::store::RowStore;
use crate::types::DriverColumn;

/// Ordered alias → raw SQL expression pairs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnSpec(Vec<(String, String)>);

impl ColumnSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, alias: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == alias)
            .map(|(_, expression)| expression.as_str())
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.get(alias).is_some()
    }

    /// Replace an expression in place, or append a new column
    pub fn set(&mut self, alias: impl Into<String>, expression: impl Into<String>) {
        let alias = alias.into();
        let expression = expression.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == alias) {
            Some(entry) => entry.1 = expression,
            None => self.0.push((alias, expression)),
        }
    }

    pub fn remove(&mut self, alias: &str) -> Option<String> {
        let position = self.0.iter().position(|(existing, _)| existing == alias)?;
        Some(self.0.remove(position).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(a, e)| (a.as_str(), e.as_str()))
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(alias, _)| alias.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<A: Into<String>, E: Into<String>> FromIterator<(A, E)> for ColumnSpec {
    fn from_iter<T: IntoIterator<Item = (A, E)>>(iter: T) -> Self {
        let mut spec = ColumnSpec::new();
        for (alias, expression) in iter {
            spec.set(alias, expression);
        }
        spec
    }
}

/// Driver metadata for a table, read through the cache
///
/// Columns come back in the store's ordinal order.
pub async fn load_drivers(
    store: &dyn RowStore,
    cache: &dyn MetadataCache,
    table: &str,
) -> Result<Vec<DriverColumn>> {
    let key = cache_key("attached", table);
    if let Some(cached) = cache.load(&key) {
        match serde_json::from_value::<Vec<DriverColumn>>(cached) {
            Ok(drivers) => return Ok(drivers),
            Err(e) => tracing::warn!(table, error = %e, "Discarding unreadable driver cache entry"),
        }
    }

    let drivers = store.columns(table).await?;
    cache.save(&key, serde_json::to_value(&drivers)?);
    tracing::debug!(table, columns = drivers.len(), "Loaded driver metadata");
    Ok(drivers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_keeps_position() {
        let mut spec: ColumnSpec = [("a", "t.a"), ("b", "t.b")].into_iter().collect();
        spec.set("a", "t.x");
        spec.set("c", "t.c");

        let pairs: Vec<_> = spec.iter().collect();
        assert_eq!(pairs, vec![("a", "t.x"), ("b", "t.b"), ("c", "t.c")]);
    }

    #[test]
    fn test_remove() {
        let mut spec: ColumnSpec = [("a", "t.a"), ("b", "")].into_iter().collect();
        assert_eq!(spec.remove("a"), Some("t.a".to_string()));
        assert_eq!(spec.remove("a"), None);
        assert_eq!(spec.get("b"), Some(""));
        assert_eq!(spec.len(), 1);
    }

    #[test]
    fn test_aliases_in_order() {
        let spec: ColumnSpec = [("z", ""), ("y", ""), ("x", "")].into_iter().collect();
        assert_eq!(spec.aliases().collect::<Vec<_>>(), vec!["z", "y", "x"]);
    }
}

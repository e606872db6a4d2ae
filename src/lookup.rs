//! Lookup lists for enumerated and foreign-key columns

use crate::builder::Builder;
use crate::cache::cache_key;
use crate::columns::load_drivers;
use crate::error::Result;
use crate::format::scalar_text;
use crate::plan::Predicate;
use crate::sql::sanitize::{is_computed, quote_identifier};
use crate::types::{LookupList, Row};

impl Builder {
    /// Selectable values of a column
    ///
    /// Tried in order: values of an `IN` filter on the column, the column's
    /// `enum` options, the filter strategy's list, the cached list, and the
    /// distinct values read from the column's table.
    pub async fn list(&self, alias: &str) -> Result<LookupList> {
        let Some(expression) = self.columns.get(alias) else {
            tracing::warn!(alias, "Lookup requested for unknown column");
            return Ok(LookupList::new());
        };
        let (table, column) = match expression.split_once('.') {
            Some((table, column)) if !is_computed(expression) => {
                (table.trim().to_string(), column.trim().to_string())
            }
            _ => (self.table.clone(), alias.to_string()),
        };

        let qualified = format!("{}.{}", table, column);
        let echoed = self.predicates().iter().find_map(|predicate| match predicate {
            Predicate::In { column: target, values } if *target == qualified || *target == column => {
                Some(values)
            }
            _ => None,
        });
        if let Some(values) = echoed {
            return Ok(LookupList::identity(values.iter().map(scalar_text)));
        }

        if let Some(options) = self.annotations.options(alias, "enum") {
            if !options.is_empty() {
                return Ok(LookupList::identity(options.iter().cloned()));
            }
        }

        if let Some(filter) = &self.strategies.filter {
            let list = filter.list(alias).await?;
            if !list.is_empty() {
                return Ok(list);
            }
        }

        let key = cache_key("list", expression);
        if let Some(cached) = self.cache.load(&key) {
            match serde_json::from_value::<LookupList>(cached) {
                Ok(list) => return Ok(list),
                Err(e) => tracing::warn!(alias, error = %e, "Discarding unreadable list cache entry"),
            }
        }

        let drivers = load_drivers(self.store.as_ref(), self.cache.as_ref(), &table).await?;
        let Some(driver) = drivers.iter().find(|driver| driver.name == column) else {
            return Ok(LookupList::new());
        };

        let target = format!("{}.{}", table, quote_identifier(&column));
        let display = match driver.native_type.as_str() {
            "DATE" | "TIMESTAMP" => format!(
                "TO_CHAR({}, '{}')",
                target,
                self.config.format.date.select.replace('\'', "''")
            ),
            _ => format!("CAST({} AS TEXT)", target),
        };
        let keys: Vec<&str> = drivers
            .iter()
            .filter(|driver| driver.is_primary())
            .map(|driver| driver.name.as_str())
            .collect();
        let list_key = match keys.as_slice() {
            [primary] if !self.is_joined(expression) => {
                format!("CAST({}.{} AS TEXT)", table, quote_identifier(primary))
            }
            _ => display.clone(),
        };

        let sql = format!(
            "SELECT DISTINCT {} AS list_key, {} AS list_value FROM {} WHERE {} IS NOT NULL AND CAST({} AS TEXT) != ? ORDER BY list_value",
            list_key, display, table, target, target
        );
        let rows = self.store.query(&sql, &[serde_json::Value::from("")]).await?;
        let mut list = LookupList::new();
        for row in &rows {
            let value = row.get("list_key").map(scalar_text).unwrap_or_default();
            let label = row.get("list_value").map(scalar_text).unwrap_or_default();
            list.insert(value, label);
        }

        self.cache.save(&key, serde_json::to_value(&list)?);
        tracing::debug!(alias, values = list.len(), "Built lookup list");
        Ok(list)
    }

    /// Keep only spice selections present in each column's lookup list
    ///
    /// Accepts a JSON object, or a string holding one, of column → selected
    /// identifiers.
    pub async fn spice(&self, raw: &serde_json::Value) -> Result<Row> {
        let mut spices = match raw {
            serde_json::Value::Object(spices) => spices.clone(),
            serde_json::Value::String(encoded) if !encoded.trim().is_empty() => {
                match serde_json::from_str::<Row>(encoded) {
                    Ok(spices) => spices,
                    Err(e) => {
                        tracing::warn!(error = %e, "Ignoring unreadable spice parameter");
                        return Ok(Row::new());
                    }
                }
            }
            _ => return Ok(Row::new()),
        };

        for (alias, selection) in spices.iter_mut() {
            let serde_json::Value::Array(selected) = selection else {
                continue;
            };
            let allowed = self.list(alias).await?;
            selected.retain(|id| allowed.contains(&scalar_text(id).replace('_', "")));
        }
        Ok(spices)
    }
}

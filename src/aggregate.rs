//! Page fetching, counting and logging

use chrono::Local;

use crate::builder::Builder;
use crate::error::{GridError, Result};
use crate::plan::Predicate;
use crate::sql::dml;
use crate::types::Row;

impl Builder {
    /// Rows of the current page
    pub async fn fetch(&self) -> Result<Vec<Row>> {
        if let Some(fetch) = &self.strategies.fetch {
            return fetch.fetch(self).await;
        }
        let prepared = self.prepared()?;
        let (sql, arguments) = prepared.page();
        let rows = self.store.query(&sql, &arguments).await?;
        let rows = match &self.strategies.build {
            Some(build) => rows.into_iter().map(|row| build.build(row)).collect(),
            None => rows,
        };
        self.log_query().await?;
        Ok(rows)
    }

    /// Single row at `offset` of the filtered, sorted result
    pub async fn fetch_offset(&self, offset: i64) -> Result<Row> {
        let (sql, arguments) = self.prepared()?.window(1, offset);
        Ok(self.store.query_one(&sql, &arguments).await?.unwrap_or_default())
    }

    /// Number of rows matching the active filters
    ///
    /// Unfiltered grids read the table's row count. An ungrouped aggregate
    /// with no result row counts as `1`; grouped results count their rows.
    pub async fn sum(&self) -> Result<i64> {
        if let Some(fetch) = &self.strategies.fetch {
            return fetch.sum(self).await;
        }
        let prepared = self.prepared()?;
        if !prepared.filtered {
            return self.store.row_count(&self.table).await;
        }

        let rows = self.store.query(&prepared.sum, &prepared.arguments).await?;
        if prepared.grouped {
            return Ok(rows.len() as i64);
        }
        Ok(match rows.first() {
            None => 1,
            Some(row) => row.get("sum").map(as_i64).unwrap_or(0),
        })
    }

    /// Total of one column over the filtered rows, `0` when there are none
    pub async fn summary(&self, alias: &str) -> Result<f64> {
        let expression = self
            .columns
            .get(alias)
            .filter(|expression| !expression.trim().is_empty())
            .ok_or_else(|| GridError::unknown_column(alias))?;
        let expression = self.qualify(expression);
        let expression = if expression.to_ascii_uppercase().contains("SUM(") {
            expression
        } else {
            format!("SUM({})", expression)
        };

        let prepared = self.prepared()?;
        let sql = prepared.aggregate(&expression);
        let row = self.store.query_one(&sql, &prepared.arguments).await?;
        Ok(row
            .and_then(|row| row.get("sum").map(as_f64))
            .unwrap_or(0.0))
    }

    /// Record the page query in the audit table once per distinct text
    async fn log_query(&self) -> Result<()> {
        let prepared = self.prepared()?;
        let normalized: String = format!("{}{}", prepared.query, prepared.offset)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        let key = format!("{:x}", md5::compute(normalized.as_bytes()));

        let (sql, arguments) = dml::exists(&self.config.spice, &[Predicate::equals("key", key.as_str())]);
        if self.store.query_one(&sql, &arguments).await?.is_some() {
            return Ok(());
        }

        let mut record = Row::new();
        record.insert("key".to_string(), key.into());
        record.insert("source".to_string(), self.view.source().into());
        record.insert("query".to_string(), prepared.query.clone().into());
        record.insert(
            "arguments".to_string(),
            serde_json::to_string(&prepared.arguments)?.into(),
        );
        let (sql, arguments) = dml::insert(&self.config.spice, &record);
        self.store.execute(&sql, &arguments).await?;
        tracing::debug!(source = %self.view.source(), "Logged grid query");
        Ok(())
    }

    /// Record an action in the configured log table
    pub async fn log(&self, handle: &str) -> Result<()> {
        let Some(table) = &self.config.log else {
            return Ok(());
        };
        let mut record = Row::new();
        record.insert(
            "users_id".to_string(),
            self.view.user_id.clone().unwrap_or(serde_json::Value::Null),
        );
        record.insert("source".to_string(), self.view.source().into());
        record.insert("handle".to_string(), handle.into());
        record.insert(
            "date".to_string(),
            Local::now().format("%Y-%m-%d %H:%M:%S").to_string().into(),
        );
        let (sql, arguments) = dml::insert(table, &record);
        self.store.execute(&sql, &arguments).await?;
        Ok(())
    }

    /// Stable identifier of a batch process for this view and user
    pub fn process_id(&self, status: &str) -> String {
        let seed = format!(
            "{}:{}:{}:{}:{}",
            self.view.control,
            self.view.presenter,
            self.view.action,
            status,
            self.view.user_key()
        );
        format!("{:x}", md5::compute(seed.as_bytes()))
    }
}

fn as_i64(value: &serde_json::Value) -> i64 {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn as_f64(value: &serde_json::Value) -> f64 {
    match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

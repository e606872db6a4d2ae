//! CRUD dispatch
//!
//! Each operation delegates to its bound strategy and falls back to a plain
//! statement against the base table otherwise.

use crate::builder::Builder;
use crate::error::{GridError, Result};
use crate::plan::Predicate;
use crate::request::GridRequest;
use crate::sql::build_predicate_clause;
use crate::sql::dml;
use crate::types::{PrimaryKeySet, Row};

impl Builder {
    /// Insert the submitted row and return the stored row
    #[tracing::instrument(level = "info", skip(self, request), fields(table = %self.table))]
    pub async fn add(&mut self, request: &GridRequest) -> Result<Row> {
        let coerced = self.coerce(&request.row);
        self.primary = coerced.primary;

        if let Some(add) = &self.strategies.add {
            tracing::info!("Delegating insert to add strategy");
            return add.insert(coerced.payload).await;
        }
        let (sql, arguments) = dml::insert_returning(&self.table, &coerced.payload);
        let inserted = self.store.query_one(&sql, &arguments).await?;
        tracing::info!(inserted = inserted.is_some(), "Inserted row");
        Ok(inserted.unwrap_or_default())
    }

    /// Delete the row identified by the submitted primary keys
    #[tracing::instrument(level = "info", skip(self, request), fields(table = %self.table))]
    pub async fn delete(&mut self, request: &GridRequest) -> Result<Row> {
        let coerced = self.coerce(&request.row);
        self.primary = coerced.primary;
        if self.primary.is_empty() {
            return Err(GridError::primary_keys_not_set());
        }

        if let Some(remove) = &self.strategies.remove {
            tracing::info!("Delegating delete to remove strategy");
            remove.remove(&self.primary, &request.row).await?;
        } else {
            let (sql, arguments) = dml::delete(&self.table, &self.primary);
            let affected = self.store.execute(&sql, &arguments).await?;
            tracing::info!(affected, "Deleted row");
        }

        let mut status = Row::new();
        status.insert("remove".to_string(), serde_json::Value::Bool(true));
        Ok(status)
    }

    /// Save the submitted row
    ///
    /// `full_form` selects the edit strategy over the inline update strategy.
    /// Without a strategy the row is updated directly and returned only if it
    /// still matches the active filters.
    #[tracing::instrument(level = "info", skip(self, request), fields(table = %self.table))]
    pub async fn submit(&mut self, request: &GridRequest, full_form: bool) -> Result<Row> {
        let coerced = self.coerce(&request.row);
        self.primary = coerced.primary;
        if self.primary.is_empty() {
            return Err(GridError::primary_keys_not_set());
        }

        if full_form {
            if let Some(edit) = &self.strategies.edit {
                tracing::info!("Delegating save to edit strategy");
                return edit.submit(&self.primary, &request.row).await;
            }
        } else if let Some(update) = &self.strategies.update {
            tracing::info!("Delegating save to update strategy");
            return update.update(&request.id, &request.row).await;
        }

        let affected = match dml::update(&self.table, &coerced.payload, &self.primary) {
            Some((sql, arguments)) => self.store.execute(&sql, &arguments).await?,
            None => 0,
        };
        tracing::info!(affected, "Updated row");

        if self.still_matches().await? {
            Ok(request.row.clone())
        } else {
            Ok(Row::new())
        }
    }

    /// Update a row by primary key, for process strategies
    pub async fn set_row(&self, primary: &PrimaryKeySet, data: &Row) -> Result<u64> {
        if primary.is_empty() {
            return Err(GridError::primary_keys_not_set());
        }
        match dml::update(&self.table, data, primary) {
            Some((sql, arguments)) => self.store.execute(&sql, &arguments).await,
            None => Ok(0),
        }
    }

    /// Whether the current primary key still passes the active filters
    async fn still_matches(&self) -> Result<bool> {
        let Some(base) = &self.base else {
            return Ok(true);
        };
        let mut predicates: Vec<Predicate> = self
            .primary
            .iter()
            .map(|(key, value)| Predicate::equals(format!("{}.{}", self.table, key), value.clone()))
            .collect();
        predicates.extend(self.predicates().iter().cloned());

        let (clause, arguments) = build_predicate_clause(&predicates);
        let sql = format!("{} WHERE {}", base.count(), clause);
        let count = self
            .store
            .query_one(&sql, &arguments)
            .await?
            .and_then(|row| row.get("sum").and_then(serde_json::Value::as_i64))
            .unwrap_or(0);
        Ok(count > 0)
    }
}

//! Shared fixtures for the grid-builder tests
//!
//! `RecordingStore` answers driver metadata from a fixed column list, records
//! every statement it receives, and replies to queries from a script matched
//! by SQL prefix.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use grid_builder::cache::MemoryCache;
use grid_builder::{Builder, DriverColumn, GridConfig, GridError, KeyRole, Result, Row, RowStore};

/// One statement seen by the store
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub sql: String,
    pub arguments: Vec<serde_json::Value>,
}

#[derive(Default)]
pub struct RecordingStore {
    tables: Mutex<Vec<(String, Vec<DriverColumn>)>>,
    replies: Mutex<Vec<(String, Vec<Row>)>>,
    queries: Mutex<Vec<Recorded>>,
    statements: Mutex<Vec<Recorded>>,
    row_count: Mutex<i64>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_table(self: Arc<Self>, table: &str, columns: Vec<DriverColumn>) -> Arc<Self> {
        self.tables.lock().unwrap().push((table.to_string(), columns));
        self
    }

    /// Reply to queries starting with `prefix`; later scripts win
    pub fn reply(&self, prefix: &str, rows: Vec<serde_json::Value>) {
        let rows = rows
            .into_iter()
            .map(|row| row.as_object().cloned().unwrap())
            .collect();
        self.replies.lock().unwrap().push((prefix.to_string(), rows));
    }

    pub fn set_row_count(&self, count: i64) {
        *self.row_count.lock().unwrap() = count;
    }

    pub fn queries(&self) -> Vec<Recorded> {
        self.queries.lock().unwrap().clone()
    }

    pub fn statements(&self) -> Vec<Recorded> {
        self.statements.lock().unwrap().clone()
    }

    /// Last query whose text starts with `prefix`
    pub fn last_query(&self, prefix: &str) -> Option<Recorded> {
        self.queries()
            .into_iter()
            .rev()
            .find(|recorded| recorded.sql.starts_with(prefix))
    }
}

#[async_trait]
impl RowStore for RecordingStore {
    async fn columns(&self, table: &str) -> Result<Vec<DriverColumn>> {
        self.tables
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, columns)| columns.clone())
            .ok_or_else(|| GridError::configuration(format!("Table '{}' does not exist", table)))
    }

    async fn query(&self, sql: &str, arguments: &[serde_json::Value]) -> Result<Vec<Row>> {
        self.queries.lock().unwrap().push(Recorded {
            sql: sql.to_string(),
            arguments: arguments.to_vec(),
        });
        Ok(self
            .replies
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(prefix, _)| sql.starts_with(prefix.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn execute(&self, sql: &str, arguments: &[serde_json::Value]) -> Result<u64> {
        self.statements.lock().unwrap().push(Recorded {
            sql: sql.to_string(),
            arguments: arguments.to_vec(),
        });
        Ok(1)
    }

    async fn row_count(&self, _table: &str) -> Result<i64> {
        Ok(*self.row_count.lock().unwrap())
    }
}

/// Driver columns of the `products` fixture table
pub fn product_columns() -> Vec<DriverColumn> {
    vec![
        DriverColumn::new("id", "INT", "int").primary(),
        DriverColumn::new("name", "VARCHAR", "varchar(255)").not_null(),
        DriverColumn::new("price", "DECIMAL", "decimal(10,2)"),
        DriverColumn::new("state", "ENUM", "enum('new','sold')"),
        DriverColumn::new("sku", "VARCHAR", "varchar(32)").key(KeyRole::Unique),
        DriverColumn::new("created", "DATE", "date"),
        DriverColumn::new("age", "INT", "int"),
    ]
}

/// Products grid over a fresh store and a private cache
pub fn products_grid() -> (Builder, Arc<RecordingStore>) {
    let store = RecordingStore::new().with_table("products", product_columns());
    let grid = Builder::new(GridConfig::default(), store.clone())
        .cache(Arc::new(MemoryCache::new()))
        .table("products");
    (grid, store)
}

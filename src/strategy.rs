//! Pluggable strategy hooks
//!
//! Each concern the engine can delegate has its own trait. A grid holds an
//! optional `Arc` per concern and falls back to plain row-store operations
//! when none is bound. Strategy errors propagate unchanged.

use std::sync::Arc;

use async_trait::async_trait;

use crate::builder::Builder;
use crate::error::Result;
use crate::plan::Predicate;
use crate::types::{LookupList, PrimaryKeySet, Row};

/// Replaces the default INSERT
#[async_trait]
pub trait AddStrategy: Send + Sync {
    async fn insert(&self, row: Row) -> Result<Row>;
}

/// Inline single-field save
#[async_trait]
pub trait UpdateStrategy: Send + Sync {
    async fn update(&self, id: &serde_json::Value, row: &Row) -> Result<Row>;
}

/// Replaces the default DELETE
#[async_trait]
pub trait RemoveStrategy: Send + Sync {
    async fn remove(&self, primary: &PrimaryKeySet, row: &Row) -> Result<()>;
}

/// Full-form save
#[async_trait]
pub trait EditStrategy: Send + Sync {
    async fn submit(&self, primary: &PrimaryKeySet, row: &Row) -> Result<Row>;
}

/// Post-processes compiled filters and supplies lookup lists
#[async_trait]
pub trait FilterStrategy: Send + Sync {
    async fn filter(&self, predicates: Vec<Predicate>) -> Result<Vec<Predicate>>;

    async fn list(&self, _alias: &str) -> Result<LookupList> {
        Ok(LookupList::new())
    }
}

/// Replaces page fetching and counting
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    async fn fetch(&self, builder: &Builder) -> Result<Vec<Row>>;
    async fn sum(&self, builder: &Builder) -> Result<i64>;
}

/// Maps each fetched row
pub trait BuildStrategy: Send + Sync {
    fn build(&self, row: Row) -> Row;
}

/// Batch process driven page by page: import, export or a custom job
#[async_trait]
pub trait ProcessStrategy: Send + Sync {
    /// Receive the settings row bound to this view
    fn set_setting(&self, setting: Row);

    /// Batch size given the configured base speed
    fn speed(&self, speed: i64) -> i64 {
        speed
    }

    /// Start the process; returns the total number of rows
    async fn prepare(&self, builder: &Builder) -> Result<i64>;

    /// Handle one row; `rows` is the accumulated progress state
    async fn run(&self, row: Row, rows: Row, builder: &Builder) -> Result<Row>;

    async fn done(&self, rows: Row, builder: &Builder) -> Result<Row>;
}

/// Message lookup for validation messages
pub trait Translator: Send + Sync {
    fn translate(&self, message: &str) -> String;
}

/// Returns every message unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTranslator;

impl Translator for IdentityTranslator {
    fn translate(&self, message: &str) -> String {
        message.to_string()
    }
}

/// Strategies bound to a grid
#[derive(Clone, Default)]
pub struct Strategies {
    pub add: Option<Arc<dyn AddStrategy>>,
    pub update: Option<Arc<dyn UpdateStrategy>>,
    pub remove: Option<Arc<dyn RemoveStrategy>>,
    pub edit: Option<Arc<dyn EditStrategy>>,
    pub filter: Option<Arc<dyn FilterStrategy>>,
    pub fetch: Option<Arc<dyn FetchStrategy>>,
    pub build: Option<Arc<dyn BuildStrategy>>,
    pub import: Option<Arc<dyn ProcessStrategy>>,
    pub export: Option<Arc<dyn ProcessStrategy>>,
    pub process: Option<Arc<dyn ProcessStrategy>>,
}

impl Strategies {
    /// Process strategy serving a batch status
    pub fn for_status(&self, status: &str) -> Option<&Arc<dyn ProcessStrategy>> {
        match status {
            "export" | "excel" => self.export.as_ref(),
            "import" => self.import.as_ref(),
            _ => self.process.as_ref(),
        }
    }

    fn bound(&self) -> Vec<&'static str> {
        [
            ("add", self.add.is_some()),
            ("update", self.update.is_some()),
            ("remove", self.remove.is_some()),
            ("edit", self.edit.is_some()),
            ("filter", self.filter.is_some()),
            ("fetch", self.fetch.is_some()),
            ("build", self.build.is_some()),
            ("import", self.import.is_some()),
            ("export", self.export.is_some()),
            ("process", self.process.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, bound)| bound.then_some(name))
        .collect()
    }
}

impl std::fmt::Debug for Strategies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategies")
            .field("bound", &self.bound())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(i64);

    #[async_trait]
    impl ProcessStrategy for Fixed {
        fn set_setting(&self, _setting: Row) {}

        fn speed(&self, _speed: i64) -> i64 {
            self.0
        }

        async fn prepare(&self, _builder: &Builder) -> Result<i64> {
            Ok(0)
        }

        async fn run(&self, _row: Row, rows: Row, _builder: &Builder) -> Result<Row> {
            Ok(rows)
        }

        async fn done(&self, rows: Row, _builder: &Builder) -> Result<Row> {
            Ok(rows)
        }
    }

    #[test]
    fn test_for_status_routing() {
        let strategies = Strategies {
            export: Some(Arc::new(Fixed(1))),
            import: Some(Arc::new(Fixed(2))),
            process: Some(Arc::new(Fixed(3))),
            ..Default::default()
        };

        assert_eq!(strategies.for_status("export").map(|s| s.speed(100)), Some(1));
        assert_eq!(strategies.for_status("excel").map(|s| s.speed(100)), Some(1));
        assert_eq!(strategies.for_status("import").map(|s| s.speed(100)), Some(2));
        assert_eq!(strategies.for_status("reindex").map(|s| s.speed(100)), Some(3));
    }

    #[test]
    fn test_missing_strategy() {
        assert!(Strategies::default().for_status("export").is_none());
    }

    #[test]
    fn test_debug_lists_bound() {
        let strategies = Strategies {
            export: Some(Arc::new(Fixed(1))),
            ..Default::default()
        };
        let debug = format!("{:?}", strategies);
        assert!(debug.contains("export"));
        assert!(!debug.contains("import"));
    }

    #[test]
    fn test_identity_translator() {
        assert_eq!(IdentityTranslator.translate("is required."), "is required.");
    }
}

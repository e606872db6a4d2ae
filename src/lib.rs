//! # grid-builder
//!
//! A metadata-driven tabular query engine over PostgreSQL.
//!
//! A grid is defined by a base table, a set of columns described by
//! `@`-annotated descriptor strings, optional joins and grouping, and
//! pluggable strategies. Per request it compiles filter, sort and pagination
//! input into parameterized queries, and dispatches add/update/delete
//! either to the bound strategies or to plain statements on the base table.
//!
//! ## Features
//!
//! - **Annotation Descriptors**: `products.price@decimal@required` style column metadata
//! - **Driver Introspection**: undeclared table columns are merged in with their type and key role
//! - **Filter Compilation**: operator suffixes, value-shape inference, HAVING on computed columns
//! - **Row Coercion & Validation**: typed payloads and user-facing validation messages
//! - **Strategy Hooks**: add, update, remove, edit, filter, fetch, build and batch processes
//! - **Lookup Lists**: distinct column values for selects, cached per expression
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use grid_builder::{Builder, GridConfig, GridRequest, PgRowStore, SortDirection};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(PgRowStore::connect("postgres://localhost/shop").await?);
//!
//!     let mut grid = Builder::new(GridConfig::default(), store)
//!         .table("products")
//!         .select([
//!             ("name", "products.name@required"),
//!             ("price", "products.price@decimal"),
//!             ("category", "categories.title"),
//!         ])
//!         .left_join("categories ON categories.id = products.category_id");
//!     grid.attach().await?;
//!
//!     let request = GridRequest::new()
//!         .filter("price >=", "100")
//!         .filter("name", "widget")
//!         .sort("price", SortDirection::Asc)
//!         .offset(2);
//!     grid.prepare(&request).await?;
//!
//!     let rows = grid.fetch().await?;
//!     let total = grid.sum().await?;
//!     println!("{} of {} rows", rows.len(), total);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use grid_builder::GridConfig;
//!
//! let config = GridConfig::builder()
//!     .pagination(50)            // Rows per page
//!     .speed(200)                // Base batch size for processes
//!     .feeds("feeds")            // Strategy settings table
//!     .log("grid_log")           // Optional action log table
//!     .build();
//! assert_eq!(config.pagination, 50);
//! ```
//!
//! ## Request Cycle
//!
//! An engine instance serves one request: `attach` once, then `prepare`,
//! then any execution operation. Use [`Builder::copy`] for the next request.

mod aggregate;
pub mod annotation;
mod assembler;
pub mod builder;
pub mod cache;
pub mod columns;
pub mod config;
mod crud;
pub mod error;
pub mod export;
mod filter;
pub mod format;
mod lookup;
pub mod plan;
pub mod request;
pub mod row;
pub mod sql;
pub mod store;
pub mod strategy;
pub mod types;

// Re-export main types for convenience
pub use annotation::{AnnotationValue, Annotations, ColumnAnnotations, ParsedDescriptor};
pub use builder::Builder;
pub use cache::{MemoryCache, MetadataCache};
pub use columns::ColumnSpec;
pub use config::{DateFormats, FormatConfig, GridConfig, GridConfigBuilder, TimeFormats};
pub use error::{GridError, Result};
pub use export::CsvExport;
pub use plan::{CompareOp, Join, JoinKind, Predicate, PreparedQuery, QueryPlan};
pub use request::{GridRequest, ViewContext};
pub use row::{CoercedRow, ValidationErrors};
pub use store::{PgRowStore, RowStore};
pub use strategy::{
    AddStrategy, BuildStrategy, EditStrategy, FetchStrategy, FilterStrategy, IdentityTranslator,
    ProcessStrategy, RemoveStrategy, Strategies, Translator, UpdateStrategy,
};
pub use types::{DriverColumn, KeyRole, LookupList, PrimaryKeySet, Row, SortDirection};

// Re-export SQL utilities for advanced users
pub use sql::{build_order_by_clause, build_predicate_clause, quote_identifier, validate_identifier};

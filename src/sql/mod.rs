//! SQL utilities for the grid builder
//!
//! Provides predicate emission, statement generation, identifier sanitization
//! and placeholder rewriting.

pub mod condition;
pub mod dml;
pub mod placeholder;
pub mod sanitize;

pub use condition::{build_order_by_clause, build_predicate_clause, column_sql};
pub use placeholder::rewrite_placeholders;
pub use sanitize::{POSTGRES_RESERVED_WORDS, quote_identifier, validate_identifier};

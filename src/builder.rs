//! The grid engine
//!
//! A `Builder` binds one table, its column descriptors, joins, grouping and
//! strategies. A request cycle runs `attach` once, then `prepare`, then any of
//! the execution operations (`fetch`, `sum`, `summary`, `list`, CRUD).
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use grid_builder::{Builder, GridConfig, GridRequest, PgRowStore};
//!
//! # async fn run() -> grid_builder::Result<()> {
//! let store = Arc::new(PgRowStore::connect("postgres://localhost/shop").await?);
//! let mut grid = Builder::new(GridConfig::default(), store)
//!     .table("products")
//!     .select([("name", "products.name"), ("price", "products.price@decimal")])
//!     .left_join("categories ON categories.id = products.category_id");
//!
//! grid.attach().await?;
//! grid.prepare(&GridRequest::new().filter("price >=", "100")).await?;
//! let rows = grid.fetch().await?;
//! let total = grid.sum().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::annotation::{AnnotationValue, Annotations};
use crate::cache::{MemoryCache, MetadataCache};
use crate::columns::ColumnSpec;
use crate::config::GridConfig;
use crate::error::{GridError, Result};
use crate::plan::{BaseQuery, Join, JoinKind, PreparedQuery, Predicate};
use crate::request::ViewContext;
use crate::sql::sanitize::{is_plain_column, table_of};
use crate::store::RowStore;
use crate::strategy::{
    AddStrategy, BuildStrategy, EditStrategy, FetchStrategy, FilterStrategy, IdentityTranslator,
    ProcessStrategy, RemoveStrategy, Strategies, Translator, UpdateStrategy,
};
use crate::types::{PrimaryKeySet, Row, SortDirection};

/// Native types whose values are compared as text
const TEXTUAL_NATIVE_TYPES: &[&str] = &["varchar", "char", "text", "json", "enum"];

/// Annotations marking a column as textual
const TEXTUAL_ANNOTATIONS: &[&str] = &["varchar", "char", "text", "uuid", "json"];

const TEMPORAL_NATIVE_TYPES: &[&str] = &["date", "timestamp", "time"];
const TEMPORAL_ANNOTATIONS: &[&str] = &["date", "datetime", "timestamp", "time"];

/// Metadata-driven grid over one table
pub struct Builder {
    pub(crate) config: GridConfig,
    pub(crate) store: Arc<dyn RowStore>,
    pub(crate) cache: Arc<dyn MetadataCache>,
    pub(crate) translator: Arc<dyn Translator>,
    pub(crate) view: ViewContext,
    pub(crate) table: String,
    pub(crate) columns: ColumnSpec,
    pub(crate) annotations: Annotations,
    pub(crate) defaults: Row,
    /// Native type family per alias, for columns backed by a base-table column
    pub(crate) natives: HashMap<String, String>,
    /// `table.key` → key
    pub(crate) keys: Vec<(String, String)>,
    pub(crate) joins: Vec<Join>,
    pub(crate) groups: Vec<String>,
    pub(crate) having: Option<String>,
    pub(crate) order: Vec<(String, SortDirection)>,
    pub(crate) predicates: Vec<Predicate>,
    pub(crate) limit: Option<i64>,
    pub(crate) strategies: Strategies,
    pub(crate) base: Option<BaseQuery>,
    pub(crate) prepared: Option<PreparedQuery>,
    pub(crate) primary: PrimaryKeySet,
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("table", &self.table)
            .field("columns", &self.columns)
            .field("joins", &self.joins)
            .field("strategies", &self.strategies)
            .field("attached", &self.base.is_some())
            .finish()
    }
}

impl Builder {
    /// Create an engine over the given store
    ///
    /// Uses the process-wide [`MemoryCache`] and an identity translator until
    /// replaced.
    pub fn new(config: GridConfig, store: Arc<dyn RowStore>) -> Self {
        Self {
            config,
            store,
            cache: MemoryCache::shared(),
            translator: Arc::new(IdentityTranslator),
            view: ViewContext::default(),
            table: String::new(),
            columns: ColumnSpec::new(),
            annotations: Annotations::new(),
            defaults: Row::new(),
            natives: HashMap::new(),
            keys: Vec::new(),
            joins: Vec::new(),
            groups: Vec::new(),
            having: None,
            order: Vec::new(),
            predicates: Vec::new(),
            limit: None,
            strategies: Strategies::default(),
            base: None,
            prepared: None,
            primary: PrimaryKeySet::new(),
        }
    }

    /// Fresh instance sharing configuration, store, cache, translator and view
    pub fn copy(&self) -> Self {
        Self::new(self.config.clone(), self.store.clone())
            .cache(self.cache.clone())
            .translator(self.translator.clone())
            .view(self.view.clone())
    }

    // =========================================================================
    // Collaborators
    // =========================================================================

    pub fn cache(mut self, cache: Arc<dyn MetadataCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    pub fn view(mut self, view: ViewContext) -> Self {
        self.view = view;
        self
    }

    // =========================================================================
    // Definition
    // =========================================================================

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into().trim().to_string();
        self
    }

    /// Declare columns as alias → descriptor pairs
    pub fn select<I, A, D>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = (A, D)>,
        A: Into<String>,
        D: Into<String>,
    {
        self.columns = columns.into_iter().collect();
        self
    }

    pub fn join(self, fragment: impl Into<String>) -> Self {
        self.add_join(JoinKind::Join, fragment)
    }

    pub fn left_join(self, fragment: impl Into<String>) -> Self {
        self.add_join(JoinKind::Left, fragment)
    }

    pub fn inner_join(self, fragment: impl Into<String>) -> Self {
        self.add_join(JoinKind::Inner, fragment)
    }

    fn add_join(mut self, kind: JoinKind, fragment: impl Into<String>) -> Self {
        self.joins.push(Join {
            kind,
            fragment: fragment.into().trim().to_string(),
        });
        self
    }

    /// Named GROUP BY sets, selected by index through the `groups` filter
    pub fn group<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn having(mut self, having: impl Into<String>) -> Self {
        self.having = Some(having.into());
        self
    }

    /// Default sort, used when the request carries none
    ///
    /// Every alias must be declared in `select` and every direction must be
    /// `ASC` or `DESC`.
    pub fn order<I, A, D>(mut self, order: I) -> Result<Self>
    where
        I: IntoIterator<Item = (A, D)>,
        A: Into<String>,
        D: AsRef<str>,
    {
        let mut resolved = Vec::new();
        for (alias, direction) in order {
            let alias = alias.into();
            if !self.columns.contains(&alias) {
                return Err(GridError::configuration(format!(
                    "Order column '{}' must be declared in select",
                    alias
                )));
            }
            let direction = match direction.as_ref() {
                "ASC" => SortDirection::Asc,
                "DESC" => SortDirection::Desc,
                other => {
                    return Err(GridError::configuration(format!(
                        "Order value can be only DESC or ASC, got '{}'",
                        other
                    )));
                }
            };
            resolved.push((alias, direction));
        }
        self.order = resolved;
        Ok(self)
    }

    /// Page size used instead of the configured pagination
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    // =========================================================================
    // Conditions
    // =========================================================================

    /// Keyed condition; the key may carry an operator such as `price >=`
    pub fn where_eq(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.predicates.push(Predicate::from_key(key, value.into()));
        self
    }

    /// `IN` condition that also offers its values as the column's options
    pub fn where_in<I, V>(mut self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<serde_json::Value>,
    {
        let values: Vec<serde_json::Value> = values.into_iter().map(Into::into).collect();
        let alias = key.rsplit('.').next().unwrap_or(key).trim();
        let options = values.iter().map(crate::format::scalar_text).collect();
        self.annotations
            .set(alias, "enum", AnnotationValue::Options(options));
        self.predicates.push(Predicate::In {
            column: key.trim().to_string(),
            values,
        });
        self
    }

    /// Condition whose value is computed now; skipped when `None`
    pub fn where_with<F>(self, key: &str, value: F) -> Self
    where
        F: FnOnce() -> Option<serde_json::Value>,
    {
        match value() {
            Some(value) => self.where_eq(key, value),
            None => self,
        }
    }

    /// Condition applied only when `condition` holds
    pub fn where_when(self, key: &str, value: impl Into<serde_json::Value>, condition: bool) -> Self {
        if condition { self.where_eq(key, value) } else { self }
    }

    /// Raw SQL fragment appended verbatim
    pub fn where_raw(mut self, fragment: impl Into<String>) -> Self {
        self.predicates.push(Predicate::Raw(fragment.into()));
        self
    }

    // =========================================================================
    // Strategies
    // =========================================================================

    pub fn insert(mut self, strategy: Arc<dyn AddStrategy>) -> Self {
        self.strategies.add = Some(strategy);
        self
    }

    pub fn update(mut self, strategy: Arc<dyn UpdateStrategy>) -> Self {
        self.strategies.update = Some(strategy);
        self
    }

    pub fn remove(mut self, strategy: Arc<dyn RemoveStrategy>) -> Self {
        self.strategies.remove = Some(strategy);
        self
    }

    pub fn edit(mut self, strategy: Arc<dyn EditStrategy>) -> Self {
        self.strategies.edit = Some(strategy);
        self
    }

    pub fn filter(mut self, strategy: Arc<dyn FilterStrategy>) -> Self {
        self.strategies.filter = Some(strategy);
        self
    }

    pub fn fetch_with(mut self, strategy: Arc<dyn FetchStrategy>) -> Self {
        self.strategies.fetch = Some(strategy);
        self
    }

    pub fn build(mut self, strategy: Arc<dyn BuildStrategy>) -> Self {
        self.strategies.build = Some(strategy);
        self
    }

    pub fn import(mut self, strategy: Arc<dyn ProcessStrategy>) -> Self {
        self.strategies.import = Some(strategy);
        self
    }

    pub fn export(mut self, strategy: Arc<dyn ProcessStrategy>) -> Self {
        self.strategies.export = Some(strategy);
        self
    }

    pub fn process(mut self, strategy: Arc<dyn ProcessStrategy>) -> Self {
        self.strategies.process = Some(strategy);
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RowStore> {
        &self.store
    }

    pub fn view_context(&self) -> &ViewContext {
        &self.view
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Active columns (alias → expression once attached)
    pub fn columns(&self) -> &ColumnSpec {
        &self.columns
    }

    pub fn column(&self, alias: &str) -> Option<&str> {
        self.columns.get(alias)
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    /// Per-column default values resolved at attach
    pub fn defaults(&self) -> &Row {
        &self.defaults
    }

    /// Primary-key columns of the base table
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|(_, key)| key.as_str())
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn strategies(&self) -> &Strategies {
        &self.strategies
    }

    /// Primary keys captured by the last coerced submission
    pub fn primary(&self) -> &PrimaryKeySet {
        &self.primary
    }

    /// Configured conditions, or the compiled ones after `prepare`
    pub fn predicates(&self) -> &[Predicate] {
        match &self.prepared {
            Some(prepared) => &prepared.predicates,
            None => &self.predicates,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.base.is_some()
    }

    pub fn is_edit(&self) -> bool {
        self.strategies.edit.is_some()
    }

    pub fn is_import(&self) -> bool {
        self.strategies.import.is_some()
    }

    pub fn is_remove(&self) -> bool {
        self.strategies.remove.is_some()
    }

    /// Query state of the current request cycle
    pub fn prepared(&self) -> Result<&PreparedQuery> {
        self.prepared
            .as_ref()
            .ok_or_else(|| GridError::configuration("Grid must be prepared before execution"))
    }

    // =========================================================================
    // Shared helpers
    // =========================================================================

    /// Qualify a plain column expression with the base table
    pub(crate) fn qualify(&self, expression: &str) -> String {
        let expression = expression.trim();
        if is_plain_column(expression) {
            format!("{}.{}", self.table, expression)
        } else {
            expression.to_string()
        }
    }

    /// Whether an expression only references tables present in the query
    pub(crate) fn is_joined(&self, expression: &str) -> bool {
        match table_of(expression) {
            None => true,
            Some(table) => {
                self.joins.is_empty()
                    || table == self.table
                    || self.joins.iter().any(|join| join.fragment.contains(table))
            }
        }
    }

    /// Whether values of a column should be compared as text
    pub(crate) fn is_textual(&self, alias: &str) -> bool {
        self.annotations.has_any(alias, TEXTUAL_ANNOTATIONS)
            || self
                .natives
                .get(alias)
                .is_some_and(|native| TEXTUAL_NATIVE_TYPES.contains(&native.as_str()))
    }

    /// Whether a column holds dates or times
    pub(crate) fn is_temporal(&self, alias: &str) -> bool {
        !self.is_textual(alias)
            && (self.annotations.has_any(alias, TEMPORAL_ANNOTATIONS)
                || self
                    .natives
                    .get(alias)
                    .is_some_and(|native| TEMPORAL_NATIVE_TYPES.contains(&native.as_str())))
    }

    /// Whether the store reported a type for the column
    pub(crate) fn is_typed(&self, alias: &str) -> bool {
        self.natives.contains_key(alias)
    }
}

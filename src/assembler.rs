//! Attach: column merging and base query assembly
//!
//! Attach binds strategy settings, merges declared columns with the columns
//! the store reports for the base table, applies per-user settings, and
//! assembles the projection and FROM clause shared by every query of the
//! request cycle.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

use crate::annotation;
use crate::builder::Builder;
use crate::columns::load_drivers;
use crate::error::{GridError, Result};
use crate::plan::{BaseQuery, JoinKind, Predicate};
use crate::sql::dml;
use crate::sql::sanitize::{quote_identifier, table_of, validate_identifier};
use crate::types::{DriverColumn, LookupList, Row};

/// Aliases used by the rendering layer
const RESERVED_ALIASES: &[&str] = &["style", "groups"];

fn explicit_alias_regex() -> &'static Regex {
    static EXPLICIT_ALIAS: OnceLock<Regex> = OnceLock::new();
    EXPLICIT_ALIAS.get_or_init(|| Regex::new(r"(?i)\sAS\s").expect("valid regex"))
}

impl Builder {
    /// Merge column metadata and assemble the base query
    ///
    /// Must run once before `prepare`.
    #[tracing::instrument(level = "debug", skip(self), fields(table = %self.table))]
    pub async fn attach(&mut self) -> Result<()> {
        validate_identifier(&self.table).map_err(GridError::configuration)?;
        self.bind_settings().await?;

        let drivers = load_drivers(self.store.as_ref(), self.cache.as_ref(), &self.table).await?;
        self.keys = drivers
            .iter()
            .filter(|driver| driver.is_primary())
            .map(|driver| (format!("{}.{}", self.table, driver.name), driver.name.clone()))
            .collect();

        let declared: Vec<(String, String)> = self
            .columns
            .iter()
            .map(|(alias, descriptor)| (alias.to_string(), descriptor.to_string()))
            .collect();
        for (alias, descriptor) in &declared {
            if explicit_alias_regex().is_match(descriptor) {
                return Err(GridError::configuration(format!(
                    "Use intended alias as key in column {}.",
                    alias
                )));
            }
            if RESERVED_ALIASES.contains(&alias.as_str()) {
                return Err(GridError::configuration(format!(
                    "Aliases {} are reserved, use a different alias for column {}.",
                    RESERVED_ALIASES.join(" and "),
                    alias
                )));
            }
            self.inject(alias, descriptor).await?;
        }

        let declared: HashSet<&str> = declared.iter().map(|(alias, _)| alias.as_str()).collect();
        for driver in &drivers {
            if declared.contains(driver.name.as_str()) {
                continue;
            }
            self.inject(&driver.name, &driver.descriptor()).await?;
            if self.defaults.contains_key(&driver.name) {
                self.columns
                    .set(driver.name.as_str(), format!("{}.{}", self.table, driver.name));
            }
        }

        self.apply_user_settings().await?;

        self.natives = self.resolve_natives(&drivers).await;

        let base = self.assemble()?;
        tracing::debug!(
            columns = self.columns.len(),
            keys = self.keys.len(),
            "Attached grid"
        );
        self.base = Some(base);
        self.prepared = None;
        Ok(())
    }

    /// Native type of every column that reads a driver column directly
    ///
    /// Joined tables are introspected too. A joined table the store cannot
    /// describe leaves its columns untyped.
    async fn resolve_natives(&self, drivers: &[DriverColumn]) -> HashMap<String, String> {
        let mut tables: HashMap<String, Vec<DriverColumn>> = HashMap::new();
        tables.insert(self.table.clone(), drivers.to_vec());

        let mut natives = HashMap::new();
        for (alias, expression) in self.columns.iter() {
            let qualified = self.qualify(expression);
            let Some(table) = table_of(&qualified) else {
                continue;
            };
            if !tables.contains_key(table) {
                if !self.is_joined(&qualified) {
                    continue;
                }
                let loaded = match load_drivers(self.store.as_ref(), self.cache.as_ref(), table).await {
                    Ok(loaded) => loaded,
                    Err(e) => {
                        tracing::warn!(table, error = %e, "Joined table has no driver metadata");
                        Vec::new()
                    }
                };
                tables.insert(table.to_string(), loaded);
            }
            let name = qualified.split_once('.').map_or("", |(_, column)| column.trim());
            if let Some(driver) = tables
                .get(table)
                .and_then(|columns| columns.iter().find(|driver| driver.name == name))
            {
                natives.insert(alias.to_string(), driver.native_type.to_lowercase());
            }
        }
        natives
    }

    /// Parse a descriptor into the column and annotation stores
    pub(crate) async fn inject(&mut self, alias: &str, descriptor: &str) -> Result<()> {
        let parsed = annotation::parse(alias, descriptor, Some(&self.view))?;
        self.annotations.merge(alias, parsed.annotations);

        if self.annotations.has(alias, "hidden") {
            self.columns.remove(alias);
            self.defaults.remove(alias);
            return Ok(());
        }
        self.columns.set(alias, parsed.expression);

        let default = if self.annotations.has_any(alias, &["addSelect", "addMultiSelect"]) {
            self.list(alias).await?.to_json()
        } else {
            match self.annotations.options(alias, "enum") {
                Some(options) if !options.is_empty() && !self.annotations.has(alias, "unfilter") => {
                    LookupList::identity(options.iter().cloned()).to_json()
                }
                _ => serde_json::Value::String(String::new()),
            }
        };
        self.defaults.insert(alias.to_string(), default);
        Ok(())
    }

    /// Bind per-view settings rows to the bound process strategies
    async fn bind_settings(&mut self) -> Result<()> {
        if let Some(import) = self.strategies.import.clone() {
            match self.setting("import").await? {
                Some(setting) => import.set_setting(setting),
                None => {
                    return Err(GridError::configuration(format!(
                        "Missing definition of import setting in table {} in call {}",
                        self.config.feeds,
                        self.view.source()
                    )));
                }
            }
        }
        if let Some(export) = self.strategies.export.clone() {
            if let Some(setting) = self.setting("export").await? {
                export.set_setting(setting);
            }
        }
        if let Some(process) = self.strategies.process.clone() {
            if let Some(setting) = self.setting("process").await? {
                process.set_setting(setting);
            }
        }
        Ok(())
    }

    async fn setting(&self, kind: &str) -> Result<Option<Row>> {
        let (sql, arguments) = dml::select_one(
            &self.config.feeds,
            &[
                Predicate::equals("type", kind),
                Predicate::equals("source", self.view.source()),
            ],
        );
        self.store.query_one(&sql, &arguments).await
    }

    /// Overlay per-user column annotations stored in the identity
    async fn apply_user_settings(&mut self) -> Result<()> {
        let Some(field) = self.config.settings.clone() else {
            return Ok(());
        };
        if !self.view.is_logged_in() {
            return Ok(());
        }
        let settings = match self.view.identity.get(&field) {
            Some(serde_json::Value::Object(settings)) => settings.clone(),
            Some(serde_json::Value::String(encoded)) => {
                match serde_json::from_str::<Row>(encoded) {
                    Ok(settings) => settings,
                    Err(e) => {
                        tracing::warn!(field = %field, error = %e, "Ignoring unreadable user settings");
                        return Ok(());
                    }
                }
            }
            _ => return Ok(()),
        };
        let Some(serde_json::Value::Object(overrides)) = settings.get(&self.view.source()) else {
            return Ok(());
        };

        for (alias, value) in overrides {
            let annotation = crate::format::scalar_text(value);
            let annotation = annotation.trim().trim_start_matches('@');
            if annotation.is_empty() {
                if self.annotations.has(alias, "unrender") {
                    self.annotations.remove(alias, "unrender");
                    self.annotations.remove(alias, "filter");
                }
                continue;
            }
            let Some(expression) = self.columns.get(alias).map(str::to_string) else {
                continue;
            };
            let present = self
                .annotations
                .column(alias)
                .is_some_and(|set| set.has(annotation));
            if !present && !expression.contains(annotation) {
                self.inject(alias, &format!("{}@{}", expression, annotation))
                    .await?;
            }
        }
        Ok(())
    }

    /// Build the projection and FROM clause
    fn assemble(&self) -> Result<BaseQuery> {
        let mut remaining: Vec<&(String, String)> = self.keys.iter().collect();
        let mut projection = Vec::new();
        let mut columns = Vec::new();

        for (alias, expression) in self.columns.iter() {
            let expression = if expression.trim().is_empty() {
                "NULL".to_string()
            } else {
                self.qualify(expression)
            };
            remaining.retain(|(qualified, _)| *qualified != expression);
            if self.is_joined(&expression) {
                projection.push(format!("{} AS {}", expression, quote_identifier(alias)));
                columns.push(expression);
            }
        }

        for (qualified, key) in remaining {
            if let Some(expression) = self.columns.get(key) {
                if !expression.contains('.') {
                    return Err(GridError::configuration(format!(
                        "Alias {} is reserved for primary key.",
                        key
                    )));
                }
            }
            projection.push(format!("{} AS {}", qualified, quote_identifier(key)));
            columns.push(qualified.clone());
        }

        if projection.is_empty() {
            projection.push(format!("{}.*", self.table));
        }

        let mut from = format!(" FROM {}", self.table);
        for kind in [JoinKind::Join, JoinKind::Left, JoinKind::Inner] {
            for join in self.joins.iter().filter(|join| join.kind == kind) {
                from.push(' ');
                from.push_str(kind.keyword());
                from.push(' ');
                from.push_str(&join.fragment);
            }
        }

        Ok(BaseQuery {
            projection: projection.join(", "),
            columns: columns.join(", "),
            from,
        })
    }
}

//! Filter compiler
//!
//! Turns one request's filter, sort and offset input into a [`PreparedQuery`]
//! on top of the base query assembled at attach.

use crate::builder::Builder;
use crate::error::{GridError, Result};
use crate::format::{is_numeric, numeric_value, parse_date, strip_escape};
use crate::plan::{CompareOp, PreparedQuery, Predicate, QueryPlan};
use crate::request::GridRequest;
use crate::sql::sanitize::is_computed;
use crate::types::SortDirection;

/// Filter key selecting the active GROUP BY set
const GROUPS_FILTER: &str = "groups";

impl Builder {
    /// Compile the request into the query texts of this cycle
    #[tracing::instrument(level = "debug", skip(self, request), fields(table = %self.table))]
    pub async fn prepare(&mut self, request: &GridRequest) -> Result<PreparedQuery> {
        let base = self
            .base
            .clone()
            .ok_or_else(|| GridError::configuration("Grid must be attached before prepare"))?;
        let mut plan = QueryPlan::new(base);
        plan.predicates = self.predicates.clone();
        plan.having_raw = self.having.clone();
        plan.group = self.resolve_group(request);
        plan.sort = self.resolve_sort(request);

        for (key, value) in &request.filters {
            if key == GROUPS_FILTER {
                continue;
            }
            self.compile_filter(&mut plan, key, value);
        }

        if let Some(filter) = &self.strategies.filter {
            plan.predicates = filter.filter(plan.predicates).await?;
        }

        let page = page_number(&request.offset);
        match request.batch_status() {
            None => {
                let limit = self.limit.unwrap_or(self.config.pagination);
                plan.limit = limit;
                plan.offset = page_offset(page, limit);
            }
            Some(status) => {
                let strategy = self.strategies.for_status(status).ok_or_else(|| {
                    GridError::configuration(format!(
                        "No process strategy bound for status '{}'",
                        status
                    ))
                })?;
                plan.limit = strategy.speed(self.config.speed);
                plan.offset = page.max(0);
                plan.sort = self
                    .keys
                    .iter()
                    .map(|(qualified, _)| (qualified.clone(), SortDirection::Asc))
                    .collect();
            }
        }

        let prepared = plan.finalize();
        tracing::debug!(
            query = %prepared.query,
            arguments = prepared.arguments.len(),
            limit = prepared.limit,
            offset = prepared.offset,
            "Prepared grid query"
        );
        self.prepared = Some(prepared.clone());
        Ok(prepared)
    }

    fn resolve_group(&self, request: &GridRequest) -> Option<String> {
        let index = match request.filters.get(GROUPS_FILTER) {
            Some(value) => crate::format::scalar_text(value)
                .trim_end_matches('_')
                .trim()
                .parse::<usize>()
                .ok(),
            None if !self.groups.is_empty() => Some(0),
            None => None,
        };
        index.and_then(|index| self.groups.get(index).cloned())
    }

    fn resolve_sort(&self, request: &GridRequest) -> Vec<(String, SortDirection)> {
        let requested: Vec<(String, SortDirection)> = request
            .sort
            .iter()
            .filter_map(|(alias, direction)| {
                let direction = SortDirection::parse(&crate::format::scalar_text(direction));
                match direction {
                    Some(direction) if self.columns.contains(alias) => {
                        Some((alias.clone(), direction))
                    }
                    _ => {
                        tracing::warn!(alias = %alias, "Ignoring invalid sort input");
                        None
                    }
                }
            })
            .collect();
        if !requested.is_empty() {
            return requested;
        }
        if !self.order.is_empty() {
            return self.order.clone();
        }
        self.columns
            .aliases()
            .find(|alias| !self.annotations.has(alias, "unrender"))
            .map(|alias| vec![(alias.to_string(), SortDirection::Desc)])
            .unwrap_or_default()
    }

    /// Normalize one filter entry into the plan
    fn compile_filter(&self, plan: &mut QueryPlan, key: &str, value: &serde_json::Value) {
        let key = key.trim();
        let alias = key.split_whitespace().next().unwrap_or_default();
        let Some(expression) = self.columns.get(alias).filter(|e| !e.trim().is_empty()) else {
            tracing::warn!(filter = %key, "Ignoring filter on unknown column");
            return;
        };
        let compare = CompareOp::split_suffix(key).map(|(_, op)| op);
        if compare.is_none() && key.len() > alias.len() {
            tracing::warn!(filter = %key, "Ignoring filter with unknown operator");
            return;
        }
        let column = self.qualify(expression);
        let textual = self.is_textual(alias);

        let text = match value {
            serde_json::Value::Null => return,
            serde_json::Value::Array(values) => {
                let blank = values.is_empty()
                    || values.iter().all(|v| crate::format::scalar_text(v).is_empty());
                if !blank {
                    let values = values
                        .iter()
                        .map(|v| {
                            let text = crate::format::scalar_text(v);
                            let text = strip_escape(&text);
                            match numeric_value(text) {
                                Some(number) if !textual => number,
                                _ => serde_json::Value::String(text.to_string()),
                            }
                        })
                        .collect();
                    plan.predicates.push(Predicate::In { column, values });
                }
                return;
            }
            other => crate::format::scalar_text(other).replace(';', ""),
        };
        let text = strip_escape(&text).to_string();
        if text.is_empty() {
            return;
        }

        if let Some(subcolumns) = self.annotations.options(alias, "filter") {
            plan.predicates.extend(
                subcolumns
                    .iter()
                    .map(|subcolumn| Predicate::contains_as_text(subcolumn.as_str(), &text)),
            );
            return;
        }

        if let Some(op) = compare {
            match self.comparable(alias, &text, textual) {
                Some(value) => plan.predicates.push(Predicate::Compare { column, op, value }),
                None => tracing::warn!(filter = %key, "Ignoring comparison the column cannot hold"),
            }
            return;
        }

        if is_computed(&column) {
            let predicate = if parse_date(&text).is_some() {
                Predicate::equals(column, text)
            } else if let Some(number) = numeric_value(&text) {
                Predicate::equals(column, number)
            } else {
                Predicate::contains_as_text(column, &text)
            };
            plan.having.push(predicate);
            return;
        }

        let contains = |column: String| {
            if textual {
                Predicate::contains(column, &text)
            } else {
                Predicate::contains_as_text(column, &text)
            }
        };
        let dated = !textual && (self.is_temporal(alias) || !self.is_typed(alias));
        let predicate = match parse_date(&text) {
            Some(date) if dated => Predicate::equals(
                column,
                date.format(&self.config.format.date.query).to_string(),
            ),
            _ if textual && is_numeric(&text) => Predicate::equals(column, text.clone()),
            _ if is_numeric(&text) && !self.is_temporal(alias) => match numeric_value(&text) {
                Some(number) => Predicate::equals(column, number),
                None => contains(column),
            },
            _ => contains(column),
        };
        plan.predicates.push(predicate);
    }

    /// Value of an inequality filter, `None` when the column's type rules it out
    fn comparable(&self, alias: &str, text: &str, textual: bool) -> Option<serde_json::Value> {
        if textual {
            return Some(serde_json::Value::String(text.to_string()));
        }
        let temporal = self.is_temporal(alias);
        if let Some(date) = parse_date(text).filter(|_| temporal || !self.is_typed(alias)) {
            return Some(serde_json::Value::String(
                date.format(&self.config.format.date.query).to_string(),
            ));
        }
        if temporal {
            return None;
        }
        match numeric_value(text) {
            Some(number) => Some(number),
            None if self.is_typed(alias) => None,
            None => Some(serde_json::Value::String(text.to_string())),
        }
    }
}

/// Page number from the raw offset, `1` when absent or not numeric
fn page_number(offset: &serde_json::Value) -> i64 {
    let number = match offset {
        serde_json::Value::Number(n) => Some(n.clone()),
        serde_json::Value::String(s) => match numeric_value(s) {
            Some(serde_json::Value::Number(n)) => Some(n),
            _ => None,
        },
        _ => None,
    };
    number
        .and_then(|n| n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)))
        .unwrap_or(1)
}

/// Row offset of a page, saturating on oversized page numbers
fn page_offset(page: i64, limit: i64) -> i64 {
    page.saturating_sub(1).max(0).saturating_mul(limit.max(0))
}

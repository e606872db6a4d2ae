//! Request input and view context

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Row, SortDirection};

/// The view a grid is rendered in
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ViewContext {
    /// Name of the owning grid control
    pub control: String,
    /// View (presenter) name
    pub presenter: String,
    pub action: String,
    /// Logged-in user id, if any
    #[serde(default)]
    pub user_id: Option<serde_json::Value>,
    /// Identity data of the logged-in user
    #[serde(default)]
    pub identity: Row,
}

impl ViewContext {
    pub fn new(
        control: impl Into<String>,
        presenter: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            control: control.into(),
            presenter: presenter.into(),
            action: action.into(),
            ..Default::default()
        }
    }

    pub fn user(mut self, id: impl Into<serde_json::Value>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    pub fn identity(mut self, identity: Row) -> Self {
        self.identity = identity;
        self
    }

    /// `view:action`, used as the settings and audit source
    pub fn source(&self) -> String {
        format!("{}:{}", self.presenter, self.action)
    }

    pub fn is_logged_in(&self) -> bool {
        self.user_id.as_ref().is_some_and(|id| !id.is_null())
    }

    /// User id as text, empty for anonymous views
    pub fn user_key(&self) -> String {
        self.user_id
            .as_ref()
            .map(crate::format::scalar_text)
            .unwrap_or_default()
    }
}

/// Input of one request cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GridRequest {
    /// Submitted field values, possibly widget-wrapped
    pub row: Row,
    /// Filter key (optionally operator-suffixed) → scalar or array
    pub filters: Row,
    /// Alias → `ASC`/`DESC`
    pub sort: Row,
    /// Page number, or raw row offset in batch mode
    pub offset: serde_json::Value,
    /// Batch marker: `export`, `excel`, `import` or a process name
    pub status: Option<String>,
    /// Alias to aggregate with `summary`
    pub summary: Option<String>,
    /// Row id for inline updates
    pub id: serde_json::Value,
    /// Set when the form is opened for a new row
    pub add: bool,
    /// Per-view JSON object of column → selected ids
    pub spice: serde_json::Value,
}

impl GridRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse request JSON, stripping the leading `_` escape from
    /// top-level string values
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let value = match value {
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.into_iter()
                    .map(|(key, value)| match value {
                        serde_json::Value::String(s) => (
                            key,
                            serde_json::Value::String(crate::format::strip_escape(&s).to_string()),
                        ),
                        other => (key, other),
                    })
                    .collect(),
            ),
            other => other,
        };
        Ok(serde_json::from_value(value)?)
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn sort(mut self, alias: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.insert(alias.into(), direction.as_str().into());
        self
    }

    pub fn offset(mut self, offset: impl Into<serde_json::Value>) -> Self {
        self.offset = offset.into();
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn summary(mut self, alias: impl Into<String>) -> Self {
        self.summary = Some(alias.into());
        self
    }

    pub fn row(mut self, row: Row) -> Self {
        self.row = row;
        self
    }

    pub fn id(mut self, id: impl Into<serde_json::Value>) -> Self {
        self.id = id.into();
        self
    }

    pub fn spice(mut self, spice: serde_json::Value) -> Self {
        self.spice = spice;
        self
    }

    /// Batch status, ignoring an empty marker
    pub fn batch_status(&self) -> Option<&str> {
        self.status.as_deref().filter(|status| !status.is_empty())
    }
}

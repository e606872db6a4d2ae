//! Configuration for the grid builder
//!
//! Provides a builder pattern for configuring the engine, plus serde support
//! for JSON-shaped configuration supplied at construction.

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};

use crate::error::{GridError, Result};

/// Date formats used for lookups, edit widgets and query literals
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DateFormats {
    /// Database-side format used when projecting date lookup lists (`TO_CHAR` pattern)
    #[serde(default = "default_date_select")]
    pub select: String,
    /// chrono format used by edit widgets
    #[serde(default = "default_date_edit")]
    pub edit: String,
    /// chrono format used for date literals bound into queries and payloads
    #[serde(default = "default_date_query")]
    pub query: String,
}

impl Default for DateFormats {
    fn default() -> Self {
        Self {
            select: default_date_select(),
            edit: default_date_edit(),
            query: default_date_query(),
        }
    }
}

/// Time formats used by edit widgets
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeFormats {
    #[serde(default = "default_time_edit")]
    pub edit: String,
}

impl Default for TimeFormats {
    fn default() -> Self {
        Self {
            edit: default_time_edit(),
        }
    }
}

/// All configured formats
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FormatConfig {
    #[serde(default)]
    pub date: DateFormats,
    #[serde(default)]
    pub time: TimeFormats,
}

fn default_date_select() -> String {
    "YYYY-MM-DD".to_string()
}

fn default_date_edit() -> String {
    "%d.%m.%Y".to_string()
}

fn default_date_query() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

fn default_time_edit() -> String {
    "%d.%m.%Y %H:%M".to_string()
}

fn default_pagination() -> i64 {
    20
}

fn default_speed() -> i64 {
    100
}

fn default_feeds() -> String {
    "feeds".to_string()
}

fn default_spice() -> String {
    "spice".to_string()
}

fn default_upload() -> u32 {
    5
}

/// Configuration for the grid builder
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GridConfig {
    /// Rows per page
    #[serde(default = "default_pagination")]
    pub pagination: i64,
    /// Base batch size handed to process strategies
    #[serde(default = "default_speed")]
    pub speed: i64,
    #[serde(default)]
    pub format: FormatConfig,
    /// Table holding per-view strategy settings (`type`, `source`)
    #[serde(default = "default_feeds")]
    pub feeds: String,
    /// Table receiving the query audit log
    #[serde(default = "default_spice")]
    pub spice: String,
    /// Optional table receiving action logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    /// Optional identity field holding per-user column settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<String>,
    /// Maximum number of files for multi-upload columns
    #[serde(default = "default_upload")]
    pub upload: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfigBuilder::new().build()
    }
}

impl GridConfig {
    /// Create a new configuration builder
    pub fn builder() -> GridConfigBuilder {
        GridConfigBuilder::new()
    }

    /// Parse a JSON configuration and validate it
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let config: GridConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that pagination is positive and every chrono format is well formed
    pub fn validate(&self) -> Result<()> {
        if self.pagination <= 0 {
            return Err(GridError::configuration(format!(
                "Pagination must be positive, got {}",
                self.pagination
            )));
        }
        if self.speed <= 0 {
            return Err(GridError::configuration(format!(
                "Speed must be positive, got {}",
                self.speed
            )));
        }
        for (name, format) in [
            ("format.date.edit", &self.format.date.edit),
            ("format.date.query", &self.format.date.query),
            ("format.time.edit", &self.format.time.edit),
        ] {
            if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
                return Err(GridError::configuration(format!(
                    "Invalid date format '{}' in {}",
                    format, name
                )));
            }
        }
        Ok(())
    }
}

/// Builder for GridConfig
#[derive(Debug)]
pub struct GridConfigBuilder {
    config: GridConfig,
}

impl GridConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: GridConfig {
                pagination: default_pagination(),
                speed: default_speed(),
                format: FormatConfig::default(),
                feeds: default_feeds(),
                spice: default_spice(),
                log: None,
                settings: None,
                upload: default_upload(),
            },
        }
    }

    /// Set rows per page (default: 20)
    pub fn pagination(mut self, pagination: i64) -> Self {
        self.config.pagination = pagination;
        self
    }

    /// Set the base batch size for process strategies (default: 100)
    pub fn speed(mut self, speed: i64) -> Self {
        self.config.speed = speed;
        self
    }

    /// Set the database-side date format used by lookup lists
    pub fn date_select_format(mut self, format: impl Into<String>) -> Self {
        self.config.format.date.select = format.into();
        self
    }

    /// Set the date format used by edit widgets
    pub fn date_edit_format(mut self, format: impl Into<String>) -> Self {
        self.config.format.date.edit = format.into();
        self
    }

    /// Set the date format used for query literals
    pub fn date_query_format(mut self, format: impl Into<String>) -> Self {
        self.config.format.date.query = format.into();
        self
    }

    /// Set the time format used by edit widgets
    pub fn time_edit_format(mut self, format: impl Into<String>) -> Self {
        self.config.format.time.edit = format.into();
        self
    }

    /// Set the strategy settings table (default: "feeds")
    pub fn feeds(mut self, table: impl Into<String>) -> Self {
        self.config.feeds = table.into();
        self
    }

    /// Set the query audit table (default: "spice")
    pub fn spice(mut self, table: impl Into<String>) -> Self {
        self.config.spice = table.into();
        self
    }

    /// Enable action logging into the given table
    pub fn log(mut self, table: impl Into<String>) -> Self {
        self.config.log = Some(table.into());
        self
    }

    /// Read per-user column settings from the given identity field
    pub fn settings(mut self, field: impl Into<String>) -> Self {
        self.config.settings = Some(field.into());
        self
    }

    /// Set the multi-upload file limit (default: 5)
    pub fn upload(mut self, max_files: u32) -> Self {
        self.config.upload = max_files;
        self
    }

    /// Build the configuration
    pub fn build(self) -> GridConfig {
        self.config
    }
}

impl Default for GridConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Default Tests
    // =========================================================================

    #[test]
    fn test_default_config() {
        let config = GridConfig::builder().build();

        assert_eq!(config.pagination, 20);
        assert_eq!(config.speed, 100);
        assert_eq!(config.feeds, "feeds");
        assert_eq!(config.spice, "spice");
        assert!(config.log.is_none());
        assert!(config.settings.is_none());
        assert_eq!(config.format.date.query, "%Y-%m-%d %H:%M:%S");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_trait_matches_builder() {
        assert_eq!(GridConfig::default(), GridConfig::builder().build());
    }

    // =========================================================================
    // Builder Tests
    // =========================================================================

    #[test]
    fn test_full_custom_config() {
        let config = GridConfig::builder()
            .pagination(50)
            .speed(10)
            .feeds("grid_feeds")
            .spice("grid_spice")
            .log("grid_log")
            .settings("grid_settings")
            .date_query_format("%Y-%m-%d")
            .upload(3)
            .build();

        assert_eq!(config.pagination, 50);
        assert_eq!(config.speed, 10);
        assert_eq!(config.feeds, "grid_feeds");
        assert_eq!(config.spice, "grid_spice");
        assert_eq!(config.log.as_deref(), Some("grid_log"));
        assert_eq!(config.settings.as_deref(), Some("grid_settings"));
        assert_eq!(config.format.date.query, "%Y-%m-%d");
        assert_eq!(config.upload, 3);
    }

    #[test]
    fn test_builder_debug() {
        let builder = GridConfig::builder();
        let debug_str = format!("{:?}", builder);
        assert!(debug_str.contains("GridConfigBuilder"));
    }

    // =========================================================================
    // JSON Tests
    // =========================================================================

    #[test]
    fn test_from_json_fills_defaults() {
        let config = GridConfig::from_json(serde_json::json!({
            "pagination": 30,
            "format": {"date": {"query": "%Y-%m-%d"}},
            "log": "audit"
        }))
        .unwrap();

        assert_eq!(config.pagination, 30);
        assert_eq!(config.speed, 100);
        assert_eq!(config.format.date.query, "%Y-%m-%d");
        assert_eq!(config.format.date.edit, "%d.%m.%Y");
        assert_eq!(config.log.as_deref(), Some("audit"));
    }

    // =========================================================================
    // Validation Tests
    // =========================================================================

    #[test]
    fn test_validate_rejects_bad_format() {
        let config = GridConfig::builder().date_query_format("%Y-%!").build();
        let err = config.validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("format.date.query"));
    }

    #[test]
    fn test_validate_rejects_zero_pagination() {
        let config = GridConfig::builder().pagination(0).build();
        assert!(config.validate().is_err());
    }
}

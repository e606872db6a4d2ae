//! Core type definitions for the grid builder
//!
//! Includes driver-introspected column metadata, row and key containers,
//! lookup lists and sort directions.

use serde::{Deserialize, Serialize};

/// A row as exchanged with the store and strategies: column → JSON value
pub type Row = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Driver Column Metadata
// ============================================================================

/// Key role of a column as reported by the store
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyRole {
    /// Part of the primary key
    Primary,
    /// Covered by a unique constraint
    Unique,
    /// Covered by a non-unique index
    Index,
    /// No key role
    #[default]
    None,
}

impl KeyRole {
    /// Annotation token injected for this role (`pri`, `uni`, `mul`, or empty)
    pub fn token(&self) -> &'static str {
        match self {
            KeyRole::Primary => "pri",
            KeyRole::Unique => "uni",
            KeyRole::Index => "mul",
            KeyRole::None => "",
        }
    }

    /// Parse a store key code such as `PRI` or `UNI`
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "PRI" | "PRIMARY" | "PRIMARY KEY" => KeyRole::Primary,
            "UNI" | "UNIQUE" => KeyRole::Unique,
            "MUL" | "INDEX" => KeyRole::Index,
            _ => KeyRole::None,
        }
    }
}

/// Column metadata introspected from the underlying store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverColumn {
    /// Column name
    pub name: String,
    /// Whether the column allows NULL values
    pub nullable: bool,
    /// Native type family in upper case (e.g. `INT`, `DATE`, `TIMESTAMP`)
    pub native_type: String,
    /// Vendor type string (e.g. `varchar(255)`, `decimal(10,2)`, `enum('a','b')`)
    pub vendor_type: String,
    /// Key role
    #[serde(default)]
    pub key: KeyRole,
    /// Column comment; may carry `@`-delimited annotations
    #[serde(default)]
    pub comment: String,
}

impl DriverColumn {
    /// Create driver metadata for a nullable, keyless column
    pub fn new(
        name: impl Into<String>,
        native_type: impl Into<String>,
        vendor_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            nullable: true,
            native_type: native_type.into(),
            vendor_type: vendor_type.into(),
            key: KeyRole::None,
            comment: String::new(),
        }
    }

    /// Mark the column as non-nullable
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set the key role
    pub fn key(mut self, key: KeyRole) -> Self {
        self.key = key;
        self
    }

    /// Mark the column as primary key (implies NOT NULL)
    pub fn primary(self) -> Self {
        self.key(KeyRole::Primary).not_null()
    }

    /// Set the column comment
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Whether this column is part of the primary key
    pub fn is_primary(&self) -> bool {
        self.key == KeyRole::Primary
    }

    /// Annotation descriptor injected for columns that were not declared explicitly
    ///
    /// Layout: `comment[@required]@vendorType@key@nativeType`.
    pub fn descriptor(&self) -> String {
        format!(
            "{}{}@{}@{}@{}",
            self.comment,
            if self.nullable { "" } else { "@required" },
            self.vendor_type,
            self.key.token(),
            self.native_type.to_lowercase()
        )
    }
}

/// Raw column information as read from PostgreSQL `information_schema`
#[derive(Debug, Clone, Default)]
pub struct PostgresColumn {
    pub name: String,
    pub data_type: String,
    pub udt_name: String,
    pub nullable: bool,
    pub character_maximum_length: Option<i32>,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
    pub key: String,
    pub comment: String,
    pub enum_labels: Vec<String>,
}

impl PostgresColumn {
    /// Map PostgreSQL type names onto native/vendor type strings
    pub fn into_driver(self) -> DriverColumn {
        let (native, vendor) = match self.data_type.as_str() {
            "smallint" => ("INT".to_string(), "smallint".to_string()),
            "integer" => ("INT".to_string(), "int".to_string()),
            "bigint" => ("INT".to_string(), "bigint".to_string()),
            "boolean" => ("TINYINT".to_string(), "tinyint(1)".to_string()),
            "numeric" | "decimal" => (
                "DECIMAL".to_string(),
                match (self.numeric_precision, self.numeric_scale) {
                    (Some(p), Some(s)) => format!("decimal({},{})", p, s),
                    _ => "decimal".to_string(),
                },
            ),
            "real" => ("FLOAT".to_string(), "float".to_string()),
            "double precision" => ("DOUBLE".to_string(), "double".to_string()),
            "date" => ("DATE".to_string(), "date".to_string()),
            "timestamp without time zone" | "timestamp with time zone" => {
                ("TIMESTAMP".to_string(), "datetime".to_string())
            }
            "time without time zone" | "time with time zone" => {
                ("TIME".to_string(), "time".to_string())
            }
            "character varying" => (
                "VARCHAR".to_string(),
                match self.character_maximum_length {
                    Some(n) => format!("varchar({})", n),
                    None => "varchar".to_string(),
                },
            ),
            "character" => (
                "CHAR".to_string(),
                match self.character_maximum_length {
                    Some(n) => format!("char({})", n),
                    None => "char".to_string(),
                },
            ),
            "text" => ("TEXT".to_string(), "text".to_string()),
            "json" | "jsonb" => ("JSON".to_string(), "json".to_string()),
            "uuid" => ("VARCHAR".to_string(), "uuid".to_string()),
            "USER-DEFINED" if !self.enum_labels.is_empty() => (
                "ENUM".to_string(),
                format!(
                    "enum({})",
                    self.enum_labels
                        .iter()
                        .map(|label| format!("'{}'", label))
                        .collect::<Vec<_>>()
                        .join(",")
                ),
            ),
            "USER-DEFINED" => (self.udt_name.to_uppercase(), self.udt_name.clone()),
            other => (other.to_uppercase(), other.replace(' ', "_")),
        };

        DriverColumn {
            name: self.name,
            nullable: self.nullable,
            native_type: native,
            vendor_type: vendor,
            key: KeyRole::from_code(&self.key),
            comment: self.comment,
        }
    }
}

// ============================================================================
// Primary Keys, Lookup Lists, Sorting
// ============================================================================

/// Primary-key column → submitted value, populated while coercing a row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrimaryKeySet(Row);

impl PrimaryKeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: serde_json::Value) {
        self.0.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&serde_json::Value> {
        self.0.get(column)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    /// The key set as a plain row
    pub fn as_row(&self) -> &Row {
        &self.0
    }
}

impl FromIterator<(String, serde_json::Value)> for PrimaryKeySet {
    fn from_iter<T: IntoIterator<Item = (String, serde_json::Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Ordered value → label pairs offered for a column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LookupList(Vec<(String, String)>);

impl LookupList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list where each value labels itself
    pub fn identity<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::new();
        for value in values {
            let value = value.into();
            list.insert(value.clone(), value);
        }
        list
    }

    /// Insert or replace a pair, keeping first-insertion order
    pub fn insert(&mut self, value: impl Into<String>, label: impl Into<String>) {
        let value = value.into();
        let label = label.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == value) {
            Some(entry) => entry.1 = label,
            None => self.0.push((value, label)),
        }
    }

    pub fn get(&self, value: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == value)
            .map(|(_, label)| label.as_str())
    }

    pub fn contains(&self, value: &str) -> bool {
        self.get(value).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(v, l)| (v.as_str(), l.as_str()))
    }

    /// The list as a JSON object (value → label)
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(v, l)| (v.clone(), serde_json::Value::String(l.clone())))
                .collect(),
        )
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Parse `ASC`/`DESC`, case-insensitively
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ASC" => Some(SortDirection::Asc),
            "DESC" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

//! CSV export process
//!
//! Writes the filtered grid to a per-view, per-user CSV file one batch at a
//! time. The header row is written by `prepare`, every handled row is
//! appended by `run`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::builder::Builder;
use crate::error::Result;
use crate::format::scalar_text;
use crate::strategy::ProcessStrategy;
use crate::types::Row;

const STATUS: &str = "export";

/// Export strategy writing CSV files under a base directory
#[derive(Debug)]
pub struct CsvExport {
    directory: PathBuf,
    setting: Mutex<Option<Row>>,
}

impl CsvExport {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            setting: Mutex::new(None),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Settings row bound at attach, if any
    pub fn setting(&self) -> Option<Row> {
        match self.setting.lock() {
            Ok(setting) => setting.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// `<dir>/<control>/export/<md5(view + action + user)>.csv`
    pub fn path(&self, builder: &Builder) -> PathBuf {
        let view = builder.view_context();
        let seed = format!("{}{}{}", view.presenter, view.action, view.user_key());
        self.directory
            .join(&view.control)
            .join("export")
            .join(format!("{:x}.csv", md5::compute(seed.as_bytes())))
    }
}

#[async_trait]
impl ProcessStrategy for CsvExport {
    fn set_setting(&self, setting: Row) {
        match self.setting.lock() {
            Ok(mut slot) => *slot = Some(setting),
            Err(poisoned) => *poisoned.into_inner() = Some(setting),
        }
    }

    async fn prepare(&self, builder: &Builder) -> Result<i64> {
        let total = builder.sum().await?;
        let first = builder.fetch_offset(0).await?;
        let header = first.keys().cloned().collect::<Vec<_>>().join(",");

        let path = self.path(builder);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, header).await?;
        tracing::info!(path = %path.display(), total, "Started CSV export");
        Ok(total)
    }

    async fn run(&self, row: Row, mut rows: Row, builder: &Builder) -> Result<Row> {
        let mut line = String::from("\n");
        for value in row.values() {
            line.push_str(&scalar_text(value));
            line.push(',');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(builder))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        rows.insert("status".to_string(), STATUS.into());
        Ok(rows)
    }

    async fn done(&self, _rows: Row, _builder: &Builder) -> Result<Row> {
        let mut status = Row::new();
        status.insert("status".to_string(), STATUS.into());
        Ok(status)
    }
}

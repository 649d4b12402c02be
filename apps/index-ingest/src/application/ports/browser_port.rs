//! Browser Port (Driven Port)
//!
//! Narrow capability over a headless browser. The session controller owns
//! exactly one handle at a time and closes it before acquiring another.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::application::error::IngestError;

/// Text content of one table row, cell by cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    /// Trimmed cell texts in column order.
    pub cells: Vec<String>,
}

impl RawRow {
    /// Build a row from cell texts.
    #[must_use]
    pub fn new<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cells: cells.into_iter().map(Into::into).collect(),
        }
    }

    /// Cell at `index`, if present.
    #[must_use]
    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(String::as_str)
    }
}

/// Starts browser instances.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a browser and open a blank page.
    async fn launch(&self) -> Result<Box<dyn BrowserHandle>, IngestError>;
}

/// A live browser with one page.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// Load `url`, failing after `timeout`.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), IngestError>;

    /// Wait until `selector` matches at least one element.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration)
    -> Result<(), IngestError>;

    /// Collect the cell texts of every element matching `selector`.
    async fn evaluate_extraction(&self, selector: &str) -> Result<Vec<RawRow>, IngestError>;

    /// Save a full-page PNG to `path`.
    async fn screenshot(&self, path: &Path) -> Result<(), IngestError>;

    /// Close the page and terminate the browser process.
    async fn close(&mut self) -> Result<(), IngestError>;
}

//! Resource scanner.
//!
//! Reads one page of candidates for a job window, oldest first. The
//! oldest-first order is what lets the cursor advance monotonically even
//! while new resources keep arriving.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use reindex_types::ResourceCandidate;

use crate::collaborators::ResourceTable;
use crate::SchedulerError;

/// Maximum number of candidates fetched per job per pass.
pub const SCAN_PAGE_SIZE: usize = 10_000;

/// Pages through resources by last-modified timestamp.
#[derive(Clone)]
pub struct ResourceScanner {
    table: Arc<dyn ResourceTable>,
    page_size: usize,
}

impl ResourceScanner {
    pub fn new(table: Arc<dyn ResourceTable>) -> Self {
        Self {
            table,
            page_size: SCAN_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Fetch one page of `[low, high)`.
    ///
    /// The query runs on the blocking pool. A page that is larger than
    /// requested, out of order, or outside the window is a fatal error.
    pub async fn scan(
        &self,
        resource_type: Option<&str>,
        low: DateTime<Utc>,
        high: DateTime<Utc>,
    ) -> Result<Vec<ResourceCandidate>, SchedulerError> {
        let table = self.table.clone();
        let page_size = self.page_size;
        let resource_type = resource_type.map(String::from);

        let page = tokio::task::spawn_blocking(move || {
            table.find_ids_updated_in_range(page_size, resource_type.as_deref(), low, high)
        })
        .await
        .map_err(|e| SchedulerError::Scan(format!("range query task failed: {}", e)))??;

        validate_page(&page, page_size, low, high)?;
        debug!(count = page.len(), low = %low, high = %high, "Scanned resource page");
        Ok(page)
    }
}

fn validate_page(
    page: &[ResourceCandidate],
    page_size: usize,
    low: DateTime<Utc>,
    high: DateTime<Utc>,
) -> Result<(), SchedulerError> {
    if page.len() > page_size {
        return Err(SchedulerError::Scan(format!(
            "range query returned {} rows for a page of {}",
            page.len(),
            page_size
        )));
    }
    if let Some(c) = page.iter().find(|c| c.last_updated < low || c.last_updated >= high) {
        return Err(SchedulerError::Scan(format!(
            "resource {} updated at {} is outside [{}, {})",
            c.id, c.last_updated, low, high
        )));
    }
    if page.windows(2).any(|w| w[0].last_updated > w[1].last_updated) {
        return Err(SchedulerError::Scan(
            "range query did not return resources oldest first".to_string(),
        ));
    }
    Ok(())
}

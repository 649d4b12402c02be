//! Scripted in-memory browser.
//!
//! Serves fixed table rows per selector and replays a queue of navigation
//! outcomes. Used by tests and by `INGEST_BROWSER=mock` dry runs.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::application::error::IngestError;
use crate::application::ports::{BrowserHandle, BrowserLauncher, RawRow};

/// PNG file signature written by mock screenshots.
const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Document content served after a navigation.
#[derive(Debug, Clone, Default)]
pub struct MockPage {
    rows: HashMap<String, Vec<RawRow>>,
    disconnected: bool,
}

impl MockPage {
    /// A page with no tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `rows` for `selector`.
    #[must_use]
    pub fn with_rows(mut self, selector: &str, rows: Vec<RawRow>) -> Self {
        self.rows.insert(selector.to_string(), rows);
        self
    }

    /// The browser dies as soon as the page is queried.
    #[must_use]
    pub const fn disconnected(mut self) -> Self {
        self.disconnected = true;
        self
    }

    /// A major-indices table in the primary layout.
    #[must_use]
    pub fn sample() -> Self {
        let row = |name: &str, last: &str, high: &str, low: &str, chg: &str, pct: &str| {
            RawRow::new(["", name, last, high, low, chg, pct, ""])
        };
        Self::new().with_rows(
            r#"table[data-test="dynamic-table"] tbody tr"#,
            vec![
                row("Dow Jones", "42,863.86", "42,950.10", "42,611.31", "+161.26", "+0.38%"),
                row("S&P 500", "5,864.67", "5,878.46", "5,846.11", "+23.20", "+0.40%"),
                row("Nasdaq", "18,489.55", "18,534.84", "18,420.26", "+115.94", "+0.63%"),
                row("Russell 2000", "2,276.09", "2,285.30", "2,260.01", "-4.76", "-0.21%"),
                row("FTSE 100", "8,358.25", "8,378.82", "8,318.36", "-26.88", "-0.32%"),
                row("DAX", "19,657.37", "19,674.69", "19,517.63", "+73.97", "+0.38%"),
                row("Nikkei 225", "38,981.75", "39,219.35", "38,823.21", "+70.56", "+0.18%"),
                row("Nifty 50", "24,854.05", "25,029.50", "24,567.65", "+104.20", "+0.42%"),
            ],
        )
    }
}

/// One scripted navigation result.
#[derive(Debug, Clone)]
pub enum NavigationStep {
    /// Load succeeds; the next queued page (if any) becomes current.
    Load,
    /// Navigation exceeds its timeout.
    Timeout,
    /// Navigation fails with a message.
    Fail(String),
    /// The browser process dies.
    Disconnect,
}

#[derive(Debug, Default)]
struct MockState {
    page: MockPage,
    queued_pages: VecDeque<MockPage>,
    navigation_script: VecDeque<NavigationStep>,
    launch_failures: u32,
    launches: u32,
    closes: u32,
    navigations: u32,
    open_handles: u32,
    max_open_handles: u32,
    screenshots: Vec<PathBuf>,
}

/// Scripted [`BrowserLauncher`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockBrowser {
    state: Arc<Mutex<MockState>>,
}

impl MockBrowser {
    /// A browser serving an empty page.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A browser serving `page` on every navigation.
    #[must_use]
    pub fn with_page(page: MockPage) -> Self {
        let browser = Self::new();
        browser.set_page(page);
        browser
    }

    /// Replace the current page.
    pub fn set_page(&self, page: MockPage) {
        self.state.lock().page = page;
    }

    /// Pages installed one per successful navigation, in order.
    pub fn queue_pages(&self, pages: impl IntoIterator<Item = MockPage>) {
        self.state.lock().queued_pages.extend(pages);
    }

    /// Navigation outcomes replayed in order; `Load` once exhausted.
    pub fn script_navigation(&self, steps: impl IntoIterator<Item = NavigationStep>) {
        self.state.lock().navigation_script.extend(steps);
    }

    /// Make the next `count` launches fail.
    pub fn fail_launches(&self, count: u32) {
        self.state.lock().launch_failures = count;
    }

    /// Open a handle directly, counted as a launch.
    #[must_use]
    pub fn handle(&self) -> MockHandle {
        let mut state = self.state.lock();
        state.launches += 1;
        state.open_handles += 1;
        state.max_open_handles = state.max_open_handles.max(state.open_handles);
        MockHandle {
            state: Arc::clone(&self.state),
            closed: false,
        }
    }

    /// Successful launches so far.
    #[must_use]
    pub fn launches(&self) -> u32 {
        self.state.lock().launches
    }

    /// Handles closed so far.
    #[must_use]
    pub fn closes(&self) -> u32 {
        self.state.lock().closes
    }

    /// Navigations attempted so far.
    #[must_use]
    pub fn navigations(&self) -> u32 {
        self.state.lock().navigations
    }

    /// Handles currently open.
    #[must_use]
    pub fn open_handles(&self) -> u32 {
        self.state.lock().open_handles
    }

    /// Highest number of simultaneously open handles observed.
    #[must_use]
    pub fn max_open_handles(&self) -> u32 {
        self.state.lock().max_open_handles
    }

    /// Screenshot paths requested so far.
    #[must_use]
    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.state.lock().screenshots.clone()
    }
}

#[async_trait]
impl BrowserLauncher for MockBrowser {
    async fn launch(&self) -> Result<Box<dyn BrowserHandle>, IngestError> {
        {
            let mut state = self.state.lock();
            if state.launch_failures > 0 {
                state.launch_failures -= 1;
                return Err(IngestError::BrowserLaunch {
                    message: "scripted launch failure".to_string(),
                });
            }
        }
        Ok(Box::new(self.handle()))
    }
}

/// Handle produced by [`MockBrowser`].
#[derive(Debug)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
    closed: bool,
}

impl MockHandle {
    fn ensure_open(&self) -> Result<(), IngestError> {
        if self.closed {
            return Err(IngestError::BrowserDisconnected {
                message: "handle already closed".to_string(),
            });
        }
        Ok(())
    }

    fn page_rows(&self, selector: &str) -> Result<Vec<RawRow>, IngestError> {
        self.ensure_open()?;
        let state = self.state.lock();
        if state.page.disconnected {
            return Err(IngestError::BrowserDisconnected {
                message: "target crashed".to_string(),
            });
        }
        Ok(state.page.rows.get(selector).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl BrowserHandle for MockHandle {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), IngestError> {
        self.ensure_open()?;
        let step = {
            let mut state = self.state.lock();
            state.navigations += 1;
            state
                .navigation_script
                .pop_front()
                .unwrap_or(NavigationStep::Load)
        };

        match step {
            NavigationStep::Load => {
                let mut state = self.state.lock();
                if let Some(page) = state.queued_pages.pop_front() {
                    state.page = page;
                }
                Ok(())
            }
            NavigationStep::Timeout => {
                tokio::time::sleep(timeout).await;
                Err(IngestError::NavigationTimeout {
                    url: url.to_string(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
            NavigationStep::Fail(message) => Err(IngestError::NavigationFailed {
                url: url.to_string(),
                message,
            }),
            NavigationStep::Disconnect => Err(IngestError::BrowserDisconnected {
                message: "browser process exited".to_string(),
            }),
        }
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), IngestError> {
        if !self.page_rows(selector)?.is_empty() {
            return Ok(());
        }
        tokio::time::sleep(timeout).await;
        Err(IngestError::SelectorNotFound {
            selector: selector.to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        })
    }

    async fn evaluate_extraction(&self, selector: &str) -> Result<Vec<RawRow>, IngestError> {
        self.page_rows(selector)
    }

    async fn screenshot(&self, path: &Path) -> Result<(), IngestError> {
        self.ensure_open()?;
        self.state.lock().screenshots.push(path.to_path_buf());
        tokio::fs::write(path, PNG_SIGNATURE)
            .await
            .map_err(|e| IngestError::Evaluation {
                message: format!("screenshot write failed: {e}"),
            })
    }

    async fn close(&mut self) -> Result<(), IngestError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut state = self.state.lock();
        state.closes += 1;
        state.open_handles = state.open_handles.saturating_sub(1);
        Ok(())
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        if !self.closed {
            let mut state = self.state.lock();
            state.open_handles = state.open_handles.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn navigation_script_replays_in_order() {
        let browser = MockBrowser::new();
        browser.script_navigation([
            NavigationStep::Fail("dns".to_string()),
            NavigationStep::Disconnect,
        ]);
        let handle = browser.launch().await.unwrap();

        let first = handle.navigate("https://x", Duration::ZERO).await;
        assert!(matches!(first, Err(IngestError::NavigationFailed { .. })));
        let second = handle.navigate("https://x", Duration::ZERO).await;
        assert!(second.unwrap_err().is_session_fatal());
        assert!(handle.navigate("https://x", Duration::ZERO).await.is_ok());
        assert_eq!(browser.navigations(), 3);
    }

    #[tokio::test]
    async fn queued_pages_swap_on_load() {
        let browser = MockBrowser::new();
        browser.queue_pages([
            MockPage::new(),
            MockPage::new().with_rows("tr", vec![RawRow::new(["a"])]),
        ]);
        let handle = browser.handle();

        handle.navigate("https://x", Duration::ZERO).await.unwrap();
        assert!(handle.evaluate_extraction("tr").await.unwrap().is_empty());
        handle.navigate("https://x", Duration::ZERO).await.unwrap();
        assert_eq!(handle.evaluate_extraction("tr").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn closed_handle_reports_disconnect() {
        let browser = MockBrowser::new();
        let mut handle = browser.handle();
        assert_eq!(browser.open_handles(), 1);

        handle.close().await.unwrap();
        handle.close().await.unwrap();
        assert_eq!(browser.closes(), 1);
        assert_eq!(browser.open_handles(), 0);
        assert!(
            handle
                .navigate("https://x", Duration::ZERO)
                .await
                .unwrap_err()
                .is_session_fatal()
        );
    }

    #[tokio::test]
    async fn launch_failures_are_consumed() {
        let browser = MockBrowser::new();
        browser.fail_launches(1);
        assert!(browser.launch().await.is_err());
        assert!(browser.launch().await.is_ok());
        assert_eq!(browser.launches(), 1);
    }

    #[tokio::test]
    async fn screenshot_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        let browser = MockBrowser::new();
        let handle = browser.handle();

        handle.screenshot(&path).await.unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes, PNG_SIGNATURE);
        assert_eq!(browser.screenshots(), vec![path]);
    }

    #[test]
    fn sample_page_has_primary_layout_rows() {
        let page = MockPage::sample();
        let rows = &page.rows[r#"table[data-test="dynamic-table"] tbody tr"#];
        assert_eq!(rows.len(), 8);
        assert!(rows.iter().all(|r| r.cells.len() >= 7));
    }
}

//! Headless Chromium adapter over the DevTools protocol.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::application::error::IngestError;
use crate::application::ports::{BrowserHandle, BrowserLauncher, RawRow};

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const CHROME_BINARIES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

/// Locate a Chromium executable: explicit path first, then `PATH`.
#[must_use]
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    CHROME_BINARIES
        .iter()
        .find_map(|name| which::which(name).ok())
}

/// Launches headless Chromium instances.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    chrome_path: Option<PathBuf>,
}

impl ChromiumLauncher {
    /// Create a launcher; `chrome_path` overrides the `PATH` lookup.
    #[must_use]
    pub const fn new(chrome_path: Option<PathBuf>) -> Self {
        Self { chrome_path }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserHandle>, IngestError> {
        let executable =
            find_chromium(self.chrome_path.as_deref()).ok_or_else(|| IngestError::BrowserLaunch {
                message: "no Chromium executable found (set CHROME_PATH)".to_string(),
            })?;

        let config = BrowserConfig::builder()
            .chrome_executable(&executable)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg(format!("--user-agent={USER_AGENT}"))
            .window_size(1366, 900)
            .build()
            .map_err(|message| IngestError::BrowserLaunch { message })?;

        let (browser, mut handler) =
            Browser::launch(config)
                .await
                .map_err(|e| IngestError::BrowserLaunch {
                    message: e.to_string(),
                })?;

        let alive = Arc::new(AtomicBool::new(true));
        let handler_alive = Arc::clone(&alive);
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!(error = %e, "DevTools handler event error");
                }
            }
            handler_alive.store(false, Ordering::Release);
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(IngestError::BrowserLaunch {
                    message: format!("failed to open page: {e}"),
                });
            }
        };

        tracing::debug!(executable = %executable.display(), "Chromium launched");

        Ok(Box::new(ChromiumHandle {
            browser: Some(browser),
            page: Some(page),
            handler_task,
            alive,
        }))
    }
}

/// One Chromium process with a single page.
pub struct ChromiumHandle {
    browser: Option<Browser>,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
    alive: Arc<AtomicBool>,
}

impl ChromiumHandle {
    fn page(&self) -> Result<&Page, IngestError> {
        if !self.alive.load(Ordering::Acquire) {
            return Err(IngestError::BrowserDisconnected {
                message: "DevTools connection closed".to_string(),
            });
        }
        self.page.as_ref().ok_or_else(|| IngestError::BrowserDisconnected {
            message: "browser already closed".to_string(),
        })
    }

    /// Map a CDP error, treating transport loss as a disconnect.
    fn classify(&self, error: &CdpError) -> Option<IngestError> {
        let lost = !self.alive.load(Ordering::Acquire)
            || matches!(
                error,
                CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse
            );
        lost.then(|| IngestError::BrowserDisconnected {
            message: error.to_string(),
        })
    }

    async fn evaluate<T: serde::de::DeserializeOwned>(&self, script: String) -> Result<T, IngestError> {
        let page = self.page()?;
        let result = page.evaluate(script).await.map_err(|e| {
            self.classify(&e).unwrap_or_else(|| IngestError::Evaluation {
                message: e.to_string(),
            })
        })?;
        result.into_value().map_err(|e| IngestError::Evaluation {
            message: format!("unexpected script result: {e}"),
        })
    }
}

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl BrowserHandle for ChromiumHandle {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), IngestError> {
        let page = self.page()?;
        match tokio::time::timeout(timeout, page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(self.classify(&e).unwrap_or_else(|| IngestError::NavigationFailed {
                url: url.to_string(),
                message: e.to_string(),
            })),
            Err(_) => Err(IngestError::NavigationTimeout {
                url: url.to_string(),
                timeout_ms: millis(timeout),
            }),
        }
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), IngestError> {
        let script = format!("document.querySelectorAll({}).length", js_string(selector));
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match self.evaluate::<u64>(script.clone()).await {
                Ok(count) if count > 0 => return Ok(()),
                Ok(_) => {}
                Err(e) if e.is_session_fatal() => return Err(e),
                Err(e) => tracing::trace!(error = %e, "Selector lookup failed"),
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(IngestError::SelectorNotFound {
                    selector: selector.to_string(),
                    timeout_ms: millis(timeout),
                });
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn evaluate_extraction(&self, selector: &str) -> Result<Vec<RawRow>, IngestError> {
        let script = format!(
            "Array.from(document.querySelectorAll({})).map(row => \
             Array.from(row.querySelectorAll('td,th')).map(cell => \
             (cell.innerText || cell.textContent || '').trim()))",
            js_string(selector)
        );
        let rows: Vec<Vec<String>> = self.evaluate(script).await?;
        Ok(rows.into_iter().map(|cells| RawRow { cells }).collect())
    }

    async fn screenshot(&self, path: &Path) -> Result<(), IngestError> {
        let page = self.page()?;
        let params = ScreenshotParams::builder().full_page(true).build();
        page.save_screenshot(params, path)
            .await
            .map(|_| ())
            .map_err(|e| {
                self.classify(&e).unwrap_or_else(|| IngestError::Evaluation {
                    message: format!("screenshot failed: {e}"),
                })
            })
    }

    async fn close(&mut self) -> Result<(), IngestError> {
        if let Some(page) = self.page.take()
            && let Err(e) = page.close().await
        {
            tracing::debug!(error = %e, "Page close failed");
        }

        let result = match self.browser.take() {
            Some(mut browser) => {
                let closed = browser.close().await.map(|_| ()).map_err(|e| {
                    IngestError::BrowserDisconnected {
                        message: e.to_string(),
                    }
                });
                if let Err(e) = browser.wait().await {
                    tracing::debug!(error = %e, "Waiting for Chromium exit failed");
                }
                closed
            }
            None => Ok(()),
        };

        self.handler_task.abort();
        self.alive.store(false, Ordering::Release);
        result
    }
}

impl Drop for ChromiumHandle {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_are_quoted_for_js() {
        assert_eq!(
            js_string(r#"table[data-test="dynamic-table"] tbody tr"#),
            r#""table[data-test=\"dynamic-table\"] tbody tr""#
        );
    }

    #[test]
    fn explicit_missing_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-chrome");
        assert_eq!(find_chromium(Some(&missing)), None);
    }

    #[test]
    fn explicit_existing_path_wins() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(
            find_chromium(Some(file.path())),
            Some(file.path().to_path_buf())
        );
    }

    #[tokio::test]
    #[ignore = "requires a local Chromium"]
    async fn extracts_rows_from_data_url() {
        let launcher = ChromiumLauncher::default();
        let mut handle = launcher.launch().await.unwrap();
        handle
            .navigate(
                "data:text/html,<table><tbody><tr><td>Dow Jones</td><td>42,000</td></tr></tbody></table>",
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        handle
            .wait_for_selector("table tbody tr", Duration::from_secs(5))
            .await
            .unwrap();
        let rows = handle.evaluate_extraction("table tbody tr").await.unwrap();
        assert_eq!(rows, vec![RawRow::new(["Dow Jones", "42,000"])]);
        handle.close().await.unwrap();
    }
}

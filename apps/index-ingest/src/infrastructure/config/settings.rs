//! Ingestion Configuration Settings
//!
//! Configuration types for the ingestion service, loaded from environment
//! variables. Every setting has a default; unparsable numbers fall back to
//! it.

use std::path::PathBuf;
use std::time::Duration;

use crate::application::services::backoff::{IntervalConfig, RetryConfig};
use crate::application::services::extraction::ExtractionEngine;
use crate::application::services::session_controller::SessionControllerConfig;

/// Default page scraped for index quotes.
pub const DEFAULT_TARGET_URL: &str = "https://www.investing.com/indices/major-indices";

/// Which browser backend to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrowserKind {
    /// Headless Chromium over the DevTools protocol.
    #[default]
    Chromium,
    /// Scripted in-memory page, no browser process.
    Mock,
}

impl BrowserKind {
    /// Parse backend from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "mock" => Self::Mock,
            _ => Self::Chromium,
        }
    }

    /// Backend name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Chromium => "chromium",
            Self::Mock => "mock",
        }
    }
}

/// Browser backend settings.
#[derive(Debug, Clone, Default)]
pub struct BrowserSettings {
    /// Backend to use.
    pub kind: BrowserKind,
    /// Explicit Chromium executable, looked up on `PATH` when absent.
    pub chrome_path: Option<PathBuf>,
}

/// Upstream page settings.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// Page to scrape.
    pub target_url: String,
    /// Bound on page load.
    pub navigation_timeout: Duration,
    /// Per-strategy wait for rows.
    pub selector_timeout: Duration,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            navigation_timeout: Duration::from_secs(30),
            selector_timeout: Duration::from_secs(10),
        }
    }
}

/// Session controller settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Minimum gap between sessions.
    pub min_session_interval: Duration,
    /// Attempts per session, at least 1.
    pub max_retries: u32,
    /// Unit of the linear retry backoff.
    pub retry_base_delay: Duration,
    /// Successful sessions between forced browser restarts (0 = never).
    pub forced_restart_sessions: u64,
    /// Failure screenshot directory (unset = disabled).
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            min_session_interval: Duration::from_millis(2000),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(5000),
            forced_restart_sessions: 50,
            screenshot_dir: None,
        }
    }
}

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Interval while sessions succeed.
    pub base_interval: Duration,
    /// Cap on the widened interval.
    pub max_interval: Duration,
    /// Failures tolerated before widening.
    pub max_consecutive_failures: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(60),
            max_interval: Duration::from_secs(900),
            max_consecutive_failures: 3,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check and metrics HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete ingestion configuration.
#[derive(Debug, Clone, Default)]
pub struct IngestConfig {
    /// Upstream page.
    pub source: SourceSettings,
    /// Session controller.
    pub session: SessionSettings,
    /// Scheduler.
    pub scheduler: SchedulerSettings,
    /// Browser backend.
    pub browser: BrowserSettings,
    /// Server ports.
    pub server: ServerSettings,
}

impl IngestConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the target URL is not http(s) or
    /// `INGEST_MAX_RETRIES` is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let target_url = env
            .string("INGEST_TARGET_URL")
            .unwrap_or_else(|| DEFAULT_TARGET_URL.to_string());
        if !(target_url.starts_with("http://") || target_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl {
                key: "INGEST_TARGET_URL",
                value: target_url,
            });
        }

        let source = SourceSettings {
            target_url,
            navigation_timeout: env.millis(
                "INGEST_NAVIGATION_TIMEOUT_MS",
                SourceSettings::default().navigation_timeout,
            ),
            selector_timeout: env.millis(
                "INGEST_SELECTOR_TIMEOUT_MS",
                SourceSettings::default().selector_timeout,
            ),
        };

        let session = SessionSettings {
            min_session_interval: env.millis(
                "INGEST_MIN_SESSION_INTERVAL_MS",
                SessionSettings::default().min_session_interval,
            ),
            max_retries: env.parse("INGEST_MAX_RETRIES", SessionSettings::default().max_retries),
            retry_base_delay: env.millis(
                "INGEST_RETRY_BASE_DELAY_MS",
                SessionSettings::default().retry_base_delay,
            ),
            forced_restart_sessions: env.parse(
                "INGEST_FORCED_RESTART_SESSIONS",
                SessionSettings::default().forced_restart_sessions,
            ),
            screenshot_dir: env.string("INGEST_SCREENSHOT_DIR").map(PathBuf::from),
        };
        if session.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                key: "INGEST_MAX_RETRIES",
                reason: "must be at least 1",
            });
        }

        let scheduler = SchedulerSettings {
            base_interval: env.secs(
                "INGEST_BASE_INTERVAL_SECS",
                SchedulerSettings::default().base_interval,
            ),
            max_interval: env.secs(
                "INGEST_MAX_INTERVAL_SECS",
                SchedulerSettings::default().max_interval,
            ),
            max_consecutive_failures: env.parse(
                "INGEST_MAX_CONSECUTIVE_FAILURES",
                SchedulerSettings::default().max_consecutive_failures,
            ),
        };

        let browser = BrowserSettings {
            kind: env
                .string("INGEST_BROWSER")
                .map(|s| BrowserKind::from_str_case_insensitive(&s))
                .unwrap_or_default(),
            chrome_path: env.string("CHROME_PATH").map(PathBuf::from),
        };

        let server = ServerSettings {
            health_port: env.parse("INGEST_HEALTH_PORT", ServerSettings::default().health_port),
        };

        Ok(Self {
            source,
            session,
            scheduler,
            browser,
            server,
        })
    }

    /// Settings for the session controller.
    #[must_use]
    pub fn session_controller_config(&self) -> SessionControllerConfig {
        SessionControllerConfig {
            target_url: self.source.target_url.clone(),
            min_session_interval: self.session.min_session_interval,
            navigation_timeout: self.source.navigation_timeout,
            retry: RetryConfig {
                max_retries: self.session.max_retries,
                base_delay: self.session.retry_base_delay,
                jitter_factor: 0.1,
            },
            forced_restart_sessions: self.session.forced_restart_sessions,
            screenshot_dir: self.session.screenshot_dir.clone(),
        }
    }

    /// Settings for the scheduler. The cap never sits below the base.
    #[must_use]
    pub fn interval_config(&self) -> IntervalConfig {
        IntervalConfig {
            base: self.scheduler.base_interval,
            max: self.scheduler.max_interval.max(self.scheduler.base_interval),
            max_consecutive_failures: self.scheduler.max_consecutive_failures,
        }
    }

    /// Extraction engine with the configured selector wait.
    #[must_use]
    pub fn extraction_engine(&self) -> ExtractionEngine {
        ExtractionEngine::with_selector_timeout(self.source.selector_timeout)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// URL is not http or https.
    #[error("{key} must be an http(s) URL, got {value:?}")]
    InvalidUrl {
        /// Variable name.
        key: &'static str,
        /// Offending value.
        value: String,
    },
    /// Value parsed but is not allowed.
    #[error("{key} {reason}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.string(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn secs(&self, key: &str, default: Duration) -> Duration {
        self.string(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn millis(&self, key: &str, default: Duration) -> Duration {
        self.string(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<IngestConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        IngestConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_env() {
        let config = config(&[]).unwrap();
        assert_eq!(config.source.target_url, DEFAULT_TARGET_URL);
        assert_eq!(config.session.min_session_interval, Duration::from_secs(2));
        assert_eq!(config.session.max_retries, 3);
        assert_eq!(config.session.retry_base_delay, Duration::from_secs(5));
        assert_eq!(config.session.forced_restart_sessions, 50);
        assert_eq!(config.scheduler.base_interval, Duration::from_secs(60));
        assert_eq!(config.scheduler.max_interval, Duration::from_secs(900));
        assert_eq!(config.scheduler.max_consecutive_failures, 3);
        assert_eq!(config.server.health_port, 8083);
        assert_eq!(config.browser.kind, BrowserKind::Chromium);
        assert!(config.session.screenshot_dir.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let config = config(&[
            ("INGEST_TARGET_URL", "http://localhost:9000/indices"),
            ("INGEST_MIN_SESSION_INTERVAL_MS", "500"),
            ("INGEST_BASE_INTERVAL_SECS", "30"),
            ("INGEST_MAX_RETRIES", "5"),
            ("INGEST_FORCED_RESTART_SESSIONS", "0"),
            ("INGEST_SCREENSHOT_DIR", "/tmp/shots"),
            ("INGEST_BROWSER", "MOCK"),
            ("CHROME_PATH", "/usr/bin/chromium"),
        ])
        .unwrap();

        assert_eq!(config.source.target_url, "http://localhost:9000/indices");
        assert_eq!(config.session.min_session_interval, Duration::from_millis(500));
        assert_eq!(config.scheduler.base_interval, Duration::from_secs(30));
        assert_eq!(config.session.max_retries, 5);
        assert_eq!(config.session.forced_restart_sessions, 0);
        assert_eq!(
            config.session.screenshot_dir,
            Some(PathBuf::from("/tmp/shots"))
        );
        assert_eq!(config.browser.kind, BrowserKind::Mock);
        assert_eq!(
            config.browser.chrome_path,
            Some(PathBuf::from("/usr/bin/chromium"))
        );
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        let config = config(&[
            ("INGEST_MAX_RETRIES", "lots"),
            ("INGEST_HEALTH_PORT", "99999"),
        ])
        .unwrap();
        assert_eq!(config.session.max_retries, 3);
        assert_eq!(config.server.health_port, 8083);
    }

    #[test]
    fn rejects_non_http_url() {
        let err = config(&[("INGEST_TARGET_URL", "file:///etc/passwd")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));
    }

    #[test]
    fn rejects_zero_retries() {
        let err = config(&[("INGEST_MAX_RETRIES", "0")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "INGEST_MAX_RETRIES",
                ..
            }
        ));
    }

    #[test]
    fn derived_service_configs() {
        let config = config(&[
            ("INGEST_BASE_INTERVAL_SECS", "600"),
            ("INGEST_MAX_INTERVAL_SECS", "300"),
        ])
        .unwrap();

        let interval = config.interval_config();
        assert_eq!(interval.max, Duration::from_secs(600));

        let session = config.session_controller_config();
        assert_eq!(session.retry.max_retries, 3);
        assert_eq!(session.target_url, DEFAULT_TARGET_URL);
    }

    #[test]
    fn browser_kind_parsing() {
        assert_eq!(BrowserKind::from_str_case_insensitive("mock"), BrowserKind::Mock);
        assert_eq!(
            BrowserKind::from_str_case_insensitive("chromium"),
            BrowserKind::Chromium
        );
        assert_eq!(
            BrowserKind::from_str_case_insensitive("firefox"),
            BrowserKind::Chromium
        );
    }
}

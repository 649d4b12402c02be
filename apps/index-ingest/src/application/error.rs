//! Ingestion errors.

use crate::domain::session::InvalidTransition;

/// Failure of a browser interaction or an extraction pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    /// The page did not finish loading in time.
    #[error("navigation to {url} timed out after {timeout_ms}ms")]
    NavigationTimeout {
        /// Target URL.
        url: String,
        /// Bound that was exceeded.
        timeout_ms: u64,
    },

    /// The page failed to load.
    #[error("navigation to {url} failed: {message}")]
    NavigationFailed {
        /// Target URL.
        url: String,
        /// Error details.
        message: String,
    },

    /// A strategy's rows never appeared.
    #[error("selector {selector:?} not found within {timeout_ms}ms")]
    SelectorNotFound {
        /// Row selector.
        selector: String,
        /// Bound that was exceeded.
        timeout_ms: u64,
    },

    /// Every strategy yielded zero records.
    #[error("no data extracted after {strategies_tried} strategies")]
    NoDataExtracted {
        /// Number of strategies consulted.
        strategies_tried: usize,
    },

    /// The browser process went away.
    #[error("browser disconnected: {message}")]
    BrowserDisconnected {
        /// Error details.
        message: String,
    },

    /// The browser could not be started.
    #[error("browser launch failed: {message}")]
    BrowserLaunch {
        /// Error details.
        message: String,
    },

    /// In-page script evaluation failed.
    #[error("evaluation failed: {message}")]
    Evaluation {
        /// Error details.
        message: String,
    },
}

impl IngestError {
    /// The browser is unusable and must be torn down before anything else.
    #[must_use]
    pub const fn is_session_fatal(&self) -> bool {
        matches!(self, Self::BrowserDisconnected { .. })
    }

    /// Only the current strategy failed; the next one may still succeed.
    #[must_use]
    pub const fn is_strategy_local(&self) -> bool {
        matches!(self, Self::SelectorNotFound { .. })
    }

    /// Short label for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NavigationTimeout { .. } => "navigation_timeout",
            Self::NavigationFailed { .. } => "navigation_failed",
            Self::SelectorNotFound { .. } => "selector_not_found",
            Self::NoDataExtracted { .. } => "no_data_extracted",
            Self::BrowserDisconnected { .. } => "browser_disconnected",
            Self::BrowserLaunch { .. } => "browser_launch",
            Self::Evaluation { .. } => "evaluation",
        }
    }
}

/// Terminal failure of a whole session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Every attempt failed.
    #[error("session failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        last: IngestError,
    },

    /// Shutdown interrupted the session.
    #[error("session cancelled")]
    Cancelled,

    /// The controller attempted an illegal phase move.
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let disconnected = IngestError::BrowserDisconnected {
            message: "target closed".to_string(),
        };
        assert!(disconnected.is_session_fatal());
        assert!(!disconnected.is_strategy_local());

        let selector = IngestError::SelectorNotFound {
            selector: "table tbody tr".to_string(),
            timeout_ms: 10,
        };
        assert!(selector.is_strategy_local());
        assert!(!selector.is_session_fatal());

        let no_data = IngestError::NoDataExtracted {
            strategies_tried: 3,
        };
        assert!(!no_data.is_session_fatal());
        assert!(!no_data.is_strategy_local());
        assert_eq!(no_data.kind(), "no_data_extracted");
    }

    #[test]
    fn exhausted_message_carries_last_error() {
        let err = SessionError::RetriesExhausted {
            attempts: 3,
            last: IngestError::NavigationTimeout {
                url: "https://example.com".to_string(),
                timeout_ms: 100,
            },
        };
        let message = err.to_string();
        assert!(message.contains("3 attempts"));
        assert!(message.contains("timed out"));
    }
}

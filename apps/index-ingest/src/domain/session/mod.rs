//! Ingestion Session
//!
//! One end-to-end ingestion attempt and the phase machine it moves through.
//!
//! ```text
//! Idle -> Throttling -> Initializing -> Navigating -> Extracting
//! Extracting --(records)--> Committing -> Idle
//! Extracting | Navigating | Initializing --(error)--> Failed
//! Failed --(attempts left)--> BackoffWait -> Restarting -> Navigating
//! Failed --(exhausted)--> Reporting -> Idle
//! Committing --(forced restart due)--> Restarting -> Idle
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Session Phase
// =============================================================================

/// Phase of the ingestion state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No session in flight.
    #[default]
    Idle,
    /// Waiting out the minimum inter-session interval.
    Throttling,
    /// Acquiring the browser.
    Initializing,
    /// Loading the target page.
    Navigating,
    /// Running the extraction strategies.
    Extracting,
    /// Installing the new snapshot.
    Committing,
    /// The current attempt failed.
    Failed,
    /// Sleeping before the next attempt.
    BackoffWait,
    /// Tearing down and reacquiring the browser.
    Restarting,
    /// Recording an exhausted session.
    Reporting,
}

impl SessionPhase {
    /// Phase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Throttling => "throttling",
            Self::Initializing => "initializing",
            Self::Navigating => "navigating",
            Self::Extracting => "extracting",
            Self::Committing => "committing",
            Self::Failed => "failed",
            Self::BackoffWait => "backoff_wait",
            Self::Restarting => "restarting",
            Self::Reporting => "reporting",
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Phase Machine
// =============================================================================

/// Rejected phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid session transition from {from} to {to}")]
pub struct InvalidTransition {
    /// Phase the session was in.
    pub from: SessionPhase,
    /// Phase that was requested.
    pub to: SessionPhase,
}

/// Validates session phase transitions.
pub struct SessionPhaseMachine;

impl SessionPhaseMachine {
    /// Check if a transition is allowed.
    #[must_use]
    pub const fn is_valid_transition(from: SessionPhase, to: SessionPhase) -> bool {
        use SessionPhase::{
            BackoffWait, Committing, Extracting, Failed, Idle, Initializing, Navigating,
            Reporting, Restarting, Throttling,
        };

        matches!(
            (from, to),
            (Idle, Throttling)
                // Cancellation while sleeping
                | (Throttling | BackoffWait, Idle)
                | (Throttling, Initializing)
                | (Initializing | Restarting, Navigating)
                | (Navigating, Extracting)
                | (Extracting, Committing)
                | (Initializing | Navigating | Extracting | Restarting, Failed)
                | (Committing, Idle | Restarting)
                | (Failed, BackoffWait | Reporting)
                | (BackoffWait, Restarting)
                | (Restarting, Idle)
                | (Reporting, Idle)
        )
    }

    /// Validate a transition.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] when the machine does not allow it.
    pub const fn validate_transition(
        from: SessionPhase,
        to: SessionPhase,
    ) -> Result<(), InvalidTransition> {
        if Self::is_valid_transition(from, to) {
            Ok(())
        } else {
            Err(InvalidTransition { from, to })
        }
    }

    /// All phases reachable in one step.
    #[must_use]
    pub fn valid_next_phases(from: SessionPhase) -> Vec<SessionPhase> {
        use SessionPhase::{
            BackoffWait, Committing, Extracting, Failed, Idle, Initializing, Navigating,
            Reporting, Restarting, Throttling,
        };

        match from {
            Idle => vec![Throttling],
            Throttling => vec![Initializing, Idle],
            Initializing => vec![Navigating, Failed],
            Navigating => vec![Extracting, Failed],
            Extracting => vec![Committing, Failed],
            Committing => vec![Idle, Restarting],
            Failed => vec![BackoffWait, Reporting],
            BackoffWait => vec![Restarting, Idle],
            Restarting => vec![Navigating, Failed, Idle],
            Reporting => vec![Idle],
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// One ingestion session, alive for a single controller run.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session identifier, carried on log lines.
    pub id: Uuid,
    /// Zero-based attempt number within the session.
    pub attempt_number: u32,
    /// Index of the strategy that produced records, if any.
    pub strategy_index: Option<usize>,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    phase: SessionPhase,
    history: Vec<SessionPhase>,
}

impl Session {
    /// Start a new session in `Idle`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            attempt_number: 0,
            strategy_index: None,
            started_at: Utc::now(),
            phase: SessionPhase::Idle,
            history: vec![SessionPhase::Idle],
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Every phase visited so far, starting with `Idle`.
    #[must_use]
    pub fn history(&self) -> &[SessionPhase] {
        &self.history
    }

    /// Move to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] and leaves the session untouched when
    /// the move is not allowed.
    pub fn advance(&mut self, to: SessionPhase) -> Result<(), InvalidTransition> {
        SessionPhaseMachine::validate_transition(self.phase, to)?;
        tracing::debug!(session_id = %self.id, from = %self.phase, to = %to, "Session transition");
        self.phase = to;
        self.history.push(to);
        Ok(())
    }

    /// Attempts made so far, counting the current one.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempt_number + 1
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

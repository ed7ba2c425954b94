//! Chaos phase state machine
//!
//! An entity under chaos is in exactly one phase. Paused and stopped are
//! distinct phases, so "paused and stopped at once" cannot be expressed.

use crate::error::StateMachineError;
use chaos_filter::FilterMatch;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Phase of one entity's chaos lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChaosPhase {
    /// Monitor not ticking yet
    Idle,
    /// Monitoring; chaos not yet allowed to start
    Armed,
    /// Chaos active, entity running and eligible for the next action
    Running,
    /// Chaos active, entity paused
    Paused,
    /// Chaos active, entity stopped
    Stopped,
}

impl ChaosPhase {
    /// Lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }

    /// Chaos has started for this entity
    #[inline]
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::Stopped)
    }

    /// Entity is currently held out of service by chaos
    #[inline]
    #[must_use]
    pub fn is_disrupted(self) -> bool {
        matches!(self, Self::Paused | Self::Stopped)
    }

    /// Move to `to`, returning the new phase
    ///
    /// # Errors
    /// `StateMachineError::IllegalTransition` when `to` is not reachable.
    pub fn transition(self, to: ChaosPhase) -> Result<ChaosPhase, StateMachineError> {
        validate_transition(self, to)?;
        Ok(to)
    }
}

impl fmt::Display for ChaosPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates a phase transition.
pub fn validate_transition(from: ChaosPhase, to: ChaosPhase) -> Result<(), StateMachineError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StateMachineError::IllegalTransition { from, to })
    }
}

/// Phases reachable from `from`
pub fn allowed_transitions(from: ChaosPhase) -> Vec<ChaosPhase> {
    use ChaosPhase::*;
    match from {
        Idle => vec![Armed],
        Armed => vec![Running],
        Running => vec![Paused, Stopped],
        Paused => vec![Running],
        Stopped => vec![Running],
    }
}

/// Per-entity chaos bookkeeping owned by its monitor
#[derive(Debug, Clone)]
pub struct ChaosRuntimeState {
    /// Current phase
    pub phase: ChaosPhase,
    /// Stopping is permitted
    pub can_restart: bool,
    /// Budget left; every stop and every start after it spends one
    pub restarts_remaining: u32,
    /// Stop/start cycles completed
    pub restarts_performed: u32,
    /// No action before this instant
    pub next_event_at: Instant,
    /// Monitor start, reset on every restart
    pub service_started_at: Instant,
    /// Delay after `service_started_at` before chaos may start
    pub start_after: Duration,
    /// Delay after `service_started_at` before stops are permitted
    pub restart_after: Duration,
    /// Start gate filter has matched
    pub start_gate_seen: bool,
    /// Restart gate filter has matched since the last restart
    pub restart_gate_seen: bool,
    /// Latest success match, kept across ticks
    pub last_found_success: Option<FilterMatch>,
    /// Latest fail match, kept across ticks
    pub last_found_fail: Option<FilterMatch>,
}

impl ChaosRuntimeState {
    /// Fresh `Idle` state with the full budget
    #[must_use]
    pub fn new(max_restarts: u32, now: Instant) -> Self {
        Self {
            phase: ChaosPhase::Idle,
            can_restart: false,
            restarts_remaining: max_restarts,
            restarts_performed: 0,
            next_event_at: now,
            service_started_at: now,
            start_after: Duration::ZERO,
            restart_after: Duration::ZERO,
            start_gate_seen: false,
            restart_gate_seen: false,
            last_found_success: None,
            last_found_fail: None,
        }
    }

    /// Apply a phase transition
    ///
    /// # Errors
    /// Propagates `StateMachineError` and leaves the phase unchanged.
    pub fn enter(&mut self, to: ChaosPhase) -> Result<(), StateMachineError> {
        self.phase = self.phase.transition(to)?;
        Ok(())
    }

    /// Record a completed start after a stop
    ///
    /// The start spends budget like the stop did, and restart permission
    /// must be earned again.
    pub fn record_restart(&mut self, now: Instant, restart_after: Duration) {
        self.restarts_remaining = self.restarts_remaining.saturating_sub(1);
        self.restarts_performed += 1;
        self.service_started_at = now;
        self.restart_after = restart_after;
        self.can_restart = false;
        self.restart_gate_seen = false;
    }
}

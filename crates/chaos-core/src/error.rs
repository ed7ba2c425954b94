//! Error types for the chaos core
//!
//! - Runtime call failures (per-tick, reported as error events)
//! - Configuration errors (surfaced synchronously at setup)
//! - Illegal phase transitions
//! - Orchestrator registry errors

use crate::state_machine::ChaosPhase;
use crate::types::EntityId;
use chaos_filter::FilterError;
use std::fmt;
use std::time::Duration;

/// Main chaos error type
#[derive(Debug, thiserror::Error)]
pub enum ChaosError {
    /// Invalid monitor configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Entity already has a running monitor
    #[error("entity already monitored: {0}")]
    AlreadyMonitored(EntityId),

    /// Entity has no running monitor
    #[error("entity not monitored: {0}")]
    NotMonitored(EntityId),

    /// Container runtime error
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Monitor task ended abnormally
    #[error("monitor task for {entity} failed: {message}")]
    MonitorTask {
        /// Entity of the task
        entity: EntityId,
        /// Panic or join error text
        message: String,
    },
}

/// Container runtime operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeOp {
    /// Read entity status
    Inspect,
    /// Read the cumulative output
    ReadOutput,
    /// Start a stopped entity
    Start,
    /// Stop a running entity
    Stop,
    /// Freeze a running entity
    Pause,
    /// Resume a paused entity
    Unpause,
    /// Move the entity to its next network address
    Reconnect,
}

impl fmt::Display for RuntimeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Inspect => "inspect",
            Self::ReadOutput => "read output",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Pause => "pause",
            Self::Unpause => "unpause",
            Self::Reconnect => "reconnect",
        };
        f.write_str(name)
    }
}

/// Container runtime errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    /// The call reached the runtime and failed
    #[error("{op} failed for {entity}: {message}")]
    CallFailed {
        /// Operation attempted
        op: RuntimeOp,
        /// Target entity
        entity: EntityId,
        /// Runtime's reason
        message: String,
    },

    /// Runtime does not know the entity
    #[error("entity not found: {0}")]
    NotFound(EntityId),

    /// Runtime could not be reached
    #[error("runtime unavailable: {0}")]
    Unavailable(String),
}

impl RuntimeError {
    /// Create call failure
    pub fn call_failed(op: RuntimeOp, entity: &EntityId, message: impl Into<String>) -> Self {
        Self::CallFailed {
            op,
            entity: entity.clone(),
            message: message.into(),
        }
    }

    /// Check if the next tick may succeed where this one failed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::CallFailed { .. } | Self::Unavailable(_))
    }
}

/// Setup-time configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Window bounds reversed
    #[error("window '{name}' has min {min:?} above max {max:?}")]
    InvalidWindow {
        /// Settings field
        name: &'static str,
        /// Configured lower bound
        min: Duration,
        /// Configured upper bound
        max: Duration,
    },

    /// Probability outside [0, 1]
    #[error("probability '{name}' must be within [0, 1], got {value}")]
    InvalidProbability {
        /// Settings field
        name: &'static str,
        /// Configured value
        value: f64,
    },

    /// Tick interval of zero
    #[error("tick interval must be non-zero")]
    ZeroTickInterval,

    /// Neither success nor fail filters registered
    #[error("entity {0} has no success or fail filters")]
    NoOutcomeFilters(EntityId),

    /// A filter is unusable
    #[error("invalid filter: {0}")]
    InvalidFilter(#[from] FilterError),
}

/// Phase transition errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateMachineError {
    /// Transition not in the allowed table
    #[error("illegal transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current phase
        from: ChaosPhase,
        /// Requested phase
        to: ChaosPhase,
    },
}

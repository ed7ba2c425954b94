//! Entity identity and observed status

use serde::{Deserialize, Serialize};
use std::fmt;

/// Container name or id as understood by the runtime
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Wrap a name or id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Result of inspecting an entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStatus {
    /// Process is up
    pub running: bool,
    /// Process is frozen
    pub paused: bool,
    /// Runtime is restarting it
    pub restarting: bool,
    /// Process exited and was not restarted
    pub dead: bool,
    /// Killed for exceeding memory
    pub oom_killed: bool,
    /// Exit code of the last run
    pub exit_code: i64,
    /// Last-known network address
    pub address: Option<String>,
}

impl EntityStatus {
    /// A healthy running entity
    #[must_use]
    pub fn running() -> Self {
        Self {
            running: true,
            ..Self::default()
        }
    }

    /// Running, paused or in the middle of a restart
    #[inline]
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.running || self.paused || self.restarting
    }

    /// Describe why this status is unhealthy, if it is
    ///
    /// `expect_down` is set while the entity was stopped on purpose.
    #[must_use]
    pub fn health_fault(&self, expect_down: bool) -> Option<String> {
        if self.oom_killed {
            return Some(format!("entity was OOM-killed (exit code {})", self.exit_code));
        }
        if self.dead {
            return Some(format!("entity is dead (exit code {})", self.exit_code));
        }
        if !expect_down && !self.is_live() {
            return Some(format!("entity is not running (exit code {})", self.exit_code));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_statuses() {
        assert!(EntityStatus::running().health_fault(false).is_none());
        let paused = EntityStatus {
            paused: true,
            ..EntityStatus::default()
        };
        assert!(paused.health_fault(false).is_none());
    }

    #[test]
    fn stopped_is_only_fine_when_expected() {
        let exited = EntityStatus {
            exit_code: 137,
            ..EntityStatus::default()
        };
        assert!(exited.health_fault(true).is_none());
        let fault = exited.health_fault(false).unwrap();
        assert!(fault.contains("137"));
    }

    #[test]
    fn dead_and_oom_always_fault() {
        let dead = EntityStatus {
            dead: true,
            ..EntityStatus::default()
        };
        assert!(dead.health_fault(true).unwrap().contains("dead"));

        let oom = EntityStatus {
            running: true,
            oom_killed: true,
            ..EntityStatus::default()
        };
        assert!(oom.health_fault(false).unwrap().contains("OOM"));
    }
}

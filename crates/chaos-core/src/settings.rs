//! Monitor configuration
//!
//! [`ChaosSettings`] holds the timing and probability knobs of one entity,
//! [`MonitorSpec`] bundles them with the entity, its scene and its filters.
//! Everything is validated before a monitor starts.

use crate::error::ConfigError;
use crate::scheduler::DwellWindow;
use crate::types::EntityId;
use chaos_filter::{FilterError, FilterSpec, LogFilter};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default monitor tick
pub const DEFAULT_TICK_MS: u64 = 2_000;

/// Chaos knobs of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaosSettings {
    /// Disrupt the entity; outcome reporting runs either way
    pub enabled: bool,
    /// Period of the monitor loop
    pub tick_interval_ms: u64,
    /// Delay after entity start before chaos may begin
    pub start_window: DwellWindow,
    /// Delay after (re)start before stops are permitted
    pub restart_gate_window: DwellWindow,
    /// Running time between actions
    pub pause_window: DwellWindow,
    /// Time spent paused
    pub unpause_window: DwellWindow,
    /// Time spent stopped
    pub restart_window: DwellWindow,
    /// Chance an eligible action is a stop instead of a pause
    pub restart_probability: f64,
    /// Chance a restart moves the entity to a new address
    pub address_change_probability: f64,
    /// Budget of stops and starts
    pub max_restarts: u32,
}

impl ChaosSettings {
    /// Defaults with chaos off
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With chaos switched on
    #[inline]
    #[must_use]
    pub fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }

    /// With a different tick
    #[inline]
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With a different start window
    #[inline]
    #[must_use]
    pub fn with_start_window(mut self, window: DwellWindow) -> Self {
        self.start_window = window;
        self
    }

    /// With a different restart gate window
    #[inline]
    #[must_use]
    pub fn with_restart_gate_window(mut self, window: DwellWindow) -> Self {
        self.restart_gate_window = window;
        self
    }

    /// With a different running dwell
    #[inline]
    #[must_use]
    pub fn with_pause_window(mut self, window: DwellWindow) -> Self {
        self.pause_window = window;
        self
    }

    /// With a different paused dwell
    #[inline]
    #[must_use]
    pub fn with_unpause_window(mut self, window: DwellWindow) -> Self {
        self.unpause_window = window;
        self
    }

    /// With a different stopped dwell
    #[inline]
    #[must_use]
    pub fn with_restart_window(mut self, window: DwellWindow) -> Self {
        self.restart_window = window;
        self
    }

    /// With a different stop chance
    #[inline]
    #[must_use]
    pub fn with_restart_probability(mut self, probability: f64) -> Self {
        self.restart_probability = probability;
        self
    }

    /// With a different address change chance
    #[inline]
    #[must_use]
    pub fn with_address_change_probability(mut self, probability: f64) -> Self {
        self.address_change_probability = probability;
        self
    }

    /// With a different restart budget
    #[inline]
    #[must_use]
    pub fn with_max_restarts(mut self, max: u32) -> Self {
        self.max_restarts = max;
        self
    }

    /// Tick as a duration
    #[inline]
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Check windows, probabilities and tick
    ///
    /// # Errors
    /// The first `ConfigError` found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroTickInterval);
        }
        self.start_window.validate("start")?;
        self.restart_gate_window.validate("restart_gate")?;
        self.pause_window.validate("pause")?;
        self.unpause_window.validate("unpause")?;
        self.restart_window.validate("restart")?;
        check_probability("restart_probability", self.restart_probability)?;
        check_probability("address_change_probability", self.address_change_probability)?;
        Ok(())
    }
}

impl Default for ChaosSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            tick_interval_ms: DEFAULT_TICK_MS,
            start_window: DwellWindow::from_secs(10, 30),
            restart_gate_window: DwellWindow::from_secs(30, 60),
            pause_window: DwellWindow::from_secs(5, 15),
            unpause_window: DwellWindow::from_secs(2, 8),
            restart_window: DwellWindow::from_secs(5, 10),
            restart_probability: 0.1,
            address_change_probability: 0.0,
            max_restarts: 3,
        }
    }
}

fn check_probability(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidProbability { name, value })
    }
}

/// Filters of one monitor, grouped by role
#[derive(Debug, Clone, Default)]
pub struct FilterSets {
    /// Report success when matched
    pub success: Vec<LogFilter>,
    /// Report failure when matched
    pub fail: Vec<LogFilter>,
    /// Archive triggers; each carries its own cursor
    pub monitor: Vec<LogFilter>,
    /// Must match before chaos starts
    pub start_gate: Vec<LogFilter>,
    /// Must match before stops are permitted
    pub restart_gate: Vec<LogFilter>,
}

impl FilterSets {
    fn all(&self) -> impl Iterator<Item = &LogFilter> {
        self.success
            .iter()
            .chain(&self.fail)
            .chain(&self.monitor)
            .chain(&self.start_gate)
            .chain(&self.restart_gate)
    }
}

/// Everything needed to monitor one entity
#[derive(Debug, Clone)]
pub struct MonitorSpec {
    /// Monitored entity
    pub entity: EntityId,
    /// Scene the entity's disruptions count against
    pub scene: Option<String>,
    /// Chaos knobs
    pub settings: ChaosSettings,
    /// Filters by role
    pub filters: FilterSets,
}

impl MonitorSpec {
    /// Spec with default settings and no filters
    #[must_use]
    pub fn new(entity: impl Into<EntityId>) -> Self {
        Self {
            entity: entity.into(),
            scene: None,
            settings: ChaosSettings::default(),
            filters: FilterSets::default(),
        }
    }

    /// Count disruptions against `scene`
    #[must_use]
    pub fn with_scene(mut self, scene: impl Into<String>) -> Self {
        self.scene = Some(scene.into());
        self
    }

    /// With these chaos knobs
    #[must_use]
    pub fn with_settings(mut self, settings: ChaosSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Filter reporting success
    #[must_use]
    pub fn add_success_filter(mut self, spec: FilterSpec) -> Self {
        let label = format!("success-{}", self.filters.success.len());
        self.filters.success.push(LogFilter::new(label, spec));
        self
    }

    /// Filter reporting failure
    #[must_use]
    pub fn add_fail_filter(mut self, spec: FilterSpec) -> Self {
        let label = format!("fail-{}", self.filters.fail.len());
        self.filters.fail.push(LogFilter::new(label, spec));
        self
    }

    /// Archive trigger writing into `archive_dir`
    #[must_use]
    pub fn add_monitor_filter(mut self, spec: FilterSpec, archive_dir: impl Into<PathBuf>) -> Self {
        let label = format!("monitor-{}", self.filters.monitor.len());
        self.filters
            .monitor
            .push(LogFilter::new(label, spec).with_archive_dir(archive_dir));
        self
    }

    /// Filter gating the start of chaos
    #[must_use]
    pub fn add_start_gate_filter(mut self, spec: FilterSpec) -> Self {
        let label = format!("start-gate-{}", self.filters.start_gate.len());
        self.filters.start_gate.push(LogFilter::new(label, spec));
        self
    }

    /// Filter gating stops
    #[must_use]
    pub fn add_restart_gate_filter(mut self, spec: FilterSpec) -> Self {
        let label = format!("restart-gate-{}", self.filters.restart_gate.len());
        self.filters.restart_gate.push(LogFilter::new(label, spec));
        self
    }

    /// Check settings and filters
    ///
    /// # Errors
    /// - `ConfigError::NoOutcomeFilters` without success and fail filters
    /// - `ConfigError::InvalidFilter` for broken patterns or a monitor filter
    ///   without archive directory
    /// - any error of [`ChaosSettings::validate`]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;

        if self.filters.success.is_empty() && self.filters.fail.is_empty() {
            return Err(ConfigError::NoOutcomeFilters(self.entity.clone()));
        }
        for filter in self.filters.all() {
            filter.validate()?;
        }
        if let Some(filter) = self.filters.monitor.iter().find(|f| f.archive_dir().is_none()) {
            return Err(FilterError::NoArchiveDir {
                label: filter.label().to_string(),
            }
            .into());
        }
        Ok(())
    }
}

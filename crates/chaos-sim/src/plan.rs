//! Chaos plans
//!
//! A plan is a TOML document declaring scenes, entities with their chaos
//! settings and filters, and the scripted output each entity's workload
//! produces. Windows are given as `{ min_ms, max_ms }` tables.
//!
//! ```toml
//! [[scenes]]
//! name = "validators"
//! max_stopped = 1
//! max_paused = 1
//! max_total = 1
//!
//! [[entities]]
//! id = "validator-1"
//! scene = "validators"
//! addresses = ["10.0.0.2", "10.0.0.12"]
//!
//! [entities.settings]
//! enabled = true
//! tick_interval_ms = 500
//!
//! [[entities.success]]
//! match_literal = "all tests passed"
//!
//! [entities.workload]
//! line_interval_ms = 400
//! lines = ["block 1", "block 2", "all tests passed"]
//! ```

use crate::error::ScenarioError;
use chaos_core::{ChaosSettings, EntityId, MonitorSpec, SceneLimits};
use chaos_filter::FilterSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default delay between two workload lines
pub const DEFAULT_LINE_INTERVAL_MS: u64 = 1_000;

/// A whole chaos run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChaosPlan {
    /// Scene declarations
    #[serde(default)]
    pub scenes: Vec<ScenePlan>,
    /// Entity declarations
    #[serde(default)]
    pub entities: Vec<EntityPlan>,
}

/// Scene declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenePlan {
    /// Scene name entities refer to
    pub name: String,
    /// Cap on stopped entities
    pub max_stopped: u32,
    /// Cap on paused entities
    pub max_paused: u32,
    /// Cap on paused plus stopped
    pub max_total: u32,
}

impl ScenePlan {
    /// Limits for the coordinator
    #[must_use]
    pub fn limits(&self) -> SceneLimits {
        SceneLimits::new(self.max_stopped, self.max_paused, self.max_total)
    }
}

/// Archive trigger declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivePlan {
    /// Trigger filter
    #[serde(flatten)]
    pub filter: FilterSpec,
    /// Where slices are written
    pub archive_dir: PathBuf,
}

/// Scripted output of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadPlan {
    /// Delay between lines
    pub line_interval_ms: u64,
    /// Lines in emission order
    pub lines: Vec<String>,
    /// Start over after the last line
    pub repeat: bool,
}

impl Default for WorkloadPlan {
    fn default() -> Self {
        Self {
            line_interval_ms: DEFAULT_LINE_INTERVAL_MS,
            lines: Vec::new(),
            repeat: false,
        }
    }
}

impl WorkloadPlan {
    /// Line delay, at least 1ms
    #[inline]
    #[must_use]
    pub fn line_interval(&self) -> Duration {
        Duration::from_millis(self.line_interval_ms.max(1))
    }
}

/// Entity declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPlan {
    /// Runtime id
    pub id: EntityId,
    /// Scene to count disruptions against
    #[serde(default)]
    pub scene: Option<String>,
    /// Address pool for re-addressing
    #[serde(default)]
    pub addresses: Vec<String>,
    /// Chaos knobs
    #[serde(default)]
    pub settings: ChaosSettings,
    /// Success filters
    #[serde(default)]
    pub success: Vec<FilterSpec>,
    /// Fail filters
    #[serde(default)]
    pub fail: Vec<FilterSpec>,
    /// Archive triggers
    #[serde(default)]
    pub monitor: Vec<ArchivePlan>,
    /// Start gate filters
    #[serde(default)]
    pub start_gate: Vec<FilterSpec>,
    /// Restart gate filters
    #[serde(default)]
    pub restart_gate: Vec<FilterSpec>,
    /// Scripted output
    #[serde(default)]
    pub workload: WorkloadPlan,
}

impl EntityPlan {
    /// Monitor spec for this entity
    #[must_use]
    pub fn monitor_spec(&self) -> MonitorSpec {
        let mut spec = MonitorSpec::new(self.id.clone()).with_settings(self.settings.clone());
        if let Some(scene) = &self.scene {
            spec = spec.with_scene(scene.clone());
        }
        for filter in &self.success {
            spec = spec.add_success_filter(filter.clone());
        }
        for filter in &self.fail {
            spec = spec.add_fail_filter(filter.clone());
        }
        for archive in &self.monitor {
            spec = spec.add_monitor_filter(archive.filter.clone(), archive.archive_dir.clone());
        }
        for filter in &self.start_gate {
            spec = spec.add_start_gate_filter(filter.clone());
        }
        for filter in &self.restart_gate {
            spec = spec.add_restart_gate_filter(filter.clone());
        }
        spec
    }
}

impl ChaosPlan {
    /// Parse a plan document
    ///
    /// # Errors
    /// `ScenarioError::Parse` on malformed TOML or schema mismatch.
    pub fn from_toml_str(text: &str) -> Result<Self, ScenarioError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a plan file
    ///
    /// # Errors
    /// `ScenarioError::Io` or `ScenarioError::Parse`.
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let text = std::fs::read_to_string(path).map_err(|e| ScenarioError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    /// Validated monitor specs, one per entity in declaration order
    ///
    /// # Errors
    /// - `ScenarioError::NoEntities` for an empty plan
    /// - `ScenarioError::DuplicateEntity` / `ScenarioError::UnknownScene`
    /// - `ScenarioError::Config` when a monitor spec is rejected
    pub fn monitor_specs(&self) -> Result<Vec<MonitorSpec>, ScenarioError> {
        if self.entities.is_empty() {
            return Err(ScenarioError::NoEntities);
        }
        let scenes: HashSet<&str> = self.scenes.iter().map(|s| s.name.as_str()).collect();
        let mut seen = HashSet::new();

        let mut specs = Vec::with_capacity(self.entities.len());
        for entity in &self.entities {
            if !seen.insert(&entity.id) {
                return Err(ScenarioError::DuplicateEntity(entity.id.clone()));
            }
            if let Some(scene) = &entity.scene {
                if !scenes.contains(scene.as_str()) {
                    return Err(ScenarioError::UnknownScene {
                        entity: entity.id.clone(),
                        scene: scene.clone(),
                    });
                }
            }
            let spec = entity.monitor_spec();
            spec.validate().map_err(|source| ScenarioError::Config {
                entity: entity.id.clone(),
                source,
            })?;
            specs.push(spec);
        }
        Ok(specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaos_core::DwellWindow;

    const PLAN: &str = r#"
        [[scenes]]
        name = "validators"
        max_stopped = 1
        max_paused = 2
        max_total = 2

        [[entities]]
        id = "validator-1"
        scene = "validators"
        addresses = ["10.0.0.2", "10.0.0.12"]

        [entities.settings]
        enabled = true
        tick_interval_ms = 500
        pause_window = { min_ms = 1000, max_ms = 3000 }
        restart_probability = 0.25

        [[entities.success]]
        match_literal = "height"
        extract_pattern = '^.*?height (?P<valueToGet>\d+)'

        [[entities.monitor]]
        match_literal = "WARN"
        archive_dir = "/tmp/chaos-archive"

        [entities.workload]
        lines = ["boot", "height 1"]
    "#;

    #[test]
    fn parses_full_entity() {
        let plan = ChaosPlan::from_toml_str(PLAN).unwrap();
        assert_eq!(plan.scenes[0].limits(), SceneLimits::new(1, 2, 2));

        let entity = &plan.entities[0];
        assert!(entity.settings.enabled);
        assert_eq!(entity.settings.pause_window, DwellWindow::from_millis(1000, 3000));
        // unspecified knobs keep their defaults
        assert_eq!(entity.settings.max_restarts, ChaosSettings::default().max_restarts);
        assert_eq!(entity.workload.line_interval_ms, DEFAULT_LINE_INTERVAL_MS);
        assert_eq!(entity.monitor[0].filter.match_literal, "WARN");

        let specs = plan.monitor_specs().unwrap();
        assert_eq!(specs[0].filters.success.len(), 1);
        assert_eq!(specs[0].filters.monitor[0].label(), "monitor-0");
    }

    #[test]
    fn rejects_unknown_scene() {
        let text = PLAN.replace("scene = \"validators\"", "scene = \"edge\"");
        let plan = ChaosPlan::from_toml_str(&text).unwrap();
        assert!(matches!(
            plan.monitor_specs(),
            Err(ScenarioError::UnknownScene { .. })
        ));
    }

    #[test]
    fn rejects_duplicates_and_empty_plans() {
        let mut plan = ChaosPlan::from_toml_str(PLAN).unwrap();
        plan.entities.push(plan.entities[0].clone());
        assert!(matches!(
            plan.monitor_specs(),
            Err(ScenarioError::DuplicateEntity(_))
        ));
        assert!(matches!(
            ChaosPlan::default().monitor_specs(),
            Err(ScenarioError::NoEntities)
        ));
    }

    #[test]
    fn surfaces_config_errors() {
        let text = PLAN.replace(r"(?P<valueToGet>\d+)", r"(\d+)");
        let plan = ChaosPlan::from_toml_str(&text).unwrap();
        assert!(matches!(
            plan.monitor_specs(),
            Err(ScenarioError::Config { .. })
        ));
    }

    #[test]
    fn malformed_toml() {
        assert!(matches!(
            ChaosPlan::from_toml_str("[[entities]\nid = 1"),
            Err(ScenarioError::Parse(_))
        ));
    }
}

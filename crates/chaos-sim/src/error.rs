//! Error types for plan loading and scenario runs

use chaos_core::{ChaosError, ConfigError, EntityId};
use std::path::PathBuf;

/// Scenario error type
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// Plan file could not be read
    #[error("cannot read plan {path}: {source}")]
    Io {
        /// Plan path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Plan is not valid TOML for the plan schema
    #[error("cannot parse plan: {0}")]
    Parse(#[from] toml::de::Error),

    /// Plan declares no entities
    #[error("plan declares no entities")]
    NoEntities,

    /// Entity declared twice
    #[error("entity declared twice: {0}")]
    DuplicateEntity(EntityId),

    /// Entity refers to a scene the plan does not declare
    #[error("entity {entity} refers to unknown scene '{scene}'")]
    UnknownScene {
        /// Declaring entity
        entity: EntityId,
        /// Undeclared scene name
        scene: String,
    },

    /// Monitor configuration of an entity is invalid
    #[error("entity {entity}: {source}")]
    Config {
        /// Declaring entity
        entity: EntityId,
        /// Validation error
        #[source]
        source: ConfigError,
    },

    /// Orchestrator refused an operation
    #[error(transparent)]
    Chaos(#[from] ChaosError),
}

impl ScenarioError {
    /// Create IO error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_scene_names_both_sides() {
        let err = ScenarioError::UnknownScene {
            entity: EntityId::new("node-1"),
            scene: "edge".to_string(),
        };
        assert_eq!(err.to_string(), "entity node-1 refers to unknown scene 'edge'");
    }

    #[test]
    fn config_error_keeps_entity() {
        let err = ScenarioError::Config {
            entity: EntityId::new("node-1"),
            source: ConfigError::ZeroTickInterval,
        };
        assert!(err.to_string().starts_with("entity node-1:"));
    }
}

//! Chaos orchestrator
//!
//! Owns the monitor registry and the shared scene coordinator:
//! - scene configuration
//! - starting a monitor task per entity (returns its event stream)
//! - stopping monitors, which return their entity to baseline first

use crate::error::ChaosError;
use crate::event::{event_channel, EventStream};
use crate::monitor::{Monitor, MonitorSummary};
use crate::runtime::ContainerRuntime;
use crate::scene::{SceneCoordinator, SceneLimits};
use crate::settings::MonitorSpec;
use crate::types::EntityId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Debug)]
struct MonitorHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<MonitorSummary>,
}

/// Entry point for running chaos against a set of entities
pub struct ChaosOrchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    scenes: Arc<SceneCoordinator>,
    monitors: DashMap<EntityId, MonitorHandle>,
}

impl ChaosOrchestrator {
    /// Create orchestrator with its own scene coordinator
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self::with_scenes(runtime, Arc::new(SceneCoordinator::new()))
    }

    /// Create orchestrator sharing an existing scene coordinator
    #[must_use]
    pub fn with_scenes(runtime: Arc<dyn ContainerRuntime>, scenes: Arc<SceneCoordinator>) -> Self {
        Self {
            runtime,
            scenes,
            monitors: DashMap::new(),
        }
    }

    /// Scene coordinator shared by all monitors
    #[inline]
    #[must_use]
    pub fn scenes(&self) -> &Arc<SceneCoordinator> {
        &self.scenes
    }

    /// Create or overwrite a scene
    pub fn configure_scene(&self, name: impl Into<String>, limits: SceneLimits) {
        self.scenes.configure(name, limits);
    }

    /// Validate `spec` and spawn its monitor task
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// - `ChaosError::Config` if the spec is invalid
    /// - `ChaosError::AlreadyMonitored` if the entity has a monitor
    pub fn start_monitor(&self, spec: MonitorSpec) -> Result<EventStream, ChaosError> {
        spec.validate()?;

        match self.monitors.entry(spec.entity.clone()) {
            Entry::Occupied(entry) => Err(ChaosError::AlreadyMonitored(entry.key().clone())),
            Entry::Vacant(slot) => {
                let (events_tx, events_rx) = event_channel();
                let (stop_tx, stop_rx) = oneshot::channel();
                let monitor = Monitor::new(
                    spec,
                    Arc::clone(&self.runtime),
                    Arc::clone(&self.scenes),
                    events_tx,
                );
                tracing::info!(entity = %slot.key(), "starting monitor");
                let task = tokio::spawn(monitor.run(stop_rx));
                slot.insert(MonitorHandle {
                    stop: stop_tx,
                    task,
                });
                Ok(events_rx)
            }
        }
    }

    /// Stop a monitor and wait for it to return the entity to baseline
    ///
    /// # Errors
    /// - `ChaosError::NotMonitored` if no monitor runs for `id`
    /// - `ChaosError::MonitorTask` if the task panicked
    pub async fn stop_monitor(&self, id: &EntityId) -> Result<MonitorSummary, ChaosError> {
        let (_, handle) = self
            .monitors
            .remove(id)
            .ok_or_else(|| ChaosError::NotMonitored(id.clone()))?;

        // A task that already exited has dropped its receiver
        let _ = handle.stop.send(());
        handle.task.await.map_err(|e| ChaosError::MonitorTask {
            entity: id.clone(),
            message: e.to_string(),
        })
    }

    /// Stop every monitor
    pub async fn stop_all(&self) -> Vec<Result<MonitorSummary, ChaosError>> {
        let ids = self.monitored();
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            results.push(self.stop_monitor(&id).await);
        }
        results
    }

    /// A monitor is registered for `id`
    #[must_use]
    pub fn is_monitoring(&self, id: &EntityId) -> bool {
        self.monitors.contains_key(id)
    }

    /// Entities with a running monitor, sorted
    #[must_use]
    pub fn monitored(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.monitors.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for ChaosOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaosOrchestrator")
            .field("scenes", &self.scenes.names())
            .field("monitors", &self.monitored())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockContainerRuntime;
    use crate::types::EntityStatus;
    use chaos_filter::FilterSpec;

    fn quiet_runtime() -> Arc<dyn ContainerRuntime> {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_inspect()
            .returning(|_| Ok(EntityStatus::running()));
        runtime
            .expect_read_full_output()
            .returning(|_| Ok(b"starting\n".to_vec()));
        Arc::new(runtime)
    }

    fn spec(id: &str) -> MonitorSpec {
        MonitorSpec::new(id).add_success_filter(FilterSpec::literal("DONE"))
    }

    #[tokio::test]
    async fn rejects_invalid_spec() {
        let orchestrator = ChaosOrchestrator::new(quiet_runtime());
        let result = orchestrator.start_monitor(MonitorSpec::new("bare"));
        assert!(matches!(result, Err(ChaosError::Config(_))));
        assert!(orchestrator.monitored().is_empty());
    }

    #[tokio::test]
    async fn one_monitor_per_entity() {
        let orchestrator = ChaosOrchestrator::new(quiet_runtime());
        let _events = orchestrator.start_monitor(spec("node-1")).unwrap();
        assert!(matches!(
            orchestrator.start_monitor(spec("node-1")),
            Err(ChaosError::AlreadyMonitored(_))
        ));
        assert!(orchestrator.is_monitoring(&EntityId::new("node-1")));

        let summary = orchestrator.stop_monitor(&EntityId::new("node-1")).await.unwrap();
        assert_eq!(summary.entity, EntityId::new("node-1"));
        assert!(!orchestrator.is_monitoring(&EntityId::new("node-1")));
    }

    #[tokio::test]
    async fn stop_unknown_entity() {
        let orchestrator = ChaosOrchestrator::new(quiet_runtime());
        let result = orchestrator.stop_monitor(&EntityId::new("ghost")).await;
        assert!(matches!(result, Err(ChaosError::NotMonitored(_))));
    }

    #[tokio::test]
    async fn stop_all_drains_registry() {
        let orchestrator = ChaosOrchestrator::new(quiet_runtime());
        let _a = orchestrator.start_monitor(spec("a")).unwrap();
        let _b = orchestrator.start_monitor(spec("b")).unwrap();
        assert_eq!(orchestrator.monitored(), vec![EntityId::new("a"), EntityId::new("b")]);

        let results = orchestrator.stop_all().await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(Result::is_ok));
        assert!(orchestrator.monitored().is_empty());
    }
}

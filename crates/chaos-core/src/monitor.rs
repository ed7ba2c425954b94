//! Per-entity monitor loop
//!
//! Every tick runs the same pipeline:
//! 1. inspect the entity and reject unhealthy states
//! 2. read its full output
//! 3. run archive triggers
//! 4. detect success/fail and emit the outcome event
//! 5. if chaos is enabled: open the start and restart gates, then pick and
//!    perform the next disruption once it is due
//!
//! Stopping the loop returns a paused or stopped entity to service before
//! the task exits.

use crate::error::{RuntimeError, StateMachineError};
use crate::event::{Event, EventSender};
use crate::runtime::ContainerRuntime;
use crate::scene::{Admission, SceneCoordinator};
use crate::scheduler::fires;
use crate::settings::MonitorSpec;
use crate::state_machine::{ChaosPhase, ChaosRuntimeState};
use crate::types::EntityId;
use chaos_filter::{match_and_archive, match_latest, LogFilter, LogTail};
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::Instrument;

/// A disruptive (or restoring) action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChaosAction {
    /// Freeze a running entity
    Pause,
    /// Resume a paused entity
    Unpause,
    /// Stop a running entity; spends restart budget
    Stop,
    /// Start a stopped entity, possibly at a new address
    Start,
}

impl fmt::Display for ChaosAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pause => "pause",
            Self::Unpause => "unpause",
            Self::Stop => "stop",
            Self::Start => "start",
        };
        f.write_str(name)
    }
}

/// How a tick ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Inspect, health or log retrieval failed; nothing else ran
    Faulted,
    /// Outcome reported; chaos disabled or not started yet
    Observed,
    /// Chaos active but the next action is not due
    Waiting,
    /// Scene admission rejected the action; retried on a later tick
    Deferred(ChaosAction),
    /// Action performed
    Acted(ChaosAction),
    /// Runtime call of the action failed
    ActionFailed(ChaosAction),
}

/// Final state reported when a monitor exits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSummary {
    /// Monitored entity
    pub entity: EntityId,
    /// Phase after the baseline restore
    pub phase: ChaosPhase,
    /// Ticks run, faulted ones included
    pub ticks: u64,
    /// Completed stop/start cycles
    pub restarts_performed: u32,
    /// Budget left for stops and starts
    pub restarts_remaining: u32,
}

#[derive(Debug, thiserror::Error)]
enum TickFault {
    #[error("inspect failed: {0}")]
    Inspect(#[source] RuntimeError),

    #[error("{0}")]
    Unhealthy(String),

    #[error("reading output failed: {0}")]
    ReadOutput(#[source] RuntimeError),

    #[error("{action} failed: {source}")]
    Action {
        action: ChaosAction,
        #[source]
        source: RuntimeError,
    },

    #[error(transparent)]
    Transition(#[from] StateMachineError),
}

impl TickFault {
    fn outcome(&self) -> TickOutcome {
        match self {
            Self::Action { action, .. } => TickOutcome::ActionFailed(*action),
            _ => TickOutcome::Faulted,
        }
    }
}

/// Chaos monitor of one entity
pub struct Monitor {
    spec: MonitorSpec,
    runtime: Arc<dyn ContainerRuntime>,
    scenes: Arc<SceneCoordinator>,
    events: EventSender,
    tail: LogTail,
    state: ChaosRuntimeState,
    address: Option<String>,
    ticks: u64,
}

impl Monitor {
    /// Create monitor; the spec is expected to be validated
    #[must_use]
    pub fn new(
        spec: MonitorSpec,
        runtime: Arc<dyn ContainerRuntime>,
        scenes: Arc<SceneCoordinator>,
        events: EventSender,
    ) -> Self {
        let state = ChaosRuntimeState::new(spec.settings.max_restarts, Instant::now());
        Self {
            spec,
            runtime,
            scenes,
            events,
            tail: LogTail::new(),
            state,
            address: None,
            ticks: 0,
        }
    }

    /// Monitored entity
    #[inline]
    #[must_use]
    pub fn entity(&self) -> &EntityId {
        &self.spec.entity
    }

    /// Current chaos bookkeeping
    #[inline]
    #[must_use]
    pub fn state(&self) -> &ChaosRuntimeState {
        &self.state
    }

    /// Monitor-filter cursors, in registration order
    #[must_use]
    pub fn archive_filters(&self) -> &[LogFilter] {
        &self.spec.filters.monitor
    }

    /// Run until `stop` fires (or its sender is dropped)
    ///
    /// The stop signal is only observed between ticks.
    pub async fn run(mut self, mut stop: oneshot::Receiver<()>) -> MonitorSummary {
        let span = tracing::info_span!("monitor", entity = %self.spec.entity);
        async move {
            tracing::info!(
                chaos = self.spec.settings.enabled,
                scene = ?self.spec.scene,
                "monitor started"
            );
            let mut interval = time::interval(self.spec.settings.tick_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop => break,
                    _ = interval.tick() => {
                        self.tick(Instant::now()).await;
                    }
                }
            }

            self.return_to_baseline().await;
            tracing::info!(ticks = self.ticks, "monitor stopped");
            self.summary()
        }
        .instrument(span)
        .await
    }

    /// Run one tick as of `now`
    pub async fn tick(&mut self, now: Instant) -> TickOutcome {
        self.ticks += 1;
        match self.try_tick(now).await {
            Ok(outcome) => outcome,
            Err(fault) => {
                tracing::warn!(error = %fault, "tick aborted");
                self.events
                    .emit(Event::error(self.spec.entity.clone(), fault.to_string()));
                fault.outcome()
            }
        }
    }

    /// Undo an in-progress disruption and release its scene slot
    pub async fn return_to_baseline(&mut self) -> Option<ChaosAction> {
        let action = match self.state.phase {
            ChaosPhase::Paused => ChaosAction::Unpause,
            ChaosPhase::Stopped => ChaosAction::Start,
            _ => return None,
        };

        let result = match action {
            ChaosAction::Unpause => self.runtime.unpause(&self.spec.entity).await,
            _ => self.runtime.start(&self.spec.entity).await,
        };
        // The slot goes back even if the call failed: nobody owns the entity afterwards
        self.release(action);

        match result {
            Ok(()) => {
                if let Err(err) = self.state.enter(ChaosPhase::Running) {
                    tracing::error!(error = %err, "baseline transition rejected");
                }
                tracing::info!(%action, "entity returned to baseline");
                Some(action)
            }
            Err(err) => {
                tracing::warn!(%action, error = %err, "could not return entity to baseline");
                self.events.emit(Event::error(
                    self.spec.entity.clone(),
                    format!("{action} on shutdown failed: {err}"),
                ));
                None
            }
        }
    }

    /// Final counters and phase
    #[must_use]
    pub fn summary(&self) -> MonitorSummary {
        MonitorSummary {
            entity: self.spec.entity.clone(),
            phase: self.state.phase,
            ticks: self.ticks,
            restarts_performed: self.state.restarts_performed,
            restarts_remaining: self.state.restarts_remaining,
        }
    }

    async fn try_tick(&mut self, now: Instant) -> Result<TickOutcome, TickFault> {
        if self.state.phase == ChaosPhase::Idle {
            self.arm(now)?;
        }

        let status = self
            .runtime
            .inspect(&self.spec.entity)
            .await
            .map_err(TickFault::Inspect)?;
        if status.address.is_some() {
            self.address.clone_from(&status.address);
        }
        if let Some(fault) = status.health_fault(self.state.phase == ChaosPhase::Stopped) {
            return Err(TickFault::Unhealthy(fault));
        }

        let raw = self
            .runtime
            .read_full_output(&self.spec.entity)
            .await
            .map_err(TickFault::ReadOutput)?;
        let archive = match_and_archive(&raw, &mut self.spec.filters.monitor);
        for record in &archive.archived {
            tracing::info!(filter = %record.label, path = %record.path.display(), "log slice archived");
        }
        for failure in &archive.failures {
            tracing::warn!(error = %failure, "archive trigger failed");
        }

        let fresh = self.tail.clean_incremental(&String::from_utf8_lossy(&raw));
        self.detect_outcome(&fresh);
        self.emit_outcome();

        if !self.spec.settings.enabled {
            return Ok(TickOutcome::Observed);
        }

        if match_latest(&fresh, &self.spec.filters.start_gate).is_some() {
            self.state.start_gate_seen = true;
        }
        if match_latest(&fresh, &self.spec.filters.restart_gate).is_some() {
            self.state.restart_gate_seen = true;
        }

        if self.state.phase == ChaosPhase::Armed {
            if !self.start_gate_open(now) {
                return Ok(TickOutcome::Observed);
            }
            self.state.enter(ChaosPhase::Running)?;
            self.state.next_event_at = now;
            tracing::info!("chaos started");
        }

        if !self.state.can_restart && self.restart_gate_open(now) {
            self.state.can_restart = true;
            tracing::debug!("restarts permitted");
        }

        if now < self.state.next_event_at {
            return Ok(TickOutcome::Waiting);
        }
        self.next_action(now).await
    }

    fn arm(&mut self, now: Instant) -> Result<(), StateMachineError> {
        self.state.enter(ChaosPhase::Armed)?;
        self.state.service_started_at = now;
        self.state.next_event_at = now;
        self.state.start_after = self.spec.settings.start_window.pick();
        self.state.restart_after = self.spec.settings.restart_gate_window.pick();
        Ok(())
    }

    fn start_gate_open(&self, now: Instant) -> bool {
        let waited = now.saturating_duration_since(self.state.service_started_at) >= self.state.start_after;
        waited && (self.spec.filters.start_gate.is_empty() || self.state.start_gate_seen)
    }

    fn restart_gate_open(&self, now: Instant) -> bool {
        let waited =
            now.saturating_duration_since(self.state.service_started_at) >= self.state.restart_after;
        waited && (self.spec.filters.restart_gate.is_empty() || self.state.restart_gate_seen)
    }

    fn detect_outcome(&mut self, fresh: &[String]) {
        if let Some(hit) = match_latest(fresh, &self.spec.filters.success) {
            tracing::debug!(filter = %hit.label, value = %hit.value, "success detected");
            self.state.last_found_success = Some(hit);
        } else if let Some(hit) = match_latest(fresh, &self.spec.filters.fail) {
            tracing::debug!(filter = %hit.label, value = %hit.value, "failure detected");
            self.state.last_found_fail = Some(hit);
        }
    }

    fn emit_outcome(&self) {
        let (hit, is_done, is_fail) = match (&self.state.last_found_success, &self.state.last_found_fail) {
            (Some(hit), _) => (Some(hit), true, false),
            (None, Some(hit)) => (Some(hit), false, true),
            (None, None) => (None, false, false),
        };
        let message = hit.map_or_else(|| self.state.phase.to_string(), |h| h.value.clone());

        let mut event = Event::outcome(self.spec.entity.clone(), message, is_done, is_fail)
            .with_meta("phase", self.state.phase.as_str())
            .with_meta("restarts_remaining", self.state.restarts_remaining.to_string())
            .with_meta("restarts_performed", self.state.restarts_performed.to_string());
        if let Some(hit) = hit {
            event = event.with_meta("label", hit.label.as_str());
        }
        if let Some(address) = &self.address {
            event = event.with_meta("address", address.as_str());
        }
        self.events.emit(event);
    }

    async fn next_action(&mut self, now: Instant) -> Result<TickOutcome, TickFault> {
        match self.state.phase {
            ChaosPhase::Paused => self.unpause(now).await,
            ChaosPhase::Stopped => self.restart(now).await,
            ChaosPhase::Running => {
                let settings = &self.spec.settings;
                if self.state.can_restart
                    && self.state.restarts_remaining > 0
                    && fires(settings.restart_probability)
                {
                    self.stop(now).await
                } else {
                    self.pause(now).await
                }
            }
            ChaosPhase::Idle | ChaosPhase::Armed => Ok(TickOutcome::Observed),
        }
    }

    async fn pause(&mut self, now: Instant) -> Result<TickOutcome, TickFault> {
        if self.reserve(ChaosAction::Pause).is_rejected() {
            tracing::debug!("pause deferred by scene");
            return Ok(TickOutcome::Deferred(ChaosAction::Pause));
        }
        self.call(ChaosAction::Pause).await?;
        self.state.enter(ChaosPhase::Paused)?;
        self.state.next_event_at = now + self.spec.settings.unpause_window.pick();
        tracing::info!("entity paused");
        Ok(TickOutcome::Acted(ChaosAction::Pause))
    }

    async fn unpause(&mut self, now: Instant) -> Result<TickOutcome, TickFault> {
        self.call(ChaosAction::Unpause).await?;
        self.release(ChaosAction::Unpause);
        self.state.enter(ChaosPhase::Running)?;
        self.state.next_event_at = now + self.spec.settings.pause_window.pick();
        tracing::info!("entity unpaused");
        Ok(TickOutcome::Acted(ChaosAction::Unpause))
    }

    async fn stop(&mut self, now: Instant) -> Result<TickOutcome, TickFault> {
        if self.reserve(ChaosAction::Stop).is_rejected() {
            tracing::debug!("stop deferred by scene");
            return Ok(TickOutcome::Deferred(ChaosAction::Stop));
        }
        self.call(ChaosAction::Stop).await?;
        self.state.enter(ChaosPhase::Stopped)?;
        self.state.restarts_remaining = self.state.restarts_remaining.saturating_sub(1);
        self.state.next_event_at = now + self.spec.settings.restart_window.pick();
        tracing::info!(remaining = self.state.restarts_remaining, "entity stopped");
        Ok(TickOutcome::Acted(ChaosAction::Stop))
    }

    async fn restart(&mut self, now: Instant) -> Result<TickOutcome, TickFault> {
        if fires(self.spec.settings.address_change_probability) {
            self.runtime
                .reconnect_to_next_address(&self.spec.entity)
                .await
                .map_err(|source| TickFault::Action {
                    action: ChaosAction::Start,
                    source,
                })?;
            tracing::info!("entity moved to next address");
        }
        self.call(ChaosAction::Start).await?;
        self.release(ChaosAction::Start);
        self.state.enter(ChaosPhase::Running)?;
        let restart_after = self.spec.settings.restart_gate_window.pick();
        self.state.record_restart(now, restart_after);
        self.state.next_event_at = now + self.spec.settings.pause_window.pick();
        tracing::info!(
            restarts = self.state.restarts_performed,
            remaining = self.state.restarts_remaining,
            "entity restarted"
        );
        Ok(TickOutcome::Acted(ChaosAction::Start))
    }

    async fn call(&self, action: ChaosAction) -> Result<(), TickFault> {
        let id = &self.spec.entity;
        let result = match action {
            ChaosAction::Pause => self.runtime.pause(id).await,
            ChaosAction::Unpause => self.runtime.unpause(id).await,
            ChaosAction::Stop => self.runtime.stop(id).await,
            ChaosAction::Start => self.runtime.start(id).await,
        };
        result.map_err(|source| TickFault::Action { action, source })
    }

    fn reserve(&self, action: ChaosAction) -> Admission {
        let Some(scene) = self.spec.scene.as_deref() else {
            return Admission::Admitted;
        };
        match action {
            ChaosAction::Pause => self.scenes.try_reserve_pause(scene),
            ChaosAction::Stop => self.scenes.try_reserve_stop(scene),
            ChaosAction::Unpause | ChaosAction::Start => Admission::Admitted,
        }
    }

    fn release(&self, action: ChaosAction) {
        let Some(scene) = self.spec.scene.as_deref() else {
            return;
        };
        match action {
            ChaosAction::Unpause => self.scenes.release_pause(scene),
            ChaosAction::Start => self.scenes.release_stop(scene),
            ChaosAction::Pause | ChaosAction::Stop => {}
        }
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("entity", &self.spec.entity)
            .field("phase", &self.state.phase)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeOp;
    use crate::event::event_channel;
    use crate::runtime::MockContainerRuntime;
    use crate::scene::SceneLimits;
    use crate::scheduler::DwellWindow;
    use crate::settings::ChaosSettings;
    use crate::types::EntityStatus;
    use chaos_filter::FilterSpec;
    use std::time::Duration;

    fn immediate_chaos() -> ChaosSettings {
        ChaosSettings::new()
            .enabled()
            .with_start_window(DwellWindow::from_millis(0, 0))
            .with_restart_gate_window(DwellWindow::from_millis(0, 0))
            .with_pause_window(DwellWindow::from_secs(10, 10))
            .with_unpause_window(DwellWindow::from_secs(4, 4))
            .with_restart_window(DwellWindow::from_secs(6, 6))
            .with_restart_probability(0.0)
    }

    fn spec(settings: ChaosSettings) -> MonitorSpec {
        MonitorSpec::new("node-1")
            .with_scene("net")
            .with_settings(settings)
            .add_success_filter(FilterSpec::literal("DONE"))
    }

    fn healthy_mock(log: &'static str) -> MockContainerRuntime {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_inspect()
            .returning(|_| Ok(EntityStatus::running()));
        runtime
            .expect_read_full_output()
            .returning(move |_| Ok(log.as_bytes().to_vec()));
        runtime
    }

    #[tokio::test]
    async fn dead_entity_reports_one_error_and_acts_not() {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_inspect().times(1).returning(|_| {
            Ok(EntityStatus {
                dead: true,
                ..EntityStatus::default()
            })
        });
        runtime.expect_read_full_output().never();
        runtime.expect_pause().never();
        runtime.expect_stop().never();

        let scenes = Arc::new(SceneCoordinator::new());
        scenes.configure("net", SceneLimits::new(1, 1, 1));
        let (tx, mut rx) = event_channel();
        let mut monitor = Monitor::new(spec(immediate_chaos()), Arc::new(runtime), scenes.clone(), tx);

        assert_eq!(monitor.tick(Instant::now()).await, TickOutcome::Faulted);
        let event = rx.try_recv().unwrap();
        assert!(event.is_error);
        assert!(event.message.contains("dead"));
        assert!(rx.try_recv().is_none());
        assert_eq!(scenes.snapshot("net").unwrap().disrupted(), 0);
    }

    #[tokio::test]
    async fn inspect_failure_aborts_tick() {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_inspect().returning(|id| {
            Err(RuntimeError::call_failed(RuntimeOp::Inspect, id, "socket closed"))
        });
        runtime.expect_read_full_output().never();

        let (tx, mut rx) = event_channel();
        let mut monitor = Monitor::new(
            spec(immediate_chaos()),
            Arc::new(runtime),
            Arc::new(SceneCoordinator::new()),
            tx,
        );

        assert_eq!(monitor.tick(Instant::now()).await, TickOutcome::Faulted);
        let event = rx.try_recv().unwrap();
        assert!(event.is_error);
        assert!(event.message.contains("socket closed"));
    }

    #[tokio::test]
    async fn log_read_failure_aborts_tick() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_inspect()
            .returning(|_| Ok(EntityStatus::running()));
        runtime
            .expect_read_full_output()
            .returning(|id| Err(RuntimeError::NotFound(id.clone())));
        runtime.expect_pause().never();

        let (tx, mut rx) = event_channel();
        let mut monitor = Monitor::new(
            spec(immediate_chaos()),
            Arc::new(runtime),
            Arc::new(SceneCoordinator::new()),
            tx,
        );

        assert_eq!(monitor.tick(Instant::now()).await, TickOutcome::Faulted);
        assert!(rx.try_recv().unwrap().message.contains("reading output failed"));
    }

    #[tokio::test]
    async fn failed_pause_keeps_reservation() {
        let mut runtime = healthy_mock("booting\n");
        runtime
            .expect_pause()
            .times(1)
            .returning(|id| Err(RuntimeError::call_failed(RuntimeOp::Pause, id, "busy")));

        let scenes = Arc::new(SceneCoordinator::new());
        scenes.configure("net", SceneLimits::new(1, 1, 1));
        let (tx, mut rx) = event_channel();
        let mut monitor = Monitor::new(spec(immediate_chaos()), Arc::new(runtime), scenes.clone(), tx);

        let outcome = monitor.tick(Instant::now()).await;
        assert_eq!(outcome, TickOutcome::ActionFailed(ChaosAction::Pause));
        assert_eq!(monitor.state().phase, ChaosPhase::Running);
        assert_eq!(scenes.snapshot("net").unwrap().paused, 1);

        // outcome event occupies the slot; the error event was dropped
        let event = rx.try_recv().unwrap();
        assert!(!event.is_error);
    }

    #[tokio::test]
    async fn pause_then_unpause_cycle() {
        let mut runtime = healthy_mock("booting\n");
        runtime.expect_pause().times(1).returning(|_| Ok(()));
        runtime.expect_unpause().times(1).returning(|_| Ok(()));

        let scenes = Arc::new(SceneCoordinator::new());
        scenes.configure("net", SceneLimits::new(1, 1, 1));
        let (tx, _rx) = event_channel();
        let mut monitor = Monitor::new(spec(immediate_chaos()), Arc::new(runtime), scenes.clone(), tx);

        let t0 = Instant::now();
        assert_eq!(monitor.tick(t0).await, TickOutcome::Acted(ChaosAction::Pause));
        assert_eq!(scenes.snapshot("net").unwrap().paused, 1);

        // unpause window is 4s
        assert_eq!(monitor.tick(t0 + Duration::from_secs(2)).await, TickOutcome::Waiting);
        assert_eq!(
            monitor.tick(t0 + Duration::from_secs(4)).await,
            TickOutcome::Acted(ChaosAction::Unpause)
        );
        assert_eq!(scenes.snapshot("net").unwrap().paused, 0);
        assert_eq!(monitor.state().next_event_at, t0 + Duration::from_secs(14));
    }

    #[tokio::test]
    async fn shutdown_restores_paused_entity() {
        let mut runtime = healthy_mock("booting\n");
        runtime.expect_pause().times(1).returning(|_| Ok(()));
        runtime.expect_unpause().times(1).returning(|_| Ok(()));

        let scenes = Arc::new(SceneCoordinator::new());
        scenes.configure("net", SceneLimits::new(1, 1, 1));
        let (tx, _rx) = event_channel();
        let mut monitor = Monitor::new(spec(immediate_chaos()), Arc::new(runtime), scenes.clone(), tx);

        monitor.tick(Instant::now()).await;
        assert_eq!(monitor.state().phase, ChaosPhase::Paused);

        assert_eq!(monitor.return_to_baseline().await, Some(ChaosAction::Unpause));
        assert_eq!(monitor.state().phase, ChaosPhase::Running);
        assert_eq!(scenes.snapshot("net").unwrap().disrupted(), 0);
        assert_eq!(monitor.return_to_baseline().await, None);
    }
}

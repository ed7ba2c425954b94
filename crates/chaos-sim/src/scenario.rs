//! Scenario runner
//!
//! Runs a [`ChaosPlan`] against a [`SimulatedRuntime`]: one monitor and one
//! workload task per entity, while scene counters are sampled to verify
//! that admission limits hold throughout and that every entity is back to
//! baseline once the monitors are stopped.

use crate::error::ScenarioError;
use crate::plan::{ChaosPlan, WorkloadPlan};
use crate::runtime::SimulatedRuntime;
use chaos_core::{ChaosOrchestrator, EntityId, Event, EventStream, RuntimeOp, SceneLimits};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Scenario run configuration
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// How long monitors run before they are stopped
    pub duration: Duration,
    /// How often scene counters are checked
    pub sample_interval: Duration,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(30),
            sample_interval: Duration::from_millis(100),
        }
    }
}

/// Broken guarantee observed during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// Scene counters above their limits
    SceneLimitExceeded {
        /// Scene name
        scene: String,
        /// Stop slots held
        stopped: u32,
        /// Pause slots held
        paused: u32,
    },
    /// Scene still holds reservations after all monitors stopped
    NotRestored {
        /// Scene name
        scene: String,
        /// Stop slots still held
        stopped: u32,
        /// Pause slots still held
        paused: u32,
    },
    /// Entity still paused or stopped after its monitor stopped
    EntityDisrupted {
        /// Entity left disrupted
        entity: EntityId,
    },
    /// Monitor could not be stopped cleanly
    MonitorFailed {
        /// Entity of the monitor
        entity: EntityId,
        /// Stop error
        message: String,
    },
}

/// Per-entity results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityReport {
    /// Entity
    pub entity: EntityId,
    /// Events received
    pub events: u64,
    /// Error events received
    pub errors: u64,
    /// A success filter matched
    pub done: bool,
    /// A fail filter matched
    pub failed: bool,
    /// Last outcome message
    pub last_message: Option<String>,
    /// Last error message
    pub last_error: Option<String>,
    /// Phase after shutdown
    pub phase: String,
    /// Ticks run
    pub ticks: u64,
    /// Successful pauses
    pub pauses: usize,
    /// Successful stops
    pub stops: usize,
    /// Successful re-addressings
    pub reconnects: usize,
    /// Completed stop/start cycles
    pub restarts_performed: u32,
    /// Budget left at shutdown
    pub restarts_remaining: u32,
}

impl EntityReport {
    fn new(entity: EntityId) -> Self {
        Self {
            entity,
            events: 0,
            errors: 0,
            done: false,
            failed: false,
            last_message: None,
            last_error: None,
            phase: String::new(),
            ticks: 0,
            pauses: 0,
            stops: 0,
            reconnects: 0,
            restarts_performed: 0,
            restarts_remaining: 0,
        }
    }

    fn observe(&mut self, event: &Event) {
        self.events += 1;
        if event.is_error {
            self.errors += 1;
            self.last_error = Some(event.message.clone());
        } else {
            self.done |= event.is_done;
            self.failed |= event.is_fail;
            self.last_message = Some(event.message.clone());
        }
    }
}

/// Per-scene results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneReport {
    /// Scene name
    pub name: String,
    /// Configured limits
    pub limits: SceneLimits,
    /// Most stopped at once
    pub peak_stopped: u32,
    /// Most paused at once
    pub peak_paused: u32,
    /// Most disrupted at once
    pub peak_disrupted: u32,
    /// Samples taken
    pub samples: u64,
}

/// Final report of a scenario run
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// Run length
    pub duration_ms: u64,
    /// Per-entity results
    pub entities: Vec<EntityReport>,
    /// Per-scene results
    pub scenes: Vec<SceneReport>,
    /// Limit and restore breaches
    pub violations: Vec<Violation>,
}

impl ScenarioReport {
    /// No guarantee was broken
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Pretty-printed JSON
    ///
    /// # Errors
    /// Serialization failure.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable summary
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== Chaos Scenario Report ===\n");
        let _ = writeln!(out, "Duration: {}ms", self.duration_ms);

        for e in &self.entities {
            let outcome = if e.done {
                "done"
            } else if e.failed {
                "failed"
            } else {
                "pending"
            };
            let _ = writeln!(
                out,
                "\n[{}] {} | phase {} | ticks {} | events {} (errors {})",
                e.entity, outcome, e.phase, e.ticks, e.events, e.errors
            );
            let _ = writeln!(
                out,
                "  pauses {} | stops {} | reconnects {} | restarts {} (remaining {})",
                e.pauses, e.stops, e.reconnects, e.restarts_performed, e.restarts_remaining
            );
            if let Some(message) = &e.last_message {
                let _ = writeln!(out, "  last value: {message}");
            }
            if let Some(error) = &e.last_error {
                let _ = writeln!(out, "  last error: {error}");
            }
        }

        for s in &self.scenes {
            let _ = writeln!(
                out,
                "\nScene {}: peak stopped {}/{} | paused {}/{} | total {}/{} ({} samples)",
                s.name,
                s.peak_stopped,
                s.limits.max_stopped,
                s.peak_paused,
                s.limits.max_paused,
                s.peak_disrupted,
                s.limits.max_total,
                s.samples
            );
        }

        let _ = writeln!(out, "\nViolations: {}", self.violations.len());
        for (i, v) in self.violations.iter().enumerate() {
            let _ = writeln!(out, "{}. {v:?}", i + 1);
        }
        let _ = writeln!(out, "Status: {}", if self.passed() { "PASSED" } else { "FAILED" });
        out
    }
}

/// Run `plan` for `config.duration`
///
/// Must be called from within a tokio runtime.
///
/// # Errors
/// Plan validation errors, or an orchestrator refusing a monitor.
pub async fn run_scenario(plan: &ChaosPlan, config: &ScenarioConfig) -> Result<ScenarioReport, ScenarioError> {
    let specs = plan.monitor_specs()?;

    let runtime = Arc::new(SimulatedRuntime::new());
    for entity in &plan.entities {
        runtime.add_entity(entity.id.clone(), entity.addresses.clone());
    }

    let orchestrator = ChaosOrchestrator::new(runtime.clone());
    for scene in &plan.scenes {
        orchestrator.configure_scene(scene.name.clone(), scene.limits());
    }
    let mut scenes: Vec<SceneReport> = plan
        .scenes
        .iter()
        .map(|s| SceneReport {
            name: s.name.clone(),
            limits: s.limits(),
            peak_stopped: 0,
            peak_paused: 0,
            peak_disrupted: 0,
            samples: 0,
        })
        .collect();

    let mut drains = Vec::with_capacity(specs.len());
    for spec in specs {
        let id = spec.entity.clone();
        let events = orchestrator.start_monitor(spec)?;
        drains.push(tokio::spawn(drain(id, events)));
    }

    let (stop_tx, workloads) = spawn_workloads(plan, &runtime);

    tracing::info!(
        entities = plan.entities.len(),
        scenes = plan.scenes.len(),
        duration = ?config.duration,
        "scenario started"
    );

    let mut violations = Vec::new();
    let deadline = time::sleep(config.duration);
    tokio::pin!(deadline);
    let mut sampler = time::interval(config.sample_interval);
    sampler.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = &mut deadline => break,
            _ = sampler.tick() => sample_scenes(&orchestrator, &mut scenes, &mut violations),
        }
    }

    drop(stop_tx);
    for workload in workloads {
        let _ = workload.await;
    }

    let mut summaries = BTreeMap::new();
    for id in orchestrator.monitored() {
        match orchestrator.stop_monitor(&id).await {
            Ok(summary) => {
                summaries.insert(id, summary);
            }
            Err(err) => violations.push(Violation::MonitorFailed {
                entity: id,
                message: err.to_string(),
            }),
        }
    }

    check_baseline(plan, &orchestrator, &runtime, &mut violations);

    let mut entities = Vec::with_capacity(drains.len());
    for handle in drains {
        match handle.await {
            Ok(mut report) => {
                let id = report.entity.clone();
                if let Some(summary) = summaries.get(&id) {
                    report.phase = summary.phase.to_string();
                    report.ticks = summary.ticks;
                    report.restarts_performed = summary.restarts_performed;
                    report.restarts_remaining = summary.restarts_remaining;
                }
                report.pauses = runtime.count_for(&id, RuntimeOp::Pause);
                report.stops = runtime.count_for(&id, RuntimeOp::Stop);
                report.reconnects = runtime.count_for(&id, RuntimeOp::Reconnect);
                entities.push(report);
            }
            Err(err) => tracing::error!(error = %err, "event drain task failed"),
        }
    }

    tracing::info!(violations = violations.len(), "scenario finished");
    Ok(ScenarioReport {
        duration_ms: u64::try_from(config.duration.as_millis()).unwrap_or(u64::MAX),
        entities,
        scenes,
        violations,
    })
}

/// Collect events until the monitor drops its sender
async fn drain(entity: EntityId, mut events: EventStream) -> EntityReport {
    let mut report = EntityReport::new(entity);
    while let Some(event) = events.recv().await {
        tracing::trace!(entity = %event.entity, message = %event.message, "event");
        report.observe(&event);
    }
    report
}

/// One task per entity with scripted output; they end when the sender drops
fn spawn_workloads(
    plan: &ChaosPlan,
    runtime: &Arc<SimulatedRuntime>,
) -> (watch::Sender<()>, Vec<JoinHandle<()>>) {
    let (stop_tx, stop_rx) = watch::channel(());
    let handles = plan
        .entities
        .iter()
        .filter(|e| !e.workload.lines.is_empty())
        .map(|e| {
            let runtime = Arc::clone(runtime);
            let id = e.id.clone();
            let workload = e.workload.clone();
            let mut stop = stop_rx.clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = play(&runtime, &id, &workload) => {}
                    _ = stop.changed() => {}
                }
            })
        })
        .collect();
    (stop_tx, handles)
}

/// Feed workload lines; lines produced while the entity is down are lost
async fn play(runtime: &SimulatedRuntime, id: &EntityId, workload: &WorkloadPlan) {
    let mut ticker = time::interval(workload.line_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        for line in &workload.lines {
            ticker.tick().await;
            match runtime.emit_line(id, line) {
                Ok(true) => {}
                Ok(false) => tracing::trace!(entity = %id, "entity down, line lost"),
                Err(err) => {
                    tracing::warn!(entity = %id, error = %err, "workload stopped");
                    return;
                }
            }
        }
        if !workload.repeat {
            return;
        }
    }
}

fn sample_scenes(orchestrator: &ChaosOrchestrator, scenes: &mut [SceneReport], violations: &mut Vec<Violation>) {
    for report in scenes {
        let Some(snapshot) = orchestrator.scenes().snapshot(&report.name) else {
            continue;
        };
        report.samples += 1;
        report.peak_stopped = report.peak_stopped.max(snapshot.stopped);
        report.peak_paused = report.peak_paused.max(snapshot.paused);
        report.peak_disrupted = report.peak_disrupted.max(snapshot.disrupted());
        if !snapshot.within_limits() {
            tracing::error!(scene = %report.name, ?snapshot, "scene limits exceeded");
            violations.push(Violation::SceneLimitExceeded {
                scene: report.name.clone(),
                stopped: snapshot.stopped,
                paused: snapshot.paused,
            });
        }
    }
}

fn check_baseline(
    plan: &ChaosPlan,
    orchestrator: &ChaosOrchestrator,
    runtime: &SimulatedRuntime,
    violations: &mut Vec<Violation>,
) {
    for scene in &plan.scenes {
        if let Some(snapshot) = orchestrator.scenes().snapshot(&scene.name) {
            if snapshot.disrupted() > 0 {
                violations.push(Violation::NotRestored {
                    scene: scene.name.clone(),
                    stopped: snapshot.stopped,
                    paused: snapshot.paused,
                });
            }
        }
    }
    for entity in &plan.entities {
        let disrupted = runtime
            .status(&entity.id)
            .is_some_and(|s| s.paused || !s.is_live());
        if disrupted {
            violations.push(Violation::EntityDisrupted {
                entity: entity.id.clone(),
            });
        }
    }
}

use chaos_core::event::event_channel;
use chaos_core::{
    ChaosAction, ChaosPhase, ChaosSettings, DwellWindow, EntityId, EventStream, Monitor, MonitorSpec,
    RuntimeOp, SceneCoordinator, SceneLimits, TickOutcome,
};
use chaos_filter::FilterSpec;
use chaos_sim::SimulatedRuntime;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const SCENE: &str = "net";

fn fixed(secs: u64) -> DwellWindow {
    DwellWindow::from_secs(secs, secs)
}

fn chaos() -> ChaosSettings {
    ChaosSettings::new()
        .enabled()
        .with_start_window(fixed(0))
        .with_restart_gate_window(fixed(0))
        .with_pause_window(fixed(10))
        .with_unpause_window(fixed(4))
        .with_restart_window(fixed(6))
        .with_restart_probability(0.0)
}

struct Harness {
    runtime: Arc<SimulatedRuntime>,
    scenes: Arc<SceneCoordinator>,
}

impl Harness {
    fn new(limits: SceneLimits) -> Self {
        let scenes = Arc::new(SceneCoordinator::new());
        scenes.configure(SCENE, limits);
        Self {
            runtime: Arc::new(SimulatedRuntime::new()),
            scenes,
        }
    }

    fn monitor(&self, spec: MonitorSpec) -> (Monitor, EventStream) {
        self.runtime.add_entity(
            spec.entity.clone(),
            vec!["10.0.0.2".to_string(), "10.0.0.3".to_string()],
        );
        let (tx, rx) = event_channel();
        let runtime: Arc<dyn chaos_core::ContainerRuntime> = self.runtime.clone();
        let monitor = Monitor::new(spec, runtime, Arc::clone(&self.scenes), tx);
        (monitor, rx)
    }

    fn snapshot(&self) -> (u32, u32) {
        let snap = self.scenes.snapshot(SCENE).unwrap();
        (snap.stopped, snap.paused)
    }
}

fn spec(id: &str, settings: ChaosSettings) -> MonitorSpec {
    MonitorSpec::new(id)
        .with_scene(SCENE)
        .with_settings(settings)
        .add_success_filter(FilterSpec::literal("DONE"))
}

#[tokio::test]
async fn stop_restart_cycle_moves_address_and_spends_budget() {
    let h = Harness::new(SceneLimits::new(1, 1, 1));
    let settings = chaos()
        .with_restart_probability(1.0)
        .with_address_change_probability(1.0)
        .with_max_restarts(2);
    let (mut monitor, mut events) = h.monitor(spec("node-1", settings));
    let id = EntityId::new("node-1");
    let t0 = Instant::now();

    assert_eq!(monitor.tick(t0).await, TickOutcome::Acted(ChaosAction::Stop));
    assert_eq!(monitor.state().phase, ChaosPhase::Stopped);
    assert_eq!(monitor.state().restarts_remaining, 1);
    assert_eq!(h.snapshot(), (1, 0));
    events.try_recv();

    // a stopped entity is expected to be down
    assert_eq!(monitor.tick(t0 + Duration::from_secs(2)).await, TickOutcome::Waiting);
    assert!(!events.try_recv().unwrap().is_error);

    let t1 = t0 + Duration::from_secs(6);
    assert_eq!(monitor.tick(t1).await, TickOutcome::Acted(ChaosAction::Start));
    assert_eq!(h.snapshot(), (0, 0));
    assert_eq!(monitor.state().restarts_performed, 1);
    // the start spends budget too
    assert_eq!(monitor.state().restarts_remaining, 0);
    assert!(!monitor.state().can_restart);
    assert_eq!(h.runtime.count_for(&id, RuntimeOp::Reconnect), 1);
    assert_eq!(
        h.runtime.status(&id).unwrap().address.as_deref(),
        Some("10.0.0.3")
    );

    // budget spent: the next disruption is a pause
    let t2 = t1 + Duration::from_secs(10);
    assert_eq!(monitor.tick(t2).await, TickOutcome::Acted(ChaosAction::Pause));
    assert_eq!(h.snapshot(), (0, 1));

    let summary = monitor.summary();
    assert_eq!(summary.restarts_performed, 1);
    assert_eq!(summary.restarts_remaining, 0);
}

#[tokio::test]
async fn failed_reconnect_aborts_the_start() {
    let h = Harness::new(SceneLimits::new(1, 1, 1));
    let settings = chaos()
        .with_restart_probability(1.0)
        .with_address_change_probability(1.0)
        .with_max_restarts(2);
    let (mut monitor, _events) = h.monitor(spec("node-1", settings));
    let id = EntityId::new("node-1");
    let t0 = Instant::now();

    assert_eq!(monitor.tick(t0).await, TickOutcome::Acted(ChaosAction::Stop));
    h.runtime.fail_next(&id, RuntimeOp::Reconnect, "no route").unwrap();

    let t1 = t0 + Duration::from_secs(6);
    assert_eq!(monitor.tick(t1).await, TickOutcome::ActionFailed(ChaosAction::Start));
    assert_eq!(monitor.state().phase, ChaosPhase::Stopped);
    assert_eq!(monitor.state().restarts_remaining, 1);
    assert_eq!(monitor.state().restarts_performed, 0);
    assert_eq!(h.snapshot(), (1, 0));
    assert!(!h.runtime.status(&id).unwrap().running);
    assert_eq!(h.runtime.count_for(&id, RuntimeOp::Start), 0);

    // still due, so the next tick retries the whole restart
    let t2 = t1 + Duration::from_secs(2);
    assert_eq!(monitor.tick(t2).await, TickOutcome::Acted(ChaosAction::Start));
    assert_eq!(monitor.state().phase, ChaosPhase::Running);
    assert_eq!(h.snapshot(), (0, 0));
    assert_eq!(h.runtime.count_for(&id, RuntimeOp::Reconnect), 1);
    assert_eq!(
        h.runtime.status(&id).unwrap().address.as_deref(),
        Some("10.0.0.3")
    );
}

#[tokio::test]
async fn scene_admits_one_disruption_at_a_time() {
    let h = Harness::new(SceneLimits::new(1, 1, 1));
    let (mut first, _first_events) = h.monitor(spec("node-1", chaos()));
    let (mut second, _second_events) = h.monitor(spec("node-2", chaos()));
    let t0 = Instant::now();

    assert_eq!(first.tick(t0).await, TickOutcome::Acted(ChaosAction::Pause));
    assert_eq!(second.tick(t0).await, TickOutcome::Deferred(ChaosAction::Pause));
    assert_eq!(second.state().phase, ChaosPhase::Running);
    assert_eq!(h.snapshot(), (0, 1));

    let t1 = t0 + Duration::from_secs(4);
    assert_eq!(first.tick(t1).await, TickOutcome::Acted(ChaosAction::Unpause));
    // deferred actions are retried on the next tick
    assert_eq!(second.tick(t1).await, TickOutcome::Acted(ChaosAction::Pause));
    assert_eq!(h.snapshot(), (0, 1));
    assert_eq!(h.runtime.count(RuntimeOp::Pause), 2);
}

#[tokio::test]
async fn disabled_chaos_only_reports() {
    let h = Harness::new(SceneLimits::new(1, 1, 1));
    let spec = MonitorSpec::new("node-1")
        .with_scene(SCENE)
        .add_fail_filter(FilterSpec::literal("fail counter:").with_extract(r"^.*?fail counter: (?P<valueToGet>\d+)"));
    let (mut monitor, mut events) = h.monitor(spec);
    let id = EntityId::new("node-1");

    h.runtime
        .append_output(&id, b"a\nb\nfail counter: 5\nc\nfail counter: 12\n")
        .unwrap();
    let t0 = Instant::now();
    assert_eq!(monitor.tick(t0).await, TickOutcome::Observed);

    let event = events.try_recv().unwrap();
    assert!(event.is_fail);
    assert!(!event.is_done);
    assert_eq!(event.message, "12");
    assert_eq!(event.metadata.get("label").map(String::as_str), Some("fail-0"));
    assert_eq!(event.metadata.get("address").map(String::as_str), Some("10.0.0.2"));

    // latched outcome is re-emitted without new output
    assert_eq!(monitor.tick(t0 + Duration::from_secs(60)).await, TickOutcome::Observed);
    assert_eq!(events.try_recv().unwrap().message, "12");

    for op in [RuntimeOp::Pause, RuntimeOp::Stop, RuntimeOp::Start, RuntimeOp::Unpause] {
        assert_eq!(h.runtime.count(op), 0);
    }
    assert_eq!(h.snapshot(), (0, 0));
}

#[tokio::test]
async fn success_wins_over_failure() {
    let h = Harness::new(SceneLimits::new(1, 1, 1));
    let spec = MonitorSpec::new("node-1")
        .add_success_filter(FilterSpec::literal("height").with_extract(r"^.*?height (?P<valueToGet>\d+)"))
        .add_fail_filter(FilterSpec::literal("panicked"));
    let (mut monitor, mut events) = h.monitor(spec);
    let id = EntityId::new("node-1");

    h.runtime.append_output(&id, b"height 3\nthread panicked\n").unwrap();
    monitor.tick(Instant::now()).await;

    let event = events.try_recv().unwrap();
    assert!(event.is_done);
    assert!(!event.is_fail);
    assert_eq!(event.message, "3");
}

#[tokio::test]
async fn start_gate_holds_chaos_until_matched() {
    let h = Harness::new(SceneLimits::new(1, 1, 1));
    let spec = spec("node-1", chaos()).add_start_gate_filter(FilterSpec::literal("listening on"));
    let (mut monitor, _events) = h.monitor(spec);
    let id = EntityId::new("node-1");
    let t0 = Instant::now();

    h.runtime.append_output(&id, b"booting\n").unwrap();
    assert_eq!(monitor.tick(t0).await, TickOutcome::Observed);
    assert_eq!(monitor.state().phase, ChaosPhase::Armed);

    h.runtime.append_output(&id, b"listening on :8080\n").unwrap();
    let t1 = t0 + Duration::from_secs(2);
    assert_eq!(monitor.tick(t1).await, TickOutcome::Acted(ChaosAction::Pause));

    // the gate latches: chaos keeps going without further matches
    assert_eq!(
        monitor.tick(t1 + Duration::from_secs(4)).await,
        TickOutcome::Acted(ChaosAction::Unpause)
    );
}

#[tokio::test]
async fn restart_gate_blocks_stops_until_matched() {
    let h = Harness::new(SceneLimits::new(1, 1, 2));
    let settings = chaos().with_restart_probability(1.0);
    let spec = spec("node-1", settings).add_restart_gate_filter(FilterSpec::literal("synced"));
    let (mut monitor, _events) = h.monitor(spec);
    let id = EntityId::new("node-1");
    let t0 = Instant::now();

    assert_eq!(monitor.tick(t0).await, TickOutcome::Acted(ChaosAction::Pause));
    assert!(!monitor.state().can_restart);

    h.runtime.append_output(&id, b"synced\n").unwrap();
    let t1 = t0 + Duration::from_secs(4);
    assert_eq!(monitor.tick(t1).await, TickOutcome::Acted(ChaosAction::Unpause));
    assert!(monitor.state().can_restart);

    let t2 = t1 + Duration::from_secs(10);
    assert_eq!(monitor.tick(t2).await, TickOutcome::Acted(ChaosAction::Stop));
}

#[tokio::test]
async fn failed_stop_keeps_reservation_and_budget() {
    let h = Harness::new(SceneLimits::new(1, 1, 2));
    let settings = chaos().with_restart_probability(1.0).with_max_restarts(2);
    let (mut monitor, mut events) = h.monitor(spec("node-1", settings));
    let id = EntityId::new("node-1");
    h.runtime.fail_next(&id, RuntimeOp::Stop, "daemon busy").unwrap();
    let t0 = Instant::now();

    assert_eq!(monitor.tick(t0).await, TickOutcome::ActionFailed(ChaosAction::Stop));
    assert_eq!(monitor.state().phase, ChaosPhase::Running);
    assert_eq!(monitor.state().restarts_remaining, 2);
    assert_eq!(h.snapshot(), (1, 0));
    assert!(h.runtime.status(&id).unwrap().running);
    // the outcome event holds the slot
    assert!(!events.try_recv().unwrap().is_error);

    // the stop slot is still held, so the retry is deferred
    assert_eq!(
        monitor.tick(t0 + Duration::from_secs(2)).await,
        TickOutcome::Deferred(ChaosAction::Stop)
    );
}

#[tokio::test]
async fn crash_is_reported_with_exit_code() {
    let h = Harness::new(SceneLimits::new(1, 1, 1));
    let (mut monitor, mut events) = h.monitor(spec("node-1", chaos()));
    let id = EntityId::new("node-1");

    h.runtime.mark_dead(&id, 2).unwrap();
    assert_eq!(monitor.tick(Instant::now()).await, TickOutcome::Faulted);

    let event = events.try_recv().unwrap();
    assert!(event.is_error);
    assert!(event.message.contains("exit code 2"));
    assert_eq!(h.runtime.count(RuntimeOp::ReadOutput), 0);
    assert_eq!(h.snapshot(), (0, 0));
}

#[tokio::test]
async fn archive_trigger_runs_every_tick() {
    let archive = tempfile::tempdir().unwrap();
    let h = Harness::new(SceneLimits::new(1, 1, 1));
    let spec = MonitorSpec::new("node-1")
        .add_success_filter(FilterSpec::literal("DONE"))
        .add_monitor_filter(FilterSpec::literal("WARN"), archive.path());
    let (mut monitor, _events) = h.monitor(spec);
    let id = EntityId::new("node-1");
    let t0 = Instant::now();

    h.runtime.append_output(&id, b"start\nWARN disk\n").unwrap();
    monitor.tick(t0).await;
    h.runtime.append_output(&id, b"ok\n").unwrap();
    monitor.tick(t0 + Duration::from_secs(2)).await;
    h.runtime.append_output(&id, b"WARN again\n").unwrap();
    monitor.tick(t0 + Duration::from_secs(4)).await;

    let second = std::fs::read_to_string(archive.path().join("log.1.log")).unwrap();
    assert_eq!(second, "ok\nWARN again\n");
    assert_eq!(monitor.archive_filters()[0].cursor(), "start\nWARN disk\nok\nWARN again\n".len());
}

#[tokio::test]
async fn binary_output_is_archived_verbatim() {
    let archive = tempfile::tempdir().unwrap();
    let h = Harness::new(SceneLimits::new(1, 1, 1));
    let spec = MonitorSpec::new("node-1")
        .add_success_filter(FilterSpec::literal("DONE"))
        .add_monitor_filter(FilterSpec::literal("PANIC"), archive.path());
    let (mut monitor, _events) = h.monitor(spec);
    let id = EntityId::new("node-1");

    let output: &[u8] = b"bin \xff\xfe\nPANIC\n";
    h.runtime.append_output(&id, output).unwrap();
    monitor.tick(Instant::now()).await;

    let written = std::fs::read(archive.path().join("log.0.log")).unwrap();
    assert_eq!(written, output);
    assert_eq!(monitor.archive_filters()[0].cursor(), output.len());
}

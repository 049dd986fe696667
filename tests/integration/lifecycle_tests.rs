//! Startup ordering, shutdown idempotence, and end-to-end presses on
//! simulated lines.

use std::sync::Arc;
use std::time::Duration;

use edgetrigger::adapters::sim::{PressProfile, SimLineDriver, SimSignalPin, SimTriggerLine, spawn_sim_presses};
use edgetrigger::adapters::time::MonotonicClock;
use edgetrigger::app::dispatcher::Admission;
use edgetrigger::app::events::{DispatchEvent, Edge, EdgeEvent, Level};
use edgetrigger::app::lifecycle::{Lifecycle, Runtime};
use edgetrigger::config::{DispatcherConfig, PulsePattern, TriggerDirection};
use edgetrigger::error::{ModelLoadError, StartupError};
use edgetrigger::events::CancelToken;

use super::mock_hw::{MockLoader, MockSession, RecordingSink, StaticInput, wait_until};

type TestRuntime = Runtime<SimTriggerLine, SimSignalPin, MockSession, StaticInput, RecordingSink>;

fn config() -> DispatcherConfig {
    let mut c = DispatcherConfig::default();
    c.trigger.debounce_ms = 20;
    c.trigger.direction = TriggerDirection::Rising;
    c.milestones.model_load = Some(PulsePattern::single(1, 1));
    c.milestones.inference_start = Some(PulsePattern::single(1, 0));
    c.fault_backoff_ms = 10;
    c
}

struct Rig {
    driver: SimLineDriver,
    pin: SimSignalPin,
    sink: Arc<RecordingSink>,
    cancel: CancelToken,
}

fn start(
    config: &DispatcherConfig,
    loader: &MockLoader,
) -> (Result<TestRuntime, StartupError>, Rig) {
    let (line, driver) = SimTriggerLine::new(config.trigger.gpio, Level::Low);
    let pin = SimSignalPin::new();
    let sink = RecordingSink::new();
    let cancel = CancelToken::new();
    let runtime = Lifecycle::start(
        config,
        line,
        pin.clone(),
        loader,
        StaticInput,
        Arc::clone(&sink),
        MonotonicClock::new(),
        cancel.clone(),
    );
    (
        runtime,
        Rig {
            driver,
            pin,
            sink,
            cancel,
        },
    )
}

/// Run until `done` holds (or a generous timeout), then cancel.
fn run_until(runtime: &mut TestRuntime, rig: &Rig, done: impl Fn() -> bool + Send + 'static) {
    let cancel = rig.cancel.clone();
    let watcher = std::thread::spawn(move || {
        let ok = wait_until(Duration::from_secs(5), done);
        cancel.cancel();
        ok
    });
    runtime.run();
    assert!(watcher.join().unwrap(), "condition not reached before timeout");
}

fn quick_press() -> PressProfile {
    PressProfile {
        bounces: 3,
        bounce_gap: Duration::from_millis(2),
        hold: Duration::from_millis(100),
        period: Duration::from_millis(100),
    }
}

#[test]
fn model_load_failure_arms_nothing_and_releases_lines() {
    let loader = MockLoader::failing_load(ModelLoadError::NotFound);
    let (result, rig) = start(&config(), &loader);

    assert!(matches!(
        result,
        Err(StartupError::ModelLoad(ModelLoadError::NotFound))
    ));
    assert_eq!(rig.driver.arm_calls(), 0, "no interrupt armed");
    assert!(rig.driver.is_released());
    assert_eq!(rig.pin.level(), Level::Low);
    assert_eq!(loader.counter.invokes(), 0);
}

#[test]
fn cold_inference_failure_is_fatal_before_arming() {
    let mut loader = MockLoader::new(Duration::ZERO);
    loader.fail_invoke = true;
    let (result, rig) = start(&config(), &loader);

    assert!(matches!(result, Err(StartupError::ColdInference(_))));
    assert_eq!(rig.driver.arm_calls(), 0);
    assert!(rig.driver.is_released());
    assert_eq!(rig.pin.level(), Level::Low);
}

#[test]
fn startup_order_marks_load_and_runs_cold_inference() {
    let loader = MockLoader::new(Duration::ZERO);
    let (result, rig) = start(&config(), &loader);
    let mut runtime = result.unwrap();

    assert!(rig.driver.is_armed());
    assert_eq!(loader.counter.invokes(), 1, "cold inference ran");
    // Only the model-load marker so far; the cold run does not pulse.
    assert_eq!(rig.pin.rising_edges(), 1);
    let events = rig.sink.events();
    assert!(matches!(events[0], DispatchEvent::Started));
    assert!(matches!(events[1], DispatchEvent::ColdStart(_)));

    runtime.shutdown().unwrap();
}

#[test]
fn cold_inference_can_be_disabled() {
    let mut c = config();
    c.cold_inference = false;
    let loader = MockLoader::new(Duration::ZERO);
    let (result, _rig) = start(&c, &loader);
    let _runtime = result.unwrap();
    assert_eq!(loader.counter.invokes(), 0);
}

#[test]
fn shutdown_twice_is_idempotent() {
    let loader = MockLoader::new(Duration::ZERO);
    let (result, rig) = start(&config(), &loader);
    let mut runtime = result.unwrap();

    runtime.shutdown().unwrap();
    let history = rig.pin.history();
    runtime.shutdown().unwrap();

    assert!(runtime.is_shut_down());
    assert_eq!(rig.pin.history(), history, "second shutdown touched nothing");
    assert_eq!(rig.pin.level(), Level::Low);
    assert!(rig.driver.is_released());
    assert!(!rig.driver.is_armed());
    assert!(!runtime.dispatcher().has_session());
    assert_eq!(rig.sink.shutdowns(), 1);
    assert!(rig.cancel.is_cancelled());
}

#[test]
fn edge_pending_at_shutdown_is_reported() {
    let loader = MockLoader::new(Duration::ZERO);
    let (result, rig) = start(&config(), &loader);
    let mut runtime = result.unwrap();

    // Accepted but never served: run() is not called.
    let edge = EdgeEvent {
        timestamp_us: 42_000,
        direction: Edge::Rising,
    };
    assert_eq!(runtime.gate().on_edge(edge, &*rig.sink), Admission::Accepted);
    runtime.shutdown().unwrap();

    let events = rig.sink.events();
    let n = events.len();
    assert!(n >= 2);
    assert!(
        matches!(events[n - 2], DispatchEvent::Discarded { edge: e } if e == edge),
        "pending edge not reported: {:?}",
        events
    );
    assert!(matches!(events[n - 1], DispatchEvent::Shutdown));
    assert_eq!(loader.counter.invokes(), 1, "only the cold inference ran");
}

#[test]
fn drop_releases_lines() {
    let loader = MockLoader::new(Duration::ZERO);
    let (result, rig) = start(&config(), &loader);
    drop(result.unwrap());

    assert!(rig.driver.is_released());
    assert_eq!(rig.pin.level(), Level::Low);
    assert_eq!(rig.sink.shutdowns(), 1);
}

#[test]
fn bouncy_press_triggers_exactly_one_inference() {
    let loader = MockLoader::new(Duration::from_millis(5));
    let (result, rig) = start(&config(), &loader);
    let mut runtime = result.unwrap();

    spawn_sim_presses(rig.driver.clone(), Level::Low, quick_press(), 1, rig.cancel.clone()).unwrap();

    let gate = Arc::clone(runtime.gate());
    run_until(&mut runtime, &rig, move || gate.stats().completed >= 1);
    // Let any stray confirmation from the release chatter surface.
    std::thread::sleep(Duration::from_millis(100));
    runtime.shutdown().unwrap();

    assert_eq!(rig.sink.completed(), 1);
    assert_eq!(rig.sink.skipped(), 0);
    assert_eq!(loader.counter.invokes(), 2, "cold + one press");
    let completed = rig
        .sink
        .events()
        .into_iter()
        .find_map(|e| match e {
            DispatchEvent::Completed { edge, .. } => Some(edge),
            _ => None,
        })
        .unwrap();
    assert_eq!(completed.direction, Edge::Rising);
    // Model-load marker + one inference-start marker.
    assert_eq!(rig.pin.rising_edges(), 2);
    assert_eq!(rig.pin.level(), Level::Low);
}

#[test]
fn either_direction_fires_on_press_and_release() {
    let mut c = config();
    c.trigger.direction = TriggerDirection::Either;
    let loader = MockLoader::new(Duration::ZERO);
    let (result, rig) = start(&c, &loader);
    let mut runtime = result.unwrap();

    spawn_sim_presses(rig.driver.clone(), Level::Low, quick_press(), 1, rig.cancel.clone()).unwrap();

    let gate = Arc::clone(runtime.gate());
    run_until(&mut runtime, &rig, move || gate.stats().completed >= 2);
    runtime.shutdown().unwrap();

    let directions: Vec<Edge> = rig
        .sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            DispatchEvent::Completed { edge, .. } => Some(edge.direction),
            _ => None,
        })
        .collect();
    assert_eq!(directions, [Edge::Rising, Edge::Falling]);
}

#[test]
fn line_read_faults_are_retried() {
    let loader = MockLoader::new(Duration::ZERO);
    let (result, rig) = start(&config(), &loader);
    let mut runtime = result.unwrap();

    // Idle sampling on every poll timeout consumes the faults.
    rig.driver.fail_reads(3);
    assert!(
        wait_until(Duration::from_secs(5), || rig.driver.pending_read_faults() == 0),
        "edge-rx stopped sampling after a fault"
    );
    assert!(rig.driver.is_armed(), "faults must not disarm the line");

    spawn_sim_presses(rig.driver.clone(), Level::Low, quick_press(), 1, rig.cancel.clone()).unwrap();

    let gate = Arc::clone(runtime.gate());
    run_until(&mut runtime, &rig, move || gate.stats().completed >= 1);
    runtime.shutdown().unwrap();

    assert_eq!(rig.sink.completed(), 1);
    assert_eq!(rig.sink.failed(), 0);
    assert_eq!(rig.driver.arm_calls(), 1);
    assert!(runtime.line().is_some(), "edge-rx exited cleanly and returned the line");
}

#[test]
fn read_faults_during_a_press_do_not_lose_it() {
    let loader = MockLoader::new(Duration::ZERO);
    let (result, rig) = start(&config(), &loader);
    let mut runtime = result.unwrap();

    // The faulted samples land on the contact chatter; the level must be
    // re-read after each back-off rather than waiting for fresh activity.
    rig.driver.fail_reads(3);
    spawn_sim_presses(rig.driver.clone(), Level::Low, quick_press(), 1, rig.cancel.clone()).unwrap();

    let gate = Arc::clone(runtime.gate());
    run_until(&mut runtime, &rig, move || gate.stats().completed >= 1);
    runtime.shutdown().unwrap();

    assert_eq!(rig.driver.pending_read_faults(), 0);
    assert_eq!(rig.sink.completed(), 1);
}

#[test]
fn disabled_signal_line_never_pulses() {
    let mut c = config();
    c.signal.enabled = false;
    let loader = MockLoader::new(Duration::ZERO);
    let (result, rig) = start(&c, &loader);
    let mut runtime = result.unwrap();

    spawn_sim_presses(rig.driver.clone(), Level::Low, quick_press(), 1, rig.cancel.clone()).unwrap();
    let gate = Arc::clone(runtime.gate());
    run_until(&mut runtime, &rig, move || gate.stats().completed >= 1);
    runtime.shutdown().unwrap();

    assert_eq!(rig.pin.rising_edges(), 0);
    assert_eq!(rig.pin.history(), [Level::Low, Level::Low]);
}

//! Single-flight dispatch across the edge-receive / worker split.

use std::sync::Arc;
use std::time::Duration;

use edgetrigger::adapters::sim::SimSignalPin;
use edgetrigger::app::dispatcher::{Admission, DispatchState, Dispatcher, TriggerGate};
use edgetrigger::app::events::{DispatchEvent, Edge, EdgeEvent};
use edgetrigger::config::DispatcherConfig;
use edgetrigger::drivers::signal::SignalCorrelator;
use edgetrigger::events::CancelToken;

use super::mock_hw::{MockLoader, RecordingSink, StaticInput, wait_until};

fn edge(ts: u64) -> EdgeEvent {
    EdgeEvent {
        timestamp_us: ts,
        direction: Edge::Rising,
    }
}

fn quick_config() -> DispatcherConfig {
    let mut c = DispatcherConfig::default();
    c.milestones.inference_start = Some(edgetrigger::config::PulsePattern::single(1, 0));
    c
}

#[test]
fn second_edge_during_long_inference_is_skipped() {
    let loader = MockLoader::new(Duration::from_millis(200));
    let counter = Arc::clone(&loader.counter);
    let sink = RecordingSink::new();
    let gate = Arc::new(TriggerGate::new());
    let pin = SimSignalPin::new();
    let mut dispatcher = Dispatcher::new(
        Arc::clone(&gate),
        loader.session(),
        SignalCorrelator::new(pin.clone(), 2).unwrap(),
        StaticInput,
        Arc::clone(&sink),
        &quick_config(),
    );

    let cancel = CancelToken::new();
    let edge_side = {
        let gate = Arc::clone(&gate);
        let sink = Arc::clone(&sink);
        let cancel = cancel.clone();
        std::thread::spawn(move || {
            let first = gate.on_edge(edge(0), &*sink);
            std::thread::sleep(Duration::from_millis(5));
            let second = gate.on_edge(edge(5_000), &*sink);
            assert!(wait_until(Duration::from_secs(5), || gate.stats().completed == 1));
            cancel.cancel();
            (first, second)
        })
    };

    dispatcher.serve(&cancel);
    let (first, second) = edge_side.join().unwrap();

    assert_eq!(first, Admission::Accepted);
    assert_eq!(second, Admission::Skipped);
    assert_eq!(counter.invokes(), 1, "exactly one invoke");
    assert_eq!(sink.skipped(), 1);
    assert_eq!(sink.completed(), 1);
    assert!(matches!(
        sink.events()[0],
        DispatchEvent::Skipped { edge } if edge.timestamp_us == 5_000
    ));
    assert_eq!(gate.state(), DispatchState::Idle);
    assert_eq!(pin.rising_edges(), 1, "one start marker for one invoke");
}

#[test]
fn concurrent_edges_never_overlap_invokes() {
    let loader = MockLoader::new(Duration::from_millis(2));
    let counter = Arc::clone(&loader.counter);
    let sink = RecordingSink::new();
    let gate = Arc::new(TriggerGate::new());
    let mut config = quick_config();
    config.milestones.inference_start = None;
    let mut dispatcher = Dispatcher::new(
        Arc::clone(&gate),
        loader.session(),
        SignalCorrelator::new(SimSignalPin::new(), 2).unwrap(),
        StaticInput,
        Arc::clone(&sink),
        &config,
    );

    let cancel = CancelToken::new();
    let producers: Vec<_> = (0..4u64)
        .map(|t| {
            let gate = Arc::clone(&gate);
            let sink = Arc::clone(&sink);
            std::thread::spawn(move || {
                for i in 0..50u64 {
                    gate.on_edge(edge(t * 1_000_000 + i), &*sink);
                    std::thread::sleep(Duration::from_micros(300));
                }
            })
        })
        .collect();

    let closer = {
        let gate = Arc::clone(&gate);
        let cancel = cancel.clone();
        std::thread::spawn(move || {
            for p in producers {
                p.join().unwrap();
            }
            assert!(wait_until(Duration::from_secs(5), || {
                let s = gate.stats();
                s.completed == s.accepted
            }));
            cancel.cancel();
        })
    };

    dispatcher.serve(&cancel);
    closer.join().unwrap();

    let stats = gate.stats();
    assert_eq!(stats.accepted + stats.skipped, 200);
    assert_eq!(counter.invokes(), stats.accepted);
    assert_eq!(counter.max_in_flight(), 1);
    assert_eq!(sink.skipped() as u32, stats.skipped);
}

#[test]
fn failures_are_reported_and_dispatch_continues() {
    let mut loader = MockLoader::new(Duration::ZERO);
    loader.fail_invoke = true;
    let sink = RecordingSink::new();
    let mut dispatcher = Dispatcher::new(
        Arc::new(TriggerGate::new()),
        loader.session(),
        SignalCorrelator::new(SimSignalPin::new(), 2).unwrap(),
        StaticInput,
        Arc::clone(&sink),
        &quick_config(),
    );

    for i in 0..3 {
        assert_eq!(dispatcher.on_edge(edge(i)), Admission::Accepted);
    }
    assert_eq!(sink.failed(), 3);
    assert_eq!(dispatcher.gate().stats().failed, 3);
    assert_eq!(dispatcher.gate().state(), DispatchState::Idle);
}

//! Startup, idle wait, and ordered shutdown.
//!
//! ```text
//!  start:    signal low → model-load marker → load → cold inference
//!            → arm input → spawn edge-rx
//!  run:      Dispatcher::serve until cancelled
//!  shutdown: close gate → cancel → join edge-rx → drop pending edge
//!            → signal low → release input → drop session
//! ```
//!
//! Every line acquired during `start` is released again on every error
//! path. After a successful start the [`Runtime`] owns the lines and
//! releases them in [`Runtime::shutdown`] or, failing that, on drop.

use core::time::Duration;
use std::sync::Arc;
use std::thread::JoinHandle;

use embedded_hal::digital::OutputPin;
use log::{error, info, warn};

use crate::config::DispatcherConfig;
use crate::drivers::edge_detector::EdgeDetector;
use crate::drivers::signal::SignalCorrelator;
use crate::drivers::task_pin::{self, Core};
use crate::error::{HardwareFault, StartupError};
use crate::events::CancelToken;

use super::dispatcher::{DispatchStats, Dispatcher, TriggerGate};
use super::events::DispatchEvent;
use super::ports::{Clock, InferenceSession, InputSource, ModelLoader, ResultSink, TriggerLine};

/// Longest the edge thread sleeps before re-checking cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(100);

const EDGE_RX_PRIORITY: u8 = 10;
const EDGE_RX_STACK_KB: usize = 8;

pub struct Lifecycle;

impl Lifecycle {
    /// Bring the dispatcher up.
    ///
    /// Returns only once the model is loaded, the cold inference has run
    /// and the input line is armed. Any failure releases what was taken
    /// and is fatal to the caller.
    pub fn start<L, P, M, I, R, C>(
        config: &DispatcherConfig,
        mut line: L,
        pin: P,
        loader: &M,
        input: I,
        sink: Arc<R>,
        clock: C,
        cancel: CancelToken,
    ) -> Result<Runtime<L, P, M::Session, I, R>, StartupError>
    where
        L: TriggerLine + 'static,
        P: OutputPin,
        M: ModelLoader,
        M::Session: 'static,
        I: InputSource,
        R: ResultSink + 'static,
        C: Clock + 'static,
    {
        // ── 1. Output line low ──
        let mut signal = match SignalCorrelator::new(pin, config.signal.gpio) {
            Ok(s) => s,
            Err(fault) => {
                line.release();
                return Err(fault.into());
            }
        };

        // ── 2. Model load (marked) ──
        if config.signal.enabled {
            if let Some(pattern) = config.milestones.model_load {
                if let Err(fault) = signal.mark_pattern(&pattern) {
                    abort_start(&mut line, &mut signal);
                    return Err(fault.into());
                }
            }
        }

        info!("lifecycle: loading model {}", config.engine.model_path);
        let session = match loader.load(&config.engine.model_path) {
            Ok(s) => s,
            Err(e) => {
                error!("lifecycle: model load failed: {}", e);
                abort_start(&mut line, &mut signal);
                return Err(e.into());
            }
        };
        sink.emit(&DispatchEvent::Started);

        let gate = Arc::new(TriggerGate::new());
        let mut dispatcher = Dispatcher::new(
            Arc::clone(&gate),
            session,
            signal,
            input,
            Arc::clone(&sink),
            config,
        );

        // ── 3. Cold inference ──
        if config.cold_inference {
            if let Err(e) = dispatcher.run_cold() {
                error!("lifecycle: cold inference failed: {}", e);
                abort_dispatch(&mut line, &mut dispatcher);
                return Err(StartupError::ColdInference(e));
            }
        }

        // ── 4. Arm input ──
        let initial = match line.level().and_then(|level| {
            line.arm(config.trigger.direction)?;
            Ok(level)
        }) {
            Ok(level) => level,
            Err(fault) => {
                error!("lifecycle: arming trigger failed: {}", fault);
                abort_dispatch(&mut line, &mut dispatcher);
                return Err(fault.into());
            }
        };
        info!(
            "lifecycle: trigger GPIO{} armed ({:?}, {}ms debounce, idle {:?})",
            line.pin(),
            config.trigger.direction,
            config.trigger.debounce_ms,
            initial
        );

        // ── 5. Edge receive thread ──
        let detector = EdgeDetector::new(
            Duration::from_millis(u64::from(config.trigger.debounce_ms)),
            config.trigger.direction,
            initial,
        );
        let receiver = EdgeReceiver {
            line,
            detector,
            gate: Arc::clone(&gate),
            sink: Arc::clone(&sink),
            clock,
            cancel: cancel.clone(),
            backoff: Duration::from_millis(u64::from(config.fault_backoff_ms)),
            resample: false,
        };
        let edge_rx = match task_pin::spawn_on_core(
            Core::App,
            EDGE_RX_PRIORITY,
            EDGE_RX_STACK_KB,
            "edge-rx\0",
            move || receiver.run(),
        ) {
            Ok(handle) => handle,
            Err(e) => {
                // The closure, and the line with it, was dropped by the
                // failed spawn.
                error!("lifecycle: edge thread spawn failed: {}", e);
                if let Err(fault) = dispatcher.release_signal() {
                    error!("lifecycle: signal release failed: {}", fault);
                }
                dispatcher.release_session();
                return Err(StartupError::ThreadSpawn);
            }
        };

        Ok(Runtime {
            dispatcher,
            gate,
            sink,
            cancel,
            edge_rx: Some(edge_rx),
            line: None,
            shut_down: false,
        })
    }
}

fn abort_start<L: TriggerLine, P: OutputPin>(line: &mut L, signal: &mut SignalCorrelator<P>) {
    if let Err(fault) = signal.release() {
        error!("lifecycle: signal release failed: {}", fault);
    }
    line.release();
}

fn abort_dispatch<L, S, P, I, R>(line: &mut L, dispatcher: &mut Dispatcher<S, P, I, R>)
where
    L: TriggerLine,
    S: InferenceSession,
    P: OutputPin,
    I: InputSource,
    R: ResultSink,
{
    line.disarm();
    if let Err(fault) = dispatcher.release_signal() {
        error!("lifecycle: signal release failed: {}", fault);
    }
    line.release();
    dispatcher.release_session();
}

// ───────────────────────────────────────────────────────────────
// Edge receive loop
// ───────────────────────────────────────────────────────────────

struct EdgeReceiver<L, R, C> {
    line: L,
    detector: EdgeDetector,
    gate: Arc<TriggerGate>,
    sink: Arc<R>,
    clock: C,
    cancel: CancelToken,
    backoff: Duration,
    /// The last sample failed; take the next one without waiting, since
    /// the activity that prompted it has already been consumed.
    resample: bool,
}

impl<L, R, C> EdgeReceiver<L, R, C>
where
    L: TriggerLine,
    R: ResultSink,
    C: Clock,
{
    /// Feed line activity through the detector into the gate until
    /// cancelled, then disarm and hand the line back.
    fn run(mut self) -> L {
        while !self.cancel.is_cancelled() {
            match self.step() {
                Ok(()) => self.resample = false,
                Err(fault) => {
                    error!("edge-rx: {} (retry in {:?})", fault, self.backoff);
                    self.resample = true;
                    std::thread::sleep(self.backoff);
                }
            }
        }
        self.line.disarm();
        info!(
            "edge-rx: stopped ({} bounces rejected)",
            self.detector.bounces()
        );
        self.line
    }

    fn step(&mut self) -> Result<(), HardwareFault> {
        if !self.resample {
            self.wait()?;
        }
        if let Some(edge) = self.detector.poll(&mut self.line, &self.clock)? {
            self.gate.on_edge(edge, &*self.sink);
        }
        Ok(())
    }

    fn wait(&mut self) -> Result<(), HardwareFault> {
        let timeout = match self.detector.deadline_us() {
            Some(deadline) => {
                Duration::from_micros(deadline.saturating_sub(self.clock.now_us())).min(CANCEL_POLL)
            }
            None => CANCEL_POLL,
        };
        self.line.wait_for_activity(timeout)?;
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Runtime
// ───────────────────────────────────────────────────────────────

/// A started dispatcher. Owns every line and the session until
/// [`shutdown`](Self::shutdown).
pub struct Runtime<L, P, S, I, R>
where
    L: TriggerLine,
    P: OutputPin,
    S: InferenceSession,
    I: InputSource,
    R: ResultSink,
{
    dispatcher: Dispatcher<S, P, I, R>,
    gate: Arc<TriggerGate>,
    sink: Arc<R>,
    cancel: CancelToken,
    edge_rx: Option<JoinHandle<L>>,
    line: Option<L>,
    shut_down: bool,
}

impl<L, P, S, I, R> Runtime<L, P, S, I, R>
where
    L: TriggerLine,
    P: OutputPin,
    S: InferenceSession,
    I: InputSource,
    R: ResultSink,
{
    /// Idle wait: process accepted edges until cancellation.
    pub fn run(&mut self) {
        if self.shut_down {
            warn!("lifecycle: run after shutdown ignored");
            return;
        }
        self.dispatcher.serve(&self.cancel);
    }

    /// Release everything in order. Safe to call more than once; only the
    /// first call has an effect. Returns the signal-line release fault, if any.
    pub fn shutdown(&mut self) -> Result<(), HardwareFault> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        info!("lifecycle: shutting down");

        self.gate.close();
        self.cancel.cancel();

        if let Some(handle) = self.edge_rx.take() {
            match handle.join() {
                Ok(line) => self.line = Some(line),
                Err(_) => error!("lifecycle: edge-rx thread panicked"),
            }
        }

        if let Some(edge) = self.gate.discard_pending() {
            warn!(
                "lifecycle: discarded accepted edge at {}us",
                edge.timestamp_us
            );
            self.sink.emit(&DispatchEvent::Discarded { edge });
        }

        let result = self.dispatcher.release_signal();
        if let Err(fault) = result {
            error!("lifecycle: signal release failed: {}", fault);
        }
        if let Some(line) = self.line.as_mut() {
            line.release();
        }
        self.dispatcher.release_session();

        let stats = self.gate.stats();
        info!(
            "lifecycle: done (accepted={} skipped={} completed={} failed={})",
            stats.accepted, stats.skipped, stats.completed, stats.failed
        );
        self.sink.emit(&DispatchEvent::Shutdown);
        result
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn gate(&self) -> &Arc<TriggerGate> {
        &self.gate
    }

    pub fn stats(&self) -> DispatchStats {
        self.gate.stats()
    }

    pub fn dispatcher(&self) -> &Dispatcher<S, P, I, R> {
        &self.dispatcher
    }

    /// The input line, once shutdown has reclaimed it from edge-rx.
    pub fn line(&self) -> Option<&L> {
        self.line.as_ref()
    }
}

impl<L, P, S, I, R> Drop for Runtime<L, P, S, I, R>
where
    L: TriggerLine,
    P: OutputPin,
    S: InferenceSession,
    I: InputSource,
    R: ResultSink,
{
    fn drop(&mut self) {
        if let Err(fault) = self.shutdown() {
            error!("lifecycle: shutdown on drop: {}", fault);
        }
    }
}

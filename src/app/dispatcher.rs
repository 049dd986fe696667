//! Single-flight inference dispatch.
//!
//! ```text
//!  edge-rx thread                      main thread
//!  ──────────────                      ───────────
//!  EdgeDetector ──▶ TriggerGate::on_edge
//!                    │  CAS busy IDLE→BUSY
//!                    ├─ ok   ─▶ EdgeSlot ─▶ Dispatcher::serve ─▶ process
//!                    └─ busy ─▶ Skipped ─▶ ResultSink             │
//!                                              BusyGuard drop ◀───┘
//! ```
//!
//! The [`TriggerGate`] is the only state shared between the two
//! contexts. Admission is a single `compare_exchange` on the busy flag,
//! so two near-simultaneous edges can never both observe IDLE. The flag
//! goes back to IDLE only when the [`BusyGuard`] held by
//! [`Dispatcher::process`] drops, i.e. after the inference call has
//! returned and its outcome has been reported.
//!
//! Edges that arrive while BUSY are dropped, counted, and reported as
//! [`DispatchEvent::Skipped`]. Nothing queues.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use embedded_hal::digital::OutputPin;
use log::{debug, info, warn};

use crate::config::{DispatcherConfig, PulsePattern};
use crate::drivers::signal::SignalCorrelator;
use crate::error::{Error, HardwareFault, InferenceError};
use crate::events::{CancelToken, EdgeSlot, Wake, wait_for_edge_or_cancel};

use super::events::{DispatchEvent, EdgeEvent, InferenceReport};
use super::ports::{InferenceSession, InputSource, ResultSink};

// ───────────────────────────────────────────────────────────────
// Gate
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Busy,
}

/// Outcome of offering an edge to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Gate was IDLE; it is now BUSY and the edge is in the slot.
    Accepted,
    /// An inference was in flight; the edge was dropped and reported.
    Skipped,
    /// Shutdown has begun; the edge was ignored.
    Closed,
}

/// Per-edge counters since start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub accepted: u32,
    pub skipped: u32,
    pub completed: u32,
    pub failed: u32,
}

/// Admission control shared by the edge-receive thread and the worker.
pub struct TriggerGate {
    busy: AtomicBool,
    accepting: AtomicBool,
    slot: EdgeSlot,
    accepted: AtomicU32,
    skipped: AtomicU32,
    completed: AtomicU32,
    failed: AtomicU32,
}

impl Default for TriggerGate {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerGate {
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            accepting: AtomicBool::new(true),
            slot: EdgeSlot::new(),
            accepted: AtomicU32::new(0),
            skipped: AtomicU32::new(0),
            completed: AtomicU32::new(0),
            failed: AtomicU32::new(0),
        }
    }

    /// Offer a confirmed edge. Never blocks.
    pub fn on_edge(&self, edge: EdgeEvent, sink: &impl ResultSink) -> Admission {
        if !self.accepting.load(Ordering::Acquire) {
            debug!("gate: closed, ignoring edge at {}us", edge.timestamp_us);
            return Admission::Closed;
        }

        match self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                self.slot.post(edge);
                Admission::Accepted
            }
            Err(_) => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                sink.emit(&DispatchEvent::Skipped { edge });
                Admission::Skipped
            }
        }
    }

    /// Stop admitting edges. Idempotent.
    pub fn close(&self) {
        if self.accepting.swap(false, Ordering::AcqRel) {
            info!("gate: closed");
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub fn state(&self) -> DispatchState {
        if self.busy.load(Ordering::Acquire) {
            DispatchState::Busy
        } else {
            DispatchState::Idle
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Drop an accepted edge the worker never picked up, returning the
    /// gate to IDLE. Used on shutdown.
    pub fn discard_pending(&self) -> Option<EdgeEvent> {
        let edge = self.slot.try_take()?;
        self.busy.store(false, Ordering::Release);
        Some(edge)
    }

    pub(crate) fn slot(&self) -> &EdgeSlot {
        &self.slot
    }

    fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Holds the gate BUSY for the lifetime of one accepted edge.
///
/// Dropping it, on any path including unwinding, returns the gate to IDLE.
pub struct BusyGuard<'a> {
    gate: &'a TriggerGate,
}

impl<'a> BusyGuard<'a> {
    /// Take over the BUSY flag set by a successful admission.
    pub fn adopt(gate: &'a TriggerGate) -> Self {
        debug_assert_eq!(gate.state(), DispatchState::Busy);
        Self { gate }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

// ───────────────────────────────────────────────────────────────
// Dispatcher (worker side)
// ───────────────────────────────────────────────────────────────

/// Runs accepted edges through capture → preprocess → mark → invoke.
///
/// Owns the inference session, the signal correlator, and the input
/// source. Every call into the session goes through `&mut self`, which
/// serialises them without a lock.
pub struct Dispatcher<S, P, I, R>
where
    S: InferenceSession,
    P: OutputPin,
    I: InputSource,
    R: ResultSink,
{
    gate: Arc<TriggerGate>,
    session: Option<S>,
    signal: SignalCorrelator<P>,
    input: I,
    sink: Arc<R>,
    top_k: usize,
    threshold: f32,
    start_marker: Option<PulsePattern>,
}

impl<S, P, I, R> Dispatcher<S, P, I, R>
where
    S: InferenceSession,
    P: OutputPin,
    I: InputSource,
    R: ResultSink,
{
    pub fn new(
        gate: Arc<TriggerGate>,
        session: S,
        signal: SignalCorrelator<P>,
        input: I,
        sink: Arc<R>,
        config: &DispatcherConfig,
    ) -> Self {
        let start_marker = if config.signal.enabled {
            config.milestones.inference_start
        } else {
            None
        };
        Self {
            gate,
            session: Some(session),
            signal,
            input,
            sink,
            top_k: config.engine.top_k,
            threshold: config.engine.threshold,
            start_marker,
        }
    }

    /// Block on accepted edges until `cancel` fires.
    pub fn serve(&mut self, cancel: &CancelToken) {
        info!("dispatcher: waiting for edges");
        loop {
            match wait_for_edge_or_cancel(self.gate.slot(), cancel) {
                Wake::Edge(edge) => self.process(edge),
                Wake::Cancelled => break,
            }
        }
        info!("dispatcher: cancelled");
    }

    /// Run one edge the gate has already accepted, report the outcome,
    /// and return the gate to IDLE.
    pub fn process(&mut self, edge: EdgeEvent) {
        let gate = Arc::clone(&self.gate);
        let _busy = BusyGuard::adopt(&gate);

        match self.infer(true) {
            Ok(report) => {
                gate.completed.fetch_add(1, Ordering::Relaxed);
                self.sink.emit(&DispatchEvent::Completed { edge, report });
            }
            Err(error) => {
                gate.failed.fetch_add(1, Ordering::Relaxed);
                self.sink.emit(&DispatchEvent::Failed { edge, error });
            }
        }
    }

    /// Admission and processing in one call, for single-context use.
    pub fn on_edge(&mut self, edge: EdgeEvent) -> Admission {
        let admission = self.gate.on_edge(edge, &*self.sink);
        if admission == Admission::Accepted {
            let edge = self.gate.slot().try_take().unwrap_or(edge);
            self.process(edge);
        }
        admission
    }

    /// Unmeasured warm-up inference. Absorbs first-call latency (lazy
    /// allocation, cache fill) before steady-state timing starts, so it
    /// never pulses the signal line.
    pub fn run_cold(&mut self) -> Result<InferenceReport, Error> {
        let report = self.infer(false)?;
        info!("dispatcher: cold inference took {:.1}ms", report.elapsed_ms());
        self.sink.emit(&DispatchEvent::ColdStart(report.clone()));
        Ok(report)
    }

    pub fn gate(&self) -> &Arc<TriggerGate> {
        &self.gate
    }

    pub fn signal(&self) -> &SignalCorrelator<P> {
        &self.signal
    }

    /// Drive the output line low and give it up. Idempotent.
    pub fn release_signal(&mut self) -> Result<(), HardwareFault> {
        self.signal.release()
    }

    /// Drop the session. Idempotent; later edges fail with
    /// [`InferenceError::InvokeFailed`].
    pub fn release_session(&mut self) -> bool {
        self.session.take().is_some()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    fn infer(&mut self, mark: bool) -> Result<InferenceReport, Error> {
        let session = self
            .session
            .as_mut()
            .ok_or(Error::Inference(InferenceError::InvokeFailed))?;

        let image = self.input.capture()?;
        let prepared = session.prepare_input(&image)?;

        let marker = if mark { self.start_marker } else { None };
        if let Some(pattern) = marker {
            if let Err(fault) = self.signal.mark_pattern(&pattern) {
                warn!("dispatcher: start marker failed, not invoking: {}", fault);
                return Err(fault.into());
            }
        }

        let started = Instant::now();
        let result = session.invoke(&prepared, self.top_k, self.threshold)?;
        Ok(InferenceReport {
            elapsed: started.elapsed(),
            result,
        })
    }
}

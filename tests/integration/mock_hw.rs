//! Mock engine and sink adapters for integration tests.
//!
//! Lines come from the library's own simulation adapters
//! (`SimTriggerLine`, `SimSignalPin`); this module supplies the
//! inference side with controllable latency and failures, plus a sink
//! that records every event.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use edgetrigger::app::classify::ClassificationResult;
use edgetrigger::app::events::DispatchEvent;
use edgetrigger::app::ports::{
    InferenceSession, InputSource, ModelLoader, PreparedInput, ResultSink,
};
use edgetrigger::error::{InferenceError, ModelLoadError, PreprocessError};

// ── Recording sink ────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DispatchEvent>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<DispatchEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&DispatchEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    pub fn completed(&self) -> usize {
        self.count(|e| matches!(e, DispatchEvent::Completed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|e| matches!(e, DispatchEvent::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|e| matches!(e, DispatchEvent::Failed { .. }))
    }

    pub fn shutdowns(&self) -> usize {
        self.count(|e| matches!(e, DispatchEvent::Shutdown))
    }
}

impl ResultSink for RecordingSink {
    fn emit(&self, event: &DispatchEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ── Mock engine ───────────────────────────────────────────────

/// Shared view of what the session has been asked to do.
#[derive(Default)]
pub struct InvokeCounter {
    pub invokes: AtomicU32,
    /// Calls currently inside `invoke`; must never exceed one.
    pub in_flight: AtomicU32,
    pub max_in_flight: AtomicU32,
}

#[allow(dead_code)]
impl InvokeCounter {
    pub fn invokes(&self) -> u32 {
        self.invokes.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

pub struct MockLoader {
    pub counter: Arc<InvokeCounter>,
    pub latency: Duration,
    pub load_error: Option<ModelLoadError>,
    pub fail_invoke: bool,
}

#[allow(dead_code)]
impl MockLoader {
    pub fn new(latency: Duration) -> Self {
        Self {
            counter: Arc::new(InvokeCounter::default()),
            latency,
            load_error: None,
            fail_invoke: false,
        }
    }

    pub fn failing_load(err: ModelLoadError) -> Self {
        Self {
            load_error: Some(err),
            ..Self::new(Duration::ZERO)
        }
    }

    pub fn session(&self) -> MockSession {
        MockSession {
            counter: Arc::clone(&self.counter),
            latency: self.latency,
            fail_invoke: self.fail_invoke,
        }
    }
}

impl ModelLoader for MockLoader {
    type Session = MockSession;

    fn load(&self, _model_path: &str) -> Result<MockSession, ModelLoadError> {
        match self.load_error {
            Some(e) => Err(e),
            None => Ok(self.session()),
        }
    }
}

pub struct MockSession {
    counter: Arc<InvokeCounter>,
    latency: Duration,
    fail_invoke: bool,
}

impl InferenceSession for MockSession {
    fn prepare_input(&mut self, image: &[u8]) -> Result<PreparedInput, PreprocessError> {
        Ok(PreparedInput {
            width: image.len(),
            height: 1,
            channels: 1,
            data: image.to_vec(),
        })
    }

    fn invoke(
        &mut self,
        _input: &PreparedInput,
        top_k: usize,
        threshold: f32,
    ) -> Result<ClassificationResult, InferenceError> {
        let now = self.counter.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counter.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.counter.invokes.fetch_add(1, Ordering::SeqCst);

        let until = Instant::now() + self.latency;
        while Instant::now() < until {
            std::thread::sleep(Duration::from_millis(1));
        }

        self.counter.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.fail_invoke {
            return Err(InferenceError::InvokeFailed);
        }
        Ok(ClassificationResult::from_scores(&[0.1, 0.9], top_k, threshold))
    }
}

// ── Input ─────────────────────────────────────────────────────

pub struct StaticInput;

impl InputSource for StaticInput {
    fn capture(&mut self) -> Result<Vec<u8>, PreprocessError> {
        Ok(vec![0x80; 12])
    }
}

// ── Helpers ───────────────────────────────────────────────────

/// Poll `cond` until it holds or `timeout` passes.
#[allow(dead_code)]
pub fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

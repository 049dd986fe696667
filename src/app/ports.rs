//! Port traits: the hexagonal boundary between the dispatch core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Dispatcher / Lifecycle (domain)
//! ```
//!
//! Driven adapters (GPIO lines, clock, inference engine, input source,
//! result sink) implement these traits. The core consumes them via
//! generics, so it never touches hardware or an interpreter directly.
//!
//! The output line is not a port of its own: any
//! [`embedded_hal::digital::OutputPin`] works, see
//! [`SignalCorrelator`](crate::drivers::signal::SignalCorrelator).

use core::time::Duration;

use crate::config::TriggerDirection;
use crate::error::{HardwareFault, InferenceError, ModelLoadError, PreprocessError};

use super::classify::ClassificationResult;
use super::events::{DispatchEvent, Level};

// ───────────────────────────────────────────────────────────────
// Trigger line (driven adapter: hardware → edge detector)
// ───────────────────────────────────────────────────────────────

/// Digital input owned by the edge-receive thread.
///
/// Implementations deliver *activity* (any interrupt on the line) and a
/// level read; debouncing happens above this trait.
pub trait TriggerLine: Send {
    /// Logical GPIO number (for diagnostics).
    fn pin(&self) -> i32;

    /// Current raw level.
    fn level(&mut self) -> Result<Level, HardwareFault>;

    /// Enable edge interrupts. Called once the model is ready.
    ///
    /// `direction` is a hint; the detector still needs both edges to
    /// track bounce, so adapters usually arm any-edge.
    fn arm(&mut self, direction: TriggerDirection) -> Result<(), HardwareFault>;

    /// Block until the line reports activity (`Ok(true)`) or `timeout`
    /// passes (`Ok(false)`).
    fn wait_for_activity(&mut self, timeout: Duration) -> Result<bool, HardwareFault>;

    /// Disable interrupts. Idempotent.
    fn disarm(&mut self);

    /// Return the line to its reset state. Idempotent.
    fn release(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Clock
// ───────────────────────────────────────────────────────────────

/// Monotonic microsecond clock.
pub trait Clock: Send {
    fn now_us(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Inference engine (external collaborator)
// ───────────────────────────────────────────────────────────────

/// Opaque, engine-specific input tensor ready for `invoke`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedInput {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    /// Quantised pixels, row-major HWC.
    pub data: Vec<u8>,
}

/// Loads a model once and hands back the exclusive session.
pub trait ModelLoader {
    type Session: InferenceSession;

    fn load(&self, model_path: &str) -> Result<Self::Session, ModelLoadError>;
}

/// A loaded model plus its tensor buffers.
///
/// The dispatcher serialises every call, so implementations need no
/// internal locking.
pub trait InferenceSession: Send {
    /// Decode and normalise raw image bytes into the model's input layout.
    fn prepare_input(&mut self, image: &[u8]) -> Result<PreparedInput, PreprocessError>;

    /// Run the model on `input` and extract the top classes.
    fn invoke(
        &mut self,
        input: &PreparedInput,
        top_k: usize,
        threshold: f32,
    ) -> Result<ClassificationResult, InferenceError>;
}

// ───────────────────────────────────────────────────────────────
// Input source
// ───────────────────────────────────────────────────────────────

/// Produces the image bytes classified on each accepted edge.
pub trait InputSource: Send {
    fn capture(&mut self) -> Result<Vec<u8>, PreprocessError>;
}

// ───────────────────────────────────────────────────────────────
// Result sink (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The core emits structured [`DispatchEvent`]s through this port.
///
/// Events come from two contexts (skips from the edge-receive thread,
/// reports from the worker), hence `&self` and `Sync`.
pub trait ResultSink: Send + Sync {
    fn emit(&self, event: &DispatchEvent);
}

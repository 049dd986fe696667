//! Value types that flow through the dispatcher, and the outbound events
//! it emits.
//!
//! The [`Dispatcher`](super::dispatcher::Dispatcher) emits
//! [`DispatchEvent`]s through the [`ResultSink`](super::ports::ResultSink)
//! port. Adapters on the other side decide what to do with them: log to
//! serial, publish over a transport, count them in a test.

use core::time::Duration;

use crate::error::Error;

use super::classify::ClassificationResult;

/// Logic level of a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub const fn from_bool(high: bool) -> Self {
        if high { Self::High } else { Self::Low }
    }

    pub const fn is_high(self) -> bool {
        matches!(self, Self::High)
    }
}

/// Direction of a confirmed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Rising,
    Falling,
}

impl Edge {
    /// The transition that ends at `to`.
    pub const fn towards(to: Level) -> Self {
        match to {
            Level::High => Self::Rising,
            Level::Low => Self::Falling,
        }
    }
}

/// A confirmed, debounced transition. Produced once by the edge detector,
/// consumed once by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    /// Monotonic time of confirmation, microseconds since boot.
    pub timestamp_us: u64,
    pub direction: Edge,
}

/// One measured inference.
#[derive(Debug, Clone)]
pub struct InferenceReport {
    /// Wall time spent inside `invoke`.
    pub elapsed: Duration,
    pub result: ClassificationResult,
}

impl InferenceReport {
    pub fn elapsed_ms(&self) -> f32 {
        self.elapsed.as_secs_f32() * 1000.0
    }
}

/// Structured events emitted by the dispatcher and lifecycle.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// Model loaded, trigger about to be armed.
    Started,

    /// The unmeasured warm-up inference finished.
    ColdStart(InferenceReport),

    /// An accepted edge produced a classification.
    Completed { edge: EdgeEvent, report: InferenceReport },

    /// An edge arrived while an inference was in flight and was dropped.
    Skipped { edge: EdgeEvent },

    /// An accepted edge failed; the dispatcher is idle again.
    Failed { edge: EdgeEvent, error: Error },

    /// An accepted edge was still waiting for the dispatcher at shutdown
    /// and never ran.
    Discarded { edge: EdgeEvent },

    /// Lines and session released.
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_towards_level() {
        assert_eq!(Edge::towards(Level::High), Edge::Rising);
        assert_eq!(Edge::towards(Level::Low), Edge::Falling);
    }

    #[test]
    fn report_elapsed_in_ms() {
        let r = InferenceReport {
            elapsed: Duration::from_micros(12_500),
            result: ClassificationResult::default(),
        };
        assert!((r.elapsed_ms() - 12.5).abs() < 1e-3);
    }
}

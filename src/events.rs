//! Cross-context notifications.
//!
//! Two kinds of signal cross execution contexts in this firmware:
//!
//! - an **accepted edge**, handed from the edge-receive thread to the
//!   dispatcher worker, and
//! - **cancellation**, raised by the operator (Ctrl-C on the host, the
//!   BOOT button on the device) and observed by every loop.
//!
//! ```text
//! ┌──────────────┐  EdgeEvent   ┌──────────────┐
//! │ Edge thread  │─────────────▶│  EdgeSlot    │──▶ Dispatcher worker
//! │ (debounce)   │              │ (1 slot)     │    (idle wait)
//! └──────────────┘              └──────────────┘         ▲
//! ┌──────────────┐                                       │
//! │ Ctrl-C / BOOT│────────────▶ CancelToken ─────────────┘
//! └──────────────┘
//! ```
//!
//! Both are `embassy-sync` signals: a single overwritable slot, so a
//! producer never blocks and nothing queues. The gate admits at most one
//! edge at a time, so in practice the slot never holds a stale value.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use futures_lite::future;

use crate::app::events::EdgeEvent;

/// What woke the idle wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Edge(EdgeEvent),
    Cancelled,
}

// ── EdgeSlot ──────────────────────────────────────────────────

/// Single-slot, overwritable mailbox for the accepted edge.
pub struct EdgeSlot {
    signal: Signal<CriticalSectionRawMutex, EdgeEvent>,
}

impl Default for EdgeSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeSlot {
    pub const fn new() -> Self {
        Self {
            signal: Signal::new(),
        }
    }

    /// Publish an edge. Overwrites any value not yet taken.
    pub fn post(&self, event: EdgeEvent) {
        self.signal.signal(event);
    }

    /// Take the pending edge without waiting.
    pub fn try_take(&self) -> Option<EdgeEvent> {
        self.signal.try_take()
    }

    pub async fn wait(&self) -> EdgeEvent {
        self.signal.wait().await
    }
}

// ── CancelToken ───────────────────────────────────────────────

struct CancelInner {
    latched: AtomicBool,
    signal: Signal<CriticalSectionRawMutex, ()>,
}

/// Cloneable cancellation handle. Once cancelled, stays cancelled.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner {
                latched: AtomicBool::new(false),
                signal: Signal::new(),
            }),
        }
    }

    /// Request cancellation. Idempotent; safe from any thread.
    pub fn cancel(&self) {
        if !self.inner.latched.swap(true, Ordering::AcqRel) {
            log::info!("Cancellation requested");
        }
        self.inner.signal.signal(());
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.latched.load(Ordering::Acquire)
    }

    /// Resolve once cancellation has been requested.
    pub async fn wait(&self) {
        if self.is_cancelled() {
            return;
        }
        self.inner.signal.wait().await;
    }
}

// ── Blocking wait ─────────────────────────────────────────────

/// Block the calling context until an edge is posted or cancellation is
/// requested. Cancellation wins when both are already pending.
pub fn wait_for_edge_or_cancel(slot: &EdgeSlot, cancel: &CancelToken) -> Wake {
    if cancel.is_cancelled() {
        return Wake::Cancelled;
    }
    future::block_on(future::or(
        async {
            cancel.wait().await;
            Wake::Cancelled
        },
        async { Wake::Edge(slot.wait().await) },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::events::Edge;
    use std::time::Duration;

    fn edge(ts: u64) -> EdgeEvent {
        EdgeEvent {
            timestamp_us: ts,
            direction: Edge::Rising,
        }
    }

    #[test]
    fn slot_overwrites_instead_of_queueing() {
        let slot = EdgeSlot::new();
        slot.post(edge(1));
        slot.post(edge(2));
        assert_eq!(slot.try_take(), Some(edge(2)));
        assert_eq!(slot.try_take(), None);
    }

    #[test]
    fn cancel_is_idempotent_and_latched() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
        assert!(token.clone().is_cancelled());
    }

    #[test]
    fn pending_edge_wakes_wait() {
        let slot = EdgeSlot::new();
        let cancel = CancelToken::new();
        slot.post(edge(7));
        assert_eq!(wait_for_edge_or_cancel(&slot, &cancel), Wake::Edge(edge(7)));
    }

    #[test]
    fn cancellation_from_another_thread_wakes_wait() {
        let slot = EdgeSlot::new();
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });
        assert_eq!(wait_for_edge_or_cancel(&slot, &cancel), Wake::Cancelled);
        t.join().unwrap();
    }

    #[test]
    fn cancellation_wins_over_pending_edge() {
        let slot = EdgeSlot::new();
        let cancel = CancelToken::new();
        slot.post(edge(1));
        cancel.cancel();
        assert_eq!(wait_for_edge_or_cancel(&slot, &cancel), Wake::Cancelled);
        // The edge is still there for the shutdown path to discard.
        assert_eq!(slot.try_take(), Some(edge(1)));
    }
}

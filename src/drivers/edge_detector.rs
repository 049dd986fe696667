//! Software-debounced edge detector for the trigger input.
//!
//! ## Hardware
//!
//! The trigger GPIO raises an interrupt on every raw transition. The
//! edge-receive thread wakes on that interrupt, samples the line, and
//! feeds the sample here. While a transition is pending the thread also
//! wakes at the debounce deadline to re-sample, so a line that settles
//! without further interrupts still gets confirmed.
//!
//! ## Debounce rule
//!
//! | Sample                                   | Effect                              |
//! |------------------------------------------|-------------------------------------|
//! | equals confirmed level                   | drop any pending transition (bounce)|
//! | differs, nothing pending                 | start pending at sample time        |
//! | differs, pending for < window            | keep waiting                        |
//! | differs, pending for >= window           | confirm, emit if direction matches  |
//!
//! Confirmation is edge-persistence: a transition only becomes an
//! [`EdgeEvent`] when a sample taken at least one window after it was
//! first seen still shows the new level.

use core::time::Duration;

use crate::app::events::{Edge, EdgeEvent, Level};
use crate::app::ports::{Clock, TriggerLine};
use crate::config::TriggerDirection;
use crate::error::HardwareFault;

/// Detector-private debounce bookkeeping. Never shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceState {
    pub last_confirmed_level: Level,
    pub pending_level: Option<Level>,
    pub pending_since_us: u64,
}

impl DebounceState {
    fn settled(level: Level) -> Self {
        Self {
            last_confirmed_level: level,
            pending_level: None,
            pending_since_us: 0,
        }
    }
}

pub struct EdgeDetector {
    window_us: u64,
    direction: TriggerDirection,
    state: DebounceState,
    bounces: u32,
}

impl EdgeDetector {
    /// `initial` is the line level at arm time; the first confirmed edge is
    /// a departure from it.
    pub fn new(debounce: Duration, direction: TriggerDirection, initial: Level) -> Self {
        Self {
            window_us: debounce.as_micros() as u64,
            direction,
            state: DebounceState::settled(initial),
            bounces: 0,
        }
    }

    /// Classify one raw sample.
    pub fn observe(&mut self, raw: Level, timestamp_us: u64) -> Option<EdgeEvent> {
        if raw == self.state.last_confirmed_level {
            if self.state.pending_level.take().is_some() {
                self.bounces = self.bounces.wrapping_add(1);
                log::trace!("edge: bounce rejected at {}us", timestamp_us);
            }
            return None;
        }

        let Some(pending) = self.state.pending_level else {
            self.state.pending_level = Some(raw);
            self.state.pending_since_us = timestamp_us;
            return None;
        };

        debug_assert_eq!(pending, raw);
        if timestamp_us.saturating_sub(self.state.pending_since_us) < self.window_us {
            return None;
        }

        self.state = DebounceState::settled(raw);
        let edge = Edge::towards(raw);
        if self.accepts(edge) {
            Some(EdgeEvent {
                timestamp_us,
                direction: edge,
            })
        } else {
            log::trace!("edge: {:?} confirmed but filtered", edge);
            None
        }
    }

    /// Sample `line` now and classify the reading.
    pub fn poll(
        &mut self,
        line: &mut impl TriggerLine,
        clock: &impl Clock,
    ) -> Result<Option<EdgeEvent>, HardwareFault> {
        let level = line.level()?;
        Ok(self.observe(level, clock.now_us()))
    }

    /// When a pending transition becomes confirmable, if one is pending.
    pub fn deadline_us(&self) -> Option<u64> {
        self.state
            .pending_level
            .map(|_| self.state.pending_since_us.saturating_add(self.window_us))
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    /// Pending transitions discarded as bounce so far.
    pub fn bounces(&self) -> u32 {
        self.bounces
    }

    fn accepts(&self, edge: Edge) -> bool {
        match self.direction {
            TriggerDirection::Either => true,
            TriggerDirection::Rising => edge == Edge::Rising,
            TriggerDirection::Falling => edge == Edge::Falling,
        }
    }
}

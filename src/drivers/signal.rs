//! Timing signal correlator.
//!
//! Drives the output signal line so an oscilloscope or logic analyser can
//! line up lifecycle milestones (model load, inference start) with the
//! trigger input.
//!
//! ## Contract
//!
//! - The line idles low and is driven low on construction, release, and
//!   drop.
//! - A failed write is surfaced as [`HardwareFault::WriteFailed`] and is
//!   never retried: a late pulse would mislead the measurement more than
//!   a missing one.
//!
//! ## Dual-target design
//!
//! Generic over [`embedded_hal::digital::OutputPin`]:
//! `EspSignalPin` (raw `gpio_set_level`) on the
//! device, a recording
//! [`SimSignalPin`](crate::adapters::sim::SimSignalPin) on the host.

use core::time::Duration;

use embedded_hal::digital::OutputPin;

use crate::app::events::Level;
use crate::config::PulsePattern;
use crate::error::HardwareFault;

pub struct SignalCorrelator<P: OutputPin> {
    pin: Option<P>,
    gpio: i32,
    level: Level,
    pulses: u32,
}

impl<P: OutputPin> SignalCorrelator<P> {
    /// Take ownership of `pin` and drive it low.
    pub fn new(pin: P, gpio: i32) -> Result<Self, HardwareFault> {
        let mut correlator = Self {
            pin: Some(pin),
            gpio,
            level: Level::High,
            pulses: 0,
        };
        correlator.drive(Level::Low)?;
        Ok(correlator)
    }

    /// High for `width`, then low.
    pub fn pulse(&mut self, width: Duration) -> Result<(), HardwareFault> {
        self.drive(Level::High)?;
        std::thread::sleep(width);
        self.drive(Level::Low)?;
        self.pulses = self.pulses.wrapping_add(1);
        Ok(())
    }

    /// `count` pulses, each followed by `gap` low. The trailing gap keeps
    /// the last falling edge clear of the operation being announced.
    pub fn mark(&mut self, count: u8, width: Duration, gap: Duration) -> Result<(), HardwareFault> {
        for _ in 0..count {
            self.pulse(width)?;
            std::thread::sleep(gap);
        }
        Ok(())
    }

    pub fn mark_pattern(&mut self, pattern: &PulsePattern) -> Result<(), HardwareFault> {
        self.mark(
            pattern.count,
            Duration::from_millis(u64::from(pattern.width_ms)),
            Duration::from_millis(u64::from(pattern.gap_ms)),
        )
    }

    /// Drive low and give up the line. Idempotent.
    pub fn release(&mut self) -> Result<(), HardwareFault> {
        if self.pin.is_none() {
            return Ok(());
        }
        let result = self.drive(Level::Low);
        self.pin = None;
        result
    }

    pub fn gpio(&self) -> i32 {
        self.gpio
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn is_released(&self) -> bool {
        self.pin.is_none()
    }

    /// Completed pulses since construction.
    pub fn pulse_count(&self) -> u32 {
        self.pulses
    }

    fn drive(&mut self, level: Level) -> Result<(), HardwareFault> {
        let pin = self.pin.as_mut().ok_or(HardwareFault::WriteFailed(self.gpio))?;
        let written = match level {
            Level::High => pin.set_high(),
            Level::Low => pin.set_low(),
        };
        written.map_err(|_| HardwareFault::WriteFailed(self.gpio))?;
        self.level = level;
        Ok(())
    }
}

impl<P: OutputPin> Drop for SignalCorrelator<P> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::error!("signal: release on drop failed: {}", e);
        }
    }
}

//! Simulated lines for host builds and tests.
//!
//! - [`SimTriggerLine`] implements [`TriggerLine`]; a cloneable
//!   [`SimLineDriver`] sets its level from another thread and wakes the
//!   waiter through a condvar, standing in for the GPIO interrupt.
//! - [`SimSignalPin`] implements `embedded_hal::digital::OutputPin` and
//!   records every level it is driven to.
//! - [`spawn_sim_presses`] plays back bouncy button presses on a driver.

use core::time::Duration;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

use embedded_hal::digital::{self, ErrorKind, ErrorType, OutputPin};

use crate::app::events::Level;
use crate::app::ports::TriggerLine;
use crate::config::TriggerDirection;
use crate::error::HardwareFault;
use crate::events::CancelToken;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ───────────────────────────────────────────────────────────────
// Trigger line
// ───────────────────────────────────────────────────────────────

#[derive(Debug)]
struct LineState {
    level: Level,
    armed: bool,
    arm_calls: u32,
    released: bool,
    /// Unconsumed activity since the last wait.
    activity: bool,
    /// Reads that fail before the line recovers.
    failing_reads: u32,
}

struct Shared {
    state: Mutex<LineState>,
    wake: Condvar,
}

/// Host stand-in for the trigger GPIO.
pub struct SimTriggerLine {
    pin: i32,
    shared: Arc<Shared>,
}

/// Test/simulation handle that moves the line.
#[derive(Clone)]
pub struct SimLineDriver {
    shared: Arc<Shared>,
}

impl SimTriggerLine {
    pub fn new(pin: i32, idle: Level) -> (Self, SimLineDriver) {
        let shared = Arc::new(Shared {
            state: Mutex::new(LineState {
                level: idle,
                armed: false,
                arm_calls: 0,
                released: false,
                activity: false,
                failing_reads: 0,
            }),
            wake: Condvar::new(),
        });
        (
            Self {
                pin,
                shared: Arc::clone(&shared),
            },
            SimLineDriver { shared },
        )
    }
}

impl TriggerLine for SimTriggerLine {
    fn pin(&self) -> i32 {
        self.pin
    }

    fn level(&mut self) -> Result<Level, HardwareFault> {
        let mut s = lock(&self.shared.state);
        if s.failing_reads > 0 {
            s.failing_reads -= 1;
            return Err(HardwareFault::ReadFailed(self.pin));
        }
        Ok(s.level)
    }

    fn arm(&mut self, _direction: TriggerDirection) -> Result<(), HardwareFault> {
        let mut s = lock(&self.shared.state);
        if s.released {
            return Err(HardwareFault::InterruptFailed(self.pin));
        }
        s.armed = true;
        s.arm_calls += 1;
        s.activity = false;
        Ok(())
    }

    fn wait_for_activity(&mut self, timeout: Duration) -> Result<bool, HardwareFault> {
        let guard = lock(&self.shared.state);
        let (mut s, _) = self
            .shared
            .wake
            .wait_timeout_while(guard, timeout, |s| !(s.armed && s.activity))
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let woke = s.armed && s.activity;
        s.activity = false;
        Ok(woke)
    }

    fn disarm(&mut self) {
        lock(&self.shared.state).armed = false;
    }

    fn release(&mut self) {
        let mut s = lock(&self.shared.state);
        s.armed = false;
        s.released = true;
    }
}

impl SimLineDriver {
    /// Drive the line. A change of level counts as interrupt activity.
    pub fn set(&self, level: Level) {
        let mut s = lock(&self.shared.state);
        if s.level != level {
            s.level = level;
            s.activity = true;
            self.shared.wake.notify_all();
        }
    }

    /// Make the next `n` level reads fail.
    pub fn fail_reads(&self, n: u32) {
        lock(&self.shared.state).failing_reads = n;
    }

    /// Injected read faults not yet hit.
    pub fn pending_read_faults(&self) -> u32 {
        lock(&self.shared.state).failing_reads
    }

    pub fn is_armed(&self) -> bool {
        lock(&self.shared.state).armed
    }

    pub fn arm_calls(&self) -> u32 {
        lock(&self.shared.state).arm_calls
    }

    pub fn is_released(&self) -> bool {
        lock(&self.shared.state).released
    }
}

// ───────────────────────────────────────────────────────────────
// Signal pin
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimPinError;

impl digital::Error for SimPinError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[derive(Debug, Default)]
struct PinState {
    history: Vec<Level>,
    fail: bool,
}

/// Recording output pin. Clones share the same history.
#[derive(Clone, Default)]
pub struct SimSignalPin {
    state: Arc<Mutex<PinState>>,
}

impl SimSignalPin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every level written, in order.
    pub fn history(&self) -> Vec<Level> {
        lock(&self.state).history.clone()
    }

    /// Last written level; low if never written.
    pub fn level(&self) -> Level {
        lock(&self.state).history.last().copied().unwrap_or(Level::Low)
    }

    /// Low→High transitions, counting from the unwritten (low) state.
    pub fn rising_edges(&self) -> usize {
        let s = lock(&self.state);
        let mut prev = Level::Low;
        let mut edges = 0;
        for &level in &s.history {
            if prev == Level::Low && level == Level::High {
                edges += 1;
            }
            prev = level;
        }
        edges
    }

    pub fn fail_writes(&self, fail: bool) {
        lock(&self.state).fail = fail;
    }

    fn write(&self, level: Level) -> Result<(), SimPinError> {
        let mut s = lock(&self.state);
        if s.fail {
            return Err(SimPinError);
        }
        s.history.push(level);
        Ok(())
    }
}

impl ErrorType for SimSignalPin {
    type Error = SimPinError;
}

impl OutputPin for SimSignalPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(Level::Low)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(Level::High)
    }
}

// ───────────────────────────────────────────────────────────────
// Press generator
// ───────────────────────────────────────────────────────────────

/// Shape of one simulated button press.
#[derive(Debug, Clone, Copy)]
pub struct PressProfile {
    /// Chatter on contact and on release.
    pub bounces: u8,
    pub bounce_gap: Duration,
    /// Time the contact is held closed.
    pub hold: Duration,
    /// Idle time after each press.
    pub period: Duration,
}

impl Default for PressProfile {
    fn default() -> Self {
        Self {
            bounces: 3,
            bounce_gap: Duration::from_millis(2),
            hold: Duration::from_millis(120),
            period: Duration::from_millis(1500),
        }
    }
}

/// Play `presses` presses (0 = until cancelled) on `driver`. A press
/// drives the line away from `idle` and back.
pub fn spawn_sim_presses(
    driver: SimLineDriver,
    idle: Level,
    profile: PressProfile,
    presses: u32,
    cancel: CancelToken,
) -> std::io::Result<JoinHandle<()>> {
    let active = match idle {
        Level::Low => Level::High,
        Level::High => Level::Low,
    };
    std::thread::Builder::new()
        .name("sim-press".into())
        .spawn(move || {
            let mut done = 0;
            while !cancel.is_cancelled() && (presses == 0 || done < presses) {
                chatter(&driver, active, idle, &profile);
                std::thread::sleep(profile.hold);
                chatter(&driver, idle, active, &profile);
                done += 1;
                log::debug!("sim: press {} done", done);
                std::thread::sleep(profile.period);
            }
        })
}

fn chatter(driver: &SimLineDriver, to: Level, from: Level, profile: &PressProfile) {
    for _ in 0..profile.bounces {
        driver.set(to);
        std::thread::sleep(profile.bounce_gap);
        driver.set(from);
        std::thread::sleep(profile.bounce_gap);
    }
    driver.set(to);
}

//! ESP32-S3 GPIO adapters for the trigger and signal lines.
//!
//! | Adapter          | Implements                  | Hardware                        |
//! |------------------|-----------------------------|---------------------------------|
//! | `EspTriggerLine` | `TriggerLine`               | GPIO input + any-edge ISR       |
//! | `EspSignalPin`   | `embedded_hal` `OutputPin`  | GPIO push-pull output           |
//!
//! Also mounts the SPIFFS partition that holds model, image, labels and
//! config, and watches the BOOT button for operator shutdown.

use core::ffi::CStr;
use core::time::Duration;
use std::thread::JoinHandle;

use embedded_hal::digital::{self, ErrorKind, ErrorType, OutputPin};
use log::{error, info, warn};

use crate::app::events::Level;
use crate::app::ports::TriggerLine;
use crate::config::{Pull, TriggerDirection};
use crate::drivers::hw_init;
use crate::error::HardwareFault;
use crate::events::CancelToken;

// ── Trigger line ──────────────────────────────────────────────

pub struct EspTriggerLine {
    pin: i32,
    armed: bool,
    waiter_claimed: bool,
    released: bool,
}

impl EspTriggerLine {
    /// Configure `pin` as an input. Interrupts stay off until `arm`.
    pub fn new(pin: i32, pull: Pull) -> Result<Self, HardwareFault> {
        hw_init::configure_input(pin, pull)?;
        Ok(Self {
            pin,
            armed: false,
            waiter_claimed: false,
            released: false,
        })
    }
}

impl TriggerLine for EspTriggerLine {
    fn pin(&self) -> i32 {
        self.pin
    }

    fn level(&mut self) -> Result<Level, HardwareFault> {
        if self.released {
            return Err(HardwareFault::ReadFailed(self.pin));
        }
        Ok(Level::from_bool(hw_init::gpio_read(self.pin)))
    }

    fn arm(&mut self, direction: TriggerDirection) -> Result<(), HardwareFault> {
        if self.released {
            return Err(HardwareFault::InterruptFailed(self.pin));
        }
        hw_init::arm_trigger_isr(self.pin, direction)?;
        self.armed = true;
        Ok(())
    }

    fn wait_for_activity(&mut self, timeout: Duration) -> Result<bool, HardwareFault> {
        if !self.armed {
            std::thread::sleep(timeout);
            return Ok(false);
        }
        // The notification targets whichever task waits, which is only
        // known once the edge-receive thread runs.
        if !self.waiter_claimed {
            hw_init::claim_trigger_waiter();
            self.waiter_claimed = true;
        }
        Ok(hw_init::wait_trigger_notification(timeout))
    }

    fn disarm(&mut self) {
        if self.armed {
            hw_init::disarm_trigger_isr(self.pin);
            self.armed = false;
            self.waiter_claimed = false;
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.disarm();
        hw_init::reset_pin(self.pin);
        self.released = true;
        info!("gpio: GPIO{} released", self.pin);
    }
}

impl Drop for EspTriggerLine {
    fn drop(&mut self) {
        self.release();
    }
}

// ── Signal pin ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EspPinError(pub i32);

impl digital::Error for EspPinError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

pub struct EspSignalPin {
    pin: i32,
}

impl EspSignalPin {
    /// Configure `pin` as an output driven low.
    pub fn new(pin: i32) -> Result<Self, HardwareFault> {
        hw_init::configure_output(pin)?;
        Ok(Self { pin })
    }
}

impl ErrorType for EspSignalPin {
    type Error = EspPinError;
}

impl OutputPin for EspSignalPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        hw_init::gpio_write(self.pin, false).map_err(|_| EspPinError(self.pin))
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        hw_init::gpio_write(self.pin, true).map_err(|_| EspPinError(self.pin))
    }
}

impl Drop for EspSignalPin {
    fn drop(&mut self) {
        let _ = hw_init::gpio_write(self.pin, false);
        hw_init::reset_pin(self.pin);
    }
}

// ── Shutdown button ───────────────────────────────────────────

const BUTTON_POLL: Duration = Duration::from_millis(20);
/// Consecutive low samples that count as a press (~100 ms).
const BUTTON_HOLD_SAMPLES: u8 = 5;

/// Poll the active-low BOOT button and cancel on a held press.
///
/// Polled rather than interrupt-driven: it only has to notice a
/// deliberate press, and it keeps the ISR service to the trigger line.
pub fn watch_shutdown_button(pin: i32, cancel: CancelToken) -> Result<JoinHandle<()>, HardwareFault> {
    hw_init::configure_input(pin, Pull::Up)?;
    std::thread::Builder::new()
        .name("shutdown-btn".into())
        .stack_size(4 * 1024)
        .spawn(move || {
            let mut held = 0u8;
            while !cancel.is_cancelled() {
                if hw_init::gpio_read(pin) {
                    held = 0;
                } else {
                    held = held.saturating_add(1);
                    if held >= BUTTON_HOLD_SAMPLES {
                        warn!("gpio: shutdown button pressed");
                        cancel.cancel();
                    }
                }
                std::thread::sleep(BUTTON_POLL);
            }
        })
        .map_err(|e| {
            error!("gpio: shutdown watcher spawn failed: {}", e);
            HardwareFault::ConfigFailed(pin)
        })
}

// ── SPIFFS ────────────────────────────────────────────────────

/// Mount the default SPIFFS partition at `base`.
pub fn mount_spiffs(base: &'static CStr) -> Result<(), i32> {
    use esp_idf_svc::sys::*;

    let conf = esp_vfs_spiffs_conf_t {
        base_path: base.as_ptr(),
        partition_label: core::ptr::null(),
        max_files: 5,
        format_if_mount_failed: false,
    };
    // SAFETY: `conf` and the 'static base path outlive the call; the VFS
    // copies what it keeps.
    let ret = unsafe { esp_vfs_spiffs_register(&conf) };
    if ret != ESP_OK as i32 {
        return Err(ret);
    }
    info!("gpio: SPIFFS mounted at {:?}", base);
    Ok(())
}

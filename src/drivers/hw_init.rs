//! Raw ESP-IDF GPIO plumbing for the trigger, signal and shutdown lines.
//!
//! Configures pin directions and pulls with `gpio_config`, installs the
//! per-pin ISR service, and wakes the edge-receive task from the trigger
//! ISR with a FreeRTOS direct-to-task notification. Only compiled for
//! `target_os = "espidf"`; the host uses the simulated lines in
//! [`crate::adapters::sim`].

use core::ffi::c_void;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};
use core::time::Duration;

use esp_idf_hal::delay::TickType;
use esp_idf_svc::sys::*;
use log::info;

use crate::config::{Pull, TriggerDirection};
use crate::error::HardwareFault;
use crate::pins;

// ── Pin configuration ─────────────────────────────────────────

fn pin_mask(pin: i32) -> Result<u64, HardwareFault> {
    if !pins::is_valid_gpio(pin) {
        return Err(HardwareFault::ConfigFailed(pin));
    }
    Ok(1u64 << pin)
}

/// Configure `pin` as an input with the requested pull and interrupts off.
pub fn configure_input(pin: i32, pull: Pull) -> Result<(), HardwareFault> {
    let cfg = gpio_config_t {
        pin_bit_mask: pin_mask(pin)?,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: if pull == Pull::Up {
            gpio_pullup_t_GPIO_PULLUP_ENABLE
        } else {
            gpio_pullup_t_GPIO_PULLUP_DISABLE
        },
        pull_down_en: if pull == Pull::Down {
            gpio_pulldown_t_GPIO_PULLDOWN_ENABLE
        } else {
            gpio_pulldown_t_GPIO_PULLDOWN_DISABLE
        },
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    // SAFETY: gpio_config only touches the IO MUX registers of `pin`.
    let ret = unsafe { gpio_config(&cfg) };
    if ret != ESP_OK as i32 {
        return Err(HardwareFault::ConfigFailed(pin));
    }
    info!("hw_init: GPIO{} input ({:?} pull)", pin, pull);
    Ok(())
}

/// Configure `pin` as a push-pull output, initially low.
pub fn configure_output(pin: i32) -> Result<(), HardwareFault> {
    let cfg = gpio_config_t {
        pin_bit_mask: pin_mask(pin)?,
        mode: gpio_mode_t_GPIO_MODE_OUTPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    // SAFETY: as above.
    let ret = unsafe { gpio_config(&cfg) };
    if ret != ESP_OK as i32 {
        return Err(HardwareFault::ConfigFailed(pin));
    }
    gpio_write(pin, false)?;
    info!("hw_init: GPIO{} output (low)", pin);
    Ok(())
}

/// Return `pin` to its reset state (input, no pulls, no interrupt).
pub fn reset_pin(pin: i32) {
    // SAFETY: gpio_reset_pin is valid on any configured GPIO.
    unsafe {
        gpio_reset_pin(pin);
    }
}

pub fn gpio_read(pin: i32) -> bool {
    // SAFETY: read-only register access on a configured input.
    (unsafe { gpio_get_level(pin) }) != 0
}

pub fn gpio_write(pin: i32, high: bool) -> Result<(), HardwareFault> {
    // SAFETY: register write on a configured output owned by the caller.
    let ret = unsafe { gpio_set_level(pin, u32::from(high)) };
    if ret != ESP_OK as i32 {
        return Err(HardwareFault::WriteFailed(pin));
    }
    Ok(())
}

// ── Trigger interrupt ─────────────────────────────────────────

/// Task woken by the trigger ISR. Null until the edge-receive task first
/// waits.
static TRIGGER_WAITER: AtomicPtr<tskTaskControlBlock> = AtomicPtr::new(ptr::null_mut());

unsafe extern "C" fn trigger_gpio_isr(_arg: *mut c_void) {
    let task = TRIGGER_WAITER.load(Ordering::Acquire);
    if task.is_null() {
        return;
    }
    let mut woken: BaseType_t = 0;
    // SAFETY: `task` is a live task handle registered by `claim_trigger_waiter`
    // and cleared before that task exits. FromISR variant is ISR-safe.
    unsafe {
        xTaskGenericNotifyFromISR(
            task,
            0,
            1,
            eNotifyAction_eIncrement,
            ptr::null_mut(),
            &mut woken,
        );
    }
}

/// Install the ISR service (idempotent) and hook the trigger handler on
/// `pin`, armed for any edge. Debounce needs both edges regardless of
/// the configured direction.
pub fn arm_trigger_isr(pin: i32, direction: TriggerDirection) -> Result<(), HardwareFault> {
    // SAFETY: gpio_install_isr_service tolerates repeated calls
    // (ESP_ERR_INVALID_STATE); the handler is a static fn touching only
    // an atomic and the FromISR notify API.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
            return Err(HardwareFault::InterruptFailed(pin));
        }
        if gpio_set_intr_type(pin, gpio_int_type_t_GPIO_INTR_ANYEDGE) != ESP_OK as i32 {
            return Err(HardwareFault::InterruptFailed(pin));
        }
        if gpio_isr_handler_add(pin, Some(trigger_gpio_isr), ptr::null_mut()) != ESP_OK as i32 {
            return Err(HardwareFault::InterruptFailed(pin));
        }
        if gpio_intr_enable(pin) != ESP_OK as i32 {
            return Err(HardwareFault::InterruptFailed(pin));
        }
    }
    info!("hw_init: GPIO{} interrupt armed (any edge, trigger {:?})", pin, direction);
    Ok(())
}

pub fn disarm_trigger_isr(pin: i32) {
    // SAFETY: both calls are valid on a pin without a handler.
    unsafe {
        gpio_intr_disable(pin);
        gpio_isr_handler_remove(pin);
    }
    TRIGGER_WAITER.store(ptr::null_mut(), Ordering::Release);
}

/// Register the calling task as the one the trigger ISR wakes.
pub fn claim_trigger_waiter() {
    // SAFETY: returns the handle of the running task.
    let me = unsafe { xTaskGetCurrentTaskHandle() };
    TRIGGER_WAITER.store(me, Ordering::Release);
}

/// Block the calling task until the trigger ISR fires or `timeout`
/// passes. Returns whether the ISR fired.
pub fn wait_trigger_notification(timeout: Duration) -> bool {
    let ticks = TickType::from(timeout).ticks();
    // SAFETY: waits on notification index 0 of the calling task, which
    // is the task registered via `claim_trigger_waiter`.
    (unsafe { ulTaskGenericNotifyTake(0, 1, ticks) }) > 0
}

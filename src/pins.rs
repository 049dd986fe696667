//! GPIO pin assignments for the EdgeTrigger carrier board.
//!
//! Single source of truth for the default wiring. [`DispatcherConfig`]
//! starts from these values; a config file may override them per board.
//!
//! [`DispatcherConfig`]: crate::config::DispatcherConfig

/// Highest GPIO number on the ESP32-S3.
pub const MAX_GPIO: i32 = 48;

/// Whether `pin` names a GPIO that exists on the chip.
pub const fn is_valid_gpio(pin: i32) -> bool {
    pin >= 0 && pin <= MAX_GPIO
}

// ---------------------------------------------------------------------------
// Trigger input (button or external trigger)
// ---------------------------------------------------------------------------

/// Digital input that requests an inference run.
/// Pulled up; fires on the confirmed rising edge by default.
pub const TRIGGER_GPIO: i32 = 26;

// ---------------------------------------------------------------------------
// Timing signal output (scope / logic analyser test point)
// ---------------------------------------------------------------------------

/// Digital output pulsed at lifecycle milestones. Idles low.
pub const SIGNAL_GPIO: i32 = 2;

// ---------------------------------------------------------------------------
// Operator shutdown (devkit BOOT button, active-low)
// ---------------------------------------------------------------------------

/// Falling edge requests an orderly shutdown on the device build.
pub const SHUTDOWN_GPIO: i32 = 0;

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// SPIFFS mount point holding model, labels, images and config.
pub const SPIFFS_BASE: &str = "/spiffs";

/// [`SPIFFS_BASE`] for the VFS registration call.
pub const SPIFFS_BASE_C: &core::ffi::CStr = c"/spiffs";

/// Config file read at boot on the device.
pub const CONFIG_PATH: &str = "/spiffs/edgetrigger.json";

//! Line drivers and threading helpers.

pub mod edge_detector;
#[cfg(target_os = "espidf")]
pub mod hw_init;
pub mod signal;
pub mod task_pin;

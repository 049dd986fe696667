//! Application core: edge admission, single-flight dispatch, lifecycle.
//!
//! All interaction with hardware and the inference engine happens
//! through the **port traits** defined in [`ports`], keeping this layer
//! testable on the host with simulated lines and mock sessions.

pub mod classify;
pub mod dispatcher;
pub mod events;
pub mod lifecycle;
pub mod ports;

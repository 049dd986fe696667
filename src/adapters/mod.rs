//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements                       | Connects to                 |
//! |-------------|----------------------------------|-----------------------------|
//! | `engine`    | ModelLoader, InferenceSession    | Model file, image decoder   |
//! | `gpio`      | TriggerLine, OutputPin           | ESP32 GPIO + ISR (device)   |
//! | `input`     | InputSource                      | Image file                  |
//! | `labels`    | (lookup only)                    | Label file                  |
//! | `log_sink`  | ResultSink                       | Serial / stderr log         |
//! | `sim`       | TriggerLine, OutputPin           | Host simulation             |
//! | `time`      | Clock                            | esp_timer / Instant         |

pub mod engine;
#[cfg(target_os = "espidf")]
pub mod gpio;
pub mod input;
pub mod labels;
pub mod log_sink;
pub mod sim;
pub mod time;

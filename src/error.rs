//! Unified error types for the EdgeTrigger firmware.
//!
//! A single `Error` enum that every subsystem can convert into, keeping
//! the lifecycle's error handling uniform. All variants are `Copy` so
//! they can be carried inside [`DispatchEvent`](crate::app::events::DispatchEvent)
//! reports without allocation.
//!
//! | Error             | Raised by                 | Handling                          |
//! |-------------------|---------------------------|-----------------------------------|
//! | `HardwareFault`   | trigger line, signal line | reported, never retried in place  |
//! | `ModelLoadError`  | model loader              | fatal at startup                  |
//! | `PreprocessError` | input source, session     | per-edge failure report           |
//! | `InferenceError`  | session                   | per-edge failure report           |
//! | `ConfigError`     | config loader             | fatal at startup                  |

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A GPIO line could not be read, written or configured.
    Hardware(HardwareFault),
    /// The model could not be loaded.
    ModelLoad(ModelLoadError),
    /// The input frame could not be captured or converted.
    Preprocess(PreprocessError),
    /// The inference call itself failed.
    Inference(InferenceError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardware(e) => write!(f, "hardware: {e}"),
            Self::ModelLoad(e) => write!(f, "model load: {e}"),
            Self::Preprocess(e) => write!(f, "preprocess: {e}"),
            Self::Inference(e) => write!(f, "inference: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Hardware faults
// ---------------------------------------------------------------------------

/// GPIO-level failure. Carries the logical pin number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareFault {
    /// Level read on an input line failed.
    ReadFailed(i32),
    /// Level write on an output line failed.
    WriteFailed(i32),
    /// Direction / pull configuration failed.
    ConfigFailed(i32),
    /// Interrupt registration or enable failed.
    InterruptFailed(i32),
}

impl HardwareFault {
    pub const fn pin(self) -> i32 {
        match self {
            Self::ReadFailed(p)
            | Self::WriteFailed(p)
            | Self::ConfigFailed(p)
            | Self::InterruptFailed(p) => p,
        }
    }
}

impl fmt::Display for HardwareFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed(p) => write!(f, "GPIO{p} read failed"),
            Self::WriteFailed(p) => write!(f, "GPIO{p} write failed"),
            Self::ConfigFailed(p) => write!(f, "GPIO{p} config failed"),
            Self::InterruptFailed(p) => write!(f, "GPIO{p} interrupt setup failed"),
        }
    }
}

impl std::error::Error for HardwareFault {}

impl From<HardwareFault> for Error {
    fn from(e: HardwareFault) -> Self {
        Self::Hardware(e)
    }
}

// ---------------------------------------------------------------------------
// Model load errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelLoadError {
    /// Model file does not exist.
    NotFound,
    /// Model file exists but could not be read.
    Io,
    /// Model file is empty.
    Empty,
    /// File is not a recognised model container.
    InvalidFormat,
}

impl fmt::Display for ModelLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "model file not found"),
            Self::Io => write!(f, "model file unreadable"),
            Self::Empty => write!(f, "model file empty"),
            Self::InvalidFormat => write!(f, "not a TFLite flatbuffer"),
        }
    }
}

impl From<ModelLoadError> for Error {
    fn from(e: ModelLoadError) -> Self {
        Self::ModelLoad(e)
    }
}

// ---------------------------------------------------------------------------
// Preprocess errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreprocessError {
    /// The input source could not deliver a frame.
    InputUnavailable,
    /// The frame bytes are not a supported image encoding.
    Decode,
    /// The decoded frame does not fit the model input.
    ShapeMismatch,
}

impl fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputUnavailable => write!(f, "input unavailable"),
            Self::Decode => write!(f, "image decode failed"),
            Self::ShapeMismatch => write!(f, "input shape mismatch"),
        }
    }
}

impl From<PreprocessError> for Error {
    fn from(e: PreprocessError) -> Self {
        Self::Preprocess(e)
    }
}

// ---------------------------------------------------------------------------
// Inference errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceError {
    /// The interpreter reported a failure.
    InvokeFailed,
    /// The output tensor does not match the expected class count.
    OutputMismatch,
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvokeFailed => write!(f, "invoke failed"),
            Self::OutputMismatch => write!(f, "output tensor mismatch"),
        }
    }
}

impl From<InferenceError> for Error {
    fn from(e: InferenceError) -> Self {
        Self::Inference(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Config file exists but could not be read.
    Io,
    /// Config file is not valid JSON for [`DispatcherConfig`](crate::config::DispatcherConfig).
    Malformed,
    /// A field failed range validation. Names the field and the rule.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "config unreadable"),
            Self::Malformed => write!(f, "config malformed"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Startup errors
// ---------------------------------------------------------------------------

/// Failures that abort [`Lifecycle::start`](crate::app::lifecycle::Lifecycle::start).
/// The binary maps every variant to a non-zero exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupError {
    /// Line configuration or interrupt arming failed.
    Hardware(HardwareFault),
    /// The model could not be loaded.
    ModelLoad(ModelLoadError),
    /// The cold inference failed.
    ColdInference(Error),
    /// The edge-receive thread could not be spawned.
    ThreadSpawn,
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardware(e) => write!(f, "line setup: {e}"),
            Self::ModelLoad(e) => write!(f, "model load: {e}"),
            Self::ColdInference(e) => write!(f, "cold inference: {e}"),
            Self::ThreadSpawn => write!(f, "edge thread spawn failed"),
        }
    }
}

impl std::error::Error for StartupError {}

impl From<HardwareFault> for StartupError {
    fn from(e: HardwareFault) -> Self {
        Self::Hardware(e)
    }
}

impl From<ModelLoadError> for StartupError {
    fn from(e: ModelLoadError) -> Self {
        Self::ModelLoad(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

//! Dispatcher configuration parameters
//!
//! All tunable parameters for the EdgeTrigger system, resolved into one
//! struct before the lifecycle starts. Values come from a JSON file on
//! SPIFFS (device) or next to the binary (host); missing fields take the
//! defaults below.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pins;

/// Upper bound on `top_k`; sizes the fixed-capacity result list.
pub const MAX_TOP_K: usize = 16;

/// Which confirmed transitions start an inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerDirection {
    Rising,
    Falling,
    Either,
}

/// Input pull resistor mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pull {
    Up,
    Down,
    None,
}

/// Trigger input line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerLineConfig {
    /// Logical GPIO number.
    pub gpio: i32,
    pub pull: Pull,
    /// Minimum time a new level must persist before it is confirmed.
    pub debounce_ms: u32,
    pub direction: TriggerDirection,
}

impl Default for TriggerLineConfig {
    fn default() -> Self {
        Self {
            gpio: pins::TRIGGER_GPIO,
            pull: Pull::Up,
            debounce_ms: 50,
            direction: TriggerDirection::Rising,
        }
    }
}

/// Timing signal output line. Always configured with an initial low level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalLineConfig {
    pub gpio: i32,
    /// When false, milestone markers are skipped entirely.
    pub enabled: bool,
}

impl Default for SignalLineConfig {
    fn default() -> Self {
        Self {
            gpio: pins::SIGNAL_GPIO,
            enabled: true,
        }
    }
}

/// Marker shape: `count` pulses of `width_ms`, each followed by `gap_ms` low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulsePattern {
    pub count: u8,
    pub width_ms: u32,
    pub gap_ms: u32,
}

impl PulsePattern {
    pub const fn single(width_ms: u32, gap_ms: u32) -> Self {
        Self {
            count: 1,
            width_ms,
            gap_ms,
        }
    }
}

/// Which lifecycle milestones are announced on the signal line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MilestoneConfig {
    /// Emitted right before the model is loaded.
    pub model_load: Option<PulsePattern>,
    /// Emitted right before each measured inference.
    pub inference_start: Option<PulsePattern>,
}

impl Default for MilestoneConfig {
    fn default() -> Self {
        Self {
            model_load: Some(PulsePattern::single(50, 50)),
            inference_start: Some(PulsePattern::single(50, 50)),
        }
    }
}

/// Inference engine parameters (what a CLI would have resolved).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `.tflite` model file.
    pub model_path: String,
    /// Image classified on every accepted edge.
    pub input_path: String,
    /// Optional label file (`<id> <label>` per line, or one label per line).
    pub labels_path: Option<String>,
    /// Max number of classification results.
    pub top_k: usize,
    /// Classification score threshold.
    pub threshold: f32,
    /// Mean value for input normalisation.
    pub input_mean: f32,
    /// Standard deviation for input normalisation.
    pub input_std: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: format!("{}/model.tflite", pins::SPIFFS_BASE),
            input_path: format!("{}/input.ppm", pins::SPIFFS_BASE),
            labels_path: None,
            top_k: 1,
            threshold: 0.0,
            input_mean: 128.0,
            input_std: 128.0,
        }
    }
}

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub trigger: TriggerLineConfig,
    pub signal: SignalLineConfig,
    /// Device-only operator shutdown input; `None` disables it.
    pub shutdown_gpio: Option<i32>,
    pub engine: EngineConfig,
    pub milestones: MilestoneConfig,
    /// Run one unmeasured warm-up inference before arming the trigger.
    pub cold_inference: bool,
    /// Back-off after a trigger line fault before sampling again.
    pub fault_backoff_ms: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            trigger: TriggerLineConfig::default(),
            signal: SignalLineConfig::default(),
            shutdown_gpio: Some(pins::SHUTDOWN_GPIO),
            engine: EngineConfig::default(),
            milestones: MilestoneConfig::default(),
            cold_inference: true,
            fault_backoff_ms: 100,
        }
    }
}

impl DispatcherConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|_| ConfigError::Malformed)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`. A missing file yields the defaults; an unreadable
    /// or invalid one is an error.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(json) => {
                let config = Self::from_json(&json)?;
                log::info!("Config loaded from {}", path);
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {}, using defaults", path);
                Ok(Self::default())
            }
            Err(e) => {
                log::warn!("Config read from {} failed: {}", path, e);
                Err(ConfigError::Io)
            }
        }
    }

    /// Range-check every field. Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let e = &self.engine;
        if e.top_k == 0 {
            return Err(ConfigError::ValidationFailed("top_k must be at least 1"));
        }
        if e.top_k > MAX_TOP_K {
            return Err(ConfigError::ValidationFailed("top_k exceeds MAX_TOP_K"));
        }
        if !(0.0..=1.0).contains(&e.threshold) {
            return Err(ConfigError::ValidationFailed("threshold must be within [0, 1]"));
        }
        if e.input_std.is_nan() || e.input_std <= 0.0 {
            return Err(ConfigError::ValidationFailed("input_std must be positive"));
        }
        if !e.input_mean.is_finite() {
            return Err(ConfigError::ValidationFailed("input_mean must be finite"));
        }
        if self.trigger.debounce_ms == 0 {
            return Err(ConfigError::ValidationFailed("debounce_ms must be non-zero"));
        }
        if !pins::is_valid_gpio(self.trigger.gpio) {
            return Err(ConfigError::ValidationFailed("trigger GPIO out of range"));
        }
        if !pins::is_valid_gpio(self.signal.gpio) {
            return Err(ConfigError::ValidationFailed("signal GPIO out of range"));
        }
        if self.shutdown_gpio.is_some_and(|pin| !pins::is_valid_gpio(pin)) {
            return Err(ConfigError::ValidationFailed("shutdown GPIO out of range"));
        }
        if self.trigger.gpio == self.signal.gpio {
            return Err(ConfigError::ValidationFailed("trigger and signal share a GPIO"));
        }
        if self.shutdown_gpio == Some(self.trigger.gpio) || self.shutdown_gpio == Some(self.signal.gpio) {
            return Err(ConfigError::ValidationFailed("shutdown GPIO collides with a dispatcher line"));
        }
        for pattern in [self.milestones.model_load, self.milestones.inference_start]
            .into_iter()
            .flatten()
        {
            if pattern.count == 0 || pattern.width_ms == 0 {
                return Err(ConfigError::ValidationFailed("pulse pattern needs count and width"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = DispatcherConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.trigger.debounce_ms, 50);
        assert_eq!(c.trigger.direction, TriggerDirection::Rising);
        assert_eq!(c.engine.top_k, 1);
        assert!((c.engine.input_mean - 128.0).abs() < f32::EPSILON);
        assert!((c.engine.input_std - 128.0).abs() < f32::EPSILON);
        assert!(c.cold_inference);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c = DispatcherConfig::from_json(
            r#"{ "trigger": { "direction": "either" }, "engine": { "top_k": 3 } }"#,
        )
        .unwrap();
        assert_eq!(c.trigger.direction, TriggerDirection::Either);
        assert_eq!(c.trigger.debounce_ms, 50);
        assert_eq!(c.engine.top_k, 3);
        assert_eq!(c.signal.gpio, pins::SIGNAL_GPIO);
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert_eq!(
            DispatcherConfig::from_json("{ not json").unwrap_err(),
            ConfigError::Malformed
        );
    }

    #[test]
    fn invalid_ranges_are_rejected_not_clamped() {
        let mut c = DispatcherConfig::default();
        c.engine.top_k = 0;
        assert!(matches!(c.validate(), Err(ConfigError::ValidationFailed(_))));

        let mut c = DispatcherConfig::default();
        c.engine.threshold = 1.5;
        assert!(c.validate().is_err());

        let mut c = DispatcherConfig::default();
        c.engine.input_std = 0.0;
        assert!(c.validate().is_err());

        let mut c = DispatcherConfig::default();
        c.signal.gpio = c.trigger.gpio;
        assert!(c.validate().is_err());

        let mut c = DispatcherConfig::default();
        c.milestones.inference_start = Some(PulsePattern { count: 0, width_ms: 50, gap_ms: 0 });
        assert!(c.validate().is_err());
    }

    #[test]
    fn gpio_numbers_outside_the_chip_are_rejected() {
        assert!(matches!(
            DispatcherConfig::from_json(r#"{"trigger":{"gpio":70},"signal":{"gpio":-3}}"#),
            Err(ConfigError::ValidationFailed(_))
        ));

        let mut c = DispatcherConfig::default();
        c.signal.gpio = -3;
        assert!(c.validate().is_err());

        let mut c = DispatcherConfig::default();
        c.trigger.gpio = pins::MAX_GPIO + 1;
        assert!(c.validate().is_err());

        let mut c = DispatcherConfig::default();
        c.shutdown_gpio = Some(64);
        assert!(c.validate().is_err());

        let mut c = DispatcherConfig::default();
        c.trigger.gpio = pins::MAX_GPIO;
        c.shutdown_gpio = None;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let c = DispatcherConfig::load("/definitely/not/here/edgetrigger.json").unwrap();
        assert_eq!(c.trigger.gpio, pins::TRIGGER_GPIO);
    }

    #[test]
    fn serde_roundtrip() {
        let mut c = DispatcherConfig::default();
        c.milestones.model_load = None;
        let json = serde_json::to_string(&c).unwrap();
        let c2 = DispatcherConfig::from_json(&json).unwrap();
        assert!(c2.milestones.model_load.is_none());
        assert_eq!(c2.milestones.inference_start, c.milestones.inference_start);
        assert_eq!(c2.engine.model_path, c.engine.model_path);
    }
}

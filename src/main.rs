//! EdgeTrigger firmware entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  EspTriggerLine / SimTriggerLine   EspSignalPin / SimSignalPin │
//! │  (TriggerLine)                     (OutputPin)                 │
//! │  BringUpEngine   FileInput     LogReportSink   MonotonicClock  │
//! │  (ModelLoader)   (InputSource) (ResultSink)    (Clock)         │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │   Lifecycle · TriggerGate · Dispatcher (pure logic)    │    │
//! │  │   EdgeDetector · SignalCorrelator                      │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Exit status is zero after a cancellation-triggered shutdown and
//! non-zero when startup fails.
#![deny(unused_must_use)]

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use edgetrigger::adapters::engine::BringUpEngine;
use edgetrigger::adapters::input::FileInput;
use edgetrigger::adapters::labels::LabelMap;
use edgetrigger::adapters::log_sink::LogReportSink;
use edgetrigger::adapters::time::MonotonicClock;
use edgetrigger::app::lifecycle::Lifecycle;
use edgetrigger::config::DispatcherConfig;
use edgetrigger::events::CancelToken;

/// Classes scored when no label file says otherwise.
const DEFAULT_CLASSES: usize = 2;

fn main() -> Result<()> {
    // ── 1. Bootstrap + logging ────────────────────────────────
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;
        if let Err(rc) = edgetrigger::adapters::gpio::mount_spiffs(edgetrigger::pins::SPIFFS_BASE_C) {
            warn!("SPIFFS mount failed (rc={}), file paths will not resolve", rc);
        }
    }
    #[cfg(not(target_os = "espidf"))]
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("╔══════════════════════════════════════╗");
    info!("║  EdgeTrigger v{}                     ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Config ─────────────────────────────────────────────
    let config_path = config_path();
    let config = DispatcherConfig::load(&config_path)
        .with_context(|| format!("loading config from {config_path}"))?;

    // ── 3. Cancellation ───────────────────────────────────────
    let cancel = CancelToken::new();
    install_cancellation(&config, &cancel)?;

    // ── 4. Engine-side adapters ───────────────────────────────
    let labels = match config.engine.labels_path.as_deref() {
        Some(path) => LabelMap::load(path).unwrap_or_else(|e| {
            warn!("Label file {} unusable ({}), reporting class ids", path, e);
            LabelMap::default()
        }),
        None => LabelMap::default(),
    };
    let classes = match labels.class_count() {
        0 => DEFAULT_CLASSES,
        n => n,
    };
    let loader = BringUpEngine::new(classes, config.engine.input_mean, config.engine.input_std);
    let input = FileInput::new(config.engine.input_path.clone());
    let sink = Arc::new(LogReportSink::new(labels));

    // ── 5. Lines + startup ────────────────────────────────────
    let (line, pin) = build_lines(&config, &cancel)?;
    let mut runtime = Lifecycle::start(
        &config,
        line,
        pin,
        &loader,
        input,
        sink,
        MonotonicClock::new(),
        cancel,
    )
    .context("startup failed")?;

    // ── 6. Idle wait until cancelled ──────────────────────────
    runtime.run();
    runtime.shutdown().context("shutdown")?;
    info!("Clean shutdown");
    Ok(())
}

#[cfg(target_os = "espidf")]
fn config_path() -> String {
    edgetrigger::pins::CONFIG_PATH.to_owned()
}

#[cfg(not(target_os = "espidf"))]
fn config_path() -> String {
    std::env::args()
        .nth(1)
        .unwrap_or_else(|| "edgetrigger.json".to_owned())
}

// ── Device wiring ─────────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn install_cancellation(config: &DispatcherConfig, cancel: &CancelToken) -> Result<()> {
    match config.shutdown_gpio {
        Some(pin) => {
            edgetrigger::adapters::gpio::watch_shutdown_button(pin, cancel.clone())
                .context("shutdown button")?;
            info!("Hold GPIO{} low to shut down", pin);
        }
        None => warn!("No shutdown input configured; runs until reset"),
    }
    Ok(())
}

#[cfg(target_os = "espidf")]
fn build_lines(
    config: &DispatcherConfig,
    _cancel: &CancelToken,
) -> Result<(
    edgetrigger::adapters::gpio::EspTriggerLine,
    edgetrigger::adapters::gpio::EspSignalPin,
)> {
    use edgetrigger::adapters::gpio::{EspSignalPin, EspTriggerLine};

    let pin = EspSignalPin::new(config.signal.gpio).context("signal line")?;
    let line = EspTriggerLine::new(config.trigger.gpio, config.trigger.pull).context("trigger line")?;
    Ok((line, pin))
}

// ── Host simulation wiring ────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
fn install_cancellation(_config: &DispatcherConfig, cancel: &CancelToken) -> Result<()> {
    let token = cancel.clone();
    ctrlc::set_handler(move || token.cancel()).context("installing Ctrl-C handler")?;
    info!("Press Ctrl-C to shut down");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
fn build_lines(
    config: &DispatcherConfig,
    cancel: &CancelToken,
) -> Result<(
    edgetrigger::adapters::sim::SimTriggerLine,
    edgetrigger::adapters::sim::SimSignalPin,
)> {
    use edgetrigger::adapters::sim::{PressProfile, SimSignalPin, SimTriggerLine, spawn_sim_presses};
    use edgetrigger::app::events::Level;
    use edgetrigger::config::Pull;

    let idle = match config.trigger.pull {
        Pull::Up => Level::High,
        Pull::Down | Pull::None => Level::Low,
    };
    let (line, driver) = SimTriggerLine::new(config.trigger.gpio, idle);
    spawn_sim_presses(driver, idle, PressProfile::default(), 0, cancel.clone())
        .context("starting simulated trigger")?;
    info!("Simulated trigger on GPIO{} (idle {:?})", config.trigger.gpio, idle);
    Ok((line, SimSignalPin::new()))
}

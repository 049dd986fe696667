//! Log-based result sink adapter.
//!
//! Implements [`ResultSink`] by writing each [`DispatchEvent`] as one
//! structured line to the logger (UART / USB-CDC on the device, stderr
//! on the host). A transport adapter would implement the same trait.

use core::fmt::Write as _;

use log::{Level, info, log, warn};

use crate::app::classify::ClassificationResult;
use crate::app::events::DispatchEvent;
use crate::app::ports::ResultSink;
use crate::error::Error;

use super::labels::LabelMap;

/// Adapter that logs every [`DispatchEvent`], naming classes from an
/// optional label map.
#[derive(Default)]
pub struct LogReportSink {
    labels: LabelMap,
}

impl LogReportSink {
    pub fn new(labels: LabelMap) -> Self {
        Self { labels }
    }

    /// `cat: 0.91016, dog: 0.05078`
    pub fn format_classes(&self, result: &ClassificationResult) -> String {
        if result.is_empty() {
            return "-".into();
        }
        let mut out = String::new();
        for (i, class) in result.classes().iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{}: {:.5}", self.labels.get(class.id), class.score);
        }
        out
    }
}

/// A signal-line fault means the board is in trouble; a bad frame or a
/// failed invoke only costs the one edge.
fn failure_level(error: &Error) -> Level {
    match error {
        Error::Hardware(_) => Level::Error,
        _ => Level::Warn,
    }
}

impl ResultSink for LogReportSink {
    fn emit(&self, event: &DispatchEvent) {
        match event {
            DispatchEvent::Started => {
                info!("START | model loaded");
            }
            DispatchEvent::ColdStart(report) => {
                info!(
                    "COLD  | {:.1}ms | {}",
                    report.elapsed_ms(),
                    self.format_classes(&report.result)
                );
            }
            DispatchEvent::Completed { edge, report } => {
                info!(
                    "INFER | {:.1}ms | {} | edge={:?}@{}us",
                    report.elapsed_ms(),
                    self.format_classes(&report.result),
                    edge.direction,
                    edge.timestamp_us
                );
            }
            DispatchEvent::Skipped { edge } => {
                warn!(
                    "SKIP  | busy | edge={:?}@{}us",
                    edge.direction, edge.timestamp_us
                );
            }
            DispatchEvent::Failed { edge, error: e } => {
                log!(
                    failure_level(e),
                    "FAIL  | {} | edge={:?}@{}us",
                    e,
                    edge.direction,
                    edge.timestamp_us
                );
            }
            DispatchEvent::Discarded { edge } => {
                warn!(
                    "DROP  | shutdown | edge={:?}@{}us",
                    edge.direction, edge.timestamp_us
                );
            }
            DispatchEvent::Shutdown => {
                info!("STOP  | lines released");
            }
        }
    }
}

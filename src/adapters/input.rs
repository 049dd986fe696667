//! File-backed input source.

use std::io::ErrorKind;

use crate::app::ports::InputSource;
use crate::error::PreprocessError;

/// Re-reads the configured image on every capture, so the file can be
/// swapped between triggers.
pub struct FileInput {
    path: String,
}

impl FileInput {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl InputSource for FileInput {
    fn capture(&mut self) -> Result<Vec<u8>, PreprocessError> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Err(PreprocessError::InputUnavailable),
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    log::warn!("input: read {} failed: {}", self.path, e);
                }
                Err(PreprocessError::InputUnavailable)
            }
        }
    }
}

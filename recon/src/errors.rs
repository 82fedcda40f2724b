use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("Element not found: {selector} in {context} after {timeout:?}")]
    NotFound {
        selector: String,
        context: String,
        timeout: Duration,
    },

    #[error("No new frame beyond {previous} appeared within {timeout:?}")]
    FrameTimeout { previous: usize, timeout: Duration },

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("No transaction row matches {value:.2}")]
    NoMatch { value: f64 },

    #[error("Element is detached from the document: {0}")]
    ElementDetached(String),

    #[error("Extension bridge error: {0}")]
    Bridge(String),

    #[error("Page script failed: {0}")]
    Script(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No valid receipts in batch (expected names like \"123.45 USD - Vendor - Description.pdf\")")]
    EmptyBatch,
}

impl ReconError {
    /// Transport failures leave no usable remote session, so they abort the
    /// whole run instead of being isolated per receipt or per group.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReconError::Bridge(_))
    }
}

//! Card reconciliation automation against a remote expense application
//!
//! Given a batch of receipt documents, this crate finds the matching
//! transaction rows, attaches each receipt as evidence, and applies shared
//! account coding to groups of matched transactions in bulk. The remote
//! application offers no completion events, so every step is driven by
//! bounded polling through a [`Locator`] or a [`FrameDiscoverer`].

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub mod allocation;
pub mod element;
pub mod errors;
pub mod extension_bridge;
pub mod frames;
pub mod grouping;
pub mod keywords;
pub mod locator;
pub mod matcher;
pub mod platforms;
pub mod receipt;
pub mod report;
pub mod selector;
pub mod session;
pub mod surface;
#[cfg(test)]
mod tests;
pub mod upload;
pub mod utils;

pub use allocation::{AllocationOutcome, MassAllocationDriver};
pub use element::Element;
pub use errors::ReconError;
pub use frames::{FrameDiscoverer, FrameHandle, FrameSnapshot};
pub use grouping::{AllocationGroup, AllocationGrouper, Grouping};
pub use keywords::{KeywordSource, NoKeywords, PdfKeywords};
pub use locator::Locator;
pub use matcher::{ClaimedRows, MatchResult, TransactionMatcher, TransactionRow};
pub use platforms::{ContextId, DocumentEngine, DomEvent};
pub use receipt::{CodingKey, Receipt, ReceiptIngestor, SourceDocument};
pub use report::{GroupOutcome, GroupStatus, ReceiptOutcome, ReceiptStatus, SessionReport};
pub use selector::Selector;
pub use session::{Session, SessionAbort};
pub use surface::SurfaceProfile;
pub use upload::{UploadFailure, UploadOrchestrator, UploadState};

/// The main entry point for driving the remote application
#[derive(Clone)]
pub struct Page {
    engine: Arc<dyn DocumentEngine>,
    profile: Arc<SurfaceProfile>,
}

impl Page {
    pub fn new(engine: Arc<dyn DocumentEngine>, profile: SurfaceProfile) -> Self {
        Self {
            engine,
            profile: Arc::new(profile),
        }
    }

    pub fn profile(&self) -> &SurfaceProfile {
        &self.profile
    }

    /// A locator in the outer document using the profile's element timeout
    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        self.locator_in(ContextId::Top, selector)
    }

    pub fn locator_in(&self, context: ContextId, selector: impl Into<Selector>) -> Locator {
        Locator::new(self.engine.clone(), selector.into(), context)
            .set_default_timeout(self.profile.timeouts.element())
            .set_poll_interval(self.profile.timeouts.poll_interval())
    }

    pub fn frames(&self) -> FrameDiscoverer {
        FrameDiscoverer::new(
            self.engine.clone(),
            self.profile.selectors.modal_frame.clone(),
            self.profile.timeouts.frame_poll_interval(),
            self.profile.timeouts.frame_content_threshold,
        )
    }

    pub async fn text_content(&self, context: &ContextId) -> Result<String, ReconError> {
        self.engine.text_content(context).await
    }

    /// Fixed wait for the remote application's own asynchronous processing
    pub async fn settle(&self, millis: u64, why: &str) {
        if millis == 0 {
            return;
        }
        debug!("Waiting {}ms for {}...", millis, why);
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}

use crate::platforms::{ContextId, DocumentEngine, DomEvent, ElementRef, ElementSnapshot};
use crate::{Locator, ReconError, Selector, SourceDocument};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Represents a rendered element in the remote application
///
/// The text and value are read when the element is located; actions go back
/// to the engine through the element's reference, which fails with
/// [`ReconError::ElementDetached`] once the remote UI has re-rendered.
#[derive(Clone)]
pub struct Element {
    engine: Arc<dyn DocumentEngine>,
    reference: ElementRef,
    snapshot: ElementSnapshot,
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("context", &self.reference.context)
            .field("handle", &self.reference.handle)
            .field("text", &self.snapshot.text)
            .finish()
    }
}

impl Element {
    pub(crate) fn new(
        engine: Arc<dyn DocumentEngine>,
        context: ContextId,
        snapshot: ElementSnapshot,
    ) -> Self {
        Self {
            engine,
            reference: ElementRef {
                context,
                handle: snapshot.handle.clone(),
            },
            snapshot,
        }
    }

    pub fn reference(&self) -> &ElementRef {
        &self.reference
    }

    pub fn context(&self) -> &ContextId {
        &self.reference.context
    }

    /// Text content as of when this element was located
    pub fn text(&self) -> &str {
        &self.snapshot.text
    }

    pub fn value(&self) -> Option<&str> {
        self.snapshot.value.as_deref()
    }

    pub fn is_checked(&self) -> bool {
        self.snapshot.checked.unwrap_or(false)
    }

    #[instrument(level = "debug", skip(self), fields(handle = %self.reference.handle))]
    pub async fn click(&self) -> Result<(), ReconError> {
        self.engine.click(&self.reference).await
    }

    /// Write a value and dispatch `events` so the remote application notices.
    pub async fn fill(&self, value: &str, events: &[DomEvent]) -> Result<(), ReconError> {
        debug!(handle = %self.reference.handle, ?events, "Filling element");
        self.engine.set_value(&self.reference, value, events).await
    }

    pub async fn set_checked(&self, checked: bool) -> Result<(), ReconError> {
        self.engine.set_checked(&self.reference, checked).await
    }

    pub async fn attach_file(
        &self,
        document: &SourceDocument,
        events: &[DomEvent],
    ) -> Result<(), ReconError> {
        debug!(handle = %self.reference.handle, file = %document.name(), "Staging file");
        self.engine
            .attach_file(&self.reference, document, events)
            .await
    }

    /// A locator searching only this element's descendants
    pub fn locator(&self, selector: impl Into<Selector>, timeout: Duration) -> Locator {
        Locator::new(self.engine.clone(), selector.into(), self.context().clone())
            .scoped(self.reference.clone())
            .set_default_timeout(timeout)
    }
}

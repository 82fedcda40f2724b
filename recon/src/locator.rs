use tracing::{debug, instrument, warn};

use crate::element::Element;
use crate::errors::ReconError;
use crate::platforms::{ContextId, DocumentEngine, ElementRef};
use crate::selector::Selector;
use crate::utils::wait_for;
use std::sync::Arc;
use std::time::Duration;

// Default timeout if none is specified on the locator itself
pub const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Finds elements in one search context, waiting for them when asked to
#[derive(Clone)]
pub struct Locator {
    engine: Arc<dyn DocumentEngine>,
    selector: Selector,
    context: ContextId,
    scope: Option<ElementRef>,
    timeout: Duration, // Default timeout for this locator instance
    poll_interval: Duration,
}

impl Locator {
    pub(crate) fn new(engine: Arc<dyn DocumentEngine>, selector: Selector, context: ContextId) -> Self {
        Self {
            engine,
            selector,
            context,
            scope: None,
            timeout: DEFAULT_LOCATOR_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set a default timeout for waiting operations on this locator instance.
    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn set_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Only search descendants of `scope`
    pub fn scoped(mut self, scope: ElementRef) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn context(&self) -> &ContextId {
        &self.context
    }

    /// Every element matching right now, without waiting.
    pub async fn all(&self) -> Result<Vec<Element>, ReconError> {
        let found = self
            .engine
            .query_all(&self.context, self.scope.as_ref(), &self.selector)
            .await?;
        Ok(found
            .into_iter()
            .map(|snapshot| Element::new(self.engine.clone(), self.context.clone(), snapshot))
            .collect())
    }

    /// The first element matching right now, if any.
    pub async fn first_now(&self) -> Result<Option<Element>, ReconError> {
        Ok(self.all().await?.into_iter().next())
    }

    /// Wait for an element matching the locator to appear, up to the specified timeout.
    /// If no timeout is provided, uses the locator's default timeout.
    #[instrument(level = "debug", skip(self, timeout), fields(selector = %self.selector, context = %self.context))]
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<Element, ReconError> {
        let effective_timeout = timeout.unwrap_or(self.timeout);
        debug!("Waiting for element");

        let found = wait_for(effective_timeout, self.poll_interval, move || self.first_now()).await?;
        match found {
            Some(element) => {
                debug!(handle = %element.reference().handle, "Found element");
                Ok(element)
            }
            None => {
                warn!(timeout = ?effective_timeout, "Timed out waiting for element");
                Err(ReconError::NotFound {
                    selector: self.selector.to_string(),
                    context: self.context.to_string(),
                    timeout: effective_timeout,
                })
            }
        }
    }
}

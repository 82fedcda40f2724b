use crate::{ReconError, Selector, SourceDocument};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod browser;

/// A search context inside the remote application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextId {
    /// The outer document
    Top,
    /// The content document of the frame element with this id in the outer document
    Frame(String),
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextId::Top => write!(f, "top document"),
            ContextId::Frame(id) => write!(f, "frame '{id}'"),
        }
    }
}

/// Opaque reference to a rendered element. The remote UI re-renders freely,
/// so a reference is only good until the next state transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef {
    pub context: ContextId,
    pub handle: String,
}

/// What an engine reports for each element matched by a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ElementSnapshot {
    pub handle: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub checked: Option<bool>,
}

/// A frame element found in the outer document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FrameInfo {
    pub id: String,
    /// Length of the frame document's rendered markup; `None` while the
    /// content document is not reachable yet.
    #[serde(default)]
    pub content_length: Option<usize>,
}

/// Synthetic notifications dispatched after a write so the remote
/// application's own reactive layer observes the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomEvent {
    Input,
    Change,
    /// keydown of the Enter key
    EnterKey,
    Blur,
}

/// The common trait every remote-document backend implements
#[async_trait::async_trait]
pub trait DocumentEngine: Send + Sync {
    /// All elements matching `selector` in `context`, in document order.
    /// When `scope` is given, only its descendants are searched.
    async fn query_all(
        &self,
        context: &ContextId,
        scope: Option<&ElementRef>,
        selector: &Selector,
    ) -> Result<Vec<ElementSnapshot>, ReconError>;

    /// Frame elements in the outer document matching the naming convention,
    /// in document order.
    async fn frames(&self, naming: &Selector) -> Result<Vec<FrameInfo>, ReconError>;

    /// Full text content of a context's body.
    async fn text_content(&self, context: &ContextId) -> Result<String, ReconError>;

    async fn click(&self, element: &ElementRef) -> Result<(), ReconError>;

    /// Focus, write `value`, then dispatch `events` in order.
    async fn set_value(
        &self,
        element: &ElementRef,
        value: &str,
        events: &[DomEvent],
    ) -> Result<(), ReconError>;

    async fn set_checked(&self, element: &ElementRef, checked: bool) -> Result<(), ReconError>;

    /// Assign `document` to a file input, then dispatch `events` in order.
    async fn attach_file(
        &self,
        element: &ElementRef,
        document: &SourceDocument,
        events: &[DomEvent],
    ) -> Result<(), ReconError>;
}

//! The per-receipt upload workflow.
//!
//! One traversal of [`UploadState`] per matched receipt:
//!
//! ```text
//! Idle -> RowSelected -> DescriptionSet -> AttachDialogOpen -> UploadDialogOpen
//!      -> FileStaged -> UploadConfirmed -> AttachmentSaved -> Done
//! ```
//!
//! Any step may end in `Failed`. Each step waits for the elements it needs
//! and is followed by a settle delay from the profile.

use crate::platforms::DomEvent;
use crate::{FrameHandle, MatchResult, Page, ReconError};
use std::fmt;
use tracing::{debug, error, info, instrument, warn};

const DESCRIPTION_EVENTS: &[DomEvent] = &[DomEvent::Input, DomEvent::Change, DomEvent::Blur];
const FILE_EVENTS: &[DomEvent] = &[DomEvent::Input, DomEvent::Change];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    RowSelected,
    DescriptionSet,
    AttachDialogOpen,
    UploadDialogOpen,
    FileStaged,
    UploadConfirmed,
    AttachmentSaved,
    Done,
    Failed(String),
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Done | UploadState::Failed(_))
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadState::Failed(reason) => write!(f, "Failed({reason})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Why a traversal stopped early, and the last state it reached.
#[derive(Debug, thiserror::Error)]
#[error("upload stopped after {reached}: {error}")]
pub struct UploadFailure {
    pub reached: UploadState,
    #[source]
    pub error: ReconError,
}

impl UploadFailure {
    /// Terminal state for this failure
    pub fn state(&self) -> UploadState {
        UploadState::Failed(self.error.to_string())
    }
}

// Frames opened during one traversal. A failed traversal closes the ones
// still open before it returns.
#[derive(Default)]
struct OpenDialogs {
    attach: Option<FrameHandle>,
    upload: Option<FrameHandle>,
}

impl OpenDialogs {
    fn attach(&self) -> Result<&FrameHandle, ReconError> {
        self.attach
            .as_ref()
            .ok_or_else(|| ReconError::Script("attachment dialog is not open".into()))
    }

    fn upload(&self) -> Result<&FrameHandle, ReconError> {
        self.upload
            .as_ref()
            .ok_or_else(|| ReconError::Script("upload dialog is not open".into()))
    }
}

pub struct UploadOrchestrator<'a> {
    page: &'a Page,
}

impl<'a> UploadOrchestrator<'a> {
    pub fn new(page: &'a Page) -> Self {
        Self { page }
    }

    /// Drive one matched receipt from `Idle` to `Done`.
    #[instrument(level = "info", skip(self, matched), fields(receipt = %matched.receipt.line_item))]
    pub async fn run(&self, matched: &MatchResult) -> Result<UploadState, UploadFailure> {
        info!(">>> Processing: {} ({})", matched.receipt.line_item, matched.receipt.value);
        let mut dialogs = OpenDialogs::default();
        let mut state = UploadState::Idle;
        while !state.is_terminal() {
            match self.advance(&state, matched, &mut dialogs).await {
                Ok(next) => {
                    debug!(from = %state, to = %next, "Upload transition");
                    state = next;
                }
                Err(error) => {
                    error!(state = %state, "Upload failed: {}", error);
                    if !error.is_fatal() {
                        self.close_dialogs(dialogs).await;
                    }
                    return Err(UploadFailure {
                        reached: state,
                        error,
                    });
                }
            }
        }
        info!("<<< Done: {}", matched.receipt.line_item);
        Ok(state)
    }

    /// Close whatever a failed traversal left open, innermost dialog first.
    /// Close failures are logged only.
    async fn close_dialogs(&self, dialogs: OpenDialogs) {
        for frame in [dialogs.upload, dialogs.attach].into_iter().flatten() {
            match self.close_dialog(&frame).await {
                Ok(true) => {
                    debug!(frame = %frame.id, "Closed dialog after failure");
                    self.page
                        .settle(
                            self.page.profile().delays.after_upload_closed_ms,
                            "dialog to close",
                        )
                        .await;
                }
                Ok(false) => warn!(frame = %frame.id, "Dialog has no cancel or OK control"),
                Err(e) => warn!(frame = %frame.id, "Could not close dialog: {}", e),
            }
        }
    }

    async fn close_dialog(&self, frame: &FrameHandle) -> Result<bool, ReconError> {
        let selectors = &self.page.profile().selectors;
        for control in [&selectors.cancel_control, &selectors.ok_control] {
            let found = self
                .page
                .locator_in(frame.context.clone(), control.clone())
                .first_now()
                .await?;
            if let Some(control) = found {
                control.click().await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn advance(
        &self,
        state: &UploadState,
        matched: &MatchResult,
        dialogs: &mut OpenDialogs,
    ) -> Result<UploadState, ReconError> {
        let profile = self.page.profile();
        let selectors = &profile.selectors;
        let delays = &profile.delays;
        let receipt = &matched.receipt;

        match state {
            UploadState::Idle => {
                self.page
                    .locator(selectors.row.clone())
                    .all()
                    .await?
                    .into_iter()
                    .find(|row| row.reference() == &matched.row.row)
                    .ok_or_else(|| ReconError::ElementDetached(matched.row.row.handle.clone()))?
                    .click()
                    .await?;
                self.page
                    .settle(delays.after_row_select_ms, "row details to load")
                    .await;
                Ok(UploadState::RowSelected)
            }
            UploadState::RowSelected => {
                let description = self
                    .page
                    .locator(selectors.description_field.clone())
                    .wait(None)
                    .await?;
                description
                    .fill(&receipt.line_item, DESCRIPTION_EVENTS)
                    .await?;
                self.page
                    .settle(delays.after_description_ms, "description change to process")
                    .await;
                Ok(UploadState::DescriptionSet)
            }
            UploadState::DescriptionSet => {
                let attach = self
                    .page
                    .locator(selectors.attach_control.clone())
                    .wait(None)
                    .await?;
                let frames = self.page.frames();
                let before = frames.snapshot().await?;
                attach.click().await?;
                dialogs.attach = Some(frames.discover(before, profile.timeouts.frame()).await?);
                Ok(UploadState::AttachDialogOpen)
            }
            UploadState::AttachDialogOpen => {
                let attach = dialogs.attach()?.context.clone();
                let add = self
                    .page
                    .locator_in(attach, selectors.add_attachment_control.clone())
                    .wait(None)
                    .await?;
                let frames = self.page.frames();
                let before = frames.snapshot().await?;
                add.click().await?;
                dialogs.upload = Some(frames.discover(before, profile.timeouts.frame()).await?);
                self.page
                    .settle(delays.upload_dialog_load_ms, "file upload modal to load")
                    .await;
                Ok(UploadState::UploadDialogOpen)
            }
            UploadState::UploadDialogOpen => {
                let upload = dialogs.upload()?.context.clone();
                let input = self
                    .page
                    .locator_in(upload, selectors.file_input.clone())
                    .wait(None)
                    .await?;
                input.attach_file(&receipt.source, FILE_EVENTS).await?;
                self.page
                    .settle(delays.after_file_staged_ms, "file selection to register")
                    .await;
                Ok(UploadState::FileStaged)
            }
            UploadState::FileStaged => {
                let upload = dialogs.upload()?.context.clone();
                info!("Clicking upload...");
                self.page
                    .locator_in(upload.clone(), selectors.upload_control.clone())
                    .wait(None)
                    .await?
                    .click()
                    .await?;

                let confirmed = self
                    .page
                    .locator_in(upload.clone(), selectors.completion_indicator.clone())
                    .wait(Some(profile.timeouts.upload()))
                    .await;
                match confirmed {
                    Ok(_) => info!("Upload success text detected."),
                    Err(ReconError::NotFound { .. }) => {
                        warn!("Upload text timeout. Checking if file exists in list anyway...");
                        let listing = self.page.text_content(&upload).await?;
                        if !listing.contains(receipt.source.name()) {
                            return Err(ReconError::UploadFailed(format!(
                                "{} not found in attachment list",
                                receipt.source.name()
                            )));
                        }
                        info!("Found {} in attachment list.", receipt.source.name());
                    }
                    Err(other) => return Err(other),
                }
                Ok(UploadState::UploadConfirmed)
            }
            UploadState::UploadConfirmed => {
                let upload = dialogs.upload()?.context.clone();
                self.page
                    .locator_in(upload, selectors.upload_ok_control.clone())
                    .wait(None)
                    .await?
                    .click()
                    .await?;
                dialogs.upload = None;
                self.page
                    .settle(delays.after_upload_closed_ms, "upload dialog to close")
                    .await;

                let attach = dialogs.attach()?.context.clone();
                self.page
                    .locator_in(attach.clone(), selectors.attachment_description.clone())
                    .wait(None)
                    .await?
                    .fill(&receipt.line_item, DESCRIPTION_EVENTS)
                    .await?;
                self.page
                    .locator_in(attach, selectors.save_control.clone())
                    .wait(None)
                    .await?
                    .click()
                    .await?;
                dialogs.attach = None;
                self.page
                    .settle(delays.after_attachment_saved_ms, "main page to settle")
                    .await;
                Ok(UploadState::AttachmentSaved)
            }
            UploadState::AttachmentSaved => Ok(UploadState::Done),
            UploadState::Done | UploadState::Failed(_) => Ok(state.clone()),
        }
    }
}

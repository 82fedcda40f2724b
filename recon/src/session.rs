//! One reconciliation run over a batch of documents.
//!
//! Receipts are processed strictly one at a time in input order: frame
//! discovery identifies the newest frame by count, which concurrent
//! triggering would break. Per-receipt and per-group failures are recorded
//! and the run continues. Anything else ends the run with a [`SessionAbort`].

use crate::report::{GroupOutcome, GroupStatus, ReceiptOutcome};
use crate::{
    AllocationGrouper, ClaimedRows, KeywordSource, MassAllocationDriver, Page, ReceiptIngestor,
    ReconError, SessionReport, SourceDocument, TransactionMatcher, UploadOrchestrator, UploadState,
};
use tracing::{error, info, instrument, warn};

/// A run that stopped early, with what it completed before stopping.
#[derive(Debug, thiserror::Error)]
#[error("reconciliation aborted: {error}")]
pub struct SessionAbort {
    #[source]
    pub error: ReconError,
    pub partial: SessionReport,
}

pub struct Session<'a> {
    page: &'a Page,
    keywords: &'a dyn KeywordSource,
}

impl<'a> Session<'a> {
    pub fn new(page: &'a Page, keywords: &'a dyn KeywordSource) -> Self {
        Self { page, keywords }
    }

    #[instrument(level = "info", skip_all, fields(documents = documents.len()))]
    pub async fn run(&self, documents: Vec<SourceDocument>) -> Result<SessionReport, SessionAbort> {
        let mut report = SessionReport::default();

        let batch = ReceiptIngestor::new(self.keywords, &self.page.profile().default_currency)
            .ingest(documents)
            .await;
        report.rejected = batch.rejected;
        if batch.receipts.is_empty() {
            return Err(abort(ReconError::EmptyBatch, report));
        }

        // The grid must be on screen before anything can be matched.
        if let Err(e) = self
            .page
            .locator(self.page.profile().selectors.row.clone())
            .wait(None)
            .await
        {
            return Err(abort(e, report));
        }

        let matcher = TransactionMatcher::new(self.page);
        let uploader = UploadOrchestrator::new(self.page);
        let mut claimed = ClaimedRows::default();
        let mut matched = Vec::new();

        for receipt in &batch.receipts {
            let found = match matcher.match_receipt(receipt, &mut claimed).await {
                Ok(found) => found,
                Err(ReconError::NoMatch { .. }) => {
                    report.receipts.push(ReceiptOutcome::unmatched(receipt));
                    continue;
                }
                Err(e) if e.is_fatal() => return Err(abort(e, report)),
                Err(e) => {
                    error!("Could not scan rows for {}: {}", receipt.label(), e);
                    report
                        .receipts
                        .push(ReceiptOutcome::failed(receipt, &UploadState::Idle, &e));
                    continue;
                }
            };
            match uploader.run(&found).await {
                Ok(_) => report.receipts.push(ReceiptOutcome::uploaded(receipt)),
                Err(failure) if failure.error.is_fatal() => {
                    return Err(abort(failure.error, report))
                }
                Err(failure) => {
                    report.receipts.push(ReceiptOutcome::failed(
                        receipt,
                        &failure.reached,
                        &failure.error,
                    ));
                }
            }
            matched.push(found.receipt);
        }

        let grouping = AllocationGrouper::group(&matched);
        for receipt in &grouping.unallocated {
            warn!("No accounting keywords for {}, skipping allocation", receipt.label());
            report.unallocated.push(receipt.label());
        }

        let driver = MassAllocationDriver::new(self.page);
        for group in grouping.iter() {
            let status = match driver.apply(group).await {
                Ok(outcome) => GroupStatus::from(outcome),
                Err(e) if e.is_fatal() => return Err(abort(e, report)),
                Err(e) => {
                    error!("Allocation for {} failed: {}", group.key(), e);
                    GroupStatus::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            report.groups.push(GroupOutcome {
                key: group.key(),
                members: group.members.len(),
                status,
            });
        }

        info!(
            uploaded = report.uploaded(),
            unmatched = report.unmatched(),
            failed = report.failed(),
            groups = report.groups.len(),
            "Recon complete"
        );
        Ok(report)
    }
}

fn abort(error: ReconError, partial: SessionReport) -> SessionAbort {
    error!("Aborting run: {}", error);
    SessionAbort { error, partial }
}

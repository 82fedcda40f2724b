//! Matching receipts to rendered transaction rows by amount.

use crate::platforms::ElementRef;
use crate::utils::{amounts_match, parse_amount};
use crate::{Page, ReconError, Receipt};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Read-only view of one rendered transaction row. Rows are re-rendered
/// after every state transition, so a row is only valid until the next step.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRow {
    /// Position in document order
    pub index: usize,
    pub displayed_amount: f64,
    pub displayed_description: String,
    pub row: ElementRef,
}

/// A receipt paired with the row it will be attached to
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub receipt: Receipt,
    pub row: TransactionRow,
}

/// Row positions already paired with a receipt during one processing pass.
#[derive(Debug, Default, Clone)]
pub struct ClaimedRows {
    indices: HashSet<usize>,
}

impl ClaimedRows {
    pub fn claim(&mut self, row: &TransactionRow) -> bool {
        self.indices.insert(row.index)
    }

    pub fn is_claimed(&self, row: &TransactionRow) -> bool {
        self.indices.contains(&row.index)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

pub struct TransactionMatcher<'a> {
    page: &'a Page,
}

impl<'a> TransactionMatcher<'a> {
    pub fn new(page: &'a Page) -> Self {
        Self { page }
    }

    /// Read every currently rendered row. Rows whose amount cell is missing
    /// or unreadable are skipped.
    pub async fn scan(&self) -> Result<Vec<TransactionRow>, ReconError> {
        let selectors = &self.page.profile().selectors;
        let timeout = self.page.profile().timeouts.element();
        let rows = self.page.locator(selectors.row.clone()).all().await?;

        let mut scanned = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let amount_cell = row
                .locator(selectors.row_amount.clone(), timeout)
                .first_now()
                .await?;
            let Some(displayed_amount) = amount_cell.as_ref().and_then(|c| parse_amount(c.text()))
            else {
                debug!(index, "Row has no readable amount");
                continue;
            };
            let displayed_description = row
                .locator(selectors.row_description.clone(), timeout)
                .first_now()
                .await?
                .map(|c| c.text().trim().to_string())
                .unwrap_or_default();
            scanned.push(TransactionRow {
                index,
                displayed_amount,
                displayed_description,
                row: row.reference().clone(),
            });
        }
        debug!(rows = scanned.len(), "Scanned transaction rows");
        Ok(scanned)
    }

    /// First unclaimed row, in document order, whose amount matches the
    /// receipt within tolerance.
    pub fn find<'r>(
        receipt: &Receipt,
        rows: &'r [TransactionRow],
        claimed: &ClaimedRows,
    ) -> Option<&'r TransactionRow> {
        rows.iter().find(|row| {
            !claimed.is_claimed(row) && amounts_match(row.displayed_amount, receipt.value)
        })
    }

    /// Scan, pick, and claim a row for `receipt`.
    pub async fn match_receipt(
        &self,
        receipt: &Receipt,
        claimed: &mut ClaimedRows,
    ) -> Result<MatchResult, ReconError> {
        let rows = self.scan().await?;
        match Self::find(receipt, &rows, claimed) {
            Some(row) => {
                claimed.claim(row);
                Ok(MatchResult {
                    receipt: receipt.clone(),
                    row: row.clone(),
                })
            }
            None => {
                warn!("No match for {}", receipt.label());
                Err(ReconError::NoMatch {
                    value: receipt.value,
                })
            }
        }
    }
}

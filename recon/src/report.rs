//! The single operator summary produced at the end of a session.

use crate::{AllocationOutcome, Receipt, UploadState};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReceiptStatus {
    Uploaded,
    /// No transaction row matched; upload and allocation were skipped
    Unmatched,
    Failed { state: String, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiptOutcome {
    pub label: String,
    pub document: String,
    #[serde(flatten)]
    pub status: ReceiptStatus,
}

impl ReceiptOutcome {
    pub fn uploaded(receipt: &Receipt) -> Self {
        Self::new(receipt, ReceiptStatus::Uploaded)
    }

    pub fn unmatched(receipt: &Receipt) -> Self {
        Self::new(receipt, ReceiptStatus::Unmatched)
    }

    pub fn failed(receipt: &Receipt, reached: &UploadState, reason: impl ToString) -> Self {
        Self::new(
            receipt,
            ReceiptStatus::Failed {
                state: reached.to_string(),
                reason: reason.to_string(),
            },
        )
    }

    fn new(receipt: &Receipt, status: ReceiptStatus) -> Self {
        Self {
            label: receipt.label(),
            document: receipt.source.name().to_string(),
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupStatus {
    Committed { rows: usize },
    Cancelled,
    Failed { reason: String },
}

impl From<AllocationOutcome> for GroupStatus {
    fn from(outcome: AllocationOutcome) -> Self {
        match outcome {
            AllocationOutcome::Committed { rows } => GroupStatus::Committed { rows },
            AllocationOutcome::Cancelled => GroupStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupOutcome {
    pub key: String,
    pub members: usize,
    #[serde(flatten)]
    pub status: GroupStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionReport {
    /// Documents whose names did not parse
    pub rejected: Vec<String>,
    pub receipts: Vec<ReceiptOutcome>,
    /// Labels of matched receipts without two account keywords
    pub unallocated: Vec<String>,
    pub groups: Vec<GroupOutcome>,
}

impl SessionReport {
    pub fn uploaded(&self) -> usize {
        self.count(|s| matches!(s, ReceiptStatus::Uploaded))
    }

    pub fn unmatched(&self) -> usize {
        self.count(|s| matches!(s, ReceiptStatus::Unmatched))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ReceiptStatus::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&ReceiptStatus) -> bool) -> usize {
        self.receipts.iter().filter(|r| pred(&r.status)).count()
    }

    /// Nothing was rejected, skipped, cancelled or failed.
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
            && self.unallocated.is_empty()
            && self
                .receipts
                .iter()
                .all(|r| r.status == ReceiptStatus::Uploaded)
            && self
                .groups
                .iter()
                .all(|g| matches!(g.status, GroupStatus::Committed { .. }))
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Receipts: {} uploaded, {} unmatched, {} failed",
            self.uploaded(),
            self.unmatched(),
            self.failed()
        )?;
        for outcome in &self.receipts {
            match &outcome.status {
                ReceiptStatus::Uploaded => {}
                ReceiptStatus::Unmatched => writeln!(f, "  no match: {}", outcome.label)?,
                ReceiptStatus::Failed { state, reason } => {
                    writeln!(f, "  failed:   {} at {}: {}", outcome.label, state, reason)?
                }
            }
        }
        for name in &self.rejected {
            writeln!(f, "  rejected: {name}")?;
        }
        for label in &self.unallocated {
            writeln!(f, "  no accounting keywords: {label}")?;
        }

        if !self.groups.is_empty() {
            writeln!(f, "Allocation groups:")?;
        }
        for group in &self.groups {
            match &group.status {
                GroupStatus::Committed { rows } => writeln!(
                    f,
                    "  {}: committed {} of {} rows",
                    group.key, rows, group.members
                )?,
                GroupStatus::Cancelled => {
                    writeln!(f, "  {}: cancelled, no matching rows", group.key)?
                }
                GroupStatus::Failed { reason } => {
                    writeln!(f, "  {}: failed: {}", group.key, reason)?
                }
            }
        }
        Ok(())
    }
}

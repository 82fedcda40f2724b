//! Bulk account coding for allocation groups.
//!
//! Each group gets one pass through the remote bulk-edit dialog: open it,
//! select the dialog rows belonging to the group's members, fill the shared
//! department and account fields and commit. A dialog in which nothing
//! matches is cancelled instead of committed.

use crate::platforms::{ContextId, DomEvent};
use crate::utils::{amounts_match, parse_amount, wait_for};
use crate::{AllocationGroup, Element, Page, ReconError, Receipt};
use tracing::{debug, info, instrument, warn};

/// Each coding write is validated by the remote application on Enter.
const CODING_EVENTS: &[DomEvent] = &[DomEvent::Change, DomEvent::EnterKey, DomEvent::Blur];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationOutcome {
    /// The edit was committed with this many selected rows
    Committed { rows: usize },
    /// Nothing in the dialog matched; the dialog was dismissed
    Cancelled,
}

/// One candidate row as rendered in the bulk-edit dialog.
#[derive(Debug, Clone)]
pub struct DialogRow {
    pub amount: Option<f64>,
    pub description: String,
    select: Option<Element>,
}

impl DialogRow {
    /// True when some member matches both the amount (within tolerance) and
    /// the line item exactly.
    pub fn belongs_to(&self, members: &[Receipt]) -> bool {
        let Some(amount) = self.amount else {
            return false;
        };
        members
            .iter()
            .any(|m| amounts_match(amount, m.value) && self.description == m.line_item)
    }
}

pub struct MassAllocationDriver<'a> {
    page: &'a Page,
}

impl<'a> MassAllocationDriver<'a> {
    pub fn new(page: &'a Page) -> Self {
        Self { page }
    }

    /// Apply one group's coding. The between-groups settle delay follows every
    /// outcome except a lost bridge.
    #[instrument(level = "info", skip(self, group), fields(key = %group.key()))]
    pub async fn apply(&self, group: &AllocationGroup) -> Result<AllocationOutcome, ReconError> {
        info!(
            "Doing Accounting: {} ({} receipts)",
            group.key(),
            group.members.len()
        );
        let result = self.allocate(group).await;
        if !matches!(&result, Err(e) if e.is_fatal()) {
            self.page
                .settle(self.page.profile().delays.between_groups_ms, "page refresh")
                .await;
        }
        result
    }

    async fn allocate(&self, group: &AllocationGroup) -> Result<AllocationOutcome, ReconError> {
        let profile = self.page.profile();
        let selectors = &profile.selectors;

        let trigger = self.find_trigger().await?;
        let frames = self.page.frames();
        let before = frames.snapshot().await?;
        trigger.click().await?;
        let dialog = frames.discover(before, profile.timeouts.frame()).await?.context;

        // The commit control renders last; once it exists the rows are complete.
        self.page
            .locator_in(dialog.clone(), selectors.commit_control.clone())
            .wait(None)
            .await?;

        let rows = self.dialog_rows(&dialog).await?;
        let mut selected = 0;
        for row in rows.iter().filter(|r| r.belongs_to(&group.members)) {
            let Some(select) = &row.select else {
                warn!(description = %row.description, "Matching row has no selection control");
                continue;
            };
            select.set_checked(true).await?;
            selected += 1;
        }
        debug!(candidates = rows.len(), selected, "Selected dialog rows");

        let outcome = if selected == 0 {
            warn!("No rows in the bulk-edit dialog match group {}", group.key());
            self.dismiss(&dialog).await?;
            AllocationOutcome::Cancelled
        } else {
            self.fill_coding(&dialog, group).await?;
            self.page
                .settle(profile.delays.before_commit_ms, "validation to finish")
                .await;
            self.page
                .locator_in(dialog, selectors.commit_control.clone())
                .wait(None)
                .await?
                .click()
                .await?;
            AllocationOutcome::Committed { rows: selected }
        };
        Ok(outcome)
    }

    /// Poll for the bulk-edit trigger: the outer document first, then every
    /// open frame in document order.
    async fn find_trigger(&self) -> Result<Element, ReconError> {
        let profile = self.page.profile();
        let trigger = &profile.selectors.bulk_edit_trigger;
        let frames = &self.page.frames();
        let page = self.page;

        let found = wait_for(
            profile.timeouts.element(),
            profile.timeouts.poll_interval(),
            move || async move {
                if let Some(element) = page.locator(trigger.clone()).first_now().await? {
                    return Ok(Some(element));
                }
                for frame in frames.open_frames().await? {
                    let in_frame = page.locator_in(frame.context, trigger.clone());
                    if let Some(element) = in_frame.first_now().await? {
                        debug!(frame = %frame.id, "Bulk-edit trigger found in frame");
                        return Ok(Some(element));
                    }
                }
                Ok::<_, ReconError>(None)
            },
        )
        .await?;

        found.ok_or_else(|| ReconError::NotFound {
            selector: trigger.to_string(),
            context: "top document or any open frame".to_string(),
            timeout: profile.timeouts.element(),
        })
    }

    async fn dialog_rows(&self, dialog: &ContextId) -> Result<Vec<DialogRow>, ReconError> {
        let selectors = &self.page.profile().selectors;
        let timeout = self.page.profile().timeouts.element();
        let mut rows = Vec::new();
        for row in self
            .page
            .locator_in(dialog.clone(), selectors.dialog_row.clone())
            .all()
            .await?
        {
            let amount = row
                .locator(selectors.dialog_row_amount.clone(), timeout)
                .first_now()
                .await?
                .and_then(|cell| parse_amount(displayed(&cell)));
            let description = row
                .locator(selectors.dialog_row_description.clone(), timeout)
                .first_now()
                .await?
                .map(|cell| displayed(&cell).trim().to_string())
                .unwrap_or_default();
            let select = row
                .locator(selectors.dialog_row_select.clone(), timeout)
                .first_now()
                .await?;
            rows.push(DialogRow {
                amount,
                description,
                select,
            });
        }
        Ok(rows)
    }

    async fn fill_coding(
        &self,
        dialog: &ContextId,
        group: &AllocationGroup,
    ) -> Result<(), ReconError> {
        let profile = self.page.profile();
        let department = format!(
            "{}{}",
            profile.coding.department_prefix, group.coding.department
        );
        let fields = [
            (&profile.selectors.department_field, department.as_str()),
            (&profile.selectors.account_field, group.coding.account.as_str()),
        ];
        for (selector, value) in fields {
            debug!("Simulating Enter on: {}", selector);
            self.page
                .locator_in(dialog.clone(), selector.clone())
                .wait(None)
                .await?
                .fill(value, CODING_EVENTS)
                .await?;
            self.page
                .settle(profile.delays.after_coding_field_ms, "field validation")
                .await;
        }
        Ok(())
    }

    /// Cancel when the dialog offers it, otherwise close with OK.
    async fn dismiss(&self, dialog: &ContextId) -> Result<(), ReconError> {
        let selectors = &self.page.profile().selectors;
        let cancel = self
            .page
            .locator_in(dialog.clone(), selectors.cancel_control.clone())
            .first_now()
            .await?;
        match cancel {
            Some(cancel) => cancel.click().await,
            None => {
                debug!("No cancel control, closing with OK");
                self.page
                    .locator_in(dialog.clone(), selectors.ok_control.clone())
                    .wait(None)
                    .await?
                    .click()
                    .await
            }
        }
    }
}

// Input cells carry their content in `value`, plain cells in text.
fn displayed(cell: &Element) -> &str {
    match cell.value() {
        Some(value) if !value.is_empty() => value,
        _ => cell.text(),
    }
}

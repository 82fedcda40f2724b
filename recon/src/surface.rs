//! Surface profile: the structural identifiers, timeouts and settle delays
//! the workflow depends on. Defaults match the remote PeopleSoft card
//! reconciliation pages; a YAML file can override any field.

use crate::{ReconError, Selector};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceProfile {
    pub selectors: SurfaceSelectors,
    pub timeouts: Timeouts,
    pub delays: SettleDelays,
    pub coding: CodingFields,
    pub default_currency: String,
}

impl Default for SurfaceProfile {
    fn default() -> Self {
        Self {
            selectors: SurfaceSelectors::default(),
            timeouts: Timeouts::default(),
            delays: SettleDelays::default(),
            coding: CodingFields::default(),
            default_currency: "USD".to_string(),
        }
    }
}

impl SurfaceProfile {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ReconError> {
        let profile: SurfaceProfile =
            serde_yaml::from_str(yaml).map_err(|e| ReconError::Config(e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ReconError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Reject selectors that can never match and zero-length poll intervals.
    pub fn validate(&self) -> Result<(), ReconError> {
        for (name, selector) in self.selectors.named() {
            if !selector.is_valid() {
                return Err(ReconError::Config(format!(
                    "selector '{name}' is invalid: {selector}"
                )));
            }
        }
        if self.timeouts.poll_interval_ms == 0 || self.timeouts.frame_poll_interval_ms == 0 {
            return Err(ReconError::Config("poll intervals must be non-zero".into()));
        }
        if self.default_currency.len() != 3
            || !self.default_currency.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(ReconError::Config(format!(
                "default currency '{}' is not a three-letter code",
                self.default_currency
            )));
        }
        Ok(())
    }
}

/// Roles of remote elements, by the selector that locates each one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceSelectors {
    // Transaction grid (outer document)
    pub row: Selector,
    pub row_amount: Selector,
    pub row_description: Selector,
    pub description_field: Selector,
    pub attach_control: Selector,

    /// Structural naming convention of modal frames
    pub modal_frame: Selector,

    // Attachment dialog (first frame)
    pub add_attachment_control: Selector,
    pub attachment_description: Selector,
    pub save_control: Selector,

    // Upload dialog (second frame)
    pub file_input: Selector,
    pub upload_control: Selector,
    pub completion_indicator: Selector,
    pub upload_ok_control: Selector,

    // Bulk-edit dialog
    pub bulk_edit_trigger: Selector,
    pub dialog_row: Selector,
    pub dialog_row_amount: Selector,
    pub dialog_row_description: Selector,
    pub dialog_row_select: Selector,
    pub department_field: Selector,
    pub account_field: Selector,
    pub commit_control: Selector,
    pub cancel_control: Selector,
    pub ok_control: Selector,
}

impl SurfaceSelectors {
    fn named(&self) -> Vec<(&'static str, &Selector)> {
        vec![
            ("row", &self.row),
            ("row_amount", &self.row_amount),
            ("row_description", &self.row_description),
            ("description_field", &self.description_field),
            ("attach_control", &self.attach_control),
            ("modal_frame", &self.modal_frame),
            ("add_attachment_control", &self.add_attachment_control),
            ("attachment_description", &self.attachment_description),
            ("save_control", &self.save_control),
            ("file_input", &self.file_input),
            ("upload_control", &self.upload_control),
            ("completion_indicator", &self.completion_indicator),
            ("upload_ok_control", &self.upload_ok_control),
            ("bulk_edit_trigger", &self.bulk_edit_trigger),
            ("dialog_row", &self.dialog_row),
            ("dialog_row_amount", &self.dialog_row_amount),
            ("dialog_row_description", &self.dialog_row_description),
            ("dialog_row_select", &self.dialog_row_select),
            ("department_field", &self.department_field),
            ("account_field", &self.account_field),
            ("commit_control", &self.commit_control),
            ("cancel_control", &self.cancel_control),
            ("ok_control", &self.ok_control),
        ]
    }
}

impl Default for SurfaceSelectors {
    fn default() -> Self {
        Self {
            row: Selector::from("li.ps_grid-row"),
            row_amount: Selector::from("idprefix:MONETARY_AMT_DTL$"),
            row_description: Selector::from("idprefix:DESCR_DTL$"),
            description_field: Selector::from("id:DESCR$0"),
            attach_control: Selector::from("a[id^='EX_LINE_WRK_ATTACH_PB']"),
            modal_frame: Selector::from("iframe[id^='ptModFrame_']"),
            add_attachment_control: Selector::from("a[id^='C_EX_ATT_WRK_ATTACHADD']"),
            attachment_description: Selector::from("input[id^='ATTACH_DESCR$']"),
            save_control: Selector::from("id:#ICSave"),
            file_input: Selector::from("input[type='file'][id='#ICOrigFileName']"),
            upload_control: Selector::from("id:#ICUpload"),
            completion_indicator: Selector::from(".ps_attach-completetext"),
            upload_ok_control: Selector::from("id:#ICOK"),
            bulk_edit_trigger: Selector::from("a[id*='MASS_ALLOC']"),
            dialog_row: Selector::from("tr[id^='trC_EX_MASS_ALLOC']"),
            dialog_row_amount: Selector::from("idprefix:MONETARY_AMT$"),
            dialog_row_description: Selector::from("idprefix:DESCR$"),
            dialog_row_select: Selector::from("input[type='checkbox'][id^='SELECT_FLAG$']"),
            department_field: Selector::from("input[id^='DEPTID$']"),
            account_field: Selector::from("input[id^='ACCOUNT$']"),
            commit_control: Selector::from("id:DONE_PB"),
            cancel_control: Selector::from("id:CANCEL_PB"),
            ok_control: Selector::from("id:#ICOK"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub element_ms: u64,
    pub frame_ms: u64,
    /// Uploads are the slowest step on the remote side
    pub upload_ms: u64,
    pub poll_interval_ms: u64,
    pub frame_poll_interval_ms: u64,
    /// A frame whose document markup is this short has not started rendering
    pub frame_content_threshold: usize,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            element_ms: 30_000,
            frame_ms: 30_000,
            upload_ms: 45_000,
            poll_interval_ms: 100,
            frame_poll_interval_ms: 500,
            frame_content_threshold: 50,
        }
    }
}

impl Timeouts {
    pub fn element(&self) -> Duration {
        Duration::from_millis(self.element_ms)
    }

    pub fn frame(&self) -> Duration {
        Duration::from_millis(self.frame_ms)
    }

    pub fn upload(&self) -> Duration {
        Duration::from_millis(self.upload_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn frame_poll_interval(&self) -> Duration {
        Duration::from_millis(self.frame_poll_interval_ms)
    }
}

/// Fixed waits after each transition, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleDelays {
    pub after_row_select_ms: u64,
    pub after_description_ms: u64,
    pub upload_dialog_load_ms: u64,
    pub after_file_staged_ms: u64,
    pub after_upload_closed_ms: u64,
    pub after_attachment_saved_ms: u64,
    pub after_coding_field_ms: u64,
    pub before_commit_ms: u64,
    pub between_groups_ms: u64,
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            after_row_select_ms: 4_500,
            after_description_ms: 4_500,
            upload_dialog_load_ms: 3_500,
            after_file_staged_ms: 1_500,
            after_upload_closed_ms: 3_000,
            after_attachment_saved_ms: 5_000,
            after_coding_field_ms: 1_500,
            before_commit_ms: 2_000,
            between_groups_ms: 4_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodingFields {
    /// Prepended to the first keyword when filling the department field
    pub department_prefix: String,
}

impl Default for CodingFields {
    fn default() -> Self {
        Self {
            department_prefix: "1863".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let profile = SurfaceProfile::from_yaml_str(
            r#"
selectors:
  commit_control: "id:OK_PB"
timeouts:
  upload_ms: 60000
coding:
  department_prefix: ""
"#,
        )
        .unwrap();
        assert_eq!(profile.selectors.commit_control, Selector::Id("OK_PB".into()));
        assert_eq!(profile.selectors.row, Selector::Css("li.ps_grid-row".into()));
        assert_eq!(profile.timeouts.upload(), Duration::from_secs(60));
        assert_eq!(profile.timeouts.element(), Duration::from_secs(30));
        assert_eq!(profile.coding.department_prefix, "");
        assert_eq!(profile.default_currency, "USD");
    }

    #[test]
    fn invalid_selector_is_rejected() {
        let err = SurfaceProfile::from_yaml_str("selectors:\n  row: \"a >> \"\n").unwrap_err();
        assert!(matches!(err, ReconError::Config(_)));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let err = SurfaceProfile::from_yaml_str("timeouts:\n  poll_interval_ms: 0\n").unwrap_err();
        assert!(matches!(err, ReconError::Config(_)));
    }

    #[test]
    fn default_currency_must_be_three_letters() {
        for code in ["US1", "US", "EURO", "E$R"] {
            let yaml = format!("default_currency: \"{code}\"\n");
            let err = SurfaceProfile::from_yaml_str(&yaml).unwrap_err();
            assert!(matches!(err, ReconError::Config(_)), "{code} accepted");
        }
        let profile = SurfaceProfile::from_yaml_str("default_currency: eur\n").unwrap();
        assert_eq!(profile.default_currency, "eur");
    }
}

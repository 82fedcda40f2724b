//! Receipt ingestion: turns user-selected documents into normalized receipts.

use crate::keywords::KeywordSource;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A user-selected document. Bytes are only read when the file is staged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDocument {
    path: PathBuf,
    name: String,
}

impl SourceDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { path, name }
    }

    /// A document known only by name (documents handed over by another layer)
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path: PathBuf::from(&name),
            name,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name including extension, as shown by the remote attachment list
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &'static str {
        match self
            .path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .as_deref()
        {
            Some("pdf") => "application/pdf",
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            _ => "application/octet-stream",
        }
    }
}

/// Value, currency and line item recovered from a document name.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedName {
    pub value: f64,
    pub currency: String,
    pub line_item: String,
}

/// Parse `<value> <currency> - ... - <lineItem>.<ext>`.
///
/// The value has commas stripped, the currency falls back to
/// `default_currency` and is uppercased, the line item is the last
/// `-`-separated segment, trimmed. Names with a single segment, an
/// unparseable value, or a currency that is not three letters are rejected.
pub fn parse_file_name(file_name: &str, default_currency: &str) -> Option<ParsedName> {
    let stem = strip_extension(file_name);

    let parts: Vec<&str> = stem.split('-').collect();
    if parts.len() < 2 {
        return None;
    }

    let mut head = parts[0].split_whitespace();
    let value_text = head.next()?;
    let value = crate::utils::parse_amount(value_text)?;

    let currency = head.next().unwrap_or(default_currency).to_uppercase();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let line_item = parts[parts.len() - 1].trim().to_string();

    Some(ParsedName {
        value,
        currency,
        line_item,
    })
}

// The value segment carries its own decimal point, so only a trailing
// alphanumeric suffix after the last '-' counts as an extension.
fn strip_extension(file_name: &str) -> &str {
    let Some(dot) = file_name.rfind('.') else {
        return file_name;
    };
    let suffix = &file_name[dot + 1..];
    let after_last_dash = file_name.rfind('-').map_or(true, |dash| dot > dash);
    let looks_like_extension = !suffix.is_empty()
        && suffix.chars().all(|c| c.is_ascii_alphanumeric())
        && suffix.chars().any(|c| c.is_ascii_alphabetic());
    if dot > 0 && after_last_dash && looks_like_extension {
        &file_name[..dot]
    } else {
        file_name
    }
}

/// Department and account keywords shared by one allocation group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CodingKey {
    pub department: String,
    pub account: String,
}

impl CodingKey {
    pub fn key(&self) -> String {
        format!("{}-{}", self.department, self.account)
    }
}

/// Normalized record derived from one input document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Receipt {
    pub source: SourceDocument,
    pub value: f64,
    pub currency: String,
    pub line_item: String,
    pub account_keywords: Option<Vec<String>>,
}

impl Receipt {
    /// The first two keywords, when at least two are present
    pub fn coding_key(&self) -> Option<CodingKey> {
        match self.account_keywords.as_deref() {
            Some([department, account, ..]) => Some(CodingKey {
                department: department.clone(),
                account: account.clone(),
            }),
            _ => None,
        }
    }

    pub fn label(&self) -> String {
        format!("{} ({:.2} {})", self.line_item, self.value, self.currency)
    }
}

/// Result of ingesting a batch: usable receipts in input order plus the
/// names of documents that did not parse.
#[derive(Debug, Default)]
pub struct IngestedBatch {
    pub receipts: Vec<Receipt>,
    pub rejected: Vec<String>,
}

pub struct ReceiptIngestor<'a> {
    keywords: &'a dyn KeywordSource,
    default_currency: String,
}

impl<'a> ReceiptIngestor<'a> {
    pub fn new(keywords: &'a dyn KeywordSource, default_currency: impl Into<String>) -> Self {
        Self {
            keywords,
            default_currency: default_currency.into(),
        }
    }

    /// Normalize one document, or `None` when its name is malformed.
    pub async fn ingest_one(&self, document: SourceDocument) -> Option<Receipt> {
        let Some(parsed) = parse_file_name(document.name(), &self.default_currency) else {
            warn!(file = %document.name(), "Skipping document with malformed name");
            return None;
        };
        let account_keywords = self.keywords.keywords(&document).await;
        debug!(file = %document.name(), keywords = ?account_keywords, "Ingested receipt");
        Some(Receipt {
            source: document,
            value: parsed.value,
            currency: parsed.currency,
            line_item: parsed.line_item,
            account_keywords,
        })
    }

    pub async fn ingest(&self, documents: Vec<SourceDocument>) -> IngestedBatch {
        info!("Reading {} files...", documents.len());
        let mut batch = IngestedBatch::default();
        for document in documents {
            let name = document.name().to_string();
            match self.ingest_one(document).await {
                Some(receipt) => batch.receipts.push(receipt),
                None => batch.rejected.push(name),
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_value_currency_and_last_segment() {
        let parsed = parse_file_name("1,234.50 usd - Shell - Kampala -  FUEL .pdf", "USD").unwrap();
        assert_eq!(parsed.value, 1234.5);
        assert_eq!(parsed.currency, "USD");
        assert_eq!(parsed.line_item, "FUEL");
    }

    #[test]
    fn currency_defaults_when_missing() {
        let parsed = parse_file_name("42 - Lunch.pdf", "MZN").unwrap();
        assert_eq!(parsed.currency, "MZN");
        assert_eq!(parsed.line_item, "Lunch");
    }

    #[test]
    fn single_segment_is_rejected() {
        assert!(parse_file_name("100.00 USD FUEL.pdf", "USD").is_none());
    }

    #[test]
    fn bad_value_or_currency_is_rejected() {
        assert!(parse_file_name("abc USD - X - FUEL.pdf", "USD").is_none());
        assert!(parse_file_name("10 DOLLARS - X - FUEL.pdf", "USD").is_none());
        assert!(parse_file_name(" - FUEL.pdf", "USD").is_none());
    }

    #[test]
    fn extension_is_optional() {
        let parsed = parse_file_name("50.00 EUR - Y - Taxi", "USD").unwrap();
        assert_eq!(parsed.line_item, "Taxi");
        assert_eq!(parsed.currency, "EUR");
    }

    #[test]
    fn coding_key_needs_two_keywords() {
        let mut receipt = Receipt {
            source: SourceDocument::named("100.00 USD - X - FUEL.pdf"),
            value: 100.0,
            currency: "USD".into(),
            line_item: "FUEL".into(),
            account_keywords: Some(vec!["300".into()]),
        };
        assert!(receipt.coding_key().is_none());
        receipt.account_keywords = Some(vec!["400".into(), "5170".into(), "x".into()]);
        assert_eq!(receipt.coding_key().unwrap().key(), "400-5170");
        receipt.account_keywords = None;
        assert!(receipt.coding_key().is_none());
    }
}

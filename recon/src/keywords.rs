//! Account keywords carried in receipt metadata.

use crate::SourceDocument;
use lopdf::{Document, Object};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

static KEYWORD_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,; \t]+").expect("valid regex"));

/// Source of account keywords for a document. Implementations never fail:
/// anything unreadable is reported as "no keywords".
#[async_trait::async_trait]
pub trait KeywordSource: Send + Sync {
    async fn keywords(&self, document: &SourceDocument) -> Option<Vec<String>>;
}

/// Interpret a raw keyword string: a JSON array, or a delimiter-separated list.
pub fn parse_keywords(raw: &str) -> Option<Vec<String>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(raw) {
        let keywords = items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s.trim().to_string()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect();
        return Some(keywords);
    }

    let keywords: Vec<String> = KEYWORD_SPLIT
        .split(raw)
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();
    (!keywords.is_empty()).then_some(keywords)
}

/// Reads keywords from a PDF's metadata
#[derive(Debug, Default, Clone)]
pub struct PdfKeywords;

impl PdfKeywords {
    /// Extract the raw keyword string from PDF bytes, preferring the
    /// information dictionary over XMP. The document is read through its
    /// cross-reference chain, so the newest revision wins.
    pub fn extract_raw(bytes: &[u8]) -> Result<Option<String>, lopdf::Error> {
        let doc = Document::load_mem(bytes)?;
        Ok(info_keywords(&doc).or_else(|| xmp_keywords(&doc)))
    }
}

#[async_trait::async_trait]
impl KeywordSource for PdfKeywords {
    async fn keywords(&self, document: &SourceDocument) -> Option<Vec<String>> {
        let bytes = match tokio::fs::read(document.path()).await {
            Ok(b) => b,
            Err(e) => {
                warn!("Metadata error for {}: {}", document.name(), e);
                return None;
            }
        };
        let raw = match Self::extract_raw(&bytes) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Metadata error for {}: {}", document.name(), e);
                return None;
            }
        };
        debug!(file = %document.name(), raw = %raw, "Read keyword metadata");
        parse_keywords(&raw)
    }
}

/// Used when no metadata is available; every receipt skips accounting.
#[derive(Debug, Default, Clone)]
pub struct NoKeywords;

#[async_trait::async_trait]
impl KeywordSource for NoKeywords {
    async fn keywords(&self, _document: &SourceDocument) -> Option<Vec<String>> {
        None
    }
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn trailer_entry<'a>(doc: &'a Document, key: &[u8]) -> Option<&'a Object> {
    resolve(doc, doc.trailer.get(key).ok()?)
}

fn info_keywords(doc: &Document) -> Option<String> {
    let info = trailer_entry(doc, b"Info")?.as_dict().ok()?;
    let raw = resolve(doc, info.get(b"Keywords").ok()?)?.as_str().ok()?;
    Some(text_string(raw))
}

fn xmp_keywords(doc: &Document) -> Option<String> {
    let catalog = trailer_entry(doc, b"Root")?.as_dict().ok()?;
    let stream = resolve(doc, catalog.get(b"Metadata").ok()?)?.as_stream().ok()?;
    let content = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());
    let xml = String::from_utf8_lossy(&content);
    let (_, rest) = xml.split_once("<pdf:Keywords>")?;
    let (value, _) = rest.split_once("</pdf:Keywords>")?;
    Some(value.trim().to_string())
}

// Text strings carry a UTF-16BE byte order mark, otherwise they are
// single-byte text.
fn text_string(bytes: &[u8]) -> String {
    match bytes.strip_prefix(&[0xFE, 0xFF]) {
        Some(rest) => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        None => String::from_utf8_lossy(bytes).into_owned(),
    }
}

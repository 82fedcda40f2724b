use lopdf::{dictionary, Document, Object};
use recon::{AllocationGrouper, PdfKeywords, ReceiptIngestor, SourceDocument, SurfaceProfile};
use std::path::Path;

fn write_receipt(dir: &Path, name: &str, keywords: Option<&str>) -> SourceDocument {
    let mut doc = Document::with_version("1.4");
    let pages = doc.add_object(dictionary! {
        "Type" => "Pages",
        "Kids" => Vec::<Object>::new(),
        "Count" => 0_i64,
    });
    let root = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages });
    doc.trailer.set("Root", root);
    let mut info = dictionary! { "Title" => Object::string_literal("Receipt") };
    if let Some(keywords) = keywords {
        info.set("Keywords", Object::string_literal(keywords));
    }
    let info = doc.add_object(info);
    doc.trailer.set("Info", info);

    let path = dir.join(name);
    doc.save(&path).expect("write receipt");
    SourceDocument::new(path)
}

#[tokio::test]
async fn ingested_batch_groups_by_metadata_keywords() {
    let dir = tempfile::tempdir().unwrap();
    let documents = vec![
        write_receipt(dir.path(), "100.00 USD - Shell - FUEL.pdf", Some(r#"["400","5170"]"#)),
        write_receipt(dir.path(), "1,250.00 eur - Hilton - HOTEL.pdf", Some("400, 5170")),
        write_receipt(dir.path(), "12.50 - Cafe - LUNCH.pdf", Some("300")),
        write_receipt(dir.path(), "8.00 USD - Uber - TAXI.pdf", None),
        write_receipt(dir.path(), "scan_0001.pdf", Some("400, 5170")),
    ];

    let profile = SurfaceProfile::default();
    let batch = ReceiptIngestor::new(&PdfKeywords, profile.default_currency.clone())
        .ingest(documents)
        .await;

    assert_eq!(batch.rejected, vec!["scan_0001.pdf".to_string()]);
    assert_eq!(batch.receipts.len(), 4);

    let hotel = &batch.receipts[1];
    assert_eq!(hotel.value, 1250.0);
    assert_eq!(hotel.currency, "EUR");
    assert_eq!(hotel.line_item, "HOTEL");
    let lunch = &batch.receipts[2];
    assert_eq!(lunch.currency, "USD");
    assert_eq!(lunch.account_keywords, Some(vec!["300".to_string()]));
    assert_eq!(batch.receipts[3].account_keywords, None);

    let grouping = AllocationGrouper::group(&batch.receipts);
    assert_eq!(grouping.len(), 1);
    let group = grouping.get("400-5170").expect("group for 400-5170");
    let items: Vec<&str> = group.members.iter().map(|r| r.line_item.as_str()).collect();
    assert_eq!(items, vec!["FUEL", "HOTEL"]);
    assert_eq!(grouping.unallocated.len(), 2);
}

#[tokio::test]
async fn unreadable_document_has_no_keywords() {
    let dir = tempfile::tempdir().unwrap();
    let missing = SourceDocument::new(dir.path().join("10.00 USD - X - GONE.pdf"));

    let receipt = ReceiptIngestor::new(&PdfKeywords, "USD")
        .ingest_one(missing)
        .await
        .expect("name still parses");
    assert_eq!(receipt.account_keywords, None);
    assert!(receipt.coding_key().is_none());
}

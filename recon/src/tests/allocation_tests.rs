use super::fake_page::Interaction;
use super::init_tracing;
use super::remote_app::{ms, RemoteApp, TriggerPlacement};
use crate::platforms::DomEvent;
use crate::{
    AllocationGroup, AllocationOutcome, CodingKey, MassAllocationDriver, ReconError, Receipt,
    SourceDocument,
};
use tokio::time::Instant;

fn member(value: f64, line_item: &str) -> Receipt {
    Receipt {
        source: SourceDocument::named(format!("{value:.2} USD - X - {line_item}.pdf")),
        value,
        currency: "USD".into(),
        line_item: line_item.into(),
        account_keywords: Some(vec!["400".into(), "5170".into()]),
    }
}

fn group(members: Vec<Receipt>) -> AllocationGroup {
    AllocationGroup {
        coding: CodingKey {
            department: "400".into(),
            account: "5170".into(),
        },
        members,
    }
}

#[tokio::test(start_paused = true)]
async fn selects_rows_matching_amount_and_description_then_commits() {
    init_tracing();
    let app = RemoteApp::new();
    let dialogs = app.install_bulk_edit(
        &[
            ("100.00", "FUEL"),
            ("100.00", "TAXI"),
            ("50.00", "TAXI"),
            ("75.00", "HOTEL"),
        ],
        TriggerPlacement::Top,
        true,
    );
    let page = app.page();

    let outcome = MassAllocationDriver::new(&page)
        .apply(&group(vec![member(100.0, "FUEL"), member(50.0, "TAXI")]))
        .await
        .unwrap();
    assert_eq!(outcome, AllocationOutcome::Committed { rows: 2 });

    let dialog = dialogs.lock().unwrap()[0].clone();
    let checked: Vec<bool> = dialog
        .checkboxes
        .iter()
        .map(|h| app.fake.is_checked(h))
        .collect();
    assert_eq!(checked, vec![true, false, true, false]);

    assert_eq!(app.fake.value_of(&dialog.department).as_deref(), Some("1863400"));
    assert_eq!(app.fake.value_of(&dialog.account).as_deref(), Some("5170"));
    let coding_events: Vec<Vec<DomEvent>> = app
        .fake
        .interactions()
        .into_iter()
        .filter_map(|i| match i {
            Interaction::SetValue { events, .. } => Some(events),
            _ => None,
        })
        .collect();
    assert_eq!(
        coding_events,
        vec![vec![DomEvent::Change, DomEvent::EnterKey, DomEvent::Blur]; 2]
    );

    let clicks = app.fake.clicks();
    assert_eq!(clicks.last(), Some(&dialog.commit));
    assert!(!clicks.contains(dialog.cancel.as_ref().unwrap()));
}

#[tokio::test(start_paused = true)]
async fn empty_selection_cancels_and_never_commits() {
    let app = RemoteApp::new();
    let dialogs = app.install_bulk_edit(&[("100.00", "TAXI")], TriggerPlacement::Top, true);
    let page = app.page();

    let outcome = MassAllocationDriver::new(&page)
        .apply(&group(vec![member(100.0, "FUEL")]))
        .await
        .unwrap();
    assert_eq!(outcome, AllocationOutcome::Cancelled);

    let dialog = dialogs.lock().unwrap()[0].clone();
    let clicks = app.fake.clicks();
    assert!(clicks.contains(dialog.cancel.as_ref().unwrap()));
    assert!(!clicks.contains(&dialog.commit));
    assert!(!app
        .fake
        .interactions()
        .iter()
        .any(|i| matches!(i, Interaction::SetValue { .. } | Interaction::SetChecked { .. })));
}

#[tokio::test(start_paused = true)]
async fn dialog_without_cancel_is_closed_with_ok() {
    let app = RemoteApp::new();
    let dialogs = app.install_bulk_edit(&[("20.00", "PARKING")], TriggerPlacement::Top, false);
    let page = app.page();

    let outcome = MassAllocationDriver::new(&page)
        .apply(&group(vec![member(100.0, "FUEL")]))
        .await
        .unwrap();
    assert_eq!(outcome, AllocationOutcome::Cancelled);

    let dialog = dialogs.lock().unwrap()[0].clone();
    assert_eq!(app.fake.clicks().last(), Some(&dialog.ok));
}

#[tokio::test(start_paused = true)]
async fn trigger_inside_an_open_frame_is_found() {
    let app = RemoteApp::new();
    let dialogs = app.install_bulk_edit(&[("100.00", "FUEL")], TriggerPlacement::Frame, true);
    let page = app.page();

    let outcome = MassAllocationDriver::new(&page)
        .apply(&group(vec![member(100.0, "FUEL")]))
        .await
        .unwrap();
    assert_eq!(outcome, AllocationOutcome::Committed { rows: 1 });
    assert_eq!(dialogs.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_trigger_reports_every_searched_context() {
    let app = RemoteApp::new();
    let page = app.page();

    let start = Instant::now();
    let err = MassAllocationDriver::new(&page)
        .apply(&group(vec![member(100.0, "FUEL")]))
        .await
        .unwrap_err();
    match err {
        ReconError::NotFound { context, .. } => {
            assert_eq!(context, "top document or any open frame")
        }
        e => panic!("Expected NotFound, got {e:?}"),
    }
    // A failed pass still waits out the page refresh before returning.
    let profile = page.profile();
    assert!(
        start.elapsed()
            >= profile.timeouts.element() + ms(profile.delays.between_groups_ms)
    );
}

#[tokio::test(start_paused = true)]
async fn lost_bridge_returns_without_settling() {
    let app = RemoteApp::new();
    app.install_bulk_edit(&[("100.00", "FUEL")], TriggerPlacement::Top, true);
    app.fake.disconnect();
    let page = app.page();

    let start = Instant::now();
    let err = MassAllocationDriver::new(&page)
        .apply(&group(vec![member(100.0, "FUEL")]))
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(start.elapsed() < ms(page.profile().delays.between_groups_ms));
}

use super::fake_page::FakePage;
use super::init_tracing;
use crate::platforms::ContextId;
use crate::{Page, ReconError, SurfaceProfile};
use std::time::Duration;
use tokio::time::Instant;

fn page(fake: &std::sync::Arc<FakePage>) -> Page {
    Page::new(fake.clone(), SurfaceProfile::default())
}

#[tokio::test(start_paused = true)]
async fn resolves_within_one_poll_interval_of_appearance() {
    init_tracing();
    let fake = FakePage::new();
    let appears = Duration::from_millis(1_250);
    let handle = fake
        .element(ContextId::Top, "id:DESCR$0")
        .after(appears)
        .add();

    let start = Instant::now();
    let element = page(&fake)
        .locator("id:DESCR$0")
        .wait(Some(Duration::from_secs(5)))
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(element.reference().handle, handle);
    assert!(elapsed >= appears, "resolved before the element existed: {elapsed:?}");
    assert!(
        elapsed <= appears + Duration::from_millis(100),
        "resolved more than one poll interval late: {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn present_element_resolves_without_sleeping() {
    let fake = FakePage::new();
    fake.element(ContextId::Top, "li.ps_grid-row").add();

    let start = Instant::now();
    page(&fake)
        .locator("li.ps_grid-row")
        .wait(None)
        .await
        .unwrap();
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn missing_element_times_out_never_early() {
    init_tracing();
    let fake = FakePage::new();
    let timeout = Duration::from_secs(2);

    let start = Instant::now();
    let err = page(&fake)
        .locator("id:#ICUpload")
        .wait(Some(timeout))
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert!(elapsed >= timeout, "gave up early: {elapsed:?}");
    assert!(elapsed < timeout + Duration::from_millis(200));
    match err {
        ReconError::NotFound {
            selector, context, ..
        } => {
            assert_eq!(selector, "id:#ICUpload");
            assert_eq!(context, "top document");
        }
        e => panic!("Expected a NotFound error, but got {e:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn element_in_a_frame_is_not_found_in_the_top_document() {
    let fake = FakePage::new();
    let frame = ContextId::Frame("ptModFrame_0".into());
    fake.element(frame.clone(), "id:#ICSave").add();
    let page = page(&fake);

    assert!(page
        .locator("id:#ICSave")
        .wait(Some(Duration::from_millis(300)))
        .await
        .is_err());
    let found = page
        .locator_in(frame.clone(), "id:#ICSave")
        .wait(None)
        .await
        .unwrap();
    assert_eq!(found.context(), &frame);
}

#[tokio::test(start_paused = true)]
async fn scoped_locator_only_sees_descendants() {
    let fake = FakePage::new();
    let first = fake.element(ContextId::Top, "li.ps_grid-row").add();
    let second = fake.element(ContextId::Top, "li.ps_grid-row").add();
    fake.element(ContextId::Top, "idprefix:MONETARY_AMT_DTL$")
        .text("10.00")
        .inside(&first)
        .add();
    fake.element(ContextId::Top, "idprefix:MONETARY_AMT_DTL$")
        .text("20.00")
        .inside(&second)
        .add();

    let rows = page(&fake).locator("li.ps_grid-row").all().await.unwrap();
    assert_eq!(rows.len(), 2);
    let amount = rows[1]
        .locator("idprefix:MONETARY_AMT_DTL$", Duration::from_secs(1))
        .first_now()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(amount.text(), "20.00");
}

#[tokio::test(start_paused = true)]
async fn detached_scope_fails_instead_of_waiting() {
    let fake = FakePage::new();
    let row = fake.element(ContextId::Top, "li.ps_grid-row").add();
    let rows = page(&fake).locator("li.ps_grid-row").all().await.unwrap();
    fake.remove(&row);

    let start = Instant::now();
    let err = rows[0]
        .locator("idprefix:DESCR_DTL$", Duration::from_secs(30))
        .wait(None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconError::ElementDetached(h) if h == row));
    assert_eq!(start.elapsed(), Duration::ZERO);
}

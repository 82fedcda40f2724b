//! Polling primitive shared by every wait in the crate.
//!
//! The remote application exposes no completion events, so every wait is a
//! bounded poll: probe, return on success, otherwise sleep a fixed interval.

use crate::ReconError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Probe until it yields `Some`, or until `timeout` has elapsed.
///
/// The first probe runs immediately. The deadline is checked only after a
/// failed probe, so `Ok(None)` is never returned before `timeout` has passed.
/// Errors from the probe are returned as-is.
pub async fn wait_for<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<Option<T>, ReconError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, ReconError>>,
{
    let start = Instant::now();
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        if let Some(found) = probe().await? {
            trace!(attempts, elapsed = ?start.elapsed(), "wait satisfied");
            return Ok(Some(found));
        }
        if start.elapsed() >= timeout {
            trace!(attempts, elapsed = ?start.elapsed(), "wait expired");
            return Ok(None);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Parse a displayed amount: thousands separators and surrounding whitespace
/// are ignored. Non-finite values are rejected.
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    let value = cleaned.parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

/// Absolute tolerance for amount equality.
pub const AMOUNT_TOLERANCE: f64 = 0.01;

/// True when two amounts differ by strictly less than [`AMOUNT_TOLERANCE`].
pub fn amounts_match(a: f64, b: f64) -> bool {
    (a - b).abs() < AMOUNT_TOLERANCE
}

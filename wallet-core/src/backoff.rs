//! Bounded exponential backoff for sync-loop retries.

use std::cmp::min;
use std::time::Duration;

const INITIAL_WAIT_MS: u64 = 500;
/// The retry cap mandated for transport errors in the sync loop.
const MAXIMUM_WAIT_MS: u64 = 60_000;

/// An iterator of [`Duration`]s doubling from 500 ms up to a 60 s cap,
/// suitable for [`tokio::time::sleep`].
pub fn iter() -> impl Iterator<Item = Duration> {
    (0u32..).map(|attempt| {
        let factor = 2u64.saturating_pow(attempt);
        let wait_ms = INITIAL_WAIT_MS.saturating_mul(factor);
        Duration::from_millis(min(wait_ms, MAXIMUM_WAIT_MS))
    })
}

//! Busy-wait primitives.
//!
//! Waits poll a predicate against the platform with no yielding. They
//! report whether the bound was hit and leave any bookkeeping (connection
//! state, logging) to the caller.

use std::time::{Duration, Instant};
use thiserror::Error;

use crate::hw_trait::Platform;

/// A bounded wait ran out before its predicate cleared.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("condition still held after {budget:?}")]
pub struct Elapsed {
    pub budget: Duration,
}

/// Poll `busy` until it returns false, or fail once `budget` has passed
/// since `since`.
///
/// `since` is explicit so several consecutive waits can share one budget.
pub fn wait_while<P, F>(
    platform: &mut P,
    since: Instant,
    budget: Duration,
    mut busy: F,
) -> Result<(), Elapsed>
where
    P: Platform + ?Sized,
    F: FnMut(&mut P) -> bool,
{
    loop {
        if !busy(platform) {
            return Ok(());
        }
        if platform.now().saturating_duration_since(since) >= budget {
            return Err(Elapsed { budget });
        }
    }
}

/// Poll `busy` until it returns false, however long that takes.
pub fn spin_while<P, F>(platform: &mut P, mut busy: F)
where
    P: Platform + ?Sized,
    F: FnMut(&mut P) -> bool,
{
    while busy(platform) {}
}

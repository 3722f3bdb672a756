//! Match lifecycle status derivation and synchronization
//!
//! A match's status is a pure function of its window and the current time:
//!
//! ```text
//!   now <  start          -> Scheduled
//!   start <= now < end    -> Live
//!   now >= end            -> Finished
//! ```
//!
//! A missing or unparseable bound makes the status indeterminate; callers must
//! then leave the stored status alone.

use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};

use super::model::{MatchLifecycle, MatchStatus};
use super::store::StoreError;
use crate::utils::parse_iso;

/// Derive the lifecycle status for `now`.
///
/// Returns `None` (indeterminate) when either bound is missing.
pub fn derive_status(
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<MatchStatus> {
    let (start, end) = (start_time?, end_time?);

    if now < start {
        Some(MatchStatus::Scheduled)
    } else if now >= end {
        Some(MatchStatus::Finished)
    } else {
        Some(MatchStatus::Live)
    }
}

/// Same as [`derive_status`] for raw timestamp strings.
pub fn derive_status_from_str(start: &str, end: &str, now: DateTime<Utc>) -> Option<MatchStatus> {
    derive_status(parse_iso(start), parse_iso(end), now)
}

/// What a sync pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Stored status already matched the derived one
    Unchanged(MatchStatus),
    /// Derived status differed and was persisted
    Updated {
        from: MatchStatus,
        to: MatchStatus,
    },
    /// Window could not be evaluated; stored status left untouched
    Indeterminate(MatchStatus),
}

impl SyncOutcome {
    /// The authoritative status after the sync
    pub fn status(&self) -> MatchStatus {
        match *self {
            SyncOutcome::Unchanged(status) => status,
            SyncOutcome::Updated { to, .. } => to,
            SyncOutcome::Indeterminate(status) => status,
        }
    }
}

/// Error type for status synchronization
#[derive(Debug)]
pub enum SyncError {
    /// The persistence callback failed; the in-memory status was not changed
    Persist(StoreError),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Persist(e) => write!(f, "Failed to persist match status: {}", e),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Persist(e) => Some(e),
        }
    }
}

/// Bring `lifecycle.status` in line with the window at `now`.
///
/// `persist` is only invoked when the derived status differs from the stored
/// one, and the in-memory status is only updated after it succeeds.
pub async fn sync_status<F, Fut>(
    lifecycle: &mut MatchLifecycle,
    now: DateTime<Utc>,
    persist: F,
) -> Result<SyncOutcome, SyncError>
where
    F: FnOnce(MatchStatus) -> Fut,
    Fut: Future<Output = Result<(), StoreError>>,
{
    let Some(next) = derive_status(lifecycle.start_time, lifecycle.end_time, now) else {
        return Ok(SyncOutcome::Indeterminate(lifecycle.status));
    };

    if next == lifecycle.status {
        return Ok(SyncOutcome::Unchanged(next));
    }

    persist(next).await.map_err(SyncError::Persist)?;

    let from = std::mem::replace(&mut lifecycle.status, next);
    log::debug!(
        "match {} status {} -> {}",
        lifecycle.id,
        from.as_str(),
        next.as_str()
    );
    Ok(SyncOutcome::Updated { from, to: next })
}

//! Presence tracker: the per-caller breadcrumb state machine.
//!
//! # Responsibility
//! - Drive `Idle`/`Active` transitions through the breadcrumb repository.
//! - Stamp transitions from an injectable clock.
//! - Retry transitions that lose the SQLite write-lock race.
//!
//! # Invariants
//! - At most one active breadcrumb per caller at any instant.
//! - `start` at the current anchor opens a fresh session; it is not a no-op.
//! - `stop` with nothing active is a successful [`StopOutcome::NoActiveSession`].

use crate::clock::{Clock, SystemClock};
use crate::db::retry_on_busy;
use crate::model::{Breadcrumb, BreadcrumbId, CallerId, PresenceState};
use crate::repo::{BreadcrumbRepository, RepoError, RepoResult};
use log::{info, warn};
use std::time::Instant;

/// Retry budget used when none is configured.
pub const DEFAULT_BUSY_RETRIES: u32 = 5;

/// Result of a `stop` transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The session was deactivated; carries its final state.
    Stopped(Breadcrumb),
    /// Caller was already idle.
    NoActiveSession,
}

impl StopOutcome {
    pub fn stopped(&self) -> Option<&Breadcrumb> {
        match self {
            Self::Stopped(breadcrumb) => Some(breadcrumb),
            Self::NoActiveSession => None,
        }
    }
}

/// Use-case service for presence sessions.
pub struct PresenceTracker<R: BreadcrumbRepository, C: Clock = SystemClock> {
    repo: R,
    clock: C,
    busy_retries: u32,
}

impl<R: BreadcrumbRepository> PresenceTracker<R, SystemClock> {
    pub fn new(repo: R) -> Self {
        Self::with_clock(repo, SystemClock)
    }
}

impl<R: BreadcrumbRepository, C: Clock> PresenceTracker<R, C> {
    pub fn with_clock(repo: R, clock: C) -> Self {
        Self {
            repo,
            clock,
            busy_retries: DEFAULT_BUSY_RETRIES,
        }
    }

    /// Sets how many extra attempts a busy transition gets.
    pub fn with_busy_retries(mut self, busy_retries: u32) -> Self {
        self.busy_retries = busy_retries;
        self
    }

    /// Moves `caller` to `Active` at the anchor addressed by `anchor_key`.
    ///
    /// Any session the caller had open is closed in the same unit of work.
    ///
    /// # Errors
    /// - `NotFound` when the key resolves to no anchor visible to `caller`.
    /// - `Validation` when the key is blank or contains whitespace.
    pub fn start(&self, caller: &CallerId, anchor_key: &str) -> RepoResult<Breadcrumb> {
        let started_at = Instant::now();
        let result = retry_on_busy(self.busy_retries, || {
            self.repo
                .begin_session(caller, anchor_key, self.clock.now_ms())
        });

        match result {
            Ok(start) => {
                info!(
                    "event=presence_start module=presence status=ok breadcrumb_id={} anchor_id={} closed={} duration_ms={}",
                    start.breadcrumb.id,
                    start.breadcrumb.anchor_id,
                    start.closed,
                    started_at.elapsed().as_millis()
                );
                Ok(start.breadcrumb)
            }
            Err(err) => {
                log_failure("presence_start", &err, started_at);
                Err(err)
            }
        }
    }

    /// Moves `caller` to `Idle`.
    ///
    /// With `Some(id)`, only that breadcrumb is closed and it must be the
    /// caller's active one; otherwise `NotFound`.
    pub fn stop(&self, caller: &CallerId, id: Option<BreadcrumbId>) -> RepoResult<StopOutcome> {
        let started_at = Instant::now();
        let result = retry_on_busy(self.busy_retries, || {
            self.repo.end_session(caller, id, self.clock.now_ms())
        });

        match result {
            Ok(Some(breadcrumb)) => {
                info!(
                    "event=presence_stop module=presence status=ok breadcrumb_id={} dwell_ms={} duration_ms={}",
                    breadcrumb.id,
                    breadcrumb.dwell_ms(),
                    started_at.elapsed().as_millis()
                );
                Ok(StopOutcome::Stopped(breadcrumb))
            }
            Ok(None) => {
                info!(
                    "event=presence_stop module=presence status=noop reason=no_active_session duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(StopOutcome::NoActiveSession)
            }
            Err(err) => {
                log_failure("presence_stop", &err, started_at);
                Err(err)
            }
        }
    }

    /// Read-only projection of the active session.
    pub fn current(&self, caller: &CallerId) -> RepoResult<Option<Breadcrumb>> {
        self.repo.active_session(caller)
    }

    pub fn state(&self, caller: &CallerId) -> RepoResult<PresenceState> {
        Ok(PresenceState::from(self.current(caller)?.as_ref()))
    }

    /// Caller's sessions, most recent first. `None` uses the default page.
    pub fn history(&self, caller: &CallerId, limit: Option<u32>) -> RepoResult<Vec<Breadcrumb>> {
        self.repo.list_sessions(caller, limit)
    }

    pub fn last(&self, caller: &CallerId) -> RepoResult<Option<Breadcrumb>> {
        self.repo.last_session(caller)
    }
}

fn log_failure(event: &str, err: &RepoError, started_at: Instant) {
    warn!(
        "event={} module=presence status=error error_class={} duration_ms={}",
        event,
        err.class().as_str(),
        started_at.elapsed().as_millis()
    );
}

#[cfg(test)]
mod tests {
    use super::{PresenceTracker, StopOutcome};
    use crate::clock::ManualClock;
    use crate::db::open_db_in_memory;
    use crate::model::{CallerId, NewAnchor, NewZone, PresenceState};
    use crate::repo::{
        AnchorRepository, SqliteAnchorRepository, SqliteBreadcrumbRepository,
        SqliteZoneRepository, ZoneRepository,
    };
    use crate::scope::UnscopedPolicy;

    #[test]
    fn stop_when_idle_is_a_noop() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteBreadcrumbRepository::try_new(&conn, UnscopedPolicy::Creator).unwrap();
        let tracker = PresenceTracker::new(repo);
        let caller = CallerId::new("u1").unwrap();

        assert_eq!(tracker.stop(&caller, None).unwrap(), StopOutcome::NoActiveSession);
        assert_eq!(tracker.state(&caller).unwrap(), PresenceState::Idle);
    }

    #[test]
    fn start_uses_injected_clock() {
        let conn = open_db_in_memory().unwrap();
        let caller = CallerId::new("u1").unwrap();
        let zones = SqliteZoneRepository::try_new(&conn, UnscopedPolicy::Creator).unwrap();
        let zone = zones.create_zone(&caller, &NewZone::new("Home", "home")).unwrap();
        let anchors = SqliteAnchorRepository::try_new(&conn, UnscopedPolicy::Creator).unwrap();
        anchors
            .create_anchor(&caller, &NewAnchor::new("desk", "Desk").in_zone(zone.id))
            .unwrap();

        let clock = ManualClock::new(42_000);
        let repo = SqliteBreadcrumbRepository::try_new(&conn, UnscopedPolicy::Creator).unwrap();
        let tracker = PresenceTracker::with_clock(repo, &clock);

        let started = tracker.start(&caller, "DESK").unwrap();
        assert_eq!(started.started_at, 42_000);

        clock.advance(1_500);
        let stopped = tracker.stop(&caller, None).unwrap();
        assert_eq!(stopped.stopped().map(|b| b.dwell_ms()), Some(1_500));
    }
}

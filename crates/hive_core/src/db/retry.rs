//! Bounded retry for write units that lose the SQLite write-lock race.

use super::DbError;
use log::warn;
use std::thread;
use std::time::Duration;

const BASE_DELAY_MS: u64 = 20;
const MAX_DELAY_MS: u64 = 1_000;

/// Errors that can report a transient `SQLITE_BUSY`/`SQLITE_LOCKED` cause.
pub trait BusyError {
    fn is_busy(&self) -> bool;
}

impl BusyError for DbError {
    fn is_busy(&self) -> bool {
        DbError::is_busy(self)
    }
}

/// Runs `op`, retrying up to `max_retries` extra times on busy errors.
///
/// Each retry re-runs the whole unit of work, so `op` must open and commit its
/// own transaction. Non-busy errors and the final busy error are returned
/// unchanged.
pub fn retry_on_busy<T, E, F>(max_retries: u32, mut op: F) -> Result<T, E>
where
    E: BusyError,
    F: FnMut() -> Result<T, E>,
{
    let mut attempt = 0u32;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_busy() && attempt < max_retries => {
                attempt += 1;
                let delay_ms = (BASE_DELAY_MS << (attempt - 1).min(16)).min(MAX_DELAY_MS);
                warn!(
                    "event=db_busy_retry module=db status=retry attempt={} delay_ms={}",
                    attempt, delay_ms
                );
                thread::sleep(Duration::from_millis(delay_ms));
            }
            Err(err) => return Err(err),
        }
    }
}

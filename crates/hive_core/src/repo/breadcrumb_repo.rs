//! Breadcrumb (presence session) persistence.
//!
//! # Responsibility
//! - Persist the per-caller presence state as rows, not process memory.
//! - Perform the close-all-then-open handover as one immediate transaction.
//!
//! # Invariants
//! - `ux_breadcrumbs_one_active` makes two active rows for one owner
//!   unrepresentable; the handover relies on it rather than on call order.
//! - A new session never starts before the owner's latest `last_action_at`.
//! - Rows are only ever deactivated here, never deleted.

use super::{
    ensure_connection_ready, parse_caller, parse_uuid, query_scoped, write_unit, RepoError,
    RepoResult,
};
use crate::model::{Breadcrumb, BreadcrumbId, CallerId};
use crate::scope::{ResourceKind, ScopeResolver, UnscopedPolicy};
use rusqlite::types::Value;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

/// Page size used when the caller gives no history limit.
pub const DEFAULT_HISTORY_LIMIT: u32 = 20;
pub const MAX_HISTORY_LIMIT: u32 = 100;

const BREADCRUMB_COLUMNS: &str =
    "b.id, b.anchor_id, b.owner_id, b.started_at, b.last_action_at, b.active";

/// Clamps a requested history page into `[1, MAX_HISTORY_LIMIT]`.
pub fn normalize_history_limit(limit: Option<u32>) -> u32 {
    limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

/// Result of an atomic session handover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStart {
    pub breadcrumb: Breadcrumb,
    /// Sessions deactivated by this start (0 or 1 while the index holds).
    pub closed: usize,
}

/// Repository interface for presence sessions.
pub trait BreadcrumbRepository {
    /// Closes every active session of `caller` and opens one at the anchor
    /// addressed by `anchor_key`, in one unit of work.
    fn begin_session(
        &self,
        caller: &CallerId,
        anchor_key: &str,
        now: i64,
    ) -> RepoResult<SessionStart>;
    /// Deactivates `id`, or the caller's active session when `id` is `None`.
    ///
    /// Returns `Ok(None)` only for `id == None` with nothing active; a given
    /// id that is not active and visible is `NotFound`. The `None` path finds
    /// the session by owner even if its anchor is no longer visible.
    fn end_session(
        &self,
        caller: &CallerId,
        id: Option<BreadcrumbId>,
        now: i64,
    ) -> RepoResult<Option<Breadcrumb>>;
    /// The caller's open session, found by owner alone.
    fn active_session(&self, caller: &CallerId) -> RepoResult<Option<Breadcrumb>>;
    fn get_breadcrumb(&self, caller: &CallerId, id: BreadcrumbId)
        -> RepoResult<Option<Breadcrumb>>;
    /// Most recent first by `started_at`.
    fn list_sessions(&self, caller: &CallerId, limit: Option<u32>) -> RepoResult<Vec<Breadcrumb>>;
    /// Session with the greatest `last_action_at`, active or not.
    fn last_session(&self, caller: &CallerId) -> RepoResult<Option<Breadcrumb>>;
}

/// SQLite-backed breadcrumb repository.
pub struct SqliteBreadcrumbRepository<'conn> {
    conn: &'conn Connection,
    policy: UnscopedPolicy,
}

impl<'conn> SqliteBreadcrumbRepository<'conn> {
    pub fn try_new(conn: &'conn Connection, policy: UnscopedPolicy) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["zones", "anchors", "breadcrumbs"])?;
        Ok(Self { conn, policy })
    }
}

impl BreadcrumbRepository for SqliteBreadcrumbRepository<'_> {
    fn begin_session(
        &self,
        caller: &CallerId,
        anchor_key: &str,
        now: i64,
    ) -> RepoResult<SessionStart> {
        write_unit(self.conn, |tx| {
            let anchor_id =
                ScopeResolver::new(tx, self.policy).resolve_anchor_key(caller, anchor_key)?;

            let floor: Option<i64> = tx.query_row(
                "SELECT MAX(last_action_at) FROM breadcrumbs WHERE owner_id = ?1;",
                [caller.as_str()],
                |row| row.get(0),
            )?;
            let now = floor.map_or(now, |floor| floor.max(now));

            // Closes by owner alone: sessions at anchors the caller can no
            // longer see must not stay active either.
            let closed = tx.execute(
                "UPDATE breadcrumbs
                 SET
                    active = 0,
                    last_action_at = ?1
                 WHERE owner_id = ?2 AND active = 1;",
                params![now, caller.as_str()],
            )?;

            let breadcrumb = Breadcrumb {
                id: Uuid::new_v4(),
                anchor_id,
                owner_id: caller.clone(),
                started_at: now,
                last_action_at: now,
                active: true,
            };
            tx.execute(
                "INSERT INTO breadcrumbs (
                    id,
                    anchor_id,
                    owner_id,
                    started_at,
                    last_action_at,
                    active
                ) VALUES (?1, ?2, ?3, ?4, ?5, 1);",
                params![
                    breadcrumb.id.to_string(),
                    breadcrumb.anchor_id.to_string(),
                    breadcrumb.owner_id.as_str(),
                    breadcrumb.started_at,
                    breadcrumb.last_action_at,
                ],
            )?;

            Ok(SessionStart { breadcrumb, closed })
        })
    }

    fn end_session(
        &self,
        caller: &CallerId,
        id: Option<BreadcrumbId>,
        now: i64,
    ) -> RepoResult<Option<Breadcrumb>> {
        write_unit(self.conn, |tx| {
            let target = match id {
                Some(id) => Some(
                    select_breadcrumbs(
                        tx,
                        self.policy,
                        caller,
                        "AND b.id = ? AND b.active = 1",
                        vec![Value::Text(id.to_string())],
                    )?
                    .pop()
                    .ok_or_else(|| RepoError::not_found(ResourceKind::Breadcrumb, id))?,
                ),
                None => select_owned_active(tx, caller)?,
            };

            let Some(mut breadcrumb) = target else {
                return Ok(None);
            };
            breadcrumb.last_action_at = now.max(breadcrumb.last_action_at);
            breadcrumb.active = false;
            tx.execute(
                "UPDATE breadcrumbs
                 SET
                    active = 0,
                    last_action_at = ?1
                 WHERE id = ?2 AND active = 1;",
                params![breadcrumb.last_action_at, breadcrumb.id.to_string()],
            )?;
            Ok(Some(breadcrumb))
        })
    }

    fn active_session(&self, caller: &CallerId) -> RepoResult<Option<Breadcrumb>> {
        select_owned_active(self.conn, caller)
    }

    fn get_breadcrumb(
        &self,
        caller: &CallerId,
        id: BreadcrumbId,
    ) -> RepoResult<Option<Breadcrumb>> {
        Ok(select_breadcrumbs(
            self.conn,
            self.policy,
            caller,
            "AND b.id = ?",
            vec![Value::Text(id.to_string())],
        )?
        .pop())
    }

    fn list_sessions(&self, caller: &CallerId, limit: Option<u32>) -> RepoResult<Vec<Breadcrumb>> {
        select_breadcrumbs(
            self.conn,
            self.policy,
            caller,
            "ORDER BY b.started_at DESC, b.rowid DESC LIMIT ?",
            vec![Value::Integer(i64::from(normalize_history_limit(limit)))],
        )
    }

    fn last_session(&self, caller: &CallerId) -> RepoResult<Option<Breadcrumb>> {
        Ok(select_breadcrumbs(
            self.conn,
            self.policy,
            caller,
            "ORDER BY b.last_action_at DESC, b.rowid DESC LIMIT 1",
            Vec::new(),
        )?
        .pop())
    }
}

fn select_breadcrumbs(
    conn: &Connection,
    policy: UnscopedPolicy,
    caller: &CallerId,
    tail: &str,
    extra: Vec<Value>,
) -> RepoResult<Vec<Breadcrumb>> {
    let filter = ScopeResolver::new(conn, policy).filter(caller, ResourceKind::Breadcrumb);
    query_scoped(
        conn,
        filter,
        BREADCRUMB_COLUMNS,
        tail,
        extra,
        parse_breadcrumb_row,
    )
}

/// The owner's active row, if any, regardless of anchor visibility.
///
/// Presence is keyed on the owner like `ux_breadcrumbs_one_active`; an
/// anchor leaving the caller's scope must not hide the open session.
fn select_owned_active(conn: &Connection, caller: &CallerId) -> RepoResult<Option<Breadcrumb>> {
    let sql = format!(
        "SELECT {BREADCRUMB_COLUMNS}
         FROM breadcrumbs b
         WHERE b.owner_id = ?1 AND b.active = 1
         LIMIT 1;"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([caller.as_str()])?;
    match rows.next()? {
        Some(row) => parse_breadcrumb_row(row).map(Some),
        None => Ok(None),
    }
}

fn parse_breadcrumb_row(row: &Row<'_>) -> RepoResult<Breadcrumb> {
    let active = match row.get::<_, i64>("active")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid active value `{other}` in breadcrumbs.active"
            )));
        }
    };

    Ok(Breadcrumb {
        id: parse_uuid(row, "id", "breadcrumbs")?,
        anchor_id: parse_uuid(row, "anchor_id", "breadcrumbs")?,
        owner_id: parse_caller(row, "owner_id", "breadcrumbs")?,
        started_at: row.get("started_at")?,
        last_action_at: row.get("last_action_at")?,
        active,
    })
}

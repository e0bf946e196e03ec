//! Capture repository contracts and SQLite implementation.
//!
//! Captures are immutable: the contract has no update operation.

use super::{
    ensure_connection_ready, parse_caller, parse_code, parse_optional_uuid, parse_uuid,
    query_scoped, uuid_param, write_unit, RepoResult,
};
use crate::clock::now_epoch_ms;
use crate::model::{AnchorId, CallerId, Capture, CaptureId, CaptureSource, NewCapture, ZoneId};
use crate::scope::{ResourceKind, ResourceRef, ScopeResolver, UnscopedPolicy, WriteRefs};
use rusqlite::types::Value;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

/// Hard cap on one capture page.
pub const MAX_CAPTURE_PAGE: u32 = 50;

const CAPTURE_COLUMNS: &str =
    "c.id, c.raw_text, c.source, c.zone_id, c.anchor_id, c.created_by, c.created_at";

/// Query options for listing captures. `limit` is clamped to
/// [`MAX_CAPTURE_PAGE`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureListQuery {
    pub zone_id: Option<ZoneId>,
    pub anchor_id: Option<AnchorId>,
    pub limit: Option<u32>,
}

impl CaptureListQuery {
    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(MAX_CAPTURE_PAGE)
            .clamp(1, MAX_CAPTURE_PAGE)
    }
}

/// Repository interface for captures.
pub trait CaptureRepository {
    fn create_capture(&self, caller: &CallerId, capture: &NewCapture) -> RepoResult<Capture>;
    fn get_capture(&self, caller: &CallerId, id: CaptureId) -> RepoResult<Option<Capture>>;
    fn list_captures(
        &self,
        caller: &CallerId,
        query: &CaptureListQuery,
    ) -> RepoResult<Vec<Capture>>;
    fn delete_capture(&self, caller: &CallerId, id: CaptureId) -> RepoResult<()>;
}

/// SQLite-backed capture repository.
pub struct SqliteCaptureRepository<'conn> {
    conn: &'conn Connection,
    policy: UnscopedPolicy,
}

impl<'conn> SqliteCaptureRepository<'conn> {
    pub fn try_new(conn: &'conn Connection, policy: UnscopedPolicy) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["zones", "anchors", "captures"])?;
        Ok(Self { conn, policy })
    }
}

impl CaptureRepository for SqliteCaptureRepository<'_> {
    fn create_capture(&self, caller: &CallerId, capture: &NewCapture) -> RepoResult<Capture> {
        capture.validate()?;
        write_unit(self.conn, |tx| {
            ScopeResolver::new(tx, self.policy)
                .authorize_write(caller, &WriteRefs::new(capture.zone_id, capture.anchor_id))?;

            let record = Capture {
                id: Uuid::new_v4(),
                raw_text: capture.raw_text.clone(),
                source: capture.source,
                zone_id: capture.zone_id,
                anchor_id: capture.anchor_id,
                created_by: caller.clone(),
                created_at: now_epoch_ms(),
            };
            tx.execute(
                "INSERT INTO captures (
                    id,
                    raw_text,
                    source,
                    zone_id,
                    anchor_id,
                    created_by,
                    created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
                params![
                    record.id.to_string(),
                    record.raw_text.as_str(),
                    record.source.as_str(),
                    uuid_param(record.zone_id),
                    uuid_param(record.anchor_id),
                    record.created_by.as_str(),
                    record.created_at,
                ],
            )?;
            Ok(record)
        })
    }

    fn get_capture(&self, caller: &CallerId, id: CaptureId) -> RepoResult<Option<Capture>> {
        let filter =
            ScopeResolver::new(self.conn, self.policy).filter(caller, ResourceKind::Capture);
        let mut captures = query_scoped(
            self.conn,
            filter,
            CAPTURE_COLUMNS,
            "AND c.id = ?",
            vec![Value::Text(id.to_string())],
            parse_capture_row,
        )?;
        Ok(captures.pop())
    }

    fn list_captures(
        &self,
        caller: &CallerId,
        query: &CaptureListQuery,
    ) -> RepoResult<Vec<Capture>> {
        let filter =
            ScopeResolver::new(self.conn, self.policy).filter(caller, ResourceKind::Capture);
        let mut tail = String::new();
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(zone_id) = query.zone_id {
            tail.push_str("AND c.zone_id = ? ");
            bind_values.push(Value::Text(zone_id.to_string()));
        }
        if let Some(anchor_id) = query.anchor_id {
            tail.push_str("AND c.anchor_id = ? ");
            bind_values.push(Value::Text(anchor_id.to_string()));
        }
        tail.push_str("ORDER BY c.created_at DESC, c.id ASC LIMIT ?");
        bind_values.push(Value::Integer(i64::from(query.effective_limit())));

        query_scoped(
            self.conn,
            filter,
            CAPTURE_COLUMNS,
            &tail,
            bind_values,
            parse_capture_row,
        )
    }

    fn delete_capture(&self, caller: &CallerId, id: CaptureId) -> RepoResult<()> {
        write_unit(self.conn, |tx| {
            ScopeResolver::new(tx, self.policy).require(caller, &ResourceRef::Capture(id))?;
            tx.execute("DELETE FROM captures WHERE id = ?1;", [id.to_string()])?;
            Ok(())
        })
    }
}

fn parse_capture_row(row: &Row<'_>) -> RepoResult<Capture> {
    Ok(Capture {
        id: parse_uuid(row, "id", "captures")?,
        raw_text: row.get("raw_text")?,
        source: parse_code(row, "source", "captures", CaptureSource::parse)?,
        zone_id: parse_optional_uuid(row, "zone_id", "captures")?,
        anchor_id: parse_optional_uuid(row, "anchor_id", "captures")?,
        created_by: parse_caller(row, "created_by", "captures")?,
        created_at: row.get("created_at")?,
    })
}

//! Scan log persistence: append-only records of physical tag scans.

use super::breadcrumb_repo::normalize_history_limit;
use super::{
    ensure_connection_ready, parse_caller, parse_code, parse_uuid, query_scoped, write_unit,
    RepoResult,
};
use crate::clock::now_epoch_ms;
use crate::model::{CallerId, DeviceType, NewScan, ScanLog};
use crate::scope::{ResourceKind, ScopeResolver, UnscopedPolicy};
use rusqlite::types::Value;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

const SCAN_COLUMNS: &str = "s.id, s.anchor_id, s.device, s.location, s.scanned_at, s.created_by";

pub trait ScanLogRepository {
    /// Resolves the scanned key like a presence start and appends a record.
    fn log_scan(&self, caller: &CallerId, scan: &NewScan) -> RepoResult<ScanLog>;
    /// Scans of one anchor, most recent first.
    fn list_scans(
        &self,
        caller: &CallerId,
        anchor_key: &str,
        limit: Option<u32>,
    ) -> RepoResult<Vec<ScanLog>>;
}

pub struct SqliteScanLogRepository<'conn> {
    conn: &'conn Connection,
    policy: UnscopedPolicy,
}

impl<'conn> SqliteScanLogRepository<'conn> {
    pub fn try_new(conn: &'conn Connection, policy: UnscopedPolicy) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["zones", "anchors", "scan_logs"])?;
        Ok(Self { conn, policy })
    }
}

impl ScanLogRepository for SqliteScanLogRepository<'_> {
    fn log_scan(&self, caller: &CallerId, scan: &NewScan) -> RepoResult<ScanLog> {
        write_unit(self.conn, |tx| {
            let anchor_id =
                ScopeResolver::new(tx, self.policy).resolve_anchor_key(caller, &scan.anchor_key)?;
            let record = ScanLog {
                id: Uuid::new_v4(),
                anchor_id,
                device: scan.device,
                location: scan.normalized_location(),
                scanned_at: now_epoch_ms(),
                created_by: caller.clone(),
            };
            tx.execute(
                "INSERT INTO scan_logs (
                    id,
                    anchor_id,
                    device,
                    location,
                    scanned_at,
                    created_by
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                params![
                    record.id.to_string(),
                    record.anchor_id.to_string(),
                    record.device.as_str(),
                    record.location.as_deref(),
                    record.scanned_at,
                    record.created_by.as_str(),
                ],
            )?;
            Ok(record)
        })
    }

    fn list_scans(
        &self,
        caller: &CallerId,
        anchor_key: &str,
        limit: Option<u32>,
    ) -> RepoResult<Vec<ScanLog>> {
        let resolver = ScopeResolver::new(self.conn, self.policy);
        let anchor_id = resolver.resolve_anchor_key(caller, anchor_key)?;
        query_scoped(
            self.conn,
            resolver.filter(caller, ResourceKind::ScanLog),
            SCAN_COLUMNS,
            "AND s.anchor_id = ? ORDER BY s.scanned_at DESC, s.rowid DESC LIMIT ?",
            vec![
                Value::Text(anchor_id.to_string()),
                Value::Integer(i64::from(normalize_history_limit(limit))),
            ],
            parse_scan_row,
        )
    }
}

fn parse_scan_row(row: &Row<'_>) -> RepoResult<ScanLog> {
    Ok(ScanLog {
        id: parse_uuid(row, "id", "scan_logs")?,
        anchor_id: parse_uuid(row, "anchor_id", "scan_logs")?,
        device: parse_code(row, "device", "scan_logs", DeviceType::parse)?,
        location: row.get("location")?,
        scanned_at: row.get("scanned_at")?,
        created_by: parse_caller(row, "created_by", "scan_logs")?,
    })
}

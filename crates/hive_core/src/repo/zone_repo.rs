//! Zone repository contracts and SQLite implementation.
//!
//! # Invariants
//! - `owner_id` is written once from the calling identity and never updated.
//! - Deleting a zone removes every row whose ownership closure ends at it.

use super::{
    ensure_connection_ready, parse_caller, parse_uuid, query_scoped, unique_violation,
    write_unit, RepoError, RepoResult,
};
use crate::clock::now_epoch_ms;
use crate::model::{CallerId, NewZone, Zone, ZoneId, ZonePatch};
use crate::scope::{ResourceKind, ResourceRef, ScopeResolver, UnscopedPolicy};
use rusqlite::types::Value;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

const ZONE_COLUMNS: &str = "z.id,
    z.name,
    z.slug,
    z.owner_id,
    z.color,
    z.icon,
    z.description,
    z.created_at,
    z.updated_at";

/// Row counts removed by a zone delete, reported for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZoneDeletion {
    pub anchors: usize,
    /// Items removed, including those reachable only through the zone's anchors.
    pub items: usize,
    pub captures: usize,
}

/// Repository interface for zone CRUD.
pub trait ZoneRepository {
    fn create_zone(&self, caller: &CallerId, zone: &NewZone) -> RepoResult<Zone>;
    fn get_zone(&self, caller: &CallerId, id: ZoneId) -> RepoResult<Option<Zone>>;
    fn list_zones(&self, caller: &CallerId) -> RepoResult<Vec<Zone>>;
    fn update_zone(&self, caller: &CallerId, id: ZoneId, patch: ZonePatch) -> RepoResult<Zone>;
    fn delete_zone(&self, caller: &CallerId, id: ZoneId) -> RepoResult<ZoneDeletion>;
}

/// SQLite-backed zone repository.
pub struct SqliteZoneRepository<'conn> {
    conn: &'conn Connection,
    policy: UnscopedPolicy,
}

impl<'conn> SqliteZoneRepository<'conn> {
    pub fn try_new(conn: &'conn Connection, policy: UnscopedPolicy) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["zones", "anchors", "items", "captures"])?;
        Ok(Self { conn, policy })
    }
}

impl ZoneRepository for SqliteZoneRepository<'_> {
    fn create_zone(&self, caller: &CallerId, zone: &NewZone) -> RepoResult<Zone> {
        let zone = zone.normalized()?;
        let now = now_epoch_ms();
        let record = Zone {
            id: Uuid::new_v4(),
            name: zone.name,
            slug: zone.slug,
            owner_id: caller.clone(),
            color: zone.color,
            icon: zone.icon,
            description: zone.description,
            created_at: now,
            updated_at: now,
        };

        self.conn
            .execute(
                "INSERT INTO zones (
                    id,
                    name,
                    slug,
                    owner_id,
                    color,
                    icon,
                    description,
                    created_at,
                    updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
                params![
                    record.id.to_string(),
                    record.name.as_str(),
                    record.slug.as_str(),
                    record.owner_id.as_str(),
                    record.color.as_deref(),
                    record.icon.as_deref(),
                    record.description.as_deref(),
                    record.created_at,
                    record.updated_at,
                ],
            )
            .map_err(|err| map_zone_write_error(err, &record))?;

        Ok(record)
    }

    fn get_zone(&self, caller: &CallerId, id: ZoneId) -> RepoResult<Option<Zone>> {
        select_zone(self.conn, self.policy, caller, id)
    }

    fn list_zones(&self, caller: &CallerId) -> RepoResult<Vec<Zone>> {
        let filter = ScopeResolver::new(self.conn, self.policy).filter(caller, ResourceKind::Zone);
        query_scoped(
            self.conn,
            filter,
            ZONE_COLUMNS,
            "ORDER BY z.name ASC, z.rowid DESC",
            Vec::new(),
            parse_zone_row,
        )
    }

    fn update_zone(&self, caller: &CallerId, id: ZoneId, patch: ZonePatch) -> RepoResult<Zone> {
        write_unit(self.conn, |tx| {
            let mut zone = select_zone(tx, self.policy, caller, id)?
                .ok_or_else(|| RepoError::not_found(ResourceKind::Zone, id))?;
            if patch.is_empty() {
                return Ok(zone);
            }

            patch.apply_to(&mut zone)?;
            zone.updated_at = now_epoch_ms().max(zone.updated_at);
            tx.execute(
                "UPDATE zones
                 SET
                    name = ?1,
                    slug = ?2,
                    color = ?3,
                    icon = ?4,
                    description = ?5,
                    updated_at = ?6
                 WHERE id = ?7;",
                params![
                    zone.name.as_str(),
                    zone.slug.as_str(),
                    zone.color.as_deref(),
                    zone.icon.as_deref(),
                    zone.description.as_deref(),
                    zone.updated_at,
                    zone.id.to_string(),
                ],
            )
            .map_err(|err| map_zone_write_error(err, &zone))?;
            Ok(zone)
        })
    }

    fn delete_zone(&self, caller: &CallerId, id: ZoneId) -> RepoResult<ZoneDeletion> {
        write_unit(self.conn, |tx| {
            ScopeResolver::new(tx, self.policy).require(caller, &ResourceRef::Zone(id))?;
            let id_text = id.to_string();

            let anchors: i64 = tx.query_row(
                "SELECT COUNT(*) FROM anchors WHERE zone_id = ?1;",
                [&id_text],
                |row| row.get(0),
            )?;
            // Rows pointing at the zone only through one of its anchors would
            // otherwise survive with the anchor reference nulled.
            let anchored_items = tx.execute(
                "DELETE FROM items
                 WHERE zone_id IS NULL
                   AND anchor_id IN (SELECT id FROM anchors WHERE zone_id = ?1);",
                [&id_text],
            )?;
            let anchored_captures = tx.execute(
                "DELETE FROM captures
                 WHERE zone_id IS NULL
                   AND anchor_id IN (SELECT id FROM anchors WHERE zone_id = ?1);",
                [&id_text],
            )?;
            let zoned_items: i64 = tx.query_row(
                "SELECT COUNT(*) FROM items WHERE zone_id = ?1;",
                [&id_text],
                |row| row.get(0),
            )?;
            let zoned_captures: i64 = tx.query_row(
                "SELECT COUNT(*) FROM captures WHERE zone_id = ?1;",
                [&id_text],
                |row| row.get(0),
            )?;

            tx.execute("DELETE FROM zones WHERE id = ?1;", [&id_text])?;

            Ok(ZoneDeletion {
                anchors: count(anchors),
                items: anchored_items + count(zoned_items),
                captures: anchored_captures + count(zoned_captures),
            })
        })
    }
}

fn select_zone(
    conn: &Connection,
    policy: UnscopedPolicy,
    caller: &CallerId,
    id: ZoneId,
) -> RepoResult<Option<Zone>> {
    let filter = ScopeResolver::new(conn, policy).filter(caller, ResourceKind::Zone);
    let mut zones = query_scoped(
        conn,
        filter,
        ZONE_COLUMNS,
        "AND z.id = ?",
        vec![Value::Text(id.to_string())],
        parse_zone_row,
    )?;
    Ok(zones.pop())
}

fn map_zone_write_error(err: rusqlite::Error, zone: &Zone) -> RepoError {
    let conflict = match unique_violation(&err) {
        Some("zones.name") => Some(("name", zone.name.clone())),
        Some("zones.slug") => Some(("slug", zone.slug.clone())),
        _ => None,
    };
    match conflict {
        Some((field, value)) => RepoError::Conflict { field, value },
        None => err.into(),
    }
}

fn parse_zone_row(row: &Row<'_>) -> RepoResult<Zone> {
    Ok(Zone {
        id: parse_uuid(row, "id", "zones")?,
        name: row.get("name")?,
        slug: row.get("slug")?,
        owner_id: parse_caller(row, "owner_id", "zones")?,
        color: row.get("color")?,
        icon: row.get("icon")?,
        description: row.get("description")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn count(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}

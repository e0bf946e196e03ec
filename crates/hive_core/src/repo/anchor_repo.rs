//! Anchor repository contracts and SQLite implementation.
//!
//! # Invariants
//! - Keys are normalized before every insert and lookup; the column also
//!   compares `NOCASE` so legacy mixed-case rows still collide.
//! - Deleting an anchor cascades to breadcrumbs, scan logs, tags and routeset
//!   stops; items and captures survive with `anchor_id` cleared.
//! - Tags live in `anchor_tags` and are loaded per returned anchor.

use super::{
    ensure_connection_ready, parse_caller, parse_optional_uuid, parse_uuid, push_page,
    query_scoped, unique_violation, uuid_param, write_unit, RepoError, RepoResult,
};
use crate::clock::now_epoch_ms;
use crate::model::{
    normalize_anchor_key, Anchor, AnchorId, AnchorPatch, CallerId, NewAnchor, Patch, ZoneId,
};
use crate::scope::{ResourceKind, ResourceRef, ScopeResolver, UnscopedPolicy, WriteRefs};
use rusqlite::types::Value;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

pub(crate) const ANCHOR_COLUMNS: &str = "a.id,
    a.anchor_key,
    a.zone_id,
    a.name,
    a.description,
    a.location_hint,
    a.latitude,
    a.longitude,
    a.photo_url,
    a.floorplan_ref,
    a.created_by,
    a.created_at,
    a.updated_at";

/// Query options for listing anchors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnchorListQuery {
    pub zone_id: Option<ZoneId>,
    /// Matches anchors carrying this tag (normalized like stored tags).
    pub tag: Option<String>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for anchor CRUD and key lookup.
pub trait AnchorRepository {
    fn create_anchor(&self, caller: &CallerId, anchor: &NewAnchor) -> RepoResult<Anchor>;
    fn get_anchor(&self, caller: &CallerId, id: AnchorId) -> RepoResult<Option<Anchor>>;
    /// Case-insensitive lookup by external key.
    fn get_anchor_by_key(&self, caller: &CallerId, key: &str) -> RepoResult<Option<Anchor>>;
    fn list_anchors(&self, caller: &CallerId, query: &AnchorListQuery) -> RepoResult<Vec<Anchor>>;
    fn update_anchor(
        &self,
        caller: &CallerId,
        id: AnchorId,
        patch: AnchorPatch,
    ) -> RepoResult<Anchor>;
    fn delete_anchor(&self, caller: &CallerId, id: AnchorId) -> RepoResult<()>;
}

/// SQLite-backed anchor repository.
pub struct SqliteAnchorRepository<'conn> {
    conn: &'conn Connection,
    policy: UnscopedPolicy,
}

impl<'conn> SqliteAnchorRepository<'conn> {
    pub fn try_new(conn: &'conn Connection, policy: UnscopedPolicy) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["zones", "anchors", "anchor_tags"])?;
        Ok(Self { conn, policy })
    }
}

impl AnchorRepository for SqliteAnchorRepository<'_> {
    fn create_anchor(&self, caller: &CallerId, anchor: &NewAnchor) -> RepoResult<Anchor> {
        let anchor = anchor.normalized()?;
        write_unit(self.conn, |tx| {
            ScopeResolver::new(tx, self.policy)
                .authorize_write(caller, &WriteRefs::new(anchor.zone_id, None))?;

            let now = now_epoch_ms();
            let record = Anchor {
                id: Uuid::new_v4(),
                anchor_key: anchor.anchor_key,
                zone_id: anchor.zone_id,
                name: anchor.name,
                description: anchor.description,
                location_hint: anchor.location_hint,
                latitude: anchor.latitude,
                longitude: anchor.longitude,
                photo_url: anchor.photo_url,
                floorplan_ref: anchor.floorplan_ref,
                tags: anchor.tags,
                created_by: caller.clone(),
                created_at: now,
                updated_at: now,
            };
            tx.execute(
                "INSERT INTO anchors (
                    id,
                    anchor_key,
                    zone_id,
                    name,
                    description,
                    location_hint,
                    latitude,
                    longitude,
                    photo_url,
                    floorplan_ref,
                    created_by,
                    created_at,
                    updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13);",
                params![
                    record.id.to_string(),
                    record.anchor_key.as_str(),
                    uuid_param(record.zone_id),
                    record.name.as_str(),
                    record.description.as_deref(),
                    record.location_hint.as_deref(),
                    record.latitude,
                    record.longitude,
                    record.photo_url.as_deref(),
                    record.floorplan_ref.as_deref(),
                    record.created_by.as_str(),
                    record.created_at,
                    record.updated_at,
                ],
            )
            .map_err(|err| map_anchor_write_error(err, &record.anchor_key))?;
            replace_anchor_tags(tx, record.id, &record.tags)?;
            Ok(record)
        })
    }

    fn get_anchor(&self, caller: &CallerId, id: AnchorId) -> RepoResult<Option<Anchor>> {
        select_anchor(
            self.conn,
            self.policy,
            caller,
            "AND a.id = ?",
            Value::Text(id.to_string()),
        )
    }

    fn get_anchor_by_key(&self, caller: &CallerId, key: &str) -> RepoResult<Option<Anchor>> {
        let key = normalize_anchor_key(key)?;
        select_anchor(
            self.conn,
            self.policy,
            caller,
            "AND a.anchor_key = ?",
            Value::Text(key),
        )
    }

    fn list_anchors(&self, caller: &CallerId, query: &AnchorListQuery) -> RepoResult<Vec<Anchor>> {
        let filter =
            ScopeResolver::new(self.conn, self.policy).filter(caller, ResourceKind::Anchor);
        let mut tail = String::new();
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(zone_id) = query.zone_id {
            tail.push_str("AND a.zone_id = ? ");
            bind_values.push(Value::Text(zone_id.to_string()));
        }
        if let Some(tag) = query.tag.as_deref().map(|tag| tag.trim().to_lowercase()) {
            tail.push_str(
                "AND EXISTS (
                    SELECT 1 FROM anchor_tags t WHERE t.anchor_id = a.id AND t.tag = ?
                 ) ",
            );
            bind_values.push(Value::Text(tag));
        }

        tail.push_str("ORDER BY a.name ASC, a.anchor_key ASC, a.rowid DESC");
        push_page(&mut tail, &mut bind_values, query.limit, query.offset);

        let mut anchors = query_scoped(
            self.conn,
            filter,
            ANCHOR_COLUMNS,
            &tail,
            bind_values,
            parse_anchor_row,
        )?;
        attach_tags(self.conn, &mut anchors)?;
        Ok(anchors)
    }

    fn update_anchor(
        &self,
        caller: &CallerId,
        id: AnchorId,
        patch: AnchorPatch,
    ) -> RepoResult<Anchor> {
        write_unit(self.conn, |tx| {
            let mut anchor = select_anchor(
                tx,
                self.policy,
                caller,
                "AND a.id = ?",
                Value::Text(id.to_string()),
            )?
            .ok_or_else(|| RepoError::not_found(ResourceKind::Anchor, id))?;

            if let Patch::Set(zone_id) = patch.zone_id {
                ScopeResolver::new(tx, self.policy)
                    .authorize_write(caller, &WriteRefs::new(Some(zone_id), None))?;
            }

            let retag = patch.tags.is_some();
            patch.apply_to(&mut anchor)?;
            anchor.updated_at = now_epoch_ms().max(anchor.updated_at);
            tx.execute(
                "UPDATE anchors
                 SET
                    zone_id = ?1,
                    name = ?2,
                    description = ?3,
                    location_hint = ?4,
                    latitude = ?5,
                    longitude = ?6,
                    photo_url = ?7,
                    floorplan_ref = ?8,
                    updated_at = ?9
                 WHERE id = ?10;",
                params![
                    uuid_param(anchor.zone_id),
                    anchor.name.as_str(),
                    anchor.description.as_deref(),
                    anchor.location_hint.as_deref(),
                    anchor.latitude,
                    anchor.longitude,
                    anchor.photo_url.as_deref(),
                    anchor.floorplan_ref.as_deref(),
                    anchor.updated_at,
                    anchor.id.to_string(),
                ],
            )?;
            if retag {
                replace_anchor_tags(tx, anchor.id, &anchor.tags)?;
            }
            Ok(anchor)
        })
    }

    fn delete_anchor(&self, caller: &CallerId, id: AnchorId) -> RepoResult<()> {
        write_unit(self.conn, |tx| {
            ScopeResolver::new(tx, self.policy).require(caller, &ResourceRef::Anchor(id))?;
            tx.execute("DELETE FROM anchors WHERE id = ?1;", [id.to_string()])?;
            Ok(())
        })
    }
}

fn select_anchor(
    conn: &Connection,
    policy: UnscopedPolicy,
    caller: &CallerId,
    condition: &str,
    key: Value,
) -> RepoResult<Option<Anchor>> {
    let filter = ScopeResolver::new(conn, policy).filter(caller, ResourceKind::Anchor);
    let mut anchors = query_scoped(
        conn,
        filter,
        ANCHOR_COLUMNS,
        condition,
        vec![key],
        parse_anchor_row,
    )?;
    attach_tags(conn, &mut anchors)?;
    Ok(anchors.pop())
}

fn replace_anchor_tags(conn: &Connection, anchor_id: AnchorId, tags: &[String]) -> RepoResult<()> {
    let id_text = anchor_id.to_string();
    conn.execute("DELETE FROM anchor_tags WHERE anchor_id = ?1;", [&id_text])?;
    for tag in tags {
        conn.execute(
            "INSERT INTO anchor_tags (anchor_id, tag) VALUES (?1, ?2);",
            params![id_text, tag],
        )?;
    }
    Ok(())
}

/// Fills `tags` on rows built by [`parse_anchor_row`].
pub(crate) fn attach_tags(conn: &Connection, anchors: &mut [Anchor]) -> RepoResult<()> {
    let mut stmt =
        conn.prepare("SELECT tag FROM anchor_tags WHERE anchor_id = ?1 ORDER BY tag ASC;")?;
    for anchor in anchors.iter_mut() {
        let mut rows = stmt.query([anchor.id.to_string()])?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            tags.push(row.get::<_, String>(0)?);
        }
        anchor.tags = tags;
    }
    Ok(())
}

fn map_anchor_write_error(err: rusqlite::Error, anchor_key: &str) -> RepoError {
    if unique_violation(&err) == Some("anchors.anchor_key") {
        return RepoError::Conflict {
            field: "anchor_key",
            value: anchor_key.to_string(),
        };
    }
    err.into()
}

pub(crate) fn parse_anchor_row(row: &Row<'_>) -> RepoResult<Anchor> {
    Ok(Anchor {
        id: parse_uuid(row, "id", "anchors")?,
        anchor_key: row.get("anchor_key")?,
        zone_id: parse_optional_uuid(row, "zone_id", "anchors")?,
        name: row.get("name")?,
        description: row.get("description")?,
        location_hint: row.get("location_hint")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        photo_url: row.get("photo_url")?,
        floorplan_ref: row.get("floorplan_ref")?,
        tags: Vec::new(),
        created_by: parse_caller(row, "created_by", "anchors")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

//! RouteSet repository contracts and SQLite implementation.
//!
//! # Invariants
//! - `owner_id` is written once from the calling identity and never updated.
//! - Every stop written must name an anchor the caller can see.
//! - Stops are read back in position order, skipping anchors that have left
//!   the caller's scope since they were added.

use super::{
    ensure_connection_ready, parse_caller, parse_uuid, query_scoped, write_unit, RepoError,
    RepoResult,
};
use crate::clock::now_epoch_ms;
use crate::model::{AnchorId, CallerId, NewRouteSet, RouteSet, RouteSetId, RouteSetPatch};
use crate::scope::{ResourceKind, ResourceRef, ScopeResolver, UnscopedPolicy, WriteRefs};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use uuid::Uuid;

const ROUTESET_COLUMNS: &str = "r.id,
    r.name,
    r.description,
    r.owner_id,
    r.created_at,
    r.updated_at";

pub trait RouteSetRepository {
    fn create_routeset(&self, caller: &CallerId, routeset: &NewRouteSet) -> RepoResult<RouteSet>;
    fn get_routeset(&self, caller: &CallerId, id: RouteSetId) -> RepoResult<Option<RouteSet>>;
    /// Caller's routesets ordered by name.
    fn list_routesets(&self, caller: &CallerId) -> RepoResult<Vec<RouteSet>>;
    fn update_routeset(
        &self,
        caller: &CallerId,
        id: RouteSetId,
        patch: RouteSetPatch,
    ) -> RepoResult<RouteSet>;
    fn delete_routeset(&self, caller: &CallerId, id: RouteSetId) -> RepoResult<()>;
}

/// SQLite-backed routeset repository.
pub struct SqliteRouteSetRepository<'conn> {
    conn: &'conn Connection,
    policy: UnscopedPolicy,
}

impl<'conn> SqliteRouteSetRepository<'conn> {
    pub fn try_new(conn: &'conn Connection, policy: UnscopedPolicy) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["anchors", "routesets", "routeset_stops"])?;
        Ok(Self { conn, policy })
    }
}

impl RouteSetRepository for SqliteRouteSetRepository<'_> {
    fn create_routeset(&self, caller: &CallerId, routeset: &NewRouteSet) -> RepoResult<RouteSet> {
        let routeset = routeset.normalized()?;
        write_unit(self.conn, |tx| {
            authorize_stops(tx, self.policy, caller, &routeset.anchor_ids)?;

            let now = now_epoch_ms();
            let record = RouteSet {
                id: Uuid::new_v4(),
                name: routeset.name,
                description: routeset.description,
                anchor_ids: routeset.anchor_ids,
                owner_id: caller.clone(),
                created_at: now,
                updated_at: now,
            };
            tx.execute(
                "INSERT INTO routesets (
                    id,
                    name,
                    description,
                    owner_id,
                    created_at,
                    updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                params![
                    record.id.to_string(),
                    record.name.as_str(),
                    record.description.as_deref(),
                    record.owner_id.as_str(),
                    record.created_at,
                    record.updated_at,
                ],
            )?;
            replace_stops(tx, record.id, &record.anchor_ids)?;
            Ok(record)
        })
    }

    fn get_routeset(&self, caller: &CallerId, id: RouteSetId) -> RepoResult<Option<RouteSet>> {
        select_routeset(self.conn, self.policy, caller, id)
    }

    fn list_routesets(&self, caller: &CallerId) -> RepoResult<Vec<RouteSet>> {
        let filter =
            ScopeResolver::new(self.conn, self.policy).filter(caller, ResourceKind::RouteSet);
        let mut routesets = query_scoped(
            self.conn,
            filter,
            ROUTESET_COLUMNS,
            "ORDER BY r.name ASC, r.rowid DESC",
            Vec::new(),
            parse_routeset_row,
        )?;
        for routeset in routesets.iter_mut() {
            routeset.anchor_ids = visible_stops(self.conn, self.policy, caller, routeset.id)?;
        }
        Ok(routesets)
    }

    fn update_routeset(
        &self,
        caller: &CallerId,
        id: RouteSetId,
        patch: RouteSetPatch,
    ) -> RepoResult<RouteSet> {
        write_unit(self.conn, |tx| {
            let mut routeset = select_routeset(tx, self.policy, caller, id)?
                .ok_or_else(|| RepoError::not_found(ResourceKind::RouteSet, id))?;
            if patch.is_empty() {
                return Ok(routeset);
            }

            if let Some(anchor_ids) = &patch.anchor_ids {
                authorize_stops(tx, self.policy, caller, anchor_ids)?;
            }
            patch.apply_to(&mut routeset)?;
            routeset.updated_at = now_epoch_ms().max(routeset.updated_at);
            tx.execute(
                "UPDATE routesets
                 SET
                    name = ?1,
                    description = ?2,
                    updated_at = ?3
                 WHERE id = ?4;",
                params![
                    routeset.name.as_str(),
                    routeset.description.as_deref(),
                    routeset.updated_at,
                    routeset.id.to_string(),
                ],
            )?;
            if patch.anchor_ids.is_some() {
                replace_stops(tx, routeset.id, &routeset.anchor_ids)?;
            }
            Ok(routeset)
        })
    }

    fn delete_routeset(&self, caller: &CallerId, id: RouteSetId) -> RepoResult<()> {
        write_unit(self.conn, |tx| {
            ScopeResolver::new(tx, self.policy).require(caller, &ResourceRef::RouteSet(id))?;
            tx.execute("DELETE FROM routesets WHERE id = ?1;", [id.to_string()])?;
            Ok(())
        })
    }
}

fn authorize_stops(
    conn: &Connection,
    policy: UnscopedPolicy,
    caller: &CallerId,
    anchor_ids: &[AnchorId],
) -> RepoResult<()> {
    let resolver = ScopeResolver::new(conn, policy);
    for anchor_id in anchor_ids {
        resolver.authorize_write(caller, &WriteRefs::new(None, Some(*anchor_id)))?;
    }
    Ok(())
}

fn replace_stops(conn: &Connection, id: RouteSetId, anchor_ids: &[AnchorId]) -> RepoResult<()> {
    let id_text = id.to_string();
    conn.execute(
        "DELETE FROM routeset_stops WHERE routeset_id = ?1;",
        [&id_text],
    )?;
    for (position, anchor_id) in anchor_ids.iter().enumerate() {
        let position = i64::try_from(position)
            .map_err(|_| RepoError::InvalidData("routeset has too many stops".to_string()))?;
        conn.execute(
            "INSERT INTO routeset_stops (routeset_id, position, anchor_id)
             VALUES (?1, ?2, ?3);",
            params![id_text, position, anchor_id.to_string()],
        )?;
    }
    Ok(())
}

fn visible_stops(
    conn: &Connection,
    policy: UnscopedPolicy,
    caller: &CallerId,
    id: RouteSetId,
) -> RepoResult<Vec<AnchorId>> {
    let anchors = ScopeResolver::new(conn, policy).filter(caller, ResourceKind::Anchor);
    let sql = format!(
        "SELECT s.anchor_id
         FROM routeset_stops s
         WHERE s.routeset_id = ?
           AND s.anchor_id IN (SELECT a.id {})
         ORDER BY s.position ASC;",
        anchors.from_where()
    );
    let mut binds = vec![Value::Text(id.to_string())];
    binds.extend(anchors.into_binds());

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(binds))?;
    let mut stops = Vec::new();
    while let Some(row) = rows.next()? {
        stops.push(parse_uuid(row, "anchor_id", "routeset_stops")?);
    }
    Ok(stops)
}

fn select_routeset(
    conn: &Connection,
    policy: UnscopedPolicy,
    caller: &CallerId,
    id: RouteSetId,
) -> RepoResult<Option<RouteSet>> {
    let filter = ScopeResolver::new(conn, policy).filter(caller, ResourceKind::RouteSet);
    let found = query_scoped(
        conn,
        filter,
        ROUTESET_COLUMNS,
        "AND r.id = ?",
        vec![Value::Text(id.to_string())],
        parse_routeset_row,
    )?
    .pop();
    match found {
        Some(mut routeset) => {
            routeset.anchor_ids = visible_stops(conn, policy, caller, routeset.id)?;
            Ok(Some(routeset))
        }
        None => Ok(None),
    }
}

fn parse_routeset_row(row: &Row<'_>) -> RepoResult<RouteSet> {
    Ok(RouteSet {
        id: parse_uuid(row, "id", "routesets")?,
        name: row.get("name")?,
        description: row.get("description")?,
        anchor_ids: Vec::new(),
        owner_id: parse_caller(row, "owner_id", "routesets")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

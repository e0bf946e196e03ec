//! Query façade: scoped CRUD, lists and search behind one entry point.
//!
//! # Responsibility
//! - Bind one connection and unscoped policy to every entity repository.
//! - Turn absent point lookups into `NotFound` for the boundary layer.
//! - Emit metadata-only operation events.
//!
//! # Invariants
//! - Every operation takes the calling identity; none bypasses scoping.
//! - Logs carry ids and counts, never caller identities or free text.

use crate::model::{
    normalize_anchor_key, Anchor, AnchorId, AnchorPatch, CallerId, Capture, CaptureId, Item,
    ItemId, ItemPatch, NewAnchor, NewCapture, NewItem, NewRouteSet, NewScan, NewZone, RouteSet,
    RouteSetId, RouteSetPatch, ScanLog, Zone, ZoneId, ZonePatch,
};
use crate::repo::{
    AnchorListQuery, AnchorRepository, CaptureListQuery, CaptureRepository, ItemListQuery,
    ItemRepository, RepoError, RepoResult, RouteSetRepository, ScanLogRepository,
    SqliteAnchorRepository, SqliteCaptureRepository, SqliteItemRepository,
    SqliteRouteSetRepository, SqliteScanLogRepository, SqliteZoneRepository, ZoneDeletion,
    ZoneRepository,
};
use crate::scope::{ResourceKind, ScopeResolver, UnscopedPolicy};
use crate::search::{search_all, SearchHit, SearchQuery};
use log::{debug, info, warn};
use rusqlite::Connection;
use std::time::Instant;

/// Scoped read/write entry point over one connection.
pub struct QueryFacade<'conn> {
    conn: &'conn Connection,
    policy: UnscopedPolicy,
    zones: SqliteZoneRepository<'conn>,
    anchors: SqliteAnchorRepository<'conn>,
    items: SqliteItemRepository<'conn>,
    captures: SqliteCaptureRepository<'conn>,
    scans: SqliteScanLogRepository<'conn>,
    routesets: SqliteRouteSetRepository<'conn>,
}

impl<'conn> QueryFacade<'conn> {
    /// Verifies the schema once and binds every repository.
    pub fn try_new(conn: &'conn Connection, policy: UnscopedPolicy) -> RepoResult<Self> {
        Ok(Self {
            conn,
            policy,
            zones: SqliteZoneRepository::try_new(conn, policy)?,
            anchors: SqliteAnchorRepository::try_new(conn, policy)?,
            items: SqliteItemRepository::try_new(conn, policy)?,
            captures: SqliteCaptureRepository::try_new(conn, policy)?,
            scans: SqliteScanLogRepository::try_new(conn, policy)?,
            routesets: SqliteRouteSetRepository::try_new(conn, policy)?,
        })
    }

    pub fn policy(&self) -> UnscopedPolicy {
        self.policy
    }

    /// Resolver for boundary code that needs raw predicates or point checks.
    pub fn scope(&self) -> ScopeResolver<'conn> {
        ScopeResolver::new(self.conn, self.policy)
    }

    pub fn create_zone(&self, caller: &CallerId, zone: &NewZone) -> RepoResult<Zone> {
        let started_at = Instant::now();
        let result = self.zones.create_zone(caller, zone);
        log_write("zone_create", &result, started_at, |zone| zone.id.to_string());
        result
    }

    pub fn get_zone(&self, caller: &CallerId, id: ZoneId) -> RepoResult<Zone> {
        self.zones
            .get_zone(caller, id)?
            .ok_or_else(|| RepoError::not_found(ResourceKind::Zone, id))
    }

    pub fn list_zones(&self, caller: &CallerId) -> RepoResult<Vec<Zone>> {
        let zones = self.zones.list_zones(caller)?;
        debug!("event=zone_list module=query status=ok count={}", zones.len());
        Ok(zones)
    }

    pub fn update_zone(&self, caller: &CallerId, id: ZoneId, patch: ZonePatch) -> RepoResult<Zone> {
        let started_at = Instant::now();
        let result = self.zones.update_zone(caller, id, patch);
        log_write("zone_update", &result, started_at, |zone| zone.id.to_string());
        result
    }

    /// Deletes the zone and everything whose ownership closure ends at it.
    pub fn delete_zone(&self, caller: &CallerId, id: ZoneId) -> RepoResult<ZoneDeletion> {
        let started_at = Instant::now();
        let result = self.zones.delete_zone(caller, id);
        log_write("zone_delete", &result, started_at, |removed| {
            format!(
                "{id} anchors={} items={} captures={}",
                removed.anchors, removed.items, removed.captures
            )
        });
        result
    }

    pub fn create_anchor(&self, caller: &CallerId, anchor: &NewAnchor) -> RepoResult<Anchor> {
        let started_at = Instant::now();
        let result = self.anchors.create_anchor(caller, anchor);
        log_write("anchor_create", &result, started_at, |anchor| {
            anchor.id.to_string()
        });
        result
    }

    pub fn get_anchor(&self, caller: &CallerId, id: AnchorId) -> RepoResult<Anchor> {
        self.anchors
            .get_anchor(caller, id)?
            .ok_or_else(|| RepoError::not_found(ResourceKind::Anchor, id))
    }

    /// Case-insensitive key lookup.
    pub fn get_anchor_by_key(&self, caller: &CallerId, key: &str) -> RepoResult<Anchor> {
        match self.anchors.get_anchor_by_key(caller, key)? {
            Some(anchor) => Ok(anchor),
            None => Err(RepoError::not_found(
                ResourceKind::Anchor,
                normalize_anchor_key(key)?,
            )),
        }
    }

    pub fn list_anchors(
        &self,
        caller: &CallerId,
        query: &AnchorListQuery,
    ) -> RepoResult<Vec<Anchor>> {
        self.anchors.list_anchors(caller, query)
    }

    pub fn update_anchor(
        &self,
        caller: &CallerId,
        id: AnchorId,
        patch: AnchorPatch,
    ) -> RepoResult<Anchor> {
        let started_at = Instant::now();
        let result = self.anchors.update_anchor(caller, id, patch);
        log_write("anchor_update", &result, started_at, |anchor| {
            anchor.id.to_string()
        });
        result
    }

    pub fn delete_anchor(&self, caller: &CallerId, id: AnchorId) -> RepoResult<()> {
        let started_at = Instant::now();
        let result = self.anchors.delete_anchor(caller, id);
        log_write("anchor_delete", &result, started_at, |_| id.to_string());
        result
    }

    pub fn create_item(&self, caller: &CallerId, item: &NewItem) -> RepoResult<Item> {
        let started_at = Instant::now();
        let result = self.items.create_item(caller, item);
        log_write("item_create", &result, started_at, |item| item.id.to_string());
        result
    }

    pub fn get_item(&self, caller: &CallerId, id: ItemId) -> RepoResult<Item> {
        self.items
            .get_item(caller, id)?
            .ok_or_else(|| RepoError::not_found(ResourceKind::Item, id))
    }

    pub fn list_items(&self, caller: &CallerId, query: &ItemListQuery) -> RepoResult<Vec<Item>> {
        self.items.list_items(caller, query)
    }

    pub fn update_item(&self, caller: &CallerId, id: ItemId, patch: ItemPatch) -> RepoResult<Item> {
        let started_at = Instant::now();
        let result = self.items.update_item(caller, id, patch);
        log_write("item_update", &result, started_at, |item| item.id.to_string());
        result
    }

    pub fn delete_item(&self, caller: &CallerId, id: ItemId) -> RepoResult<()> {
        let started_at = Instant::now();
        let result = self.items.delete_item(caller, id);
        log_write("item_delete", &result, started_at, |_| id.to_string());
        result
    }

    pub fn create_capture(&self, caller: &CallerId, capture: &NewCapture) -> RepoResult<Capture> {
        let started_at = Instant::now();
        let result = self.captures.create_capture(caller, capture);
        log_write("capture_create", &result, started_at, |capture| {
            capture.id.to_string()
        });
        result
    }

    pub fn get_capture(&self, caller: &CallerId, id: CaptureId) -> RepoResult<Capture> {
        self.captures
            .get_capture(caller, id)?
            .ok_or_else(|| RepoError::not_found(ResourceKind::Capture, id))
    }

    /// Newest first, at most 50 per call.
    pub fn list_captures(
        &self,
        caller: &CallerId,
        query: &CaptureListQuery,
    ) -> RepoResult<Vec<Capture>> {
        self.captures.list_captures(caller, query)
    }

    pub fn delete_capture(&self, caller: &CallerId, id: CaptureId) -> RepoResult<()> {
        let started_at = Instant::now();
        let result = self.captures.delete_capture(caller, id);
        log_write("capture_delete", &result, started_at, |_| id.to_string());
        result
    }

    pub fn log_scan(&self, caller: &CallerId, scan: &NewScan) -> RepoResult<ScanLog> {
        let started_at = Instant::now();
        let result = self.scans.log_scan(caller, scan);
        log_write("scan_log", &result, started_at, |scan| {
            format!("{} anchor_id={} device={}", scan.id, scan.anchor_id, scan.device.as_str())
        });
        result
    }

    pub fn list_scans(
        &self,
        caller: &CallerId,
        anchor_key: &str,
        limit: Option<u32>,
    ) -> RepoResult<Vec<ScanLog>> {
        self.scans.list_scans(caller, anchor_key, limit)
    }

    pub fn create_routeset(
        &self,
        caller: &CallerId,
        routeset: &NewRouteSet,
    ) -> RepoResult<RouteSet> {
        let started_at = Instant::now();
        let result = self.routesets.create_routeset(caller, routeset);
        log_write("routeset_create", &result, started_at, |routeset| {
            format!("{} stops={}", routeset.id, routeset.anchor_ids.len())
        });
        result
    }

    pub fn get_routeset(&self, caller: &CallerId, id: RouteSetId) -> RepoResult<RouteSet> {
        self.routesets
            .get_routeset(caller, id)?
            .ok_or_else(|| RepoError::not_found(ResourceKind::RouteSet, id))
    }

    pub fn list_routesets(&self, caller: &CallerId) -> RepoResult<Vec<RouteSet>> {
        let routesets = self.routesets.list_routesets(caller)?;
        debug!(
            "event=routeset_list module=query status=ok count={}",
            routesets.len()
        );
        Ok(routesets)
    }

    pub fn update_routeset(
        &self,
        caller: &CallerId,
        id: RouteSetId,
        patch: RouteSetPatch,
    ) -> RepoResult<RouteSet> {
        let started_at = Instant::now();
        let result = self.routesets.update_routeset(caller, id, patch);
        log_write("routeset_update", &result, started_at, |routeset| {
            format!("{} stops={}", routeset.id, routeset.anchor_ids.len())
        });
        result
    }

    pub fn delete_routeset(&self, caller: &CallerId, id: RouteSetId) -> RepoResult<()> {
        let started_at = Instant::now();
        let result = self.routesets.delete_routeset(caller, id);
        log_write("routeset_delete", &result, started_at, |_| id.to_string());
        result
    }

    /// Anchors first (by name), then items (newest first). Blank text and
    /// zero matches both yield an empty list.
    pub fn search(&self, caller: &CallerId, query: &SearchQuery) -> RepoResult<Vec<SearchHit>> {
        let started_at = Instant::now();
        let hits = search_all(self.conn, self.policy, caller, query)?;
        info!(
            "event=search module=query status=ok hits={} duration_ms={}",
            hits.len(),
            started_at.elapsed().as_millis()
        );
        Ok(hits)
    }
}

fn log_write<T, F>(event: &str, result: &RepoResult<T>, started_at: Instant, describe: F)
where
    F: FnOnce(&T) -> String,
{
    match result {
        Ok(value) => info!(
            "event={} module=query status=ok id={} duration_ms={}",
            event,
            describe(value),
            started_at.elapsed().as_millis()
        ),
        Err(err) => warn!(
            "event={} module=query status=error error_class={} duration_ms={}",
            event,
            err.class().as_str(),
            started_at.elapsed().as_millis()
        ),
    }
}

//! Item repository contracts and SQLite implementation.

use super::{
    ensure_connection_ready, parse_caller, parse_code, parse_optional_uuid, parse_uuid,
    push_page, query_scoped, uuid_param, write_unit, RepoError, RepoResult,
};
use crate::clock::now_epoch_ms;
use crate::model::{
    AnchorId, CallerId, Item, ItemId, ItemPatch, ItemStatus, ItemType, NewItem, ZoneId,
};
use crate::scope::{ResourceKind, ResourceRef, ScopeResolver, UnscopedPolicy, WriteRefs};
use rusqlite::types::Value;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

pub(crate) const ITEM_COLUMNS: &str = "i.id,
    i.zone_id,
    i.anchor_id,
    i.title,
    i.body,
    i.type,
    i.status,
    i.priority,
    i.created_by,
    i.created_at,
    i.updated_at";

/// Query options for listing items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemListQuery {
    pub zone_id: Option<ZoneId>,
    pub anchor_id: Option<AnchorId>,
    pub status: Option<ItemStatus>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for item CRUD.
pub trait ItemRepository {
    fn create_item(&self, caller: &CallerId, item: &NewItem) -> RepoResult<Item>;
    fn get_item(&self, caller: &CallerId, id: ItemId) -> RepoResult<Option<Item>>;
    fn list_items(&self, caller: &CallerId, query: &ItemListQuery) -> RepoResult<Vec<Item>>;
    fn update_item(&self, caller: &CallerId, id: ItemId, patch: ItemPatch) -> RepoResult<Item>;
    fn delete_item(&self, caller: &CallerId, id: ItemId) -> RepoResult<()>;
}

/// SQLite-backed item repository.
pub struct SqliteItemRepository<'conn> {
    conn: &'conn Connection,
    policy: UnscopedPolicy,
}

impl<'conn> SqliteItemRepository<'conn> {
    pub fn try_new(conn: &'conn Connection, policy: UnscopedPolicy) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["zones", "anchors", "items"])?;
        Ok(Self { conn, policy })
    }
}

impl ItemRepository for SqliteItemRepository<'_> {
    fn create_item(&self, caller: &CallerId, item: &NewItem) -> RepoResult<Item> {
        let item = item.normalized()?;
        write_unit(self.conn, |tx| {
            ScopeResolver::new(tx, self.policy)
                .authorize_write(caller, &WriteRefs::new(item.zone_id, item.anchor_id))?;

            let now = now_epoch_ms();
            let record = Item {
                id: Uuid::new_v4(),
                zone_id: item.zone_id,
                anchor_id: item.anchor_id,
                title: item.title,
                body: item.body,
                kind: item.kind,
                status: item.status,
                priority: item.priority,
                created_by: caller.clone(),
                created_at: now,
                updated_at: now,
            };
            tx.execute(
                "INSERT INTO items (
                    id,
                    zone_id,
                    anchor_id,
                    title,
                    body,
                    type,
                    status,
                    priority,
                    created_by,
                    created_at,
                    updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
                params![
                    record.id.to_string(),
                    uuid_param(record.zone_id),
                    uuid_param(record.anchor_id),
                    record.title.as_str(),
                    record.body.as_deref(),
                    record.kind.as_str(),
                    record.status.as_str(),
                    record.priority,
                    record.created_by.as_str(),
                    record.created_at,
                    record.updated_at,
                ],
            )?;
            Ok(record)
        })
    }

    fn get_item(&self, caller: &CallerId, id: ItemId) -> RepoResult<Option<Item>> {
        select_item(self.conn, self.policy, caller, id)
    }

    fn list_items(&self, caller: &CallerId, query: &ItemListQuery) -> RepoResult<Vec<Item>> {
        let filter = ScopeResolver::new(self.conn, self.policy).filter(caller, ResourceKind::Item);
        let mut tail = String::new();
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(zone_id) = query.zone_id {
            tail.push_str("AND i.zone_id = ? ");
            bind_values.push(Value::Text(zone_id.to_string()));
        }
        if let Some(anchor_id) = query.anchor_id {
            tail.push_str("AND i.anchor_id = ? ");
            bind_values.push(Value::Text(anchor_id.to_string()));
        }
        if let Some(status) = query.status {
            tail.push_str("AND i.status = ? ");
            bind_values.push(Value::Text(status.as_str().to_string()));
        }

        tail.push_str("ORDER BY i.created_at DESC, i.id ASC");
        push_page(&mut tail, &mut bind_values, query.limit, query.offset);

        query_scoped(
            self.conn,
            filter,
            ITEM_COLUMNS,
            &tail,
            bind_values,
            parse_item_row,
        )
    }

    fn update_item(&self, caller: &CallerId, id: ItemId, patch: ItemPatch) -> RepoResult<Item> {
        write_unit(self.conn, |tx| {
            let mut item = select_item(tx, self.policy, caller, id)?
                .ok_or_else(|| RepoError::not_found(ResourceKind::Item, id))?;

            let refs = WriteRefs::new(
                patch.zone_id.as_set().copied(),
                patch.anchor_id.as_set().copied(),
            );
            if !refs.is_empty() {
                ScopeResolver::new(tx, self.policy).authorize_write(caller, &refs)?;
            }

            patch.apply_to(&mut item)?;
            item.updated_at = now_epoch_ms().max(item.updated_at);
            tx.execute(
                "UPDATE items
                 SET
                    zone_id = ?1,
                    anchor_id = ?2,
                    title = ?3,
                    body = ?4,
                    type = ?5,
                    status = ?6,
                    priority = ?7,
                    updated_at = ?8
                 WHERE id = ?9;",
                params![
                    uuid_param(item.zone_id),
                    uuid_param(item.anchor_id),
                    item.title.as_str(),
                    item.body.as_deref(),
                    item.kind.as_str(),
                    item.status.as_str(),
                    item.priority,
                    item.updated_at,
                    item.id.to_string(),
                ],
            )?;
            Ok(item)
        })
    }

    fn delete_item(&self, caller: &CallerId, id: ItemId) -> RepoResult<()> {
        write_unit(self.conn, |tx| {
            ScopeResolver::new(tx, self.policy).require(caller, &ResourceRef::Item(id))?;
            tx.execute("DELETE FROM items WHERE id = ?1;", [id.to_string()])?;
            Ok(())
        })
    }
}

fn select_item(
    conn: &Connection,
    policy: UnscopedPolicy,
    caller: &CallerId,
    id: ItemId,
) -> RepoResult<Option<Item>> {
    let filter = ScopeResolver::new(conn, policy).filter(caller, ResourceKind::Item);
    let mut items = query_scoped(
        conn,
        filter,
        ITEM_COLUMNS,
        "AND i.id = ?",
        vec![Value::Text(id.to_string())],
        parse_item_row,
    )?;
    Ok(items.pop())
}

pub(crate) fn parse_item_row(row: &Row<'_>) -> RepoResult<Item> {
    Ok(Item {
        id: parse_uuid(row, "id", "items")?,
        zone_id: parse_optional_uuid(row, "zone_id", "items")?,
        anchor_id: parse_optional_uuid(row, "anchor_id", "items")?,
        title: row.get("title")?,
        body: row.get("body")?,
        kind: parse_code(row, "type", "items", ItemType::parse)?,
        status: parse_code(row, "status", "items", ItemStatus::parse)?,
        priority: row.get("priority")?,
        created_by: parse_caller(row, "created_by", "items")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

use hive_core::db::open_db_in_memory;
use hive_core::repo::MAX_CAPTURE_PAGE;
use hive_core::{
    AnchorListQuery, AnchorPatch, CallerId, CaptureListQuery, DeviceType, ErrorClass,
    ItemListQuery, ItemPatch, ItemStatus, ItemType, NewAnchor, NewCapture, NewItem, NewScan,
    NewZone, Patch, QueryFacade, RepoError, ResourceKind, UnscopedPolicy, ValidationError,
    ZonePatch,
};
use rusqlite::Connection;

fn caller(name: &str) -> CallerId {
    CallerId::new(name).unwrap()
}

fn facade(conn: &Connection) -> QueryFacade<'_> {
    QueryFacade::try_new(conn, UnscopedPolicy::Creator).unwrap()
}

#[test]
fn zone_create_get_update_list() {
    let conn = open_db_in_memory().unwrap();
    let hive = facade(&conn);
    let me = caller("u1");

    let mut request = NewZone::new("  Home  ", "home");
    request.color = Some("#ffaa00".to_string());
    let zone = hive.create_zone(&me, &request).unwrap();
    assert_eq!(zone.name, "Home");
    assert_eq!(zone.owner_id, me);
    assert_eq!(hive.get_zone(&me, zone.id).unwrap(), zone);

    let patch = ZonePatch {
        name: Some("House".to_string()),
        color: Patch::Clear,
        ..ZonePatch::default()
    };
    let updated = hive.update_zone(&me, zone.id, patch).unwrap();
    assert_eq!(updated.name, "House");
    assert_eq!(updated.slug, "home");
    assert_eq!(updated.color, None);
    assert_eq!(updated.owner_id, me);
    assert!(updated.updated_at >= zone.updated_at);

    hive.create_zone(&me, &NewZone::new("Attic", "attic")).unwrap();
    let names: Vec<String> = hive
        .list_zones(&me)
        .unwrap()
        .into_iter()
        .map(|zone| zone.name)
        .collect();
    assert_eq!(names, vec!["Attic".to_string(), "House".to_string()]);
}

#[test]
fn zone_name_and_slug_are_globally_unique() {
    let conn = open_db_in_memory().unwrap();
    let hive = facade(&conn);
    let me = caller("u1");
    let other = caller("u2");

    hive.create_zone(&me, &NewZone::new("Home", "home")).unwrap();

    let err = hive
        .create_zone(&other, &NewZone::new("Home", "elsewhere"))
        .unwrap_err();
    match err {
        RepoError::Conflict { field, value } => {
            assert_eq!(field, "name");
            assert_eq!(value, "Home");
        }
        other => panic!("unexpected error: {other}"),
    }
    let err = hive
        .create_zone(&other, &NewZone::new("Elsewhere", "home"))
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict { field: "slug", .. }));
    assert_eq!(err.class(), ErrorClass::Conflict);

    let second = hive
        .create_zone(&me, &NewZone::new("Office", "office"))
        .unwrap();
    let rename = ZonePatch {
        slug: Some("home".to_string()),
        ..ZonePatch::default()
    };
    assert!(matches!(
        hive.update_zone(&me, second.id, rename),
        Err(RepoError::Conflict { field: "slug", .. })
    ));
}

#[test]
fn invalid_input_is_rejected_before_any_write() {
    let conn = open_db_in_memory().unwrap();
    let hive = facade(&conn);
    let me = caller("u1");

    assert!(matches!(
        hive.create_zone(&me, &NewZone::new("   ", "blank")),
        Err(RepoError::Validation(ValidationError::BlankField("name")))
    ));
    assert!(matches!(
        hive.create_zone(&me, &NewZone::new("Home", "Not A Slug")),
        Err(RepoError::Validation(ValidationError::InvalidSlug(_)))
    ));
    assert!(matches!(
        hive.create_item(&me, &NewItem::task(" ")),
        Err(RepoError::Validation(_))
    ));
    assert!(matches!(
        hive.create_capture(&me, &NewCapture::text("\n\t")),
        Err(RepoError::Validation(_))
    ));

    let mut far_north = NewAnchor::new("POLE", "Pole");
    far_north.latitude = Some(91.0);
    let err = hive.create_anchor(&me, &far_north).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Invalid);

    assert!(hive.list_zones(&me).unwrap().is_empty());
    assert!(hive
        .list_anchors(&me, &AnchorListQuery::default())
        .unwrap()
        .is_empty());
}

#[test]
fn anchor_keys_resolve_case_insensitively_and_stay_unique() {
    let conn = open_db_in_memory().unwrap();
    let hive = facade(&conn);
    let me = caller("u1");
    let zone = hive.create_zone(&me, &NewZone::new("Home", "home")).unwrap();

    let anchor = hive
        .create_anchor(&me, &NewAnchor::new(" desk-01 ", "Desk").in_zone(zone.id))
        .unwrap();
    assert_eq!(anchor.anchor_key, "DESK-01");
    assert_eq!(hive.get_anchor_by_key(&me, "Desk-01").unwrap().id, anchor.id);

    let err = hive
        .create_anchor(&me, &NewAnchor::new("DESK-01", "Desk again"))
        .unwrap_err();
    match err {
        RepoError::Conflict { field, value } => {
            assert_eq!(field, "anchor_key");
            assert_eq!(value, "DESK-01");
        }
        other => panic!("unexpected error: {other}"),
    }

    let missing = hive.get_anchor_by_key(&me, "shelf").unwrap_err();
    assert!(matches!(
        missing,
        RepoError::NotFound { kind: ResourceKind::Anchor, ref id } if id == "SHELF"
    ));
    assert!(matches!(
        hive.get_anchor_by_key(&me, "two words"),
        Err(RepoError::Validation(ValidationError::InvalidAnchorKey(_)))
    ));
}

#[test]
fn anchor_update_keeps_the_key_and_can_leave_its_zone() {
    let conn = open_db_in_memory().unwrap();
    let hive = facade(&conn);
    let me = caller("u1");
    let zone = hive.create_zone(&me, &NewZone::new("Home", "home")).unwrap();
    let anchor = hive
        .create_anchor(&me, &NewAnchor::new("DESK", "Desk").in_zone(zone.id))
        .unwrap();

    let patch = AnchorPatch {
        name: Some("Standing desk".to_string()),
        location_hint: Patch::Set("by the window".to_string()),
        zone_id: Patch::Clear,
        ..AnchorPatch::default()
    };
    let updated = hive.update_anchor(&me, anchor.id, patch).unwrap();
    assert_eq!(updated.anchor_key, "DESK");
    assert_eq!(updated.name, "Standing desk");
    assert_eq!(updated.location_hint.as_deref(), Some("by the window"));
    assert_eq!(updated.zone_id, None);

    // Unscoped now; the creator still sees it under the default policy.
    assert_eq!(hive.get_anchor(&me, anchor.id).unwrap(), updated);
    let in_zone = AnchorListQuery {
        zone_id: Some(zone.id),
        ..AnchorListQuery::default()
    };
    assert!(hive.list_anchors(&me, &in_zone).unwrap().is_empty());
}

#[test]
fn item_lifecycle_with_filters_and_patch_semantics() {
    let conn = open_db_in_memory().unwrap();
    let hive = facade(&conn);
    let me = caller("u1");
    let zone = hive.create_zone(&me, &NewZone::new("Home", "home")).unwrap();
    let anchor = hive
        .create_anchor(&me, &NewAnchor::new("DESK", "Desk").in_zone(zone.id))
        .unwrap();

    let task = hive
        .create_item(
            &me,
            &NewItem::task("Water plants")
                .in_zone(zone.id)
                .with_body("twice a week"),
        )
        .unwrap();
    assert_eq!(task.kind, ItemType::Task);
    assert_eq!(task.status, ItemStatus::Open);
    let note = hive
        .create_item(&me, &NewItem::note("Charger lives here").at_anchor(anchor.id))
        .unwrap();

    let done = hive
        .update_item(&me, task.id, ItemPatch::status(ItemStatus::Done))
        .unwrap();
    assert_eq!(done.status, ItemStatus::Done);
    assert_eq!(done.body.as_deref(), Some("twice a week"));

    let cleared = hive
        .update_item(
            &me,
            task.id,
            ItemPatch {
                body: Patch::Clear,
                anchor_id: Patch::Set(anchor.id),
                ..ItemPatch::default()
            },
        )
        .unwrap();
    assert_eq!(cleared.body, None);
    assert_eq!(cleared.anchor_id, Some(anchor.id));
    assert_eq!(cleared.zone_id, Some(zone.id));

    let open_only = ItemListQuery {
        status: Some(ItemStatus::Open),
        ..ItemListQuery::default()
    };
    let open: Vec<_> = hive.list_items(&me, &open_only).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, note.id);

    let at_anchor = ItemListQuery {
        anchor_id: Some(anchor.id),
        ..ItemListQuery::default()
    };
    assert_eq!(hive.list_items(&me, &at_anchor).unwrap().len(), 2);

    hive.delete_item(&me, note.id).unwrap();
    assert!(matches!(
        hive.get_item(&me, note.id),
        Err(RepoError::NotFound { .. })
    ));
    assert!(matches!(
        hive.delete_item(&me, note.id),
        Err(RepoError::NotFound { .. })
    ));
}

#[test]
fn items_list_newest_first_with_paging() {
    let conn = open_db_in_memory().unwrap();
    let hive = facade(&conn);
    let me = caller("u1");
    let zone = hive.create_zone(&me, &NewZone::new("Home", "home")).unwrap();

    let mut ids = Vec::new();
    for n in 0..5 {
        let item = hive
            .create_item(&me, &NewItem::task(format!("task {n}")).in_zone(zone.id))
            .unwrap();
        conn.execute(
            "UPDATE items SET created_at = ?1 WHERE id = ?2;",
            rusqlite::params![1_000 + n, item.id.to_string()],
        )
        .unwrap();
        ids.push(item.id);
    }

    let page = ItemListQuery {
        limit: Some(2),
        offset: 1,
        ..ItemListQuery::default()
    };
    let listed: Vec<_> = hive
        .list_items(&me, &page)
        .unwrap()
        .into_iter()
        .map(|item| item.id)
        .collect();
    assert_eq!(listed, vec![ids[3], ids[2]]);
}

#[test]
fn captures_are_capped_per_page() {
    let conn = open_db_in_memory().unwrap();
    let hive = facade(&conn);
    let me = caller("u1");
    let zone = hive.create_zone(&me, &NewZone::new("Inbox", "inbox")).unwrap();

    for n in 0..(MAX_CAPTURE_PAGE + 5) {
        hive.create_capture(&me, &NewCapture::text(format!("thought {n}")).in_zone(zone.id))
            .unwrap();
    }

    let all = hive
        .list_captures(&me, &CaptureListQuery::default())
        .unwrap();
    assert_eq!(all.len(), MAX_CAPTURE_PAGE as usize);
    let oversized = CaptureListQuery {
        limit: Some(500),
        ..CaptureListQuery::default()
    };
    assert_eq!(
        hive.list_captures(&me, &oversized).unwrap().len(),
        MAX_CAPTURE_PAGE as usize
    );

    let capture = &all[0];
    hive.delete_capture(&me, capture.id).unwrap();
    assert!(matches!(
        hive.get_capture(&me, capture.id),
        Err(RepoError::NotFound { .. })
    ));
}

#[test]
fn zone_delete_removes_everything_in_its_closure() {
    let conn = open_db_in_memory().unwrap();
    let hive = facade(&conn);
    let me = caller("u1");
    let zone = hive.create_zone(&me, &NewZone::new("Home", "home")).unwrap();
    let keep = hive.create_zone(&me, &NewZone::new("Office", "office")).unwrap();
    let anchor = hive
        .create_anchor(&me, &NewAnchor::new("DESK", "Desk").in_zone(zone.id))
        .unwrap();

    hive.create_item(&me, &NewItem::task("zoned").in_zone(zone.id)).unwrap();
    let anchored = hive
        .create_item(&me, &NewItem::note("anchored only").at_anchor(anchor.id))
        .unwrap();
    hive.create_capture(&me, &NewCapture::text("anchored capture").at_anchor(anchor.id))
        .unwrap();
    let survivor = hive
        .create_item(&me, &NewItem::task("elsewhere").in_zone(keep.id))
        .unwrap();
    let unscoped = hive.create_item(&me, &NewItem::task("loose")).unwrap();

    let removed = hive.delete_zone(&me, zone.id).unwrap();
    assert_eq!(removed.anchors, 1);
    assert_eq!(removed.items, 2);
    assert_eq!(removed.captures, 1);

    assert!(matches!(
        hive.get_anchor(&me, anchor.id),
        Err(RepoError::NotFound { .. })
    ));
    assert!(matches!(
        hive.get_item(&me, anchored.id),
        Err(RepoError::NotFound { .. })
    ));
    let orphaned: i64 = conn
        .query_row("SELECT COUNT(*) FROM items WHERE id = ?1;", [anchored.id.to_string()], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(orphaned, 0, "anchored item must not survive as unscoped");

    let remaining: Vec<_> = hive
        .list_items(&me, &ItemListQuery::default())
        .unwrap()
        .into_iter()
        .map(|item| item.id)
        .collect();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.contains(&survivor.id));
    assert!(remaining.contains(&unscoped.id));
    assert!(hive
        .list_captures(&me, &CaptureListQuery::default())
        .unwrap()
        .is_empty());
}

#[test]
fn scans_resolve_keys_and_list_most_recent_first() {
    let conn = open_db_in_memory().unwrap();
    let hive = facade(&conn);
    let me = caller("u1");
    let other = caller("u2");
    let zone = hive.create_zone(&me, &NewZone::new("Home", "home")).unwrap();
    let anchor = hive
        .create_anchor(&me, &NewAnchor::new("DOOR", "Front door").in_zone(zone.id))
        .unwrap();

    let mut scan = NewScan::new("door", DeviceType::Watch);
    scan.location = Some("  porch ".to_string());
    let first = hive.log_scan(&me, &scan).unwrap();
    assert_eq!(first.anchor_id, anchor.id);
    assert_eq!(first.location.as_deref(), Some("porch"));
    hive.log_scan(&me, &NewScan::new("DOOR", DeviceType::Iphone)).unwrap();

    let scans = hive.list_scans(&me, "Door", None).unwrap();
    assert_eq!(scans.len(), 2);
    assert!(scans[0].scanned_at >= scans[1].scanned_at);

    assert!(matches!(
        hive.log_scan(&other, &NewScan::new("DOOR", DeviceType::Laptop)),
        Err(RepoError::NotFound { .. })
    ));
    assert!(matches!(
        hive.list_scans(&other, "DOOR", None),
        Err(RepoError::NotFound { .. })
    ));
}

#[test]
fn zone_icon_is_capped_and_clearable() {
    let conn = open_db_in_memory().unwrap();
    let hive = facade(&conn);
    let me = caller("u1");

    let mut request = NewZone::new("Garage", "garage");
    request.icon = Some(" wrench ".to_string());
    let zone = hive.create_zone(&me, &request).unwrap();
    assert_eq!(zone.icon.as_deref(), Some("wrench"));
    assert_eq!(hive.get_zone(&me, zone.id).unwrap().icon.as_deref(), Some("wrench"));

    let mut too_long = NewZone::new("Shed", "shed");
    too_long.icon = Some("x".repeat(51));
    assert!(matches!(
        hive.create_zone(&me, &too_long),
        Err(RepoError::Validation(ValidationError::TooLong { field: "icon", .. }))
    ));

    let patch = ZonePatch {
        icon: Patch::Clear,
        ..ZonePatch::default()
    };
    assert_eq!(hive.update_zone(&me, zone.id, patch).unwrap().icon, None);
    assert_eq!(hive.get_zone(&me, zone.id).unwrap().icon, None);
}

#[test]
fn anchor_details_and_tags_round_trip_through_the_store() {
    let conn = open_db_in_memory().unwrap();
    let hive = facade(&conn);
    let me = caller("u1");

    let mut request = NewAnchor::new("SHELF", "Shelf");
    request.photo_url = Some("https://img.example/shelf.jpg".to_string());
    request.floorplan_ref = Some("floor-2/room-b".to_string());
    request.tags = vec![" Tools ".to_string(), "garage".to_string(), "tools".to_string()];
    let shelf = hive.create_anchor(&me, &request).unwrap();
    assert_eq!(shelf.tags, vec!["garage".to_string(), "tools".to_string()]);

    let loaded = hive.get_anchor(&me, shelf.id).unwrap();
    assert_eq!(loaded, shelf);
    assert_eq!(loaded.floorplan_ref.as_deref(), Some("floor-2/room-b"));
    assert_eq!(hive.get_anchor_by_key(&me, "shelf").unwrap().tags, shelf.tags);

    hive.create_anchor(&me, &NewAnchor::new("DESK", "Desk")).unwrap();
    let tagged = AnchorListQuery {
        tag: Some("TOOLS".to_string()),
        ..AnchorListQuery::default()
    };
    let keys: Vec<String> = hive
        .list_anchors(&me, &tagged)
        .unwrap()
        .into_iter()
        .map(|anchor| anchor.anchor_key)
        .collect();
    assert_eq!(keys, vec!["SHELF".to_string()]);

    let patch = AnchorPatch {
        photo_url: Patch::Clear,
        tags: Some(vec!["paint".to_string()]),
        ..AnchorPatch::default()
    };
    let updated = hive.update_anchor(&me, shelf.id, patch).unwrap();
    assert_eq!(updated.photo_url, None);
    assert_eq!(updated.tags, vec!["paint".to_string()]);
    assert!(hive.list_anchors(&me, &tagged).unwrap().is_empty());

    // Leaving `tags` unset keeps the stored set.
    let rename = AnchorPatch {
        name: Some("Paint shelf".to_string()),
        ..AnchorPatch::default()
    };
    hive.update_anchor(&me, shelf.id, rename).unwrap();
    assert_eq!(
        hive.get_anchor(&me, shelf.id).unwrap().tags,
        vec!["paint".to_string()]
    );

    hive.delete_anchor(&me, shelf.id).unwrap();
    let orphaned: i64 = conn
        .query_row("SELECT COUNT(*) FROM anchor_tags;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(orphaned, 0);
}

#[test]
fn item_priority_is_stored_and_clearable() {
    let conn = open_db_in_memory().unwrap();
    let hive = facade(&conn);
    let me = caller("u1");

    let item = hive
        .create_item(&me, &NewItem::task("Sort screws").with_priority(3))
        .unwrap();
    assert_eq!(item.priority, Some(3));
    assert_eq!(hive.get_item(&me, item.id).unwrap().priority, Some(3));

    let raise = ItemPatch {
        priority: Patch::Set(1),
        ..ItemPatch::default()
    };
    assert_eq!(hive.update_item(&me, item.id, raise).unwrap().priority, Some(1));

    let clear = ItemPatch {
        priority: Patch::Clear,
        ..ItemPatch::default()
    };
    hive.update_item(&me, item.id, clear).unwrap();
    assert_eq!(hive.get_item(&me, item.id).unwrap().priority, None);
}

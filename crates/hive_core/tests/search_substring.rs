use hive_core::db::open_db_in_memory;
use hive_core::search::SNIPPET_MAX_CHARS;
use hive_core::{
    CallerId, NewAnchor, NewItem, NewZone, QueryFacade, SearchHit, SearchQuery, UnscopedPolicy,
};
use rusqlite::Connection;

fn caller(name: &str) -> CallerId {
    CallerId::new(name).unwrap()
}

fn seeded(conn: &Connection) -> (QueryFacade<'_>, CallerId) {
    let hive = QueryFacade::try_new(conn, UnscopedPolicy::Creator).unwrap();
    let me = caller("u1");
    let zone = hive.create_zone(&me, &NewZone::new("Home", "home")).unwrap();

    let mut lamp = NewAnchor::new("LAMP", "Reading lamp").in_zone(zone.id);
    lamp.description = Some("warm light by the chair".to_string());
    hive.create_anchor(&me, &lamp).unwrap();
    hive.create_anchor(&me, &NewAnchor::new("DESK", "Desk").in_zone(zone.id)).unwrap();

    let bulb = hive
        .create_item(
            &me,
            &NewItem::task("Buy LIGHT bulbs")
                .in_zone(zone.id)
                .with_body("40W, warm white"),
        )
        .unwrap();
    let discount = hive
        .create_item(&me, &NewItem::note("100% cotton sheets").in_zone(zone.id))
        .unwrap();
    for (created_at, id) in [(1_000, bulb.id), (2_000, discount.id)] {
        conn.execute(
            "UPDATE items SET created_at = ?1 WHERE id = ?2;",
            rusqlite::params![created_at, id.to_string()],
        )
        .unwrap();
    }
    (hive, me)
}

fn labels(hits: &[SearchHit]) -> Vec<String> {
    hits.iter()
        .map(|hit| match hit {
            SearchHit::Anchor { name, .. } => format!("anchor:{name}"),
            SearchHit::Item { title, .. } => format!("item:{title}"),
        })
        .collect()
}

#[test]
fn blank_query_returns_empty() {
    let conn = open_db_in_memory().unwrap();
    let (hive, me) = seeded(&conn);

    assert!(hive.search(&me, &SearchQuery::new("")).unwrap().is_empty());
    assert!(hive.search(&me, &SearchQuery::new("   ")).unwrap().is_empty());
    assert!(hive
        .search(&me, &SearchQuery::new("zebra"))
        .unwrap()
        .is_empty());
}

#[test]
fn anchors_precede_items_and_match_case_insensitively() {
    let conn = open_db_in_memory().unwrap();
    let (hive, me) = seeded(&conn);

    let hits = hive.search(&me, &SearchQuery::new("light")).unwrap();
    assert_eq!(
        labels(&hits),
        vec![
            "anchor:Reading lamp".to_string(),
            "item:Buy LIGHT bulbs".to_string()
        ]
    );

    let hits = hive.search(&me, &SearchQuery::new("WARM")).unwrap();
    assert_eq!(hits.len(), 2);
    match &hits[1] {
        SearchHit::Item { snippet, .. } => {
            assert_eq!(snippet.as_deref(), Some("40W, warm white"));
        }
        other => panic!("expected item hit, got {other:?}"),
    }
}

#[test]
fn wildcard_characters_match_literally() {
    let conn = open_db_in_memory().unwrap();
    let (hive, me) = seeded(&conn);

    let hits = hive.search(&me, &SearchQuery::new("100%")).unwrap();
    assert_eq!(labels(&hits), vec!["item:100% cotton sheets".to_string()]);

    assert!(hive.search(&me, &SearchQuery::new("%")).unwrap().len() == 1);
    assert!(hive.search(&me, &SearchQuery::new("_")).unwrap().is_empty());
}

#[test]
fn items_are_newest_first_and_limit_applies_per_kind() {
    let conn = open_db_in_memory().unwrap();
    let (hive, me) = seeded(&conn);

    // "e" hits both anchors and both items.
    let hits = hive.search(&me, &SearchQuery::new("e")).unwrap();
    assert_eq!(
        labels(&hits),
        vec![
            "anchor:Desk".to_string(),
            "anchor:Reading lamp".to_string(),
            "item:100% cotton sheets".to_string(),
            "item:Buy LIGHT bulbs".to_string(),
        ]
    );

    let mut narrow = SearchQuery::new("e");
    narrow.limit = 1;
    assert_eq!(
        labels(&hive.search(&me, &narrow).unwrap()),
        vec!["anchor:Desk".to_string(), "item:100% cotton sheets".to_string()]
    );
}

#[test]
fn snippets_are_truncated_and_hits_are_scoped() {
    let conn = open_db_in_memory().unwrap();
    let (hive, me) = seeded(&conn);
    let long_body = "ü".repeat(SNIPPET_MAX_CHARS + 50);
    hive.create_item(&me, &NewItem::note("umlauts").with_body(long_body)).unwrap();

    let hits = hive.search(&me, &SearchQuery::new("umlauts")).unwrap();
    match hits.as_slice() {
        [SearchHit::Item {
            snippet: Some(snippet),
            ..
        }] => assert_eq!(snippet.chars().count(), SNIPPET_MAX_CHARS),
        other => panic!("unexpected hits: {other:?}"),
    }

    let stranger = caller("u2");
    assert!(hive
        .search(&stranger, &SearchQuery::new("e"))
        .unwrap()
        .is_empty());
}

#[test]
fn hits_serialize_with_a_kind_tag() {
    let conn = open_db_in_memory().unwrap();
    let (hive, me) = seeded(&conn);

    let hits = hive.search(&me, &SearchQuery::new("cotton")).unwrap();
    let json = serde_json::to_value(&hits).unwrap();
    assert_eq!(json[0]["kind"], "item");
    assert_eq!(json[0]["type"], "note");
    assert_eq!(json[0]["status"], "open");
}

//! CRUD behavior against the main file (WAL disabled).

mod common;

use common::{collect_all, open_plain, Item, Product};
use tempfile::tempdir;
use tqdb_core::{Config, Database, Error, RecordId};

#[test]
fn sequential_ids_start_at_one() {
    let dir = tempdir().unwrap();
    let db = open_plain(&dir, "seq.tqdb");
    db.register::<Item>().unwrap();

    let mut ids = Vec::new();
    for i in 0..3 {
        let mut item = Item::new(&format!("item-{i}"), i);
        ids.push(db.add(&mut item).unwrap());
        assert_eq!(item.id, ids[i as usize]);
    }
    assert_eq!(
        ids,
        vec![RecordId::new(1), RecordId::new(2), RecordId::new(3)]
    );
}

#[test]
fn add_then_get_roundtrips() {
    let dir = tempdir().unwrap();
    let db = open_plain(&dir, "rt.tqdb");
    db.register::<Item>().unwrap();

    let mut item = Item::new("widget", 7);
    item.active = false;
    let id = db.add(&mut item).unwrap();

    let loaded: Item = db.get(id).unwrap();
    assert_eq!(loaded, item);
}

#[test]
fn empty_string_roundtrips() {
    let dir = tempdir().unwrap();
    let db = open_plain(&dir, "empty.tqdb");
    db.register::<Item>().unwrap();

    let mut item = Item::new("", 0);
    let id = db.add(&mut item).unwrap();
    assert_eq!(db.get::<Item>(id).unwrap().name, "");
}

#[test]
fn get_unknown_id_is_not_found() {
    let dir = tempdir().unwrap();
    let db = open_plain(&dir, "miss.tqdb");
    db.register::<Item>().unwrap();

    let err = db.get::<Item>(RecordId::new(99)).unwrap_err();
    assert!(err.is_not_found());
    assert!(!db.exists::<Item>(RecordId::new(99)).unwrap());
}

#[test]
fn id_zero_is_rejected() {
    let dir = tempdir().unwrap();
    let db = open_plain(&dir, "zero.tqdb");
    db.register::<Item>().unwrap();

    assert!(matches!(
        db.get::<Item>(RecordId::UNASSIGNED),
        Err(Error::InvalidArgument { .. })
    ));
    assert!(!db.exists::<Item>(RecordId::UNASSIGNED).unwrap());
}

#[test]
fn unregistered_type_is_rejected() {
    let dir = tempdir().unwrap();
    let db = open_plain(&dir, "unreg.tqdb");

    let mut item = Item::new("x", 1);
    assert!(matches!(
        db.add(&mut item),
        Err(Error::NotRegistered { .. })
    ));
}

#[test]
fn update_replaces_record() {
    let dir = tempdir().unwrap();
    let db = open_plain(&dir, "upd.tqdb");
    db.register::<Item>().unwrap();

    let mut item = Item::new("before", 1);
    let id = db.add(&mut item).unwrap();

    item.name = "after".to_owned();
    item.value = 2;
    db.update(&item).unwrap();

    let loaded: Item = db.get(id).unwrap();
    assert_eq!(loaded.name, "after");
    assert_eq!(loaded.value, 2);
    assert_eq!(db.count::<Item>().unwrap(), 1);
}

#[test]
fn update_missing_is_not_found() {
    let dir = tempdir().unwrap();
    let db = open_plain(&dir, "updmiss.tqdb");
    db.register::<Item>().unwrap();

    let mut ghost = Item::new("ghost", 0);
    ghost.id = RecordId::new(42);
    assert!(db.update(&ghost).unwrap_err().is_not_found());
}

#[test]
fn delete_then_get_is_not_found() {
    let dir = tempdir().unwrap();
    let db = open_plain(&dir, "del.tqdb");
    db.register::<Item>().unwrap();

    let mut item = Item::new("doomed", 1);
    let id = db.add(&mut item).unwrap();
    db.delete::<Item>(id).unwrap();

    assert!(db.get::<Item>(id).unwrap_err().is_not_found());
    assert!(!db.exists::<Item>(id).unwrap());
    assert!(db.delete::<Item>(id).unwrap_err().is_not_found());
}

#[test]
fn deleting_last_record_leaves_readable_empty_section() {
    let dir = tempdir().unwrap();
    let db = open_plain(&dir, "last.tqdb");
    db.register::<Item>().unwrap();

    let id = db.add(&mut Item::new("only", 1)).unwrap();
    db.delete::<Item>(id).unwrap();

    assert_eq!(db.count::<Item>().unwrap(), 0);
    assert!(collect_all::<Item>(&db).is_empty());

    // The section still accepts new records.
    let id2 = db.add(&mut Item::new("next", 2)).unwrap();
    assert!(id2 > id);
    assert_eq!(db.count::<Item>().unwrap(), 1);
}

#[test]
fn count_matches_foreach_cardinality() {
    let dir = tempdir().unwrap();
    let db = open_plain(&dir, "count.tqdb");
    db.register::<Item>().unwrap();

    for i in 0..5 {
        db.add(&mut Item::new(&format!("i{i}"), i)).unwrap();
    }
    db.delete::<Item>(RecordId::new(2)).unwrap();
    db.delete::<Item>(RecordId::new(4)).unwrap();

    let visited = collect_all::<Item>(&db);
    assert_eq!(db.count::<Item>().unwrap() as usize, visited.len());
    assert_eq!(visited.len(), 3);
}

#[test]
fn foreach_stops_early() {
    let dir = tempdir().unwrap();
    let db = open_plain(&dir, "stop.tqdb");
    db.register::<Item>().unwrap();

    for i in 0..10 {
        db.add(&mut Item::new(&format!("i{i}"), i)).unwrap();
    }

    let mut seen = 0;
    db.for_each::<Item, _>(|_| {
        seen += 1;
        seen < 4
    })
    .unwrap();
    assert_eq!(seen, 4);
}

#[test]
fn persistence_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("persist.tqdb");

    let mut expected = Vec::new();
    {
        let db = Database::open(Config::new(&path).enable_wal(false)).unwrap();
        db.register::<Item>().unwrap();
        for i in 0..4 {
            let mut item = Item::new(&format!("item-{i}"), i * 10);
            db.add(&mut item).unwrap();
            expected.push(item);
        }
        db.delete::<Item>(expected[1].id).unwrap();
        expected.remove(1);
        db.close().unwrap();
    }

    let db = Database::open(Config::new(&path).enable_wal(false)).unwrap();
    db.register::<Item>().unwrap();
    assert_eq!(db.count::<Item>().unwrap() as usize, expected.len());
    for item in &expected {
        assert_eq!(&db.get::<Item>(item.id).unwrap(), item);
        assert!(db.exists::<Item>(item.id).unwrap());
    }
}

#[test]
fn ids_keep_increasing_after_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ids.tqdb");

    {
        let db = Database::open(Config::new(&path).enable_wal(false)).unwrap();
        db.register::<Item>().unwrap();
        for i in 0..3 {
            db.add(&mut Item::new(&format!("i{i}"), i)).unwrap();
        }
        db.close().unwrap();
    }

    let db = Database::open(Config::new(&path).enable_wal(false)).unwrap();
    db.register::<Item>().unwrap();
    let id = db.add(&mut Item::new("later", 9)).unwrap();
    assert_eq!(id, RecordId::new(4));
}

#[test]
fn ids_are_not_recycled_within_a_session() {
    let dir = tempdir().unwrap();
    let db = open_plain(&dir, "norecycle.tqdb");
    db.register::<Item>().unwrap();

    let id1 = db.add(&mut Item::new("a", 1)).unwrap();
    db.delete::<Item>(id1).unwrap();
    let id2 = db.add(&mut Item::new("b", 2)).unwrap();
    assert!(id2 > id1);
}

#[test]
fn multiple_types_share_one_file() {
    let dir = tempdir().unwrap();
    let db = open_plain(&dir, "multi.tqdb");
    db.register::<Item>().unwrap();
    db.register::<Product>().unwrap();

    db.add(&mut Item::new("front", 1)).unwrap();
    let mut p = Product::new("thing", "misc", 100, 1, 1.0, true, 1);
    let pid = db.add(&mut p).unwrap();
    db.add(&mut Item::new("back", 2)).unwrap();

    // Ids count per type, and reads skip across the other type's section.
    assert_eq!(pid, RecordId::new(1));
    assert_eq!(db.count::<Item>().unwrap(), 2);
    assert_eq!(db.count::<Product>().unwrap(), 1);
    assert_eq!(db.get::<Product>(pid).unwrap().name, "thing");
    assert_eq!(db.get::<Item>(RecordId::new(2)).unwrap().name, "back");
}

#[test]
fn filter_delete_removes_exactly_the_filtered() {
    let dir = tempdir().unwrap();
    let db = open_plain(&dir, "filter.tqdb");
    db.register::<Item>().unwrap();

    for i in 0..6 {
        let mut item = Item::new(&format!("i{i}"), i);
        item.active = i % 2 == 0;
        db.add(&mut item).unwrap();
    }

    db.delete_where::<Item, _>(|item| item.active).unwrap();

    assert_eq!(db.count::<Item>().unwrap(), 3);
    // Records from even positions survive (ids 1, 3, 5).
    for id in [1u32, 3, 5] {
        assert!(db.exists::<Item>(RecordId::new(id)).unwrap());
    }
    for id in [2u32, 4, 6] {
        assert!(!db.exists::<Item>(RecordId::new(id)).unwrap());
    }
}

#[test]
fn modify_where_touches_only_matches() {
    let dir = tempdir().unwrap();
    let db = open_plain(&dir, "modify.tqdb");
    db.register::<Item>().unwrap();

    for i in 0..4 {
        db.add(&mut Item::new(&format!("i{i}"), i)).unwrap();
    }

    db.modify_where::<Item, _, _>(|item| item.value >= 2, |item| item.value += 100)
        .unwrap();

    let values: Vec<i32> = collect_all::<Item>(&db).iter().map(|i| i.value).collect();
    assert_eq!(values, vec![0, 1, 102, 103]);
}

#[test]
fn modify_all_touches_everything() {
    let dir = tempdir().unwrap();
    let db = open_plain(&dir, "modall.tqdb");
    db.register::<Item>().unwrap();

    for i in 0..3 {
        db.add(&mut Item::new(&format!("i{i}"), i)).unwrap();
    }
    db.modify_all::<Item, _>(|item| item.active = false).unwrap();

    assert!(collect_all::<Item>(&db).iter().all(|i| !i.active));
}

#[test]
fn vacuum_preserves_contents() {
    let dir = tempdir().unwrap();
    let db = open_plain(&dir, "vac.tqdb");
    db.register::<Item>().unwrap();

    let mut items = Vec::new();
    for i in 0..5 {
        let mut item = Item::new(&format!("i{i}"), i);
        db.add(&mut item).unwrap();
        items.push(item);
    }

    db.vacuum().unwrap();

    assert_eq!(db.count::<Item>().unwrap(), 5);
    assert_eq!(collect_all::<Item>(&db), items);
}

#[test]
fn operations_after_close_are_rejected() {
    let dir = tempdir().unwrap();
    let db = open_plain(&dir, "closed.tqdb");
    db.register::<Item>().unwrap();
    db.close().unwrap();

    assert!(matches!(
        db.count::<Item>(),
        Err(Error::InvalidArgument { .. })
    ));
    // Closing twice is fine.
    db.close().unwrap();
}

#[test]
fn duplicate_registration_is_rejected() {
    let dir = tempdir().unwrap();
    let db = open_plain(&dir, "dup.tqdb");
    db.register::<Item>().unwrap();
    assert!(matches!(db.register::<Item>(), Err(Error::Exists { .. })));
}

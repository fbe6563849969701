/// Wrapper surface tests
///
/// Every adapter exposes the wrapped handle's operations plus its own, never
/// the introspection members, and carries the emulation marker through
/// chained calls.
/// Run with: cargo test --test wrapper_surface_tests
use bson::doc;
use legacy_mongo_shim::driver::{
    CLIENT_OPERATIONS, COLLECTION_OPERATIONS, CURSOR_OPERATIONS, DATABASE_OPERATIONS,
};
use legacy_mongo_shim::legacy::NEVER_FORWARD;
use legacy_mongo_shim::memory::MemoryDriver;
use legacy_mongo_shim::{CollectionHandle, LegacyCollection, LegacyDb, MongoClient};

async fn handles() -> (MongoClient, LegacyDb, LegacyCollection) {
    let client = MongoClient::new(MemoryDriver::new());
    let db = client.connect("mongodb://localhost:27017/testdb").await.unwrap();
    let trees = db.collection("trees").unwrap();
    (client, db, trees)
}

fn assert_clean(surface: &[&str]) {
    for hidden in NEVER_FORWARD {
        assert!(!surface.contains(hidden), "{} leaked into {:?}", hidden, surface);
    }
    let mut unique = surface.to_vec();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), surface.len(), "duplicates in {:?}", surface);
}

#[tokio::test]
async fn test_collection_surface() {
    let (_, _, trees) = handles().await;
    let surface = trees.surface();

    assert_clean(&surface);
    for inherited in COLLECTION_OPERATIONS {
        assert!(surface.contains(inherited), "missing {}", inherited);
    }
    for legacy in ["ensure_index", "insert", "remove", "update", "count", "find_with_projection"] {
        assert!(surface.contains(&legacy), "missing {}", legacy);
    }
}

#[tokio::test]
async fn test_database_and_client_surfaces() {
    let (client, db, _) = handles().await;

    let db_surface = db.surface();
    assert_clean(&db_surface);
    for member in DATABASE_OPERATIONS.iter().chain(["db", "close"].iter()) {
        assert!(db_surface.contains(member), "missing {}", member);
    }

    let client_surface = client.surface();
    assert_clean(&client_surface);
    assert_eq!(client_surface, vec!["connect"]);

    assert!(CLIENT_OPERATIONS.contains(&"close"));
}

#[tokio::test]
async fn test_cursor_surface_and_chain_marker() {
    let (_, _, trees) = handles().await;
    trees.insert(doc! { "kind": "spruce" }).await.unwrap();

    let cursor = trees.find(doc! {}, None);
    let surface = cursor.surface();
    assert_clean(&surface);
    for inherited in CURSOR_OPERATIONS {
        assert!(surface.contains(inherited), "missing {}", inherited);
    }
    assert!(surface.contains(&"next_object"));

    // the marker survives every link of a chain
    let cursor = cursor.project(doc! { "kind": 1 });
    assert!(cursor.is_emulated());
    let cursor = cursor.sort(doc! { "kind": 1 });
    assert!(cursor.is_emulated());
    let cursor = cursor.skip(0).limit(10).hint("_id_");
    assert!(cursor.is_emulated());

    let mut cursor = cursor;
    assert_eq!(cursor.to_array().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_inherited_members_behave_identically() {
    let (_, _, trees) = handles().await;
    trees.insert(doc! { "_id": 1, "kind": "spruce" }).await.unwrap();

    let through_shadow = trees.find_one(doc! { "_id": 1 }).await.unwrap();
    let through_target = CollectionHandle::find_one(&***trees, doc! { "_id": 1 }, doc! {})
        .await
        .unwrap();
    assert_eq!(through_shadow, through_target);
    assert_eq!(trees.name(), "trees");
}

/// Aggregate tests
///
/// Legacy `aggregate`: materialised results for callbacks, explicit cursor
/// requests passed through, positional and array pipelines.
/// Run with: cargo test --test aggregate_tests
use bson::doc;
use legacy_mongo_shim::memory::MemoryDriver;
use legacy_mongo_shim::{AggregateReply, LegacyCollection, MongoClient, Pipeline, pipeline};
use tokio::sync::oneshot;

async fn grove() -> LegacyCollection {
    let client = MongoClient::new(MemoryDriver::new());
    let db = client.connect("mongodb://localhost:27017/testdb").await.unwrap();
    let trees = db.collection("trees").unwrap();
    trees
        .insert(vec![
            doc! { "kind": "spruce", "ohmy": true, "leaves": 5 },
            doc! { "kind": "pine", "ohmy": true, "leaves": 10 },
            doc! { "kind": "fir", "ohmy": false, "leaves": 15 },
        ])
        .await
        .unwrap();
    trees
}

#[tokio::test]
async fn test_awaited_aggregate_yields_a_cursor() {
    let trees = grove().await;

    let mut cursor = trees
        .aggregate(vec![doc! { "$match": { "ohmy": true } }])
        .await
        .unwrap();
    assert!(cursor.is_emulated());

    let result = cursor.to_array().await.unwrap();
    assert_eq!(result.len(), 2);
}

#[tokio::test]
async fn test_callback_receives_a_materialised_list() {
    let trees = grove().await;
    let (tx, rx) = oneshot::channel();

    trees
        .aggregate(vec![doc! { "$match": { "ohmy": true } }])
        .callback(move |result| {
            let _ = tx.send(result);
        });

    match rx.await.unwrap().unwrap() {
        AggregateReply::Documents(documents) => {
            assert_eq!(documents.len(), 2);
            assert!(documents.iter().all(|tree| tree.get_bool("ohmy").ok() == Some(true)));
        }
        AggregateReply::Cursor(_) => panic!("expected materialised documents"),
    }
}

#[tokio::test]
async fn test_cursor_option_is_passed_through() {
    let trees = grove().await;

    let call = trees
        .aggregate(vec![doc! { "$match": { "ohmy": true } }])
        .options(doc! { "cursor": { "batchSize": 1 } });
    assert!(call.wants_cursor());

    let mut cursor = call.await.unwrap();
    assert!(cursor.next_object().await.unwrap().is_some());
    assert!(cursor.next_object().await.unwrap().is_some());
    assert!(cursor.next_object().await.unwrap().is_none());
}

#[tokio::test]
async fn test_cursor_option_with_callback_delivers_a_cursor() {
    let trees = grove().await;
    let (tx, rx) = oneshot::channel();

    trees
        .aggregate(vec![doc! { "$match": { "ohmy": true } }])
        .options(doc! { "cursor": { "batchSize": 1 } })
        .callback(move |result| {
            let _ = tx.send(result);
        });

    let reply = rx.await.unwrap().unwrap();
    assert!(matches!(reply, AggregateReply::Cursor(_)));
    assert_eq!(reply.into_documents().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_group_pipeline() {
    let trees = grove().await;

    let mut cursor = trees
        .aggregate(vec![
            doc! { "$match": { "ohmy": true } },
            doc! { "$group": { "_id": null, "count": { "$sum": 1 } } },
        ])
        .await
        .unwrap();

    let result = cursor.to_array().await.unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].get_i32("count").unwrap(), 2);
}

#[tokio::test]
async fn test_positional_stages() {
    let trees = grove().await;

    let stages = pipeline![
        doc! { "$match": { "leaves": { "$gte": 10 } } },
        doc! { "$sort": { "leaves": -1 } },
        doc! { "$project": { "kind": 1, "_id": 0 } },
    ];
    assert!(matches!(stages, Pipeline::Positional(_)));

    let result = trees.aggregate(stages).cursor().to_array().await.unwrap();
    assert_eq!(result, vec![doc! { "kind": "fir" }, doc! { "kind": "pine" }]);

    let single = trees
        .aggregate(doc! { "$count": "total" })
        .cursor()
        .to_array()
        .await
        .unwrap();
    assert_eq!(single, vec![doc! { "total": 3 }]);
}

#[tokio::test]
async fn test_cursor_modifiers_on_aggregate() {
    let trees = grove().await;

    let result = trees
        .aggregate(vec![doc! { "$match": {} }])
        .cursor()
        .sort(doc! { "leaves": 1 })
        .limit(1)
        .to_array()
        .await
        .unwrap();
    assert_eq!(result[0].get_str("kind").unwrap(), "spruce");
}

#[tokio::test]
async fn test_stage_errors_reach_the_caller() {
    let trees = grove().await;

    let mut cursor = trees
        .aggregate(vec![doc! { "$bucketAuto": { "groupBy": "$leaves", "buckets": 2 } }])
        .await
        .unwrap();
    assert!(cursor.to_array().await.is_err());
}

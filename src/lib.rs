// ============================================================================
// legacy-mongo-shim Library
// ============================================================================
//
// Lets code written against the 2.x MongoDB driver calling convention run on
// top of a 3.x-style driver: `connect` yields the default database, `insert`,
// `update`, `remove` and `count` keep their old argument shapes and result
// shapes, `aggregate` hands callbacks a materialised array, and every
// asynchronous call can be awaited or given a callback.
//
// ============================================================================

pub mod connection;
pub mod core;
pub mod driver;
pub mod legacy;
#[cfg(feature = "memory")]
pub mod memory;

// Re-export main types for convenience
pub use core::{
    CommandStatus, DbError, DeleteResult, InsertManyResult, InsertOneResult, InsertOutcome,
    Result, UpdateResult, ValueExt, WriteResult,
};

pub use connection::{ConnectOptions, ConnectionString};

pub use driver::{ClientHandle, CollectionHandle, CursorHandle, DatabaseHandle, Driver};

// ============================================================================
// Legacy API
// ============================================================================

/// # Examples
///
/// ```ignore
/// use bson::doc;
/// use legacy_mongo_shim::{MongoClient, memory::MemoryDriver};
///
/// # async fn run() -> legacy_mongo_shim::Result<()> {
/// let client = MongoClient::new(MemoryDriver::new());
/// let db = client.connect("mongodb://localhost:27017/forest").await?;
/// let trees = db.collection("trees")?;
///
/// trees.insert(vec![doc! { "kind": "spruce" }, doc! { "kind": "pine" }]).await?;
///
/// // a replacement applied to every match
/// let result = trees
///     .update(doc! {}, doc! { "leaves": "green" })
///     .options(doc! { "multi": true })
///     .await?;
/// assert_eq!(result.n_modified(), 2);
///
/// assert_eq!(trees.count().await?, 2);
/// db.close().await?;
/// # Ok(())
/// # }
/// ```
pub use legacy::{
    AggregateReply, Docs, LegacyCollection, LegacyCursor, LegacyDb, MongoClient, Pending, Pipeline,
};

#[cfg(feature = "memory")]
pub use memory::MemoryDriver;

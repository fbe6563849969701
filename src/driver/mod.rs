//! Capability interface of the underlying (newer, stricter) driver.
//!
//! The legacy adapters only ever talk to these traits. Any driver that
//! implements them can sit underneath the shim; [`crate::memory`] provides an
//! in-process one.
//!
//! Options arguments are loosely typed bags (`bson::Document`) because the
//! legacy surface forwards whatever the caller passed, minus the keys it
//! consumed itself.

use crate::core::{DeleteResult, InsertManyResult, InsertOneResult, Result, UpdateResult};
use async_trait::async_trait;
use bson::{Bson, Document};
use std::sync::Arc;

pub const DRIVER_OPERATIONS: &[&str] = &["connect"];

pub const CLIENT_OPERATIONS: &[&str] = &["db", "close"];

pub const DATABASE_OPERATIONS: &[&str] = &["name", "collection"];

pub const COLLECTION_OPERATIONS: &[&str] = &[
    "name",
    "find",
    "find_one",
    "aggregate",
    "create_index",
    "insert_one",
    "insert_many",
    "delete_one",
    "delete_many",
    "update_one",
    "update_many",
    "replace_one",
    "count_documents",
];

pub const CURSOR_OPERATIONS: &[&str] =
    &["project", "sort", "limit", "skip", "hint", "next", "to_array"];

/// Entry point: turns a URI into a live client
#[async_trait]
pub trait Driver: Send + Sync {
    async fn connect(&self, uri: &str, options: Document) -> Result<Arc<dyn ClientHandle>>;

    fn operations(&self) -> &'static [&'static str] {
        DRIVER_OPERATIONS
    }
}

/// A live connection to the cluster
#[async_trait]
pub trait ClientHandle: Send + Sync {
    fn db(&self, name: &str) -> Arc<dyn DatabaseHandle>;

    async fn close(&self, force: bool) -> Result<()>;

    fn operations(&self) -> &'static [&'static str] {
        CLIENT_OPERATIONS
    }
}

/// A logical database on a client
pub trait DatabaseHandle: Send + Sync {
    fn name(&self) -> &str;

    fn collection(&self, name: &str, options: Document) -> Result<Arc<dyn CollectionHandle>>;

    fn operations(&self) -> &'static [&'static str] {
        DATABASE_OPERATIONS
    }
}

/// A named collection
#[async_trait]
pub trait CollectionHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Lazy: nothing runs until the cursor is advanced
    fn find(&self, filter: Document) -> Box<dyn CursorHandle>;

    async fn find_one(&self, filter: Document, options: Document) -> Result<Option<Document>>;

    /// Always cursor-returning
    fn aggregate(&self, pipeline: Vec<Document>, options: Document) -> Box<dyn CursorHandle>;

    async fn create_index(&self, keys: Document, options: Document) -> Result<String>;

    async fn insert_one(&self, doc: Document, options: Document) -> Result<InsertOneResult>;

    async fn insert_many(&self, docs: Vec<Document>, options: Document)
    -> Result<InsertManyResult>;

    async fn delete_one(&self, filter: Document, options: Document) -> Result<DeleteResult>;

    async fn delete_many(&self, filter: Document, options: Document) -> Result<DeleteResult>;

    /// `update` must consist of update operators
    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        options: Document,
    ) -> Result<UpdateResult>;

    async fn update_many(
        &self,
        filter: Document,
        update: Document,
        options: Document,
    ) -> Result<UpdateResult>;

    /// `replacement` must not contain update operators
    async fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
        options: Document,
    ) -> Result<UpdateResult>;

    async fn count_documents(&self, filter: Document, options: Document) -> Result<u64>;

    fn operations(&self) -> &'static [&'static str] {
        COLLECTION_OPERATIONS
    }
}

/// An in-flight result stream
#[async_trait]
pub trait CursorHandle: Send {
    fn project(&mut self, projection: Document);

    fn sort(&mut self, spec: Document);

    fn limit(&mut self, limit: i64);

    fn skip(&mut self, skip: u64);

    fn hint(&mut self, hint: Bson);

    /// Advance and fetch
    async fn next(&mut self) -> Result<Option<Document>>;

    /// Drain the remaining results
    async fn to_array(&mut self) -> Result<Vec<Document>>;

    fn operations(&self) -> &'static [&'static str] {
        CURSOR_OPERATIONS
    }
}

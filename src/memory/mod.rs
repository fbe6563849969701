//! In-process implementation of the driver interface.
//!
//! Behaves like the newer, stricter driver generation: separate operations
//! for one/many inserts, updates and deletes, update documents that must be
//! made of operators, replacements that must not be, a counting operation
//! that refuses geospatial and script predicates, and cursors everywhere.
//!
//! Data lives in one shared store per [`MemoryDriver`], so several clients
//! connected through the same driver see the same databases, the way several
//! connections to one server would.
//!
//! # Architecture
//!
//! - `collection.rs` - CRUD operations on one collection
//! - `cursor.rs` - lazy cursors over find and aggregate results
//! - `matcher.rs` - query filter evaluation
//! - `geo.rs` - `$near` / `$nearSphere` distance checks
//! - `update.rs` - update operators
//! - `projection.rs` - projection and sort
//! - `aggregate.rs` - aggregation stages

mod aggregate;
mod collection;
mod cursor;
mod geo;
mod matcher;
mod projection;
mod update;

pub use collection::MemoryCollection;
pub use cursor::MemoryCursor;

use crate::connection::options::{LEGACY_RECONNECT_OPTIONS, USE_UNIFIED_TOPOLOGY};
use crate::core::document::flag;
use crate::core::{DbError, Result};
use crate::driver::{ClientHandle, CollectionHandle, DatabaseHandle, Driver};
use async_trait::async_trait;
use bson::Document;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::trace;

const SCHEMES: [&str; 2] = ["mongodb://", "mongodb+srv://"];

/// Index definition kept per collection
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IndexSpec {
    pub name: String,
    pub keys: Document,
    pub unique: bool,
}

#[derive(Debug, Default)]
pub(crate) struct CollectionState {
    pub documents: Vec<Document>,
    pub indexes: Vec<IndexSpec>,
}

/// database name -> collection name -> contents
pub(crate) type Databases = HashMap<String, HashMap<String, CollectionState>>;

/// State shared by every client of one driver
#[derive(Debug, Default)]
pub(crate) struct Storage {
    pub databases: RwLock<Databases>,
}

/// What every handle derived from one client carries
#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub storage: Arc<Storage>,
    closed: Arc<AtomicBool>,
}

impl Session {
    fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DbError::ClientClosed);
        }
        Ok(())
    }
}

/// In-memory driver
///
/// # Examples
///
/// ```ignore
/// let driver = MemoryDriver::new();
/// let client = driver.connect("mongodb://localhost/app", Document::new()).await?;
/// let users = client.db("app").collection("users", Document::new())?;
/// users.insert_one(doc! { "name": "Alice" }, Document::new()).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    storage: Arc<Storage>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the databases holding at least one collection
    pub fn database_names(&self) -> Result<Vec<String>> {
        let databases = self.storage.databases.read()?;
        let mut names: Vec<String> = databases
            .iter()
            .filter(|(_, collections)| !collections.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn connect(&self, uri: &str, options: Document) -> Result<Arc<dyn ClientHandle>> {
        if !SCHEMES.iter().any(|scheme| uri.starts_with(scheme)) {
            return Err(DbError::Connection(
                "Invalid scheme, expected connection string to start with \"mongodb://\" or \"mongodb+srv://\""
                    .into(),
            ));
        }

        if flag(&options, USE_UNIFIED_TOPOLOGY) {
            if let Some(option) = LEGACY_RECONNECT_OPTIONS
                .iter()
                .find(|option| options.contains_key(option))
            {
                return Err(DbError::InvalidOption(format!(
                    "{} is not supported with the unified topology",
                    option
                )));
            }
        }

        trace!(uri, "memory driver connected");
        Ok(Arc::new(MemoryClient {
            session: Session::new(Arc::clone(&self.storage)),
        }))
    }
}

/// Client of a [`MemoryDriver`]
#[derive(Debug)]
pub struct MemoryClient {
    session: Session,
}

impl MemoryClient {
    pub fn is_closed(&self) -> bool {
        self.session.ensure_open().is_err()
    }
}

#[async_trait]
impl ClientHandle for MemoryClient {
    fn db(&self, name: &str) -> Arc<dyn DatabaseHandle> {
        Arc::new(MemoryDatabase {
            session: self.session.clone(),
            name: name.to_string(),
        })
    }

    async fn close(&self, force: bool) -> Result<()> {
        trace!(force, "memory client closed");
        self.session.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Database of a [`MemoryClient`]
#[derive(Debug)]
pub struct MemoryDatabase {
    session: Session,
    name: String,
}

impl DatabaseHandle for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    /// `{ strict: true }` refuses collections that do not exist yet
    fn collection(&self, name: &str, options: Document) -> Result<Arc<dyn CollectionHandle>> {
        if name.is_empty() || name.contains('$') || name.contains('\0') {
            return Err(DbError::InvalidOption(format!("invalid collection name '{}'", name)));
        }

        if flag(&options, "strict") {
            let databases = self.session.storage.databases.read()?;
            let exists = databases
                .get(&self.name)
                .is_some_and(|collections| collections.contains_key(name));
            if !exists {
                return Err(DbError::CollectionNotFound(format!("{}.{}", self.name, name)));
            }
        }

        Ok(Arc::new(MemoryCollection::new(
            self.session.clone(),
            &self.name,
            name,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[tokio::test]
    async fn test_connect_rejects_foreign_scheme() {
        let driver = MemoryDriver::new();
        let err = driver
            .connect("postgres://localhost/db", Document::new())
            .await
            .err();
        assert!(matches!(err, Some(DbError::Connection(_))));
    }

    #[tokio::test]
    async fn test_connect_rejects_reconnect_options_under_unified_topology() {
        let driver = MemoryDriver::new();
        let err = driver
            .connect(
                "mongodb://localhost/db",
                doc! { "useUnifiedTopology": true, "reconnectTries": 30 },
            )
            .await
            .err();
        assert!(matches!(err, Some(DbError::InvalidOption(_))));

        assert!(
            driver
                .connect("mongodb://localhost/db", doc! { "reconnectTries": 30 })
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_strict_collection_lookup() {
        let driver = MemoryDriver::new();
        let client = driver.connect("mongodb://localhost/db", Document::new()).await.unwrap();
        let db = client.db("db");

        let missing = db.collection("trees", doc! { "strict": true }).err();
        assert!(matches!(missing, Some(DbError::CollectionNotFound(_))));

        let trees = db.collection("trees", Document::new()).unwrap();
        trees.insert_one(doc! { "kind": "oak" }, Document::new()).await.unwrap();
        assert!(db.collection("trees", doc! { "strict": true }).is_ok());
        assert_eq!(driver.database_names().unwrap(), vec!["db".to_string()]);
    }

    #[tokio::test]
    async fn test_closed_client_refuses_operations() {
        let driver = MemoryDriver::new();
        let client = driver.connect("mongodb://localhost/db", Document::new()).await.unwrap();
        let trees = client.db("db").collection("trees", Document::new()).unwrap();

        client.close(false).await.unwrap();

        let err = trees.insert_one(doc! { "kind": "oak" }, Document::new()).await.err();
        assert_eq!(err, Some(DbError::ClientClosed));
    }
}

use super::collection::LegacyCollection;
use super::dispatch::Pending;
use super::wrap::{Emulated, surface};
use crate::core::Result;
use crate::driver::{ClientHandle, DatabaseHandle};
use bson::Document;
use std::ops::Deref;
use std::sync::Arc;
use tracing::info;

pub const DATABASE_OVERRIDES: &[&str] = &["collection", "db", "close"];

/// Database handle as the legacy driver handed it out from `connect`
///
/// Keeps the owning client so that `db` and `close` behave as they used to:
/// `db` opens a sibling database on the same connection and `close` shuts
/// the whole connection down.
#[derive(Clone)]
pub struct LegacyDb {
    shadow: Emulated<Arc<dyn DatabaseHandle>>,
    client: Arc<dyn ClientHandle>,
}

impl LegacyDb {
    pub fn new(database: Arc<dyn DatabaseHandle>, client: Arc<dyn ClientHandle>) -> Self {
        Self {
            shadow: Emulated::new(database),
            client,
        }
    }

    pub fn collection(&self, name: &str) -> Result<LegacyCollection> {
        self.collection_with(name, Document::new())
    }

    pub fn collection_with(&self, name: &str, options: Document) -> Result<LegacyCollection> {
        self.shadow.collection(name, options).map(LegacyCollection::new)
    }

    /// Callback form of `collection`, with or without options
    ///
    /// # Examples
    ///
    /// ```ignore
    /// db.collection_callback("trees", None, |result| {
    ///     let trees = result.expect("collection");
    ///     assert!(trees.is_emulated());
    /// });
    /// ```
    pub fn collection_callback<F>(&self, name: &str, options: impl Into<Option<Document>>, callback: F)
    where
        F: FnOnce(Result<LegacyCollection>),
    {
        callback(self.collection_with(name, options.into().unwrap_or_default()));
    }

    /// Another database on the same client, wrapped the same way
    pub fn db(&self, name: &str) -> LegacyDb {
        LegacyDb::new(self.client.db(name), Arc::clone(&self.client))
    }

    /// Closes the owning client, not just this database view
    pub fn close(&self) -> Pending<()> {
        self.close_with(false)
    }

    pub fn close_with(&self, force: bool) -> Pending<()> {
        let client = Arc::clone(&self.client);
        let database = self.shadow.name().to_string();
        Pending::new(async move {
            info!(database = %database, force, "closing client");
            client.close(force).await
        })
    }

    pub fn client(&self) -> &Arc<dyn ClientHandle> {
        &self.client
    }

    pub fn surface(&self) -> Vec<&'static str> {
        surface(self.shadow.operations(), DATABASE_OVERRIDES)
    }
}

impl Deref for LegacyDb {
    type Target = Emulated<Arc<dyn DatabaseHandle>>;

    fn deref(&self) -> &Self::Target {
        &self.shadow
    }
}

impl std::fmt::Debug for LegacyDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyDb")
            .field("name", &self.shadow.name())
            .finish_non_exhaustive()
    }
}

//! Collection adapter: the legacy operation surface expressed through the
//! new driver's operations.
//!
//! Optional legacy arguments become builder methods on a per-operation call
//! type. Every call is awaitable (promise form) and accepts `.callback(..)`
//! (callback form).

mod aggregate;
mod count;
mod update;

pub use aggregate::{AggregateCall, AggregateReply, Pipeline};
pub use count::{COUNT_INCOMPATIBLE_OPERATORS, CountCall};
pub use update::{UpdateCall, UpdateRoute};

use super::cursor::LegacyCursor;
use super::dispatch::{Pending, legacy_call};
use super::wrap::{Emulated, surface};
use crate::core::document::{flag, omit};
use crate::core::{DeleteResult, InsertOutcome};
use crate::driver::CollectionHandle;
use bson::{Document, doc};
use std::ops::Deref;
use std::sync::Arc;
use tracing::debug;

pub const COLLECTION_OVERRIDES: &[&str] = &[
    "find",
    "find_with_projection",
    "find_one",
    "aggregate",
    "ensure_index",
    "insert",
    "remove",
    "update",
    "count",
];

/// Collection handle speaking the legacy dialect
#[derive(Clone)]
pub struct LegacyCollection {
    shadow: Emulated<Arc<dyn CollectionHandle>>,
}

impl LegacyCollection {
    pub fn new(collection: Arc<dyn CollectionHandle>) -> Self {
        Self {
            shadow: Emulated::new(collection),
        }
    }

    fn target(&self) -> Arc<dyn CollectionHandle> {
        Arc::clone(&*self.shadow)
    }

    /// Find with an optional projection
    ///
    /// The projection is applied to the returned cursor rather than passed
    /// as a second argument to the driver's `find`.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let kinds = trees.find(doc! {}, doc! { "kind": 1 }).sort(doc! { "leaves": 1 }).to_array().await?;
    /// ```
    pub fn find(&self, criteria: Document, projection: impl Into<Option<Document>>) -> LegacyCursor {
        let cursor = LegacyCursor::new(self.shadow.find(criteria));
        match projection.into() {
            Some(projection) => cursor.project(projection),
            None => cursor,
        }
    }

    /// Alias of [`LegacyCollection::find`] kept for callers that used the
    /// separately named variant
    pub fn find_with_projection(
        &self,
        criteria: Document,
        projection: impl Into<Option<Document>>,
    ) -> LegacyCursor {
        self.find(criteria, projection)
    }

    pub fn find_one(&self, criteria: Document) -> FindOneCall {
        FindOneCall {
            target: self.target(),
            criteria,
            projection: None,
        }
    }

    /// Aggregation pipeline, given as one array of stages or as positional
    /// stages (see [`Pipeline`])
    pub fn aggregate(&self, pipeline: impl Into<Pipeline>) -> AggregateCall {
        AggregateCall::new(self.target(), pipeline.into())
    }

    /// Same as the driver's `create_index`
    pub fn ensure_index(&self, keys: Document) -> IndexCall {
        IndexCall {
            target: self.target(),
            keys,
            options: Document::new(),
        }
    }

    /// Insert one document or a batch
    ///
    /// # Examples
    ///
    /// ```ignore
    /// trees.insert(doc! { "kind": "oak" }).await?;
    /// trees.insert(vec![doc! { "kind": "spruce" }, doc! { "kind": "pine" }]).await?;
    /// ```
    pub fn insert(&self, docs: impl Into<Docs>) -> InsertCall {
        InsertCall {
            target: self.target(),
            docs: docs.into(),
            options: Document::new(),
        }
    }

    /// Remove every match, or only the first with `{ single: true }`
    pub fn remove(&self, selector: Document) -> RemoveCall {
        RemoveCall {
            target: self.target(),
            selector,
            options: Document::new(),
        }
    }

    /// Legacy update: atomic or whole-document, single or multi, decided by
    /// the shape of `doc` and the `multi` option (see [`UpdateRoute`])
    pub fn update(&self, selector: Document, doc: Document) -> UpdateCall {
        UpdateCall::new(self.target(), selector, doc)
    }

    pub fn count(&self) -> CountCall {
        CountCall::new(self.target())
    }

    pub fn surface(&self) -> Vec<&'static str> {
        surface(self.shadow.operations(), COLLECTION_OVERRIDES)
    }
}

impl Deref for LegacyCollection {
    type Target = Emulated<Arc<dyn CollectionHandle>>;

    fn deref(&self) -> &Self::Target {
        &self.shadow
    }
}

impl std::fmt::Debug for LegacyCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyCollection")
            .field("name", &self.shadow.name())
            .finish()
    }
}

// ============================================================================
// find_one
// ============================================================================

pub struct FindOneCall {
    target: Arc<dyn CollectionHandle>,
    criteria: Document,
    projection: Option<Document>,
}

impl FindOneCall {
    pub fn projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    fn into_pending(self) -> Pending<Option<Document>> {
        let Self {
            target,
            criteria,
            projection,
        } = self;
        let options = match projection {
            Some(projection) => doc! { "projection": projection },
            None => Document::new(),
        };
        Pending::new(async move { target.find_one(criteria, options).await })
    }
}

legacy_call!(FindOneCall => Option<Document>);

// ============================================================================
// ensure_index
// ============================================================================

pub struct IndexCall {
    target: Arc<dyn CollectionHandle>,
    keys: Document,
    options: Document,
}

impl IndexCall {
    pub fn options(mut self, options: Document) -> Self {
        self.options = options;
        self
    }

    fn into_pending(self) -> Pending<String> {
        let Self {
            target,
            keys,
            options,
        } = self;
        Pending::new(async move { target.create_index(keys, options).await })
    }
}

legacy_call!(IndexCall => String);

// ============================================================================
// insert
// ============================================================================

/// One document or a batch
#[derive(Debug, Clone, PartialEq)]
pub enum Docs {
    One(Document),
    Many(Vec<Document>),
}

impl From<Document> for Docs {
    fn from(doc: Document) -> Self {
        Self::One(doc)
    }
}

impl From<Vec<Document>> for Docs {
    fn from(docs: Vec<Document>) -> Self {
        Self::Many(docs)
    }
}

pub struct InsertCall {
    target: Arc<dyn CollectionHandle>,
    docs: Docs,
    options: Document,
}

impl InsertCall {
    pub fn options(mut self, options: Document) -> Self {
        self.options = options;
        self
    }

    fn into_pending(self) -> Pending<InsertOutcome> {
        let Self {
            target,
            docs,
            options,
        } = self;
        Pending::new(async move {
            match docs {
                Docs::One(doc) => {
                    debug!(collection = target.name(), "legacy insert routed to insert_one");
                    target.insert_one(doc, options).await.map(InsertOutcome::One)
                }
                Docs::Many(docs) => {
                    debug!(
                        collection = target.name(),
                        count = docs.len(),
                        "legacy insert routed to insert_many"
                    );
                    target.insert_many(docs, options).await.map(InsertOutcome::Many)
                }
            }
        })
    }
}

legacy_call!(InsertCall => InsertOutcome);

// ============================================================================
// remove
// ============================================================================

pub struct RemoveCall {
    target: Arc<dyn CollectionHandle>,
    selector: Document,
    options: Document,
}

impl RemoveCall {
    pub fn options(mut self, options: Document) -> Self {
        self.options = options;
        self
    }

    fn into_pending(self) -> Pending<DeleteResult> {
        let Self {
            target,
            selector,
            options,
        } = self;
        Pending::new(async move {
            if flag(&options, "single") {
                debug!(collection = target.name(), "legacy remove routed to delete_one");
                target.delete_one(selector, omit(&options, &["single"])).await
            } else {
                debug!(collection = target.name(), "legacy remove routed to delete_many");
                target.delete_many(selector, options).await
            }
        })
    }
}

legacy_call!(RemoveCall => DeleteResult);

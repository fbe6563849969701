use super::aggregate;
use super::collection::MemoryCollection;
use super::projection::{project, sort_documents};
use crate::core::Result;
use crate::driver::CursorHandle;
use async_trait::async_trait;
use bson::{Bson, Document};
use std::collections::VecDeque;
use tracing::trace;

#[derive(Debug, Clone)]
enum Source {
    Find(Document),
    Aggregate(Vec<Document>),
}

/// Lazy cursor: the query runs on the first `next` / `to_array`, with the
/// modifiers set up to that point. Later modifier calls are ignored.
#[derive(Debug)]
pub struct MemoryCursor {
    collection: MemoryCollection,
    source: Source,
    projection: Option<Document>,
    sort: Option<Document>,
    skip: u64,
    limit: i64,
    hint: Option<Bson>,
    buffer: Option<VecDeque<Document>>,
}

impl MemoryCursor {
    pub(crate) fn find(collection: MemoryCollection, filter: Document) -> Self {
        Self::over(collection, Source::Find(filter))
    }

    pub(crate) fn aggregate(collection: MemoryCollection, pipeline: Vec<Document>) -> Self {
        Self::over(collection, Source::Aggregate(pipeline))
    }

    fn over(collection: MemoryCollection, source: Source) -> Self {
        Self {
            collection,
            source,
            projection: None,
            sort: None,
            skip: 0,
            limit: 0,
            hint: None,
            buffer: None,
        }
    }

    /// Whether the query has run
    pub fn is_started(&self) -> bool {
        self.buffer.is_some()
    }

    fn execute(&self) -> Result<VecDeque<Document>> {
        let mut documents = match &self.source {
            Source::Find(filter) => self.collection.select(filter, self.hint.as_ref())?,
            Source::Aggregate(pipeline) => {
                aggregate::run(self.collection.select(&Document::new(), None)?, pipeline)?
            }
        };

        if let Some(spec) = &self.sort {
            sort_documents(&mut documents, spec)?;
        }

        let skip = usize::try_from(self.skip).unwrap_or(usize::MAX);
        // negative limits behave like positive ones, zero means none
        let limit = match usize::try_from(self.limit.unsigned_abs()).unwrap_or(usize::MAX) {
            0 => usize::MAX,
            limit => limit,
        };

        let mut shaped = VecDeque::new();
        for doc in documents.into_iter().skip(skip).take(limit) {
            shaped.push_back(match &self.projection {
                Some(projection) => project(&doc, projection)?,
                None => doc,
            });
        }

        trace!(
            namespace = %self.collection.namespace(),
            returned = shaped.len(),
            "cursor executed"
        );
        Ok(shaped)
    }

    fn buffer(&mut self) -> Result<&mut VecDeque<Document>> {
        if self.buffer.is_none() {
            self.buffer = Some(self.execute()?);
        }
        Ok(self.buffer.get_or_insert_with(VecDeque::new))
    }
}

#[async_trait]
impl CursorHandle for MemoryCursor {
    fn project(&mut self, projection: Document) {
        if !self.is_started() {
            self.projection = Some(projection);
        }
    }

    fn sort(&mut self, spec: Document) {
        if !self.is_started() {
            self.sort = Some(spec);
        }
    }

    fn limit(&mut self, limit: i64) {
        if !self.is_started() {
            self.limit = limit;
        }
    }

    fn skip(&mut self, skip: u64) {
        if !self.is_started() {
            self.skip = skip;
        }
    }

    fn hint(&mut self, hint: Bson) {
        if !self.is_started() {
            self.hint = Some(hint);
        }
    }

    async fn next(&mut self) -> Result<Option<Document>> {
        Ok(self.buffer()?.pop_front())
    }

    async fn to_array(&mut self) -> Result<Vec<Document>> {
        Ok(self.buffer()?.drain(..).collect())
    }
}

use crate::core::document::has_nested_keys;
use crate::core::{Result, ValueExt};
use crate::driver::{CollectionHandle, CursorHandle};
use crate::legacy::dispatch::{Pending, legacy_call};
use bson::{Document, doc};
use std::sync::Arc;
use tracing::debug;

/// Operators the dedicated document-counting operation rejects or
/// mishandles; a query using any of them, at any depth, is counted by
/// enumeration instead.
pub const COUNT_INCOMPATIBLE_OPERATORS: [&str; 3] = ["$where", "$near", "$nearSphere"];

/// Legacy `count([query], [options])`
///
/// Missing arguments default to empty documents. `limit`, `skip` and `hint`
/// in the options are honoured on both the fast path and the enumeration
/// path.
pub struct CountCall {
    target: Arc<dyn CollectionHandle>,
    query: Document,
    options: Document,
}

impl CountCall {
    pub(super) fn new(target: Arc<dyn CollectionHandle>) -> Self {
        Self {
            target,
            query: Document::new(),
            options: Document::new(),
        }
    }

    pub fn query(mut self, query: Document) -> Self {
        self.query = query;
        self
    }

    pub fn options(mut self, options: Document) -> Self {
        self.options = options;
        self
    }

    /// True when this count has to be answered by enumerating matches
    pub fn needs_enumeration(&self) -> bool {
        has_nested_keys(&self.query, &COUNT_INCOMPATIBLE_OPERATORS)
    }

    fn into_pending(self) -> Pending<u64> {
        let enumerate = self.needs_enumeration();
        let Self {
            target,
            query,
            options,
        } = self;

        Pending::new(async move {
            if enumerate {
                debug!(collection = target.name(), "count falls back to enumeration");
                count_by_enumeration(target.as_ref(), query, &options).await
            } else {
                target.count_documents(query, options).await
            }
        })
    }
}

legacy_call!(CountCall => u64);

async fn count_by_enumeration(
    target: &dyn CollectionHandle,
    query: Document,
    options: &Document,
) -> Result<u64> {
    let mut cursor = target.find(query);

    if let Some(limit) = options.get("limit").and_then(|limit| limit.as_integer()) {
        cursor.limit(limit);
    }
    if let Some(skip) = options.get("skip").and_then(|skip| skip.as_integer()) {
        CursorHandle::skip(cursor.as_mut(), u64::try_from(skip).unwrap_or_default());
    }
    if let Some(hint) = options.get("hint") {
        cursor.hint(hint.clone());
    }
    cursor.project(doc! { "_id": 1 });

    let matches = cursor.to_array().await?;
    Ok(matches.len() as u64)
}

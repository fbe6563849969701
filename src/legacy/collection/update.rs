//! Legacy `update`.
//!
//! The old driver decided between field-level modification and whole
//! document replacement from the document itself, and between one and many
//! matches from the `multi` option. The new driver has a separate operation
//! for each combination, except multi-document replace, which is emulated
//! here one document at a time.

use crate::core::document::{flag, is_atomic_update, omit};
use crate::core::{Result, ValueExt, WriteResult};
use crate::driver::CollectionHandle;
use crate::legacy::dispatch::{Pending, legacy_call};
use bson::{Bson, Document, doc};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Which new-driver operation a legacy update maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateRoute {
    /// `update_one`
    AtomicOne,
    /// `update_many`, `multi` stripped
    AtomicMany,
    /// `replace_one`
    ReplaceOne,
    /// Emulated: snapshot matching ids, then `replace_one` each in turn
    ReplaceMany,
}

impl UpdateRoute {
    pub fn resolve(doc: &Document, options: &Document) -> Self {
        // An _id in the new document can only ever match one document
        let carries_id = doc.get("_id").is_some_and(|id| id.is_truthy());
        let multi = flag(options, "multi") && !carries_id;

        match (is_atomic_update(doc), multi) {
            (true, false) => Self::AtomicOne,
            (true, true) => Self::AtomicMany,
            (false, false) => Self::ReplaceOne,
            (false, true) => Self::ReplaceMany,
        }
    }
}

pub struct UpdateCall {
    target: Arc<dyn CollectionHandle>,
    selector: Document,
    doc: Document,
    options: Document,
}

impl UpdateCall {
    pub(super) fn new(target: Arc<dyn CollectionHandle>, selector: Document, doc: Document) -> Self {
        Self {
            target,
            selector,
            doc,
            options: Document::new(),
        }
    }

    /// Options bag; `multi` is consumed here, the rest is forwarded
    pub fn options(mut self, options: Document) -> Self {
        self.options = options;
        self
    }

    pub fn route(&self) -> UpdateRoute {
        UpdateRoute::resolve(&self.doc, &self.options)
    }

    fn into_pending(self) -> Pending<WriteResult> {
        let route = self.route();
        let Self {
            target,
            selector,
            doc,
            options,
        } = self;

        debug!(collection = target.name(), ?route, "legacy update routed");

        Pending::new(async move {
            match route {
                UpdateRoute::AtomicOne => target
                    .update_one(selector, doc, options)
                    .await
                    .map(WriteResult::from),
                UpdateRoute::AtomicMany => target
                    .update_many(selector, doc, omit(&options, &["multi"]))
                    .await
                    .map(WriteResult::from),
                UpdateRoute::ReplaceOne => target
                    .replace_one(selector, doc, options)
                    .await
                    .map(WriteResult::from),
                UpdateRoute::ReplaceMany => {
                    replace_many(target.as_ref(), selector, doc, omit(&options, &["multi"])).await
                }
            }
        })
    }
}

legacy_call!(UpdateCall => WriteResult);

/// Replace every document matching `selector` with `replacement`.
///
/// The identifiers of the matching documents are captured before any write
/// happens, so a replacement that makes a document (re)match the selector
/// cannot cause it to be processed twice, and the set of targets cannot
/// grow or shrink while the loop runs. Replacements run strictly one after
/// another; the first failure ends the loop and is returned on its own.
async fn replace_many(
    target: &dyn CollectionHandle,
    selector: Document,
    replacement: Document,
    options: Document,
) -> Result<WriteResult> {
    let mut cursor = target.find(selector.clone());
    cursor.project(doc! { "_id": 1 });

    let mut pending: VecDeque<Bson> = cursor
        .to_array()
        .await?
        .into_iter()
        .filter_map(|mut found| found.remove("_id"))
        .collect();

    debug!(
        collection = target.name(),
        targets = pending.len(),
        "emulating multi-document replace"
    );

    let (mut matched, mut modified) = (0, 0);
    while let Some(id) = pending.pop_front() {
        let mut by_id = selector.clone();
        by_id.insert("_id", id);

        let status = target
            .replace_one(by_id, replacement.clone(), options.clone())
            .await?;
        matched += status.matched_count;
        modified += status.modified_count;
    }

    Ok(WriteResult::acknowledged(matched, modified))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_documents_are_atomic() {
        let set = doc! { "$set": { "x": 1 } };
        assert_eq!(UpdateRoute::resolve(&set, &doc! {}), UpdateRoute::AtomicOne);
        assert_eq!(
            UpdateRoute::resolve(&set, &doc! { "multi": true }),
            UpdateRoute::AtomicMany
        );
    }

    #[test]
    fn test_plain_documents_are_replacements() {
        let plain = doc! { "x": 1 };
        assert_eq!(UpdateRoute::resolve(&plain, &doc! {}), UpdateRoute::ReplaceOne);
        assert_eq!(
            UpdateRoute::resolve(&plain, &doc! { "multi": 1 }),
            UpdateRoute::ReplaceMany
        );
    }

    #[test]
    fn test_identifier_forces_single() {
        let with_id = doc! { "_id": 7, "x": 1 };
        assert_eq!(
            UpdateRoute::resolve(&with_id, &doc! { "multi": true }),
            UpdateRoute::ReplaceOne
        );

        let atomic_with_id = doc! { "_id": "abc", "$set": { "x": 1 } };
        assert_eq!(
            UpdateRoute::resolve(&atomic_with_id, &doc! { "multi": true }),
            UpdateRoute::AtomicOne
        );
    }

    #[test]
    fn test_falsy_multi_is_single() {
        let set = doc! { "$set": { "x": 1 } };
        assert_eq!(
            UpdateRoute::resolve(&set, &doc! { "multi": false }),
            UpdateRoute::AtomicOne
        );
    }
}

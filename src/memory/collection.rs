use super::cursor::MemoryCursor;
use super::update::{apply_update, upsert_seed, validate_replacement, validate_update};
use super::{CollectionState, IndexSpec, Session, matcher};
use crate::core::document::{flag, get_path, has_nested_keys};
use crate::core::{
    DbError, DeleteResult, InsertManyResult, InsertOneResult, Result, UpdateResult, ValueExt,
};
use crate::driver::{CollectionHandle, CursorHandle};
use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use tracing::trace;

/// Name of the index every collection has on `_id`
pub const ID_INDEX: &str = "_id_";

/// Predicates the counting operation refuses
const COUNT_REJECTED_OPERATORS: [&str; 3] = ["$where", "$near", "$nearSphere"];

#[derive(Debug, Clone)]
pub struct MemoryCollection {
    session: Session,
    database: String,
    name: String,
}

impl MemoryCollection {
    pub(crate) fn new(session: Session, database: &str, name: &str) -> Self {
        Self {
            session,
            database: database.to_string(),
            name: name.to_string(),
        }
    }

    /// `database.collection`
    pub fn namespace(&self) -> String {
        format!("{}.{}", self.database, self.name)
    }

    fn read<R>(&self, f: impl FnOnce(Option<&CollectionState>) -> Result<R>) -> Result<R> {
        self.session.ensure_open()?;
        let databases = self.session.storage.databases.read()?;
        f(databases
            .get(&self.database)
            .and_then(|collections| collections.get(&self.name)))
    }

    /// Writes create the collection on first use
    fn write<R>(&self, f: impl FnOnce(&mut CollectionState) -> Result<R>) -> Result<R> {
        self.session.ensure_open()?;
        let mut databases = self.session.storage.databases.write()?;
        let state = databases
            .entry(self.database.clone())
            .or_default()
            .entry(self.name.clone())
            .or_default();
        f(state)
    }

    /// Copies of the matching documents, in insertion order
    pub(crate) fn select(&self, filter: &Document, hint: Option<&Bson>) -> Result<Vec<Document>> {
        self.read(|state| {
            let indexes = state.map(|state| state.indexes.as_slice()).unwrap_or(&[]);
            if let Some(hint) = hint {
                check_hint(indexes, hint)?;
            }

            let mut selected = Vec::new();
            for doc in state.map(|state| state.documents.as_slice()).unwrap_or(&[]) {
                if matcher::matches(doc, filter)? {
                    selected.push(doc.clone());
                }
            }
            Ok(selected)
        })
    }

    fn modify(
        &self,
        filter: &Document,
        options: &Document,
        multi: bool,
        mut change: impl FnMut(&mut Document, bool) -> Result<()>,
    ) -> Result<UpdateResult> {
        let namespace = self.namespace();
        self.write(|state| {
            let mut matched = 0;
            let mut modified = 0;

            for index in 0..state.documents.len() {
                if !matcher::matches(&state.documents[index], filter)? {
                    continue;
                }
                matched += 1;

                let mut next = state.documents[index].clone();
                change(&mut next, false)?;
                if next != state.documents[index] {
                    check_unique(state, &next, Some(index), &namespace)?;
                    state.documents[index] = next;
                    modified += 1;
                }

                if !multi {
                    break;
                }
            }

            let mut upserted_id = None;
            if matched == 0 && flag(options, "upsert") {
                let mut seed = upsert_seed(filter);
                change(&mut seed, true)?;
                let (doc, id) = with_id(seed);
                check_unique(state, &doc, None, &namespace)?;
                state.documents.push(doc);
                upserted_id = Some(id);
            }

            trace!(%namespace, matched, modified, upserted = upserted_id.is_some(), "update applied");
            Ok(UpdateResult {
                matched_count: matched,
                modified_count: modified,
                upserted_id,
            })
        })
    }

    fn delete(&self, filter: &Document, multi: bool) -> Result<DeleteResult> {
        let namespace = self.namespace();
        self.write(|state| {
            let mut kept = Vec::with_capacity(state.documents.len());
            let mut deleted = 0;
            for doc in std::mem::take(&mut state.documents) {
                if (multi || deleted == 0) && matcher::matches(&doc, filter)? {
                    deleted += 1;
                } else {
                    kept.push(doc);
                }
            }
            state.documents = kept;

            trace!(%namespace, deleted, "delete applied");
            Ok(DeleteResult {
                deleted_count: deleted,
            })
        })
    }

    fn insert(state: &mut CollectionState, doc: Document, namespace: &str) -> Result<Bson> {
        let (doc, id) = with_id(doc);
        check_unique(state, &doc, None, namespace)?;
        state.documents.push(doc);
        Ok(id)
    }
}

/// `doc` with an `_id` in first position, generating one if absent
fn with_id(doc: Document) -> (Document, Bson) {
    if let Some(id) = doc.get("_id") {
        let id = id.clone();
        return (doc, id);
    }

    let id = Bson::ObjectId(ObjectId::new());
    let mut identified = Document::new();
    identified.insert("_id", id.clone());
    for (key, value) in doc {
        identified.insert(key, value);
    }
    (identified, id)
}

/// The replacement, keeping the stored `_id`
fn replaced(current: &Document, replacement: &Document) -> Result<Document> {
    let mut next = Document::new();
    match (current.get("_id"), replacement.get("_id")) {
        (Some(old), Some(new)) if !old.loosely_equals(new) => {
            return Err(DbError::InvalidUpdate(
                "the (immutable) field '_id' was found to have been altered".into(),
            ));
        }
        (Some(id), _) | (None, Some(id)) => {
            next.insert("_id", id.clone());
        }
        (None, None) => {}
    }
    for (key, value) in replacement {
        if key != "_id" {
            next.insert(key.clone(), value.clone());
        }
    }
    Ok(next)
}

fn index_key(doc: &Document, keys: &Document) -> Bson {
    Bson::Array(
        keys.keys()
            .map(|path| get_path(doc, path).cloned().unwrap_or(Bson::Null))
            .collect(),
    )
}

fn others(documents: &[Document], ignore: Option<usize>) -> impl Iterator<Item = &Document> {
    documents
        .iter()
        .enumerate()
        .filter(move |(index, _)| Some(*index) != ignore)
        .map(|(_, doc)| doc)
}

fn check_unique(
    state: &CollectionState,
    candidate: &Document,
    ignore: Option<usize>,
    namespace: &str,
) -> Result<()> {
    if let Some(id) = candidate.get("_id") {
        let taken = others(&state.documents, ignore)
            .any(|doc| doc.get("_id").is_some_and(|other| other.loosely_equals(id)));
        if taken {
            return Err(DbError::DuplicateKey(format!(
                "E11000 duplicate key error collection: {} index: {} dup key: {{ _id: {} }}",
                namespace, ID_INDEX, id
            )));
        }
    }

    for index in state.indexes.iter().filter(|index| index.unique) {
        let key = index_key(candidate, &index.keys);
        let taken = others(&state.documents, ignore)
            .any(|doc| index_key(doc, &index.keys).loosely_equals(&key));
        if taken {
            return Err(DbError::DuplicateKey(format!(
                "E11000 duplicate key error collection: {} index: {} dup key: {}",
                namespace, index.name, key
            )));
        }
    }

    Ok(())
}

fn same_keys(a: &Document, b: &Document) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|((ka, va), (kb, vb))| ka == kb && va.loosely_equals(vb))
}

fn check_hint(indexes: &[IndexSpec], hint: &Bson) -> Result<()> {
    let known = match hint {
        Bson::String(name) => name == ID_INDEX || indexes.iter().any(|index| &index.name == name),
        Bson::Document(keys) => {
            same_keys(keys, &doc! { "_id": 1 }) || indexes.iter().any(|index| same_keys(keys, &index.keys))
        }
        _ => {
            return Err(DbError::InvalidQuery(
                "hint must be an index name or a key pattern".into(),
            ));
        }
    };

    if known {
        Ok(())
    } else {
        Err(DbError::InvalidQuery(format!(
            "hint provided does not correspond to an existing index: {}",
            hint
        )))
    }
}

/// `field_direction` pairs joined with `_`, e.g. `kind_1_height_-1`
fn default_index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(field, direction)| match direction {
            Bson::String(kind) => format!("{}_{}", field, kind),
            other => format!("{}_{}", field, other.as_integer().unwrap_or(1)),
        })
        .collect::<Vec<_>>()
        .join("_")
}

#[async_trait]
impl CollectionHandle for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn find(&self, filter: Document) -> Box<dyn CursorHandle> {
        Box::new(MemoryCursor::find(self.clone(), filter))
    }

    /// Honours `projection`, `sort` and `skip`
    async fn find_one(&self, filter: Document, options: Document) -> Result<Option<Document>> {
        let mut cursor = MemoryCursor::find(self.clone(), filter);
        if let Ok(projection) = options.get_document("projection") {
            cursor.project(projection.clone());
        }
        if let Ok(sort) = options.get_document("sort") {
            cursor.sort(sort.clone());
        }
        if let Some(skip) = options.get("skip").and_then(|skip| skip.as_integer()) {
            CursorHandle::skip(&mut cursor, u64::try_from(skip).unwrap_or_default());
        }
        cursor.limit(1);
        CursorHandle::next(&mut cursor).await
    }

    fn aggregate(&self, pipeline: Vec<Document>, _options: Document) -> Box<dyn CursorHandle> {
        Box::new(MemoryCursor::aggregate(self.clone(), pipeline))
    }

    async fn create_index(&self, keys: Document, options: Document) -> Result<String> {
        if keys.is_empty() {
            return Err(DbError::InvalidOption("index keys must not be empty".into()));
        }

        let name = match options.get("name") {
            Some(Bson::String(name)) => name.clone(),
            _ => default_index_name(&keys),
        };
        let spec = IndexSpec {
            name: name.clone(),
            keys,
            unique: flag(&options, "unique"),
        };
        let namespace = self.namespace();

        self.write(|state| {
            if let Some(existing) = state.indexes.iter().find(|index| index.name == spec.name) {
                return if same_keys(&existing.keys, &spec.keys) && existing.unique == spec.unique {
                    Ok(())
                } else {
                    Err(DbError::InvalidOption(format!(
                        "an index named '{}' already exists with different options",
                        spec.name
                    )))
                };
            }

            if spec.unique {
                let mut seen: Vec<Bson> = Vec::with_capacity(state.documents.len());
                for doc in &state.documents {
                    let key = index_key(doc, &spec.keys);
                    if seen.iter().any(|other| other.loosely_equals(&key)) {
                        return Err(DbError::DuplicateKey(format!(
                            "E11000 duplicate key error collection: {} index: {} dup key: {}",
                            namespace, spec.name, key
                        )));
                    }
                    seen.push(key);
                }
            }

            trace!(%namespace, index = %spec.name, "index created");
            state.indexes.push(spec);
            Ok(())
        })?;

        Ok(name)
    }

    async fn insert_one(&self, doc: Document, _options: Document) -> Result<InsertOneResult> {
        let namespace = self.namespace();
        let inserted_id = self.write(|state| Self::insert(state, doc, &namespace))?;
        Ok(InsertOneResult { inserted_id })
    }

    /// Ordered: stops at the first failure, keeping what was inserted before
    async fn insert_many(
        &self,
        docs: Vec<Document>,
        _options: Document,
    ) -> Result<InsertManyResult> {
        if docs.is_empty() {
            return Err(DbError::WriteError("Invalid BulkOperation, Batch cannot be empty".into()));
        }

        let namespace = self.namespace();
        self.write(|state| {
            let mut inserted_ids = Vec::with_capacity(docs.len());
            for doc in docs {
                inserted_ids.push(Self::insert(state, doc, &namespace)?);
            }
            Ok(InsertManyResult { inserted_ids })
        })
    }

    async fn delete_one(&self, filter: Document, _options: Document) -> Result<DeleteResult> {
        self.delete(&filter, false)
    }

    async fn delete_many(&self, filter: Document, _options: Document) -> Result<DeleteResult> {
        self.delete(&filter, true)
    }

    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        options: Document,
    ) -> Result<UpdateResult> {
        validate_update(&update)?;
        self.modify(&filter, &options, false, |doc, inserting| {
            apply_update(doc, &update, inserting)
        })
    }

    async fn update_many(
        &self,
        filter: Document,
        update: Document,
        options: Document,
    ) -> Result<UpdateResult> {
        validate_update(&update)?;
        self.modify(&filter, &options, true, |doc, inserting| {
            apply_update(doc, &update, inserting)
        })
    }

    async fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
        options: Document,
    ) -> Result<UpdateResult> {
        validate_replacement(&replacement)?;
        self.modify(&filter, &options, false, |doc, _| {
            *doc = replaced(doc, &replacement)?;
            Ok(())
        })
    }

    /// Honours `limit` and `skip`
    async fn count_documents(&self, filter: Document, options: Document) -> Result<u64> {
        if let Some(op) = COUNT_REJECTED_OPERATORS
            .iter()
            .find(|op| has_nested_keys(&filter, &[**op]))
        {
            return Err(DbError::InvalidQuery(format!(
                "{} is not allowed in this context",
                op
            )));
        }

        let matching = self.select(&filter, options.get("hint"))?.len() as u64;
        let skip = options
            .get("skip")
            .and_then(|skip| skip.as_integer())
            .map_or(0, |skip| skip.max(0) as u64);
        let counted = matching.saturating_sub(skip);

        Ok(match options.get("limit").and_then(|limit| limit.as_integer()) {
            Some(limit) if limit != 0 => counted.min(limit.unsigned_abs()),
            _ => counted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::MemoryDriver;
    use super::*;
    use crate::driver::Driver;
    use std::sync::Arc;

    async fn trees() -> Arc<dyn CollectionHandle> {
        let client = MemoryDriver::new()
            .connect("mongodb://localhost/forest", Document::new())
            .await
            .unwrap();
        client.db("forest").collection("trees", Document::new()).unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_object_ids() {
        let trees = trees().await;
        let result = trees.insert_one(doc! { "kind": "spruce" }, Document::new()).await.unwrap();
        assert!(matches!(result.inserted_id, Bson::ObjectId(_)));

        let stored = trees.find_one(doc! {}, Document::new()).await.unwrap().unwrap();
        assert_eq!(stored.keys().next().map(String::as_str), Some("_id"));
    }

    #[tokio::test]
    async fn test_duplicate_id_and_ordered_insert_many() {
        let trees = trees().await;
        let err = trees
            .insert_many(
                vec![doc! { "_id": 1 }, doc! { "_id": 2 }, doc! { "_id": 1 }, doc! { "_id": 3 }],
                Document::new(),
            )
            .await
            .err();
        assert!(matches!(err, Some(DbError::DuplicateKey(_))));
        assert_eq!(trees.count_documents(doc! {}, Document::new()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_requires_operators_and_replace_forbids_them() {
        let trees = trees().await;
        trees.insert_one(doc! { "_id": 1, "kind": "pine" }, Document::new()).await.unwrap();

        let err = trees
            .update_one(doc! { "_id": 1 }, doc! { "kind": "oak" }, Document::new())
            .await
            .err();
        assert!(matches!(err, Some(DbError::InvalidUpdate(_))));

        let err = trees
            .replace_one(doc! { "_id": 1 }, doc! { "$set": { "kind": "oak" } }, Document::new())
            .await
            .err();
        assert!(matches!(err, Some(DbError::InvalidUpdate(_))));

        let result = trees
            .replace_one(doc! { "_id": 1 }, doc! { "kind": "oak" }, Document::new())
            .await
            .unwrap();
        assert_eq!((result.matched_count, result.modified_count), (1, 1));
        assert_eq!(
            trees.find_one(doc! { "_id": 1 }, Document::new()).await.unwrap(),
            Some(doc! { "_id": 1, "kind": "oak" })
        );
    }

    #[tokio::test]
    async fn test_update_many_and_upsert() {
        let trees = trees().await;
        trees
            .insert_many(
                vec![doc! { "kind": "pine" }, doc! { "kind": "pine" }, doc! { "kind": "fir" }],
                Document::new(),
            )
            .await
            .unwrap();

        let result = trees
            .update_many(doc! { "kind": "pine" }, doc! { "$set": { "tall": true } }, Document::new())
            .await
            .unwrap();
        assert_eq!((result.matched_count, result.modified_count), (2, 2));

        let unchanged = trees
            .update_many(doc! { "kind": "pine" }, doc! { "$set": { "tall": true } }, Document::new())
            .await
            .unwrap();
        assert_eq!((unchanged.matched_count, unchanged.modified_count), (2, 0));

        let upserted = trees
            .update_one(
                doc! { "kind": "larch" },
                doc! { "$set": { "tall": false } },
                doc! { "upsert": true },
            )
            .await
            .unwrap();
        assert!(upserted.upserted_id.is_some());
        assert_eq!(
            trees.count_documents(doc! { "kind": "larch", "tall": false }, Document::new()).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_count_documents_refuses_geo_predicates() {
        let trees = trees().await;
        let err = trees
            .count_documents(doc! { "$and": [ { "loc": { "$near": [0, 0] } } ] }, Document::new())
            .await
            .err();
        assert!(matches!(err, Some(DbError::InvalidQuery(_))));

        let mut nearby = trees.find(doc! { "loc": { "$near": [0, 0] } });
        assert_eq!(nearby.to_array().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_count_documents_limit_and_skip() {
        let trees = trees().await;
        trees
            .insert_many((0..5).map(|n| doc! { "n": n }).collect(), Document::new())
            .await
            .unwrap();

        assert_eq!(trees.count_documents(doc! {}, doc! { "limit": 2 }).await.unwrap(), 2);
        assert_eq!(trees.count_documents(doc! {}, doc! { "skip": 4 }).await.unwrap(), 1);
        assert_eq!(trees.count_documents(doc! { "n": { "$gte": 3 } }, Document::new()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_indexes_and_hints() {
        let trees = trees().await;
        let name = trees
            .create_index(doc! { "kind": 1, "height": -1 }, doc! { "unique": true })
            .await
            .unwrap();
        assert_eq!(name, "kind_1_height_-1");

        trees.insert_one(doc! { "kind": "pine", "height": 3 }, Document::new()).await.unwrap();
        let err = trees.insert_one(doc! { "kind": "pine", "height": 3 }, Document::new()).await.err();
        assert!(matches!(err, Some(DbError::DuplicateKey(_))));

        let mut hinted = trees.find(doc! {});
        hinted.hint(Bson::String("kind_1_height_-1".into()));
        assert_eq!(hinted.to_array().await.unwrap().len(), 1);

        let mut unknown = trees.find(doc! {});
        unknown.hint(Bson::String("nope".into()));
        assert!(unknown.to_array().await.is_err());
    }

    #[tokio::test]
    async fn test_delete_one_and_many() {
        let trees = trees().await;
        trees
            .insert_many(vec![doc! { "kind": "pine" }, doc! { "kind": "pine" }, doc! { "kind": "fir" }], Document::new())
            .await
            .unwrap();

        assert_eq!(trees.delete_one(doc! { "kind": "pine" }, Document::new()).await.unwrap().deleted_count, 1);
        assert_eq!(trees.delete_many(doc! {}, Document::new()).await.unwrap().deleted_count, 2);
    }
}

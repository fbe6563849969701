// ============================================================================
// src/memory/projection.rs - Projection and sorting
// ============================================================================
//
// Projection:
// - inclusion (`{ a: 1 }`), exclusion (`{ a: 0 }`), never both except `_id`
// - `_id` included unless excluded explicitly
// - `"$path"` string values copy a field under a new name
//
// Sorting:
// - multi-key, stable, MongoDB type order (missing fields sort as null)
//
// ============================================================================

use crate::core::document::{get_path, remove_path, set_path};
use crate::core::{DbError, Result, ValueExt};
use bson::{Bson, Document};
use std::cmp::Ordering;

// ============================================================================
// PROJECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProjectionMode {
    Include,
    Exclude,
}

fn mode_of(projection: &Document) -> Result<ProjectionMode> {
    let mut mode = None;

    for (field, value) in projection {
        let field_mode = match value {
            Bson::String(reference) if reference.starts_with('$') => ProjectionMode::Include,
            Bson::Document(_) => {
                return Err(DbError::UnsupportedOperation(format!(
                    "projection operator on '{}' is not supported",
                    field
                )));
            }
            flag if flag.is_truthy() => ProjectionMode::Include,
            _ => ProjectionMode::Exclude,
        };

        if field == "_id" {
            continue;
        }
        match mode {
            None => mode = Some(field_mode),
            Some(current) if current != field_mode => {
                return Err(DbError::InvalidQuery(format!(
                    "Cannot mix inclusion and exclusion in projection at '{}'",
                    field
                )));
            }
            Some(_) => {}
        }
    }

    // `{ _id: 0 }` alone excludes; `{ _id: 1 }` alone keeps only the id
    Ok(mode.unwrap_or_else(|| match projection.get("_id") {
        Some(value) if value.is_truthy() => ProjectionMode::Include,
        _ => ProjectionMode::Exclude,
    }))
}

/// Shape `doc` according to `projection`
pub(crate) fn project(doc: &Document, projection: &Document) -> Result<Document> {
    if projection.is_empty() {
        return Ok(doc.clone());
    }

    let keep_id = projection.get("_id").is_none_or(|value| value.is_truthy());

    match mode_of(projection)? {
        ProjectionMode::Exclude => {
            let mut shaped = doc.clone();
            for (field, _) in projection {
                if field != "_id" || !keep_id {
                    remove_path(&mut shaped, field);
                }
            }
            Ok(shaped)
        }
        ProjectionMode::Include => {
            let mut shaped = Document::new();
            if keep_id {
                if let Some(id) = doc.get("_id") {
                    shaped.insert("_id", id.clone());
                }
            }

            for (field, value) in projection {
                if field == "_id" {
                    continue;
                }
                let source = match value {
                    Bson::String(reference) if reference.starts_with('$') => &reference[1..],
                    _ => field.as_str(),
                };
                if let Some(found) = get_path(doc, source) {
                    set_path(&mut shaped, field, found.clone());
                }
            }
            Ok(shaped)
        }
    }
}

// ============================================================================
// SORT KEY - One field of a sort specification
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SortKey {
    pub path: String,
    pub descending: bool,
}

impl SortKey {
    /// Parse `{ field: 1 | -1, ... }`
    pub fn parse_spec(spec: &Document) -> Result<Vec<SortKey>> {
        spec.iter()
            .map(|(path, direction)| match direction.as_integer() {
                Some(1) => Ok(SortKey {
                    path: path.clone(),
                    descending: false,
                }),
                Some(-1) => Ok(SortKey {
                    path: path.clone(),
                    descending: true,
                }),
                _ => Err(DbError::InvalidQuery(format!(
                    "bad sort specification for '{}': {}",
                    path, direction
                ))),
            })
            .collect()
    }
}

// ============================================================================
// DOCUMENT COMPARATOR
// ============================================================================

pub(crate) struct DocumentComparator<'a> {
    keys: &'a [SortKey],
}

impl<'a> DocumentComparator<'a> {
    pub fn new(keys: &'a [SortKey]) -> Self {
        Self { keys }
    }

    pub fn compare(&self, left: &Document, right: &Document) -> Ordering {
        for key in self.keys {
            let a = get_path(left, &key.path).unwrap_or(&Bson::Null);
            let b = get_path(right, &key.path).unwrap_or(&Bson::Null);

            let ordering = a.compare(b);
            let ordering = if key.descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Stable multi-key sort
pub(crate) fn sort_documents(documents: &mut [Document], spec: &Document) -> Result<()> {
    let keys = SortKey::parse_spec(spec)?;
    if keys.is_empty() {
        return Ok(());
    }

    let comparator = DocumentComparator::new(&keys);
    documents.sort_by(|a, b| comparator.compare(a, b));
    Ok(())
}

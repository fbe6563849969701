//! Update operators: `$set`, `$unset`, `$inc`, `$push`, `$addToSet` and
//! `$setOnInsert`.

use crate::core::document::{OPERATOR_SIGIL, get_path, remove_path, set_path};
use crate::core::{DbError, Result, ValueExt};
use bson::{Bson, Document};

/// Update documents are operators only, and at least one of them
pub(crate) fn validate_update(update: &Document) -> Result<()> {
    if update.is_empty() {
        return Err(DbError::InvalidUpdate("Update document must not be empty".into()));
    }
    if let Some(key) = update.keys().find(|key| !key.starts_with(OPERATOR_SIGIL)) {
        return Err(DbError::InvalidUpdate(format!(
            "Update document requires atomic operators, found '{}'",
            key
        )));
    }
    Ok(())
}

/// Replacements carry no operators at any top-level key
pub(crate) fn validate_replacement(replacement: &Document) -> Result<()> {
    if let Some(key) = replacement.keys().find(|key| key.starts_with(OPERATOR_SIGIL)) {
        return Err(DbError::InvalidUpdate(format!(
            "Replacement document must not contain atomic operators, found '{}'",
            key
        )));
    }
    Ok(())
}

/// Apply `update` to `doc` in place. `inserting` enables `$setOnInsert`.
pub(crate) fn apply_update(doc: &mut Document, update: &Document, inserting: bool) -> Result<()> {
    for (op, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(DbError::InvalidUpdate(format!(
                "Modifiers operate on fields but {} was given a {:?}",
                op,
                fields.element_type()
            )));
        };

        for (path, value) in fields {
            if path == "_id" || path.starts_with("_id.") {
                let unchanged =
                    op == "$set" && get_path(doc, path).is_some_and(|v| v.loosely_equals(value));
                if !inserting && !unchanged && op != "$setOnInsert" {
                    return Err(DbError::InvalidUpdate(format!(
                        "Performing an update on the path '{}' would modify the immutable field '_id'",
                        path
                    )));
                }
            }

            match op.as_str() {
                "$set" => assign(doc, path, value.clone())?,
                "$setOnInsert" => {
                    if inserting {
                        assign(doc, path, value.clone())?;
                    }
                }
                "$unset" => {
                    remove_path(doc, path);
                }
                "$inc" => increment(doc, path, value)?,
                "$push" => append(doc, path, value, false)?,
                "$addToSet" => append(doc, path, value, true)?,
                other => {
                    return Err(DbError::InvalidUpdate(format!("Unknown modifier: {}", other)));
                }
            }
        }
    }
    Ok(())
}

fn assign(doc: &mut Document, path: &str, value: Bson) -> Result<()> {
    if set_path(doc, path, value) {
        Ok(())
    } else {
        Err(DbError::InvalidUpdate(format!(
            "Cannot create field along the path '{}'",
            path
        )))
    }
}

fn increment(doc: &mut Document, path: &str, by: &Bson) -> Result<()> {
    if by.as_number().is_none() {
        return Err(DbError::InvalidUpdate(format!(
            "Cannot increment with non-numeric argument: {{{}: {}}}",
            path, by
        )));
    }

    let next = match get_path(doc, path) {
        None => by.clone(),
        Some(current) => add(current, by).ok_or_else(|| {
            DbError::InvalidUpdate(format!(
                "Cannot apply $inc to a value of non-numeric type at '{}'",
                path
            ))
        })?,
    };
    assign(doc, path, next)
}

fn add(current: &Bson, by: &Bson) -> Option<Bson> {
    Some(match (current, by) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(*a as i64 + *b as i64),
        },
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            Bson::Int64(current.as_integer()?.checked_add(by.as_integer()?)?)
        }
        _ => Bson::Double(current.as_number()? + by.as_number()?),
    })
}

/// `$push` / `$addToSet`, with `{ $each: [...] }` support
fn append(doc: &mut Document, path: &str, value: &Bson, unique: bool) -> Result<()> {
    let items: Vec<Bson> = match value {
        Bson::Document(spec) if spec.contains_key("$each") => match spec.get("$each") {
            Some(Bson::Array(each)) => each.clone(),
            _ => {
                return Err(DbError::InvalidUpdate("$each requires an array".into()));
            }
        },
        single => vec![single.clone()],
    };

    let mut array = match get_path(doc, path) {
        None => Vec::new(),
        Some(Bson::Array(existing)) => existing.clone(),
        Some(_) => {
            return Err(DbError::InvalidUpdate(format!(
                "The field '{}' must be an array",
                path
            )));
        }
    };

    for item in items {
        if unique && array.iter().any(|existing| existing.loosely_equals(&item)) {
            continue;
        }
        array.push(item);
    }

    assign(doc, path, Bson::Array(array))
}

/// Seed document for an upsert: the filter's plain equality fields
pub(crate) fn upsert_seed(filter: &Document) -> Document {
    let mut seed = Document::new();
    for (key, value) in filter {
        if key.starts_with(OPERATOR_SIGIL) {
            continue;
        }
        let is_condition = matches!(value, Bson::Document(inner)
            if inner.keys().next().is_some_and(|k| k.starts_with(OPERATOR_SIGIL)));
        if !is_condition {
            set_path(&mut seed, key, value.clone());
        }
    }
    seed
}

//! Document helpers shared by the adapters and the memory driver.

use super::value::ValueExt;
use bson::{Bson, Document};

/// Prefix that marks update operators and query operators.
pub const OPERATOR_SIGIL: char = '$';

/// Copy of `doc` without the given top-level keys.
pub fn omit(doc: &Document, keys: &[&str]) -> Document {
    doc.iter()
        .filter(|(key, _)| !keys.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// True when `key` is present and truthy.
pub fn flag(doc: &Document, key: &str) -> bool {
    doc.get(key).is_some_and(|value| value.is_truthy())
}

/// True when any top-level key starts with the operator sigil, i.e. the
/// document is a field-level modification rather than a whole replacement.
pub fn is_atomic_update(doc: &Document) -> bool {
    doc.keys().any(|key| key.starts_with(OPERATOR_SIGIL))
}

/// Searches `doc` at every depth (nested documents and arrays of documents)
/// for any of `keys`.
pub fn has_nested_keys(doc: &Document, keys: &[&str]) -> bool {
    doc.iter().any(|(key, value)| keys.contains(&key.as_str()) || value_has_keys(value, keys))
}

fn value_has_keys(value: &Bson, keys: &[&str]) -> bool {
    match value {
        Bson::Document(inner) => has_nested_keys(inner, keys),
        Bson::Array(items) => items.iter().any(|item| value_has_keys(item, keys)),
        _ => false,
    }
}

/// Resolves a dotted path (`"a.b.0.c"`) inside a document.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = doc.get(first)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Sets a dotted path, creating intermediate documents as needed.
///
/// Returns `false` when an intermediate segment exists but is not a document.
pub fn set_path(doc: &mut Document, path: &str, value: Bson) -> bool {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
            true
        }
        Some((head, rest)) => {
            if !doc.contains_key(head) {
                doc.insert(head, Document::new());
            }
            match doc.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => false,
            }
        }
    }
}

/// Removes a dotted path. Returns the removed value, if any.
pub fn remove_path(doc: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => doc.remove(path),
        Some((head, rest)) => match doc.get_mut(head) {
            Some(Bson::Document(inner)) => remove_path(inner, rest),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_omit() {
        let options = doc! { "multi": true, "upsert": false, "w": 1 };
        assert_eq!(omit(&options, &["multi"]), doc! { "upsert": false, "w": 1 });
        assert_eq!(omit(&options, &["missing"]), options);
    }

    #[test]
    fn test_flag() {
        let options = doc! { "single": 1, "multi": false };
        assert!(flag(&options, "single"));
        assert!(!flag(&options, "multi"));
        assert!(!flag(&options, "absent"));
    }

    #[test]
    fn test_is_atomic_update() {
        assert!(is_atomic_update(&doc! { "$set": { "x": 1 } }));
        assert!(is_atomic_update(&doc! { "y": 2, "$inc": { "x": 1 } }));
        assert!(!is_atomic_update(&doc! { "x": 1 }));
        assert!(!is_atomic_update(&doc! {}));
    }

    #[test]
    fn test_has_nested_keys_descends_into_arrays() {
        let keys = ["$where", "$near", "$nearSphere"];

        assert!(has_nested_keys(&doc! { "$where": "this.a > 1" }, &keys));
        assert!(has_nested_keys(&doc! { "loc": { "$near": [0, 0] } }, &keys));
        assert!(has_nested_keys(
            &doc! { "$and": [ { "a": 1 }, { "loc": { "$nearSphere": [0, 0] } } ] },
            &keys
        ));
        assert!(!has_nested_keys(&doc! { "a": { "$gt": 1 }, "b": [1, 2, 3] }, &keys));
    }

    #[test]
    fn test_paths() {
        let mut doc = doc! { "a": { "b": [ { "c": 1 } ] } };
        assert_eq!(get_path(&doc, "a.b.0.c"), Some(&Bson::Int32(1)));
        assert_eq!(get_path(&doc, "a.x"), None);

        assert!(set_path(&mut doc, "a.d.e", Bson::Int32(5)));
        assert_eq!(get_path(&doc, "a.d.e"), Some(&Bson::Int32(5)));
        assert!(!set_path(&mut doc, "a.b.c", Bson::Int32(1)));

        assert_eq!(remove_path(&mut doc, "a.d.e"), Some(Bson::Int32(5)));
        assert_eq!(remove_path(&mut doc, "a.d.e"), None);
    }
}

// ============================================================================
// src/memory/matcher.rs - Query filter evaluation
// ============================================================================
//
// Evaluates a query filter against one document.
//
// Supported:
// - implicit equality, with array fields matching any element
// - $eq $ne $gt $gte $lt $lte $in $nin $exists $size
// - $regex (+ $options) and BSON regular expression literals
// - $not, and the logical $and / $or / $nor
// - $near / $nearSphere (see geo.rs)
//
// $where is recognised and refused.
//
// ============================================================================

use super::geo;
use crate::core::document::OPERATOR_SIGIL;
use crate::core::{DbError, Result, ValueExt};
use bson::{Bson, Document};
use lru::LruCache;
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const REGEX_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(200) {
    Some(size) => size,
    None => NonZeroUsize::MIN,
};

lazy_static::lazy_static! {
    static ref REGEX_LRU_CACHE: Arc<Mutex<LruCache<String, Arc<Regex>>>> =
        Arc::new(Mutex::new(LruCache::new(REGEX_CACHE_SIZE)));
}

/// Does `doc` satisfy `filter`?
pub(crate) fn matches(doc: &Document, filter: &Document) -> Result<bool> {
    for (key, condition) in filter {
        let satisfied = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_clause(doc, key, condition)?,
            "$nor" => !any_clause(doc, key, condition)?,
            "$comment" => true,
            "$where" => {
                return Err(DbError::UnsupportedOperation(
                    "$where is not supported by the in-memory driver".into(),
                ));
            }
            op if op.starts_with(OPERATOR_SIGIL) => {
                return Err(DbError::InvalidQuery(format!("unknown top level operator: {}", op)));
            }
            path => match_path(doc, path, condition)?,
        };

        if !satisfied {
            return Ok(false);
        }
    }

    Ok(true)
}

fn any_clause(doc: &Document, op: &str, condition: &Bson) -> Result<bool> {
    for clause in clauses(op, condition)? {
        if matches(doc, clause)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn clauses<'a>(op: &str, condition: &'a Bson) -> Result<Vec<&'a Document>> {
    let Bson::Array(items) = condition else {
        return Err(DbError::InvalidQuery(format!("{} must be an array", op)));
    };
    if items.is_empty() {
        return Err(DbError::InvalidQuery(format!(
            "{} must be a nonempty array",
            op
        )));
    }

    items
        .iter()
        .map(|item| match item {
            Bson::Document(clause) => Ok(clause),
            _ => Err(DbError::InvalidQuery(format!(
                "{} argument's entries must be objects",
                op
            ))),
        })
        .collect()
}

/// Every value reachable through `path`, descending into arrays of
/// subdocuments for non-numeric segments.
pub(crate) fn resolve<'a>(doc: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut found = Vec::new();
    if let Some((first, rest)) = segments.split_first() {
        if let Some(value) = doc.get(*first) {
            collect(value, rest, &mut found);
        }
    }
    found
}

fn collect<'a>(value: &'a Bson, segments: &[&str], found: &mut Vec<&'a Bson>) {
    let Some((segment, rest)) = segments.split_first() else {
        found.push(value);
        return;
    };

    match value {
        Bson::Document(inner) => {
            if let Some(next) = inner.get(*segment) {
                collect(next, rest, found);
            }
        }
        Bson::Array(items) => match segment.parse::<usize>() {
            Ok(index) => {
                if let Some(next) = items.get(index) {
                    collect(next, rest, found);
                }
            }
            Err(_) => {
                for item in items {
                    if let Bson::Document(_) = item {
                        collect(item, segments, found);
                    }
                }
            }
        },
        _ => {}
    }
}

fn is_operator_document(condition: &Document) -> bool {
    condition
        .keys()
        .next()
        .is_some_and(|key| key.starts_with(OPERATOR_SIGIL))
}

fn match_path(doc: &Document, path: &str, condition: &Bson) -> Result<bool> {
    let candidates = resolve(doc, path);

    match condition {
        Bson::Document(operators) if is_operator_document(operators) => {
            for (op, argument) in operators {
                if !apply_operator(&candidates, op, argument, operators)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Bson::RegularExpression(regex) => {
            let compiled = compile(&regex.pattern, &regex.options)?;
            Ok(any_string_matches(&candidates, &compiled))
        }
        expected => Ok(equals(&candidates, expected)),
    }
}

/// Equality with MongoDB's array semantics: an array field equals a scalar
/// when any element does, and a missing field equals `null`.
fn equals(candidates: &[&Bson], expected: &Bson) -> bool {
    if candidates.is_empty() {
        return matches!(expected, Bson::Null);
    }

    candidates.iter().any(|value| {
        value.loosely_equals(expected)
            || match value {
                Bson::Array(items) => items.iter().any(|item| item.loosely_equals(expected)),
                _ => false,
            }
    })
}

/// Candidates flattened one level, for range and membership operators.
fn flattened<'a>(candidates: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut values = Vec::with_capacity(candidates.len());
    for value in candidates.iter().copied() {
        match value {
            Bson::Array(items) => {
                values.push(value);
                values.extend(items.iter());
            }
            _ => values.push(value),
        }
    }
    values
}

fn compare_any(candidates: &[&Bson], bound: &Bson, accept: fn(Ordering) -> bool) -> bool {
    flattened(candidates)
        .into_iter()
        .filter(|value| value.type_rank() == bound.type_rank())
        .any(|value| accept(value.compare(bound)))
}

fn in_list(candidates: &[&Bson], op: &str, argument: &Bson) -> Result<bool> {
    let Bson::Array(options) = argument else {
        return Err(DbError::InvalidQuery(format!("{} needs an array", op)));
    };

    for option in options {
        let hit = match option {
            Bson::RegularExpression(regex) => {
                any_string_matches(candidates, &*compile(&regex.pattern, &regex.options)?)
            }
            expected => equals(candidates, expected),
        };
        if hit {
            return Ok(true);
        }
    }
    Ok(false)
}

fn apply_operator(
    candidates: &[&Bson],
    op: &str,
    argument: &Bson,
    siblings: &Document,
) -> Result<bool> {
    match op {
        "$eq" => Ok(equals(candidates, argument)),
        "$ne" => Ok(!equals(candidates, argument)),
        "$gt" => Ok(compare_any(candidates, argument, Ordering::is_gt)),
        "$gte" => Ok(compare_any(candidates, argument, Ordering::is_ge)),
        "$lt" => Ok(compare_any(candidates, argument, Ordering::is_lt)),
        "$lte" => Ok(compare_any(candidates, argument, Ordering::is_le)),
        "$in" => in_list(candidates, op, argument),
        "$nin" => in_list(candidates, op, argument).map(|hit| !hit),
        "$exists" => Ok(!candidates.is_empty() == argument.is_truthy()),
        "$size" => {
            let expected = argument
                .as_integer()
                .ok_or_else(|| DbError::InvalidQuery("$size needs a number".into()))?;
            Ok(candidates.iter().any(|value| match value {
                Bson::Array(items) => items.len() as i64 == expected,
                _ => false,
            }))
        }
        "$regex" => {
            let options = match siblings.get("$options") {
                Some(Bson::String(options)) => options.as_str(),
                _ => "",
            };
            let compiled = match argument {
                Bson::String(pattern) => compile(pattern, options)?,
                Bson::RegularExpression(regex) => {
                    let options = if options.is_empty() { &regex.options } else { options };
                    compile(&regex.pattern, options)?
                }
                _ => return Err(DbError::InvalidQuery("$regex has to be a string".into())),
            };
            Ok(any_string_matches(candidates, &compiled))
        }
        "$options" => {
            if siblings.contains_key("$regex") {
                Ok(true)
            } else {
                Err(DbError::InvalidQuery("$options needs a $regex".into()))
            }
        }
        "$not" => {
            let negated = match argument {
                Bson::Document(operators) if is_operator_document(operators) => {
                    let mut all = true;
                    for (inner, inner_argument) in operators {
                        if !apply_operator(candidates, inner, inner_argument, operators)? {
                            all = false;
                            break;
                        }
                    }
                    all
                }
                Bson::RegularExpression(regex) => {
                    any_string_matches(candidates, &*compile(&regex.pattern, &regex.options)?)
                }
                _ => {
                    return Err(DbError::InvalidQuery(
                        "$not needs a regex or a document".into(),
                    ));
                }
            };
            Ok(!negated)
        }
        "$near" => geo::near(candidates, argument, siblings, false),
        "$nearSphere" => geo::near(candidates, argument, siblings, true),
        // consumed by $near / $nearSphere
        "$maxDistance" | "$minDistance" => Ok(true),
        other => Err(DbError::InvalidQuery(format!("unknown operator: {}", other))),
    }
}

fn any_string_matches(candidates: &[&Bson], regex: &Regex) -> bool {
    flattened(candidates).into_iter().any(|value| match value {
        Bson::String(text) | Bson::Symbol(text) => regex.is_match(text),
        _ => false,
    })
}

/// Compile with the MongoDB option letters, through the shared cache
fn compile(pattern: &str, options: &str) -> Result<Arc<Regex>> {
    let key = format!("/{}/{}", pattern, options);

    {
        let mut cache = REGEX_LRU_CACHE.lock()?;
        if let Some(regex) = cache.get(&key) {
            return Ok(Arc::clone(regex));
        }
    }

    let mut builder = RegexBuilder::new(pattern);
    for option in options.chars() {
        match option {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(DbError::InvalidQuery(format!(
                    "invalid flag in regex options: {}",
                    other
                )));
            }
        };
    }
    let regex = Arc::new(builder.build()?);

    REGEX_LRU_CACHE.lock()?.put(key, Arc::clone(&regex));
    Ok(regex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn tree() -> Document {
        doc! {
            "kind": "spruce",
            "height": 12,
            "tags": ["evergreen", "conifer"],
            "leaves": { "shape": "needle", "length": 2.5 },
            "rings": [ { "year": 2001 }, { "year": 2002 } ],
        }
    }

    #[test]
    fn test_implicit_equality() {
        let doc = tree();
        assert!(matches(&doc, &doc! { "kind": "spruce" }).unwrap());
        assert!(matches(&doc, &doc! { "height": 12.0 }).unwrap());
        assert!(matches(&doc, &doc! { "tags": "conifer" }).unwrap());
        assert!(matches(&doc, &doc! { "leaves.shape": "needle" }).unwrap());
        assert!(matches(&doc, &doc! { "rings.year": 2002 }).unwrap());
        assert!(matches(&doc, &doc! { "missing": null }).unwrap());
        assert!(!matches(&doc, &doc! { "kind": "pine" }).unwrap());
    }

    #[test]
    fn test_comparison_operators() {
        let doc = tree();
        assert!(matches(&doc, &doc! { "height": { "$gt": 10, "$lte": 12 } }).unwrap());
        assert!(!matches(&doc, &doc! { "height": { "$lt": 12 } }).unwrap());
        assert!(!matches(&doc, &doc! { "kind": { "$gt": 1 } }).unwrap());
        assert!(matches(&doc, &doc! { "kind": { "$in": ["pine", "spruce"] } }).unwrap());
        assert!(matches(&doc, &doc! { "kind": { "$nin": ["pine"] } }).unwrap());
        assert!(matches(&doc, &doc! { "kind": { "$ne": "pine" } }).unwrap());
        assert!(matches(&doc, &doc! { "tags": { "$size": 2 } }).unwrap());
    }

    #[test]
    fn test_exists() {
        let doc = tree();
        assert!(matches(&doc, &doc! { "leaves.length": { "$exists": true } }).unwrap());
        assert!(matches(&doc, &doc! { "bark": { "$exists": false } }).unwrap());
        assert!(!matches(&doc, &doc! { "bark": { "$exists": 1 } }).unwrap());
    }

    #[test]
    fn test_logical_operators() {
        let doc = tree();
        assert!(matches(&doc, &doc! { "$or": [ { "kind": "pine" }, { "height": 12 } ] }).unwrap());
        assert!(!matches(&doc, &doc! { "$and": [ { "kind": "spruce" }, { "height": 1 } ] }).unwrap());
        assert!(matches(&doc, &doc! { "$nor": [ { "kind": "pine" } ] }).unwrap());
        assert!(matches(&doc, &doc! { "height": { "$not": { "$gt": 20 } } }).unwrap());
        assert!(matches(&doc, &doc! { "$or": [] }).is_err());
    }

    #[test]
    fn test_regex() {
        let doc = tree();
        assert!(matches(&doc, &doc! { "kind": { "$regex": "^SPR", "$options": "i" } }).unwrap());
        assert!(!matches(&doc, &doc! { "kind": { "$regex": "^SPR" } }).unwrap());
        let literal = bson::Regex {
            pattern: "ever".into(),
            options: String::new(),
        };
        assert!(matches(&doc, &doc! { "tags": literal }).unwrap());
        assert!(matches(&doc, &doc! { "kind": { "$regex": "(" } }).is_err());
    }

    #[test]
    fn test_regex_literals_in_lists_and_negation() {
        let doc = tree();
        let spruce_like = bson::Regex {
            pattern: "^sp".into(),
            options: String::new(),
        };
        let pine_like = bson::Regex {
            pattern: "^PI".into(),
            options: "i".into(),
        };

        assert!(matches(&doc, &doc! { "kind": { "$in": [spruce_like.clone(), "oak"] } }).unwrap());
        assert!(!matches(&doc, &doc! { "kind": { "$nin": [spruce_like] } }).unwrap());
        assert!(matches(&doc, &doc! { "kind": { "$not": pine_like.clone() } }).unwrap());
        assert!(!matches(&doc, &doc! { "kind": { "$in": [pine_like] } }).unwrap());
    }

    #[test]
    fn test_where_and_unknown_operators() {
        let doc = tree();
        assert!(matches!(
            matches(&doc, &doc! { "$where": "this.height > 1" }),
            Err(DbError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            matches(&doc, &doc! { "height": { "$between": [1, 2] } }),
            Err(DbError::InvalidQuery(_))
        ));
    }
}

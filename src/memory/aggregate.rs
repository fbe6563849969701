//! Aggregation stages: `$match`, `$project`, `$sort`, `$skip`, `$limit`,
//! `$count` and `$group`.

use super::matcher;
use super::projection::{project, sort_documents};
use crate::core::document::{get_path, has_nested_keys};
use crate::core::{DbError, Result, ValueExt};
use bson::{Bson, Document};
use std::cmp::Ordering;

/// Predicates `$match` refuses, like the server does
const MATCH_INCOMPATIBLE_OPERATORS: &[&str] = &["$where", "$near", "$nearSphere"];

pub(crate) fn run(mut documents: Vec<Document>, pipeline: &[Document]) -> Result<Vec<Document>> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (Some((name, argument)), None) = (entries.next(), entries.next()) else {
            return Err(DbError::InvalidQuery(
                "A pipeline stage specification object must contain exactly one field".into(),
            ));
        };

        documents = match name.as_str() {
            "$match" => {
                let filter = as_document(name, argument)?;
                if let Some(op) = MATCH_INCOMPATIBLE_OPERATORS
                    .iter()
                    .copied()
                    .find(|op| has_nested_keys(filter, &[*op]))
                {
                    return Err(DbError::InvalidQuery(format!(
                        "{} is not allowed inside of a $match aggregation expression",
                        op
                    )));
                }
                let mut kept = Vec::with_capacity(documents.len());
                for doc in documents {
                    if matcher::matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$project" => {
                let projection = as_document(name, argument)?;
                documents
                    .iter()
                    .map(|doc| project(doc, projection))
                    .collect::<Result<Vec<_>>>()?
            }
            "$sort" => {
                sort_documents(&mut documents, as_document(name, argument)?)?;
                documents
            }
            "$skip" => {
                let skip = as_count(name, argument)?;
                documents.into_iter().skip(skip).collect()
            }
            "$limit" => {
                let limit = as_count(name, argument)?;
                if limit == 0 {
                    return Err(DbError::InvalidQuery("the limit must be positive".into()));
                }
                documents.truncate(limit);
                documents
            }
            "$count" => {
                let Bson::String(field) = argument else {
                    return Err(DbError::InvalidQuery("$count requires a field name".into()));
                };
                if field.is_empty() || field.starts_with('$') || field.contains('.') {
                    return Err(DbError::InvalidQuery(format!("invalid $count field '{}'", field)));
                }
                if documents.is_empty() {
                    Vec::new()
                } else {
                    let mut counted = Document::new();
                    counted.insert(field.clone(), narrow(documents.len() as i64));
                    vec![counted]
                }
            }
            "$group" => group(&documents, as_document(name, argument)?)?,
            other => {
                return Err(DbError::UnsupportedOperation(format!(
                    "Unrecognized pipeline stage name: '{}'",
                    other
                )));
            }
        };
    }

    Ok(documents)
}

fn as_document<'a>(stage: &str, argument: &'a Bson) -> Result<&'a Document> {
    match argument {
        Bson::Document(doc) => Ok(doc),
        _ => Err(DbError::InvalidQuery(format!("{} requires an object", stage))),
    }
}

fn as_count(stage: &str, argument: &Bson) -> Result<usize> {
    argument
        .as_integer()
        .filter(|n| *n >= 0)
        .map(|n| n as usize)
        .ok_or_else(|| DbError::InvalidQuery(format!("{} requires a non-negative integer", stage)))
}

/// Int32 when it fits, the way the server reports small counts
fn narrow(n: i64) -> Bson {
    i32::try_from(n).map(Bson::Int32).unwrap_or(Bson::Int64(n))
}

/// `"$path"` reads a field, documents evaluate member-wise, anything else is
/// a literal
fn evaluate(doc: &Document, expression: &Bson) -> Bson {
    match expression {
        Bson::String(reference) if reference.starts_with('$') => get_path(doc, &reference[1..])
            .cloned()
            .unwrap_or(Bson::Null),
        Bson::Document(members) => Bson::Document(
            members
                .iter()
                .map(|(key, value)| (key.clone(), evaluate(doc, value)))
                .collect(),
        ),
        literal => literal.clone(),
    }
}

// ============================================================================
// $group
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccumulatorKind {
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
    Push,
}

impl AccumulatorKind {
    fn parse(name: &str) -> Result<Self> {
        Ok(match name {
            "$sum" => Self::Sum,
            "$avg" => Self::Avg,
            "$min" => Self::Min,
            "$max" => Self::Max,
            "$first" => Self::First,
            "$last" => Self::Last,
            "$push" => Self::Push,
            other => {
                return Err(DbError::UnsupportedOperation(format!(
                    "unknown group operator '{}'",
                    other
                )));
            }
        })
    }
}

#[derive(Debug, Clone)]
struct Accumulator {
    kind: AccumulatorKind,
    expression: Bson,
    integral: bool,
    total: f64,
    seen: usize,
    value: Option<Bson>,
    pushed: Vec<Bson>,
}

impl Accumulator {
    fn new(kind: AccumulatorKind, expression: Bson) -> Self {
        Self {
            kind,
            expression,
            integral: true,
            total: 0.0,
            seen: 0,
            value: None,
            pushed: Vec::new(),
        }
    }

    fn feed(&mut self, doc: &Document) {
        let value = evaluate(doc, &self.expression);
        match self.kind {
            AccumulatorKind::Sum | AccumulatorKind::Avg => {
                if let Some(n) = value.as_number() {
                    self.integral &= matches!(value, Bson::Int32(_) | Bson::Int64(_));
                    self.total += n;
                    self.seen += 1;
                }
            }
            AccumulatorKind::Min | AccumulatorKind::Max => {
                if matches!(value, Bson::Null | Bson::Undefined) {
                    return;
                }
                let wanted = if self.kind == AccumulatorKind::Min {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                let replace = self
                    .value
                    .as_ref()
                    .is_none_or(|current| value.compare(current) == wanted);
                if replace {
                    self.value = Some(value);
                }
            }
            AccumulatorKind::First => {
                if self.value.is_none() {
                    self.value = Some(value);
                }
            }
            AccumulatorKind::Last => self.value = Some(value),
            AccumulatorKind::Push => self.pushed.push(value),
        }
    }

    fn finish(self) -> Bson {
        match self.kind {
            AccumulatorKind::Sum if self.integral => narrow(self.total as i64),
            AccumulatorKind::Sum => Bson::Double(self.total),
            AccumulatorKind::Avg if self.seen == 0 => Bson::Null,
            AccumulatorKind::Avg => Bson::Double(self.total / self.seen as f64),
            AccumulatorKind::Push => Bson::Array(self.pushed),
            _ => self.value.unwrap_or(Bson::Null),
        }
    }
}

fn group(documents: &[Document], spec: &Document) -> Result<Vec<Document>> {
    let key_expression = spec
        .get("_id")
        .ok_or_else(|| DbError::InvalidQuery("a group specification must include an _id".into()))?;

    let mut template = Vec::new();
    for (field, accumulator) in spec {
        if field == "_id" {
            continue;
        }
        let Bson::Document(accumulator) = accumulator else {
            return Err(DbError::InvalidQuery(format!(
                "the group field '{}' must be an accumulator object",
                field
            )));
        };
        let mut entries = accumulator.iter();
        let (Some((op, expression)), None) = (entries.next(), entries.next()) else {
            return Err(DbError::InvalidQuery(format!(
                "the group field '{}' must specify one accumulator",
                field
            )));
        };
        template.push((
            field.clone(),
            Accumulator::new(AccumulatorKind::parse(op)?, expression.clone()),
        ));
    }

    // first-seen order of keys
    let mut groups: Vec<(Bson, Vec<(String, Accumulator)>)> = Vec::new();
    for doc in documents {
        let key = evaluate(doc, key_expression);
        let index = match groups.iter().position(|(existing, _)| existing.loosely_equals(&key)) {
            Some(index) => index,
            None => {
                groups.push((key, template.clone()));
                groups.len() - 1
            }
        };
        for (_, accumulator) in groups[index].1.iter_mut() {
            accumulator.feed(doc);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, accumulators)| {
            let mut out = Document::new();
            out.insert("_id", key);
            for (field, accumulator) in accumulators {
                out.insert(field, accumulator.finish());
            }
            out
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn forest() -> Vec<Document> {
        vec![
            doc! { "_id": 1, "kind": "spruce", "height": 10 },
            doc! { "_id": 2, "kind": "pine", "height": 4 },
            doc! { "_id": 3, "kind": "spruce", "height": 6 },
        ]
    }

    #[test]
    fn test_match_sort_limit() {
        let out = run(
            forest(),
            &[
                doc! { "$match": { "kind": "spruce" } },
                doc! { "$sort": { "height": 1 } },
                doc! { "$limit": 1 },
                doc! { "$project": { "height": 1, "_id": 0 } },
            ],
        )
        .unwrap();
        assert_eq!(out, vec![doc! { "height": 6 }]);
    }

    #[test]
    fn test_count() {
        assert_eq!(run(forest(), &[doc! { "$count": "total" }]).unwrap(), vec![doc! { "total": 3 }]);
        assert!(
            run(forest(), &[doc! { "$match": { "kind": "oak" } }, doc! { "$count": "total" }])
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_group_accumulators() {
        let out = run(
            forest(),
            &[doc! { "$group": {
                "_id": "$kind",
                "total": { "$sum": "$height" },
                "trees": { "$sum": 1 },
                "tallest": { "$max": "$height" },
                "mean": { "$avg": "$height" },
                "ids": { "$push": "$_id" },
            } }],
        )
        .unwrap();

        assert_eq!(
            out[0],
            doc! { "_id": "spruce", "total": 16, "trees": 2, "tallest": 10, "mean": 8.0, "ids": [1, 3] }
        );
        assert_eq!(out[1].get("_id"), Some(&Bson::String("pine".into())));
    }

    #[test]
    fn test_geo_predicates_are_refused_in_match() {
        let err = run(forest(), &[doc! { "$match": { "loc": { "$near": [0, 0] } } }]);
        assert!(matches!(err, Err(DbError::InvalidQuery(_))));
    }

    #[test]
    fn test_unknown_stage() {
        let err = run(forest(), &[doc! { "$lookup": {} }]);
        assert!(matches!(err, Err(DbError::UnsupportedOperation(_))));
        assert!(run(forest(), &[doc! { "$skip": 1, "$limit": 1 }]).is_err());
    }
}

use bson::{Bson, Document};
use std::cmp::Ordering;

/// Loose-typing helpers over [`Bson`] values.
///
/// Legacy callers pass option flags as whatever happens to be truthy
/// (`true`, `1`, `"yes"`), and compare numbers without caring whether they
/// are stored as 32-bit, 64-bit or floating point.
pub trait ValueExt {
    /// Truthiness of a loosely typed flag value.
    fn is_truthy(&self) -> bool;

    fn as_number(&self) -> Option<f64>;

    fn as_integer(&self) -> Option<i64>;

    /// Total order used for sorting and range comparisons.
    fn compare(&self, other: &Bson) -> Ordering;

    fn loosely_equals(&self, other: &Bson) -> bool;

    fn type_rank(&self) -> u8;
}

impl ValueExt for Bson {
    fn is_truthy(&self) -> bool {
        match self {
            Bson::Null | Bson::Undefined => false,
            Bson::Boolean(b) => *b,
            Bson::Int32(i) => *i != 0,
            Bson::Int64(i) => *i != 0,
            Bson::Double(f) => *f != 0.0 && !f.is_nan(),
            Bson::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Bson::Int32(i) => Some(*i as f64),
            Bson::Int64(i) => Some(*i as f64),
            Bson::Double(f) => Some(*f),
            _ => None,
        }
    }

    fn as_integer(&self) -> Option<i64> {
        match self {
            Bson::Int32(i) => Some(*i as i64),
            Bson::Int64(i) => Some(*i),
            Bson::Double(f) => {
                if f.is_finite() && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    Some(*f as i64)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn compare(&self, other: &Bson) -> Ordering {
        let (left, right) = (self.type_rank(), other.type_rank());
        if left != right {
            return left.cmp(&right);
        }

        match (self, other) {
            // NaN sorts below every other number
            _ if left == NUMBER_RANK => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => match (a.is_nan(), b.is_nan()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                },
                _ => Ordering::Equal,
            },
            (Bson::String(a), Bson::String(b)) => a.cmp(b),
            (Bson::Symbol(a), Bson::Symbol(b)) => a.cmp(b),
            (Bson::String(a), Bson::Symbol(b)) | (Bson::Symbol(a), Bson::String(b)) => a.cmp(b),
            (Bson::Document(a), Bson::Document(b)) => compare_documents(a, b),
            (Bson::Array(a), Bson::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                a.len().cmp(&b.len())
            }
            (Bson::ObjectId(a), Bson::ObjectId(b)) => a.bytes().cmp(&b.bytes()),
            (Bson::Boolean(a), Bson::Boolean(b)) => a.cmp(b),
            (Bson::DateTime(a), Bson::DateTime(b)) => a.cmp(b),
            (Bson::Timestamp(a), Bson::Timestamp(b)) => {
                (a.time, a.increment).cmp(&(b.time, b.increment))
            }
            (Bson::Binary(a), Bson::Binary(b)) => a.bytes.cmp(&b.bytes),
            _ => Ordering::Equal,
        }
    }

    fn loosely_equals(&self, other: &Bson) -> bool {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a == b,
            _ => match (self, other) {
                (Bson::Document(a), Bson::Document(b)) => {
                    a.len() == b.len()
                        && a.iter()
                            .zip(b.iter())
                            .all(|((ka, va), (kb, vb))| ka == kb && va.loosely_equals(vb))
                }
                (Bson::Array(a), Bson::Array(b)) => {
                    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.loosely_equals(y))
                }
                (Bson::Undefined, Bson::Null) | (Bson::Null, Bson::Undefined) => true,
                _ => self == other,
            },
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Bson::MinKey => 0,
            Bson::Null | Bson::Undefined => 1,
            Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => NUMBER_RANK,
            Bson::String(_) | Bson::Symbol(_) => 3,
            Bson::Document(_) => 4,
            Bson::Array(_) => 5,
            Bson::Binary(_) => 6,
            Bson::ObjectId(_) => 7,
            Bson::Boolean(_) => 8,
            Bson::DateTime(_) => 9,
            Bson::Timestamp(_) => 10,
            Bson::RegularExpression(_) => 11,
            Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => 12,
            Bson::DbPointer(_) => 13,
            Bson::MaxKey => 255,
        }
    }
}

const NUMBER_RANK: u8 = 2;

fn compare_documents(a: &Document, b: &Document) -> Ordering {
    for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
        let by_value = va.compare(vb);
        if by_value != Ordering::Equal {
            return by_value;
        }
        let by_key = ka.cmp(kb);
        if by_key != Ordering::Equal {
            return by_key;
        }
    }
    a.len().cmp(&b.len())
}

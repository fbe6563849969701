//! Proximity predicates.
//!
//! A query point given as GeoJSON (`{ $geometry: { type: "Point", coordinates: [lng, lat] } }`)
//! measures in metres along the Earth's surface. A legacy coordinate pair
//! measures in plane units for `$near` and in radians for `$nearSphere`.

use crate::core::{DbError, Result, ValueExt};
use bson::{Bson, Document};

const EARTH_RADIUS_METERS: f64 = 6_378_100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Point {
    x: f64,
    y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Metric {
    Meters,
    Radians,
    Plane,
}

impl Metric {
    fn distance(self, a: Point, b: Point) -> f64 {
        match self {
            Metric::Plane => ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt(),
            Metric::Radians => haversine(a, b),
            Metric::Meters => haversine(a, b) * EARTH_RADIUS_METERS,
        }
    }
}

/// Central angle between two lng/lat points, in radians
fn haversine(a: Point, b: Point) -> f64 {
    let (lat1, lat2) = (a.y.to_radians(), b.y.to_radians());
    let d_lat = lat2 - lat1;
    let d_lng = (b.x - a.x).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * h.sqrt().min(1.0).asin()
}

/// `[x, y]`, `{ x, y }` style subdocuments, or a GeoJSON point
fn point_of(value: &Bson) -> Option<Point> {
    match value {
        Bson::Array(items) if items.len() >= 2 => Some(Point {
            x: items[0].as_number()?,
            y: items[1].as_number()?,
        }),
        Bson::Document(doc) => {
            if let (Some(Bson::String(kind)), Some(coordinates)) =
                (doc.get("type"), doc.get("coordinates"))
            {
                return if kind == "Point" { point_of(coordinates) } else { None };
            }
            let mut values = doc.values();
            Some(Point {
                x: values.next()?.as_number()?,
                y: values.next()?.as_number()?,
            })
        }
        _ => None,
    }
}

fn bound(source: &Document, key: &str) -> Result<Option<f64>> {
    match source.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_number()
            .filter(|distance| *distance >= 0.0)
            .map(Some)
            .ok_or_else(|| DbError::InvalidQuery(format!("{} must be a non-negative number", key))),
    }
}

/// Evaluate `$near` / `$nearSphere` with `argument` as the operator's value
/// and `siblings` holding any `$maxDistance` / `$minDistance` next to it.
pub(crate) fn near(
    candidates: &[&Bson],
    argument: &Bson,
    siblings: &Document,
    spherical: bool,
) -> Result<bool> {
    let (origin, metric, limits) = match argument {
        Bson::Document(spec) if spec.contains_key("$geometry") => {
            let origin = spec.get("$geometry").and_then(point_of);
            (origin, Metric::Meters, spec)
        }
        other => {
            let metric = if spherical { Metric::Radians } else { Metric::Plane };
            (point_of(other), metric, siblings)
        }
    };

    let origin = origin.ok_or_else(|| {
        DbError::InvalidQuery("$near requires a point as GeoJSON or a coordinate pair".into())
    })?;
    let max = bound(limits, "$maxDistance")?.unwrap_or(f64::INFINITY);
    let min = bound(limits, "$minDistance")?.unwrap_or(0.0);

    Ok(candidates.iter().filter_map(|value| point_of(value)).any(|point| {
        let distance = metric.distance(origin, point);
        distance >= min && distance <= max
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn location(lng: f64, lat: f64) -> Bson {
        Bson::Document(doc! { "type": "Point", "coordinates": [lng, lat] })
    }

    #[test]
    fn test_geojson_distance_in_meters() {
        let here = location(-73.97, 40.77);
        let nearby = location(-73.971, 40.771);
        let query = doc! {
            "$geometry": { "type": "Point", "coordinates": [-73.97, 40.77] },
            "$maxDistance": 500,
        };

        assert!(near(&[&nearby], &Bson::Document(query.clone()), &Document::new(), false).unwrap());

        let far = location(2.35, 48.85);
        assert!(!near(&[&far], &Bson::Document(query), &Document::new(), false).unwrap());
        assert!(near(&[&here], &Bson::Document(doc! { "$geometry": here.clone() }), &Document::new(), true).unwrap());
    }

    #[test]
    fn test_legacy_pair_is_planar() {
        let point = Bson::Array(vec![Bson::Int32(3), Bson::Int32(4)]);
        let origin = Bson::Array(vec![Bson::Int32(0), Bson::Int32(0)]);

        assert!(near(&[&point], &origin, &doc! { "$maxDistance": 5 }, false).unwrap());
        assert!(!near(&[&point], &origin, &doc! { "$maxDistance": 4.9 }, false).unwrap());
        assert!(!near(&[&point], &origin, &doc! { "$minDistance": 6 }, false).unwrap());
    }

    #[test]
    fn test_missing_point_is_an_error() {
        let err = near(&[], &Bson::String("here".into()), &Document::new(), false);
        assert!(matches!(err, Err(DbError::InvalidQuery(_))));
    }
}

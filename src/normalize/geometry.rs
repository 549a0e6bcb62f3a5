//! Polygon recovery from semi-structured upstream documents.
//!
//! The upstream schema never settled on one polygon encoding, so
//! resolution is an ordered probe over candidate field names: the two
//! service-specific fields first, then a list of generic geometry names.
//! Each candidate pairs a field name with a decoder; the first decode
//! yielding at least [`MIN_VERTICES`] vertices wins. When nothing decodes,
//! a hexagon sized by customer impact is synthesized around the record
//! center and tagged [`Provenance::Estimated`].

use serde_json::{Map, Value};

use crate::model::{Polygon, Provenance};

/// Minimum vertex count for an acceptable polygon.
const MIN_VERTICES: usize = 3;

/// Kilometers per degree of latitude (spherical approximation).
const KM_PER_DEGREE: f64 = 111.0;

type Decoder = fn(&Value, f64) -> Option<Vec<(f64, f64)>>;

/// Candidate fields in fixed priority order. Extend by appending —
/// control flow never changes.
fn candidates() -> &'static [(&'static str, Decoder)] {
    &[
        // Service-specific polygon fields
        ("polygonPoints", decode_point_list),
        ("polygonPointsGoogle", decode_point_list),
        // Generic fallbacks seen across outage-map backends
        ("polygon", decode_generic),
        ("polygonCoordinates", decode_generic),
        ("geometry", decode_generic),
        ("coordinates", decode_generic),
        ("shape", decode_generic),
        ("boundaries", decode_generic),
        ("bounds", decode_generic),
        ("area_coordinates", decode_generic),
    ]
}

/// Resolve a polygon for one record.
///
/// Field-derived polygons are tagged [`Provenance::Actual`]; the
/// synthesized fallback hexagon is tagged [`Provenance::Estimated`].
pub fn resolve(
    source: &Map<String, Value>,
    center_lat: f64,
    center_lon: f64,
    customers_affected: u64,
) -> Polygon {
    for (field, decoder) in candidates() {
        if let Some(value) = source.get(*field) {
            if let Some(vertices) = decoder(value, center_lat) {
                if vertices.len() >= MIN_VERTICES {
                    return Polygon {
                        vertices,
                        provenance: Provenance::Actual,
                    };
                }
            }
        }
    }

    estimated_hexagon(center_lat, center_lon, customers_affected)
}

/// Decode a list of points in any of the service encodings: objects with
/// `lat`/`lng`, objects with `lat`/`lon`, or ordered coordinate pairs.
/// Unparseable points are skipped; the candidate stands or falls on the
/// vertices that do decode.
fn decode_point_list(value: &Value, center_lat: f64) -> Option<Vec<(f64, f64)>> {
    let items = value.as_array()?;
    let mut vertices = Vec::with_capacity(items.len());

    for item in items {
        let vertex = match item {
            Value::Object(obj) => {
                let lat = obj.get("lat").and_then(Value::as_f64);
                let lon = obj
                    .get("lng")
                    .or_else(|| obj.get("lon"))
                    .and_then(Value::as_f64);
                lat.zip(lon)
            }
            Value::Array(_) => decode_pair(item, center_lat),
            _ => None,
        };
        if let Some(v) = vertex {
            vertices.push(v);
        }
    }

    Some(vertices)
}

/// Decode the generic fallback shapes: a bare pair list, a GeoJSON-style
/// object with nested `coordinates`, or a container keyed `points`,
/// `vertices`, or `coords`.
fn decode_generic(value: &Value, center_lat: f64) -> Option<Vec<(f64, f64)>> {
    match value {
        Value::Array(_) => decode_pair_list(value, center_lat),
        Value::Object(obj) => {
            if let Some(coords) = obj.get("coordinates") {
                if let Some(vertices) = decode_geojson_ring(coords) {
                    return Some(vertices);
                }
            }
            for key in ["points", "vertices", "coords"] {
                if let Some(points) = obj.get(key) {
                    if let Some(vertices) = decode_pair_list(points, center_lat) {
                        return Some(vertices);
                    }
                }
            }
            None
        }
        _ => None,
    }
}

/// Decode a flat list of 2-element coordinate pairs.
fn decode_pair_list(value: &Value, center_lat: f64) -> Option<Vec<(f64, f64)>> {
    let items = value.as_array()?;
    let vertices: Vec<(f64, f64)> = items
        .iter()
        .filter_map(|p| decode_pair(p, center_lat))
        .collect();
    if vertices.is_empty() {
        None
    } else {
        Some(vertices)
    }
}

/// Decode a GeoJSON-style ring: `coordinates` may be the outer ring
/// directly or nest it one level deep. GeoJSON fixes point order as
/// `[lon, lat]`, so no disambiguation applies here.
fn decode_geojson_ring(coords: &Value) -> Option<Vec<(f64, f64)>> {
    let arr = coords.as_array()?;
    let ring = match arr.first() {
        Some(Value::Array(inner)) if matches!(inner.first(), Some(Value::Array(_))) => {
            arr.first()?.as_array()?
        }
        _ => arr,
    };

    let vertices: Vec<(f64, f64)> = ring
        .iter()
        .filter_map(|p| {
            let pair = p.as_array()?;
            let lon = pair.first()?.as_f64()?;
            let lat = pair.get(1)?.as_f64()?;
            Some((lat, lon))
        })
        .collect();

    if vertices.len() >= MIN_VERTICES {
        Some(vertices)
    } else {
        None
    }
}

/// Disambiguate an ordered coordinate pair into `(lat, lon)`.
///
/// The interpretation whose first value fits [-90, 90] and second fits
/// [-180, 180] wins. When both readings are numerically valid, the one
/// whose latitude lies closer to the record's center latitude is chosen
/// (with ties going to the pair as given) — upstream documents mix both
/// orders and the center is the only reliable anchor.
fn decode_pair(value: &Value, center_lat: f64) -> Option<(f64, f64)> {
    let pair = value.as_array()?;
    if pair.len() < 2 {
        return None;
    }
    let a = pair[0].as_f64()?;
    let b = pair[1].as_f64()?;

    let as_given = a.abs() <= 90.0 && b.abs() <= 180.0;
    let swapped = b.abs() <= 90.0 && a.abs() <= 180.0;

    match (as_given, swapped) {
        (true, false) => Some((a, b)),
        (false, true) => Some((b, a)),
        (true, true) => {
            if (a - center_lat).abs() <= (b - center_lat).abs() {
                Some((a, b))
            } else {
                Some((b, a))
            }
        }
        (false, false) => None,
    }
}

/// Synthesize a regular hexagon around the record center, radius stepped
/// by customer impact, converted to degrees with the spherical
/// approximation (111 km per degree latitude, scaled by cos(lat) for
/// longitude).
fn estimated_hexagon(center_lat: f64, center_lon: f64, customers_affected: u64) -> Polygon {
    let radius_km = if customers_affected >= 100 {
        2.0
    } else if customers_affected >= 50 {
        1.5
    } else if customers_affected >= 10 {
        1.0
    } else {
        0.5
    };

    let lat_offset = radius_km / KM_PER_DEGREE;
    // Clamped so a degenerate polar center cannot divide by ~zero.
    let cos_lat = center_lat.to_radians().cos().abs().max(1e-6);
    let lon_offset = radius_km / (KM_PER_DEGREE * cos_lat);

    let vertices = (0..6)
        .map(|i| {
            let angle = (i as f64 * 60.0).to_radians();
            (
                center_lat + lat_offset * angle.sin(),
                center_lon + lon_offset * angle.cos(),
            )
        })
        .collect();

    Polygon {
        vertices,
        provenance: Provenance::Estimated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source_with(field: &str, value: Value) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert(field.to_string(), value);
        m
    }

    #[test]
    fn test_pair_disambiguation_latlon_given() {
        // First value is an obvious latitude near the center
        let pair = json!([27.95, -82.45]);
        assert_eq!(decode_pair(&pair, 27.96), Some((27.95, -82.45)));
    }

    #[test]
    fn test_pair_disambiguation_lonlat_swapped() {
        // Both readings are in range; the center anchor picks the swap
        let pair = json!([-82.45, 27.95]);
        assert_eq!(decode_pair(&pair, 27.96), Some((27.95, -82.45)));
    }

    #[test]
    fn test_pair_disambiguation_unambiguous_longitude() {
        // 120.0 cannot be a latitude
        let pair = json!([120.0, 45.0]);
        assert_eq!(decode_pair(&pair, 0.0), Some((45.0, 120.0)));
    }

    #[test]
    fn test_pair_out_of_range_rejected() {
        let pair = json!([200.0, 200.0]);
        assert_eq!(decode_pair(&pair, 0.0), None);
    }

    #[test]
    fn test_service_field_named_pairs() {
        let source = source_with(
            "polygonPoints",
            json!([
                {"lat": 27.9, "lng": -82.4},
                {"lat": 27.91, "lng": -82.41},
                {"lat": 27.92, "lng": -82.39}
            ]),
        );
        let poly = resolve(&source, 27.9, -82.4, 0);
        assert_eq!(poly.provenance, Provenance::Actual);
        assert_eq!(poly.vertices.len(), 3);
        assert_eq!(poly.vertices[0], (27.9, -82.4));
    }

    #[test]
    fn test_service_field_lon_alias() {
        let source = source_with(
            "polygonPointsGoogle",
            json!([
                {"lat": 27.9, "lon": -82.4},
                {"lat": 27.91, "lon": -82.41},
                {"lat": 27.92, "lon": -82.39}
            ]),
        );
        let poly = resolve(&source, 27.9, -82.4, 0);
        assert_eq!(poly.provenance, Provenance::Actual);
        assert_eq!(poly.vertices.len(), 3);
    }

    #[test]
    fn test_malformed_point_skipped_not_fatal() {
        // One object missing its longitude must not sink the candidate:
        // the three good points still make a real polygon
        let source = source_with(
            "polygonPoints",
            json!([
                {"lat": 27.9, "lng": -82.4},
                {"lat": 27.91, "lng": -82.41},
                {"lat": 27.93},
                {"lat": 27.92, "lng": -82.39}
            ]),
        );
        let poly = resolve(&source, 27.9, -82.4, 150);
        assert_eq!(poly.provenance, Provenance::Actual);
        assert_eq!(poly.vertices.len(), 3);
        assert_eq!(poly.vertices[2], (27.92, -82.39));
    }

    #[test]
    fn test_two_vertices_rejected_falls_through() {
        // Only 2 valid points in the service field — candidate rejected,
        // synthesis kicks in
        let source = source_with(
            "polygonPoints",
            json!([{"lat": 27.9, "lng": -82.4}, {"lat": 27.91, "lng": -82.41}]),
        );
        let poly = resolve(&source, 27.9, -82.4, 5);
        assert_eq!(poly.provenance, Provenance::Estimated);
    }

    #[test]
    fn test_geojson_nested_ring() {
        let source = source_with(
            "geometry",
            json!({
                "type": "Polygon",
                "coordinates": [[[-82.4, 27.9], [-82.41, 27.91], [-82.39, 27.92]]]
            }),
        );
        let poly = resolve(&source, 27.9, -82.4, 0);
        assert_eq!(poly.provenance, Provenance::Actual);
        // GeoJSON order is [lon, lat] — decoded as (lat, lon)
        assert_eq!(poly.vertices[0], (27.9, -82.4));
    }

    #[test]
    fn test_generic_points_container() {
        let source = source_with(
            "shape",
            json!({"points": [[27.9, -82.4], [27.91, -82.41], [27.92, -82.39]]}),
        );
        let poly = resolve(&source, 27.9, -82.4, 0);
        assert_eq!(poly.provenance, Provenance::Actual);
        assert_eq!(poly.vertices.len(), 3);
    }

    #[test]
    fn test_priority_service_field_wins() {
        let mut source = source_with(
            "polygon",
            json!([[1.0, 1.0], [1.1, 1.1], [1.2, 1.2]]),
        );
        source.insert(
            "polygonPoints".to_string(),
            json!([
                {"lat": 27.9, "lng": -82.4},
                {"lat": 27.91, "lng": -82.41},
                {"lat": 27.92, "lng": -82.39}
            ]),
        );
        let poly = resolve(&source, 27.9, -82.4, 0);
        assert_eq!(poly.vertices[0], (27.9, -82.4));
    }

    #[test]
    fn test_hexagon_synthesis_radius_steps() {
        for (customers, radius_km) in [(150u64, 2.0f64), (60, 1.5), (20, 1.0), (3, 0.5)] {
            let poly = estimated_hexagon(27.96, -82.46, customers);
            assert_eq!(poly.provenance, Provenance::Estimated);
            assert_eq!(poly.vertices.len(), 6);

            // Every vertex sits exactly one radius from the center
            let cos_lat = 27.96f64.to_radians().cos();
            for (lat, lon) in &poly.vertices {
                let dlat_km = (lat - 27.96) * KM_PER_DEGREE;
                let dlon_km = (lon - -82.46) * KM_PER_DEGREE * cos_lat;
                let dist = (dlat_km * dlat_km + dlon_km * dlon_km).sqrt();
                assert!(
                    (dist - radius_km).abs() < 1e-9,
                    "customers={customers}: {dist} vs {radius_km}"
                );
            }
        }
    }

    #[test]
    fn test_hexagon_centroid_near_center() {
        let poly = estimated_hexagon(27.96, -82.46, 150);
        let c = poly.centroid();
        assert!((c.lat - 27.96).abs() < 1e-6);
        assert!((c.lon - -82.46).abs() < 1e-6);
    }

    #[test]
    fn test_empty_source_synthesizes() {
        let poly = resolve(&Map::new(), 27.96, -82.46, 150);
        assert_eq!(poly.provenance, Provenance::Estimated);
        assert_eq!(poly.vertices.len(), 6);
    }
}

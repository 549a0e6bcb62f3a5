//! Raw search response → canonical outage snapshot.
//!
//! Transformation is total over per-record defects: a bad center, a
//! missing status, or an undecodable polygon repairs to a documented
//! default and the batch continues. Only a structurally broken response
//! (no `hits.hits` container) fails the whole transform.

use chrono::Utc;
use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

use crate::error::{EngineError, Result};
use crate::model::{
    Location, OutageRecord, OutageSnapshot, OutageSummary, SourceMetadata, TilesMetadata,
};
use crate::normalize::geometry;

/// Reported data source name in snapshot summaries.
const DATA_SOURCE: &str = "TECO Energy Outage Map";

/// Transform a raw tiles response into a snapshot.
///
/// `query_time_ms` is the upstream round-trip measured by the caller;
/// it lands in the snapshot's source metadata.
pub fn transform(raw: &Value, query_time_ms: u64) -> Result<OutageSnapshot> {
    let hits = raw
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .ok_or_else(|| EngineError::malformed("missing hits.hits container"))?;

    let mut warnings = Vec::new();
    let mut seen_ids = HashSet::new();
    let mut outages = Vec::with_capacity(hits.len());

    for hit in hits {
        match normalize_hit(hit) {
            Some(record) => {
                if !seen_ids.insert(record.incident_id.clone()) {
                    let w = format!(
                        "duplicate incident id {} dropped from snapshot",
                        record.incident_id
                    );
                    warn!("{w}");
                    warnings.push(w);
                    continue;
                }
                outages.push(record);
            }
            None => {
                let w = "hit with no _source and no document id dropped".to_string();
                warn!("{w}");
                warnings.push(w);
            }
        }
    }

    let local_sum: u64 = outages.iter().map(|o| o.customers_affected).sum();
    let aggregation = raw
        .pointer("/aggregations/customerCountSum/value")
        .and_then(as_count);

    // The upstream aggregation is authoritative for the summary total.
    let total_customers = match aggregation {
        Some(agg) => {
            if agg != local_sum {
                let w = format!(
                    "customer totals diverge: aggregation={agg}, per-record sum={local_sum}; \
                     using aggregation"
                );
                warn!("{w}");
                warnings.push(w);
            }
            agg
        }
        None => local_sum,
    };

    let summary = OutageSummary {
        total_outages: outages.len(),
        total_customers_affected: total_customers,
        last_updated: Utc::now().to_rfc3339(),
        data_source: DATA_SOURCE.to_string(),
    };

    let metadata = SourceMetadata {
        tiles: raw.get("_tiles").map(parse_tiles),
        query_time_ms,
        warnings,
    };

    Ok(OutageSnapshot {
        summary,
        outages,
        metadata,
    })
}

/// Normalize one hit. Returns `None` only when the hit offers no usable
/// identity at all (no `incidentId` and no document `_id`).
fn normalize_hit(hit: &Value) -> Option<OutageRecord> {
    let empty = serde_json::Map::new();
    let source = hit
        .get("_source")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let document_id = hit
        .get("_id")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let document_index = hit
        .get("_index")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    // Incident id falls back to the search-document id; a hit with
    // neither cannot satisfy snapshot uniqueness and is dropped.
    let incident_id = source
        .get("incidentId")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| {
            if document_id.is_empty() {
                None
            } else {
                Some(document_id.clone())
            }
        })?;

    let location = parse_center(source.get("polygonCenter"));
    let customers_affected = source.get("customerCount").and_then(as_count).unwrap_or(0);

    let geometry = geometry::resolve(source, location.lat, location.lon, customers_affected);

    Some(OutageRecord {
        incident_id,
        location,
        customers_affected,
        status: string_or_unknown(source.get("status")),
        reason: string_or_unknown(source.get("reason")),
        last_updated: source
            .get("updateTime")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        estimated_restoration: source
            .get("estimatedTimeOfRestoration")
            .and_then(Value::as_str)
            .map(str::to_string),
        geometry,
        document_id,
        document_index,
        raw_source: source.clone(),
    })
}

/// Center point comes as a 2-element `[longitude, latitude]` array.
/// Anything else repairs to (0, 0) — one bad record must not abort the
/// snapshot.
fn parse_center(value: Option<&Value>) -> Location {
    if let Some(arr) = value.and_then(Value::as_array) {
        if arr.len() >= 2 {
            if let (Some(lon), Some(lat)) = (arr[0].as_f64(), arr[1].as_f64()) {
                return Location { lat, lon };
            }
        }
    }
    Location { lat: 0.0, lon: 0.0 }
}

fn string_or_unknown(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("Unknown")
        .to_string()
}

/// Counts may arrive as integers or floats; negatives clamp to zero.
fn as_count(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().map(|f| f.max(0.0) as u64))
}

fn parse_tiles(tiles: &Value) -> TilesMetadata {
    TilesMetadata {
        requested: tiles.get("requested").and_then(Value::as_u64),
        with_data: tiles.get("withData").and_then(Value::as_u64),
        zoom: tiles.get("zoom").and_then(Value::as_u64),
        index_name: tiles
            .get("indexName")
            .and_then(Value::as_str)
            .map(str::to_string),
        generated: tiles
            .get("generated")
            .and_then(Value::as_str)
            .map(str::to_string),
        performance: tiles.get("performance").cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Provenance;
    use serde_json::json;

    fn tiles_response(hits: Value, aggregation: Option<u64>) -> Value {
        let total = hits_len(&hits);
        let mut resp = json!({
            "hits": { "hits": hits, "total": { "value": total } }
        });
        if let Some(agg) = aggregation {
            resp["aggregations"] = json!({ "customerCountSum": { "value": agg } });
        }
        resp
    }

    fn hits_len(hits: &Value) -> u64 {
        hits.as_array().map(|a| a.len() as u64).unwrap_or(0)
    }

    #[test]
    fn test_structural_failure() {
        let err = transform(&json!({"took": 3}), 0).unwrap_err();
        assert!(matches!(err, EngineError::MalformedResponse(_)));
    }

    #[test]
    fn test_empty_response() {
        let snap = transform(&tiles_response(json!([]), Some(0)), 12).unwrap();
        assert_eq!(snap.summary.total_outages, 0);
        assert_eq!(snap.summary.total_customers_affected, 0);
        assert_eq!(snap.metadata.query_time_ms, 12);
    }

    #[test]
    fn test_full_record() {
        let raw = tiles_response(
            json!([{
                "_id": "doc-1",
                "_index": "outages-2026",
                "_source": {
                    "incidentId": "INC-100",
                    "polygonCenter": [-82.46, 27.96],
                    "customerCount": 150,
                    "status": "Crew Assigned",
                    "reason": "Equipment Failure",
                    "updateTime": "2026-08-29T12:00:00Z",
                    "estimatedTimeOfRestoration": "2026-08-29T15:00:00Z"
                }
            }]),
            Some(150),
        );
        let snap = transform(&raw, 0).unwrap();
        assert_eq!(snap.outages.len(), 1);

        let rec = &snap.outages[0];
        assert_eq!(rec.incident_id, "INC-100");
        // polygonCenter is [lon, lat]
        assert!((rec.location.lat - 27.96).abs() < 1e-9);
        assert!((rec.location.lon - -82.46).abs() < 1e-9);
        assert_eq!(rec.customers_affected, 150);
        assert_eq!(rec.status, "Crew Assigned");
        assert_eq!(
            rec.estimated_restoration.as_deref(),
            Some("2026-08-29T15:00:00Z")
        );
        assert_eq!(rec.document_index, "outages-2026");
        // No polygon fields present → hexagon
        assert_eq!(rec.geometry.provenance, Provenance::Estimated);
        assert_eq!(rec.geometry.vertices.len(), 6);
    }

    #[test]
    fn test_per_record_defaults_never_fail_batch() {
        let raw = tiles_response(
            json!([
                // Malformed center, no scalars at all
                { "_id": "doc-a", "_source": { "incidentId": "INC-1", "polygonCenter": "garbage" } },
                // Completely empty source — identity from _id
                { "_id": "doc-b", "_source": {} },
                // No source at all — identity from _id
                { "_id": "doc-c" }
            ]),
            None,
        );
        let snap = transform(&raw, 0).unwrap();
        assert_eq!(snap.outages.len(), 3);

        let rec = &snap.outages[0];
        assert_eq!(rec.location, Location { lat: 0.0, lon: 0.0 });
        assert_eq!(rec.customers_affected, 0);
        assert_eq!(rec.status, "Unknown");
        assert_eq!(rec.reason, "Unknown");
        assert!(rec.estimated_restoration.is_none());

        assert_eq!(snap.outages[1].incident_id, "doc-b");
        assert_eq!(snap.outages[2].incident_id, "doc-c");
    }

    #[test]
    fn test_unidentifiable_hit_dropped_with_warning() {
        let raw = tiles_response(json!([{ "_score": 1.0 }]), None);
        let snap = transform(&raw, 0).unwrap();
        assert!(snap.outages.is_empty());
        assert_eq!(snap.metadata.warnings.len(), 1);
    }

    #[test]
    fn test_duplicate_incident_ids_dropped() {
        let raw = tiles_response(
            json!([
                { "_id": "a", "_source": { "incidentId": "INC-1", "customerCount": 10 } },
                { "_id": "b", "_source": { "incidentId": "INC-1", "customerCount": 20 } }
            ]),
            None,
        );
        let snap = transform(&raw, 0).unwrap();
        assert_eq!(snap.outages.len(), 1);
        // First occurrence wins
        assert_eq!(snap.outages[0].customers_affected, 10);
        assert!(snap.metadata.warnings[0].contains("duplicate"));
    }

    #[test]
    fn test_aggregation_is_authoritative() {
        let raw = tiles_response(
            json!([{ "_id": "a", "_source": { "incidentId": "INC-1", "customerCount": 10 } }]),
            Some(999),
        );
        let snap = transform(&raw, 0).unwrap();
        assert_eq!(snap.summary.total_customers_affected, 999);
        assert!(snap
            .metadata
            .warnings
            .iter()
            .any(|w| w.contains("diverge")));
    }

    #[test]
    fn test_local_sum_when_no_aggregation() {
        let raw = tiles_response(
            json!([
                { "_id": "a", "_source": { "incidentId": "INC-1", "customerCount": 10 } },
                { "_id": "b", "_source": { "incidentId": "INC-2", "customerCount": 32 } }
            ]),
            None,
        );
        let snap = transform(&raw, 0).unwrap();
        assert_eq!(snap.summary.total_customers_affected, 42);
        assert!(snap.metadata.warnings.is_empty());
    }

    #[test]
    fn test_tiles_metadata_parsed() {
        let mut raw = tiles_response(json!([]), Some(0));
        raw["_tiles"] = json!({
            "requested": 16,
            "withData": 4,
            "zoom": 9,
            "indexName": "outages-2026",
            "generated": "2026-08-29T12:00:00Z",
            "performance": { "totalTimeMs": 38 }
        });
        let snap = transform(&raw, 0).unwrap();
        let tiles = snap.metadata.tiles.unwrap();
        assert_eq!(tiles.requested, Some(16));
        assert_eq!(tiles.with_data, Some(4));
        assert_eq!(tiles.index_name.as_deref(), Some("outages-2026"));
        assert!(tiles.performance.is_some());
    }

    #[test]
    fn test_actual_polygon_attached() {
        let raw = tiles_response(
            json!([{
                "_id": "a",
                "_source": {
                    "incidentId": "INC-1",
                    "polygonCenter": [-82.4, 27.9],
                    "polygonPoints": [
                        {"lat": 27.9, "lng": -82.4},
                        {"lat": 27.91, "lng": -82.41},
                        {"lat": 27.92, "lng": -82.39}
                    ]
                }
            }]),
            None,
        );
        let snap = transform(&raw, 0).unwrap();
        assert_eq!(snap.outages[0].geometry.provenance, Provenance::Actual);
    }

    #[test]
    fn test_raw_source_passthrough() {
        let raw = tiles_response(
            json!([{
                "_id": "a",
                "_source": { "incidentId": "INC-1", "crewCount": 3, "feeder": "FDR-7" }
            }]),
            None,
        );
        let snap = transform(&raw, 0).unwrap();
        let rec = &snap.outages[0];
        assert_eq!(rec.raw_source.get("crewCount"), Some(&json!(3)));
        assert_eq!(rec.raw_source.get("feeder"), Some(&json!("FDR-7")));
    }
}

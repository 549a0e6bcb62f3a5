//! Geo-search query construction for the tiles endpoint.
//!
//! The payload shape (bool/match_all/geo_bounding_box filter, explicit
//! sort, `_source: "*"`) is the upstream search contract. `_source: "*"`
//! is deliberate: geometry resolution probes the full document, so no
//! field projection is applied.

use serde_json::{json, Value};

use crate::model::BoundingBox;

/// Build the tiles query payload for a bounding box and result cap.
///
/// `None` degenerates to the fixed full-service-area box. The sort order
/// (ascending `updateTime`, then `incidentId`) is deterministic so that
/// identical queries produce comparable snapshots.
pub fn build_tiles_query(bbox: Option<BoundingBox>, size: usize) -> Value {
    let bbox = bbox.unwrap_or_else(BoundingBox::service_area);

    json!({
        "size": size,
        "query": {
            "bool": {
                "must": { "match_all": {} },
                "filter": {
                    "geo_bounding_box": {
                        "polygonCenter": {
                            "top_left":     { "lat": bbox.north, "lon": bbox.west },
                            "bottom_right": { "lat": bbox.south, "lon": bbox.east }
                        }
                    }
                }
            }
        },
        "sort": [
            { "updateTime": "asc" },
            { "incidentId": "asc" }
        ],
        "_source": "*"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_service_area_query() {
        let payload = build_tiles_query(None, 10_000);

        assert_eq!(payload["size"], 10_000);
        let tl = &payload["query"]["bool"]["filter"]["geo_bounding_box"]["polygonCenter"]["top_left"];
        assert!((tl["lat"].as_f64().unwrap() - 28.703_433_072_409_43).abs() < 1e-12);
        assert!((tl["lon"].as_f64().unwrap() - -84.701_027_309_765_62).abs() < 1e-12);
        assert_eq!(payload["_source"], "*");
    }

    #[test]
    fn test_bounded_query() {
        let bbox = BoundingBox {
            north: 28.7,
            south: 27.0,
            east: -79.9,
            west: -84.7,
        };
        let payload = build_tiles_query(Some(bbox), 100);

        let gb = &payload["query"]["bool"]["filter"]["geo_bounding_box"]["polygonCenter"];
        assert_eq!(gb["top_left"]["lat"], 28.7);
        assert_eq!(gb["top_left"]["lon"], -84.7);
        assert_eq!(gb["bottom_right"]["lat"], 27.0);
        assert_eq!(gb["bottom_right"]["lon"], -79.9);
    }

    #[test]
    fn test_sort_is_deterministic() {
        let payload = build_tiles_query(None, 5);
        let sort = payload["sort"].as_array().unwrap();
        assert_eq!(sort.len(), 2);
        assert_eq!(sort[0]["updateTime"], "asc");
        assert_eq!(sort[1]["incidentId"], "asc");
    }
}

//! Canonical data model for outage snapshots.
//!
//! Upstream documents are loosely typed; the model keeps the known
//! canonical fields strongly typed and carries the complete raw `_source`
//! map alongside, so GIS consumers can reach unrecognized fields without
//! re-parsing the wire response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::config;

/// A geographic point in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

/// A rectangular lat/lon region used to filter results geographically.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    /// The fixed full-service-area box used when no bbox is supplied.
    pub fn service_area() -> Self {
        Self {
            north: config::DEFAULT_BBOX_NORTH,
            south: config::DEFAULT_BBOX_SOUTH,
            east: config::DEFAULT_BBOX_EAST,
            west: config::DEFAULT_BBOX_WEST,
        }
    }
}

/// Cache key for one query shape. Full-area and bounded queries are
/// distinct keys and never conflate.
///
/// Bounds are stored as raw bit patterns so the key is `Eq + Hash`
/// despite being derived from floats.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    FullServiceArea { size: usize },
    Bounded { bounds_bits: [u64; 4], size: usize },
}

impl QueryKey {
    pub fn full(size: usize) -> Self {
        QueryKey::FullServiceArea { size }
    }

    pub fn bounded(bbox: &BoundingBox, size: usize) -> Self {
        QueryKey::Bounded {
            bounds_bits: [
                bbox.north.to_bits(),
                bbox.south.to_bits(),
                bbox.east.to_bits(),
                bbox.west.to_bits(),
            ],
            size,
        }
    }
}

/// Whether a polygon came verbatim from upstream data or was synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Provenance {
    Actual,
    Estimated,
}

/// An affected-area boundary: ordered `(lat, lon)` vertices, at least 3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<(f64, f64)>,
    pub provenance: Provenance,
}

impl Polygon {
    /// Arithmetic-mean centroid of the vertex ring.
    pub fn centroid(&self) -> Location {
        let n = self.vertices.len().max(1) as f64;
        let (lat_sum, lon_sum) = self
            .vertices
            .iter()
            .fold((0.0, 0.0), |(la, lo), (lat, lon)| (la + lat, lo + lon));
        Location {
            lat: lat_sum / n,
            lon: lon_sum / n,
        }
    }
}

/// One normalized outage entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutageRecord {
    /// Unique incident id within a snapshot.
    pub incident_id: String,
    /// Center coordinate of the affected area.
    pub location: Location,
    /// Customers affected as reported upstream.
    pub customers_affected: u64,
    pub status: String,
    pub reason: String,
    /// Upstream `updateTime`, passed through verbatim.
    pub last_updated: String,
    pub estimated_restoration: Option<String>,
    /// Resolved affected-area boundary.
    pub geometry: Polygon,
    /// Search-document id of the raw hit.
    pub document_id: String,
    /// Search index the hit came from.
    pub document_index: String,
    /// Complete raw `_source` map (opaque passthrough for GIS export).
    pub raw_source: serde_json::Map<String, Value>,
}

/// Summary statistics for one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutageSummary {
    pub total_outages: usize,
    /// Authoritative total from the upstream aggregation when present,
    /// otherwise the local per-record sum.
    pub total_customers_affected: u64,
    /// When this snapshot was assembled (RFC 3339).
    pub last_updated: String,
    pub data_source: String,
}

/// Raw tiles-metadata block for GIS applications (optional upstream).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TilesMetadata {
    pub requested: Option<u64>,
    pub with_data: Option<u64>,
    pub zoom: Option<u64>,
    pub index_name: Option<String>,
    pub generated: Option<String>,
    pub performance: Option<Value>,
}

/// Source metadata attached to a snapshot: tile counts, query timing,
/// and taxonomy warnings recorded during normalization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub tiles: Option<TilesMetadata>,
    pub query_time_ms: u64,
    pub warnings: Vec<String>,
}

/// One complete, internally consistent fetch result. Created atomically
/// by a single successful fetch; read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutageSnapshot {
    pub summary: OutageSummary,
    pub outages: Vec<OutageRecord>,
    pub metadata: SourceMetadata,
}

/// Opaque session token authorizing search requests. Replaced wholesale,
/// never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionCredential {
    pub token: String,
    pub acquired_at: DateTime<Utc>,
}

impl SessionCredential {
    pub fn new(token: String) -> Self {
        Self {
            token,
            acquired_at: Utc::now(),
        }
    }

    /// How long ago this credential was acquired.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.acquired_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Engine health probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub reachable: bool,
    pub credential_present: bool,
}

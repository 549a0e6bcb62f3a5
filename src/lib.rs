// Copyright 2026 Gridwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Gridwatch runtime library — real-time power outage acquisition engine.
//!
//! Retrieves outage records from the upstream geo-indexed search backend,
//! normalizes them into a stable schema, recovers affected-area polygons,
//! and serves the result through a time-boxed cache. The REST layer in
//! [`rest`] is a thin boundary over [`service::OutageDataService`].

pub mod acquisition;
pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod normalize;
pub mod rest;
pub mod service;

pub use error::{EngineError, Result};
pub use model::{BoundingBox, OutageRecord, OutageSnapshot, Polygon, Provenance, QueryKey};
pub use service::OutageDataService;

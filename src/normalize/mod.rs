//! Normalization — raw search hits into the canonical outage schema.

pub mod geometry;
pub mod pipeline;

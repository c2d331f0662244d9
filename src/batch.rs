//! Spatial batching of renderable geometry.
//!
//! Large networks produce thousands of polylines; handing them to a map
//! layer one by one dominates paint cost. Batching here is pure chunking
//! with no knowledge of rendering.

use crate::net::model::{Bounds, Point};

/// Batch size for through-edge polylines.
pub const EDGE_BATCH_SIZE: usize = 200;

/// Internal connectors are far more numerous at high zoom, so they get
/// smaller batches. A tuning choice, not a correctness requirement.
pub const INTERNAL_BATCH_SIZE: usize = 50;

/// Partitions geometries into fixed-size batches, preserving order. A zero
/// batch size is clamped to one. Concatenating the result reproduces the
/// input exactly.
pub fn batch<T: Clone>(geometries: &[T], batch_size: usize) -> Vec<Vec<T>> {
    geometries
        .chunks(batch_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Keeps every geometry with at least one point inside the bounds,
/// inclusive. Deliberately over-inclusive: a polyline crossing the window
/// edge stays visible rather than being clipped away.
pub fn filter_to_bounds(geometries: &[Vec<Point>], bounds: &Bounds) -> Vec<Vec<Point>> {
    geometries
        .iter()
        .filter(|g| g.iter().any(|p| bounds.contains(p)))
        .cloned()
        .collect()
}

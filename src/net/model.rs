//! Typed geometric model for a parsed road network.
//!
//! Every point stored here is in render axis order (latitude-like first,
//! longitude-like second). Data arriving in the simulation's native XY frame
//! crosses into render order through [`Point::from_xy`] and nowhere else.

use serde::{Deserialize, Serialize};

/// A coordinate pair in render axis order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lng: f64,
}

impl Point {
    /// Converts a native simulation pair (x horizontal, y vertical) into
    /// render order. The swap happens here exactly once.
    pub fn from_xy(x: f64, y: f64) -> Self {
        Self { lat: y, lng: x }
    }

    /// A geographic pair is already in render order.
    pub fn from_geo(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// A single directional traffic channel with its own polyline geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lane {
    pub id: String,
    #[serde(rename = "edgeId")]
    pub edge_id: Option<String>,
    pub points: Vec<Point>,
    #[serde(rename = "speed")]
    pub speed_limit: Option<f64>,
    #[serde(rename = "isInternal")]
    pub is_internal: bool,
}

/// Bounding box in the network's source coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    #[serde(rename = "minX")]
    pub min_x: f64,
    #[serde(rename = "minY")]
    pub min_y: f64,
    #[serde(rename = "maxX")]
    pub max_x: f64,
    #[serde(rename = "maxY")]
    pub max_y: f64,
}

impl Bounds {
    /// Inclusive containment check against a render-order point.
    pub fn contains(&self, p: &Point) -> bool {
        p.lng >= self.min_x && p.lng <= self.max_x && p.lat >= self.min_y && p.lat <= self.max_y
    }

    /// Derives a bounding box by reducing over all lane points. Returns
    /// `None` when no lane carries any geometry.
    pub fn from_lanes(lanes: &[Lane]) -> Option<Self> {
        let mut acc: Option<Bounds> = None;
        for p in lanes.iter().flat_map(|l| &l.points) {
            let b = acc.get_or_insert(Bounds {
                min_x: p.lng,
                min_y: p.lat,
                max_x: p.lng,
                max_y: p.lat,
            });
            b.min_x = b.min_x.min(p.lng);
            b.min_y = b.min_y.min(p.lat);
            b.max_x = b.max_x.max(p.lng);
            b.max_y = b.max_y.max(p.lat);
        }
        acc
    }
}

/// An intersection area. Junctions without a polygon are still covered by a
/// [`JunctionPoint`], so junction area is never silently empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Junction {
    pub id: String,
    #[serde(rename = "type")]
    pub junction_type: String,
    pub polygon: Vec<Point>,
}

/// Centre point of a junction, the fallback when no polygon is available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JunctionPoint {
    pub id: String,
    pub position: Point,
}

/// A signal-controlled junction node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    #[serde(rename = "clusterId")]
    pub cluster_id: String,
    pub position: Point,
}

/// The parsed road network. Immutable once built; a reload replaces the whole
/// model rather than mutating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkModel {
    pub lanes: Vec<Lane>,
    pub bounds: Option<Bounds>,
    pub junctions: Vec<Junction>,
    #[serde(rename = "junctionPoints")]
    pub junction_points: Vec<JunctionPoint>,
    pub signals: Vec<Signal>,
}

/// Derives the edge id from a lane id by stripping the trailing `_<index>`
/// suffix when present. Lane ids without a numeric suffix map to themselves.
///
/// This is a naming contract with the network description format, not a
/// heuristic over free-form data.
pub fn derive_edge_id(lane_id: &str) -> String {
    match lane_id.rsplit_once('_') {
        Some((prefix, index))
            if !prefix.is_empty() && !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) =>
        {
            prefix.to_string()
        }
        _ => lane_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_xy_swaps_once() {
        let p = Point::from_xy(10.0, 20.0);
        assert_eq!(p.lat, 20.0);
        assert_eq!(p.lng, 10.0);
    }

    #[test]
    fn test_from_geo_does_not_swap() {
        let p = Point::from_geo(9.01, 38.76);
        assert_eq!(p.lat, 9.01);
        assert_eq!(p.lng, 38.76);
    }

    #[test]
    fn test_derive_edge_id_strips_index() {
        assert_eq!(derive_edge_id("E12_0"), "E12");
        assert_eq!(derive_edge_id(":J3_1"), ":J3");
    }

    #[test]
    fn test_derive_edge_id_without_suffix() {
        assert_eq!(derive_edge_id("E12"), "E12");
        assert_eq!(derive_edge_id("ramp"), "ramp");
    }

    #[test]
    fn test_derive_edge_id_non_numeric_suffix() {
        assert_eq!(derive_edge_id("E12_rev"), "E12_rev");
    }

    #[test]
    fn test_derive_edge_id_idempotent() {
        let once = derive_edge_id("E12_0");
        assert_eq!(derive_edge_id(&once), once);
    }

    #[test]
    fn test_bounds_contains_is_inclusive() {
        let b = Bounds {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 10.0,
            max_y: 5.0,
        };
        assert!(b.contains(&Point::from_xy(0.0, 0.0)));
        assert!(b.contains(&Point::from_xy(10.0, 5.0)));
        assert!(!b.contains(&Point::from_xy(10.1, 5.0)));
    }

    #[test]
    fn test_bounds_from_lanes() {
        let lanes = vec![Lane {
            id: "E1_0".into(),
            edge_id: Some("E1".into()),
            points: vec![Point::from_xy(1.0, 2.0), Point::from_xy(5.0, 8.0)],
            speed_limit: None,
            is_internal: false,
        }];
        let b = Bounds::from_lanes(&lanes).unwrap();
        assert_eq!(b.min_x, 1.0);
        assert_eq!(b.max_x, 5.0);
        assert_eq!(b.min_y, 2.0);
        assert_eq!(b.max_y, 8.0);
    }

    #[test]
    fn test_bounds_from_lanes_empty() {
        assert!(Bounds::from_lanes(&[]).is_none());
    }
}

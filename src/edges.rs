//! Per-edge aggregation of lane geometry.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::net::model::{Lane, Point, derive_edge_id};

/// Free-flow fallback when no lane in a group reports a speed, in the
/// network's native unit (metres per second, roughly urban free flow).
pub const DEFAULT_SPEED_LIMIT: f64 = 13.89;

/// The aggregate of all lanes sharing a derived identifier, represented by
/// one polyline for rendering and classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: String,
    pub points: Vec<Point>,
    pub speed_limit: f64,
}

/// Collapses lanes into per-edge representative polylines.
///
/// Non-internal lanes are grouped by edge id (derived from the lane id when
/// absent). Within a group the lane with the most points is kept as
/// representative, ties resolving to the first encountered; the speed limit
/// is the maximum observed. Groups whose representative has fewer than two
/// points are dropped. Pure: safe to call on every network reload and on
/// every live geometry frame.
pub fn aggregate(lanes: &[Lane]) -> Vec<Edge> {
    struct Group<'a> {
        representative: &'a Lane,
        speed_limit: Option<f64>,
    }

    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Group> = HashMap::new();

    for lane in lanes.iter().filter(|l| !l.is_internal) {
        let edge_id = lane
            .edge_id
            .clone()
            .unwrap_or_else(|| derive_edge_id(&lane.id));

        match groups.entry(edge_id.clone()) {
            Entry::Vacant(slot) => {
                order.push(edge_id);
                slot.insert(Group {
                    representative: lane,
                    speed_limit: lane.speed_limit,
                });
            }
            Entry::Occupied(mut slot) => {
                let group = slot.get_mut();
                if lane.points.len() > group.representative.points.len() {
                    group.representative = lane;
                }
                group.speed_limit = match (group.speed_limit, lane.speed_limit) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
            }
        }
    }

    order
        .into_iter()
        .filter_map(|id| {
            let group = groups.remove(&id)?;
            (group.representative.points.len() >= 2).then(|| Edge {
                id,
                points: group.representative.points.clone(),
                speed_limit: group.speed_limit.unwrap_or(DEFAULT_SPEED_LIMIT),
            })
        })
        .collect()
}

/// Polylines of junction-interior connector lanes, surfaced separately so
/// they can be rendered underneath through-edges. Never merged into an
/// [`Edge`].
pub fn internal_geometries(lanes: &[Lane]) -> Vec<Vec<Point>> {
    lanes
        .iter()
        .filter(|l| l.is_internal)
        .map(|l| l.points.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lane(id: &str, edge_id: Option<&str>, n_points: usize, speed: Option<f64>) -> Lane {
        Lane {
            id: id.into(),
            edge_id: edge_id.map(String::from),
            points: (0..n_points)
                .map(|i| Point::from_xy(i as f64, 0.0))
                .collect(),
            speed_limit: speed,
            is_internal: false,
        }
    }

    #[test]
    fn test_representative_has_most_points() {
        let lanes = vec![
            lane("E1_0", Some("E1"), 2, Some(13.89)),
            lane("E1_1", Some("E1"), 5, Some(13.89)),
            lane("E1_2", Some("E1"), 3, Some(13.89)),
        ];
        let edges = aggregate(&lanes);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].points.len(), 5);
    }

    #[test]
    fn test_ties_resolve_to_first_encountered() {
        let lanes = vec![
            lane("E1_0", Some("E1"), 3, None),
            lane("E1_1", Some("E1"), 3, None),
        ];
        let edges = aggregate(&lanes);
        // Both have three points; the first lane's geometry must win.
        assert_eq!(edges[0].points, lanes[0].points);
    }

    #[test]
    fn test_speed_limit_is_group_maximum() {
        let lanes = vec![
            lane("E1_0", Some("E1"), 2, Some(8.33)),
            lane("E1_1", Some("E1"), 2, Some(13.89)),
        ];
        assert_eq!(aggregate(&lanes)[0].speed_limit, 13.89);
    }

    #[test]
    fn test_speed_limit_defaults_when_unreported() {
        let lanes = vec![lane("E1_0", Some("E1"), 2, None)];
        assert_eq!(aggregate(&lanes)[0].speed_limit, DEFAULT_SPEED_LIMIT);
    }

    #[test]
    fn test_edge_id_falls_back_to_derivation() {
        let lanes = vec![lane("E12_0", None, 2, None)];
        assert_eq!(aggregate(&lanes)[0].id, "E12");
    }

    #[test]
    fn test_degenerate_representatives_are_dropped() {
        let lanes = vec![lane("E1_0", Some("E1"), 1, None)];
        assert!(aggregate(&lanes).is_empty());
    }

    #[test]
    fn test_internal_lanes_never_aggregate() {
        let mut internal = lane(":J1_0_0", Some(":J1_0"), 4, None);
        internal.is_internal = true;
        let lanes = vec![internal, lane("E1_0", Some("E1"), 2, None)];

        let edges = aggregate(&lanes);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].id, "E1");

        let connectors = internal_geometries(&lanes);
        assert_eq!(connectors.len(), 1);
        assert_eq!(connectors[0].len(), 4);
    }

    #[test]
    fn test_output_order_follows_first_encounter() {
        let lanes = vec![
            lane("B_0", Some("B"), 2, None),
            lane("A_0", Some("A"), 2, None),
            lane("B_1", Some("B"), 2, None),
        ];
        let ids: Vec<_> = aggregate(&lanes).into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["B", "A"]);
    }
}

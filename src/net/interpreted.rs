//! Tree-walking parse strategy.
//!
//! Builds a full document tree and extracts geometry structurally. Slower
//! than the streaming strategy on large documents but simpler to reason
//! about, so it is the fallback of record. Its failures are the only ones a
//! caller ever sees.

use roxmltree::Document;

use super::parser::{
    SIGNAL_JUNCTION_TYPE, build_junction, build_junction_point, build_lane, build_signal,
    parse_boundary,
};
use crate::error::ParseError;
use crate::net::model::NetworkModel;

pub(crate) fn parse_document(text: &str) -> Result<NetworkModel, ParseError> {
    let doc = Document::parse(text).map_err(|e| ParseError::Malformed(e.to_string()))?;
    let root = doc.root_element();

    let bounds = root
        .descendants()
        .find(|n| n.has_tag_name("location"))
        .and_then(|loc| loc.attribute("convBoundary"))
        .and_then(parse_boundary);

    let mut lanes = Vec::new();
    for edge in root.descendants().filter(|n| n.has_tag_name("edge")) {
        let edge_id = edge.attribute("id").unwrap_or("");
        let is_internal = edge.attribute("function") == Some("internal");

        for lane_node in edge.descendants().filter(|n| n.has_tag_name("lane")) {
            let (Some(lane_id), Some(shape)) = (lane_node.attribute("id"), lane_node.attribute("shape"))
            else {
                continue;
            };
            let speed = lane_node.attribute("speed").and_then(|s| s.parse::<f64>().ok());
            if let Some(lane) = build_lane(lane_id, edge_id, shape, speed, is_internal) {
                lanes.push(lane);
            }
        }
    }

    if lanes.is_empty() {
        return Err(ParseError::NoGeometry);
    }

    let signals = root
        .descendants()
        .filter(|n| {
            n.has_tag_name("junction") && n.attribute("type") == Some(SIGNAL_JUNCTION_TYPE)
        })
        .filter_map(|j| {
            build_signal(
                j.attribute("id")?,
                j.attribute("tl"),
                j.attribute("x")?,
                j.attribute("y")?,
            )
        })
        .collect();

    let junctions = root
        .descendants()
        .filter(|n| n.has_tag_name("junction"))
        .filter_map(|j| {
            build_junction(
                j.attribute("id")?,
                j.attribute("type").unwrap_or(""),
                j.attribute("shape")?,
            )
        })
        .collect();

    let junction_points = root
        .descendants()
        .filter(|n| n.has_tag_name("junction"))
        .filter_map(|j| {
            build_junction_point(j.attribute("id")?, j.attribute("x")?, j.attribute("y")?)
        })
        .collect();

    Ok(NetworkModel {
        lanes,
        bounds,
        junctions,
        junction_points,
        signals,
    })
}

//! Streaming parse strategy.
//!
//! A single forward pass over the document with no tree allocation, used for
//! documents large enough that building a DOM is the dominant cost. Must
//! produce a model identical to the tree strategy; shared builders in the
//! parser module enforce the filtering rules.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::parser::{
    SIGNAL_JUNCTION_TYPE, build_junction, build_junction_point, build_lane, build_signal,
    parse_boundary,
};
use crate::error::ParseError;
use crate::net::model::{Bounds, Junction, JunctionPoint, Lane, NetworkModel, Signal};

#[derive(Default)]
struct DocumentState {
    lanes: Vec<Lane>,
    bounds: Option<Bounds>,
    junctions: Vec<Junction>,
    junction_points: Vec<JunctionPoint>,
    signals: Vec<Signal>,
    // id and internal flag of the currently open edge element
    edge_scope: Option<(String, bool)>,
}

pub(crate) fn parse_document(text: &str) -> Result<NetworkModel, ParseError> {
    let mut reader = Reader::from_str(text);
    let mut state = DocumentState::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if e.name().as_ref() == b"edge" {
                    state.edge_scope =
                        Some((attr(&e, "id").unwrap_or_default(), is_internal_edge(&e)));
                } else {
                    handle_element(&e, &mut state);
                }
            }
            Ok(Event::Empty(e)) => {
                // An empty edge element carries no lanes and never opens a scope.
                if e.name().as_ref() != b"edge" {
                    handle_element(&e, &mut state);
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"edge" {
                    state.edge_scope = None;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::Malformed(e.to_string())),
            _ => {}
        }
    }

    if state.lanes.is_empty() {
        return Err(ParseError::NoGeometry);
    }

    Ok(NetworkModel {
        lanes: state.lanes,
        bounds: state.bounds,
        junctions: state.junctions,
        junction_points: state.junction_points,
        signals: state.signals,
    })
}

fn handle_element(e: &BytesStart<'_>, state: &mut DocumentState) {
    match e.name().as_ref() {
        b"location" => {
            if state.bounds.is_none() {
                state.bounds = attr(e, "convBoundary").as_deref().and_then(parse_boundary);
            }
        }
        b"lane" => {
            let Some((edge_id, is_internal)) = state.edge_scope.clone() else {
                return;
            };
            let (Some(lane_id), Some(shape)) = (attr(e, "id"), attr(e, "shape")) else {
                return;
            };
            let speed = attr(e, "speed").and_then(|s| s.parse::<f64>().ok());
            if let Some(lane) = build_lane(&lane_id, &edge_id, &shape, speed, is_internal) {
                state.lanes.push(lane);
            }
        }
        b"junction" => {
            let Some(id) = attr(e, "id") else { return };
            let junction_type = attr(e, "type").unwrap_or_default();
            let x = attr(e, "x");
            let y = attr(e, "y");

            if junction_type == SIGNAL_JUNCTION_TYPE {
                if let (Some(x), Some(y)) = (x.as_deref(), y.as_deref()) {
                    if let Some(signal) = build_signal(&id, attr(e, "tl").as_deref(), x, y) {
                        state.signals.push(signal);
                    }
                }
            }

            if let Some(shape) = attr(e, "shape") {
                if let Some(junction) = build_junction(&id, &junction_type, &shape) {
                    state.junctions.push(junction);
                }
            }

            if let (Some(x), Some(y)) = (x.as_deref(), y.as_deref()) {
                if let Some(point) = build_junction_point(&id, x, y) {
                    state.junction_points.push(point);
                }
            }
        }
        _ => {}
    }
}

fn is_internal_edge(e: &BytesStart<'_>) -> bool {
    attr(e, "function").as_deref() == Some("internal")
}

fn attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

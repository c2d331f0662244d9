//! Network document parser.
//!
//! Two interchangeable strategies sit behind one entry point: a streaming
//! pass for large documents and a tree parse as the fallback of record. A
//! streaming failure is absorbed and logged, never surfaced; the caller only
//! learns the result, or the tree strategy's error.

use std::time::Duration;

use tracing::{debug, warn};

use super::geometry;
use super::model::{Bounds, Junction, JunctionPoint, Lane, NetworkModel, Point, Signal, derive_edge_id};
use super::{accelerated, interpreted};
use crate::error::ParseError;

/// Junction type marker for signal-controlled nodes.
pub(crate) const SIGNAL_JUNCTION_TYPE: &str = "traffic_light";

/// Documents below this size parse quickly enough that the streaming
/// strategy is not worth attempting.
const ACCELERATION_THRESHOLD_BYTES: usize = 256 * 1024;

/// Hard ceiling on an offloaded parse attempt.
pub const DEFAULT_PARSE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct NetworkDocumentParser {
    timeout: Duration,
    acceleration: bool,
    acceleration_threshold: usize,
}

impl Default for NetworkDocumentParser {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkDocumentParser {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_PARSE_TIMEOUT,
            acceleration: true,
            acceleration_threshold: ACCELERATION_THRESHOLD_BYTES,
        }
    }

    /// Disables the streaming strategy entirely.
    pub fn without_acceleration(mut self) -> Self {
        self.acceleration = false;
        self
    }

    /// Overrides the document size at which the streaming strategy kicks in.
    pub fn with_acceleration_threshold(mut self, bytes: usize) -> Self {
        self.acceleration_threshold = bytes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Parses a network document into a [`NetworkModel`].
    ///
    /// Fails with [`ParseError`] when the document is empty, malformed, or
    /// contains no usable geometry after filtering.
    pub fn parse(&self, source_text: &str) -> Result<NetworkModel, ParseError> {
        if source_text.trim().is_empty() {
            return Err(ParseError::EmptyDocument);
        }

        if self.acceleration && source_text.len() >= self.acceleration_threshold {
            match accelerated::parse_document(source_text) {
                Ok(model) => {
                    debug!(lanes = model.lanes.len(), "streaming parse succeeded");
                    return Ok(model);
                }
                Err(err) => {
                    warn!(error = %err, "streaming parse failed, falling back to tree parse");
                }
            }
        }

        interpreted::parse_document(source_text)
    }

    /// Parses on the blocking thread pool under the configured timeout.
    ///
    /// When no async runtime is available the parse silently runs in the
    /// caller's context instead. On timeout the attempt is abandoned and the
    /// caller gets [`ParseError::Timeout`]; the orphaned task is aborted.
    pub async fn parse_offloaded(&self, source_text: String) -> Result<NetworkModel, ParseError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return self.parse(&source_text);
        }

        let parser = self.clone();
        let handle = tokio::task::spawn_blocking(move || parser.parse(&source_text));
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(ParseError::Malformed(format!(
                "parse task failed: {join_err}"
            ))),
            Err(_) => {
                abort.abort();
                Err(ParseError::Timeout(self.timeout))
            }
        }
    }
}

/// Parses a `convBoundary`-style comma-separated 4-tuple.
pub(crate) fn parse_boundary(raw: &str) -> Option<Bounds> {
    let parts: Vec<f64> = raw.split(',').filter_map(|s| s.parse().ok()).collect();
    (parts.len() == 4).then(|| Bounds {
        min_x: parts[0],
        min_y: parts[1],
        max_x: parts[2],
        max_y: parts[3],
    })
}

/// Builds a lane from its shape attribute. Lanes reduced below two points
/// are unusable and dropped.
pub(crate) fn build_lane(
    lane_id: &str,
    edge_id: &str,
    shape: &str,
    speed: Option<f64>,
    is_internal: bool,
) -> Option<Lane> {
    let points = geometry::lane_points(shape);
    if points.len() < 2 {
        return None;
    }

    let edge_id = if edge_id.is_empty() {
        derive_edge_id(lane_id)
    } else {
        edge_id.to_string()
    };

    Some(Lane {
        id: lane_id.to_string(),
        edge_id: Some(edge_id),
        points,
        speed_limit: speed,
        is_internal,
    })
}

pub(crate) fn build_signal(id: &str, cluster_id: Option<&str>, x: &str, y: &str) -> Option<Signal> {
    let x = x.parse::<f64>().ok()?;
    let y = y.parse::<f64>().ok()?;
    (x.is_finite() && y.is_finite()).then(|| Signal {
        id: id.to_string(),
        cluster_id: cluster_id.unwrap_or(id).to_string(),
        position: Point::from_xy(x, y),
    })
}

/// Junction polygons need at least three vertices to enclose an area.
pub(crate) fn build_junction(id: &str, junction_type: &str, shape: &str) -> Option<Junction> {
    let polygon = geometry::polygon_points(shape);
    (polygon.len() >= 3).then(|| Junction {
        id: id.to_string(),
        junction_type: junction_type.to_string(),
        polygon,
    })
}

pub(crate) fn build_junction_point(id: &str, x: &str, y: &str) -> Option<JunctionPoint> {
    let x = x.parse::<f64>().ok()?;
    let y = y.parse::<f64>().ok()?;
    (x.is_finite() && y.is_finite()).then(|| JunctionPoint {
        id: id.to_string(),
        position: Point::from_xy(x, y),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = include_str!("../../tests/fixtures/sample_net.xml");

    #[test]
    fn test_empty_document_is_an_error() {
        let parser = NetworkDocumentParser::new();
        assert!(matches!(parser.parse(""), Err(ParseError::EmptyDocument)));
        assert!(matches!(
            parser.parse("   \n\t"),
            Err(ParseError::EmptyDocument)
        ));
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let parser = NetworkDocumentParser::new();
        assert!(matches!(
            parser.parse("<net><edge id="),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_document_without_geometry_is_an_error() {
        let parser = NetworkDocumentParser::new();
        let doc = r#"<net><location convBoundary="0,0,10,10"/></net>"#;
        assert!(matches!(parser.parse(doc), Err(ParseError::NoGeometry)));
    }

    #[test]
    fn test_parse_fixture_tree_strategy() {
        let model = NetworkDocumentParser::new()
            .without_acceleration()
            .parse(FIXTURE)
            .unwrap();

        assert_eq!(model.lanes.len(), 5);
        assert_eq!(model.lanes.iter().filter(|l| l.is_internal).count(), 1);
        assert_eq!(model.signals.len(), 1);
        assert_eq!(model.signals[0].id, "J1");
        assert!(model.bounds.is_some());
        assert!(!model.junctions.is_empty());
        assert!(model.junction_points.len() >= model.junctions.len());
    }

    #[test]
    fn test_strategies_produce_identical_models() {
        let streaming = accelerated::parse_document(FIXTURE).unwrap();
        let tree = interpreted::parse_document(FIXTURE).unwrap();
        assert_eq!(streaming, tree);
    }

    #[test]
    fn test_fallback_is_transparent() {
        // A threshold of zero forces the streaming attempt even on the small
        // fixture; disabling acceleration forces the tree strategy. The
        // caller must not be able to tell which ran.
        let via_streaming = NetworkDocumentParser::new()
            .with_acceleration_threshold(0)
            .parse(FIXTURE)
            .unwrap();
        let via_tree = NetworkDocumentParser::new()
            .without_acceleration()
            .parse(FIXTURE)
            .unwrap();
        assert_eq!(via_streaming, via_tree);
    }

    #[test]
    fn test_axis_order_coerced_from_source_xy() {
        let model = NetworkDocumentParser::new()
            .without_acceleration()
            .parse(FIXTURE)
            .unwrap();
        let lane = model.lanes.iter().find(|l| l.id == "E1_0").unwrap();
        // Source shape starts at x=0, y=95; render order is lat=y, lng=x.
        assert_eq!(lane.points[0].lat, 95.0);
        assert_eq!(lane.points[0].lng, 0.0);
    }

    #[test]
    fn test_lane_edge_ids_come_from_enclosing_edge() {
        let model = NetworkDocumentParser::new()
            .without_acceleration()
            .parse(FIXTURE)
            .unwrap();
        let lane = model.lanes.iter().find(|l| l.id == "E1_1").unwrap();
        assert_eq!(lane.edge_id.as_deref(), Some("E1"));
    }

    #[test]
    fn test_boundary_tuple_parsing() {
        let b = parse_boundary("0.0,1.0,10.5,20.5").unwrap();
        assert_eq!(b.min_x, 0.0);
        assert_eq!(b.max_y, 20.5);
        assert!(parse_boundary("1,2,3").is_none());
        assert!(parse_boundary("a,b,c,d").is_none());
    }

    #[tokio::test]
    async fn test_offloaded_parse_matches_sync() {
        let parser = NetworkDocumentParser::new().without_acceleration();
        let offloaded = parser.parse_offloaded(FIXTURE.to_string()).await.unwrap();
        let sync = parser.parse(FIXTURE).unwrap();
        assert_eq!(offloaded, sync);
    }
}

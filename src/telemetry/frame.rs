//! Wire frames pushed by the simulation bridge, and their normalized forms.
//!
//! Frames arrive as one JSON object per line, tagged by `type`. Raw records
//! keep every coordinate optional; normalization decides per record whether
//! a usable position exists and drops the record silently when it does not.
//! A malformed record never aborts the frame it arrived in.

use serde::{Deserialize, Serialize};

use crate::net::model::{Lane, Point, derive_edge_id};

/// One push from the simulation, tagged by kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    #[serde(rename = "net")]
    Net(NetFrame),
    #[serde(rename = "viz", alias = "vehicle")]
    Viz(VizFrame),
    #[serde(rename = "tls", alias = "signal")]
    Tls(TlsFrame),
    #[serde(rename = "vehicleFrame")]
    EmergencyVehicles(EmergencyVehicleFrame),
    #[serde(rename = "routeFrame")]
    EmergencyRoutes(EmergencyRouteFrame),
    #[serde(rename = "error")]
    Error(ErrorFrame),
    #[serde(other)]
    Unknown,
}

impl Frame {
    /// Parses a single frame line. `None` means the line was not a frame at
    /// all; per-record problems inside a valid frame are handled later.
    pub fn parse(raw: &str) -> Option<Frame> {
        serde_json::from_str(raw).ok()
    }
}

/// Lane geometry from a running simulation, in its native XY frame.
#[derive(Debug, Clone, Deserialize)]
pub struct NetFrame {
    #[serde(default)]
    pub bounds: Option<RawBounds>,
    #[serde(default)]
    pub lanes: Vec<RawNetLane>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBounds {
    #[serde(rename = "minX")]
    pub min_x: f64,
    #[serde(rename = "minY")]
    pub min_y: f64,
    #[serde(rename = "maxX")]
    pub max_x: f64,
    #[serde(rename = "maxY")]
    pub max_y: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawNetLane {
    pub id: String,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub points: Vec<RawXY>,
}

/// A native-order pair as emitted by the simulation. Coordinates stay
/// optional so a single null never poisons the surrounding frame.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RawXY {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

impl RawXY {
    pub fn to_point(self) -> Option<Point> {
        let (x, y) = (self.x?, self.y?);
        let p = Point::from_xy(x, y);
        p.is_finite().then_some(p)
    }
}

/// Vehicle and signal telemetry for one simulation step.
#[derive(Debug, Clone, Deserialize)]
pub struct VizFrame {
    #[serde(default)]
    pub step: Option<u64>,
    #[serde(default)]
    pub ts: Option<i64>,
    #[serde(default)]
    pub vehicles: Vec<RawVehicle>,
    #[serde(default)]
    pub tls: Vec<RawSignal>,
}

/// Signal-only telemetry frame.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsFrame {
    #[serde(default)]
    pub ts: Option<i64>,
    #[serde(default)]
    pub tls: Vec<RawSignal>,
}

/// A vehicle record as it arrives. Carries either a geographic pair or a
/// native XY pair; normalization picks one, never both.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawVehicle {
    pub id: String,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub angle: Option<f64>,
    #[serde(default, rename = "type")]
    pub vehicle_type: Option<String>,
    #[serde(default)]
    pub edge: Option<String>,
    #[serde(default)]
    pub lane: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawSignal {
    pub id: String,
    pub state: String,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default, rename = "nextSwitch")]
    pub next_switch: Option<f64>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

/// Emergency vehicle positions, a parallel sub-feed with its own cadence.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmergencyVehicleFrame {
    #[serde(default)]
    pub ts: Option<i64>,
    #[serde(default)]
    pub vehicles: Vec<RawEmergencyVehicle>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawEmergencyVehicle {
    pub id: String,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default, rename = "vehicleType")]
    pub vehicle_type: Option<String>,
    #[serde(default, rename = "emergencyState")]
    pub emergency_state: Option<String>,
    #[serde(default, rename = "routeId")]
    pub route_id: Option<String>,
}

/// Assigned emergency routes, coordinates in native XY.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmergencyRouteFrame {
    #[serde(default)]
    pub ts: Option<i64>,
    #[serde(default)]
    pub routes: Vec<RawRoute>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawRoute {
    #[serde(rename = "routeId")]
    pub route_id: String,
    #[serde(default)]
    pub coords: Vec<RawXY>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub eta: Option<f64>,
    #[serde(default, rename = "assignedVehicleId")]
    pub assigned_vehicle_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorFrame {
    #[serde(default)]
    pub message: String,
}

/// A vehicle record after coordinate unification.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleUpdate {
    pub id: String,
    pub position: Point,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub vehicle_type: Option<String>,
    pub edge: Option<String>,
    pub lane: Option<String>,
}

impl VehicleUpdate {
    /// Normalizes a raw record. The geographic pair wins when both are
    /// present; records with no usable pair are dropped.
    pub fn from_raw(raw: &RawVehicle) -> Option<Self> {
        let position = unified_position(raw.lat, raw.lon, raw.x, raw.y)?;
        Some(Self {
            id: raw.id.clone(),
            position,
            heading: raw.angle,
            speed: raw.speed,
            vehicle_type: raw.vehicle_type.clone(),
            edge: raw.edge.clone(),
            lane: raw.lane.clone(),
        })
    }

    /// The edge this vehicle occupies: an explicit edge reference when given,
    /// otherwise derived from its lane reference.
    pub fn resolved_edge_id(&self) -> Option<String> {
        if let Some(edge) = &self.edge {
            return Some(edge.clone());
        }
        self.lane.as_deref().map(derive_edge_id)
    }
}

/// A signal state after normalization. The position is optional; telemetry
/// for a signal with no known static position is still valid.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalUpdate {
    pub id: String,
    pub state: String,
    pub program: Option<String>,
    pub next_switch: Option<f64>,
    pub position: Option<Point>,
}

impl SignalUpdate {
    pub fn from_raw(raw: &RawSignal) -> Self {
        let position = match (raw.lat, raw.lon) {
            (Some(lat), Some(lon)) => {
                let p = Point::from_geo(lat, lon);
                p.is_finite().then_some(p)
            }
            _ => None,
        };
        Self {
            id: raw.id.clone(),
            state: raw.state.clone(),
            program: raw.program.clone(),
            next_switch: raw.next_switch,
            position,
        }
    }
}

/// Converts a live lane record into the model's [`Lane`] form, swapping its
/// points into render order and deriving the edge id. Lanes reduced below
/// two usable points are dropped.
pub fn lane_from_net(raw: &RawNetLane) -> Option<Lane> {
    let points: Vec<Point> = raw.points.iter().filter_map(|p| p.to_point()).collect();
    if points.len() < 2 {
        return None;
    }
    Some(Lane {
        edge_id: Some(derive_edge_id(&raw.id)),
        is_internal: raw.id.starts_with(':'),
        id: raw.id.clone(),
        points,
        speed_limit: raw.speed,
    })
}

pub(crate) fn unified_position(
    lat: Option<f64>,
    lon: Option<f64>,
    x: Option<f64>,
    y: Option<f64>,
) -> Option<Point> {
    let p = match (lat, lon) {
        (Some(lat), Some(lon)) => Point::from_geo(lat, lon),
        _ => Point::from_xy(x?, y?),
    };
    p.is_finite().then_some(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_viz_frame() {
        let raw = r#"{"type":"viz","step":12,"ts":1700000000000,
            "vehicles":[{"id":"veh0","x":10.0,"y":20.0,"speed":5.5,"angle":90.0,"type":"passenger"}],
            "tls":[{"id":"J1","state":"GrGr"}]}"#;
        let Some(Frame::Viz(frame)) = Frame::parse(raw) else {
            panic!("expected viz frame");
        };
        assert_eq!(frame.step, Some(12));
        assert_eq!(frame.vehicles.len(), 1);
        assert_eq!(frame.tls.len(), 1);
    }

    #[test]
    fn test_parse_unknown_frame_kind() {
        assert!(matches!(
            Frame::parse(r#"{"type":"somethingNew","data":1}"#),
            Some(Frame::Unknown)
        ));
    }

    #[test]
    fn test_parse_garbage_line() {
        assert!(Frame::parse("not json at all").is_none());
    }

    #[test]
    fn test_vehicle_native_pair_is_swapped() {
        let raw = RawVehicle {
            id: "veh0".into(),
            x: Some(10.0),
            y: Some(20.0),
            lat: None,
            lon: None,
            speed: None,
            angle: None,
            vehicle_type: None,
            edge: None,
            lane: None,
        };
        let v = VehicleUpdate::from_raw(&raw).unwrap();
        assert_eq!(v.position, Point::from_xy(10.0, 20.0));
        assert_eq!(v.position.lat, 20.0);
    }

    #[test]
    fn test_vehicle_geographic_pair_wins() {
        let raw = RawVehicle {
            id: "veh0".into(),
            x: Some(10.0),
            y: Some(20.0),
            lat: Some(9.02),
            lon: Some(38.75),
            speed: None,
            angle: None,
            vehicle_type: None,
            edge: None,
            lane: None,
        };
        let v = VehicleUpdate::from_raw(&raw).unwrap();
        assert_eq!(v.position.lat, 9.02);
        assert_eq!(v.position.lng, 38.75);
    }

    #[test]
    fn test_vehicle_without_position_is_dropped() {
        let raw = RawVehicle {
            id: "veh0".into(),
            x: None,
            y: Some(20.0),
            lat: None,
            lon: None,
            speed: None,
            angle: None,
            vehicle_type: None,
            edge: None,
            lane: None,
        };
        assert!(VehicleUpdate::from_raw(&raw).is_none());
    }

    #[test]
    fn test_vehicle_non_finite_position_is_dropped() {
        let raw = RawVehicle {
            id: "veh0".into(),
            x: Some(f64::NAN),
            y: Some(20.0),
            lat: None,
            lon: None,
            speed: None,
            angle: None,
            vehicle_type: None,
            edge: None,
            lane: None,
        };
        assert!(VehicleUpdate::from_raw(&raw).is_none());
    }

    #[test]
    fn test_resolved_edge_prefers_explicit_reference() {
        let mut v = VehicleUpdate {
            id: "veh0".into(),
            position: Point::from_xy(0.0, 0.0),
            heading: None,
            speed: None,
            vehicle_type: None,
            edge: Some("E7".into()),
            lane: Some("E9_2".into()),
        };
        assert_eq!(v.resolved_edge_id().as_deref(), Some("E7"));

        v.edge = None;
        assert_eq!(v.resolved_edge_id().as_deref(), Some("E9"));

        v.lane = None;
        assert!(v.resolved_edge_id().is_none());
    }

    #[test]
    fn test_lane_from_net_swaps_and_derives() {
        let raw = RawNetLane {
            id: "E4_1".into(),
            speed: Some(13.89),
            points: vec![
                RawXY {
                    x: Some(0.0),
                    y: Some(1.0),
                },
                RawXY {
                    x: Some(5.0),
                    y: Some(6.0),
                },
            ],
        };
        let lane = lane_from_net(&raw).unwrap();
        assert_eq!(lane.edge_id.as_deref(), Some("E4"));
        assert!(!lane.is_internal);
        assert_eq!(lane.points[0], Point::from_xy(0.0, 1.0));
    }

    #[test]
    fn test_lane_from_net_drops_null_points() {
        let raw = RawNetLane {
            id: ":J2_0_0".into(),
            speed: None,
            points: vec![
                RawXY {
                    x: Some(0.0),
                    y: Some(1.0),
                },
                RawXY { x: None, y: None },
                RawXY {
                    x: Some(2.0),
                    y: Some(3.0),
                },
            ],
        };
        let lane = lane_from_net(&raw).unwrap();
        assert_eq!(lane.points.len(), 2);
        assert!(lane.is_internal);
    }

    #[test]
    fn test_signal_without_position_is_kept() {
        let raw = RawSignal {
            id: "J1".into(),
            state: "rryG".into(),
            program: None,
            next_switch: None,
            lat: None,
            lon: None,
        };
        let s = SignalUpdate::from_raw(&raw);
        assert_eq!(s.state, "rryG");
        assert!(s.position.is_none());
    }
}

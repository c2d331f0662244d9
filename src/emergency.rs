//! Emergency vehicle sub-feed.
//!
//! A channel separate from the general telemetry stream: emergency vehicles
//! and their assigned routes have their own cardinality and caching
//! contract. Records are only ever upserted; a frame that omits a known id
//! says nothing about that vehicle, so nothing is deleted. Staleness is the
//! consumer's call, made from `last_update`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{ChannelError, FetchError};
use crate::fetch::{self, HttpClient};
use crate::net::model::Point;
use crate::telemetry::channel::ChannelState;
use crate::telemetry::frame::{
    EmergencyRouteFrame, EmergencyVehicleFrame, Frame, RawEmergencyVehicle, RawRoute,
    unified_position,
};
use crate::telemetry::transport::FrameTransport;

/// Latest known state of one emergency vehicle. Refreshed on every frame
/// that carries its id, never explicitly removed.
#[derive(Debug, Clone, PartialEq)]
pub struct EmergencyVehicleRecord {
    pub vehicle_id: String,
    pub position: Point,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub vehicle_type: Option<String>,
    pub emergency_state: Option<String>,
    pub route_id: Option<String>,
    pub last_update: DateTime<Utc>,
}

/// A cached emergency route, keyed by id.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRecord {
    pub route_id: String,
    pub coords: Vec<Point>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub eta: Option<f64>,
    pub assigned_vehicle_id: Option<String>,
    pub last_update: DateTime<Utc>,
}

/// What a route request actually did. A request for a cached or already
/// in-flight route is a no-op, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteRequestOutcome {
    Requested,
    Cached,
    Pending,
}

/// Payload served by the optional snapshot endpoint; same record shapes as
/// the streamed frames.
#[derive(Debug, Deserialize)]
pub struct SnapshotPayload {
    #[serde(default)]
    pub vehicles: Vec<RawEmergencyVehicle>,
    #[serde(default)]
    pub routes: Vec<RawRoute>,
}

type VehicleHandler = Box<dyn Fn(&EmergencyVehicleRecord) + Send>;
type RouteHandler = Box<dyn Fn(&RouteRecord) + Send>;

pub struct EmergencyFeedClient {
    state: ChannelState,
    transport: Option<Box<dyn FrameTransport>>,
    snapshot_url: Option<String>,

    vehicles: HashMap<String, EmergencyVehicleRecord>,
    routes: HashMap<String, RouteRecord>,
    pending_routes: HashSet<String>,

    vehicle_handlers: Vec<VehicleHandler>,
    route_handlers: Vec<RouteHandler>,
}

impl EmergencyFeedClient {
    pub fn new() -> Self {
        Self {
            state: ChannelState::Disconnected,
            transport: None,
            snapshot_url: None,
            vehicles: HashMap::new(),
            routes: HashMap::new(),
            pending_routes: HashSet::new(),
            vehicle_handlers: Vec::new(),
            route_handlers: Vec::new(),
        }
    }

    /// Enables the snapshot bootstrap against the given endpoint. Without
    /// this the maps start empty and fill from the stream, which remains the
    /// source of truth either way.
    pub fn with_snapshot_url(mut self, url: impl Into<String>) -> Self {
        self.snapshot_url = Some(url.into());
        self
    }

    pub fn on_vehicle(&mut self, handler: impl Fn(&EmergencyVehicleRecord) + Send + 'static) {
        self.vehicle_handlers.push(Box::new(handler));
    }

    pub fn on_route(&mut self, handler: impl Fn(&RouteRecord) + Send + 'static) {
        self.route_handlers.push(Box::new(handler));
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn vehicles(&self) -> &HashMap<String, EmergencyVehicleRecord> {
        &self.vehicles
    }

    pub fn routes(&self) -> &HashMap<String, RouteRecord> {
        &self.routes
    }

    pub fn route(&self, route_id: &str) -> Option<&RouteRecord> {
        self.routes.get(route_id)
    }

    /// One-shot seed of both maps from the snapshot endpoint. A no-op when
    /// the bootstrap is not enabled. Seeding goes through the same frame
    /// handlers as streamed data.
    pub async fn bootstrap<C: HttpClient>(&mut self, client: &C) -> Result<(), FetchError> {
        let Some(url) = self.snapshot_url.clone() else {
            return Ok(());
        };

        let payload: SnapshotPayload = fetch::fetch_json(client, &url).await?;
        info!(
            vehicles = payload.vehicles.len(),
            routes = payload.routes.len(),
            "emergency snapshot received"
        );

        self.ingest(Frame::EmergencyVehicles(EmergencyVehicleFrame {
            ts: None,
            vehicles: payload.vehicles,
        }));
        self.ingest(Frame::EmergencyRoutes(EmergencyRouteFrame {
            ts: None,
            routes: payload.routes,
        }));
        Ok(())
    }

    /// Takes ownership of a connected transport and subscribes to the
    /// emergency stream.
    pub async fn connect(
        &mut self,
        mut transport: Box<dyn FrameTransport>,
    ) -> Result<(), ChannelError> {
        self.state = ChannelState::Connecting;

        let subscribe =
            serde_json::json!({ "type": "subscribe", "streams": ["emergency"] }).to_string();
        if let Err(err) = transport.send(&subscribe).await {
            self.state = ChannelState::Disconnected;
            return Err(err);
        }

        self.transport = Some(transport);
        self.state = ChannelState::Connected;
        info!("emergency channel connected");
        Ok(())
    }

    /// Reads and handles one frame. `Ok(false)` means the peer closed the
    /// stream. Cached vehicles and routes survive every exit path.
    pub async fn poll(&mut self) -> Result<bool, ChannelError> {
        let transport = self.transport.as_mut().ok_or(ChannelError::NotConnected)?;
        match transport.next_frame().await {
            Ok(Some(raw)) => {
                self.handle_frame(&raw);
                Ok(true)
            }
            Ok(None) => {
                self.release_transport();
                Ok(false)
            }
            Err(err) => {
                self.release_transport();
                Err(err)
            }
        }
    }

    pub async fn run(&mut self) -> Result<(), ChannelError> {
        while self.poll().await? {}
        Ok(())
    }

    /// Requests the route assigned to a vehicle, cache-first.
    ///
    /// A cached route id is a no-op; so is one already requested and not yet
    /// answered. Repeated UI asks for the same route therefore issue at most
    /// one underlying fetch.
    pub async fn request_route(
        &mut self,
        vehicle_id: &str,
        route_id: &str,
    ) -> Result<RouteRequestOutcome, ChannelError> {
        if self.routes.contains_key(route_id) {
            debug!(route_id, "route already cached, request skipped");
            return Ok(RouteRequestOutcome::Cached);
        }
        if self.pending_routes.contains(route_id) {
            debug!(route_id, "route request already in flight");
            return Ok(RouteRequestOutcome::Pending);
        }

        let transport = self.transport.as_mut().ok_or(ChannelError::NotConnected)?;
        let payload = serde_json::json!({
            "type": "requestRoute",
            "vehicleId": vehicle_id,
            "routeId": route_id,
        })
        .to_string();
        transport.send(&payload).await?;

        self.pending_routes.insert(route_id.to_string());
        Ok(RouteRequestOutcome::Requested)
    }

    /// Idempotent teardown. Releases the transport and unregisters every
    /// handler so a reconnect cannot double-deliver. Vehicle and route
    /// caches are retained.
    pub fn disconnect(&mut self) {
        self.release_transport();
        self.vehicle_handlers.clear();
        self.route_handlers.clear();
    }

    fn release_transport(&mut self) {
        self.transport = None;
        self.state = ChannelState::Disconnected;
    }

    pub fn handle_frame(&mut self, raw: &str) {
        match Frame::parse(raw) {
            Some(frame) => self.ingest(frame),
            None => debug!(len = raw.len(), "unparseable frame line dropped"),
        }
    }

    /// Single dispatch point for every frame kind; the dev injection hooks
    /// and the snapshot bootstrap feed through here as well.
    pub fn ingest(&mut self, frame: Frame) {
        match frame {
            Frame::EmergencyVehicles(vehicles) => self.ingest_vehicles(vehicles),
            Frame::EmergencyRoutes(routes) => self.ingest_routes(routes),
            Frame::Error(err) => warn!(message = %err.message, "producer reported an error"),
            Frame::Unknown => debug!("unknown frame kind dropped"),
            _ => debug!("non-emergency frame on the emergency channel ignored"),
        }
    }

    /// Feeds synthetic vehicle records through the real frame path. Used by
    /// tests and dev tooling; bypassing normalization here would make those
    /// tests meaningless.
    pub fn dev_emit_vehicles(&mut self, vehicles: Vec<RawEmergencyVehicle>) {
        self.ingest(Frame::EmergencyVehicles(EmergencyVehicleFrame {
            ts: None,
            vehicles,
        }));
    }

    /// Synthetic counterpart of a route frame, same path as the wire.
    pub fn dev_emit_routes(&mut self, routes: Vec<RawRoute>) {
        self.ingest(Frame::EmergencyRoutes(EmergencyRouteFrame { ts: None, routes }));
    }

    fn ingest_vehicles(&mut self, frame: EmergencyVehicleFrame) {
        let now = Utc::now();
        for raw in &frame.vehicles {
            let Some(position) = unified_position(raw.lat, raw.lon, raw.x, raw.y) else {
                debug!(vehicle_id = %raw.id, "emergency vehicle without usable coordinates dropped");
                continue;
            };

            let record = EmergencyVehicleRecord {
                vehicle_id: raw.id.clone(),
                position,
                heading: raw.heading,
                speed: raw.speed,
                vehicle_type: raw.vehicle_type.clone(),
                emergency_state: raw.emergency_state.clone(),
                route_id: raw.route_id.clone(),
                last_update: now,
            };

            for handler in &self.vehicle_handlers {
                handler(&record);
            }
            self.vehicles.insert(raw.id.clone(), record);
        }
    }

    fn ingest_routes(&mut self, frame: EmergencyRouteFrame) {
        let now = Utc::now();
        for raw in &frame.routes {
            let coords: Vec<Point> = raw.coords.iter().filter_map(|c| c.to_point()).collect();
            if coords.is_empty() {
                debug!(route_id = %raw.route_id, "route without usable coordinates dropped");
                continue;
            }

            let record = RouteRecord {
                route_id: raw.route_id.clone(),
                coords,
                origin: raw.origin.clone(),
                destination: raw.destination.clone(),
                eta: raw.eta,
                assigned_vehicle_id: raw.assigned_vehicle_id.clone(),
                last_update: now,
            };

            self.pending_routes.remove(&raw.route_id);
            for handler in &self.route_handlers {
                handler(&record);
            }
            self.routes.insert(raw.route_id.clone(), record);
        }
    }
}

impl Default for EmergencyFeedClient {
    fn default() -> Self {
        Self::new()
    }
}

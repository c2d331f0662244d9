//! The live telemetry channel.
//!
//! Owns the live lane set, the vehicle map, and the signal map. All mutation
//! happens inside this channel's frame handling; consumers read snapshots by
//! reference and never mutate them. Frames are processed strictly in arrival
//! order and a later frame for an id always overwrites an earlier one, even
//! when its timestamp looks older. Producer clocks are not trusted.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::frame::{
    Frame, NetFrame, SignalUpdate, TlsFrame, VehicleUpdate, VizFrame, lane_from_net,
};
use super::transport::FrameTransport;
use crate::congestion::{CongestionSnapshot, Policy, Throttle};
use crate::edges;
use crate::error::ChannelError;
use crate::net::model::{Lane, NetworkModel};

/// Connectivity of a channel. Reconnection cadence belongs to the caller;
/// the channel only interprets frames once connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

type NetHandler = Box<dyn Fn(&[Lane]) + Send>;
type VehicleHandler = Box<dyn Fn(&[VehicleUpdate]) + Send>;
type SignalHandler = Box<dyn Fn(&[SignalUpdate]) + Send>;

pub struct TelemetryChannel {
    state: ChannelState,
    streams: Vec<String>,
    transport: Option<Box<dyn FrameTransport>>,

    static_lanes: Vec<Lane>,
    live_lanes: Vec<Lane>,
    vehicles: HashMap<String, VehicleUpdate>,
    signals: HashMap<String, SignalUpdate>,
    last_step: Option<u64>,

    policy: Policy,
    throttle: Throttle,
    congestion: Option<CongestionSnapshot>,
    snapshot_generation: u64,

    net_handlers: Vec<NetHandler>,
    vehicle_handlers: Vec<VehicleHandler>,
    signal_handlers: Vec<SignalHandler>,
}

impl TelemetryChannel {
    pub fn new(policy: Policy) -> Self {
        Self {
            state: ChannelState::Disconnected,
            streams: Vec::new(),
            transport: None,
            static_lanes: Vec::new(),
            live_lanes: Vec::new(),
            vehicles: HashMap::new(),
            signals: HashMap::new(),
            last_step: None,
            policy,
            throttle: Throttle::default(),
            congestion: None,
            snapshot_generation: 0,
            net_handlers: Vec::new(),
            vehicle_handlers: Vec::new(),
            signal_handlers: Vec::new(),
        }
    }

    /// Names the logical streams to subscribe to. An empty list asks for the
    /// server's default subscription.
    pub fn with_streams(mut self, streams: Vec<String>) -> Self {
        self.streams = streams;
        self
    }

    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    /// Installs the static document's lanes as the classification fallback.
    /// Live geometry, once received, supersedes these; they are never merged.
    pub fn set_static_network(&mut self, model: &NetworkModel) {
        self.static_lanes = model.lanes.clone();
    }

    pub fn on_net(&mut self, handler: impl Fn(&[Lane]) + Send + 'static) {
        self.net_handlers.push(Box::new(handler));
    }

    pub fn on_vehicles(&mut self, handler: impl Fn(&[VehicleUpdate]) + Send + 'static) {
        self.vehicle_handlers.push(Box::new(handler));
    }

    pub fn on_signals(&mut self, handler: impl Fn(&[SignalUpdate]) + Send + 'static) {
        self.signal_handlers.push(Box::new(handler));
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// The lane set congestion runs against: live geometry when any has
    /// arrived, the static document's otherwise.
    pub fn lanes(&self) -> &[Lane] {
        if self.live_lanes.is_empty() {
            &self.static_lanes
        } else {
            &self.live_lanes
        }
    }

    pub fn vehicles(&self) -> &HashMap<String, VehicleUpdate> {
        &self.vehicles
    }

    pub fn signals(&self) -> &HashMap<String, SignalUpdate> {
        &self.signals
    }

    pub fn congestion(&self) -> Option<&CongestionSnapshot> {
        self.congestion.as_ref()
    }

    /// Bumped on every accepted recomputation; lets a caller detect fresh
    /// classification without comparing maps.
    pub fn snapshot_generation(&self) -> u64 {
        self.snapshot_generation
    }

    pub fn last_step(&self) -> Option<u64> {
        self.last_step
    }

    /// Takes ownership of a connected transport and subscribes.
    pub async fn connect(
        &mut self,
        mut transport: Box<dyn FrameTransport>,
    ) -> Result<(), ChannelError> {
        self.state = ChannelState::Connecting;

        let subscribe =
            serde_json::json!({ "type": "subscribe", "streams": self.streams }).to_string();
        if let Err(err) = transport.send(&subscribe).await {
            self.state = ChannelState::Disconnected;
            return Err(err);
        }

        self.transport = Some(transport);
        self.state = ChannelState::Connected;
        info!(streams = ?self.streams, "telemetry channel connected");
        Ok(())
    }

    /// Reads and handles one frame. `Ok(false)` means the peer closed the
    /// stream. On any exit path the transport is released and previously
    /// stored lane, vehicle, and signal state stays queryable.
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

    /// Drives the channel until the stream ends or fails.
    pub async fn run(&mut self) -> Result<(), ChannelError> {
        while self.poll().await? {}
        Ok(())
    }

    /// Idempotent teardown. Releases the transport and unregisters every
    /// handler so a later reconnect cannot double-deliver. Stored telemetry
    /// state is retained; stale data beats a blank view.
    pub fn disconnect(&mut self) {
        self.release_transport();
        self.net_handlers.clear();
        self.vehicle_handlers.clear();
        self.signal_handlers.clear();
    }

    fn release_transport(&mut self) {
        self.transport = None;
        self.state = ChannelState::Disconnected;
    }

    /// Parses and ingests one frame line. Unparseable lines are dropped;
    /// they never abort the channel.
    pub fn handle_frame(&mut self, raw: &str) {
        match Frame::parse(raw) {
            Some(frame) => self.ingest(frame),
            None => debug!(len = raw.len(), "unparseable frame line dropped"),
        }
    }

    /// Single dispatch point for every frame kind. Synthetic frames take
    /// this exact path too.
    pub fn ingest(&mut self, frame: Frame) {
        match frame {
            Frame::Net(net) => self.ingest_net(net),
            Frame::Viz(viz) => self.ingest_viz(viz),
            Frame::Tls(tls) => self.ingest_tls(tls),
            Frame::EmergencyVehicles(_) | Frame::EmergencyRoutes(_) => {
                debug!("emergency frame on the telemetry channel ignored");
            }
            Frame::Error(err) => warn!(message = %err.message, "producer reported an error"),
            Frame::Unknown => debug!("unknown frame kind dropped"),
        }
    }

    fn ingest_net(&mut self, frame: NetFrame) {
        let lanes: Vec<Lane> = frame.lanes.iter().filter_map(lane_from_net).collect();
        debug!(
            received = frame.lanes.len(),
            usable = lanes.len(),
            "live lane geometry replaced"
        );
        self.live_lanes = lanes;

        for handler in &self.net_handlers {
            handler(&self.live_lanes);
        }
    }

    fn ingest_viz(&mut self, frame: VizFrame) {
        self.last_step = frame.step.or(self.last_step);

        let accepted: Vec<VehicleUpdate> = frame
            .vehicles
            .iter()
            .filter_map(VehicleUpdate::from_raw)
            .collect();
        let dropped = frame.vehicles.len() - accepted.len();
        if dropped > 0 {
            debug!(dropped, "vehicle records without usable coordinates");
        }

        for vehicle in &accepted {
            self.vehicles.insert(vehicle.id.clone(), vehicle.clone());
        }

        let signals: Vec<SignalUpdate> = frame.tls.iter().map(SignalUpdate::from_raw).collect();
        for signal in &signals {
            self.signals.insert(signal.id.clone(), signal.clone());
        }

        self.recompute_congestion();

        for handler in &self.vehicle_handlers {
            handler(&accepted);
        }
        for handler in &self.signal_handlers {
            handler(&signals);
        }
    }

    fn ingest_tls(&mut self, frame: TlsFrame) {
        let signals: Vec<SignalUpdate> = frame.tls.iter().map(SignalUpdate::from_raw).collect();
        for signal in &signals {
            self.signals.insert(signal.id.clone(), signal.clone());
        }
        for handler in &self.signal_handlers {
            handler(&signals);
        }
    }

    /// Full recomputation from the latest snapshot, skipped silently while
    /// the throttle window is closed.
    fn recompute_congestion(&mut self) {
        if !self.throttle.ready() {
            return;
        }

        let edge_set = edges::aggregate(self.lanes());
        let snapshot = CongestionSnapshot::classify(self.policy, &edge_set, self.vehicles.values());
        self.congestion = Some(snapshot);
        self.snapshot_generation += 1;
    }
}

//! Live telemetry ingestion: wire frames, transports, and the channel.

pub mod channel;
pub mod frame;
pub mod transport;

pub use channel::{ChannelState, TelemetryChannel};
pub use frame::{Frame, SignalUpdate, VehicleUpdate};
pub use transport::{FrameTransport, TcpTransport};

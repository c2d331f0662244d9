pub mod batch;
pub mod cache;
pub mod congestion;
pub mod edges;
pub mod emergency;
pub mod error;
pub mod fetch;
pub mod net;
pub mod output;
pub mod telemetry;

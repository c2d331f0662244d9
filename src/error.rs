//! Error taxonomy for the ingestion pipeline.
//!
//! Fetch, parse, and channel failures are distinct types so callers can tell
//! "file missing" from "file unusable" from "stream down". Failures of the
//! accelerated parse strategy are absorbed inside the parser and never show
//! up here.

use std::time::Duration;
use thiserror::Error;

/// Network document or snapshot retrieval failed, including the no-cache retry.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid document url `{0}`")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server answered with status {0}")]
    Status(reqwest::StatusCode),

    #[error("response body could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The network document could not be turned into usable geometry.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("network document is empty")]
    EmptyDocument,

    #[error("network document is malformed: {0}")]
    Malformed(String),

    #[error("network document yielded no usable geometry")]
    NoGeometry,

    #[error("parse abandoned after {0:?}")]
    Timeout(Duration),
}

/// Telemetry channel connectivity failure.
///
/// Surfaced as a state transition on the owning channel. Individual malformed
/// frames never produce a `ChannelError`; they are dropped per record.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transport i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("channel is not connected")]
    NotConnected,
}

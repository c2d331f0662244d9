//! Reload cache for the parsed network.
//!
//! An explicit object the caller owns and injects, not ambient module state.
//! Invalidation happens on expiry or format version mismatch only, never on
//! a heuristic.

use chrono::{DateTime, Duration, Utc};

use crate::net::model::NetworkModel;

/// Bumped whenever the parsed model's shape changes incompatibly.
pub const NETWORK_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct NetworkCache {
    model: NetworkModel,
    format_version: u32,
    parsed_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl NetworkCache {
    pub fn store(model: NetworkModel, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            model,
            format_version: NETWORK_FORMAT_VERSION,
            parsed_at: now,
            expires_at: now + ttl,
        }
    }

    /// Returns the cached model while it is unexpired and version-matched.
    pub fn get(&self, now: DateTime<Utc>) -> Option<&NetworkModel> {
        (self.format_version == NETWORK_FORMAT_VERSION && now < self.expires_at)
            .then_some(&self.model)
    }

    pub fn parsed_at(&self) -> DateTime<Utc> {
        self.parsed_at
    }
}

//! Congestion classification over live vehicle telemetry.
//!
//! Two policies coexist. The count policy needs only per-vehicle edge
//! occupancy; the ratio policy needs sampled speeds and the edge's free-flow
//! estimate. A caller picks one policy and sticks with it; outputs of the
//! two are never mixed in one render pass.
//!
//! Every classification is a full recomputation from the latest frame's
//! snapshot. There is no counter decay and no rolling average; accumulation
//! across frames, if wanted, happens upstream.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::edges::Edge;
use crate::telemetry::frame::VehicleUpdate;

/// Severity tiers for the count policy. `Open` (no vehicles at all) is kept
/// distinct from `Light` even though the two currently render similarly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum CountLevel {
    Open,
    Light,
    Moderate,
    Heavy,
}

/// Tiers for the speed ratio policy. Edges without samples are omitted from
/// this policy's output entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RatioLevel {
    Green,
    Orange,
    Red,
}

/// Count policy boundaries, inclusive at the top of each band. The defaults
/// are a compatibility contract; they are configurable but not derived.
#[derive(Debug, Clone, Copy)]
pub struct CountThresholds {
    pub light_max: usize,
    pub moderate_max: usize,
}

impl Default for CountThresholds {
    fn default() -> Self {
        Self {
            light_max: 2,
            moderate_max: 5,
        }
    }
}

impl CountThresholds {
    pub fn level_for(&self, count: usize) -> CountLevel {
        if count == 0 {
            CountLevel::Open
        } else if count <= self.light_max {
            CountLevel::Light
        } else if count <= self.moderate_max {
            CountLevel::Moderate
        } else {
            CountLevel::Heavy
        }
    }
}

/// Free-flow ratio at or above which an edge is green.
pub const RATIO_GREEN_MIN: f64 = 0.7;
/// Free-flow ratio at or above which an edge is orange rather than red.
pub const RATIO_ORANGE_MIN: f64 = 0.4;

// Guards the division for edges reporting a zero or absurdly small limit.
const MIN_SPEED_LIMIT: f64 = 0.1;

fn ratio_level(ratio: f64) -> RatioLevel {
    if ratio >= RATIO_GREEN_MIN {
        RatioLevel::Green
    } else if ratio >= RATIO_ORANGE_MIN {
        RatioLevel::Orange
    } else {
        RatioLevel::Red
    }
}

/// Buckets every edge by how many vehicles currently occupy it. Edges with
/// no vehicles are classified `Open`, so the output covers the whole edge
/// set.
pub fn classify_by_count<'a, I>(
    edges: &[Edge],
    vehicles: I,
    thresholds: CountThresholds,
) -> HashMap<String, CountLevel>
where
    I: IntoIterator<Item = &'a VehicleUpdate>,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    for vehicle in vehicles {
        if let Some(edge_id) = vehicle.resolved_edge_id() {
            *counts.entry(edge_id).or_insert(0) += 1;
        }
    }

    edges
        .iter()
        .map(|edge| {
            let count = counts.get(&edge.id).copied().unwrap_or(0);
            (edge.id.clone(), thresholds.level_for(count))
        })
        .collect()
}

/// Buckets edges by the ratio of average sampled speed to the edge's
/// free-flow estimate, clamped to [0, 1]. Edges with no speed samples are
/// left out.
pub fn classify_by_ratio<'a, I>(edges: &[Edge], vehicles: I) -> HashMap<String, RatioLevel>
where
    I: IntoIterator<Item = &'a VehicleUpdate>,
{
    let mut samples: HashMap<String, (f64, usize)> = HashMap::new();
    for vehicle in vehicles {
        let (Some(edge_id), Some(speed)) = (vehicle.resolved_edge_id(), vehicle.speed) else {
            continue;
        };
        let entry = samples.entry(edge_id).or_insert((0.0, 0));
        entry.0 += speed;
        entry.1 += 1;
    }

    edges
        .iter()
        .filter_map(|edge| {
            let (sum, n) = samples.get(&edge.id)?;
            let avg = sum / *n as f64;
            let ratio = (avg / edge.speed_limit.max(MIN_SPEED_LIMIT)).clamp(0.0, 1.0);
            Some((edge.id.clone(), ratio_level(ratio)))
        })
        .collect()
}

/// Which classification policy a channel runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Count,
    Ratio,
}

/// Result of one full recomputation under a single policy.
#[derive(Debug, Clone, PartialEq)]
pub enum CongestionSnapshot {
    Count(HashMap<String, CountLevel>),
    Ratio(HashMap<String, RatioLevel>),
}

impl CongestionSnapshot {
    pub fn classify<'a, I>(policy: Policy, edges: &[Edge], vehicles: I) -> Self
    where
        I: IntoIterator<Item = &'a VehicleUpdate>,
    {
        match policy {
            Policy::Count => {
                Self::Count(classify_by_count(edges, vehicles, CountThresholds::default()))
            }
            Policy::Ratio => Self::Ratio(classify_by_ratio(edges, vehicles)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Count(m) => m.len(),
            Self::Ratio(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Skips recomputation when asked again within the minimum interval.
///
/// The skip is silent: the dropped frame's contribution is not queued for
/// later. The clock is passed in so tests do not sleep.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    pub fn ready_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(prev) if now.duration_since(prev) < self.min_interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn ready(&mut self) -> bool {
        self.ready_at(Instant::now())
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}

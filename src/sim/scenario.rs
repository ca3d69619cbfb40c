//! Scenario configuration: the JSON description of one simulation run.
//!
//! Mirrors the shape of the simulated world — node placement, radio delivery
//! parameters, and the PVD application's timing knobs. Loaded with serde and
//! validated before anything is built from it.

use serde::Deserialize;
use std::time::Duration;

use crate::pvd::app::ChannelAccess;
use crate::pvd::ranges::RangeTable;

/// Upper bound on node count; beyond this the per-transmission scans stop
/// being simulation-scale.
const MAX_NODES: usize = 4096;
/// World coordinate bound in meters for both axes.
const MAX_WORLD_COORD: f64 = 100_000.0;

/// Root structure describing one simulation run.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Base seed for all random streams; replaying with the same seed
    /// reproduces the run exactly.
    pub seed: u64,
    /// PVD application timing and accounting parameters.
    pub pvd: PvdParameters,
    /// Broadcast delivery parameters for the simulated radio.
    pub radio: RadioParameters,
    /// All participating nodes with their fixed positions.
    pub nodes: Vec<NodeConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PvdParameters {
    /// Total simulated time of the run (ms).
    pub total_sim_time_ms: u64,
    /// Broadcast payload size in bytes.
    #[serde(default = "default_packet_size")]
    pub packet_size: usize,
    /// Nominal broadcast period (ms).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// GPS clock sync accuracy bound (ns); startup drift is drawn from it.
    #[serde(default = "default_gps_accuracy_ns")]
    pub gps_accuracy_ns: u64,
    /// Maximum random transmit delay per packet (ms).
    #[serde(default = "default_max_tx_delay_ms")]
    pub max_tx_delay_ms: u64,
    /// Quiet period before the first transmission window (ms).
    #[serde(default = "default_start_offset_ms")]
    pub start_offset_ms: u64,
    /// Reception-range thresholds in meters, innermost first. Empty means the
    /// default table from `pvd::helper`.
    #[serde(default)]
    pub ranges_m: Vec<f64>,
    /// WAVE channel access mode carried to each application.
    #[serde(default)]
    pub channel_access: ChannelAccess,
    /// Emit a log line every 1000th transmitted packet.
    #[serde(default)]
    pub log_tx_count: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RadioParameters {
    /// Flat delivery range in meters: a broadcast reaches every node within
    /// this distance of the sender and no node beyond it.
    pub delivery_range_m: f64,
    /// Fixed propagation delay applied to every delivery (us).
    #[serde(default = "default_propagation_delay_us")]
    pub propagation_delay_us: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub node_id: u32,
    pub position: Point,
    /// Virtual time (ms) at which this node starts moving and therefore
    /// participates in statistics. Absent means it never starts.
    #[serde(default)]
    pub start_moving_ms: Option<u64>,
}

/// Simple 2D point in meters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

fn default_packet_size() -> usize {
    448
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_gps_accuracy_ns() -> u64 {
    10_000
}

fn default_max_tx_delay_ms() -> u64 {
    10
}

fn default_start_offset_ms() -> u64 {
    1000
}

fn default_propagation_delay_us() -> u64 {
    5
}

impl PvdParameters {
    pub fn total_sim_time(&self) -> Duration {
        Duration::from_millis(self.total_sim_time_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn gps_accuracy(&self) -> Duration {
        Duration::from_nanos(self.gps_accuracy_ns)
    }

    pub fn max_tx_delay(&self) -> Duration {
        Duration::from_millis(self.max_tx_delay_ms)
    }

    pub fn start_offset(&self) -> Duration {
        Duration::from_millis(self.start_offset_ms)
    }
}

impl RadioParameters {
    pub fn propagation_delay(&self) -> Duration {
        Duration::from_micros(self.propagation_delay_us)
    }
}

impl Scenario {
    /// Validate the scenario, rejecting configurations that would produce an
    /// undefined or degenerate run.
    ///
    /// Checks for common issues:
    /// - Empty or oversized node list, duplicate or non-dense node IDs
    /// - Positions outside world bounds or non-finite
    /// - Interval not longer than the maximum transmit delay (the re-arm
    ///   subtraction would reach into the previous interval)
    /// - Total time not covering the start offset (zero packet budget)
    /// - Non-ascending range thresholds, non-positive delivery range
    pub fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("scenario must contain at least one node".to_string());
        }
        if self.nodes.len() > MAX_NODES {
            return Err(format!(
                "node count {} exceeds maximum of {}",
                self.nodes.len(),
                MAX_NODES
            ));
        }

        // Node IDs must be unique and dense (0..n), they double as indices
        let mut seen = vec![false; self.nodes.len()];
        for node in &self.nodes {
            let id = node.node_id as usize;
            if id >= self.nodes.len() {
                return Err(format!(
                    "node_id {} outside dense range 0..{}",
                    node.node_id,
                    self.nodes.len()
                ));
            }
            if seen[id] {
                return Err(format!("duplicate node_id found: {}", node.node_id));
            }
            seen[id] = true;
        }

        for node in &self.nodes {
            let p = &node.position;
            if !p.x.is_finite() || !p.y.is_finite() || p.x < 0.0 || p.y < 0.0 {
                return Err(format!(
                    "node {} position ({}, {}) must be finite and non-negative",
                    node.node_id, p.x, p.y
                ));
            }
            if p.x > MAX_WORLD_COORD || p.y > MAX_WORLD_COORD {
                return Err(format!(
                    "node {} position ({}, {}) exceeds world bounds (0-{})",
                    node.node_id, p.x, p.y, MAX_WORLD_COORD
                ));
            }
        }

        if self.pvd.packet_size == 0 {
            return Err("packet_size must be positive".to_string());
        }
        if self.pvd.interval_ms == 0 {
            return Err("interval_ms must be positive".to_string());
        }
        if self.pvd.interval() <= self.pvd.max_tx_delay() {
            return Err(format!(
                "interval ({} ms) must exceed max_tx_delay ({} ms)",
                self.pvd.interval_ms, self.pvd.max_tx_delay_ms
            ));
        }
        if self.pvd.total_sim_time() <= self.pvd.start_offset() {
            return Err(format!(
                "total_sim_time ({} ms) must exceed start_offset ({} ms)",
                self.pvd.total_sim_time_ms, self.pvd.start_offset_ms
            ));
        }

        if !self.pvd.ranges_m.is_empty() {
            RangeTable::from_ranges(&self.pvd.ranges_m)?;
        }

        if !self.radio.delivery_range_m.is_finite() || self.radio.delivery_range_m <= 0.0 {
            return Err("delivery_range_m must be a positive finite distance".to_string());
        }

        Ok(())
    }
}

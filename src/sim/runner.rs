//! Scenario runner: builds the collaborators, installs the applications,
//! schedules the mobility-start triggers and drives the event queue to the
//! end of the run.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use anyhow::anyhow;
use log::{debug, info};

use crate::engine::EventQueue;
use crate::pvd::app::PvdConfig;
use crate::pvd::helper::{self, PvdHelper};
use crate::pvd::ranges::RangeTable;
use crate::pvd::stats::DeliveryStats;

use super::registry::{MovementGate, NodeRegistry, ScenarioRegistry};
use super::scenario::Scenario;
use super::transport::BroadcastBus;

/// Delivery outcome of one range bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketReport {
    /// Outer radius of the bucket in meters.
    pub range_m: f64,
    /// Receptions the transmitters expected inside this bucket.
    pub expected: u64,
    /// Receptions that actually arrived inside this bucket.
    pub in_range: u64,
}

impl BucketReport {
    /// Actual over expected; derived here on the reporting side, never inside
    /// the counters.
    pub fn delivery_ratio(&self) -> Option<f64> {
        if self.expected == 0 {
            None
        } else {
            Some(self.in_range as f64 / self.expected as f64)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub actual_rx: u64,
    pub buckets: Vec<BucketReport>,
}

/// Run one scenario to completion and return the delivery report.
pub fn run(scenario: &Scenario) -> anyhow::Result<SimulationReport> {
    scenario.validate().map_err(|e| anyhow!(e))?;

    let ranges = if scenario.pvd.ranges_m.is_empty() {
        helper::default_range_table()
    } else {
        RangeTable::from_ranges(&scenario.pvd.ranges_m).map_err(|e| anyhow!(e))?
    };
    let range_count = ranges.len();

    let engine = EventQueue::new();
    let gate = MovementGate::new(scenario.nodes.len());
    let registry: Rc<dyn NodeRegistry> = ScenarioRegistry::from_scenario(scenario, gate.clone());
    let bus = BroadcastBus::new(
        engine.clone(),
        registry.clone(),
        scenario.radio.delivery_range_m,
        scenario.radio.propagation_delay(),
    );
    let stats = Rc::new(RefCell::new(DeliveryStats::new(range_count)));
    stats.borrow_mut().set_logging(scenario.pvd.log_tx_count);

    let template = PvdConfig {
        node_id: 0,
        total_sim_time: scenario.pvd.total_sim_time(),
        start_offset: scenario.pvd.start_offset(),
        packet_size: scenario.pvd.packet_size,
        interval: scenario.pvd.interval(),
        gps_accuracy: scenario.pvd.gps_accuracy(),
        ranges: ranges.clone(),
        channel_access: scenario.pvd.channel_access,
        max_tx_delay: scenario.pvd.max_tx_delay(),
    };

    let apps = PvdHelper::install(
        &template,
        scenario.seed,
        &engine,
        &registry,
        &gate,
        &bus,
        &stats,
    );
    let streams_used = apps.assign_streams(0);
    debug!("assigned {} random streams", streams_used);

    // Mobility-start triggers flip the movement gate at their scheduled times
    for node in &scenario.nodes {
        if let Some(start_ms) = node.start_moving_ms {
            let gate = gate.clone();
            let node_id = node.node_id;
            engine.schedule_at(Duration::from_millis(start_ms), move || {
                debug!("node {}: started moving", node_id);
                gate.set_moving(node_id);
            });
        }
    }

    info!(
        "running {} nodes for {} ms",
        scenario.nodes.len(),
        scenario.pvd.total_sim_time_ms
    );
    let fired = engine.run_until(scenario.pvd.total_sim_time());
    debug!("simulation finished after {} events", fired);

    let stats = stats.borrow();
    let buckets = (1..=range_count)
        .map(|bucket| BucketReport {
            range_m: ranges.threshold_sq(bucket).sqrt(),
            expected: stats.expected_rx(bucket),
            in_range: stats.actual_rx_in_range(bucket),
        })
        .collect();

    Ok(SimulationReport {
        tx_packets: stats.tx_packets(),
        tx_bytes: stats.tx_bytes(),
        actual_rx: stats.actual_rx(),
        buckets,
    })
}

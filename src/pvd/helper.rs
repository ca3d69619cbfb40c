//! Installation helper: one `PvdApplication` per node, shared statistics,
//! stream assignment and lifecycle scheduling for a whole node set.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use log::debug;

use crate::engine::EventQueue;
use crate::sim::registry::{MovementGate, NodeRegistry};
use crate::sim::transport::BroadcastBus;

use super::app::{PvdApplication, PvdConfig};
use super::ranges::RangeTable;
use super::stats::DeliveryStats;

/// Default reception-range thresholds in meters, innermost first.
pub const DEFAULT_RANGES_M: [f64; 10] = [
    50.0, 100.0, 200.0, 300.0, 400.0, 500.0, 600.0, 800.0, 1000.0, 1500.0,
];

pub struct PvdHelper {
    apps: Vec<Rc<RefCell<PvdApplication>>>,
}

impl PvdHelper {
    /// Install one application per registry node, all sharing `stats`. The
    /// `template` carries every parameter except `node_id`, which is filled
    /// per node. Applications start at time zero (each delays its first
    /// transmission by its start offset plus jitter) and stop at
    /// `total_sim_time`.
    pub fn install(
        template: &PvdConfig,
        seed: u64,
        engine: &Rc<EventQueue>,
        registry: &Rc<dyn NodeRegistry>,
        gate: &Rc<MovementGate>,
        bus: &Rc<BroadcastBus>,
        stats: &Rc<RefCell<DeliveryStats>>,
    ) -> Self {
        let mut apps = Vec::with_capacity(registry.node_count());
        for node_id in 0..registry.node_count() as u32 {
            let config = PvdConfig {
                node_id,
                ..template.clone()
            };
            let app = PvdApplication::install(
                config,
                seed,
                engine.clone(),
                registry.clone(),
                gate.clone(),
                bus.clone(),
                stats.clone(),
            );

            {
                let app = app.clone();
                engine.schedule_at(Duration::ZERO, move || {
                    PvdApplication::start(&app);
                });
            }
            {
                let app = app.clone();
                engine.schedule_at(template.total_sim_time, move || {
                    app.borrow_mut().stop();
                });
            }

            apps.push(app);
        }
        debug!("installed {} PVD applications", apps.len());
        Self { apps }
    }

    /// Assign consecutive random stream indices starting at `base` to every
    /// installed application. Returns the number of indices consumed.
    /// Re-running with the same base re-keys every stream identically, so the
    /// partition stays reproducible and non-overlapping.
    pub fn assign_streams(&self, base: u64) -> u64 {
        let mut current = base;
        for app in &self.apps {
            current += app.borrow_mut().assign_streams(current);
        }
        current - base
    }

    pub fn apps(&self) -> &[Rc<RefCell<PvdApplication>>] {
        &self.apps
    }
}

/// Range table used when the scenario does not override the thresholds.
pub fn default_range_table() -> RangeTable {
    RangeTable::from_ranges(&DEFAULT_RANGES_M).expect("default ranges are valid")
}

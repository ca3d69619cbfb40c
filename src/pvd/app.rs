//! The PVD application: periodic jittered broadcast with distance-bucketed
//! delivery accounting.
//!
//! Each participating node runs one `PvdApplication`. Its scheduler walks the
//! states `Idle -> Armed -> Firing -> (Armed | Done)`:
//! - `start` computes the packet budget, draws the startup jitter (GPS clock
//!   drift plus tx delay) and arms the first fire.
//! - Each fire transmits if the node is moving, books the expected receptions
//!   for every other moving node against the range table, and re-arms with a
//!   non-cumulative jitter offset until the budget is exhausted.
//! - On budget exhaustion the transmit channel is closed and the application
//!   is done.
//!
//! The reception side resolves the sender address, counts the raw arrival,
//! and books the in-range buckets when the receiver is moving. The raw
//! arrival counter is deliberately NOT gated on the movement flag while the
//! bucketed one is: total packets physically arriving vs. meaningfully
//! analyzable arrivals.

use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Duration;

use log::{debug, trace};
use serde::Deserialize;

use crate::engine::{EventHandle, EventQueue};
use crate::sim::registry::{MovementGate, NodeRegistry};
use crate::sim::transport::BroadcastBus;

use super::jitter::JitterClock;
use super::ranges::RangeTable;
use super::stats::DeliveryStats;

/// WAVE channel access mode. Carried in the configuration and logged at
/// start; the broadcast accounting itself does not branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelAccess {
    #[default]
    Continuous,
    Alternating,
}

/// Per-node application parameters.
#[derive(Clone)]
pub struct PvdConfig {
    pub node_id: u32,
    pub total_sim_time: Duration,
    /// Quiet period before the first transmission window.
    pub start_offset: Duration,
    pub packet_size: usize,
    pub interval: Duration,
    pub gps_accuracy: Duration,
    pub ranges: RangeTable,
    pub channel_access: ChannelAccess,
    pub max_tx_delay: Duration,
}

#[derive(Clone, Copy)]
enum AppState {
    Idle,
    Armed(EventHandle),
    Done,
}

pub struct PvdApplication {
    config: PvdConfig,
    seed: u64,
    stream: u64,
    jitter: JitterClock,
    remaining_packets: u32,
    state: AppState,
    engine: Rc<EventQueue>,
    registry: Rc<dyn NodeRegistry>,
    gate: Rc<MovementGate>,
    bus: Rc<BroadcastBus>,
    stats: Rc<RefCell<DeliveryStats>>,
}

impl PvdApplication {
    /// Create the application and register its receive handler on the bus.
    /// The handler holds a weak reference, so a torn-down application turns
    /// pending deliveries into no-ops.
    pub fn install(
        config: PvdConfig,
        seed: u64,
        engine: Rc<EventQueue>,
        registry: Rc<dyn NodeRegistry>,
        gate: Rc<MovementGate>,
        bus: Rc<BroadcastBus>,
        stats: Rc<RefCell<DeliveryStats>>,
    ) -> Rc<RefCell<Self>> {
        let jitter = JitterClock::new(seed, config.gps_accuracy, config.max_tx_delay);
        let node_id = config.node_id;
        let app = Rc::new(RefCell::new(Self {
            config,
            seed,
            stream: 0,
            jitter,
            remaining_packets: 0,
            state: AppState::Idle,
            engine,
            registry,
            gate,
            bus: bus.clone(),
            stats,
        }));

        let weak = Rc::downgrade(&app);
        bus.on_receive(node_id, move |payload_size, sender_addr| {
            if let Some(app) = weak.upgrade() {
                app.borrow_mut().receive(payload_size, sender_addr);
            }
        });

        app
    }

    /// Replace the configuration before start. Rebuilds the jitter clock from
    /// the stored seed and stream, so configuring twice with identical
    /// arguments yields identical scheduled behavior.
    pub fn setup(&mut self, config: PvdConfig) {
        assert!(
            matches!(self.state, AppState::Idle),
            "setup after start is a setup-order error"
        );
        self.jitter = JitterClock::new(self.seed, config.gps_accuracy, config.max_tx_delay);
        self.jitter.set_stream(self.stream);
        self.config = config;
    }

    /// Assign this application's random stream index. Returns the number of
    /// stream indices consumed (always 1). Idempotent for a fixed index.
    pub fn assign_streams(&mut self, stream: u64) -> u64 {
        self.stream = stream;
        self.jitter.set_stream(stream);
        1
    }

    /// Lifecycle hook: compute the packet budget and arm the first fire at
    /// `start_offset + clock_drift + tx_delay` relative to now.
    pub fn start(app: &Rc<RefCell<Self>>) {
        let mut this = app.borrow_mut();
        if !matches!(this.state, AppState::Idle) {
            debug!("node {}: start ignored, already started", this.config.node_id);
            return;
        }

        let tx_window = this.config.total_sim_time - this.config.start_offset;
        this.remaining_packets =
            (tx_window.as_nanos() / this.config.interval.as_nanos()) as u32;

        let first_fire = this.config.start_offset + this.jitter.startup_offset();
        debug!(
            "node {}: armed with {} packets, first fire in {:?} ({:?} channel access)",
            this.config.node_id, this.remaining_packets, first_fire, this.config.channel_access
        );

        let engine = this.engine.clone();
        let handle = Self::arm(app, &engine, first_fire);
        this.state = AppState::Armed(handle);
    }

    /// Lifecycle hook: cancel any pending fire and become terminal.
    pub fn stop(&mut self) {
        if let AppState::Armed(handle) = self.state {
            self.engine.cancel(handle);
        }
        self.state = AppState::Done;
    }

    /// Schedule the next fire. The callback holds a weak reference so that a
    /// dangling event after teardown is a no-op.
    fn arm(app: &Rc<RefCell<Self>>, engine: &EventQueue, delay: Duration) -> EventHandle {
        let weak = Rc::downgrade(app);
        engine.schedule_in(delay, move || {
            if let Some(app) = weak.upgrade() {
                Self::fire(&app);
            }
        })
    }

    /// One scheduled fire. Consumes one unit of packet budget whether or not
    /// the node transmits; an unmoving sender skips the send and the expected
    /// accounting but still re-arms on schedule.
    fn fire(app: &Rc<RefCell<Self>>) {
        let mut this = app.borrow_mut();

        if this.remaining_packets == 0 {
            this.bus.close(this.config.node_id);
            this.state = AppState::Done;
            debug!("node {}: packet budget exhausted", this.config.node_id);
            return;
        }

        if this.gate.is_moving(this.config.node_id) {
            this.transmit();
        }

        this.remaining_packets -= 1;
        let interval = this.config.interval;
        let offset = this.jitter.rearm_offset(interval);
        let engine = this.engine.clone();
        let handle = Self::arm(app, &engine, offset);
        this.state = AppState::Armed(handle);
    }

    /// Send one broadcast and book the expected receptions: every other
    /// moving node at a positive distance, in every bucket containing it.
    fn transmit(&mut self) {
        let node_id = self.config.node_id;
        self.bus.send_broadcast(node_id, self.config.packet_size);

        let mut stats = self.stats.borrow_mut();
        stats.inc_tx(self.config.packet_size);

        for other in 0..self.registry.node_count() as u32 {
            if other == node_id || !self.gate.is_moving(other) {
                continue;
            }
            let dist_sq = self.registry.squared_distance(node_id, other);
            // Zero distance means the peer is not yet positioned; it is a
            // candidate for neither expected nor in-range accounting
            if dist_sq > 0.0 {
                for bucket in self.config.ranges.buckets_containing(dist_sq) {
                    stats.inc_expected_rx(bucket);
                }
            }
        }
    }

    /// Inbound datagram handler. Counts the raw arrival unconditionally; the
    /// bucketed in-range accounting requires the receiver to be moving and
    /// the distance to be positive.
    fn receive(&mut self, _payload_size: usize, sender_addr: Ipv4Addr) {
        let node_id = self.config.node_id;
        let Some(sender) = self.registry.resolve_address(sender_addr) else {
            trace!(
                "node {}: dropping packet from unknown address {}",
                node_id, sender_addr
            );
            return;
        };
        if sender == node_id {
            return;
        }

        let mut stats = self.stats.borrow_mut();
        stats.inc_actual_rx();

        if self.gate.is_moving(node_id) {
            let dist_sq = self.registry.squared_distance(node_id, sender);
            if dist_sq > 0.0 {
                for bucket in self.config.ranges.buckets_containing(dist_sq) {
                    stats.inc_actual_rx_in_range(bucket);
                }
            }
        }
    }

    pub fn remaining_packets(&self) -> u32 {
        self.remaining_packets
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, AppState::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::registry::ScenarioRegistry;
    use crate::sim::scenario::Point;

    struct Harness {
        engine: Rc<EventQueue>,
        registry: Rc<ScenarioRegistry>,
        gate: Rc<MovementGate>,
        bus: Rc<BroadcastBus>,
        stats: Rc<RefCell<DeliveryStats>>,
        ranges: RangeTable,
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn harness(positions: &[(f64, f64)], ranges_m: &[f64], delivery_range_m: f64) -> Harness {
        let points: Vec<Point> = positions.iter().map(|&(x, y)| Point { x, y }).collect();
        let engine = EventQueue::new();
        let gate = MovementGate::new(points.len());
        let registry = ScenarioRegistry::new(points, gate.clone());
        let bus = BroadcastBus::new(
            engine.clone(),
            registry.clone(),
            delivery_range_m,
            Duration::from_micros(5),
        );
        let ranges = RangeTable::from_ranges(ranges_m).unwrap();
        let stats = Rc::new(RefCell::new(DeliveryStats::new(ranges.len())));
        Harness {
            engine,
            registry,
            gate,
            bus,
            stats,
            ranges,
        }
    }

    fn config(h: &Harness, node_id: u32, total: Duration) -> PvdConfig {
        PvdConfig {
            node_id,
            total_sim_time: total,
            start_offset: secs(1),
            packet_size: 448,
            interval: Duration::from_millis(1000),
            gps_accuracy: Duration::from_nanos(10_000),
            ranges: h.ranges.clone(),
            channel_access: ChannelAccess::Continuous,
            max_tx_delay: Duration::from_millis(10),
        }
    }

    fn install(h: &Harness, node_id: u32, total: Duration) -> Rc<RefCell<PvdApplication>> {
        PvdApplication::install(
            config(h, node_id, total),
            1,
            h.engine.clone(),
            h.registry.clone(),
            h.gate.clone(),
            h.bus.clone(),
            h.stats.clone(),
        )
    }

    #[test]
    fn expected_counts_follow_nested_buckets() {
        // Receivers at 40, 90 and 200 m against rings of 50 and 100 m:
        // the 40 m node lands in both buckets, the 90 m node only in the
        // outer one, the 200 m node in neither.
        let h = harness(
            &[(0.0, 0.0), (40.0, 0.0), (90.0, 0.0), (200.0, 0.0)],
            &[50.0, 100.0],
            1000.0,
        );
        for id in 0..4 {
            h.gate.set_moving(id);
        }

        // Budget of exactly one packet: total = offset + interval
        let app = install(&h, 0, secs(2));
        PvdApplication::start(&app);
        h.engine.run_until(secs(2));

        let stats = h.stats.borrow();
        assert_eq!(stats.tx_packets(), 1);
        assert_eq!(stats.expected_rx(1), 1);
        assert_eq!(stats.expected_rx(2), 2);
    }

    #[test]
    fn budget_reaches_exactly_zero() {
        // 10 s total minus 1 s offset at 1 s interval: exactly 9 packets
        let h = harness(&[(0.0, 0.0), (40.0, 0.0)], &[50.0], 1000.0);
        h.gate.set_moving(0);
        h.gate.set_moving(1);

        let app = install(&h, 0, secs(10));
        PvdApplication::start(&app);
        assert_eq!(app.borrow().remaining_packets(), 9);

        h.engine.run_until(secs(30));
        assert_eq!(app.borrow().remaining_packets(), 0);
        assert!(app.borrow().is_done());
        assert!(!h.bus.is_open(0));
        assert_eq!(h.stats.borrow().tx_packets(), 9);
    }

    #[test]
    fn unmoving_sender_burns_budget_without_transmitting() {
        let h = harness(&[(0.0, 0.0), (40.0, 0.0)], &[50.0], 1000.0);
        // Node 1 moves, the sender never does
        h.gate.set_moving(1);

        let app = install(&h, 0, secs(5));
        PvdApplication::start(&app);
        h.engine.run_until(secs(10));

        assert!(app.borrow().is_done());
        assert_eq!(app.borrow().remaining_packets(), 0);
        let stats = h.stats.borrow();
        assert_eq!(stats.tx_packets(), 0);
        assert_eq!(stats.expected_rx(1), 0);
    }

    #[test]
    fn never_counts_itself() {
        let h = harness(&[(0.0, 0.0)], &[50.0], 1000.0);
        h.gate.set_moving(0);

        let app = install(&h, 0, secs(5));
        PvdApplication::start(&app);
        h.engine.run_until(secs(10));

        let stats = h.stats.borrow();
        assert_eq!(stats.tx_packets(), 4);
        assert_eq!(stats.expected_rx(1), 0);
        assert_eq!(stats.actual_rx(), 0);
    }

    #[test]
    fn raw_arrivals_ignore_movement_but_buckets_require_it() {
        // Node 0 transmits, node 1 only listens and never starts moving:
        // its arrivals count raw but never in-range.
        let h = harness(&[(0.0, 0.0), (40.0, 0.0)], &[50.0, 100.0], 1000.0);
        h.gate.set_moving(0);

        let tx = install(&h, 0, secs(4));
        let _rx = install(&h, 1, secs(4));
        PvdApplication::start(&tx);
        h.engine.run_until(secs(10));

        let stats = h.stats.borrow();
        assert_eq!(stats.tx_packets(), 3);
        assert_eq!(stats.actual_rx(), 3);
        assert_eq!(stats.actual_rx_in_range(1), 0);
        assert_eq!(stats.actual_rx_in_range(2), 0);
        // An unmoving receiver is also not expected to receive anything
        assert_eq!(stats.expected_rx(1), 0);
    }

    #[test]
    fn moving_receiver_books_in_range_buckets() {
        let h = harness(&[(0.0, 0.0), (40.0, 0.0)], &[50.0, 100.0], 1000.0);
        h.gate.set_moving(0);
        h.gate.set_moving(1);

        let tx = install(&h, 0, secs(4));
        let _rx = install(&h, 1, secs(4));
        PvdApplication::start(&tx);
        h.engine.run_until(secs(10));

        let stats = h.stats.borrow();
        assert_eq!(stats.tx_packets(), 3);
        assert_eq!(stats.actual_rx(), 3);
        assert_eq!(stats.actual_rx_in_range(1), 3);
        assert_eq!(stats.actual_rx_in_range(2), 3);
    }

    #[test]
    fn zero_distance_is_excluded_from_both_accountings() {
        // Two co-located nodes: deliveries still happen, raw arrivals still
        // count, but neither expected nor in-range buckets move.
        let h = harness(&[(10.0, 10.0), (10.0, 10.0)], &[50.0], 1000.0);
        h.gate.set_moving(0);
        h.gate.set_moving(1);

        let tx = install(&h, 0, secs(3));
        let _rx = install(&h, 1, secs(3));
        PvdApplication::start(&tx);
        h.engine.run_until(secs(10));

        let stats = h.stats.borrow();
        assert_eq!(stats.tx_packets(), 2);
        assert_eq!(stats.actual_rx(), 2);
        assert_eq!(stats.expected_rx(1), 0);
        assert_eq!(stats.actual_rx_in_range(1), 0);
    }

    #[test]
    fn unknown_sender_address_is_ignored() {
        let h = harness(&[(0.0, 0.0), (40.0, 0.0)], &[50.0], 1000.0);
        h.gate.set_moving(0);
        let app = install(&h, 0, secs(5));

        app.borrow_mut()
            .receive(448, Ipv4Addr::new(192, 168, 77, 1));

        let stats = h.stats.borrow();
        assert_eq!(stats.actual_rx(), 0);
        assert_eq!(stats.actual_rx_in_range(1), 0);
    }

    #[test]
    fn stop_cancels_pending_fire() {
        let h = harness(&[(0.0, 0.0), (40.0, 0.0)], &[50.0], 1000.0);
        h.gate.set_moving(0);
        h.gate.set_moving(1);

        let app = install(&h, 0, secs(10));
        PvdApplication::start(&app);
        h.engine.run_until(secs(3));
        let sent_before = h.stats.borrow().tx_packets();
        assert!(sent_before >= 2);

        app.borrow_mut().stop();
        h.engine.run_until(secs(10));
        assert_eq!(h.stats.borrow().tx_packets(), sent_before);
        assert!(app.borrow().is_done());
    }

    #[test]
    fn identical_setup_replays_identical_schedule() {
        let fires = |seed: u64| -> (u64, u64) {
            let h = harness(&[(0.0, 0.0), (40.0, 0.0)], &[50.0], 1000.0);
            h.gate.set_moving(0);
            h.gate.set_moving(1);
            let app = PvdApplication::install(
                config(&h, 0, secs(10)),
                seed,
                h.engine.clone(),
                h.registry.clone(),
                h.gate.clone(),
                h.bus.clone(),
                h.stats.clone(),
            );
            // Setting up twice with identical arguments must not change the run
            app.borrow_mut().setup(config(&h, 0, secs(10)));
            app.borrow_mut().setup(config(&h, 0, secs(10)));
            PvdApplication::start(&app);
            h.engine.run_until(secs(10));
            let stats = h.stats.borrow();
            (stats.tx_packets(), stats.expected_rx(1))
        };

        assert_eq!(fires(21), fires(21));
    }
}

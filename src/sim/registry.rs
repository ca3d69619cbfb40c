//! Node identity, position and movement lookups.
//!
//! `NodeRegistry` is the capability the PVD application uses instead of
//! reaching into the simulator's object graph: address resolution, pairwise
//! distances, and the movement flag. `MovementGate` is the shared per-node
//! "has begun moving" map, injected into every application instance rather
//! than living in a global.

use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

use super::geometry::distance_sq;
use super::scenario::{Point, Scenario};

/// First address of the simulated broadcast subnet; node N gets base + N + 1.
const SUBNET_BASE: Ipv4Addr = Ipv4Addr::new(10, 1, 0, 0);

/// Shared per-node liveness flags. A node's flag flips to true when its
/// mobility starts; transmissions and bucketed receptions are only counted
/// for flagged nodes.
pub struct MovementGate {
    flags: RefCell<Vec<bool>>,
}

impl MovementGate {
    pub fn new(node_count: usize) -> Rc<Self> {
        Rc::new(Self {
            flags: RefCell::new(vec![false; node_count]),
        })
    }

    pub fn set_moving(&self, node_id: u32) {
        self.flags.borrow_mut()[node_id as usize] = true;
    }

    pub fn is_moving(&self, node_id: u32) -> bool {
        self.flags.borrow()[node_id as usize]
    }
}

/// Lookup capability handed to every application instance.
pub trait NodeRegistry {
    fn node_count(&self) -> usize;

    /// Network address of `node_id`.
    fn address_of(&self, node_id: u32) -> Ipv4Addr;

    /// Reverse lookup of a sender address. Returns `None` for addresses not
    /// belonging to any participating node. Linear scan; node counts are
    /// simulation-scale, not line-rate.
    fn resolve_address(&self, addr: Ipv4Addr) -> Option<u32>;

    /// Squared distance in meters between two nodes.
    ///
    /// # Panics
    ///
    /// Panics if either node has no installed position. That is a setup error
    /// upstream (mobility must be installed on every participating node
    /// before the application starts) and aborts the run.
    fn squared_distance(&self, a: u32, b: u32) -> f64;

    fn is_moving(&self, node_id: u32) -> bool;
}

/// Registry backed by the static node placement of a scenario.
pub struct ScenarioRegistry {
    positions: Vec<Point>,
    addresses: Vec<Ipv4Addr>,
    gate: Rc<MovementGate>,
}

impl ScenarioRegistry {
    pub fn new(positions: Vec<Point>, gate: Rc<MovementGate>) -> Rc<Self> {
        let addresses = (0..positions.len())
            .map(|i| Ipv4Addr::from(u32::from(SUBNET_BASE) + i as u32 + 1))
            .collect();
        Rc::new(Self {
            positions,
            addresses,
            gate,
        })
    }

    /// Build the registry from a validated scenario: node IDs are dense, so
    /// position slot N belongs to node N.
    pub fn from_scenario(scenario: &Scenario, gate: Rc<MovementGate>) -> Rc<Self> {
        let mut positions = vec![Point { x: 0.0, y: 0.0 }; scenario.nodes.len()];
        for node in &scenario.nodes {
            positions[node.node_id as usize] = node.position.clone();
        }
        Self::new(positions, gate)
    }

    fn position(&self, node_id: u32) -> &Point {
        self.positions.get(node_id as usize).unwrap_or_else(|| {
            panic!(
                "node {} has no installed position; mobility must be set up before start",
                node_id
            )
        })
    }
}

impl NodeRegistry for ScenarioRegistry {
    fn node_count(&self) -> usize {
        self.positions.len()
    }

    fn address_of(&self, node_id: u32) -> Ipv4Addr {
        self.addresses[node_id as usize]
    }

    fn resolve_address(&self, addr: Ipv4Addr) -> Option<u32> {
        self.addresses
            .iter()
            .position(|&a| a == addr)
            .map(|i| i as u32)
    }

    fn squared_distance(&self, a: u32, b: u32) -> f64 {
        distance_sq(self.position(a), self.position(b))
    }

    fn is_moving(&self, node_id: u32) -> bool {
        self.gate.is_moving(node_id)
    }
}

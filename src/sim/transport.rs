//! Simulated broadcast transport.
//!
//! UDP-shaped broadcast datagrams with no payload semantics: only size and
//! delivery matter. A send reaches every other node within the flat delivery
//! range; each delivery is queued on the event engine with a fixed propagation
//! delay and invokes the receiver's handler with the payload size and the
//! sender's address. No RF propagation, PHY or MAC is modeled here.

use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::Duration;

use log::trace;

use crate::engine::EventQueue;

use super::registry::NodeRegistry;

type ReceiveHandler = Rc<dyn Fn(usize, Ipv4Addr)>;

pub struct BroadcastBus {
    engine: Rc<EventQueue>,
    registry: Rc<dyn NodeRegistry>,
    delivery_range_sq: f64,
    propagation_delay: Duration,
    handlers: RefCell<Vec<Option<ReceiveHandler>>>,
    // Per-node transmit channel; closed when the packet budget is exhausted
    open: RefCell<Vec<bool>>,
}

impl BroadcastBus {
    pub fn new(
        engine: Rc<EventQueue>,
        registry: Rc<dyn NodeRegistry>,
        delivery_range_m: f64,
        propagation_delay: Duration,
    ) -> Rc<Self> {
        let node_count = registry.node_count();
        Rc::new(Self {
            engine,
            registry,
            delivery_range_sq: delivery_range_m * delivery_range_m,
            propagation_delay,
            handlers: RefCell::new(vec![None; node_count]),
            open: RefCell::new(vec![true; node_count]),
        })
    }

    /// Register the receive callback for `node_id`, replacing any previous one.
    pub fn on_receive(&self, node_id: u32, handler: impl Fn(usize, Ipv4Addr) + 'static) {
        self.handlers.borrow_mut()[node_id as usize] = Some(Rc::new(handler));
    }

    /// Broadcast a datagram of `payload_size` bytes from `sender`. Queues one
    /// delivery per in-range node with a registered handler; the sender never
    /// receives its own broadcast. Sends on a closed channel are dropped.
    pub fn send_broadcast(&self, sender: u32, payload_size: usize) {
        if !self.open.borrow()[sender as usize] {
            trace!("node {}: send on closed channel dropped", sender);
            return;
        }

        let sender_addr = self.registry.address_of(sender);
        let handlers = self.handlers.borrow();
        for target in 0..self.registry.node_count() as u32 {
            if target == sender {
                continue;
            }
            if self.registry.squared_distance(sender, target) > self.delivery_range_sq {
                continue;
            }
            if let Some(handler) = handlers[target as usize].clone() {
                self.engine.schedule_in(self.propagation_delay, move || {
                    handler(payload_size, sender_addr);
                });
            }
        }
    }

    /// Close the transmit channel of `node_id`; later sends become no-ops.
    pub fn close(&self, node_id: u32) {
        self.open.borrow_mut()[node_id as usize] = false;
    }

    pub fn is_open(&self, node_id: u32) -> bool {
        self.open.borrow()[node_id as usize]
    }
}

//! Delivery accounting shared by every node's application instance.
//!
//! Pure increment-only counters plus read accessors. Derived values such as
//! delivery ratios are computed by the reporting side, never here. The
//! simulation is single-threaded cooperative, so one logical writer mutates at
//! a time and no locking is needed; the runner shares the stats via
//! `Rc<RefCell<..>>`.

/// How often a transmit-count log line is emitted (every Nth packet).
const TX_LOG_INTERVAL: u64 = 1000;

pub struct DeliveryStats {
    tx_packets: u64,
    tx_bytes: u64,
    // Per-bucket counters, index 0 holds bucket 1
    expected_rx: Vec<u64>,
    actual_rx: u64,
    actual_rx_in_range: Vec<u64>,
    logging: bool,
}

impl DeliveryStats {
    pub fn new(bucket_count: usize) -> Self {
        Self {
            tx_packets: 0,
            tx_bytes: 0,
            expected_rx: vec![0; bucket_count],
            actual_rx: 0,
            actual_rx_in_range: vec![0; bucket_count],
            logging: false,
        }
    }

    pub fn set_logging(&mut self, enabled: bool) {
        self.logging = enabled;
    }

    /// Record one transmitted packet of `bytes` payload.
    pub fn inc_tx(&mut self, bytes: usize) {
        self.tx_packets += 1;
        self.tx_bytes += bytes as u64;
        if self.logging && self.tx_packets % TX_LOG_INTERVAL == 0 {
            log::info!("sent PVD packet #{}", self.tx_packets);
        }
    }

    /// Record that one receiver inside 1-based `bucket` should see the packet.
    pub fn inc_expected_rx(&mut self, bucket: usize) {
        self.expected_rx[bucket - 1] += 1;
    }

    /// Record one arrived packet, independent of any range or movement check.
    pub fn inc_actual_rx(&mut self) {
        self.actual_rx += 1;
    }

    /// Record one arrived packet whose sender-receiver distance falls inside
    /// 1-based `bucket`.
    pub fn inc_actual_rx_in_range(&mut self, bucket: usize) {
        self.actual_rx_in_range[bucket - 1] += 1;
    }

    pub fn tx_packets(&self) -> u64 {
        self.tx_packets
    }

    pub fn tx_bytes(&self) -> u64 {
        self.tx_bytes
    }

    pub fn actual_rx(&self) -> u64 {
        self.actual_rx
    }

    pub fn expected_rx(&self, bucket: usize) -> u64 {
        self.expected_rx[bucket - 1]
    }

    pub fn actual_rx_in_range(&self, bucket: usize) -> u64 {
        self.actual_rx_in_range[bucket - 1]
    }

    pub fn bucket_count(&self) -> usize {
        self.expected_rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let mut stats = DeliveryStats::new(3);

        stats.inc_tx(448);
        stats.inc_tx(448);
        stats.inc_expected_rx(1);
        stats.inc_expected_rx(3);
        stats.inc_expected_rx(3);
        stats.inc_actual_rx();
        stats.inc_actual_rx_in_range(2);

        assert_eq!(stats.tx_packets(), 2);
        assert_eq!(stats.tx_bytes(), 896);
        assert_eq!(stats.expected_rx(1), 1);
        assert_eq!(stats.expected_rx(2), 0);
        assert_eq!(stats.expected_rx(3), 2);
        assert_eq!(stats.actual_rx(), 1);
        assert_eq!(stats.actual_rx_in_range(1), 0);
        assert_eq!(stats.actual_rx_in_range(2), 1);
        assert_eq!(stats.bucket_count(), 3);
    }

    #[test]
    #[should_panic]
    fn bucket_zero_is_rejected() {
        // Buckets are 1-based; index 0 is a caller bug.
        let mut stats = DeliveryStats::new(2);
        stats.inc_expected_rx(0);
    }
}

//! Transmit-time jitter: GPS clock drift plus a bounded random tx delay.
//!
//! Vehicles sync their clocks to GPS, which is only accurate to some bound, so
//! the first transmission drifts off the nominal interval boundary by a random
//! amount. On top of that, every transmission is staggered by a random delay
//! in `[0, max_tx_delay]` so that nodes sharing a GPS-aligned schedule do not
//! all key up at once.
//!
//! The previous delay is subtracted before adding a fresh one on each re-arm,
//! which keeps the long-run average fire period exactly equal to the nominal
//! interval. Over N re-arms the scheduled offsets telescope to
//! `N * interval + delay_N - delay_0` instead of accumulating every delay.

use std::time::Duration;

use crate::random::UniformStream;

pub struct JitterClock {
    rng: UniformStream,
    gps_accuracy: Duration,
    max_tx_delay: Duration,
    previous_delay: Duration,
}

impl JitterClock {
    pub fn new(seed: u64, gps_accuracy: Duration, max_tx_delay: Duration) -> Self {
        Self {
            rng: UniformStream::new(seed),
            gps_accuracy,
            max_tx_delay,
            previous_delay: Duration::ZERO,
        }
    }

    /// Re-key the underlying random stream for reproducible replay.
    pub fn set_stream(&mut self, stream: u64) {
        self.rng.set_stream(stream);
    }

    fn uniform_duration(&mut self, bound: Duration) -> Duration {
        Duration::from_nanos(self.rng.uniform(0, bound.as_nanos() as u64))
    }

    /// Offset of the first fire relative to the scenario start boundary:
    /// clock drift in `[0, gps_accuracy]` plus tx delay in `[0, max_tx_delay]`.
    pub fn startup_offset(&mut self) -> Duration {
        let drift = self.uniform_duration(self.gps_accuracy);
        let delay = self.uniform_duration(self.max_tx_delay);
        self.previous_delay = delay;
        drift + delay
    }

    /// Offset from the current fire to the next one:
    /// `interval - previous_delay + new_delay`.
    ///
    /// Requires `interval > max_tx_delay`, which the scenario validation
    /// enforces; otherwise the subtraction could reach into the previous
    /// interval.
    pub fn rearm_offset(&mut self, interval: Duration) -> Duration {
        let delay = self.uniform_duration(self.max_tx_delay);
        let offset = interval - self.previous_delay + delay;
        self.previous_delay = delay;
        offset
    }

    /// Delay chosen for the most recent fire; always in `[0, max_tx_delay]`.
    pub fn previous_delay(&self) -> Duration {
        self.previous_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(100);
    const MAX_DELAY: Duration = Duration::from_millis(10);

    fn clock(seed: u64) -> JitterClock {
        JitterClock::new(seed, Duration::from_nanos(10_000), MAX_DELAY)
    }

    #[test]
    fn delays_stay_within_bounds() {
        let mut clock = clock(1);
        let first = clock.startup_offset();
        assert!(first <= Duration::from_nanos(10_000) + MAX_DELAY);
        for _ in 0..1000 {
            clock.rearm_offset(INTERVAL);
            assert!(clock.previous_delay() <= MAX_DELAY);
        }
    }

    #[test]
    fn rearm_offsets_telescope_without_drift() {
        // sum of N re-arm offsets must equal N*interval + delay_N - delay_0,
        // not N*interval + sum(all delays).
        let mut clock = clock(17);
        clock.startup_offset();
        let first_delay = clock.previous_delay();

        let n = 500u32;
        let mut sum = Duration::ZERO;
        for _ in 0..n {
            sum += clock.rearm_offset(INTERVAL);
        }
        assert_eq!(sum + first_delay, INTERVAL * n + clock.previous_delay());
    }

    #[test]
    fn rearm_offset_stays_near_interval() {
        let mut clock = clock(3);
        clock.startup_offset();
        for _ in 0..1000 {
            let offset = clock.rearm_offset(INTERVAL);
            assert!(offset >= INTERVAL - MAX_DELAY);
            assert!(offset <= INTERVAL + MAX_DELAY);
        }
    }

    #[test]
    fn same_stream_replays_the_same_schedule() {
        let mut a = clock(9);
        let mut b = clock(9);
        a.set_stream(4);
        b.set_stream(4);
        assert_eq!(a.startup_offset(), b.startup_offset());
        for _ in 0..32 {
            assert_eq!(a.rearm_offset(INTERVAL), b.rearm_offset(INTERVAL));
        }
    }
}

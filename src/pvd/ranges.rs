//! Concentric reception-range thresholds for delivery analysis.

use std::ops::RangeInclusive;

/// Ordered list of squared distance thresholds defining nested "in range"
/// buckets. Bucket indices are 1-based; bucket 1 is the innermost ring. A
/// receiver inside the 50 m ring is by definition also inside the 100 m,
/// 200 m, ... rings, so membership is inclusive, not exclusive bands.
///
/// Immutable after construction; replacing the table means building a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeTable {
    // Squared thresholds, strictly ascending
    thresholds_sq: Vec<f64>,
}

impl RangeTable {
    /// Build a table from raw distances in meters. Each entry is stored
    /// squared so range checks never need a square root.
    pub fn from_ranges(ranges_m: &[f64]) -> Result<Self, String> {
        if ranges_m.is_empty() {
            return Err("range table must contain at least one threshold".to_string());
        }
        let mut thresholds_sq = Vec::with_capacity(ranges_m.len());
        let mut previous = 0.0f64;
        for &range in ranges_m {
            if !range.is_finite() || range <= 0.0 {
                return Err(format!("range {} must be a positive finite distance", range));
            }
            if range <= previous {
                return Err(format!(
                    "ranges must be strictly ascending, {} follows {}",
                    range, previous
                ));
            }
            previous = range;
            thresholds_sq.push(range * range);
        }
        Ok(Self { thresholds_sq })
    }

    /// Number of buckets in the table.
    pub fn len(&self) -> usize {
        self.thresholds_sq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds_sq.is_empty()
    }

    /// Squared threshold of 1-based `bucket`.
    pub fn threshold_sq(&self, bucket: usize) -> f64 {
        self.thresholds_sq[bucket - 1]
    }

    /// All 1-based bucket indices whose threshold contains `dist_sq`, i.e.
    /// every `i` with `dist_sq <= threshold_sq(i)`. Because the thresholds
    /// ascend, the result is always a contiguous suffix of the table; it is
    /// empty exactly when `dist_sq` exceeds the outermost threshold.
    pub fn buckets_containing(&self, dist_sq: f64) -> RangeInclusive<usize> {
        let first = self.thresholds_sq.partition_point(|&t| t < dist_sq) + 1;
        first..=self.thresholds_sq.len()
    }
}

//! Distance helpers for the flat scenario plane.

use super::scenario::Point;

/// Squared Euclidean distance in meters squared (avoids a sqrt in hot paths).
///
/// Range checks throughout the simulation compare squared distances against
/// squared thresholds, so the square root is never needed.
pub fn distance_sq(a: &Point, b: &Point) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

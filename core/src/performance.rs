//! Performance multiplier consumed by the economy model.
//!
//! Idle staff earn a bonus, saturated staff a penalty:
//!   ratio      = used / max(epsilon, total)
//!   multiplier = clamp(base - slope × ratio, floor, ceiling)

use crate::{capacity::CapacitySnapshot, config::PerformanceCurve};

pub fn performance_multiplier(snapshot: &CapacitySnapshot, curve: &PerformanceCurve, epsilon: f64) -> f64 {
    let ratio = snapshot.load_ratio(epsilon);
    let raw = curve.base - curve.slope * ratio;
    if raw.is_nan() {
        return curve.floor;
    }
    raw.clamp(curve.floor, curve.ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(used: f64, total: f64) -> CapacitySnapshot {
        CapacitySnapshot { used_capacity: used, total_capacity: total, ..CapacitySnapshot::default() }
    }

    #[test]
    fn multiplier_decays_with_load() {
        let curve = PerformanceCurve::default();
        let idle = performance_multiplier(&snapshot(0.0, 10.0), &curve, 1e-9);
        let half = performance_multiplier(&snapshot(5.0, 10.0), &curve, 1e-9);
        let full = performance_multiplier(&snapshot(10.0, 10.0), &curve, 1e-9);
        assert!(idle > half && half > full);
        assert!((half - 1.0).abs() < 1e-12);
    }

    #[test]
    fn multiplier_is_clamped_at_floor() {
        let curve = PerformanceCurve::default();
        assert_eq!(performance_multiplier(&snapshot(50.0, 10.0), &curve, 1e-9), 0.5);
        // Load with no staff at all.
        assert_eq!(performance_multiplier(&snapshot(4.0, 0.0), &curve, 1e-9), 0.5);
    }
}

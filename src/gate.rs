//! Deadband gate suppressing small magnitudes before integration

use nalgebra::Vector3;

/// Zero `value` when its magnitude is below `threshold`.
///
/// A value exactly at the threshold passes through. Non-finite values are
/// treated as noise and gated to zero.
///
/// # Example
/// ```
/// use inertial_pipeline::gate::gate;
///
/// assert_eq!(gate(0.05, 0.1), 0.0);
/// assert_eq!(gate(-0.1, 0.1), -0.1);
/// assert_eq!(gate(0.3, 0.1), 0.3);
/// ```
#[inline]
pub fn gate(value: f64, threshold: f64) -> f64 {
    if !value.is_finite() || value.abs() < threshold {
        0.0
    } else {
        value
    }
}

/// Apply [`gate`] to each axis
#[inline]
pub fn gate_vector(value: Vector3<f64>, threshold: f64) -> Vector3<f64> {
    value.map(|v| gate(v, threshold))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_passes() {
        for threshold in [0.02, 0.1, 1.0] {
            assert_eq!(gate(threshold, threshold), threshold);
            assert_eq!(gate(-threshold, threshold), -threshold);
        }
    }

    #[test]
    fn test_just_below_threshold_is_zeroed() {
        let threshold: f64 = 0.1;
        let below = threshold - f64::EPSILON;
        assert_eq!(gate(below, threshold), 0.0);
        assert_eq!(gate(-below, threshold), 0.0);
        // Next representable value below the threshold
        assert_eq!(gate(f64::from_bits(threshold.to_bits() - 1), threshold), 0.0);
    }

    #[test]
    fn test_zero_threshold_passes_everything() {
        assert_eq!(gate(0.0, 0.0), 0.0);
        assert_eq!(gate(1e-300, 0.0), 1e-300);
    }

    #[test]
    fn test_non_finite_is_gated() {
        assert_eq!(gate(f64::NAN, 0.1), 0.0);
        assert_eq!(gate(f64::INFINITY, 0.1), 0.0);
    }

    #[test]
    fn test_gate_vector() {
        let v = Vector3::new(0.05, -0.2, 0.1);
        assert_eq!(gate_vector(v, 0.1), Vector3::new(0.0, -0.2, 0.1));
    }
}

//! Unit constants and nalgebra extensions used across the pipeline

use nalgebra::Vector3;

/// Standard gravity, metres per second squared per g
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Metres per second to kilometres per hour
pub const MPS_TO_KMH: f64 = 3.6;

/// Metres to kilometres
pub const METERS_TO_KILOMETERS: f64 = 0.001;

pub const RAD_TO_DEG: f64 = 180.0 / core::f64::consts::PI;

/// Extension trait for Vector3 operations
pub trait Vector3Ext {
    /// True when every component is finite
    fn is_finite(&self) -> bool;

    /// Replace non-finite components with zero
    fn finite_or_zero(&self) -> Vector3<f64>;

    /// Normalize the vector, returning zero vector if magnitude is zero
    fn safe_normalize(&self) -> Vector3<f64>;
}

impl Vector3Ext for Vector3<f64> {
    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    fn finite_or_zero(&self) -> Vector3<f64> {
        self.map(|v| if v.is_finite() { v } else { 0.0 })
    }

    fn safe_normalize(&self) -> Vector3<f64> {
        let mag = self.norm();
        if mag > 0.0 && mag.is_finite() {
            *self / mag
        } else {
            Vector3::zeros()
        }
    }
}

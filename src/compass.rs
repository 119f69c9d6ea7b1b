//! Tilt-compensated magnetic heading
//!
//! Used for the heading column when no location fix supplies a true heading.

use crate::math::{RAD_TO_DEG, Vector3Ext};
use nalgebra::Vector3;

/// Calculate tilt-compensated magnetic heading of the body x axis.
///
/// `gravity` is the body-frame gravity estimate pointing toward the earth
/// (z-up body frame) and `magnetic_field` the body-frame field. Returns
/// degrees in `[0, 360)`, clockwise from magnetic north seen from above, or
/// `None` when either vector is zero or non-finite, or the two are parallel.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use inertial_pipeline::compass::magnetic_heading;
///
/// let gravity = Vector3::new(0.0, 0.0, -9.81); // level device
/// let field = Vector3::new(20.0, 0.0, -40.0);  // x axis pointing north
/// let heading = magnetic_heading(gravity, field).unwrap();
/// assert!(heading < 1.0 || heading > 359.0);
/// ```
pub fn magnetic_heading(gravity: Vector3<f64>, magnetic_field: Vector3<f64>) -> Option<f64> {
    if !gravity.is_finite() || !magnetic_field.is_finite() {
        return None;
    }

    // Accelerometer at rest reads the reaction to gravity
    let up = -gravity;

    // West: up × field, north: west × up
    let west = up.cross(&magnetic_field).safe_normalize();
    let north = west.cross(&up).safe_normalize();
    if west == Vector3::zeros() || north == Vector3::zeros() {
        return None;
    }

    let heading = -west.x.atan2(north.x) * RAD_TO_DEG;

    // rem_euclid of a tiny negative angle rounds up to exactly 360.0
    let heading = heading.rem_euclid(360.0);
    Some(if heading >= 360.0 { 0.0 } else { heading })
}

//! Velocity and path-length integration

use nalgebra::Vector3;

use crate::math::{MPS_TO_KMH, METERS_TO_KILOMETERS};

/// Accumulated state after an integration step
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Motion {
    pub velocity: Vector3<f64>,
    pub distance: Vector3<f64>,
}

/// Per-axis velocity and path-length integrator.
///
/// Velocity is the running sum of `accel * dt * velocity_scale`. Distance is
/// the running sum of `|velocity| * dt * distance_scale` taken after the
/// velocity update: a path length, not a displacement, so it never
/// decreases when velocity changes sign.
///
/// Callers pass already gated acceleration and the fixed configured `dt`.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use inertial_pipeline::Integrator;
///
/// let mut integrator = Integrator::new(1.0, 1.0);
/// integrator.integrate(Vector3::new(2.0, 0.0, 0.0), 0.5);
/// let motion = integrator.integrate(Vector3::new(-2.0, 0.0, 0.0), 0.5);
/// assert_eq!(motion.velocity.x, 0.0);
/// assert_eq!(motion.distance.x, 0.5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Integrator {
    velocity_scale: f64,
    distance_scale: f64,
    velocity: Vector3<f64>,
    distance: Vector3<f64>,
}

impl Integrator {
    pub fn new(velocity_scale: f64, distance_scale: f64) -> Self {
        Self {
            velocity_scale,
            distance_scale,
            velocity: Vector3::zeros(),
            distance: Vector3::zeros(),
        }
    }

    /// Advance one tick. Non-finite acceleration components count as zero,
    /// and an axis whose update would overflow keeps its previous state.
    pub fn integrate(&mut self, accel: Vector3<f64>, dt: f64) -> Motion {
        for i in 0..3 {
            let a = if accel[i].is_finite() { accel[i] } else { 0.0 };

            let velocity = self.velocity[i] + a * dt * self.velocity_scale;
            if !velocity.is_finite() {
                continue;
            }
            let distance = self.distance[i] + velocity.abs() * dt * self.distance_scale;
            if !distance.is_finite() {
                continue;
            }
            self.velocity[i] = velocity;
            self.distance[i] = distance;
        }
        self.motion()
    }

    pub fn motion(&self) -> Motion {
        Motion {
            velocity: self.velocity,
            distance: self.distance,
        }
    }

    pub fn reset(&mut self) {
        self.velocity = Vector3::zeros();
        self.distance = Vector3::zeros();
    }
}

impl Default for Integrator {
    fn default() -> Self {
        Self::new(MPS_TO_KMH, METERS_TO_KILOMETERS)
    }
}

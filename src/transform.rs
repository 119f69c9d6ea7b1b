//! Body-to-earth coordinate transformation and gravity separation

use nalgebra::{Rotation3, Vector3};

use crate::math::Vector3Ext;
use crate::types::{Attitude, Convention};

/// Output of one transformation step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOutput {
    /// Gravity-compensated acceleration in the earth frame
    pub global: Vector3<f64>,
    /// Gravity-compensated acceleration in the body frame
    pub linear: Vector3<f64>,
}

/// Rotates body-frame vectors into the earth-referenced frame.
///
/// Stateless apart from the configured earth axes convention.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use inertial_pipeline::{Attitude, Convention, CoordinateTransformer};
///
/// let transformer = CoordinateTransformer::new(Convention::Nwu);
/// let out = transformer.transform(
///     Vector3::new(1.0, 0.0, -9.8),
///     Attitude::default(),
///     Vector3::new(0.0, 0.0, -9.8),
/// );
/// assert_eq!(out.linear, Vector3::new(1.0, 0.0, 0.0));
/// assert_eq!(out.global, Vector3::new(1.0, 0.0, 0.0));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinateTransformer {
    convention: Convention,
}

impl CoordinateTransformer {
    pub fn new(convention: Convention) -> Self {
        Self { convention }
    }

    pub fn convention(&self) -> Convention {
        self.convention
    }

    /// Body-to-earth rotation, `Rz(yaw) * Ry(pitch) * Rx(roll)`.
    ///
    /// Non-finite attitudes yield the identity rotation.
    pub fn rotation(attitude: &Attitude) -> Rotation3<f64> {
        if attitude.is_finite() {
            Rotation3::from_euler_angles(attitude.roll, attitude.pitch, attitude.yaw)
        } else {
            Rotation3::identity()
        }
    }

    /// Rotate a body-frame vector into the configured earth frame
    pub fn to_earth(&self, body: Vector3<f64>, attitude: &Attitude) -> Vector3<f64> {
        let nwu = Self::rotation(attitude) * body;
        remap(nwu, self.convention).finite_or_zero()
    }

    /// Separate gravity from raw acceleration and express the result in
    /// both frames.
    pub fn transform(
        &self,
        raw: Vector3<f64>,
        attitude: Attitude,
        gravity: Vector3<f64>,
    ) -> FrameOutput {
        let linear = (raw - gravity).finite_or_zero();
        FrameOutput {
            global: self.to_earth(linear, &attitude),
            linear,
        }
    }
}

/// Remap a north-west-up vector into the requested convention
fn remap(nwu: Vector3<f64>, convention: Convention) -> Vector3<f64> {
    match convention {
        Convention::Nwu => nwu,
        Convention::Enu => Vector3::new(-nwu.y, nwu.x, nwu.z),
        Convention::Ned => Vector3::new(nwu.x, -nwu.y, -nwu.z),
    }
}

//! Core value types and settings for the inertial pipeline

use std::path::PathBuf;

use chrono::{DateTime, Local};
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::math::{MPS_TO_KMH, METERS_TO_KILOMETERS, STANDARD_GRAVITY, Vector3Ext};

/// Earth axes convention
///
/// Defines the axes of the earth-referenced frame that global acceleration
/// is reported in. The device reference frame is north-west-up (x = true
/// north, z = vertical), other conventions are remapped from it.
///
/// # Conventions
/// - **NWU**: North-West-Up (X=North, Y=West, Z=Up)
/// - **ENU**: East-North-Up (X=East, Y=North, Z=Up)
/// - **NED**: North-East-Down (X=North, Y=East, Z=Down)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Convention {
    #[default]
    Nwu,
    Enu,
    Ned,
}

/// Unit that the sensor source reports acceleration-like streams in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccelerationUnit {
    /// Multiples of standard gravity (the usual device convention)
    #[default]
    G,
    MetersPerSecondSquared,
}

impl AccelerationUnit {
    /// Factor converting a value in this unit to m/s²
    pub fn to_mps2(self) -> f64 {
        match self {
            AccelerationUnit::G => STANDARD_GRAVITY,
            AccelerationUnit::MetersPerSecondSquared => 1.0,
        }
    }
}

/// Device attitude as roll, pitch and yaw in radians.
///
/// The rotation from body to earth frame is `Rz(yaw) * Ry(pitch) * Rx(roll)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Attitude {
    pub fn new(roll: f64, pitch: f64, yaw: f64) -> Self {
        Self { roll, pitch, yaw }
    }

    /// Attitude from a body-to-earth rotation quaternion
    pub fn from_quaternion(quaternion: &UnitQuaternion<f64>) -> Self {
        let (roll, pitch, yaw) = quaternion.euler_angles();
        Self { roll, pitch, yaw }
    }

    pub fn is_finite(&self) -> bool {
        self.roll.is_finite() && self.pitch.is_finite() && self.yaw.is_finite()
    }

    pub fn as_vector(&self) -> Vector3<f64> {
        Vector3::new(self.roll, self.pitch, self.yaw)
    }
}

/// Sensor streams that make up one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Acceleration,
    Attitude,
    Gravity,
    RotationRate,
    MagneticField,
    UserAcceleration,
}

impl Stream {
    pub const ALL: [Stream; 6] = [
        Stream::Acceleration,
        Stream::Attitude,
        Stream::Gravity,
        Stream::RotationRate,
        Stream::MagneticField,
        Stream::UserAcceleration,
    ];

    fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Small set of [`Stream`]s, used to flag unavailable streams per sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamSet(u8);

impl StreamSet {
    pub fn insert(&mut self, stream: Stream) {
        self.0 |= stream.bit();
    }

    pub fn contains(&self, stream: Stream) -> bool {
        self.0 & stream.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn union(self, other: StreamSet) -> StreamSet {
        StreamSet(self.0 | other.0)
    }

    pub fn difference(self, other: StreamSet) -> StreamSet {
        StreamSet(self.0 & !other.0)
    }

    pub fn iter(self) -> impl Iterator<Item = Stream> {
        Stream::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

/// One frame as delivered by a sensor source.
///
/// `None` means the capability is absent on this device or for this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorFrame {
    pub timestamp: DateTime<Local>,
    pub acceleration: Option<Vector3<f64>>,
    pub attitude: Option<Attitude>,
    pub gravity: Option<Vector3<f64>>,
    pub rotation_rate: Option<Vector3<f64>>,
    pub magnetic_field: Option<Vector3<f64>>,
    pub user_acceleration: Option<Vector3<f64>>,
}

impl SensorFrame {
    /// Frame with every stream absent
    pub fn empty(timestamp: DateTime<Local>) -> Self {
        Self {
            timestamp,
            acceleration: None,
            attitude: None,
            gravity: None,
            rotation_rate: None,
            magnetic_field: None,
            user_acceleration: None,
        }
    }
}

/// Validated, always-complete sample in SI units.
///
/// Streams that were absent or non-finite in the source frame are zero
/// (identity attitude) and flagged in `unavailable`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Local>,
    /// Body-frame acceleration, m/s²
    pub acceleration: Vector3<f64>,
    pub attitude: Attitude,
    /// Body-frame gravity estimate, m/s²
    pub gravity: Vector3<f64>,
    /// rad/s
    pub rotation_rate: Vector3<f64>,
    /// µT
    pub magnetic_field: Vector3<f64>,
    /// Device-computed acceleration without gravity, m/s²
    pub user_acceleration: Vector3<f64>,
    pub unavailable: StreamSet,
}

impl Sample {
    /// Validate a source frame, converting acceleration-like streams to m/s².
    pub fn from_frame(frame: &SensorFrame, unit: AccelerationUnit) -> Self {
        let mut unavailable = StreamSet::default();
        let scale = unit.to_mps2();

        let mut vector = |value: Option<Vector3<f64>>, stream: Stream, scale: f64| match value {
            Some(v) if v.is_finite() => v * scale,
            _ => {
                unavailable.insert(stream);
                Vector3::zeros()
            }
        };

        let acceleration = vector(frame.acceleration, Stream::Acceleration, scale);
        let gravity = vector(frame.gravity, Stream::Gravity, scale);
        let rotation_rate = vector(frame.rotation_rate, Stream::RotationRate, 1.0);
        let magnetic_field = vector(frame.magnetic_field, Stream::MagneticField, 1.0);
        let user_acceleration = vector(frame.user_acceleration, Stream::UserAcceleration, scale);

        let attitude = match frame.attitude {
            Some(a) if a.is_finite() => a,
            _ => {
                unavailable.insert(Stream::Attitude);
                Attitude::default()
            }
        };

        Self {
            timestamp: frame.timestamp,
            acceleration,
            attitude,
            gravity,
            rotation_rate,
            magnetic_field,
            user_acceleration,
            unavailable,
        }
    }
}

/// Location fix from the positioning collaborator, delivered at a lower
/// rate than sensor frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    /// Degrees
    pub latitude: f64,
    /// Degrees
    pub longitude: f64,
    /// Metres
    pub altitude: f64,
    /// True heading in degrees, if the collaborator provides one
    pub heading: Option<f64>,
    /// Raw geomagnetic vector reported with the heading, µT
    pub geomagnetic: Vector3<f64>,
}

/// Vector that feeds a channel's filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameSource {
    /// Body-frame acceleration as measured, gravity included
    Raw,
    /// Body-frame acceleration with gravity removed
    Linear,
    /// Gravity-compensated acceleration rotated into the earth frame
    Global,
    /// Device-computed user acceleration
    User,
}

/// Noise filter applied independently to each axis of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FilterKind {
    None,
    Kalman {
        /// Process noise Q
        process_noise: f64,
        /// Measurement noise R
        measurement_noise: f64,
        /// Initial error covariance P
        initial_error: f64,
    },
    MovingAverage {
        /// Window length in samples
        capacity: usize,
    },
}

impl FilterKind {
    pub const DEFAULT_WINDOW: usize = 100;
    /// Largest accepted moving-average window, ten minutes at 100 Hz
    pub const MAX_WINDOW: usize = 60_000;

    pub fn kalman() -> Self {
        FilterKind::Kalman {
            process_noise: 0.01,
            measurement_noise: 0.1,
            initial_error: 1.0,
        }
    }

    pub fn moving_average() -> Self {
        FilterKind::MovingAverage {
            capacity: Self::DEFAULT_WINDOW,
        }
    }
}

impl Default for FilterKind {
    fn default() -> Self {
        Self::kalman()
    }
}

/// One configured quantity: source vector, filter, gate and integration.
///
/// # Example
/// ```
/// use inertial_pipeline::{ChannelSettings, FilterKind, FrameSource};
///
/// let channel = ChannelSettings {
///     filter: FilterKind::moving_average(),
///     gate_threshold: 0.05,
///     ..ChannelSettings::new("global", FrameSource::Global)
/// };
/// assert_eq!(channel.velocity_scale, 3.6);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub name: String,
    pub frame: FrameSource,
    pub filter: FilterKind,
    /// Deadband applied to filtered acceleration before integration, m/s²
    pub gate_threshold: f64,
    /// Whether velocity and distance are accumulated
    pub integrate: bool,
    /// Converts m/s to the reported velocity unit (3.6 for km/h)
    pub velocity_scale: f64,
    /// Converts velocity·seconds to the reported distance unit
    pub distance_scale: f64,
}

impl ChannelSettings {
    pub fn new(name: impl Into<String>, frame: FrameSource) -> Self {
        Self {
            name: name.into(),
            frame,
            filter: FilterKind::default(),
            gate_threshold: 0.1,
            integrate: true,
            velocity_scale: MPS_TO_KMH,
            distance_scale: METERS_TO_KILOMETERS,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyChannelName);
        }
        // The name is spliced into record header fields
        if self
            .name
            .chars()
            .any(|c| c == ',' || c == '"' || c.is_control())
        {
            return Err(ConfigError::InvalidChannelName(self.name.clone()));
        }
        if !self.gate_threshold.is_finite() || self.gate_threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold {
                channel: self.name.clone(),
                value: self.gate_threshold,
            });
        }
        if !self.velocity_scale.is_finite() {
            return Err(ConfigError::InvalidScale {
                channel: self.name.clone(),
                value: self.velocity_scale,
            });
        }
        if !self.distance_scale.is_finite() || self.distance_scale < 0.0 {
            return Err(ConfigError::InvalidScale {
                channel: self.name.clone(),
                value: self.distance_scale,
            });
        }
        match self.filter {
            FilterKind::None => Ok(()),
            FilterKind::Kalman {
                process_noise,
                measurement_noise,
                initial_error,
            } => {
                let valid = process_noise.is_finite()
                    && process_noise >= 0.0
                    && measurement_noise.is_finite()
                    && measurement_noise > 0.0
                    && initial_error.is_finite()
                    && initial_error >= 0.0;
                if valid {
                    Ok(())
                } else {
                    Err(ConfigError::InvalidFilter {
                        channel: self.name.clone(),
                        reason: "kalman noise parameters must be finite, Q >= 0, R > 0, P >= 0",
                    })
                }
            }
            FilterKind::MovingAverage { capacity } if capacity == 0 => {
                Err(ConfigError::InvalidFilter {
                    channel: self.name.clone(),
                    reason: "moving average capacity must be at least 1",
                })
            }
            FilterKind::MovingAverage { capacity } if capacity > FilterKind::MAX_WINDOW => {
                Err(ConfigError::InvalidFilter {
                    channel: self.name.clone(),
                    reason: "moving average capacity exceeds the maximum window",
                })
            }
            FilterKind::MovingAverage { .. } => Ok(()),
        }
    }
}

/// Record file settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordSettings {
    /// Directory that session files are created in; `None` disables recording
    pub directory: Option<PathBuf>,
    /// Append the location/heading extension columns
    pub include_location: bool,
}

/// Pipeline settings
///
/// Immutable while a session runs; replace them through
/// [`PipelineController::set_settings`](crate::PipelineController::set_settings)
/// while idle.
///
/// # Example
/// ```
/// use inertial_pipeline::{AccelerationUnit, Convention, PipelineSettings};
///
/// let settings = PipelineSettings {
///     sample_interval: 0.02,
///     input_unit: AccelerationUnit::MetersPerSecondSquared,
///     convention: Convention::Enu,
///     ..Default::default()
/// };
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Fixed integration step dt in seconds
    pub sample_interval: f64,
    pub input_unit: AccelerationUnit,
    pub convention: Convention,
    /// Processed in order; each produces one channel output per tick
    pub channels: Vec<ChannelSettings>,
    pub record: RecordSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            sample_interval: 0.01,
            input_unit: AccelerationUnit::default(),
            convention: Convention::default(),
            channels: vec![
                ChannelSettings::new("raw", FrameSource::Raw),
                ChannelSettings::new("global", FrameSource::Global),
                ChannelSettings {
                    gate_threshold: 0.02,
                    ..ChannelSettings::new("user", FrameSource::User)
                },
            ],
            record: RecordSettings::default(),
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.sample_interval.is_finite() || self.sample_interval <= 0.0 {
            return Err(ConfigError::InvalidSampleInterval(self.sample_interval));
        }
        if self.channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }
        for (i, channel) in self.channels.iter().enumerate() {
            channel.validate()?;
            if self.channels[..i].iter().any(|c| c.name == channel.name) {
                return Err(ConfigError::DuplicateChannel(channel.name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn timestamp() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_default_settings_are_valid() {
        let settings = PipelineSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.sample_interval, 0.01);
        assert_eq!(settings.channels.len(), 3);
        assert_eq!(settings.channels[2].gate_threshold, 0.02);
    }

    #[test]
    fn test_settings_validation() {
        let settings = PipelineSettings {
            sample_interval: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidSampleInterval(_))
        ));

        let settings = PipelineSettings {
            channels: vec![],
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::NoChannels)));

        let settings = PipelineSettings {
            channels: vec![
                ChannelSettings::new("a", FrameSource::Raw),
                ChannelSettings::new("a", FrameSource::Global),
            ],
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::DuplicateChannel(name)) if name == "a"
        ));

        let settings = PipelineSettings {
            channels: vec![ChannelSettings {
                filter: FilterKind::MovingAverage { capacity: 0 },
                ..ChannelSettings::new("a", FrameSource::Raw)
            }],
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidFilter { .. })
        ));

        let settings = PipelineSettings {
            channels: vec![ChannelSettings {
                gate_threshold: -0.1,
                ..ChannelSettings::new("a", FrameSource::Raw)
            }],
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn test_negative_distance_scale_is_rejected() {
        let settings = PipelineSettings {
            channels: vec![ChannelSettings {
                distance_scale: -0.001,
                ..ChannelSettings::new("a", FrameSource::Raw)
            }],
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidScale { value, .. }) if value == -0.001
        ));

        // Velocity may be reported with either sign
        let settings = PipelineSettings {
            channels: vec![ChannelSettings {
                velocity_scale: -3.6,
                distance_scale: 0.0,
                ..ChannelSettings::new("a", FrameSource::Raw)
            }],
            ..Default::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_moving_average_window_is_bounded() {
        for capacity in [FilterKind::MAX_WINDOW + 1, usize::MAX] {
            let settings = PipelineSettings {
                channels: vec![ChannelSettings {
                    filter: FilterKind::MovingAverage { capacity },
                    ..ChannelSettings::new("a", FrameSource::Raw)
                }],
                ..Default::default()
            };
            assert!(matches!(
                settings.validate(),
                Err(ConfigError::InvalidFilter { .. })
            ));
        }

        let settings = PipelineSettings {
            channels: vec![ChannelSettings {
                filter: FilterKind::MovingAverage {
                    capacity: FilterKind::MAX_WINDOW,
                },
                ..ChannelSettings::new("a", FrameSource::Raw)
            }],
            ..Default::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_channel_name_must_fit_a_header_field() {
        for name in ["a,b", "say \"hi\"", "line\nbreak", "tab\there"] {
            let settings = PipelineSettings {
                channels: vec![ChannelSettings::new(name, FrameSource::Raw)],
                ..Default::default()
            };
            assert_eq!(
                settings.validate(),
                Err(ConfigError::InvalidChannelName(name.to_string()))
            );
        }

        let settings = PipelineSettings {
            channels: vec![ChannelSettings::new("left wheel_2", FrameSource::Raw)],
            ..Default::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_sample_from_complete_frame() {
        let frame = SensorFrame {
            acceleration: Some(Vector3::new(0.0, 0.0, -1.0)),
            attitude: Some(Attitude::new(0.1, 0.2, 0.3)),
            gravity: Some(Vector3::new(0.0, 0.0, -1.0)),
            rotation_rate: Some(Vector3::new(0.5, 0.0, 0.0)),
            magnetic_field: Some(Vector3::new(20.0, 0.0, -40.0)),
            user_acceleration: Some(Vector3::new(0.1, 0.0, 0.0)),
            ..SensorFrame::empty(timestamp())
        };

        let sample = Sample::from_frame(&frame, AccelerationUnit::G);
        assert!(sample.unavailable.is_empty());
        assert_eq!(sample.acceleration, Vector3::new(0.0, 0.0, -STANDARD_GRAVITY));
        assert_eq!(sample.user_acceleration.x, 0.1 * STANDARD_GRAVITY);
        // Non-acceleration streams are not rescaled
        assert_eq!(sample.rotation_rate.x, 0.5);
        assert_eq!(sample.magnetic_field.z, -40.0);
    }

    #[test]
    fn test_sample_marks_missing_and_non_finite_streams() {
        let frame = SensorFrame {
            acceleration: Some(Vector3::new(f64::NAN, 0.0, 0.0)),
            attitude: Some(Attitude::new(f64::INFINITY, 0.0, 0.0)),
            gravity: Some(Vector3::new(0.0, 0.0, -9.8)),
            ..SensorFrame::empty(timestamp())
        };

        let sample = Sample::from_frame(&frame, AccelerationUnit::MetersPerSecondSquared);
        assert!(sample.unavailable.contains(Stream::Acceleration));
        assert!(sample.unavailable.contains(Stream::Attitude));
        assert!(sample.unavailable.contains(Stream::MagneticField));
        assert!(!sample.unavailable.contains(Stream::Gravity));
        assert_eq!(sample.acceleration, Vector3::zeros());
        assert_eq!(sample.attitude, Attitude::default());
        assert_eq!(sample.unavailable.iter().count(), 5);
    }

    #[test]
    fn test_stream_set_operations() {
        let mut a = StreamSet::default();
        a.insert(Stream::Gravity);
        let mut b = StreamSet::default();
        b.insert(Stream::Gravity);
        b.insert(Stream::Attitude);

        assert_eq!(b.difference(a).iter().collect::<Vec<_>>(), vec![Stream::Attitude]);
        assert_eq!(a.union(b), b);
        assert!(a.difference(b).is_empty());
    }

    #[test]
    fn test_attitude_from_quaternion() {
        let q = UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3);
        let attitude = Attitude::from_quaternion(&q);
        assert!((attitude.roll - 0.1).abs() < 1e-12);
        assert!((attitude.pitch + 0.2).abs() < 1e-12);
        assert!((attitude.yaw - 0.3).abs() < 1e-12);
    }
}

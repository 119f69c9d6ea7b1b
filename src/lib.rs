//! Inertial Pipeline - real-time motion estimation from device IMU streams
//!
//! This library turns the sensor frames of a phone-class IMU (acceleration,
//! attitude, gravity, rotation rate, magnetic field) into earth-referenced,
//! noise-filtered acceleration, velocity and a per-axis path length, and
//! records every tick to a CSV session file.
//!
//! Each tick runs a fixed stage order:
//!
//! ```text
//! SensorFrame ─► Sample ─► CoordinateTransformer ─► per channel:
//!                          (gravity removal,          NoiseFilter ─► gate ─► Integrator
//!                           body → earth rotation)                    │
//!                                                      Snapshot ◄─────┘ ─► LogSink / SnapshotReader
//! ```
//!
//! # Features
//!
//! - Gravity separation and body-to-earth rotation (NWU, ENU, NED)
//! - Per-axis Kalman or moving-average noise filtering
//! - Deadband gating against integration drift
//! - Velocity (km/h by default) and path-length (km) integration with a
//!   fixed time step for reproducible results
//! - Configurable channels: raw, linear, global or device user acceleration
//! - Push-driven or threaded sessions with a flush barrier on stop
//! - Tilt-compensated compass heading and location-fix columns
//!
//! # Quick Start
//!
//! ```rust
//! use chrono::Local;
//! use nalgebra::Vector3;
//! use inertial_pipeline::{Attitude, PipelineController, PipelineSettings, SensorFrame};
//!
//! let mut controller = PipelineController::new(PipelineSettings::default()).unwrap();
//! controller.start();
//!
//! // One 10 ms frame, device level and pushed forward at 0.5 g
//! let frame = SensorFrame {
//!     acceleration: Some(Vector3::new(0.5, 0.0, -1.0)),  // g
//!     attitude: Some(Attitude::new(0.0, 0.0, 0.0)),      // rad
//!     gravity: Some(Vector3::new(0.0, 0.0, -1.0)),       // g
//!     ..SensorFrame::empty(Local::now())
//! };
//! let snapshot = controller.tick(&frame).unwrap();
//!
//! let global = snapshot.channel("global").unwrap();
//! assert!(global.velocity.x > 0.0); // km/h
//!
//! controller.stop();
//! ```

pub mod compass;
mod controller;
mod error;
pub mod filter;
pub mod gate;
mod integrator;
mod math;
mod pipeline;
mod record;
mod sink;
mod snapshot;
mod source;
mod transform;
mod types;

pub use controller::{Logging, LocationUpdater, PipelineController, SessionReport, StartOutcome};
pub use error::{ConfigError, PipelineError, PipelineState, ReplayError, StorageError};
pub use filter::{AxisFilter, KalmanAxisFilter, MovingAverageFilter, NoiseFilter};
pub use integrator::{Integrator, Motion};
pub use math::{METERS_TO_KILOMETERS, MPS_TO_KMH, RAD_TO_DEG, STANDARD_GRAVITY, Vector3Ext};
pub use pipeline::{Channel, Pipeline};
pub use record::{Column, CsvRecordStore, RecordLayout, RecordStore};
pub use sink::{LogSink, SinkHandle, SinkReport};
pub use snapshot::{ChannelOutput, Snapshot, SnapshotReader};
pub use source::{ChannelSource, ReplaySource, SensorSource, SourceEvent};
pub use transform::{CoordinateTransformer, FrameOutput};
pub use types::*;

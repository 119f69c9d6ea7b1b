//! Sensor sources driving the threaded executor

use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, TimeDelta};
use nalgebra::Vector3;
use serde::Deserialize;

use crate::error::ReplayError;
use crate::types::{Attitude, SensorFrame};

/// Result of polling a [`SensorSource`]
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Frame(SensorFrame),
    /// Nothing arrived in time; poll again
    Idle,
    /// The source is exhausted or disconnected
    End,
}

/// Periodic producer of sensor frames.
///
/// Polled in a loop by the executor thread, which checks its stop flag
/// between polls. Implementations must return within roughly one sampling
/// interval, yielding [`SourceEvent::Idle`] rather than blocking indefinitely.
pub trait SensorSource: Send {
    fn poll(&mut self) -> SourceEvent;
}

/// Live source fed by a device callback through an mpsc channel.
///
/// # Example
/// ```
/// use std::sync::mpsc;
/// use std::time::Duration;
/// use chrono::Local;
/// use inertial_pipeline::{ChannelSource, SensorFrame, SensorSource, SourceEvent};
///
/// let (tx, rx) = mpsc::sync_channel(64);
/// let mut source = ChannelSource::new(rx, Duration::from_millis(10));
/// tx.send(SensorFrame::empty(Local::now())).unwrap();
/// assert!(matches!(source.poll(), SourceEvent::Frame(_)));
/// drop(tx);
/// assert_eq!(source.poll(), SourceEvent::End);
/// ```
#[derive(Debug)]
pub struct ChannelSource {
    rx: Receiver<SensorFrame>,
    timeout: Duration,
}

impl ChannelSource {
    pub fn new(rx: Receiver<SensorFrame>, timeout: Duration) -> Self {
        Self { rx, timeout }
    }
}

impl SensorSource for ChannelSource {
    fn poll(&mut self) -> SourceEvent {
        match self.rx.recv_timeout(self.timeout) {
            Ok(frame) => SourceEvent::Frame(frame),
            Err(RecvTimeoutError::Timeout) => SourceEvent::Idle,
            Err(RecvTimeoutError::Disconnected) => SourceEvent::End,
        }
    }
}

/// Recorded frames played back in order, optionally paced in real time.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    frames: VecDeque<SensorFrame>,
    interval: Option<Duration>,
    next_due: Option<Instant>,
}

impl ReplaySource {
    pub fn new(frames: impl IntoIterator<Item = SensorFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Release at most one frame per `interval`
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Load frames from a sensor CSV file.
    ///
    /// Timestamps are the `time` column, in seconds, offset from now.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let reader = csv::Reader::from_path(path)?;
        Self::read(reader, Local::now())
    }

    /// Load frames from CSV text, offsetting timestamps from `started_at`.
    ///
    /// Columns: `time`, `accel_x..z`, `roll`, `pitch`, `yaw`, `gravity_x..z`,
    /// `gyro_x..z`, `mag_x..z`, `user_x..z`. Empty fields mark a stream as
    /// unavailable for that row. A `time` that is not finite or falls
    /// outside the timestamp range is an error.
    pub fn from_reader<R: io::Read>(
        reader: R,
        started_at: DateTime<Local>,
    ) -> Result<Self, ReplayError> {
        Self::read(csv::Reader::from_reader(reader), started_at)
    }

    fn read<R: io::Read>(
        mut reader: csv::Reader<R>,
        started_at: DateTime<Local>,
    ) -> Result<Self, ReplayError> {
        let mut frames = VecDeque::new();
        for (row, record) in reader.deserialize::<SensorRecord>().enumerate() {
            frames.push_back(record?.into_frame(row, started_at)?);
        }
        Ok(Self {
            frames,
            ..Default::default()
        })
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    fn pace(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                thread::sleep(due - now);
            }
        }
        self.next_due = Some(self.next_due.map_or(now, |due| due.max(now)) + interval);
    }
}

impl SensorSource for ReplaySource {
    fn poll(&mut self) -> SourceEvent {
        if self.frames.is_empty() {
            return SourceEvent::End;
        }
        self.pace();
        match self.frames.pop_front() {
            Some(frame) => SourceEvent::Frame(frame),
            None => SourceEvent::End,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SensorRecord {
    time: f64,
    accel_x: Option<f64>,
    accel_y: Option<f64>,
    accel_z: Option<f64>,
    roll: Option<f64>,
    pitch: Option<f64>,
    yaw: Option<f64>,
    gravity_x: Option<f64>,
    gravity_y: Option<f64>,
    gravity_z: Option<f64>,
    gyro_x: Option<f64>,
    gyro_y: Option<f64>,
    gyro_z: Option<f64>,
    mag_x: Option<f64>,
    mag_y: Option<f64>,
    mag_z: Option<f64>,
    user_x: Option<f64>,
    user_y: Option<f64>,
    user_z: Option<f64>,
}

fn vector(x: Option<f64>, y: Option<f64>, z: Option<f64>) -> Option<Vector3<f64>> {
    Some(Vector3::new(x?, y?, z?))
}

impl SensorRecord {
    fn into_frame(
        self,
        row: usize,
        started_at: DateTime<Local>,
    ) -> Result<SensorFrame, ReplayError> {
        let invalid = ReplayError::InvalidTime {
            row,
            time: self.time,
        };
        let micros = (self.time * 1e6).round();
        // i64::MAX is not exactly representable; stay strictly below 2^63
        if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
            return Err(invalid);
        }
        let timestamp = started_at
            .checked_add_signed(TimeDelta::microseconds(micros as i64))
            .ok_or(invalid)?;
        Ok(SensorFrame {
            timestamp,
            acceleration: vector(self.accel_x, self.accel_y, self.accel_z),
            attitude: vector(self.roll, self.pitch, self.yaw)
                .map(|v| Attitude::new(v.x, v.y, v.z)),
            gravity: vector(self.gravity_x, self.gravity_y, self.gravity_z),
            rotation_rate: vector(self.gyro_x, self.gyro_y, self.gyro_z),
            magnetic_field: vector(self.mag_x, self.mag_y, self.mag_z),
            user_acceleration: vector(self.user_x, self.user_y, self.user_z),
        })
    }
}

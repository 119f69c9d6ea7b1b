//! Session record format
//!
//! A [`RecordLayout`] is an ordered list of [`Column`]s. The header and every
//! row are produced from the same list, so their field counts cannot drift
//! apart for any configuration.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::info;
use nalgebra::Vector3;

use crate::error::StorageError;
use crate::snapshot::Snapshot;
use crate::types::PipelineSettings;

/// Row timestamp format, millisecond precision
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Record file name format, derived from the session start time
pub const FILE_NAME_FORMAT: &str = "log_%Y%m%d_%H%M%S_%3f.csv";

/// A group of record fields taken from one snapshot quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    Raw,
    Global,
    Linear,
    UserAcceleration,
    Gravity,
    Attitude,
    RotationRate,
    MagneticField,
    Difference,
    ChannelAcceleration(String),
    Velocity(String),
    Distance(String),
    /// Latitude, longitude, altitude of the latest fix
    Location,
    Geomagnetic,
    /// True heading if known, else compass heading
    Heading,
}

impl Column {
    fn names(&self) -> Vec<String> {
        match self {
            Column::Raw => axes("raw"),
            Column::Global => axes("global"),
            Column::Linear => axes("linear"),
            Column::UserAcceleration => axes("user"),
            Column::Gravity => axes("gravity"),
            Column::Attitude => vec!["roll".into(), "pitch".into(), "yaw".into()],
            Column::RotationRate => axes("rotation_rate"),
            Column::MagneticField => axes("magnetic"),
            Column::Difference => axes("difference"),
            Column::ChannelAcceleration(name) => axes(&format!("{name}_acceleration")),
            Column::Velocity(name) => axes(&format!("{name}_velocity")),
            Column::Distance(name) => axes(&format!("{name}_distance")),
            Column::Location => vec!["latitude".into(), "longitude".into(), "altitude".into()],
            Column::Geomagnetic => axes("geomagnetic"),
            Column::Heading => vec!["heading".into()],
        }
    }

    fn values(&self, snapshot: &Snapshot, out: &mut Vec<String>) {
        match self {
            Column::Raw => push_vector(out, snapshot.raw),
            Column::Global => push_vector(out, snapshot.global),
            Column::Linear => push_vector(out, snapshot.linear),
            Column::UserAcceleration => push_vector(out, snapshot.user),
            Column::Gravity => push_vector(out, snapshot.gravity),
            Column::Attitude => push_vector(out, snapshot.attitude.as_vector()),
            Column::RotationRate => push_vector(out, snapshot.rotation_rate),
            Column::MagneticField => push_vector(out, snapshot.magnetic_field),
            Column::Difference => push_vector(out, snapshot.difference),
            Column::ChannelAcceleration(name) => {
                push_optional(out, snapshot.channel(name).map(|c| c.acceleration))
            }
            Column::Velocity(name) => push_optional(out, snapshot.channel(name).map(|c| c.velocity)),
            Column::Distance(name) => push_optional(out, snapshot.channel(name).map(|c| c.distance)),
            Column::Location => match snapshot.location {
                Some(fix) => {
                    push_vector(out, Vector3::new(fix.latitude, fix.longitude, fix.altitude))
                }
                None => push_optional(out, None),
            },
            Column::Geomagnetic => push_optional(out, snapshot.location.map(|fix| fix.geomagnetic)),
            Column::Heading => out.push(snapshot.heading().map(format_value).unwrap_or_default()),
        }
    }
}

fn axes(prefix: &str) -> Vec<String> {
    ["x", "y", "z"]
        .iter()
        .map(|axis| format!("{prefix}_{axis}"))
        .collect()
}

fn format_value(value: f64) -> String {
    format!("{value:.6}")
}

fn push_vector(out: &mut Vec<String>, v: Vector3<f64>) {
    out.extend(v.iter().map(|&x| format_value(x)));
}

// Missing values are written as empty fields to keep the row width.
fn push_optional(out: &mut Vec<String>, v: Option<Vector3<f64>>) {
    match v {
        Some(v) => push_vector(out, v),
        None => out.extend(std::iter::repeat_n(String::new(), 3)),
    }
}

/// Ordered column set of a session's record file.
///
/// # Example
/// ```
/// use inertial_pipeline::{PipelineSettings, RecordLayout};
///
/// let layout = RecordLayout::standard(&PipelineSettings::default());
/// let header = layout.header();
/// assert_eq!(header[0], "timestamp");
/// assert!(header.contains(&"global_velocity_x".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    columns: Vec<Column>,
}

impl RecordLayout {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Every computed vector, then velocity and distance for each
    /// integrating channel, then the location extension if enabled.
    pub fn standard(settings: &PipelineSettings) -> Self {
        let mut columns = vec![
            Column::Raw,
            Column::Global,
            Column::Linear,
            Column::UserAcceleration,
            Column::Gravity,
            Column::Attitude,
            Column::RotationRate,
            Column::MagneticField,
            Column::Difference,
        ];
        for channel in settings.channels.iter().filter(|c| c.integrate) {
            columns.push(Column::Velocity(channel.name.clone()));
            columns.push(Column::Distance(channel.name.clone()));
        }
        if settings.record.include_location {
            columns.extend([Column::Location, Column::Geomagnetic, Column::Heading]);
        }
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn header(&self) -> Vec<String> {
        std::iter::once("timestamp".to_string())
            .chain(self.columns.iter().flat_map(Column::names))
            .collect()
    }

    pub fn row(&self, snapshot: &Snapshot) -> Vec<String> {
        let mut row = vec![snapshot.timestamp.format(TIMESTAMP_FORMAT).to_string()];
        for column in &self.columns {
            column.values(snapshot, &mut row);
        }
        row
    }
}

/// Append-only destination for record rows.
///
/// Owned by the sink's writer thread for the whole session.
pub trait RecordStore: Send {
    fn append(&mut self, row: &[String]) -> Result<(), StorageError>;

    /// Flush and release the backing store
    fn close(&mut self) -> Result<(), StorageError>;
}

/// CSV file store, one file per session.
#[derive(Debug)]
pub struct CsvRecordStore {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvRecordStore {
    /// Create `log_<start time>.csv` in `directory` and write the header.
    ///
    /// Never overwrites an existing file.
    pub fn create(
        directory: &Path,
        started_at: DateTime<Local>,
        layout: &RecordLayout,
    ) -> Result<Self, StorageError> {
        let path = directory.join(started_at.format(FILE_NAME_FORMAT).to_string());
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| StorageError::Create {
                path: path.clone(),
                source,
            })?;

        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(layout.header())?;
        info!("recording session to {}", path.display());

        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for CsvRecordStore {
    fn append(&mut self, row: &[String]) -> Result<(), StorageError> {
        self.writer.write_record(row)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), StorageError> {
        self.writer.flush().map_err(StorageError::Flush)
    }
}

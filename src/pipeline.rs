//! Per-tick processing core
//!
//! [`Pipeline`] owns every piece of mutable filter and integrator state and
//! runs the fixed stage order on each sample:
//!
//! 1. validate the frame into a [`Sample`] (unavailable streams zeroed)
//! 2. transform: separate gravity, rotate into the earth frame
//! 3. per channel: filter, gate, integrate
//! 4. assemble an immutable [`Snapshot`]
//!
//! It has no notion of threads or lifecycle; see
//! [`PipelineController`](crate::PipelineController) for that.

use log::{trace, warn};
use nalgebra::Vector3;

use crate::compass::magnetic_heading;
use crate::error::ConfigError;
use crate::filter::NoiseFilter;
use crate::gate::gate_vector;
use crate::integrator::{Integrator, Motion};
use crate::snapshot::{ChannelOutput, Snapshot};
use crate::transform::{CoordinateTransformer, FrameOutput};
use crate::types::{
    ChannelSettings, FrameSource, LocationFix, PipelineSettings, Sample, SensorFrame, StreamSet,
};

/// Filter, gate and integrator for one configured quantity.
///
/// Filter and integrator state are only ever reset together.
#[derive(Debug, Clone)]
pub struct Channel {
    settings: ChannelSettings,
    filter: NoiseFilter,
    integrator: Integrator,
}

impl Channel {
    pub fn new(settings: ChannelSettings) -> Self {
        Self {
            filter: NoiseFilter::new(settings.filter),
            integrator: Integrator::new(settings.velocity_scale, settings.distance_scale),
            settings,
        }
    }

    pub fn settings(&self) -> &ChannelSettings {
        &self.settings
    }

    fn select(&self, sample: &Sample, frame: &FrameOutput) -> Vector3<f64> {
        match self.settings.frame {
            FrameSource::Raw => sample.acceleration,
            FrameSource::Linear => frame.linear,
            FrameSource::Global => frame.global,
            FrameSource::User => sample.user_acceleration,
        }
    }

    fn process(&mut self, input: Vector3<f64>, dt: f64) -> ChannelOutput {
        let filtered = self.filter.apply(input);
        let gated = gate_vector(filtered, self.settings.gate_threshold);
        let Motion { velocity, distance } = if self.settings.integrate {
            self.integrator.integrate(gated, dt)
        } else {
            self.integrator.motion()
        };

        ChannelOutput {
            name: self.settings.name.clone(),
            acceleration: gated,
            velocity,
            distance,
        }
    }

    pub fn motion(&self) -> Motion {
        self.integrator.motion()
    }

    pub fn reset(&mut self) {
        self.filter.reset();
        self.integrator.reset();
    }
}

/// Single-owner processing core.
///
/// # Example
/// ```
/// use chrono::Local;
/// use nalgebra::Vector3;
/// use inertial_pipeline::{Attitude, Pipeline, PipelineSettings, SensorFrame};
///
/// let mut pipeline = Pipeline::new(PipelineSettings::default()).unwrap();
/// let frame = SensorFrame {
///     acceleration: Some(Vector3::new(0.0, 0.0, -1.0)),
///     gravity: Some(Vector3::new(0.0, 0.0, -1.0)),
///     attitude: Some(Attitude::default()),
///     ..SensorFrame::empty(Local::now())
/// };
/// let snapshot = pipeline.tick(&frame, None);
/// assert_eq!(snapshot.global, Vector3::zeros());
/// assert_eq!(snapshot.channels.len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    settings: PipelineSettings,
    transformer: CoordinateTransformer,
    channels: Vec<Channel>,
    sequence: u64,
    /// Streams already reported unavailable since the last reset
    reported: StreamSet,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            transformer: CoordinateTransformer::new(settings.convention),
            channels: settings.channels.iter().cloned().map(Channel::new).collect(),
            settings,
            sequence: 0,
            reported: StreamSet::default(),
        })
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Number of ticks processed since creation or the last reset
    pub fn ticks(&self) -> u64 {
        self.sequence
    }

    /// Validate a raw frame and process it
    pub fn tick(&mut self, frame: &SensorFrame, location: Option<LocationFix>) -> Snapshot {
        let sample = Sample::from_frame(frame, self.settings.input_unit);
        self.process(&sample, location)
    }

    /// Run the stage order on an already validated sample
    pub fn process(&mut self, sample: &Sample, location: Option<LocationFix>) -> Snapshot {
        self.report_unavailable(sample.unavailable);

        let frame = self
            .transformer
            .transform(sample.acceleration, sample.attitude, sample.gravity);
        let dt = self.settings.sample_interval;

        let channels = self
            .channels
            .iter_mut()
            .map(|channel| {
                let input = channel.select(sample, &frame);
                channel.process(input, dt)
            })
            .collect();

        let snapshot = Snapshot {
            sequence: self.sequence,
            timestamp: sample.timestamp,
            raw: sample.acceleration,
            gravity: sample.gravity,
            attitude: sample.attitude,
            rotation_rate: sample.rotation_rate,
            magnetic_field: sample.magnetic_field,
            global: frame.global,
            linear: frame.linear,
            user: sample.user_acceleration,
            difference: sample.user_acceleration - frame.linear,
            compass_heading: magnetic_heading(sample.gravity, sample.magnetic_field),
            location,
            unavailable: sample.unavailable,
            channels,
        };

        trace!(
            "tick {}: global=({:.4}, {:.4}, {:.4})",
            snapshot.sequence, snapshot.global.x, snapshot.global.y, snapshot.global.z
        );
        self.sequence += 1;
        snapshot
    }

    /// Zero every filter and integrator and restart the tick count
    pub fn reset(&mut self) {
        self.channels.iter_mut().for_each(Channel::reset);
        self.sequence = 0;
        self.reported = StreamSet::default();
    }

    fn report_unavailable(&mut self, unavailable: StreamSet) {
        let new = unavailable.difference(self.reported);
        for stream in new.iter() {
            warn!("{stream:?} stream unavailable, substituting zero");
        }
        self.reported = self.reported.union(new);
    }
}

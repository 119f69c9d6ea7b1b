//! Per-tick snapshot values and the shared latest-snapshot slot

use std::sync::Arc;

use chrono::{DateTime, Local};
use nalgebra::Vector3;
use parking_lot::RwLock;

use crate::types::{Attitude, LocationFix, StreamSet};

/// Computed vectors for one channel in one tick
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelOutput {
    pub name: String,
    /// Filtered and gated acceleration fed to the integrator, m/s²
    pub acceleration: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub distance: Vector3<f64>,
}

/// Every computed vector for a single tick.
///
/// Built once per tick and handed downstream by value; nothing in it aliases
/// pipeline state.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Zero-based tick index within the session
    pub sequence: u64,
    pub timestamp: DateTime<Local>,
    /// Body-frame acceleration, m/s²
    pub raw: Vector3<f64>,
    pub gravity: Vector3<f64>,
    pub attitude: Attitude,
    pub rotation_rate: Vector3<f64>,
    pub magnetic_field: Vector3<f64>,
    /// Gravity-compensated, earth frame
    pub global: Vector3<f64>,
    /// Gravity-compensated, body frame
    pub linear: Vector3<f64>,
    /// Device-supplied user acceleration
    pub user: Vector3<f64>,
    /// `user - linear`: disagreement between device and local gravity removal
    pub difference: Vector3<f64>,
    /// Tilt-compensated magnetic heading in degrees, when computable
    pub compass_heading: Option<f64>,
    pub location: Option<LocationFix>,
    /// Streams that were zeroed this tick
    pub unavailable: StreamSet,
    pub channels: Vec<ChannelOutput>,
}

impl Snapshot {
    /// Look up a channel by its configured name
    pub fn channel(&self, name: &str) -> Option<&ChannelOutput> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// True heading from the location fix, falling back to the compass
    pub fn heading(&self) -> Option<f64> {
        self.location
            .and_then(|fix| fix.heading)
            .or(self.compass_heading)
    }
}

/// Cloneable read handle on the most recently published snapshot.
///
/// Readers never see pipeline state directly: the executor swaps in a new
/// `Arc<Snapshot>` after each tick.
#[derive(Debug, Clone, Default)]
pub struct SnapshotReader {
    slot: Arc<RwLock<Option<Arc<Snapshot>>>>,
}

impl SnapshotReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.slot.read().clone()
    }

    /// Latest output of one channel
    pub fn channel(&self, name: &str) -> Option<ChannelOutput> {
        self.slot.read().as_ref()?.channel(name).cloned()
    }

    pub(crate) fn publish(&self, snapshot: Arc<Snapshot>) {
        *self.slot.write() = Some(snapshot);
    }

    pub(crate) fn clear(&self) {
        *self.slot.write() = None;
    }
}

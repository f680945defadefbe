//! In-memory localization dataset: camera records, trajectories and rigs.
//!
//! Trajectory and rig poses follow the kapture convention: a trajectory
//! entry is `device_from_world`, a rig entry is `sensor_from_rig`.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::geometry::SE3;

/// Timestamps are opaque integers (frame index or nanoseconds).
pub type Timestamp = u64;

/// One image taken by a camera sensor at a timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraRecord {
    pub timestamp: Timestamp,
    pub sensor_id: String,
    pub image_name: String,
}

/// `device_from_world` poses keyed by timestamp, then device id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectories {
    poses: BTreeMap<Timestamp, BTreeMap<String, SE3>>,
}

impl Trajectories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the pose of `device_id` at `timestamp`.
    pub fn insert(&mut self, timestamp: Timestamp, device_id: impl Into<String>, pose: SE3) {
        self.poses
            .entry(timestamp)
            .or_default()
            .insert(device_id.into(), pose);
    }

    pub fn get(&self, timestamp: Timestamp, device_id: &str) -> Option<&SE3> {
        self.poses.get(&timestamp)?.get(device_id)
    }

    /// Number of (timestamp, device) entries.
    pub fn len(&self) -> usize {
        self.poses.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries sorted by timestamp, then device id.
    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, &str, &SE3)> {
        self.poses.iter().flat_map(|(ts, devices)| {
            devices
                .iter()
                .map(move |(id, pose)| (*ts, id.as_str(), pose))
        })
    }
}

/// Rig geometry: for each rig, `sensor_from_rig` per mounted sensor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rigs {
    rigs: BTreeMap<String, BTreeMap<String, SE3>>,
}

impl Rigs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rig_id: impl Into<String>, sensor_id: impl Into<String>, pose: SE3) {
        self.rigs
            .entry(rig_id.into())
            .or_default()
            .insert(sensor_id.into(), pose);
    }

    /// Sensors of `rig_id` with their `sensor_from_rig` pose.
    pub fn sensors(&self, rig_id: &str) -> Option<&BTreeMap<String, SE3>> {
        self.rigs.get(rig_id)
    }

    pub fn len(&self) -> usize {
        self.rigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rigs.is_empty()
    }
}

/// Rig nesting resolved by [`rigs_remove`] before giving up.
pub const RIGS_MAX_DEPTH: usize = 10;

/// Replaces rig trajectory entries by one entry per mounted sensor:
/// `sensor_from_world = sensor_from_rig * rig_from_world`.
///
/// Entries of devices that are not rigs are copied unchanged, unless a rig
/// yields a pose for the same device and timestamp. Rigs mounted on rigs
/// are expanded again, up to [`RIGS_MAX_DEPTH`] levels.
pub fn rigs_remove(trajectories: &Trajectories, rigs: &Rigs) -> Trajectories {
    let mut out = trajectories.clone();
    for depth in 0..RIGS_MAX_DEPTH {
        if !has_rig_entries(&out, rigs) {
            return out;
        }
        out = expand_rigs(&out, rigs);
        debug!("Rig removal level {}: {} trajectory entries", depth + 1, out.len());
    }
    if has_rig_entries(&out, rigs) {
        warn!(
            "Rigs nested deeper than {} levels; some trajectory entries are still rigs",
            RIGS_MAX_DEPTH
        );
    }
    out
}

fn has_rig_entries(trajectories: &Trajectories, rigs: &Rigs) -> bool {
    trajectories
        .iter()
        .any(|(_, device_id, _)| rigs.sensors(device_id).is_some())
}

/// One level of rig expansion. Rig-derived poses overwrite direct entries.
fn expand_rigs(trajectories: &Trajectories, rigs: &Rigs) -> Trajectories {
    let mut out = Trajectories::new();
    for (ts, device_id, pose) in trajectories.iter() {
        if rigs.sensors(device_id).is_none() {
            out.insert(ts, device_id, *pose);
        }
    }
    for (ts, device_id, rig_from_world) in trajectories.iter() {
        if let Some(sensors) = rigs.sensors(device_id) {
            for (sensor_id, sensor_from_rig) in sensors {
                out.insert(ts, sensor_id.clone(), sensor_from_rig.compose(rig_from_world));
            }
        }
    }
    out
}

/// Everything the pairing tools need from one dataset.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// Camera records in their original enumeration order.
    pub records_camera: Vec<CameraRecord>,
    pub trajectories: Option<Trajectories>,
    pub rigs: Option<Rigs>,
}

impl Dataset {
    /// Trajectories with rigs resolved to per-camera poses.
    pub fn camera_trajectories(&self) -> Trajectories {
        match (&self.trajectories, &self.rigs) {
            (Some(traj), Some(rigs)) if !rigs.is_empty() => rigs_remove(traj, rigs),
            (Some(traj), _) => traj.clone(),
            (None, _) => Trajectories::new(),
        }
    }
}

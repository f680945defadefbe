//! Collects camera poses for the images of a dataset.

use tracing::debug;

use super::NamedPose;
use crate::dataset::{CameraRecord, Dataset, Trajectories};

/// Pairs every camera record with its camera pose, in record order.
///
/// Trajectories hold `camera_from_world`; the emitted pose is its inverse,
/// `world_from_camera`, whose translation is the camera center. Records
/// without a trajectory entry are skipped. Nothing is deduplicated.
pub fn extract_camera_poses(
    records: &[CameraRecord],
    trajectories: &Trajectories,
) -> Vec<NamedPose> {
    let poses: Vec<NamedPose> = records
        .iter()
        .filter_map(|record| {
            trajectories
                .get(record.timestamp, &record.sensor_id)
                .map(|cam_from_world| NamedPose::new(&record.image_name, cam_from_world.inverse()))
        })
        .collect();

    let dropped = records.len() - poses.len();
    if dropped > 0 {
        debug!(
            "{} of {} images have no pose and were skipped",
            dropped,
            records.len()
        );
    }
    poses
}

impl Dataset {
    /// Camera poses of all localized images, rigs resolved.
    pub fn camera_poses(&self) -> Vec<NamedPose> {
        extract_camera_poses(&self.records_camera, &self.camera_trajectories())
    }
}

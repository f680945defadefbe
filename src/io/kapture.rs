use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use csv::{Position, ReaderBuilder, StringRecord};
use nalgebra::Vector3;
use tracing::{debug, info, warn};

use crate::dataset::{CameraRecord, Dataset, Rigs, Timestamp, Trajectories};
use crate::geometry::SE3;
use crate::pairing::ImagePair;

const RECORDS_CAMERA: &str = "sensors/records_camera.txt";
const TRAJECTORIES: &str = "sensors/trajectories.txt";
const RIGS: &str = "sensors/rigs.txt";

/// Loads a kapture dataset rooted at `root`.
///
/// `sensors/records_camera.txt` is required. `sensors/trajectories.txt`
/// and `sensors/rigs.txt` are optional; without trajectories no image has
/// a pose.
pub fn load_dataset<P: AsRef<Path>>(root: P) -> Result<Dataset> {
    let root = root.as_ref();
    let records_path = root.join(RECORDS_CAMERA);
    if !records_path.is_file() {
        bail!("No camera records at {}", records_path.display());
    }
    let records_camera = load_records_camera(records_path)?;

    let traj_path = root.join(TRAJECTORIES);
    let trajectories = if traj_path.is_file() {
        Some(load_trajectories(traj_path)?)
    } else {
        warn!("No trajectories in {}; no image will have a pose", root.display());
        None
    };

    let rigs_path = root.join(RIGS);
    let rigs = if rigs_path.is_file() {
        Some(load_rigs(rigs_path)?)
    } else {
        debug!("No rigs in {}", root.display());
        None
    };

    info!(
        "Loaded {}: {} camera records, {} trajectory entries, {} rigs",
        root.display(),
        records_camera.len(),
        trajectories.as_ref().map_or(0, Trajectories::len),
        rigs.as_ref().map_or(0, Rigs::len),
    );

    Ok(Dataset {
        records_camera,
        trajectories,
        rigs,
    })
}

fn open_records(path: &Path) -> Result<csv::Reader<File>> {
    ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))
}

/// 1-based line of `rec` in its file, comment lines included.
fn line_of(rec: &StringRecord) -> u64 {
    rec.position().map_or(0, Position::line)
}

fn check_fields(path: &Path, rec: &StringRecord, expected: usize) -> Result<()> {
    if rec.len() < expected {
        bail!(
            "{}: line {}: expected {} fields, got {}",
            path.display(),
            line_of(rec),
            expected,
            rec.len()
        );
    }
    Ok(())
}

fn parse_timestamp(path: &Path, rec: &StringRecord) -> Result<Timestamp> {
    rec[0].trim().parse::<Timestamp>().with_context(|| {
        format!(
            "{}: line {}: bad timestamp '{}'",
            path.display(),
            line_of(rec),
            &rec[0]
        )
    })
}

/// `timestamp, device_id, image_path`
pub fn load_records_camera(path: PathBuf) -> Result<Vec<CameraRecord>> {
    let mut rdr = open_records(&path)?;

    let mut records = Vec::new();
    for rec in rdr.records() {
        let rec = rec.with_context(|| format!("Failed to read {}", path.display()))?;
        check_fields(&path, &rec, 3)?;
        let timestamp = parse_timestamp(&path, &rec)?;
        records.push(CameraRecord {
            timestamp,
            sensor_id: rec[1].trim().to_string(),
            image_name: rec[2].trim().to_string(),
        });
    }
    Ok(records)
}

/// `timestamp, device_id, qw, qx, qy, qz, tx, ty, tz`
pub fn load_trajectories(path: PathBuf) -> Result<Trajectories> {
    let mut rdr = open_records(&path)?;

    let mut trajectories = Trajectories::new();
    for rec in rdr.records() {
        let rec = rec.with_context(|| format!("Failed to read {}", path.display()))?;
        check_fields(&path, &rec, 9)?;
        let timestamp = parse_timestamp(&path, &rec)?;
        let pose = parse_pose(&rec, 2)
            .with_context(|| format!("{}: line {}", path.display(), line_of(&rec)))?;
        trajectories.insert(timestamp, rec[1].trim(), pose);
    }
    Ok(trajectories)
}

/// `rig_device_id, sensor_device_id, qw, qx, qy, qz, tx, ty, tz`
pub fn load_rigs(path: PathBuf) -> Result<Rigs> {
    let mut rdr = open_records(&path)?;

    let mut rigs = Rigs::new();
    for rec in rdr.records() {
        let rec = rec.with_context(|| format!("Failed to read {}", path.display()))?;
        check_fields(&path, &rec, 9)?;
        let pose = parse_pose(&rec, 2)
            .with_context(|| format!("{}: line {}", path.display(), line_of(&rec)))?;
        rigs.insert(rec[0].trim(), rec[1].trim(), pose);
    }
    Ok(rigs)
}

/// Reads `qw, qx, qy, qz, tx, ty, tz` starting at column `first`.
fn parse_pose(rec: &StringRecord, first: usize) -> Result<SE3> {
    let mut values = [0.0f64; 7];
    for (k, value) in values.iter_mut().enumerate() {
        let field = rec[first + k].trim();
        *value = field
            .parse::<f64>()
            .with_context(|| format!("bad pose value '{}'", field))?;
    }
    let [qw, qx, qy, qz, tx, ty, tz] = values;
    Ok(SE3::from_quaternion(qw, qx, qy, qz, Vector3::new(tx, ty, tz)))
}

/// Writes pairs as `query_image, map_image, score` lines after a comment header.
pub fn write_pairs<W: Write>(writer: W, pairs: &[ImagePair]) -> Result<()> {
    let mut out = BufWriter::new(writer);
    writeln!(out, "# query_image, map_image, score")?;
    for pair in pairs {
        writeln!(out, "{}, {}, {}", pair.query, pair.map, pair.score)?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_pairs_file<P: AsRef<Path>>(path: P, pairs: &[ImagePair]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_pairs(file, pairs)
}

/// Reads a file produced by [`write_pairs_file`].
pub fn load_pairs<P: AsRef<Path>>(path: P) -> Result<Vec<ImagePair>> {
    let path = path.as_ref();
    let mut rdr = open_records(path)?;

    let mut pairs = Vec::new();
    for rec in rdr.records() {
        let rec = rec.with_context(|| format!("Failed to read {}", path.display()))?;
        check_fields(path, &rec, 3)?;
        let score = rec[2].trim().parse::<f64>().with_context(|| {
            format!(
                "{}: line {}: bad score '{}'",
                path.display(),
                line_of(&rec),
                &rec[2]
            )
        })?;
        pairs.push(ImagePair {
            query: rec[0].trim().to_string(),
            map: rec[1].trim().to_string(),
            score,
        });
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_dataset_with_rig() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            RECORDS_CAMERA,
            "# kapture format: 1.1\n\
             # timestamp, device_id, image_path\n\
             0, cam_l, seq/l_000.jpg\n\
             0, cam_r, seq/r_000.jpg\n\
             1, cam_l, seq/l_001.jpg\n",
        );
        write(
            dir.path(),
            TRAJECTORIES,
            "# timestamp, device_id, qw, qx, qy, qz, tx, ty, tz\n\
             0, rig, 1, 0, 0, 0, -2, 0, 0\n",
        );
        write(
            dir.path(),
            RIGS,
            "# rig_device_id, sensor_device_id, qw, qx, qy, qz, tx, ty, tz\n\
             rig, cam_l, 1, 0, 0, 0, 0.5, 0, 0\n\
             rig, cam_r, 1, 0, 0, 0, -0.5, 0, 0\n",
        );

        let dataset = load_dataset(dir.path()).unwrap();
        assert_eq!(dataset.records_camera.len(), 3);
        assert_eq!(dataset.records_camera[2].image_name, "seq/l_001.jpg");
        assert_eq!(dataset.rigs.as_ref().unwrap().len(), 1);

        let poses = dataset.camera_poses();
        assert_eq!(poses.len(), 2);
        assert_eq!(poses[0].name, "seq/l_000.jpg");
        assert_relative_eq!(poses[0].pose.translation.x, 1.5, epsilon = 1e-12);
        assert_relative_eq!(poses[1].pose.translation.x, 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_load_dataset_without_trajectories() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), RECORDS_CAMERA, "0, cam, a.jpg\n");

        let dataset = load_dataset(dir.path()).unwrap();
        assert!(dataset.trajectories.is_none());
        assert!(dataset.camera_poses().is_empty());
    }

    #[test]
    fn test_missing_records_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_dataset(dir.path()).is_err());
    }

    #[test]
    fn test_bad_pose_value_reports_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), RECORDS_CAMERA, "0, cam, a.jpg\n");
        write(dir.path(), TRAJECTORIES, "0, cam, 1, 0, 0, zero, 0, 0, 0\n");

        let err = load_dataset(dir.path()).unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("trajectories.txt"));
        assert!(msg.contains("zero"));
    }

    #[test]
    fn test_truncated_trajectory_line_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), RECORDS_CAMERA, "0, cam, a.jpg\n1, cam, b.jpg\n");
        write(
            dir.path(),
            TRAJECTORIES,
            "# timestamp, device_id, qw, qx, qy, qz, tx, ty, tz\n\
             0, cam, 1, 0, 0, 0, 0, 0, 0\n\
             1, cam, 1, 0, 0, 0, 0, 0\n",
        );

        let err = load_dataset(dir.path()).unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("trajectories.txt"));
        assert!(msg.contains("line 3"));
        assert!(msg.contains("expected 9 fields, got 8"));
    }

    #[test]
    fn test_short_record_and_rig_lines_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), RECORDS_CAMERA, "0, cam, a.jpg\n1, cam\n");
        let err = load_dataset(dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("line 2: expected 3 fields, got 2"));

        write(dir.path(), RECORDS_CAMERA, "0, cam, a.jpg\n");
        write(dir.path(), RIGS, "rig, cam, 1, 0, 0\n");
        let err = load_dataset(dir.path()).unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("rigs.txt"));
        assert!(msg.contains("line 1: expected 9 fields, got 5"));
    }

    #[test]
    fn test_nested_rig_dataset_keeps_camera_poses() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), RECORDS_CAMERA, "0, cam, a.jpg\n");
        write(dir.path(), TRAJECTORIES, "0, outer, 1, 0, 0, 0, 1, 0, 0\n");
        write(
            dir.path(),
            RIGS,
            "outer, inner, 1, 0, 0, 0, 0, 2, 0\n\
             inner, cam, 1, 0, 0, 0, 0, 0, 3\n",
        );

        let poses = load_dataset(dir.path()).unwrap().camera_poses();

        assert_eq!(poses.len(), 1);
        assert_eq!(poses[0].name, "a.jpg");
        // world_from_cam of a pure translation chain
        assert_relative_eq!(
            poses[0].pose.translation,
            Vector3::new(-1.0, -2.0, -3.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_write_then_load_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/pairs.txt");
        let pairs = vec![
            ImagePair {
                query: "q/0.jpg".to_string(),
                map: "m/3.jpg".to_string(),
                score: 1.75,
            },
            ImagePair {
                query: "q/1.jpg".to_string(),
                map: "m/0.jpg".to_string(),
                score: 0.5,
            },
        ];

        write_pairs_file(&path, &pairs).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# query_image, map_image, score\n"));
        assert!(text.contains("q/0.jpg, m/3.jpg, 1.75\n"));

        assert_eq!(load_pairs(&path).unwrap(), pairs);
    }
}

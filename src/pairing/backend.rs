//! Compute backends for the all-pairs distance matrices.
//!
//! A backend fills `N_query × N_map` matrices from per-pose inputs
//! (translations and precomputed rotation matrices). Backends differ only
//! in how the grid is scheduled; every element is evaluated with the same
//! arithmetic, so results are identical across backends.

use std::fmt;
use std::str::FromStr;

use nalgebra::{DMatrix, Matrix3, Vector3};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::error::{PairingError, Result};
use crate::geometry::so3::geodesic_distance_deg;

/// Batched distance evaluation over the query × map grid.
pub trait ComputeBackend: Send + Sync {
    fn name(&self) -> &str;

    /// `out[i, j] = |query[i] - map[j]|`.
    fn translation_distances(
        &self,
        query: &[Vector3<f64>],
        map: &[Vector3<f64>],
    ) -> Result<DMatrix<f64>>;

    /// `out[i, j]` = geodesic angle between `query[i]` and `map[j]`, in degrees.
    fn rotation_distances_deg(
        &self,
        query: &[Matrix3<f64>],
        map: &[Matrix3<f64>],
    ) -> Result<DMatrix<f64>>;

    /// Both matrices. The default evaluates them one after the other.
    fn pairwise(
        &self,
        query_t: &[Vector3<f64>],
        map_t: &[Vector3<f64>],
        query_r: &[Matrix3<f64>],
        map_r: &[Matrix3<f64>],
    ) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
        let distances = self.translation_distances(query_t, map_t)?;
        let angles = self.rotation_distances_deg(query_r, map_r)?;
        Ok((distances, angles))
    }
}

/// Single-threaded nested iteration.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuBackend;

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn translation_distances(
        &self,
        query: &[Vector3<f64>],
        map: &[Vector3<f64>],
    ) -> Result<DMatrix<f64>> {
        Ok(DMatrix::from_fn(query.len(), map.len(), |i, j| {
            (query[i] - map[j]).norm()
        }))
    }

    fn rotation_distances_deg(
        &self,
        query: &[Matrix3<f64>],
        map: &[Matrix3<f64>],
    ) -> Result<DMatrix<f64>> {
        Ok(DMatrix::from_fn(query.len(), map.len(), |i, j| {
            geodesic_distance_deg(&query[i], &map[j])
        }))
    }
}

/// Rows spread over a dedicated rayon pool; the two matrices are built
/// concurrently.
pub struct ThreadPoolBackend {
    pool: ThreadPool,
}

impl ThreadPoolBackend {
    /// `num_threads = None` lets rayon pick one thread per core.
    pub fn new(num_threads: Option<usize>) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads.unwrap_or(0))
            .thread_name(|i| format!("vloc-pairs-{}", i))
            .build()
            .map_err(|e| PairingError::BackendUnavailable(format!("thread pool: {}", e)))?;
        debug!("Thread pool backend with {} threads", pool.current_num_threads());
        Ok(Self { pool })
    }
}

/// Evaluates `f` over the grid row by row in parallel.
fn par_grid<A, B, F>(query: &[A], map: &[B], f: F) -> DMatrix<f64>
where
    A: Sync,
    B: Sync,
    F: Fn(&A, &B) -> f64 + Sync,
{
    let n_map = map.len();
    let mut data = vec![0.0; query.len() * n_map];
    if n_map > 0 {
        data.par_chunks_mut(n_map)
            .zip(query.par_iter())
            .for_each(|(row, q)| {
                for (out, m) in row.iter_mut().zip(map) {
                    *out = f(q, m);
                }
            });
    }
    DMatrix::from_row_slice(query.len(), n_map, &data)
}

impl ComputeBackend for ThreadPoolBackend {
    fn name(&self) -> &str {
        "threads"
    }

    fn translation_distances(
        &self,
        query: &[Vector3<f64>],
        map: &[Vector3<f64>],
    ) -> Result<DMatrix<f64>> {
        Ok(self
            .pool
            .install(|| par_grid(query, map, |q, m| (q - m).norm())))
    }

    fn rotation_distances_deg(
        &self,
        query: &[Matrix3<f64>],
        map: &[Matrix3<f64>],
    ) -> Result<DMatrix<f64>> {
        Ok(self
            .pool
            .install(|| par_grid(query, map, geodesic_distance_deg)))
    }

    fn pairwise(
        &self,
        query_t: &[Vector3<f64>],
        map_t: &[Vector3<f64>],
        query_r: &[Matrix3<f64>],
        map_r: &[Matrix3<f64>],
    ) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
        let (distances, angles) = self.pool.install(|| {
            rayon::join(
                || par_grid(query_t, map_t, |q, m| (q - m).norm()),
                || par_grid(query_r, map_r, geodesic_distance_deg),
            )
        });
        Ok((distances, angles))
    }
}

/// Compute device selected by name, e.g. `"cpu"`, `"threads"`, `"threads:8"`.
///
/// Accelerator names (`cuda`, `cuda:0`, `mps`, `vulkan`, `opencl`, `gpu`)
/// parse, but no accelerator backend is compiled in, so
/// [`Device::backend`] reports them as unavailable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Device {
    #[default]
    Cpu,
    Threads(Option<usize>),
    Accelerator(String),
}

const ACCELERATOR_PREFIXES: [&str; 5] = ["cuda", "mps", "vulkan", "opencl", "gpu"];

impl Device {
    pub fn backend(&self) -> Result<Box<dyn ComputeBackend>> {
        match self {
            Device::Cpu => Ok(Box::new(CpuBackend)),
            Device::Threads(n) => Ok(Box::new(ThreadPoolBackend::new(*n)?)),
            Device::Accelerator(name) => Err(PairingError::BackendUnavailable(format!(
                "device '{}' is not supported by this build",
                name
            ))),
        }
    }
}

impl FromStr for Device {
    type Err = PairingError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        let (kind, arg) = match name.split_once(':') {
            Some((kind, arg)) => (kind, Some(arg)),
            None => (name.as_str(), None),
        };

        match (kind, arg) {
            ("cpu", None) => Ok(Device::Cpu),
            ("threads", None) => Ok(Device::Threads(None)),
            ("threads", Some(n)) => n
                .parse::<usize>()
                .map(|n| Device::Threads(Some(n)))
                .map_err(|_| {
                    PairingError::InvalidConfiguration(format!("invalid thread count in '{}'", s))
                }),
            (kind, _) if ACCELERATOR_PREFIXES.contains(&kind) => {
                Ok(Device::Accelerator(name.clone()))
            }
            _ => Err(PairingError::InvalidConfiguration(format!(
                "unknown device '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Threads(None) => write!(f, "threads"),
            Device::Threads(Some(n)) => write!(f, "threads:{}", n),
            Device::Accelerator(name) => write!(f, "{}", name),
        }
    }
}

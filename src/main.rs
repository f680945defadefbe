use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rust_vloc::io::{load_dataset, write_pairs, write_pairs_file};
use rust_vloc::pairing::{Device, PairingConfig, compute_pairs};

/// Pairs query images with map images whose camera poses are close.
#[derive(Debug, Parser)]
#[command(author, version, about = "Pose-distance image pairing")]
struct Args {
    /// Root of the mapping dataset (kapture layout).
    #[arg(long)]
    mapping: PathBuf,

    /// Root of the query dataset. Defaults to the mapping dataset.
    #[arg(long)]
    query: Option<PathBuf>,

    /// Output pairs file. Written to stdout if omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// YAML file with a pairing configuration; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum candidates per query image.
    #[arg(short = 'k', long)]
    topk: Option<usize>,

    /// Keep every candidate instead of the top k.
    #[arg(long, conflicts_with = "topk")]
    all: bool,

    #[arg(long)]
    min_distance: Option<f64>,

    #[arg(long)]
    max_distance: Option<f64>,

    /// Maximum rotation difference, in degrees.
    #[arg(long)]
    max_angle: Option<f64>,

    /// Keep pairs outside the distance/angle thresholds.
    #[arg(long)]
    keep_rejected: bool,

    /// Compute device: cpu, threads or threads:N.
    #[arg(long, default_value = "cpu")]
    device: String,
}

impl Args {
    fn pairing_config(&self) -> Result<PairingConfig> {
        let mut config = match &self.config {
            Some(path) => PairingConfig::from_yaml_file(path)?,
            None => PairingConfig::default(),
        };
        if self.all {
            config.top_k = None;
        } else if let Some(k) = self.topk {
            config.top_k = Some(k);
        }
        if let Some(d) = self.min_distance {
            config.min_distance = d;
        }
        if let Some(d) = self.max_distance {
            config.max_distance = d;
        }
        if let Some(a) = self.max_angle {
            config.max_angle = a;
        }
        if self.keep_rejected {
            config.keep_rejected = true;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.pairing_config()?;
    config.validate()?;
    let device: Device = args.device.parse()?;
    let backend = device.backend()?;
    info!("Pairing with {:?} on {}", config, device);

    let mapping = load_dataset(&args.mapping)?;
    let map_poses = mapping.camera_poses();
    let query_poses = match &args.query {
        Some(root) => load_dataset(root)?.camera_poses(),
        None => map_poses.clone(),
    };

    let pairs = compute_pairs(&query_poses, &map_poses, &config, backend.as_ref())?;

    match &args.output {
        Some(path) => {
            write_pairs_file(path, &pairs)?;
            info!("Wrote {} pairs to {}", pairs.len(), path.display());
        }
        None => write_pairs(std::io::stdout().lock(), &pairs)?,
    }

    Ok(())
}

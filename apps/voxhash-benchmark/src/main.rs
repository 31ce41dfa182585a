//! Voxel hash index build benchmark
//!
//! Generates a synthetic colored point cloud (a noisy sphere shell), builds the
//! hashed voxel index over it, and reports table statistics and timings.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release -p voxhash-benchmark -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--points <N>`: Number of synthetic points (default: 1000000)
//! - `--seed <N>`: Random seed (default: 42)
//! - `--resolution <N>`: Fine voxels along the longest axis (default: 4000)
//! - `--levels <N>`: Empty-skip levels (default: 6)
//! - `--probing <D>`: Use linear probing up to `D` slots instead of chaining
//! - `--no-compact`: Skip the compaction pass
//! - `-o, --output <PATH>`: Write the finished index to `PATH`
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use std::path::PathBuf;
use std::time::Instant;

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;
use voxhash_core::constants::{DEFAULT_FINE_VOXELS_PER_AXIS, DEFAULT_SKIP_LEVELS};
use voxhash_core::{Bounds, PackedColor};
use voxhash_index::{archive, CollisionStrategy, HashMapBuilder, IndexConfig};

/// Benchmark parameters.
#[derive(Debug, Clone)]
struct BenchParams {
    points: usize,
    seed: u64,
    config: IndexConfig,
    output: Option<PathBuf>,
}

impl Default for BenchParams {
    fn default() -> Self {
        Self {
            points: 1_000_000,
            seed: 42,
            config: IndexConfig::default(),
            output: None,
        }
    }
}

impl BenchParams {
    /// Parse benchmark parameters from command line arguments.
    fn from_args() -> Self {
        let mut params = Self::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1);
            match args[i].as_str() {
                "--points" => {
                    if let Some(v) = value.and_then(|v| v.parse().ok()) {
                        params.points = v;
                        i += 1;
                    }
                }
                "--seed" => {
                    if let Some(v) = value.and_then(|v| v.parse().ok()) {
                        params.seed = v;
                        i += 1;
                    }
                }
                "--resolution" => {
                    if let Some(v) = value.and_then(|v| v.parse().ok()) {
                        params.config.fine_voxels_per_axis = v;
                        i += 1;
                    }
                }
                "--levels" => {
                    if let Some(v) = value.and_then(|v| v.parse().ok()) {
                        params.config.skip_levels = v;
                        i += 1;
                    }
                }
                "--probing" => {
                    if let Some(max_distance) = value.and_then(|v| v.parse().ok()) {
                        params.config.collision = CollisionStrategy::Probing { max_distance };
                        i += 1;
                    }
                }
                "--no-compact" => params.config.compact = false,
                "-o" | "--output" => {
                    if let Some(v) = value {
                        params.output = Some(PathBuf::from(v));
                        i += 1;
                    }
                }
                other => tracing::warn!("Ignoring unknown argument {other}"),
            }
            i += 1;
        }

        params
    }
}

/// Points scattered around a unit sphere, colored by direction.
fn sphere_shell(count: usize, seed: u64) -> (Vec<Vec3>, Vec<PackedColor>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut positions = Vec::with_capacity(count);
    let mut colors = Vec::with_capacity(count);
    while positions.len() < count {
        let v = Vec3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        let Some(dir) = v.try_normalize() else {
            continue;
        };
        let radius = 1.0 + rng.gen_range(-0.01..0.01);
        positions.push(dir * radius);
        colors.push(PackedColor::from_vec3(dir * 0.5 + 0.5));
    }
    (positions, colors)
}

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let params = BenchParams::from_args();
    info!(
        points = params.points,
        seed = params.seed,
        resolution = params.config.fine_voxels_per_axis,
        levels = params.config.skip_levels,
        collision = ?params.config.collision,
        compact = params.config.compact,
        "Voxel hash index benchmark"
    );

    let start = Instant::now();
    let (positions, colors) = sphere_shell(params.points, params.seed);
    info!(
        "Generated {} points in {:?}",
        positions.len(),
        start.elapsed()
    );

    let bounds = Bounds::from_points(&positions)
        .ok_or_else(|| anyhow::anyhow!("point cloud has no finite points"))?;

    let start = Instant::now();
    let infos = HashMapBuilder::new(params.config).build(&positions, &colors, bounds)?;
    let build_time = start.elapsed();

    let stats = &infos.stats;
    info!(
        "Built index in {:?}: {} boxes, {} voxels, {:.2} MB",
        build_time,
        stats.occupied_boxes,
        stats.occupied_voxels,
        infos.memory_usage() as f64 / (1024.0 * 1024.0)
    );
    info!(
        "Base map: {} slots ({} before compaction, {} nominal), {} collisions, longest chain {}, usage {:.1}%",
        stats.base.size,
        stats.base.size_before_compaction,
        stats.base.nominal_size,
        stats.base.chains.collisions,
        stats.base.chains.longest_chain,
        stats.base.primary_usage * 100.0
    );
    info!("Skip level nominal sizes: {:?}", infos.empty_skip_sizes());
    for (level, table) in stats.skip_levels.iter().enumerate() {
        info!(
            "Skip level {}: {} slots, {} collisions, usage {:.1}%",
            level,
            table.size,
            table.chains.collisions,
            table.primary_usage * 100.0
        );
    }

    let reader = infos.reader();
    let start = Instant::now();
    let hits = positions.iter().filter(|&&p| reader.is_occupied(p)).count();
    info!(
        "Queried {} points in {:?}, {} hits",
        positions.len(),
        start.elapsed(),
        hits
    );
    anyhow::ensure!(
        hits == positions.len(),
        "{} points not found",
        positions.len() - hits
    );

    if let Some(path) = &params.output {
        archive::save(&infos, path)?;
    }

    Ok(())
}

fn print_help() {
    eprintln!(
        "Voxel hash index build benchmark

USAGE:
    cargo run --release -p voxhash-benchmark -- [OPTIONS]

OPTIONS:
    --points <N>            Number of synthetic points (default: 1000000)
    --seed <N>              Random seed (default: 42)
    --resolution <N>        Fine voxels along the longest axis (default: {DEFAULT_FINE_VOXELS_PER_AXIS})
    --levels <N>            Empty-skip levels (default: {DEFAULT_SKIP_LEVELS})
    --probing <D>           Linear probing up to D slots instead of chaining
    --no-compact            Skip the compaction pass
    -o, --output <PATH>     Write the finished index to PATH
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}

//! Static terrain generator - builds a fixed-size world once and reports it.
//!
//! Usage: cargo run --release --bin generate_terrain -- [OPTIONS]
//!
//! Options:
//!   --config <PATH>     JSON engine config; flags below override it
//!   --size <METERS>     World size in meters, square (default: 64)
//!   --seed <SEED>       Noise seed (default: 0)
//!   --chunk <N>         Chunk edge length (default: 16)
//!   --height <H>        Max terrain height (default: 100)
//!   --amplitude <A>     Noise amplitude (default: 10)
//!   --algorithm <ALG>   marching_cubes | dual_contouring (default: marching_cubes)
//!   --mode <MODE>       heightmap | noise3d (default: heightmap)
//!   --trees <A,B,..>    Tree resource names to place
//!   --inline            Extract on the main thread instead of the worker pool

use std::str::FromStr;
use std::time::Instant;

use isoterra::chunk::MemorySink;
use isoterra::core::Result;
use isoterra::density::DensityMode;
use isoterra::mesh::IsosurfaceAlgorithm;
use isoterra::placement::ObjectResource;
use isoterra::streaming::DispatchMode;
use isoterra::terrain::{EngineConfig, TerrainEngine};

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let mut config = match parse_arg::<String>(&args, "--config") {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let terrain = &mut config.terrain;
    terrain.infinite = false;
    if let Some(size) = parse_arg::<f32>(&args, "--size") {
        terrain.world_size = [size, size];
    }
    if let Some(seed) = parse_arg(&args, "--seed") {
        terrain.noise.seed = seed;
    }
    if let Some(chunk) = parse_arg(&args, "--chunk") {
        terrain.chunk_size = chunk;
    }
    if let Some(height) = parse_arg(&args, "--height") {
        terrain.max_height = height;
    }
    if let Some(amplitude) = parse_arg(&args, "--amplitude") {
        terrain.noise.amplitude = amplitude;
    }
    if let Some(algorithm) = parse_selector::<IsosurfaceAlgorithm>(&args, "--algorithm")? {
        terrain.algorithm = algorithm;
    }
    if let Some(mode) = parse_selector::<DensityMode>(&args, "--mode")? {
        terrain.density_mode = mode;
    }
    if args.iter().any(|a| a == "--inline") {
        terrain.dispatch = DispatchMode::Inline;
    }
    if let Some(trees) = parse_arg::<String>(&args, "--trees") {
        config.trees.resources = trees.split(',').map(ObjectResource::new).collect();
    }

    let terrain = &config.terrain;
    println!("=== Isoterra Terrain Generator ===");
    println!("Size:      {}m x {}m", terrain.world_size[0], terrain.world_size[1]);
    println!("Seed:      {}", terrain.noise.seed);
    println!("Chunk:     {} (max height {})", terrain.chunk_size, terrain.max_height);
    println!("Algorithm: {}", terrain.algorithm);
    println!("Density:   {:?}, amplitude {}", terrain.density_mode, terrain.noise.amplitude);
    println!();

    let start = Instant::now();
    let mut engine = TerrainEngine::new(config, Box::new(MemorySink::new()));
    engine.generate_terrain(None)?;
    let elapsed = start.elapsed();

    let stats = engine.stats();
    println!("Chunks:    {} ({} with geometry)", stats.chunks, stats.meshed_chunks);
    println!("Vertices:  {}", stats.vertices);
    println!("Triangles: {}", stats.triangles);
    println!("Objects:   {}", stats.objects);
    println!("Time:      {:.1} ms", elapsed.as_secs_f64() * 1000.0);

    match engine.default_spawn_point() {
        Ok(spawn) => println!("Spawn:     ({:.1}, {:.1}, {:.1})", spawn.x, spawn.y, spawn.z),
        Err(e) => log::warn!("{}", e),
    }
    Ok(())
}

fn parse_arg<T: FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

/// Like `parse_arg`, but an unrecognised value is an error instead of ignored
fn parse_selector<T>(args: &[String], flag: &str) -> Result<Option<T>>
where
    T: FromStr<Err = isoterra::core::Error>,
{
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.parse())
        .transpose()
}

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion, black_box};

use isoterra::density::{Density, DensityMode, NoiseSettings, NoiseSource, TerrainDensity};
use isoterra::mesh::{recalculate_normals, DualContouring, MarchingCubes, MeshBuilder};

use glam::Vec3;

fn heightmap(chunk_size: u32) -> Arc<Density> {
    let noise = NoiseSource::new(&NoiseSettings { seed: 7, ..Default::default() });
    let terrain = TerrainDensity::new(noise, 10.0, 1.0 / chunk_size as f64, DensityMode::Heightmap);
    Arc::new(Density::from(terrain))
}

fn bench_marching_cubes_16(c: &mut Criterion) {
    let density = heightmap(16);
    let offset = Vec3::new(0.0, -8.0, 0.0);

    c.bench_function("marching_cubes_16", |b| {
        b.iter(|| {
            let builder = MarchingCubes::new(Arc::clone(&density), black_box(offset), 16);
            builder.generate()
        });
    });
}

fn bench_marching_cubes_32(c: &mut Criterion) {
    let density = heightmap(32);
    let offset = Vec3::new(0.0, -16.0, 0.0);

    c.bench_function("marching_cubes_32", |b| {
        b.iter(|| {
            let builder = MarchingCubes::new(Arc::clone(&density), black_box(offset), 32);
            builder.generate()
        });
    });
}

fn bench_dual_contouring_16(c: &mut Criterion) {
    let density = heightmap(16);
    let offset = Vec3::new(0.0, -8.0, 0.0);

    c.bench_function("dual_contouring_16", |b| {
        b.iter(|| {
            let builder = DualContouring::new(Arc::clone(&density), black_box(offset), 16);
            builder.generate()
        });
    });
}

fn bench_dual_contouring_sphere(c: &mut Criterion) {
    let density = Arc::new(Density::Sphere { center: Vec3::splat(8.0), radius: 6.0 });

    c.bench_function("dual_contouring_sphere_16", |b| {
        b.iter(|| {
            let builder = DualContouring::new(Arc::clone(&density), Vec3::ZERO, 16);
            builder.generate()
        });
    });
}

fn bench_recalculate_normals(c: &mut Criterion) {
    let mesh = MarchingCubes::new(heightmap(16), Vec3::new(0.0, -8.0, 0.0), 16).march();

    c.bench_function("recalculate_normals_16", |b| {
        b.iter(|| recalculate_normals(black_box(&mesh.vertices), black_box(&mesh.triangles), 90.0));
    });
}

criterion_group!(
    benches,
    bench_marching_cubes_16,
    bench_marching_cubes_32,
    bench_dual_contouring_16,
    bench_dual_contouring_sphere,
    bench_recalculate_normals,
);
criterion_main!(benches);

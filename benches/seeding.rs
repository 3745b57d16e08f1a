//! Benchmarks for the CPU side: seeding, field construction, uploads.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use windtrail::shader_utils::geo_wgsl;
use windtrail::spawn::{particles_texture_size, randomize_particles};
use windtrail::{AxisRange, ColorTable, GeoBounds, GridDimensions, VectorField};

fn global_bounds() -> GeoBounds {
    GeoBounds::new(
        AxisRange::new(-180.0, 180.0),
        AxisRange::new(-90.0, 90.0),
        AxisRange::new(0.0, 5000.0),
    )
}

fn bench_randomize(c: &mut Criterion) {
    let mut group = c.benchmark_group("randomize_particles");
    let bounds = global_bounds();

    for count in [64 * 64u32, 256 * 256, 1024 * 1024] {
        let slots = particles_texture_size(count).pow(2) as usize;
        group.bench_with_input(BenchmarkId::from_parameter(count), &slots, |b, &slots| {
            let mut rng = SmallRng::seed_from_u64(42);
            b.iter(|| black_box(randomize_particles(slots, &bounds, &mut rng)))
        });
    }

    group.finish();
}

fn bench_field(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_field");

    for (lon, lat, lev) in [(145u32, 73u32, 1u32), (361, 181, 1), (361, 181, 10)] {
        let dims = GridDimensions::new(lon, lat, lev);
        group.bench_with_input(
            BenchmarkId::new("from_fn", format!("{}x{}x{}", lon, lat, lev)),
            &dims,
            |b, &dims| {
                b.iter(|| {
                    let field = VectorField::from_fn(dims, global_bounds(), |lon, lat, _| {
                        (lat.to_radians().cos() * 20.0, lon.to_radians().sin() * 5.0)
                    });
                    black_box(field.map(|f| f.metadata()))
                })
            },
        );
    }

    group.finish();
}

fn bench_uploads(c: &mut Criterion) {
    let table = ColorTable::new(
        (0..256)
            .map(|i| {
                let t = i as f32 / 255.0;
                [t, 1.0 - t, 0.5]
            })
            .collect(),
    )
    .unwrap();

    c.bench_function("color_table_to_rgba8", |b| b.iter(|| black_box(table.to_rgba8())));
    c.bench_function("geo_wgsl", |b| b.iter(|| black_box(geo_wgsl())));
}

criterion_group!(benches, bench_randomize, bench_field, bench_uploads);
criterion_main!(benches);

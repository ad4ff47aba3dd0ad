use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec3;
use raumklang::doppler::{pitch_ratio, Kinematics};
use raumklang::pitch::{FftPlan, PitchShifter, FRAME_SIZE, OVERSAMPLING};
use raumklang::{make_spatial_mixer, Buffer, BufferPool, Field, Location};

const BLOCK: usize = 512;

fn rig(sources: usize, moving: bool) -> (Box<dyn raumklang::Segment>, BufferPool) {
    let mut pool = BufferPool::new();
    let mut space = make_spatial_mixer(48000);
    let left = pool.allocate(BLOCK);
    let right = pool.allocate(BLOCK);
    space.set_out(Field::Buffer, Location::Left, left.into()).unwrap();
    space.set_out(Field::Buffer, Location::Right, right.into()).unwrap();

    for i in 0..sources {
        let samples = (0..BLOCK).map(|n| ((n + i) as f32 * 0.05).sin()).collect();
        let h = pool.insert(Buffer::from_samples(samples));
        space.set_in(Field::Buffer, Location::Index(i), h.into()).unwrap();
        let at = Vec3::new(i as f32 * 100.0, 0.0, 500.0);
        space.set_in(Field::Location, Location::Index(i), at.into()).unwrap();
        if moving {
            space
                .set_in(Field::Velocity, Location::Index(i), Vec3::new(0.0, 0.0, -1500.0).into())
                .unwrap();
        }
    }
    (space, pool)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("SpaceMixer.mix()");
    for sources in [1, 8, 32] {
        group.bench_with_input(BenchmarkId::new("static", sources), &sources, |b, &n| {
            let (mut space, mut pool) = rig(n, false);
            b.iter(|| space.mix(black_box(BLOCK), &mut pool).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("doppler", sources), &sources, |b, &n| {
            let (mut space, mut pool) = rig(n, true);
            b.iter(|| space.mix(black_box(BLOCK), &mut pool).unwrap())
        });
    }
    group.finish();

    c.bench_function("PitchShifter.process()", |b| {
        let mut shifter = PitchShifter::new(FftPlan::new(FRAME_SIZE), OVERSAMPLING).unwrap();
        let mut block: Vec<f32> = (0..BLOCK).map(|n| (n as f32 * 0.05).sin()).collect();
        b.iter(|| shifter.process(black_box(1.1), &mut block))
    });

    c.bench_function("pitch_ratio()", |b| {
        let listener = Kinematics::new(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0));
        let source = Kinematics::new(Vec3::new(300.0, 20.0, 500.0), Vec3::new(-900.0, 0.0, 0.0));
        b.iter(|| pitch_ratio(black_box(&listener), black_box(&source), 34330.0, 1.0))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

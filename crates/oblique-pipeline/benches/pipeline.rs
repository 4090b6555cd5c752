use criterion::{Criterion, black_box, criterion_group, criterion_main};
use glam::{Mat4, Vec2, Vec3};
use oblique_core::alloc::scratch::ScratchPool;
use oblique_pipeline::{
    FrameInputs, PipelineConfig, PipelineContext, RenderableDescriptor, TextureId,
    depth::{DepthEntry, ordered_depth_key},
    sort::sort_entries,
};

fn scene(count: usize) -> Vec<RenderableDescriptor> {
    (0..count)
        .map(|i| RenderableDescriptor {
            position: Vec3::new(
                (i % 400) as f32 * 4.8 - 960.0,
                ((i / 400) % 225) as f32 * 4.8 - 540.0,
                -100.0,
            ),
            half_extents: Vec3::new(16.0, 16.0, 0.5),
            texture: TextureId(i as u32 % 16),
            ..Default::default()
        })
        .collect()
}

fn scrambled_entries(count: usize) -> Vec<DepthEntry> {
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    (0..count)
        .map(|i| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            DepthEntry {
                index: i as u32,
                key: ordered_depth_key(((state >> 40) as f32 / 100.0) - 50_000.0),
                layer: (state >> 17) as u16 % 8,
            }
        })
        .collect()
}

fn bench_sort(c: &mut Criterion) {
    let entries = scrambled_entries(100_000);

    c.bench_function("sort_100k_radix", |b| {
        let mut pool = ScratchPool::new();
        let mut tmp = Vec::new();
        b.iter(|| {
            let mut data = entries.clone();
            sort_entries(black_box(&mut data), &mut tmp, &mut pool, 2048);
            black_box(data.len())
        })
    });

    c.bench_function("sort_100k_quicksort_fallback", |b| {
        let mut pool = ScratchPool::with_budget(0);
        let mut tmp = Vec::new();
        b.iter(|| {
            let mut data = entries.clone();
            sort_entries(black_box(&mut data), &mut tmp, &mut pool, 2048);
            black_box(data.len())
        })
    });
}

fn bench_full_frame(c: &mut Criterion) {
    let descriptors = scene(90_000);
    let inputs = FrameInputs::from_camera(
        Mat4::orthographic_rh(-960.0, 960.0, -540.0, 540.0, 0.0, 1000.0),
        Vec2::new(1920.0, 1080.0),
        0,
    );

    c.bench_function("full_frame_90k_visible", |b| {
        let mut ctx = PipelineContext::new(PipelineConfig::default());
        b.iter(|| {
            let output = ctx.run(black_box(&descriptors), &inputs);
            black_box(output.batches.len())
        })
    });
}

criterion_group!(benches, bench_sort, bench_full_frame);
criterion_main!(benches);

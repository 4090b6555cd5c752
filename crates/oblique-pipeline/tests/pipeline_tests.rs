//! End-to-end pipeline properties.

use glam::{Mat4, Vec2, Vec3};
use oblique_pipeline::{
    FrameInputs, ObjectKind, PipelineConfig, PipelineContext, RenderableDescriptor, TextureId,
    optimizer::{OverlapOrAdjacent, optimize},
};

const VIEWPORT: Vec2 = Vec2::new(1920.0, 1080.0);

fn camera(frame: u64) -> FrameInputs {
    // 1 world unit = 1 pixel, camera centered on the origin.
    FrameInputs::from_camera(
        Mat4::orthographic_rh(-960.0, 960.0, -540.0, 540.0, 0.0, 1000.0),
        VIEWPORT,
        frame,
    )
}

fn tile(x: f32, y: f32, z: f32, texture: u32) -> RenderableDescriptor {
    RenderableDescriptor {
        position: Vec3::new(x, y, z),
        half_extents: Vec3::new(16.0, 16.0, 0.5),
        texture: TextureId(texture),
        ..Default::default()
    }
}

fn on_screen(x: f32, y: f32) -> RenderableDescriptor {
    tile(x, y, -100.0, 0)
}

#[test]
fn empty_input_produces_zero_batches_and_zero_errors() {
    let mut ctx = PipelineContext::new(PipelineConfig::default());
    let output = ctx.run(&[], &camera(0));
    assert!(output.batches.is_empty());
    assert!(output.vertices.is_empty());
    assert!(output.indices.is_empty());
    assert_eq!(output.stats.invalid_positions, 0);
    assert_eq!(output.stats.dropped_objects, 0);
    assert!(!output.stats.ceiling_exceeded);
}

#[test]
fn objects_inside_the_frustum_are_never_culled() {
    let mut ctx = PipelineContext::new(PipelineConfig::default());
    let descriptors: Vec<_> = (0..100)
        .map(|i| on_screen((i % 10) as f32 * 90.0 - 450.0, (i / 10) as f32 * 90.0 - 450.0))
        .collect();

    let output = ctx.run(&descriptors, &camera(0));
    assert_eq!(output.stats.visible, 100);
    assert_eq!(output.stats.culled, 0);
}

#[test]
fn objects_outside_the_frustum_are_always_excluded() {
    let mut ctx = PipelineContext::new(PipelineConfig::default());
    let descriptors = vec![
        tile(5000.0, 0.0, -100.0, 0),
        tile(0.0, -5000.0, -100.0, 0),
        tile(0.0, 0.0, 500.0, 0), // behind the near plane
    ];

    let output = ctx.run(&descriptors, &camera(0));
    assert_eq!(output.stats.visible, 0);
    assert!(output.batches.is_empty());
}

#[test]
fn object_exactly_on_a_frustum_plane_is_visible() {
    let mut ctx = PipelineContext::new(PipelineConfig::default());
    // Right plane sits at x = 960; bounds reach exactly to it from outside.
    let descriptors = vec![tile(976.0, 0.0, -100.0, 0)];

    let output = ctx.run(&descriptors, &camera(0));
    assert_eq!(output.stats.visible, 1);
}

#[test]
fn paint_order_is_strict_regardless_of_input_order() {
    let mut ctx = PipelineContext::new(PipelineConfig::default());

    // Three overlapping sprites with distinct depths d1 < d2 < d3,
    // submitted in every permutation; the emitted member order must
    // always be back-to-front.
    let make = |d: f32| tile(d, 0.0, -100.0, 0);
    let depths = [10.0f32, 14.0, 18.0];
    let permutations = [
        [0usize, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    for perm in permutations {
        let descriptors: Vec<_> = perm.iter().map(|&i| make(depths[i])).collect();
        let output = ctx.run(&descriptors, &camera(0));

        let painted: Vec<f32> = output
            .batches
            .iter()
            .flat_map(|b| b.members.iter())
            .map(|m| descriptors[m.index as usize].position.x)
            .collect();
        assert_eq!(painted, vec![10.0, 14.0, 18.0], "permutation {perm:?}");
    }
}

#[test]
fn equal_depth_ties_break_by_layer_then_submission_order() {
    let mut ctx = PipelineContext::new(PipelineConfig::default());

    // Four coincident sprites: layers 1, 0, 1, 0.
    let mut descriptors = vec![
        on_screen(0.0, 0.0),
        on_screen(0.0, 0.0),
        on_screen(0.0, 0.0),
        on_screen(0.0, 0.0),
    ];
    descriptors[0].layer = 1;
    descriptors[1].layer = 0;
    descriptors[2].layer = 1;
    descriptors[3].layer = 0;

    let output = ctx.run(&descriptors, &camera(0));
    let painted: Vec<u32> = output
        .batches
        .iter()
        .flat_map(|b| b.members.iter())
        .map(|m| m.index)
        .collect();
    // Layer 0 first (indices 1, 3 in submission order), then layer 1.
    assert_eq!(painted, vec![1, 3, 0, 2]);
}

#[test]
fn object_kind_bias_orders_coincident_categories() {
    let mut ctx = PipelineContext::new(PipelineConfig::default());

    let mut agent = on_screen(0.0, 0.0);
    agent.kind = ObjectKind::Agent;
    let ground = on_screen(0.0, 0.0);

    // Agent submitted first but must paint after the ground tile.
    let descriptors = vec![agent, ground];
    let output = ctx.run(&descriptors, &camera(0));
    let painted: Vec<u32> = output
        .batches
        .iter()
        .flat_map(|b| b.members.iter())
        .map(|m| m.index)
        .collect();
    assert_eq!(painted, vec![1, 0]);
}

#[test]
fn every_visible_object_lands_in_exactly_one_batch() {
    let mut ctx = PipelineContext::new(PipelineConfig::default());
    let descriptors: Vec<_> = (0..3000)
        .map(|i| {
            tile(
                (i % 60) as f32 * 32.0 - 950.0,
                ((i / 60) % 33) as f32 * 32.0 - 520.0,
                -100.0,
                i as u32 % 8,
            )
        })
        .collect();

    let output = ctx.run(&descriptors, &camera(0));
    assert_eq!(output.stats.dropped_objects, 0);

    let mut seen = vec![false; descriptors.len()];
    let mut total = 0u32;
    for batch in output.batches {
        for m in &batch.members {
            assert!(!seen[m.index as usize], "descriptor {} duplicated", m.index);
            seen[m.index as usize] = true;
            total += 1;
        }
    }
    assert_eq!(total, output.stats.visible);
}

#[test]
fn batch_masks_are_member_unions_and_counts_respect_the_cap() {
    let config = PipelineConfig {
        max_batch_size: 64,
        ..Default::default()
    };
    let mut ctx = PipelineContext::new(config);
    let descriptors: Vec<_> = (0..1000)
        .map(|i| on_screen((i % 40) as f32 * 45.0 - 900.0, (i / 40) as f32 * 40.0 - 500.0))
        .collect();

    let output = ctx.run(&descriptors, &camera(0));
    for batch in output.batches {
        assert!(batch.member_count() <= 64);
        let mut union = oblique_pipeline::ScreenTileMask::EMPTY;
        for m in &batch.members {
            union = union.union(&m.mask);
        }
        assert_eq!(batch.mask, union);
    }
}

#[test]
fn optimizer_is_idempotent_on_real_frames() {
    let mut ctx = PipelineContext::new(PipelineConfig::default());
    let descriptors: Vec<_> = (0..2000)
        .map(|i| {
            tile(
                (i % 50) as f32 * 38.0 - 930.0,
                ((i / 50) % 27) as f32 * 38.0 - 510.0,
                -100.0,
                i as u32 % 16,
            )
        })
        .collect();

    let output = ctx.run(&descriptors, &camera(0));
    let mut batches = output.batches.to_vec();
    let snapshot: Vec<Vec<u32>> = batches
        .iter()
        .map(|b| b.members.iter().map(|m| m.index).collect())
        .collect();

    let outcome = optimize(
        &mut batches,
        &PipelineConfig::default(),
        &OverlapOrAdjacent,
    );
    assert_eq!(outcome.merges, 0, "second optimize pass merged");
    assert_eq!(outcome.splits, 0, "second optimize pass split");
    let again: Vec<Vec<u32>> = batches
        .iter()
        .map(|b| b.members.iter().map(|m| m.index).collect())
        .collect();
    assert_eq!(snapshot, again);
}

#[test]
fn nan_positions_are_reported_and_never_reach_batches() {
    let mut ctx = PipelineContext::new(PipelineConfig::default());
    let mut descriptors = vec![on_screen(0.0, 0.0), on_screen(40.0, 0.0)];
    descriptors.push(RenderableDescriptor {
        position: Vec3::new(f32::NAN, 0.0, -100.0),
        ..on_screen(0.0, 0.0)
    });

    let output = ctx.run(&descriptors, &camera(0));
    assert_eq!(output.stats.invalid_positions, 1);
    assert_eq!(output.stats.visible, 2);
    for batch in output.batches {
        for m in &batch.members {
            assert!(m.index < 2);
        }
    }
}

#[test]
fn draw_call_budget_holds_for_a_million_descriptors() {
    // 1,000,000 tiles uniformly spread over a world far larger than the
    // view, 16 textures; roughly a tenth lands on screen. The final batch
    // count must be under the ceiling, or the violation must be flagged,
    // and nothing may be dropped either way.
    let mut ctx = PipelineContext::new(PipelineConfig::default());

    let mut descriptors = Vec::with_capacity(1_000_000);
    for i in 0u32..1_000_000 {
        // 1000x1000 grid, 6.4 world units apart: a 6400x6400 world with
        // the 1920x1080 view window in the middle.
        let gx = (i % 1000) as f32;
        let gy = (i / 1000) as f32;
        descriptors.push(tile(
            gx * 6.4 - 3200.0,
            gy * 6.4 - 3200.0,
            -100.0,
            i % 16,
        ));
    }

    let output = ctx.run(&descriptors, &camera(0));
    let stats = output.stats;

    // ~300x169 grid positions on screen.
    assert!(stats.visible > 40_000, "visible = {}", stats.visible);
    assert!(stats.visible < 120_000, "visible = {}", stats.visible);
    assert_eq!(stats.dropped_objects, 0);

    assert!(
        (output.batches.len() < 1000) || stats.ceiling_exceeded,
        "{} batches with no ceiling flag",
        output.batches.len()
    );
    assert_eq!(stats.batches_after as usize, output.batches.len());

    // Batch membership still partitions the visible set at this scale.
    let member_total: u32 = output.batches.iter().map(|b| b.member_count() as u32).sum();
    assert_eq!(member_total, stats.visible);
}

#[test]
fn stale_gpu_results_are_bounded_to_one_frame() {
    use oblique_pipeline::{GpuCullError, GpuCullOutput, GpuCuller};

    struct LaggedCuller {
        pending: Vec<GpuCullOutput>,
    }

    impl GpuCuller for LaggedCuller {
        fn submit(
            &mut self,
            descriptors: &[RenderableDescriptor],
            _frustum: &oblique_pipeline::Frustum,
            frame: u64,
        ) -> Result<(), GpuCullError> {
            self.pending.push(GpuCullOutput {
                frame,
                visible: (0..descriptors.len() as u32).collect(),
            });
            Ok(())
        }

        fn try_take(&mut self, min_frame: u64) -> Option<GpuCullOutput> {
            let pos = self.pending.iter().position(|o| o.frame >= min_frame)?;
            Some(self.pending.remove(pos))
        }

        fn wait(&mut self, frame: u64) -> Result<GpuCullOutput, GpuCullError> {
            self.try_take(frame)
                .ok_or_else(|| GpuCullError::Readback("empty".into()))
        }
    }

    let config = PipelineConfig {
        gpu_cull_threshold: 1,
        gpu_cull_mode: oblique_pipeline::GpuCullMode::Pipelined,
        ..Default::default()
    };
    let mut ctx = PipelineContext::new(config)
        .with_gpu_culler(Box::new(LaggedCuller { pending: Vec::new() }));
    let descriptors = vec![on_screen(0.0, 0.0)];

    // Frame 5: no completed dispatch, CPU fallback, dispatch queued.
    let stats = *ctx.run(&descriptors, &camera(5)).stats;
    assert!(!stats.gpu_cull_used);

    // Frame 6: consumes frame 5's result, stale by exactly one frame.
    let stats = *ctx.run(&descriptors, &camera(6)).stats;
    assert!(stats.gpu_cull_used);
    assert!(stats.gpu_cull_stale);

    // Frame 8: frame 6's result (two frames old) must be refused.
    let stats = *ctx.run(&descriptors, &camera(8)).stats;
    assert!(!stats.gpu_cull_used);
}

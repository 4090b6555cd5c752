//! The per-frame pipeline driver.
//!
//! [`PipelineContext`] owns every container the stages touch (visible
//! indices, depth entries, batches, geometry, scratch), so multiple
//! contexts can run side by side (tests, split-screen) with no shared
//! state. Containers are cleared, not freed, at the top of each frame;
//! steady-state frames allocate nothing.

use std::time::Instant;

use glam::{Mat4, Vec2};
use oblique_core::alloc::scratch::ScratchPool;
use oblique_core::profiling::{profile_function, profile_scope};

use crate::batch::{Batch, build_batches};
use crate::config::{GpuCullMode, PipelineConfig};
use crate::cull::{GpuCuller, cull_cpu};
use crate::depth::{DepthEntry, build_entries};
use crate::descriptor::RenderableDescriptor;
use crate::frustum::Frustum;
use crate::optimizer::{OverlapOrAdjacent, TileCompatibility, optimize};
use crate::sort::sort_entries;
use crate::stats::FrameStats;
use crate::vertex::{SpriteVertex, emit_geometry};

/// Read-only camera snapshot taken once at the top of the frame.
///
/// No stage mutates these; culling, masking and vertex generation all see
/// the same matrices even if the camera object moves mid-frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameInputs {
    pub view_projection: Mat4,
    pub frustum: Frustum,
    /// Viewport size in pixels.
    pub viewport: Vec2,
    /// Monotonic frame number, used to pair GPU culling dispatches with
    /// their results.
    pub frame: u64,
}

impl FrameInputs {
    /// Snapshot a camera: derive the frustum from the view-projection.
    pub fn from_camera(view_projection: Mat4, viewport: Vec2, frame: u64) -> Self {
        Self {
            view_projection,
            frustum: Frustum::from_view_projection(&view_projection),
            viewport,
            frame,
        }
    }
}

/// Borrowed view of one frame's output.
pub struct FrameOutput<'a> {
    /// Final batches, in submission order.
    pub batches: &'a [Batch],
    /// Interleaved vertex buffer contents for this frame.
    pub vertices: &'a [SpriteVertex],
    /// Index buffer contents for this frame.
    pub indices: &'a [u32],
    pub stats: &'a FrameStats,
}

/// Owns all pipeline state for one render stream.
pub struct PipelineContext {
    config: PipelineConfig,
    scratch: ScratchPool,
    visible: Vec<u32>,
    entries: Vec<DepthEntry>,
    entries_tmp: Vec<DepthEntry>,
    batches: Vec<Batch>,
    vertices: Vec<SpriteVertex>,
    indices: Vec<u32>,
    stats: FrameStats,
    gpu_culler: Option<Box<dyn GpuCuller>>,
    compatibility: Box<dyn TileCompatibility>,
}

impl PipelineContext {
    pub fn new(config: PipelineConfig) -> Self {
        let scratch = ScratchPool::with_budget(config.scratch_budget_words);
        Self {
            config,
            scratch,
            visible: Vec::new(),
            entries: Vec::new(),
            entries_tmp: Vec::new(),
            batches: Vec::new(),
            vertices: Vec::new(),
            indices: Vec::new(),
            stats: FrameStats::default(),
            gpu_culler: None,
            compatibility: Box::new(OverlapOrAdjacent),
        }
    }

    /// Attach the GPU culling collaborator. Used only when the candidate
    /// count reaches `config.gpu_cull_threshold` and the configured mode
    /// allows it; the CPU path remains the fallback.
    pub fn with_gpu_culler(mut self, culler: Box<dyn GpuCuller>) -> Self {
        self.gpu_culler = Some(culler);
        self
    }

    /// Replace the batch-merge compatibility predicate.
    pub fn with_compatibility(mut self, compatibility: Box<dyn TileCompatibility>) -> Self {
        self.compatibility = compatibility;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Statistics of the last completed frame.
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Run the full pipeline for one frame.
    ///
    /// Stages run in order: cull, sort, batch, optimize, emit. All scratch
    /// state is frame-scoped; `descriptors` is never mutated. Every
    /// failure mode (scratch exhaustion, batch overflow, ceiling
    /// violation, invalid positions) degrades and is reported in stats;
    /// none of them fails the frame.
    pub fn run(
        &mut self,
        descriptors: &[RenderableDescriptor],
        inputs: &FrameInputs,
    ) -> FrameOutput<'_> {
        profile_function!();

        self.begin_frame();
        self.stats.candidates = descriptors.len() as u32;

        if descriptors.is_empty() {
            return self.output();
        }

        self.cull(descriptors, inputs);
        self.sort(descriptors);
        self.build_and_optimize(descriptors, inputs);
        self.emit(descriptors, inputs);

        let stats = &self.stats;
        tracing::debug!(
            candidates = stats.candidates,
            visible = stats.visible,
            batches = stats.batches_after,
            dropped = stats.dropped_objects,
            "frame pipeline complete"
        );
        if stats.ceiling_exceeded {
            tracing::warn!(
                batches = stats.batches_after,
                ceiling = self.config.draw_call_ceiling,
                "draw-call ceiling exceeded"
            );
        }

        self.output()
    }

    fn begin_frame(&mut self) {
        self.scratch.begin_frame();
        self.visible.clear();
        self.entries.clear();
        self.entries_tmp.clear();
        self.batches.clear();
        self.vertices.clear();
        self.indices.clear();
        self.stats = FrameStats::default();
    }

    fn output(&self) -> FrameOutput<'_> {
        FrameOutput {
            batches: &self.batches,
            vertices: &self.vertices,
            indices: &self.indices,
            stats: &self.stats,
        }
    }

    /// Visibility: GPU collaborator when configured and warranted by the
    /// candidate count, CPU otherwise. GPU failure of any kind falls back
    /// to the CPU path with identical frustum semantics.
    fn cull(&mut self, descriptors: &[RenderableDescriptor], inputs: &FrameInputs) {
        profile_scope!("cull");

        if descriptors.len() >= self.config.gpu_cull_threshold
            && self.config.gpu_cull_mode != GpuCullMode::Disabled
        {
            if let Some(culler) = self.gpu_culler.as_mut() {
                match self.config.gpu_cull_mode {
                    GpuCullMode::SameFrame => {
                        if culler.submit(descriptors, &inputs.frustum, inputs.frame).is_ok()
                            && let Ok(output) = culler.wait(inputs.frame)
                        {
                            self.visible.extend_from_slice(&output.visible);
                            self.stats.gpu_cull_used = true;
                        }
                    }
                    GpuCullMode::Pipelined => {
                        // Consume last frame's result, then queue this
                        // frame's dispatch. A stale result may reference a
                        // candidate list of a different length; indices
                        // past the current list are dropped, which is part
                        // of the mode's bounded error.
                        if let Some(output) = culler.try_take(inputs.frame.saturating_sub(1)) {
                            self.stats.gpu_cull_stale = output.frame < inputs.frame;
                            let limit = descriptors.len() as u32;
                            self.visible
                                .extend(output.visible.iter().copied().filter(|&i| i < limit));
                            self.stats.gpu_cull_used = true;
                        }
                        if let Err(err) = culler.submit(descriptors, &inputs.frustum, inputs.frame)
                        {
                            tracing::warn!(%err, "GPU culling dispatch failed");
                        }
                    }
                    GpuCullMode::Disabled => unreachable!(),
                }
            }
        }

        if self.stats.gpu_cull_used {
            self.stats.visible = self.visible.len() as u32;
            self.stats.culled = self.stats.candidates.saturating_sub(self.stats.visible);
        } else {
            let counts = cull_cpu(descriptors, &inputs.frustum, &mut self.visible);
            self.stats.visible = counts.visible;
            self.stats.culled = counts.culled;
            self.stats.invalid_positions = counts.invalid;
        }
    }

    fn sort(&mut self, descriptors: &[RenderableDescriptor]) {
        profile_scope!("depth_sort");

        build_entries(
            descriptors,
            &self.visible,
            self.config.height_factor,
            &mut self.entries,
        );

        let started = Instant::now();
        self.stats.sort_algo = sort_entries(
            &mut self.entries,
            &mut self.entries_tmp,
            &mut self.scratch,
            self.config.radix_threshold,
        );
        self.stats.sort_time = started.elapsed();
    }

    fn build_and_optimize(&mut self, descriptors: &[RenderableDescriptor], inputs: &FrameInputs) {
        {
            profile_scope!("batch_build");
            let counts = build_batches(
                descriptors,
                &self.entries,
                &inputs.view_projection,
                inputs.viewport,
                &self.config,
                &mut self.batches,
            );
            self.stats.dropped_objects = counts.dropped;
            self.stats.batches_before = self.batches.len() as u32;
        }

        {
            profile_scope!("batch_optimize");
            let outcome = optimize(&mut self.batches, &self.config, self.compatibility.as_ref());
            self.stats.batches_after = self.batches.len() as u32;
            self.stats.merges = outcome.merges;
            self.stats.splits = outcome.splits;
            self.stats.ceiling_exceeded = outcome.ceiling_exceeded;
        }
    }

    fn emit(&mut self, descriptors: &[RenderableDescriptor], inputs: &FrameInputs) {
        profile_scope!("vertex_emit");

        emit_geometry(
            &mut self.batches,
            descriptors,
            &inputs.view_projection,
            inputs.viewport,
            self.config.height_factor,
            &mut self.vertices,
            &mut self.indices,
        );
        self.stats.vertices = self.vertices.len() as u32;
        self.stats.indices = self.indices.len() as u32;
    }
}

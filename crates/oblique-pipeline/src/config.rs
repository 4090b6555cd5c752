//! Pipeline configuration.

/// How the optional GPU culling collaborator is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuCullMode {
    /// Never dispatch GPU culling; always run the CPU path.
    #[default]
    Disabled,
    /// Dispatch and block on the result within the same frame.
    SameFrame,
    /// Dispatch this frame, consume the previous frame's result.
    ///
    /// Visibility then lags the camera by one frame. That is a bounded
    /// error accepted for throughput, not a correctness violation; objects
    /// misclassified by the stale set pop for at most one frame.
    Pipelined,
}

/// Tunables and capacity ceilings for a [`PipelineContext`].
///
/// All capacities are explicit upper bounds with overflow reporting via
/// [`FrameStats`]; nothing in the pipeline grows without bound or fails the
/// frame on overflow.
///
/// [`PipelineContext`]: crate::context::PipelineContext
/// [`FrameStats`]: crate::stats::FrameStats
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Weight of world z in the isometric depth key.
    pub height_factor: f32,
    /// GPU tile edge in pixels. TBDR hardware tiles are 32x32.
    pub tile_size_px: f32,
    /// Maximum descriptors in a single batch (one draw call).
    pub max_batch_size: usize,
    /// Hard capacity of the batch array. Objects that would need a batch
    /// beyond this are dropped and counted, never silently lost.
    pub max_batches: usize,
    /// Target draw-call count per frame. Exceeding it sets a stats flag.
    pub draw_call_ceiling: usize,
    /// Maximum coarse tile buckets a batch may cover before the optimizer
    /// splits it (and before a merge producing wider coverage is refused).
    pub max_coverage_buckets: u32,
    /// Candidate count at or above which the GPU culling path is preferred.
    pub gpu_cull_threshold: usize,
    /// GPU culling dispatch/consume policy.
    pub gpu_cull_mode: GpuCullMode,
    /// Entry count at or above which the sorter uses radix sort.
    pub radix_threshold: usize,
    /// Word budget for the frame scratch pool.
    pub scratch_budget_words: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            height_factor: 1.5,
            tile_size_px: 32.0,
            max_batch_size: 4096,
            max_batches: 4096,
            draw_call_ceiling: 1000,
            max_coverage_buckets: 48,
            gpu_cull_threshold: 65_536,
            gpu_cull_mode: GpuCullMode::default(),
            radix_threshold: 2048,
            scratch_budget_words: oblique_core::alloc::scratch::ScratchPool::DEFAULT_BUDGET_WORDS,
        }
    }
}

//! Runtime capability checks for the GPU culling path.

/// Whether the adapter can run the culling compute dispatch.
///
/// The pipeline treats `false` as "use the CPU path"; semantics are
/// identical either way, only throughput differs.
pub fn supports_gpu_culling(adapter: &wgpu::Adapter) -> bool {
    let downlevel = adapter.get_downlevel_capabilities();
    let ok = downlevel
        .flags
        .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS);
    if !ok {
        tracing::warn!(
            adapter = %adapter.get_info().name,
            "adapter lacks compute shaders; GPU culling disabled"
        );
    }
    ok
}

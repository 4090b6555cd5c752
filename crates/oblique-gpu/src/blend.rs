//! Mapping of pipeline blend modes onto concrete GPU blend state.
//!
//! The pipeline keys batches by [`BlendMode`] without knowing anything
//! about the GPU API; the submission layer uses these conversions when it
//! builds its render pipelines.

use oblique_pipeline::BlendMode;

/// Convert a batch blend mode to a `wgpu::BlendState`.
///
/// `Opaque` returns `None`: the color target should disable blending
/// entirely rather than use a pass-through blend equation.
pub fn to_blend_state(mode: BlendMode) -> Option<wgpu::BlendState> {
    match mode {
        BlendMode::Opaque => None,
        BlendMode::Alpha => Some(wgpu::BlendState::ALPHA_BLENDING),
        BlendMode::PremultipliedAlpha => Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
        BlendMode::Additive => Some(wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        }),
        BlendMode::Multiply => Some(wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::Dst,
                dst_factor: wgpu::BlendFactor::Zero,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::DstAlpha,
                dst_factor: wgpu::BlendFactor::Zero,
                operation: wgpu::BlendOperation::Add,
            },
        }),
    }
}

/// Build a color target state for the given blend mode and surface format.
pub fn to_color_target_state(mode: BlendMode, format: wgpu::TextureFormat) -> wgpu::ColorTargetState {
    wgpu::ColorTargetState {
        format,
        blend: to_blend_state(mode),
        write_mask: wgpu::ColorWrites::ALL,
    }
}

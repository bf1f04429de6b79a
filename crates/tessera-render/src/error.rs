use crate::gpu::GpuContextError;

/// Failures surfaced by initialisation-time render operations.
///
/// Per-frame work never returns these; it skips and logs instead.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Gpu(#[from] GpuContextError),

    /// A render target or texture was requested with a zero dimension.
    #[error("'{label}' has zero size ({width}x{height})")]
    ZeroSizedTarget {
        label: String,
        width: u32,
        height: u32,
    },

    /// Texture data does not match its declared dimensions.
    #[error("texture '{label}' expects {expected} bytes, got {actual}")]
    TextureData {
        label: String,
        expected: usize,
        actual: usize,
    },

    /// Mapping a statistics buffer failed.
    #[error("statistics read-back failed: {0}")]
    Readback(String),
}

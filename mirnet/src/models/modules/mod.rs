//! Per-level collaborators of the multi-scale residual block.

pub mod context;
pub mod fusion;

pub use context::{
    ContextBlock, ContextBlockConfig, Refinement, ResidualContextBlock,
    ResidualContextBlockConfig,
};
pub use fusion::{Fusion, SelectiveKernelFeatureFusion, SelectiveKernelFeatureFusionConfig};

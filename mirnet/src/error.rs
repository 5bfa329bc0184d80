//! Error types for the MIRNet multi-scale residual block.

use thiserror::Error;

/// The error type for `MIRNet-Burn` operations.
///
/// Every variant is raised either while a block is being constructed or when a
/// forward call receives a tensor that violates the block's shape contract. None
/// of them is recoverable inside the block.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MirNetError {
    /// Error for when an invalid block configuration is provided.
    #[error("Invalid block configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// Error for when channel counts derived from `channels` and `channel_factor`
    /// disagree between two components that must operate at the same width.
    #[error("Inconsistent channel counts: {reason}")]
    InconsistentChannels {
        /// Which derived counts disagree, and their values.
        reason: String,
    },

    /// Error for when an input tensor has an invalid shape.
    #[error("Invalid input tensor shape: expected {expected}, got {actual:?}")]
    InvalidTensorShape {
        /// The expected tensor shape.
        expected: String,
        /// The actual tensor shape.
        actual: Vec<usize>,
    },

    /// Error for when a spatial dimension cannot be divided by the cumulative
    /// downsampling factor without truncation.
    #[error("Spatial dimensions {height}x{width} are not divisible by {factor}")]
    IndivisibleSpatialDims {
        /// Input height.
        height: usize,
        /// Input width.
        width: usize,
        /// The required divisor.
        factor: usize,
    },

    /// Error for when two tensors that must share a shape do not.
    #[error("Shape mismatch at {step}: {left:?} vs {right:?}")]
    ShapeMismatch {
        /// The pipeline step that received the tensors.
        step: String,
        /// Shape of the first tensor.
        left: Vec<usize>,
        /// Shape of the second tensor.
        right: Vec<usize>,
    },

    /// Error for when a fusion receives the wrong number of inputs.
    #[error("Fusion expects {expected} inputs, got {actual}")]
    FusionArity {
        /// Number of inputs the fusion was built for.
        expected: usize,
        /// Number of inputs received.
        actual: usize,
    },
}

/// A specialized `Result` type for `MIRNet-Burn` operations.
pub type MirNetResult<T> = Result<T, MirNetError>;

/// Fails with [`MirNetError::ShapeMismatch`] unless both shapes are identical.
pub(crate) fn ensure_same_shape(
    step: &str,
    left: [usize; 4],
    right: [usize; 4],
) -> MirNetResult<()> {
    if left == right {
        Ok(())
    } else {
        Err(MirNetError::ShapeMismatch {
            step: step.to_string(),
            left: left.to_vec(),
            right: right.to_vec(),
        })
    }
}

/// Fails with [`MirNetError::IndivisibleSpatialDims`] unless both spatial dims of a
/// `[batch, channels, height, width]` shape are multiples of `factor`.
pub(crate) fn ensure_divisible(shape: [usize; 4], factor: usize) -> MirNetResult<()> {
    let [_, _, height, width] = shape;
    if factor == 0 || height % factor != 0 || width % factor != 0 {
        return Err(MirNetError::IndivisibleSpatialDims {
            height,
            width,
            factor,
        });
    }
    Ok(())
}
